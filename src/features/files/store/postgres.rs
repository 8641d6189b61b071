use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

use super::{
    batch_rounds, BatchDeleteOutcome, ConditionalWrite, FilePage, ListCursor, MetadataStore,
};
use crate::core::config::MetadataConfig;
use crate::core::error::{AppError, Result};
use crate::features::files::models::{FilePatch, FileRecord, NewFileRecord};

/// Secondary index that `query_by_date_range` depends on
const CREATED_AT_INDEX: &str = "files_created_at_idx";

/// Metadata store backed by the `files` table
pub struct PgMetadataStore {
    pool: PgPool,
    batch_get_limit: usize,
    #[allow(dead_code)]
    batch_write_limit: usize,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool, config: &MetadataConfig) -> Self {
        Self {
            pool,
            batch_get_limit: config.batch_get_limit,
            batch_write_limit: config.batch_write_limit,
        }
    }

    /// Fail startup when the `created_at` index is missing.
    ///
    /// Date-range queries have no fallback without it.
    pub async fn verify_schema(&self) -> Result<()> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE tablename = 'files' AND indexname = $1)",
        )
        .bind(CREATED_AT_INDEX)
        .fetch_one(&self.pool)
        .await?;

        if !exists {
            return Err(AppError::Internal(format!(
                "Index '{}' on files(created_at) is missing; date range queries require it",
                CREATED_AT_INDEX
            )));
        }

        info!("Metadata schema verified ({} present)", CREATED_AT_INDEX);
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn create(&self, record: NewFileRecord) -> Result<FileRecord> {
        let now = Utc::now();
        let created = sqlx::query_as::<_, FileRecord>(
            r#"
            INSERT INTO files (id, name, size, content_type, status, s3_key, version,
                               created_at, updated_at, description, tags)
            VALUES ($1, $2, $3, $4, $5, $6, 1, $7, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(record.size)
        .bind(&record.content_type)
        .bind(record.status.as_str())
        .bind(&record.s3_key)
        .bind(now)
        .bind(&record.description)
        .bind(&record.tags)
        .fetch_optional(&self.pool)
        .await?;

        created.ok_or_else(|| {
            AppError::AlreadyExists(format!("File with id {} already exists", record.id))
        })
    }

    async fn get(&self, id: &str) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn write_if_version(
        &self,
        id: &str,
        patch: &FilePatch,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<ConditionalWrite> {
        let written = sqlx::query_as::<_, FileRecord>(
            r#"
            UPDATE files SET
                name = COALESCE($3, name),
                description = CASE WHEN $4 THEN $5 ELSE description END,
                tags = COALESCE($6, tags),
                status = COALESCE($7, status),
                version = version + 1,
                updated_at = $8
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(&patch.name)
        .bind(patch.description.is_some())
        .bind(patch.description.clone().flatten())
        .bind(&patch.tags)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = written {
            return Ok(ConditionalWrite::Written(record));
        }

        // Precondition failed: tell a lost race apart from a missing row
        let current: Option<i64> = sqlx::query_scalar("SELECT version FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match current {
            Some(current) => ConditionalWrite::VersionMismatch { current },
            None => ConditionalWrite::Missing,
        })
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("File with id {} not found", id)));
        }
        Ok(())
    }

    async fn list(&self, limit: i64, cursor: Option<&ListCursor>) -> Result<FilePage> {
        let limit = limit.max(1);
        let mut items = sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT * FROM files
            WHERE status = 'active' AND ($1::text IS NULL OR id > $1)
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(cursor.map(|c| c.last_id()))
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await?;

        let next_cursor = if items.len() as i64 > limit {
            items.truncate(limit as usize);
            items.last().map(|last| ListCursor::after(last.id.clone()))
        } else {
            None
        };

        Ok(FilePage { items, next_cursor })
    }

    async fn batch_get(&self, ids: &[String]) -> Result<Vec<FileRecord>> {
        let mut found = Vec::with_capacity(ids.len());
        for (round, chunk) in batch_rounds(ids, self.batch_get_limit)
            .into_iter()
            .enumerate()
        {
            let rows = sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE id = ANY($1)")
                .bind(&chunk)
                .fetch_all(&self.pool)
                .await?;
            debug!(
                "Batch get round {}: {} requested, {} found",
                round + 1,
                chunk.len(),
                rows.len()
            );
            found.extend(rows);
        }
        Ok(found)
    }

    async fn batch_delete(&self, ids: &[String]) -> Result<BatchDeleteOutcome> {
        let mut outcome = BatchDeleteOutcome::default();
        for chunk in batch_rounds(ids, self.batch_write_limit) {
            let deleted: Vec<String> =
                sqlx::query_scalar("DELETE FROM files WHERE id = ANY($1) RETURNING id")
                    .bind(&chunk)
                    .fetch_all(&self.pool)
                    .await?;

            outcome.rounds += 1;
            for id in chunk {
                if deleted.contains(&id) {
                    outcome.deleted.push(id);
                } else {
                    outcome.not_found.push(id);
                }
            }
        }

        debug!(
            "Batch delete: {} deleted, {} absent, {} rounds",
            outcome.deleted.len(),
            outcome.not_found.len(),
            outcome.rounds
        );
        Ok(outcome)
    }

    async fn query_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT * FROM files
            WHERE created_at BETWEEN $1 AND $2
            ORDER BY created_at, id
            LIMIT $3
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::files::models::FileStatus;
    use futures::future::join_all;
    use std::sync::Arc;

    fn store(pool: PgPool) -> PgMetadataStore {
        PgMetadataStore::new(pool, &MetadataConfig::default())
    }

    fn new_record(id: &str, name: &str, size: i64) -> NewFileRecord {
        NewFileRecord {
            id: id.to_string(),
            name: name.to_string(),
            size,
            content_type: "text/plain".to_string(),
            status: FileStatus::Active,
            s3_key: id.to_string(),
            description: None,
            tags: vec!["docs".to_string()],
        }
    }

    fn rename(name: &str) -> FilePatch {
        FilePatch {
            name: Some(name.to_string()),
            ..FilePatch::default()
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_create_then_get_returns_version_one(pool: PgPool) {
        let store = store(pool);

        let created = store.create(new_record("a", "x.txt", 10)).await.unwrap();

        assert_eq!(created.version, 1);
        assert_eq!(created.status, FileStatus::Active);
        assert_eq!(created.created_at, created.updated_at);
        assert_eq!(created.tags, vec!["docs".to_string()]);
        assert_eq!(store.get("a").await.unwrap(), Some(created));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_duplicate_create_is_rejected_without_change(pool: PgPool) {
        let store = store(pool);
        let first = store.create(new_record("a", "x.txt", 10)).await.unwrap();

        let err = store
            .create(new_record("a", "other.txt", 99))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::AlreadyExists(_)));
        assert_eq!(store.get("a").await.unwrap(), Some(first));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_versioned_update_scenario(pool: PgPool) {
        let store = store(pool);
        let created = store.create(new_record("a", "x.txt", 10)).await.unwrap();

        let updated = store.update("a", &rename("y.txt"), Some(1)).await.unwrap();
        assert_eq!(updated.name, "y.txt");
        assert_eq!(updated.version, 2);
        assert_eq!(updated.size, 10);
        assert_eq!(updated.created_at, created.created_at);

        let err = store
            .update("a", &rename("z.txt"), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConcurrentModification(_)));

        let current = store.get("a").await.unwrap().unwrap();
        assert_eq!(current.name, "y.txt");
        assert_eq!(current.version, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_update_clears_description_and_resolves_version(pool: PgPool) {
        let store = store(pool);
        store.create(new_record("a", "x.txt", 10)).await.unwrap();
        let described = FilePatch {
            description: Some(Some("quarterly".to_string())),
            ..FilePatch::default()
        };
        store.update("a", &described, None).await.unwrap();

        let cleared = FilePatch {
            description: Some(None),
            ..FilePatch::default()
        };
        let updated = store.update("a", &cleared, None).await.unwrap();

        assert_eq!(updated.description, None);
        assert_eq!(updated.name, "x.txt");
        assert_eq!(updated.version, 3);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_update_missing_is_not_found(pool: PgPool) {
        let store = store(pool);

        let with_version = store.update("missing", &rename("a"), Some(1)).await;
        let without_version = store.update("missing", &rename("a"), None).await;

        assert!(matches!(with_version, Err(AppError::NotFound(_))));
        assert!(matches!(without_version, Err(AppError::NotFound(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_concurrent_updates_from_same_version_have_one_winner(pool: PgPool) {
        let store = Arc::new(store(pool));
        store.create(new_record("a", "x.txt", 10)).await.unwrap();

        let tasks = (0..8).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .update("a", &rename(&format!("racer-{}.txt", i)), Some(1))
                    .await
            })
        });
        let outcomes: Vec<_> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let winners = outcomes.iter().filter(|o| o.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|o| matches!(o, Err(AppError::ConcurrentModification(_))))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(store.get("a").await.unwrap().unwrap().version, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_delete_missing_is_not_found(pool: PgPool) {
        let store = store(pool);
        store.create(new_record("a", "x.txt", 10)).await.unwrap();

        let err = store.delete("missing").await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.get("a").await.unwrap().is_some());
        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_list_skips_inactive_and_pages_to_the_end(pool: PgPool) {
        let store = store(pool);
        for id in ["a", "b", "c", "d", "e"] {
            store.create(new_record(id, "f.txt", 1)).await.unwrap();
        }
        let tombstone = FilePatch::status(FileStatus::DeletedPending);
        store.update("c", &tombstone, None).await.unwrap();

        let mut seen = Vec::new();
        let mut cursor: Option<ListCursor> = None;
        loop {
            let page = store.list(2, cursor.as_ref()).await.unwrap();
            assert!(page.items.len() <= 2);
            assert!(page.items.iter().all(|r| r.is_active()));
            seen.extend(page.items.into_iter().map(|r| r.id));
            match page.next_cursor {
                Some(next) => cursor = Some(ListCursor::decode(&next.encode()).unwrap()),
                None => break,
            }
        }

        seen.sort();
        assert_eq!(seen, vec!["a", "b", "d", "e"]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_batch_get_spans_rounds_and_omits_missing(pool: PgPool) {
        let config = MetadataConfig {
            batch_get_limit: 2,
            ..MetadataConfig::default()
        };
        let store = PgMetadataStore::new(pool, &config);
        for id in ["a", "b", "c"] {
            store.create(new_record(id, "f.txt", 1)).await.unwrap();
        }
        let ids: Vec<String> = ["a", "missing", "b", "a", "c"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut found: Vec<String> = store
            .batch_get(&ids)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        found.sort();
        assert_eq!(found, vec!["a", "b", "c"]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_batch_delete_of_thirty_takes_two_rounds(pool: PgPool) {
        let store = store(pool);
        let ids: Vec<String> = (0..30).map(|i| format!("f{:02}", i)).collect();
        for id in &ids {
            store.create(new_record(id, "f.txt", 1)).await.unwrap();
        }

        let outcome = store.batch_delete(&ids).await.unwrap();

        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.deleted.len(), 30);
        assert!(outcome.not_found.is_empty());
        assert!(store.batch_get(&ids).await.unwrap().is_empty());

        let again = store.batch_delete(&ids).await.unwrap();
        assert!(again.deleted.is_empty());
        assert_eq!(again.not_found.len(), 30);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_query_by_date_range_is_inclusive_and_ordered(pool: PgPool) {
        let store = store(pool);
        let a = store.create(new_record("a", "f.txt", 1)).await.unwrap();
        let b = store.create(new_record("b", "f.txt", 1)).await.unwrap();

        let both = store
            .query_by_date_range(a.created_at, b.created_at, 10)
            .await
            .unwrap();
        let limited = store
            .query_by_date_range(a.created_at, b.created_at, 1)
            .await
            .unwrap();

        assert_eq!(both, vec![a.clone(), b]);
        assert_eq!(limited, vec![a]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_verify_schema_requires_created_at_index(pool: PgPool) {
        let store = store(pool.clone());
        store.verify_schema().await.unwrap();

        sqlx::query("DROP INDEX files_created_at_idx")
            .execute(&pool)
            .await
            .unwrap();

        let err = store.verify_schema().await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
