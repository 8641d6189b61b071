//! In-process metadata store, for local development and tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use super::{
    batch_rounds, BatchDeleteOutcome, ConditionalWrite, FilePage, ListCursor, MetadataStore,
};
use crate::core::config::MetadataConfig;
use crate::core::error::{AppError, Result};
use crate::features::files::models::{FilePatch, FileRecord, NewFileRecord};

/// Metadata store over a sorted map.
///
/// The lock is only ever held inside a single synchronous section, so each
/// operation is atomic the same way a conditional write is on the real
/// backend.
#[derive(Debug)]
pub struct MemoryMetadataStore {
    records: Mutex<BTreeMap<String, FileRecord>>,
    batch_get_limit: usize,
    #[allow(dead_code)]
    batch_write_limit: usize,
}

impl MemoryMetadataStore {
    pub fn new(config: &MetadataConfig) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            batch_get_limit: config.batch_get_limit,
            batch_write_limit: config.batch_write_limit,
        }
    }

    fn records(&self) -> Result<MutexGuard<'_, BTreeMap<String, FileRecord>>> {
        self.records
            .lock()
            .map_err(|_| AppError::Internal("metadata store lock poisoned".to_string()))
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new(&MetadataConfig::default())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn create(&self, record: NewFileRecord) -> Result<FileRecord> {
        let mut records = self.records()?;
        if records.contains_key(&record.id) {
            return Err(AppError::AlreadyExists(format!(
                "File with id {} already exists",
                record.id
            )));
        }

        let stored = record.into_record(Utc::now());
        records.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<FileRecord>> {
        Ok(self.records()?.get(id).cloned())
    }

    async fn write_if_version(
        &self,
        id: &str,
        patch: &FilePatch,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<ConditionalWrite> {
        let mut records = self.records()?;
        let Some(record) = records.get_mut(id) else {
            return Ok(ConditionalWrite::Missing);
        };

        if record.version != expected_version {
            return Ok(ConditionalWrite::VersionMismatch {
                current: record.version,
            });
        }

        patch.apply_to(record);
        record.version += 1;
        record.updated_at = now;
        Ok(ConditionalWrite::Written(record.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("File with id {} not found", id)))
    }

    async fn list(&self, limit: i64, cursor: Option<&ListCursor>) -> Result<FilePage> {
        let limit = limit.max(1) as usize;
        let records = self.records()?;

        let lower = match cursor {
            Some(c) => Bound::Excluded(c.last_id().to_string()),
            None => Bound::Unbounded,
        };

        let mut items: Vec<FileRecord> = records
            .range((lower, Bound::Unbounded))
            .map(|(_, record)| record)
            .filter(|record| record.is_active())
            .take(limit + 1)
            .cloned()
            .collect();

        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|last| ListCursor::after(last.id.clone()))
        } else {
            None
        };

        Ok(FilePage { items, next_cursor })
    }

    async fn batch_get(&self, ids: &[String]) -> Result<Vec<FileRecord>> {
        let mut found = Vec::new();
        for round in batch_rounds(ids, self.batch_get_limit) {
            let records = self.records()?;
            found.extend(round.iter().filter_map(|id| records.get(id).cloned()));
        }
        Ok(found)
    }

    async fn batch_delete(&self, ids: &[String]) -> Result<BatchDeleteOutcome> {
        let mut outcome = BatchDeleteOutcome::default();
        for round in batch_rounds(ids, self.batch_write_limit) {
            let mut records = self.records()?;
            for id in round {
                if records.remove(&id).is_some() {
                    outcome.deleted.push(id);
                } else {
                    outcome.not_found.push(id);
                }
            }
            outcome.rounds += 1;
        }
        Ok(outcome)
    }

    async fn query_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FileRecord>> {
        let mut matching: Vec<FileRecord> = self
            .records()?
            .values()
            .filter(|r| r.created_at >= start && r.created_at <= end)
            .cloned()
            .collect();

        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}
