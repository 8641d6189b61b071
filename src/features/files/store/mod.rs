//! Versioned metadata store for file records
//!
//! Every mutation is a conditional write keyed on the record's `version`.
//! Backends only provide the primitive conditional operations; the
//! read-then-conditional-write protocol lives in [`MetadataStore::update`]
//! so all backends share it.

mod cursor;
mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::error::{AppError, Result};
use crate::features::files::models::{FilePatch, FileRecord, NewFileRecord};

pub use cursor::ListCursor;
pub use memory::MemoryMetadataStore;
pub use postgres::PgMetadataStore;

/// One page of a scan over active records
#[derive(Debug, Clone, PartialEq)]
pub struct FilePage {
    pub items: Vec<FileRecord>,
    /// Present when more active records may follow
    pub next_cursor: Option<ListCursor>,
}

/// Result of a chunked batch delete
#[allow(dead_code)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchDeleteOutcome {
    pub deleted: Vec<String>,
    /// Ids that had no record; batch deletes are idempotent so this is not an error
    pub not_found: Vec<String>,
    /// Number of write rounds issued against the backend
    pub rounds: usize,
}

/// Outcome of a single conditional write
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalWrite {
    Written(FileRecord),
    /// The record exists but its version no longer matches
    VersionMismatch { current: i64 },
    Missing,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new record with `version = 1`.
    ///
    /// The existence check and the write are one atomic operation; a
    /// duplicate id fails with `AlreadyExists` and leaves the stored record
    /// untouched.
    async fn create(&self, record: NewFileRecord) -> Result<FileRecord>;

    /// Strongly consistent read. Absence is `Ok(None)`, never an error.
    async fn get(&self, id: &str) -> Result<Option<FileRecord>>;

    /// Apply `patch` only if the stored version equals `expected_version`,
    /// bumping the version by one and stamping `updated_at = now`.
    async fn write_if_version(
        &self,
        id: &str,
        patch: &FilePatch,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<ConditionalWrite>;

    /// Physically remove a record; `NotFound` if absent
    async fn delete(&self, id: &str) -> Result<()>;

    /// Scan active records. Order across pages is not guaranteed.
    async fn list(&self, limit: i64, cursor: Option<&ListCursor>) -> Result<FilePage>;

    /// Fetch many records, issuing one read per `batch_get_limit` ids.
    /// Ids with no record are omitted from the result.
    async fn batch_get(&self, ids: &[String]) -> Result<Vec<FileRecord>>;

    /// Delete many records, issuing one write per `batch_write_limit` ids
    #[allow(dead_code)]
    async fn batch_delete(&self, ids: &[String]) -> Result<BatchDeleteOutcome>;

    /// Records with `start <= created_at <= end`, oldest first
    async fn query_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FileRecord>>;

    /// Versioned update.
    ///
    /// With `expected_version = None` the current version is read first and
    /// used as the write precondition. If another writer lands between that
    /// read and the write, this fails with `ConcurrentModification`; retrying
    /// is left to the caller.
    async fn update(
        &self,
        id: &str,
        patch: &FilePatch,
        expected_version: Option<i64>,
    ) -> Result<FileRecord> {
        let expected = match expected_version {
            Some(version) => version,
            None => {
                self.get(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?
                    .version
            }
        };

        match self.write_if_version(id, patch, expected, Utc::now()).await? {
            ConditionalWrite::Written(record) => {
                tracing::debug!("Updated file {} to version {}", id, record.version);
                Ok(record)
            }
            ConditionalWrite::VersionMismatch { current } => {
                Err(AppError::ConcurrentModification(format!(
                    "File {} changed concurrently (expected version {}, found {}); re-read and retry",
                    id, expected, current
                )))
            }
            ConditionalWrite::Missing => Err(AppError::NotFound(format!("File {} not found", id))),
        }
    }
}

/// Split `ids` into backend-sized rounds, dropping repeated ids
pub fn batch_rounds(ids: &[String], limit: usize) -> Vec<Vec<String>> {
    let mut seen = std::collections::HashSet::new();
    let unique: Vec<String> = ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();

    unique
        .chunks(limit.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}
