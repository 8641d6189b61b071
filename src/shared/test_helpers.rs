//! Store wrappers that inject failures and latency for service and handler tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::config::MetadataConfig;
use crate::core::error::{AppError, Result};
use crate::features::files::models::{FilePatch, FileRecord, NewFileRecord};
use crate::features::files::services::FileService;
use crate::features::files::store::{
    BatchDeleteOutcome, ConditionalWrite, FilePage, ListCursor, MemoryMetadataStore, MetadataStore,
};
use crate::modules::storage::{BlobStore, MemoryBlobStore};

/// File service over fresh in-memory stores
pub fn memory_file_service() -> Arc<FileService> {
    Arc::new(FileService::new(
        Arc::new(MemoryMetadataStore::default()),
        Arc::new(MemoryBlobStore::default()),
        MetadataConfig::default(),
        3600,
    ))
}

pub struct FlakyMetadataStore {
    pub inner: MemoryMetadataStore,
    pub fail_create: AtomicBool,
    /// Delay added after a create has already been applied
    pub create_delay_ms: AtomicU64,
    /// Bump the version of the next record read, after handing out the
    /// pre-bump copy, as if another writer got in right behind the read
    pub update_after_get: AtomicBool,
}

impl FlakyMetadataStore {
    pub fn new(inner: MemoryMetadataStore) -> Self {
        Self {
            inner,
            fail_create: AtomicBool::new(false),
            create_delay_ms: AtomicU64::new(0),
            update_after_get: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MetadataStore for FlakyMetadataStore {
    async fn create(&self, record: NewFileRecord) -> Result<FileRecord> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamUnavailable(
                "metadata store unreachable".to_string(),
            ));
        }
        let created = self.inner.create(record).await?;
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<Option<FileRecord>> {
        let record = self.inner.get(id).await?;
        if let Some(read) = &record {
            if self.update_after_get.swap(false, Ordering::SeqCst) {
                self.inner
                    .write_if_version(id, &FilePatch::default(), read.version, Utc::now())
                    .await?;
            }
        }
        Ok(record)
    }

    async fn write_if_version(
        &self,
        id: &str,
        patch: &FilePatch,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<ConditionalWrite> {
        self.inner
            .write_if_version(id, patch, expected_version, now)
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn list(&self, limit: i64, cursor: Option<&ListCursor>) -> Result<FilePage> {
        self.inner.list(limit, cursor).await
    }

    async fn batch_get(&self, ids: &[String]) -> Result<Vec<FileRecord>> {
        self.inner.batch_get(ids).await
    }

    async fn batch_delete(&self, ids: &[String]) -> Result<BatchDeleteOutcome> {
        self.inner.batch_delete(ids).await
    }

    async fn query_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FileRecord>> {
        self.inner.query_by_date_range(start, end, limit).await
    }
}

pub struct FlakyBlobStore {
    pub inner: MemoryBlobStore,
    pub fail_put: AtomicBool,
    pub fail_delete: AtomicBool,
    last_put: Mutex<Option<String>>,
}

impl FlakyBlobStore {
    pub fn new(inner: MemoryBlobStore) -> Self {
        Self {
            inner,
            fail_put: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            last_put: Mutex::new(None),
        }
    }

    /// Key of the most recent successful put
    pub fn last_put_key(&self) -> Option<String> {
        self.last_put.lock().ok().and_then(|k| k.clone())
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<u64> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamUnavailable(
                "blob store unreachable".to_string(),
            ));
        }
        let size = self.inner.put(key, data, content_type).await?;
        if let Ok(mut last) = self.last_put.lock() {
            *last = Some(key.to_string());
        }
        Ok(size)
    }

    async fn head(&self, key: &str) -> Result<Option<u64>> {
        self.inner.head(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamUnavailable(
                "blob store unreachable".to_string(),
            ));
        }
        self.inner.delete(key).await
    }

    async fn presign_get(&self, key: &str, ttl_secs: u32) -> Result<String> {
        self.inner.presign_get(key, ttl_secs).await
    }
}
