use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::config::MetadataConfig;
use crate::core::error::{AppError, Result};
use crate::features::files::dtos::{
    BatchItemStatus, BatchOperationDto, BatchOperationResultDto, FileDetailDto,
};
use crate::features::files::models::{FilePatch, FileRecord, FileStatus, NewFileRecord};
use crate::features::files::store::{FilePage, ListCursor, MetadataStore};
use crate::modules::storage::BlobStore;

/// Deletes running at once inside one batch request
const BATCH_CONCURRENCY: usize = 4;

/// Service for file operations.
///
/// Keeps the blob store and the metadata store in agreement. Writes are
/// ordered so that a partial failure leaves an orphaned blob (harmless,
/// reclaimable) rather than a record pointing at a missing blob.
pub struct FileService {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    config: MetadataConfig,
    presigned_url_expiry_secs: u32,
}

impl FileService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        config: MetadataConfig,
        presigned_url_expiry_secs: u32,
    ) -> Self {
        Self {
            metadata,
            blobs,
            config,
            presigned_url_expiry_secs,
        }
    }

    async fn metadata_call<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        bounded(
            self.config.metadata_timeout,
            "Metadata store",
            operation,
            call,
        )
        .await
    }

    async fn blob_call<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        bounded(self.config.blob_timeout, "Blob store", operation, call).await
    }

    /// Store a new file: blob first, then its metadata record
    ///
    /// # Arguments
    /// * `data` - The file content as bytes
    /// * `filename` - Display name recorded in metadata
    /// * `content_type` - The MIME type of the file
    pub async fn upload_file(
        &self,
        data: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<FileRecord> {
        let file_id = Uuid::new_v4().to_string();
        let s3_key = file_id.clone();

        self.blob_call("put", self.blobs.put(&s3_key, data, content_type))
            .await?;
        debug!("File uploaded to blob store: {}", s3_key);

        // The blob store's own view of the size is authoritative
        let size = self
            .blob_call("head", self.blobs.head(&s3_key))
            .await?
            .ok_or_else(|| {
                warn!("Blob {} missing right after upload", s3_key);
                AppError::UpstreamUnavailable(format!(
                    "Blob store lost '{}' immediately after upload",
                    s3_key
                ))
            })?;
        let size = i64::try_from(size)
            .map_err(|_| AppError::Internal(format!("Blob size {} out of range", size)))?;

        let record = NewFileRecord {
            id: file_id.clone(),
            name: filename.to_string(),
            size,
            content_type: content_type.to_string(),
            status: FileStatus::Active,
            s3_key: s3_key.clone(),
            description: None,
            tags: Vec::new(),
        };

        let limit = self.config.metadata_timeout;
        let create = self.metadata.create(record);
        let created = match tokio::time::timeout(limit, create).await {
            Ok(Ok(created)) => created,
            Ok(Err(e)) => {
                warn!(
                    "Metadata create failed for {}; blob '{}' is orphaned: {}",
                    file_id, s3_key, e
                );
                return Err(e);
            }
            Err(_) => self.recover_timed_out_create(&file_id, &s3_key).await?,
        };

        info!(
            "File metadata saved: id={}, key={}, size={}",
            created.id, created.s3_key, created.size
        );
        Ok(created)
    }

    /// A create that timed out may still have landed; read back by id
    async fn recover_timed_out_create(&self, file_id: &str, s3_key: &str) -> Result<FileRecord> {
        warn!(
            "Metadata create for {} timed out; checking whether it landed",
            file_id
        );

        match self.metadata_call("get", self.metadata.get(file_id)).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                warn!(
                    "Create for {} did not land; blob '{}' is orphaned",
                    file_id, s3_key
                );
                Err(AppError::UpstreamUnavailable(format!(
                    "Metadata store timed out storing file {}",
                    file_id
                )))
            }
            Err(e) => {
                warn!(
                    "Outcome of create for {} unknown; blob '{}' may be orphaned: {}",
                    file_id, s3_key, e
                );
                Err(e)
            }
        }
    }

    /// Metadata plus a presigned download link
    pub async fn get_file(&self, file_id: &str) -> Result<FileDetailDto> {
        let record = self
            .metadata_call("get", self.metadata.get(file_id))
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

        // Tombstones stay readable but their blob may already be gone
        let (download_url, expires_in) = if record.is_active() {
            let url = self
                .blob_call(
                    "presign",
                    self.blobs
                        .presign_get(&record.s3_key, self.presigned_url_expiry_secs),
                )
                .await?;
            (Some(url), Some(self.presigned_url_expiry_secs))
        } else {
            (None, None)
        };

        Ok(FileDetailDto {
            metadata: record.into(),
            download_url,
            expires_in,
        })
    }

    /// Page through active files
    pub async fn list_files(&self, limit: Option<i64>, cursor: Option<&str>) -> Result<FilePage> {
        let limit = self.config.clamp_list_limit(limit);
        let cursor = cursor
            .filter(|c| !c.is_empty())
            .map(ListCursor::decode)
            .transpose()?;

        self.metadata_call("list", self.metadata.list(limit, cursor.as_ref()))
            .await
    }

    /// Apply a client patch restricted to the updatable fields.
    ///
    /// Without `expected_version` the latest version is resolved right before
    /// the write. A lost race surfaces as `ConcurrentModification`; this
    /// method does not retry.
    pub async fn update_file(
        &self,
        file_id: &str,
        raw_patch: &Map<String, Value>,
        expected_version: Option<i64>,
    ) -> Result<FileRecord> {
        let patch = FilePatch::from_allowed_fields(raw_patch)?;

        let updated = self
            .metadata_call(
                "update",
                self.metadata.update(file_id, &patch, expected_version),
            )
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::NotFound("File not found".to_string()),
                other => other,
            })?;

        info!(
            "File updated: id={}, version={}",
            updated.id, updated.version
        );
        Ok(updated)
    }

    /// Remove a file and its blob.
    ///
    /// Order: tombstone the record (`deleted_pending`, hidden from listings),
    /// delete the blob, then remove the record. A failure part way leaves a
    /// hidden tombstone; calling delete again resumes from it.
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let record = self
            .metadata_call("get", self.metadata.get(file_id))
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "File {} not found (existence check before delete)",
                    file_id
                ))
            })?;

        if record.is_active() {
            self.metadata_call(
                "tombstone",
                self.metadata.update(
                    file_id,
                    &FilePatch::status(FileStatus::DeletedPending),
                    Some(record.version),
                ),
            )
            .await?;
            debug!("File {} marked deleted_pending", file_id);
        } else {
            debug!("Resuming delete of tombstoned file {}", file_id);
        }

        let removed = self
            .blob_call("delete", self.blobs.delete(&record.s3_key))
            .await
            .inspect_err(|e| {
                warn!(
                    "Blob delete failed for {}; tombstone left in place: {}",
                    file_id, e
                )
            })?;
        if !removed {
            debug!("Blob '{}' was already absent", record.s3_key);
        }

        match self
            .metadata_call("delete", self.metadata.delete(file_id))
            .await
        {
            Ok(()) => {}
            // A concurrent delete finished first
            Err(AppError::NotFound(_)) => {
                debug!("Record {} already removed", file_id);
            }
            Err(e) => {
                warn!(
                    "Blob for {} removed but record delete failed; tombstone left: {}",
                    file_id, e
                );
                return Err(e);
            }
        }

        info!("File deleted: id={}, key={}", file_id, record.s3_key);
        Ok(())
    }

    /// Run independent per-item operations; one failure never blocks others
    pub async fn batch_operate(
        &self,
        operations: Vec<BatchOperationDto>,
    ) -> Vec<BatchOperationResultDto> {
        stream::iter(operations)
            .map(|op| self.run_batch_item(op))
            .buffered(BATCH_CONCURRENCY)
            .collect()
            .await
    }

    async fn run_batch_item(&self, op: BatchOperationDto) -> BatchOperationResultDto {
        let (status, error) = match (op.op_type.as_deref(), op.file_id.as_deref()) {
            (Some("delete"), Some(file_id)) => match self.delete_file(file_id).await {
                Ok(()) => (BatchItemStatus::Success, None),
                Err(e) => {
                    warn!(
                        "Batch delete of {} failed (retryable: {}): {}",
                        file_id,
                        e.is_retryable(),
                        e
                    );
                    (BatchItemStatus::Failed, Some(e.to_string()))
                }
            },
            (Some("delete"), None) => (
                BatchItemStatus::Failed,
                Some("file_id is required".to_string()),
            ),
            _ => (BatchItemStatus::Unsupported, None),
        };

        BatchOperationResultDto {
            file_id: op.file_id,
            operation: op.op_type,
            status,
            error,
        }
    }

    /// Metadata for many files; unknown ids are omitted
    pub async fn get_files(&self, ids: &[String]) -> Result<Vec<FileRecord>> {
        self.metadata_call("batch_get", self.metadata.batch_get(ids))
            .await
    }

    /// Files created within `[start, end]`, oldest first
    pub async fn query_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<i64>,
    ) -> Result<Vec<FileRecord>> {
        if start > end {
            return Err(AppError::Validation(
                "start must not be after end".to_string(),
            ));
        }

        let limit = self.config.clamp_list_limit(limit);
        self.metadata_call(
            "query_by_date_range",
            self.metadata.query_by_date_range(start, end, limit),
        )
        .await
    }
}

async fn bounded<T>(
    limit: Duration,
    store: &str,
    operation: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, call).await.map_err(|_| {
        AppError::UpstreamUnavailable(format!(
            "{} {} timed out after {}s",
            store,
            operation,
            limit.as_secs_f32()
        ))
    })?
}
