use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::features::files::models::{FileRecord, FileStatus};

/// Upload file request DTO for OpenAPI documentation
/// Note: This struct is for Swagger UI documentation only.
/// The actual handler uses axum's Multipart extractor directly.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadFileDto {
    /// The file to upload
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
}

/// Response DTO for file metadata
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileResponseDto {
    /// Unique identifier for the file
    pub id: String,
    /// Display filename
    pub name: String,
    /// Size of the stored blob in bytes
    pub size: i64,
    /// MIME type of the file
    pub content_type: String,
    pub status: FileStatus,
    /// Key of the payload in the blob store
    pub s3_key: String,
    /// Version to send back as `version` for a conditional update
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl From<FileRecord> for FileResponseDto {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            size: record.size,
            content_type: record.content_type,
            status: record.status,
            s3_key: record.s3_key,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
            description: record.description,
            tags: record.tags,
        }
    }
}

/// Metadata plus a time-limited download link
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileDetailDto {
    pub metadata: FileResponseDto,
    /// Presigned URL; absent for records that are being deleted
    pub download_url: Option<String>,
    /// Seconds the download link stays valid
    pub expires_in: Option<u32>,
}

/// Update request. Only `name`, `description` and `tags` are applied; any
/// other field is ignored.
/// Note: This struct is for Swagger UI documentation only.
/// The handler reads the raw JSON object.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UpdateFileDto {
    #[schema(example = "report-final.pdf")]
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Expected current version; when omitted the latest version is used
    pub version: Option<i64>,
}

/// Query parameters for listing files
#[derive(Debug, Deserialize, Validate, IntoParams)]
pub struct ListFilesQuery {
    /// Page size (default 100, max 1000)
    #[validate(range(min = 1, max = 1000, message = "limit must be between 1 and 1000"))]
    #[param(minimum = 1, maximum = 1000)]
    pub limit: Option<i64>,
    /// Opaque cursor from a previous page's `meta.next_cursor`
    pub cursor: Option<String>,
}

/// Query parameters for the created-at range search
#[derive(Debug, Deserialize, Validate, IntoParams)]
pub struct DateRangeQuery {
    /// Inclusive lower bound (RFC 3339)
    pub start: DateTime<Utc>,
    /// Inclusive upper bound (RFC 3339)
    pub end: DateTime<Utc>,
    #[validate(range(min = 1, max = 1000, message = "limit must be between 1 and 1000"))]
    #[param(minimum = 1, maximum = 1000)]
    pub limit: Option<i64>,
}

/// Request DTO for looking up many files at once
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BatchGetFilesDto {
    #[validate(length(min = 1, max = 1000, message = "ids must contain 1 to 1000 entries"))]
    pub ids: Vec<String>,
}

/// One entry of a batch request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatchOperationDto {
    /// Operation type; only `delete` is supported
    #[serde(rename = "type")]
    #[schema(example = "delete")]
    pub op_type: Option<String>,
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BatchItemStatus {
    Success,
    Failed,
    Unsupported,
}

/// Outcome of one batch entry
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchOperationResultDto {
    pub file_id: Option<String>,
    pub operation: Option<String>,
    pub status: BatchItemStatus,
    /// Failure reason when `status` is `failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchResultsDto {
    pub results: Vec<BatchOperationResultDto>,
}

/// Response DTO for delete operations
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteFileResponseDto {
    pub file_id: String,
    pub deleted: bool,
}
