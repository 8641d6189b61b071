//! MinIO/S3-compatible storage client
//!
//! Objects are private; downloads go through presigned GET URLs.
//! Uses rust-s3 crate for lightweight S3 operations.

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, BucketConfiguration, Region};
use tracing::{debug, info, warn};

use super::BlobStore;
use crate::core::config::StorageConfig;
use crate::core::error::{AppError, Result};

/// MinIO/S3-compatible storage client
pub struct MinIOClient {
    bucket: Box<Bucket>,
    region: Region,
    credentials: Credentials,
    endpoint: String,
}

impl MinIOClient {
    /// Create a new MinIO client from configuration and make sure the
    /// bucket exists
    pub async fn new(config: StorageConfig) -> Result<Self> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| AppError::Internal(format!("Failed to create MinIO credentials: {}", e)))?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };

        let mut bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(|e| AppError::Internal(format!("Failed to create MinIO bucket: {}", e)))?;

        // Use path-style URLs for MinIO (http://endpoint/bucket instead of http://bucket.endpoint)
        bucket.set_path_style();

        let client = Self {
            bucket,
            region,
            credentials,
            endpoint: config.endpoint,
        };

        client.ensure_bucket_exists().await?;

        info!(
            "MinIO client initialized for endpoint: {}, bucket: {}",
            client.endpoint,
            client.bucket.name()
        );

        Ok(client)
    }

    /// Ensure the bucket exists, create if not
    async fn ensure_bucket_exists(&self) -> Result<()> {
        match self.create_bucket().await {
            Ok(_) => {
                info!("Bucket '{}' created successfully", self.bucket.name());
                Ok(())
            }
            Err(e) => {
                let error_str = e.to_string();
                if error_str.contains("BucketAlreadyOwnedByYou")
                    || error_str.contains("BucketAlreadyExists")
                    || error_str.contains("already own it")
                {
                    debug!("Bucket '{}' already exists", self.bucket.name());
                } else {
                    // Bucket may exist under a different error; first put will tell
                    warn!(
                        "Could not create bucket '{}': {}. Assuming it exists.",
                        self.bucket.name(),
                        e
                    );
                }
                Ok(())
            }
        }
    }

    async fn create_bucket(&self) -> Result<()> {
        Bucket::create_with_path_style(
            &self.bucket.name(),
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await
        .map_err(|e| {
            AppError::Internal(format!(
                "Failed to create bucket '{}': {}",
                self.bucket.name(),
                e
            ))
        })?;

        Ok(())
    }

    /// Get the bucket name
    pub fn bucket_name(&self) -> String {
        self.bucket.name()
    }
}

fn is_not_found(status: u16) -> bool {
    status == 404
}

fn is_not_found_error(e: &s3::error::S3Error) -> bool {
    let error_str = e.to_string();
    error_str.contains("404") || error_str.contains("NoSuchKey")
}

/// Object size from a HEAD response; a missing or negative length is an upstream fault
fn reported_size(key: &str, content_length: Option<i64>) -> Result<u64> {
    content_length
        .and_then(|length| u64::try_from(length).ok())
        .ok_or_else(|| {
            AppError::UpstreamUnavailable(format!(
                "Head of '{}' returned no usable Content-Length",
                key
            ))
        })
}

#[async_trait]
impl BlobStore for MinIOClient {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<u64> {
        let size = data.len() as u64;
        let response = self
            .bucket
            .put_object_with_content_type(key, &data, content_type)
            .await
            .map_err(|e| {
                AppError::UpstreamUnavailable(format!("Failed to upload file '{}': {}", key, e))
            })?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(AppError::UpstreamUnavailable(format!(
                "Upload of '{}' rejected with status {}",
                key, status
            )));
        }

        debug!("Uploaded file '{}' to bucket '{}'", key, self.bucket.name());
        Ok(size)
    }

    async fn head(&self, key: &str) -> Result<Option<u64>> {
        match self.bucket.head_object(key).await {
            Ok((_, status)) if is_not_found(status) => Ok(None),
            Ok((head, status)) if (200..300).contains(&status) => {
                reported_size(key, head.content_length).map(Some)
            }
            Ok((_, status)) => Err(AppError::UpstreamUnavailable(format!(
                "Head of '{}' failed with status {}",
                key, status
            ))),
            Err(e) if is_not_found_error(&e) => Ok(None),
            Err(e) => Err(AppError::UpstreamUnavailable(format!(
                "Failed to check file '{}': {}",
                key, e
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        // S3 deletes succeed for missing keys, so check first to report absence
        if self.head(key).await?.is_none() {
            return Ok(false);
        }

        let response = self.bucket.delete_object(key).await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Failed to delete file '{}': {}", key, e))
        })?;

        let status = response.status_code();
        if !(200..300).contains(&status) && !is_not_found(status) {
            return Err(AppError::UpstreamUnavailable(format!(
                "Delete of '{}' failed with status {}",
                key, status
            )));
        }

        debug!(
            "Deleted file '{}' from bucket '{}'",
            key,
            self.bucket.name()
        );
        Ok(true)
    }

    async fn presign_get(&self, key: &str, ttl_secs: u32) -> Result<String> {
        self.bucket
            .presign_get(key, ttl_secs, None)
            .await
            .map_err(|e| {
                AppError::UpstreamUnavailable(format!(
                    "Failed to generate presigned URL for '{}': {}",
                    key, e
                ))
            })
    }
}
