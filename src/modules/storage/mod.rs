//! Storage module for file payloads
//!
//! [`BlobStore`] is the contract the file service consumes. The MinIO/S3
//! client backs it in deployment; [`MemoryBlobStore`] backs local runs and
//! tests.

mod memory;
mod minio_client;

use async_trait::async_trait;

use crate::core::error::Result;

pub use memory::MemoryBlobStore;
pub use minio_client::MinIOClient;

/// Opaque keyed binary storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key` and return the stored byte size
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<u64>;

    /// Authoritative size of the blob, or `None` if it does not exist
    async fn head(&self, key: &str) -> Result<Option<u64>>;

    /// Remove the blob. `Ok(false)` if there was nothing to remove.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Time-limited download link for the blob
    async fn presign_get(&self, key: &str, ttl_secs: u32) -> Result<String>;
}
