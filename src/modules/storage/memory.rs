//! In-memory BlobStore implementation

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::BlobStore;
use crate::core::error::{AppError, Result};
use crate::shared::constants::DEFAULT_CONTENT_TYPE;

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Vec<u8>,
    content_type: String,
}

/// In-memory blob store for local development and testing
#[derive(Debug)]
pub struct MemoryBlobStore {
    bucket: String,
    blobs: Mutex<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    fn blobs(&self) -> Result<MutexGuard<'_, HashMap<String, StoredBlob>>> {
        self.blobs
            .lock()
            .map_err(|_| AppError::Internal("blob store lock poisoned".to_string()))
    }

    /// Stored bytes and content type for `key`
    #[cfg(test)]
    pub fn contents(&self, key: &str) -> Result<Option<(Vec<u8>, String)>> {
        Ok(self
            .blobs()?
            .get(key)
            .map(|b| (b.data.clone(), b.content_type.clone())))
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<u64> {
        let size = data.len() as u64;
        self.blobs()?.insert(
            key.to_string(),
            StoredBlob {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(size)
    }

    async fn head(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.blobs()?.get(key).map(|b| b.data.len() as u64))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.blobs()?.remove(key).is_some())
    }

    async fn presign_get(&self, key: &str, ttl_secs: u32) -> Result<String> {
        let content_type = self
            .blobs()?
            .get(key)
            .map(|b| b.content_type.clone())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let expires = Utc::now().timestamp() + i64::from(ttl_secs);
        Ok(format!(
            "memory://{}/{}?response-content-type={}&expires={}",
            self.bucket,
            key,
            encode_query_value(&content_type),
            expires
        ))
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn encode_query_value(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}
