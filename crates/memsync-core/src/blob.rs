//! Blob sources - opaque asynchronous byte providers
//!
//! Blobs are fetched by identifier and never go through the replicated
//! store; the store only ever sees whatever the caller decides to insert.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Blob fetch errors
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Blob transport error: {0}")]
    Transport(String),
}

/// Provider of binary blobs
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Fetch the blob stored under an identifier
    async fn fetch_blob(&self, identifier: &str) -> Result<Bytes, BlobError>;
}

/// In-memory blob source
pub struct MemoryBlobSource {
    blobs: DashMap<String, Bytes>,
    total_size: AtomicUsize,
}

impl MemoryBlobSource {
    pub fn new() -> Self {
        Self {
            blobs: DashMap::new(),
            total_size: AtomicUsize::new(0),
        }
    }

    /// Register a blob, replacing any previous one with the same identifier
    pub fn put(&self, identifier: impl Into<String>, blob: impl Into<Bytes>) {
        let blob = blob.into();
        self.total_size.fetch_add(blob.len(), Ordering::Relaxed);
        if let Some(old) = self.blobs.insert(identifier.into(), blob) {
            self.total_size.fetch_sub(old.len(), Ordering::Relaxed);
        }
    }

    pub fn remove(&self, identifier: &str) -> bool {
        match self.blobs.remove(identifier) {
            Some((_, old)) => {
                self.total_size.fetch_sub(old.len(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Sum of all blob sizes in bytes
    pub fn total_size(&self) -> usize {
        self.total_size.load(Ordering::Relaxed)
    }
}

impl Default for MemoryBlobSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobSource for MemoryBlobSource {
    async fn fetch_blob(&self, identifier: &str) -> Result<Bytes, BlobError> {
        self.blobs
            .get(identifier)
            .map(|blob| blob.value().clone())
            .ok_or_else(|| BlobError::NotFound(identifier.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_registered_blob() {
        let source = MemoryBlobSource::new();
        source.put("flowers.jpg", vec![0xff, 0xd8, 0xff]);

        let blob = source.fetch_blob("flowers.jpg").await.unwrap();
        assert_eq!(blob.as_ref(), &[0xff, 0xd8, 0xff]);
    }

    #[tokio::test]
    async fn test_fetch_missing_blob() {
        let source = MemoryBlobSource::new();
        let err = source.fetch_blob("nope").await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_size_tracking() {
        let source = MemoryBlobSource::new();
        source.put("a", "1234");
        source.put("a", "12");
        source.put("b", "xyz");
        assert_eq!(source.len(), 2);
        assert_eq!(source.total_size(), 5);

        assert!(source.remove("a"));
        assert!(!source.remove("a"));
        assert_eq!(source.total_size(), 3);
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let source: Box<dyn BlobSource> = Box::new(MemoryBlobSource::new());
        assert!(source.fetch_blob("x").await.is_err());
    }
}
