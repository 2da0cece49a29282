// In-memory storage backend.
//
// The default node store, and the store the multipart responder reads
// rendition payloads back from. Data is lost on restart.

use super::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::io::{Error, ErrorKind, Result};
use std::sync::Arc;
use tracing as log;

/// In-memory storage backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<DashMap<String, Bytes>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }

    /// Number of stored keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.data.len()
    }

    /// Current memory usage in bytes.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.data.iter().map(|entry| entry.value().len()).sum()
    }

    /// Drop all data.
    pub fn clear(&self) {
        self.data.clear();
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        log::trace!("Wrote to memory: {} ({} bytes)", key, data.len());
        self.data.insert(key.to_string(), data);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Bytes> {
        match self.data.get(key) {
            Some(entry) => Ok(entry.value().clone()),
            None => Err(Error::new(
                ErrorKind::NotFound,
                format!("key not found: {key}"),
            )),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }
}
