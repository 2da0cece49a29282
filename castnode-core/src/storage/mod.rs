// Object storage abstraction for source and rendition payloads.
//
// Supports multiple backends:
// - MemoryStore: in-memory (default; also the per-session store the
//   multipart responder reads rendition payloads from)
// - FileStore: local filesystem
//
// Driver implementations stay behind the ObjectStore trait; everything above
// it only sees StoreSession key layouts.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use std::io::Result;
use std::sync::Arc;

/// Pluggable object store.
///
/// Pure key-value interface; key layout is owned by [`StoreSession`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write data under a key, overwriting any previous value.
    async fn write(&self, key: &str, data: Bytes) -> Result<()>;

    /// Read data by key. `NotFound` if the key was never written.
    async fn read(&self, key: &str) -> Result<Bytes>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Storage backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    File,
}

impl StorageBackend {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "memory" => Some(StorageBackend::Memory),
            "file" => Some(StorageBackend::File),
            _ => None,
        }
    }
}

/// A view of an object store scoped to one stream.
///
/// Live sessions prefix keys with the internal manifest identity; recording
/// sessions prefix with `<externalID>/<nodeID>`.
#[derive(Clone)]
pub struct StoreSession {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl std::fmt::Debug for StoreSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSession")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl StoreSession {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, manifest_id: &str) -> Self {
        Self {
            store,
            prefix: manifest_id.to_string(),
        }
    }

    /// Session for the recording store, which keys by the external identity
    /// and the node that ingested the stream.
    #[must_use]
    pub fn recording(store: Arc<dyn ObjectStore>, external_id: &str, node_id: &str) -> Self {
        Self {
            store,
            prefix: format!("{external_id}/{node_id}"),
        }
    }

    /// The underlying driver, for reads by absolute key (rendition URIs).
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Persist a source segment; returns the storage key.
    pub async fn save_source(&self, seq_no: u64, ext: &str, data: Bytes) -> Result<String> {
        let key = format!("{}/source/{}{}", self.prefix, seq_no, ext);
        self.store.write(&key, data).await?;
        Ok(key)
    }

    /// Persist one rendition of a segment; returns the storage key.
    pub async fn save_rendition(
        &self,
        profile_name: &str,
        seq_no: u64,
        ext: &str,
        data: Bytes,
    ) -> Result<String> {
        let key = format!("{}/{}/{}{}", self.prefix, profile_name, seq_no, ext);
        self.store.write(&key, data).await?;
        Ok(key)
    }
}

pub use file::FileStore;
pub use memory::MemoryStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_key_layout() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let session = StoreSession::new(store.clone(), "mani1");

        let key = session
            .save_source(3, ".ts", Bytes::from_static(b"abc"))
            .await
            .unwrap();
        assert_eq!(key, "mani1/source/3.ts");

        let key = session
            .save_rendition("P240p30fps16x9", 3, ".ts", Bytes::from_static(b"xyz"))
            .await
            .unwrap();
        assert_eq!(key, "mani1/P240p30fps16x9/3.ts");

        assert_eq!(store.read("mani1/source/3.ts").await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_recording_session_key_layout() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let session = StoreSession::recording(store.clone(), "ext1", "node-a");

        let key = session
            .save_source(0, ".mp4", Bytes::from_static(b"abc"))
            .await
            .unwrap();
        assert_eq!(key, "ext1/node-a/source/0.mp4");
        let key = session
            .save_rendition("P144p30fps16x9", 0, ".mp4", Bytes::from_static(b"r"))
            .await
            .unwrap();
        assert_eq!(key, "ext1/node-a/P144p30fps16x9/0.mp4");
    }
}
