// Local filesystem storage backend.
//
// Keys map to paths under the base directory; keys that would escape it
// are rejected.

use super::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::{Error, ErrorKind, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing as log;

/// Filesystem storage backend.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Resolve a storage key to a path under the base directory.
    /// Keys with parent-dir or absolute components are invalid.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if key.is_empty() || !safe {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("invalid storage key: {key}"),
            ));
        }
        Ok(self.base_path.join(rel))
    }
}

#[async_trait]
impl ObjectStore for FileStore {
    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let size = data.len();
        fs::write(&path, data).await?;
        log::trace!("Wrote: {:?} ({} bytes)", path, size);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Bytes> {
        let path = self.resolve(key)?;
        let data = fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        fs::try_exists(&path).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}
