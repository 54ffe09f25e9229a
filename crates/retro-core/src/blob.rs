//! Blob store boundary for note images.
//!
//! Upload by path returns a [`BlobRef`]; a fetchable URL is derived from it
//! with [`BlobStore::download_url`]. Deletion goes by URL.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};

/// Reference to an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub path: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload bytes under `path`, replacing any previous content.
    async fn upload(&self, path: &str, data: Vec<u8>) -> Result<BlobRef>;

    /// Derive the fetchable URL of an uploaded blob.
    async fn download_url(&self, blob: &BlobRef) -> Result<String>;

    /// Delete the blob a URL points at.
    async fn delete_by_url(&self, url: &str) -> Result<()>;
}

/// Reject absolute paths and parent traversal.
fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::validation("blob path cannot be empty"));
    }
    let ok = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !ok {
        return Err(Error::validation(format!("invalid blob path: {}", path)));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

const MEMORY_SCHEME: &str = "mem://";

/// Blob store kept in memory, with `mem://<path>` URLs.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    deletes: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.blobs
            .lock()
            .map(|b| b.contains_key(path))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of delete calls received, successful or not.
    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, data: Vec<u8>) -> Result<BlobRef> {
        validate_path(path)?;
        let mut blobs = self.blobs.lock().map_err(|_| Error::LockPoisoned)?;
        blobs.insert(path.to_string(), data);
        Ok(BlobRef { path: path.to_string() })
    }

    async fn download_url(&self, blob: &BlobRef) -> Result<String> {
        Ok(format!("{}{}", MEMORY_SCHEME, blob.path))
    }

    async fn delete_by_url(&self, url: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);

        let path = url
            .strip_prefix(MEMORY_SCHEME)
            .ok_or_else(|| Error::blob(format!("not a memory blob url: {}", url)))?;

        let mut blobs = self.blobs.lock().map_err(|_| Error::LockPoisoned)?;
        blobs
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::blob(format!("no blob at {}", url)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Local directory store
// ─────────────────────────────────────────────────────────────────────────────

const FILE_SCHEME: &str = "file://";

/// Blob store rooted at a local directory, with `file://` URLs.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a URL back to a file under the root.
    fn path_for_url(&self, url: &str) -> Result<PathBuf> {
        let path = url
            .strip_prefix(FILE_SCHEME)
            .map(PathBuf::from)
            .ok_or_else(|| Error::blob(format!("not a file url: {}", url)))?;

        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| Error::blob(format!("url outside blob root: {}", url)))?;
        validate_path(&relative.to_string_lossy())?;

        Ok(path)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, path: &str, data: Vec<u8>) -> Result<BlobRef> {
        validate_path(path)?;
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, data).await?;
        debug!(path = %target.display(), "Blob uploaded");
        Ok(BlobRef { path: path.to_string() })
    }

    async fn download_url(&self, blob: &BlobRef) -> Result<String> {
        let absolute = if self.root.is_absolute() {
            self.root.join(&blob.path)
        } else {
            std::env::current_dir()?.join(&self.root).join(&blob.path)
        };
        Ok(format!("{}{}", FILE_SCHEME, absolute.display()))
    }

    async fn delete_by_url(&self, url: &str) -> Result<()> {
        let path = self.path_for_url(url)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Error::blob(format!("failed to delete {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Blob deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_memory_upload_and_delete() {
        let store = MemoryBlobStore::new();
        let blob = store.upload("images/n1/a.png", vec![1, 2, 3]).await.unwrap();
        let url = store.download_url(&blob).await.unwrap();
        assert_eq!(url, "mem://images/n1/a.png");
        assert!(store.contains("images/n1/a.png"));

        store.delete_by_url(&url).await.unwrap();
        assert!(store.is_empty());
        assert!(store.delete_by_url(&url).await.is_err());
        assert_eq!(store.delete_calls(), 2);
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let store = MemoryBlobStore::new();
        assert!(store.upload("../etc/passwd", vec![]).await.unwrap_err().is_validation());
        assert!(store.upload("/abs", vec![]).await.is_err());
        assert!(store.upload("", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let blob = store.upload("images/n1/a.png", b"png".to_vec()).await.unwrap();
        let url = store.download_url(&blob).await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(dir.path().join("images/n1/a.png").exists());

        store.delete_by_url(&url).await.unwrap();
        assert!(!dir.path().join("images/n1/a.png").exists());
    }

    #[tokio::test]
    async fn test_local_store_refuses_foreign_urls() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        assert!(store.delete_by_url("file:///etc/hosts").await.is_err());
        assert!(store.delete_by_url("mem://images/a.png").await.is_err());
    }
}
