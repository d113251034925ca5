mod naming;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub use self::naming::{is_safe_name, unique_name};

/// Largest accepted post thumbnail, in bytes.
pub const THUMBNAIL_MAX_BYTES: usize = 4_000_000;
/// Largest accepted avatar, in bytes.
pub const AVATAR_MAX_BYTES: usize = 2_500_000;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("File is {size} bytes, limit is {limit}")]
    SizeExceeded { size: usize, limit: usize },

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat directory of uploaded files, addressed by generated name.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under a fresh unique name derived from `original_name`.
    pub async fn store(
        &self,
        bytes: &[u8],
        original_name: &str,
        max_size: usize,
    ) -> Result<String, BlobError> {
        check_size(bytes.len(), max_size)?;

        let name = unique_name(original_name);
        if !is_safe_name(&name) {
            return Err(BlobError::InvalidName(original_name.to_string()));
        }

        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(&name), bytes).await?;
        tracing::debug!(blob = %name, size = bytes.len(), "Stored blob");
        Ok(name)
    }

    pub async fn remove(&self, name: &str) -> Result<(), BlobError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(blob = %name, "Removed blob");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`remove`](Self::remove), but a blob that is already gone counts as removed.
    pub async fn remove_if_present(&self, name: &str) -> Result<(), BlobError> {
        match self.remove(name).await {
            Err(BlobError::NotFound(_)) => {
                tracing::warn!(blob = %name, "Blob already missing, nothing to remove");
                Ok(())
            }
            other => other,
        }
    }

    pub async fn exists(&self, name: &str) -> bool {
        match self.path_for(name) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, BlobError> {
        if !is_safe_name(name) {
            return Err(BlobError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

/// Reject payloads over `limit` bytes.
pub fn check_size(size: usize, limit: usize) -> Result<(), BlobError> {
    if size > limit {
        return Err(BlobError::SizeExceeded { size, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, BlobStore) {
        let tmp = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(tmp.path().join("uploads"));
        (tmp, blobs)
    }

    #[tokio::test]
    async fn store_writes_bytes_under_generated_name() {
        let (_tmp, blobs) = store();
        let name = blobs.store(b"png-bytes", "cat.png", 100).await.unwrap();

        assert!(name.starts_with("cat"));
        assert!(name.ends_with(".png"));
        let written = std::fs::read(blobs.root().join(&name)).unwrap();
        assert_eq!(written, b"png-bytes");
        assert!(blobs.exists(&name).await);
    }

    #[tokio::test]
    async fn store_rejects_oversized_payload_without_writing() {
        let (_tmp, blobs) = store();
        let err = blobs.store(&[0u8; 11], "cat.png", 10).await.unwrap_err();
        assert!(matches!(
            err,
            BlobError::SizeExceeded { size: 11, limit: 10 }
        ));
        assert!(!blobs.root().exists());
    }

    #[tokio::test]
    async fn store_accepts_payload_at_limit() {
        let (_tmp, blobs) = store();
        assert!(blobs.store(&[0u8; 10], "cat.png", 10).await.is_ok());
    }

    #[tokio::test]
    async fn remove_deletes_then_reports_not_found() {
        let (_tmp, blobs) = store();
        let name = blobs.store(b"x", "a.png", 10).await.unwrap();

        blobs.remove(&name).await.unwrap();
        assert!(!blobs.exists(&name).await);
        assert!(matches!(
            blobs.remove(&name).await,
            Err(BlobError::NotFound(_))
        ));
        assert!(blobs.remove_if_present(&name).await.is_ok());
    }

    #[tokio::test]
    async fn remove_refuses_paths_outside_root() {
        let (tmp, blobs) = store();
        let outside = tmp.path().join("secret.txt");
        std::fs::write(&outside, b"keep me").unwrap();

        let err = blobs.remove("../secret.txt").await.unwrap_err();
        assert!(matches!(err, BlobError::InvalidName(_)));
        assert!(outside.exists());
    }

    #[test]
    fn limits_match_upload_kinds() {
        assert!(check_size(THUMBNAIL_MAX_BYTES, THUMBNAIL_MAX_BYTES).is_ok());
        assert!(check_size(THUMBNAIL_MAX_BYTES + 1, THUMBNAIL_MAX_BYTES).is_err());
        assert!(check_size(AVATAR_MAX_BYTES + 1, AVATAR_MAX_BYTES).is_err());
    }
}
