//! Temp-file primitives for in-progress downloads.
//!
//! [`TempFiles`] allocates unique paths in a scratch directory. A [`TempFile`]
//! deletes its path when dropped unless ownership was handed off with
//! [`TempFile::into_path`], which is how every failure path of a fetch cleans
//! up after itself.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// Scratch directory for ciphertext that has not been decrypted yet.
#[derive(Clone, Debug)]
pub struct TempFiles {
    dir: PathBuf,
}

impl TempFiles {
    pub async fn new(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create temp directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Allocate a fresh, not-yet-created path inside the scratch directory.
    pub fn allocate(&self) -> TempFile {
        TempFile {
            path: Some(self.dir.join(format!("{}.download", Uuid::new_v4()))),
        }
    }

    /// Whether `path` lives directly inside the scratch directory.
    pub fn owns(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
    }
}

/// Remove `path` if it exists.
pub async fn delete_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::DeleteFailed(format!(
            "Failed to delete {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Size of the file at `path`, `NotFound` if there is none.
pub async fn file_size(path: &Path) -> StorageResult<u64> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(StorageError::NotFound(path.display().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(StorageError::NotFound(path.display().to_string()))
        }
        Err(e) => Err(StorageError::IoError(e)),
    }
}

/// A scratch file that is deleted on drop unless handed off.
#[derive(Debug)]
pub struct TempFile {
    path: Option<PathBuf>,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Hand the file off to the caller, who becomes responsible for deleting it.
    pub fn into_path(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Deleted temp file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete temp file")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn dropped_temp_file_is_deleted() {
        let dir = tempdir().unwrap();
        let temp = TempFiles::new(dir.path()).await.unwrap();

        let file = temp.allocate();
        let path = file.path().to_path_buf();
        fs::write(&path, b"ciphertext").await.unwrap();
        assert!(path.exists());

        drop(file);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn handed_off_temp_file_survives() {
        let dir = tempdir().unwrap();
        let temp = TempFiles::new(dir.path()).await.unwrap();

        let file = temp.allocate();
        fs::write(file.path(), b"ciphertext").await.unwrap();

        let path = file.into_path();
        assert!(path.exists());
        assert!(temp.owns(&path));
        assert_eq!(file_size(&path).await.unwrap(), 10);

        delete_if_exists(&path).await.unwrap();
        delete_if_exists(&path).await.unwrap();
        assert!(matches!(file_size(&path).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn allocated_paths_are_unique() {
        let dir = tempdir().unwrap();
        let temp = TempFiles::new(dir.path()).await.unwrap();

        let a = temp.allocate();
        let b = temp.allocate();
        assert_ne!(a.path(), b.path());
    }
}
