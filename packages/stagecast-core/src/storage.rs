//! Blob storage for host-uploaded audio (§4.6).
//!
//! "Put bytes, get a URL that serves them." The default implementation is a
//! flat directory on the local filesystem; writes land through a temp file +
//! rename so a crash mid-write never leaves a half-written upload behind,
//! the same atomic-write discipline the original speaker config persistence
//! used.

use std::path::PathBuf;

use crate::error::{StageError, StageResult};
use crate::ids::new_id;

/// Stores and serves opaque blobs (uploaded or pre-downloaded audio).
pub trait BlobStore: Send + Sync {
    /// Persists `bytes` under a freshly generated filename and returns the
    /// URL clients should fetch it from.
    fn put(&self, bytes: &[u8], extension: &str) -> StageResult<String>;

    /// Returns the serving URL for an existing filename, without checking
    /// that it exists.
    fn url_for(&self, filename: &str) -> String;

    /// Resolves a filename to its on-disk path for serving, if present.
    fn path_for(&self, filename: &str) -> Option<PathBuf>;

    /// Deletes a blob by filename. A missing file is not an error.
    fn delete(&self, filename: &str) -> StageResult<()>;
}

/// Filesystem-backed blob store rooted at one directory, serving blobs under
/// `base_url` (e.g. `http://0.0.0.0:8080/rooms/uploads`).
pub struct FsBlobStore {
    dir: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> StageResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| StageError::Internal(format!("failed to create upload dir: {e}")))?;
        Ok(Self { dir, base_url: base_url.into() })
    }

    fn sanitize(filename: &str) -> Option<&str> {
        // Reject path traversal; filenames are server-generated so this is a
        // defensive check against a malformed request, not a trusted input path.
        if filename.is_empty() || filename.contains('/') || filename.contains("..") {
            None
        } else {
            Some(filename)
        }
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, bytes: &[u8], extension: &str) -> StageResult<String> {
        let filename = format!("{}.{}", new_id(), extension.trim_start_matches('.'));
        let final_path = self.dir.join(&filename);
        let temp_path = self.dir.join(format!("{filename}.tmp"));

        std::fs::write(&temp_path, bytes)
            .map_err(|e| StageError::Internal(format!("failed to write upload: {e}")))?;
        std::fs::rename(&temp_path, &final_path)
            .map_err(|e| StageError::Internal(format!("failed to finalize upload: {e}")))?;

        Ok(self.url_for(&filename))
    }

    fn url_for(&self, filename: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), filename)
    }

    fn path_for(&self, filename: &str) -> Option<PathBuf> {
        let filename = Self::sanitize(filename)?;
        let path = self.dir.join(filename);
        path.exists().then_some(path)
    }

    fn delete(&self, filename: &str) -> StageResult<()> {
        let Some(filename) = Self::sanitize(filename) else {
            return Ok(());
        };
        let path = self.dir.join(filename);
        match std::fs::remove_file(path) {
            Ok(()) | Err(_) => Ok(()),
        }
    }
}

/// Extracts the filename from a serving URL this store produced, for GC.
pub fn filename_from_url(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_path_for_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "http://localhost/uploads").unwrap();
        let url = store.put(b"hello", "mp3").unwrap();
        let filename = filename_from_url(&url).unwrap();
        assert!(store.path_for(filename).is_some());
        assert_eq!(std::fs::read(store.path_for(filename).unwrap()).unwrap(), b"hello");
    }

    #[test]
    fn delete_removes_the_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "http://localhost/uploads").unwrap();
        let url = store.put(b"hello", "mp3").unwrap();
        let filename = filename_from_url(&url).unwrap().to_string();
        store.delete(&filename).unwrap();
        assert!(store.path_for(&filename).is_none());
    }

    #[test]
    fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "http://localhost/uploads").unwrap();
        assert!(store.path_for("../secret").is_none());
        assert!(store.path_for("a/b").is_none());
    }
}
