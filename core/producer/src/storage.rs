//! Synced file I/O for the state document.
//!
//! Writes go through a temp file in the target directory, are flushed and
//! fsynced, then renamed over the document. The consumer therefore sees either
//! the previous document or the new one, never a torn write.

use fs_err as fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::StorageError;

/// File operations the producer needs. [`FsStorage`] is the real implementation.
pub trait Storage {
    /// Replaces `path` with `contents`, synced to stable storage before returning.
    fn write_synced(&self, path: &Path, contents: &[u8]) -> Result<(), StorageError>;
    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError>;
    fn remove(&self, path: &Path) -> Result<(), StorageError>;
    fn exists(&self, path: &Path) -> bool;
    fn create_dir_all(&self, dir: &Path) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

impl Storage for FsStorage {
    fn write_synced(&self, path: &Path, contents: &[u8]) -> Result<(), StorageError> {
        let parent_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut temp_file = NamedTempFile::new_in(parent_dir).map_err(|e| {
            StorageError::io(format!("create temp file in {}", parent_dir.display()), e)
        })?;
        temp_file
            .write_all(contents)
            .map_err(|e| StorageError::io("write temp state file", e))?;
        temp_file
            .flush()
            .map_err(|e| StorageError::io("flush temp state file", e))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| StorageError::io("sync temp state file", e))?;
        temp_file
            .persist(path)
            .map_err(|e| StorageError::io(format!("persist {}", path.display()), e.error))?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        fs::read(path).map_err(|e| StorageError::io("read state file", e))
    }

    fn remove(&self, path: &Path) -> Result<(), StorageError> {
        fs::remove_file(path).map_err(|e| StorageError::io("remove state file", e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, dir: &Path) -> Result<(), StorageError> {
        fs::create_dir_all(dir).map_err(|e| StorageError::io("create state directory", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_synced_replaces_existing_file() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("state.json");
        let storage = FsStorage;

        storage.write_synced(&file, b"first").unwrap();
        storage.write_synced(&file, b"second").unwrap();

        assert_eq!(storage.read(&file).unwrap(), b"second");
        // Only the document remains; the temp file was renamed into place.
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("missing").join("state.json");
        assert!(FsStorage.write_synced(&file, b"{}").is_err());
    }

    #[test]
    fn test_remove_missing_file_is_an_error() {
        let temp = tempdir().unwrap();
        assert!(FsStorage.remove(&temp.path().join("nope.json")).is_err());
    }
}
