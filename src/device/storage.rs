//! Durable storage for the raw connection string

use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Persists the raw credential blob across restarts
pub trait CredentialStore: Send {
    fn save(&mut self, blob: &[u8]) -> Result<(), StorageError>;
    fn erase(&mut self) -> Result<(), StorageError>;
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Store that keeps nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCredentialStore;

impl CredentialStore for NullCredentialStore {
    fn save(&mut self, _blob: &[u8]) -> Result<(), StorageError> {
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(None)
    }
}

/// Store backed by a single file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&mut self, blob: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // Readers only ever see a complete blob
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, blob)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Saved credentials to {}", self.path.display());
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_save_load_erase() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCredentialStore::new(dir.path().join("nested/conn_str"));

        assert_eq!(store.load().unwrap(), None);

        store.save(b"HostName=h;DeviceId=d;SharedAccessKey=k").unwrap();
        assert_eq!(
            store.load().unwrap().as_deref(),
            Some(&b"HostName=h;DeviceId=d;SharedAccessKey=k"[..])
        );

        store.erase().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_erase_missing_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCredentialStore::new(dir.path().join("absent"));
        assert!(store.erase().is_ok());
    }

    #[test]
    fn test_null_store_keeps_nothing() {
        let mut store = NullCredentialStore;
        store.save(b"x").unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
