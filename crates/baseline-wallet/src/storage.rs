//! Durable single-slot storage for the encrypted wallet blob.
//!
//! The slot is always replaced wholesale. A missing or unparsable slot loads
//! as `None` ("no wallet"), not as an error.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::encryption::EncryptedBlob;
use crate::error::WalletError;

/// File name of the wallet slot inside the data directory.
pub const WALLET_SLOT_FILE: &str = "wallet-v1.json";

/// A single named slot holding at most one [`EncryptedBlob`].
pub trait SecretStore: Send + Sync {
    /// Replace the slot contents.
    fn persist(&self, blob: &EncryptedBlob) -> Result<(), WalletError>;

    /// Read the slot. `Ok(None)` when absent or unparsable.
    fn load(&self) -> Result<Option<EncryptedBlob>, WalletError>;

    /// Erase the slot. Clearing an empty slot succeeds.
    fn clear(&self) -> Result<(), WalletError>;
}

/// Slot backed by a JSON file, written through a temp file and rename.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Store `wallet-v1.json` inside `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self::at_path(data_dir.as_ref().join(WALLET_SLOT_FILE))
    }

    /// Store at an explicit file path.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SecretStore for FileStore {
    fn persist(&self, blob: &EncryptedBlob) -> Result<(), WalletError> {
        let json = blob.to_json()?;
        let _guard = self.write_lock.lock();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WalletError::Storage(e.to_string()))?;
        }
        let tmp = self.temp_path();
        let mut file =
            std::fs::File::create(&tmp).map_err(|e| WalletError::Storage(e.to_string()))?;
        file.write_all(json.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        drop(file);
        std::fs::rename(&tmp, &self.path).map_err(|e| WalletError::Storage(e.to_string()))?;

        debug!(path = %self.path.display(), "persisted wallet slot");
        Ok(())
    }

    fn load(&self) -> Result<Option<EncryptedBlob>, WalletError> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(WalletError::Storage(e.to_string())),
        };
        match EncryptedBlob::from_json(&json) {
            Ok(blob) => Ok(Some(blob)),
            Err(_) => {
                warn!(path = %self.path.display(), "wallet slot unparsable, treating as empty");
                Ok(None)
            }
        }
    }

    fn clear(&self) -> Result<(), WalletError> {
        let _guard = self.write_lock.lock();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "cleared wallet slot");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WalletError::Storage(e.to_string())),
        }
    }
}

/// In-process slot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a blob is currently stored.
    pub fn is_occupied(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Overwrite the raw slot text, bypassing serialization.
    pub fn put_raw(&self, json: impl Into<String>) {
        *self.slot.lock() = Some(json.into());
    }
}

impl SecretStore for MemoryStore {
    fn persist(&self, blob: &EncryptedBlob) -> Result<(), WalletError> {
        let json = blob.to_json()?;
        *self.slot.lock() = Some(json);
        Ok(())
    }

    fn load(&self) -> Result<Option<EncryptedBlob>, WalletError> {
        Ok(self
            .slot
            .lock()
            .as_deref()
            .and_then(|json| EncryptedBlob::from_json(json).ok()))
    }

    fn clear(&self) -> Result<(), WalletError> {
        *self.slot.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption;

    fn blob() -> EncryptedBlob {
        encryption::encrypt("pw", b"wallet", 1_000).unwrap()
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.load().unwrap(), None);

        let b = blob();
        store.persist(&b).unwrap();
        assert_eq!(store.load().unwrap(), Some(b));
        assert!(store.path().ends_with(WALLET_SLOT_FILE));
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn file_store_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.persist(&blob()).unwrap();
        let second = blob();
        store.persist(&second).unwrap();
        assert_eq!(store.load().unwrap(), Some(second));
    }

    #[test]
    fn file_store_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("deeper"));
        store.persist(&blob()).unwrap();
        assert!(store.load().unwrap().is_some());
    }

    #[test]
    fn file_store_garbage_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        std::fs::write(store.path(), b"{ not a blob").unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.clear().unwrap();
        store.persist(&blob()).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn file_store_unwritable_location_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let store = FileStore::new(blocker.join("sub"));
        assert!(matches!(store.persist(&blob()), Err(WalletError::Storage(_))));
    }

    #[test]
    fn memory_store_behaves_like_a_slot() {
        let store = MemoryStore::new();
        assert_eq!(store.load().unwrap(), None);
        let b = blob();
        store.persist(&b).unwrap();
        assert!(store.is_occupied());
        assert_eq!(store.load().unwrap(), Some(b));
        store.put_raw("garbage");
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
        assert!(!store.is_occupied());
    }
}
