//! Key-value persistence for client-side state.
//!
//! Native builds keep one JSON file per key under the local data directory,
//! browser builds use `localStorage`. [`MemoryStore`] keeps entries in
//! process for tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to create storage directory: {0}")]
    CreateDir(#[source] std::io::Error),

    #[error("Failed to write to storage: {0}")]
    Write(#[source] std::io::Error),

    #[error("Failed to delete from storage: {0}")]
    Delete(#[source] std::io::Error),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Browser storage unavailable: {0}")]
    Browser(String),

    #[error("Invalid stored record: {0}")]
    Serde(#[from] serde_json::Error),
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// File-backed store rooted at a directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under the platform data directory, falling back to `./cache`.
    pub fn in_data_dir() -> Self {
        if let Some(data_dir) = dirs::data_local_dir() {
            return Self::new(data_dir.join("localchat"));
        }

        Self::new(PathBuf::from("cache"))
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_key(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(StorageError::CreateDir)?;
        fs::write(self.path_for(key), value).map_err(StorageError::Write)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let file_path = self.path_for(key);
        if file_path.exists() {
            fs::remove_file(file_path).map_err(StorageError::Delete)?;
        }
        Ok(())
    }
}

/// Store that persists on the current target.
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformStore = FileStore;

#[cfg(target_arch = "wasm32")]
pub type PlatformStore = LocalStore;

/// Picks the persistent store for this target.
///
/// `data_dir` overrides the native storage directory and is ignored in the
/// browser.
#[cfg(not(target_arch = "wasm32"))]
pub fn platform_store(data_dir: Option<&Path>) -> PlatformStore {
    match data_dir {
        Some(dir) => FileStore::new(dir),
        None => FileStore::in_data_dir(),
    }
}

#[cfg(target_arch = "wasm32")]
pub fn platform_store(_data_dir: Option<&Path>) -> PlatformStore {
    LocalStore
}

/// Browser `localStorage`, one item per key.
#[cfg(target_arch = "wasm32")]
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalStore;

#[cfg(target_arch = "wasm32")]
impl LocalStore {
    fn storage() -> Result<web_sys::Storage, StorageError> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::Browser("no window".to_string()))?;
        window
            .local_storage()
            .map_err(|err| StorageError::Browser(format!("{err:?}")))?
            .ok_or_else(|| StorageError::Browser("localStorage disabled".to_string()))
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for LocalStore {
    fn get(&self, key: &str) -> Option<String> {
        Self::storage().ok()?.get_item(key).ok().flatten()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::storage()?
            .set_item(key, value)
            .map_err(|err| StorageError::Browser(format!("{err:?}")))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        Self::storage()?
            .remove_item(key)
            .map_err(|err| StorageError::Browser(format!("{err:?}")))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Sanitize storage key for filesystem use
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect()
}
