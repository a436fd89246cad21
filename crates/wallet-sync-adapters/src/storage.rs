//! Key-value storages backing the session store.
//!
//! - `MemoryStorage`: process-local, for tests and ephemeral hosts.
//! - `FileStorage`: one JSON object on disk (native only).
//! - `LocalStorage`: browser `localStorage` (wasm32 only).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use wallet_sync_core::{KeyValuePort, PortError};

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, PortError> {
        self.inner
            .lock()
            .map_err(|e| PortError::Transport(format!("storage lock poisoned: {e}")))
    }

    pub fn keys(&self) -> Result<Vec<String>, PortError> {
        let mut keys: Vec<_> = self.map()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

impl KeyValuePort for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, PortError> {
        Ok(self.map()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PortError> {
        self.map()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), PortError> {
        self.map()?.remove(key);
        Ok(())
    }
}

/// Persists every key into a single JSON object file. The file is re-read on
/// each access so several processes see each other's writes.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: std::path::PathBuf,
    write_lock: Arc<Mutex<()>>,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStorage {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, PortError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(PortError::Transport(format!(
                    "read {} failed: {e}",
                    self.path.display()
                )))
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            PortError::Validation(format!("{} is not a JSON object: {e}", self.path.display()))
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), PortError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PortError::Transport(format!("create {} failed: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| PortError::Validation(format!("encode storage failed: {e}")))?;
        std::fs::write(&self.path, json).map_err(|e| {
            PortError::Transport(format!("write {} failed: {e}", self.path.display()))
        })
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), PortError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| PortError::Transport(format!("storage lock poisoned: {e}")))?;
        let mut entries = self.read_all()?;
        apply(&mut entries);
        self.write_all(&entries)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl KeyValuePort for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, PortError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PortError> {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), PortError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

/// Browser `localStorage`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

#[cfg(target_arch = "wasm32")]
impl LocalStorage {
    fn storage() -> Result<web_sys::Storage, PortError> {
        let window =
            web_sys::window().ok_or_else(|| PortError::NotFound("window unavailable".to_owned()))?;
        window
            .local_storage()
            .map_err(|e| PortError::Transport(format!("localStorage access failed: {e:?}")))?
            .ok_or_else(|| PortError::NotFound("localStorage unavailable".to_owned()))
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValuePort for LocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, PortError> {
        Self::storage()?
            .get_item(key)
            .map_err(|e| PortError::Transport(format!("localStorage get failed: {e:?}")))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PortError> {
        Self::storage()?
            .set_item(key, value)
            .map_err(|e| PortError::Transport(format!("localStorage set failed: {e:?}")))
    }

    fn remove_item(&self, key: &str) -> Result<(), PortError> {
        Self::storage()?
            .remove_item(key)
            .map_err(|e| PortError::Transport(format!("localStorage remove failed: {e:?}")))
    }
}
