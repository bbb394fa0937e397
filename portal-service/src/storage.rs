use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::*;
#[cfg(test)]
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::{Arc, Mutex};
use tracing::warn;

pub mod keys {
    pub const CURRENT_USER: &str = "kk.current_user";
    pub const ARTICLES: &str = "kk.articles";
    pub const INVENTORY: &str = "kk.inventory";
    pub const CARTS: &str = "kk.carts";
    pub const ORDERS: &str = "kk.orders";
    pub const PURCHASE_ORDERS: &str = "kk.purchase_orders";
    pub const STOCK_OUTBOX: &str = "kk.stock_outbox";
}

/// Which of the optional collections survive a restart. User, catalogue and
/// inventory are always saved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistencePolicy {
    pub persist_cart: bool,
    pub persist_orders: bool,
}

/// String key to JSON document storage, the server-side stand-in for the
/// browser's local storage.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> PortalResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> PortalResult<()>;
    fn remove(&self, key: &str) -> PortalResult<()>;
}

pub fn load_json<T: DeserializeOwned>(
    storage: &dyn KeyValueStorage,
    key: &str,
) -> PortalResult<Option<T>> {
    match storage.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize + ?Sized>(
    storage: &dyn KeyValueStorage,
    key: &str,
    value: &T,
) -> PortalResult<()> {
    let raw = serde_json::to_string(value)?;
    storage.set(key, &raw)
}

/// One `<key>.json` file per key inside a data directory.
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl AsRef<Path>) -> PortalResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStorage for JsonFileStorage {
    fn get(&self, key: &str) -> PortalResult<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> PortalResult<()> {
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, self.path(key)).map_err(|e| {
            warn!("Failed to replace {}: {}", key, e);
            PortalError::from(e)
        })
    }

    fn remove(&self, key: &str) -> PortalResult<()> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
    failing: Arc<AtomicBool>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write fails as if the disk were full.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> PortalResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PortalResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortalError::Storage("disk full".to_string()));
        }
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PortalResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}
