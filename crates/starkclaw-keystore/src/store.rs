use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use starkclaw_core::CoreError;

use crate::namespace;

/// Secret storage contract.
///
/// `get` never fails on a missing key — it returns `None`. The backing store
/// must survive app restart and live in an OS-protected location (keychain /
/// keystore equivalent); callers treat every value as sensitive.
pub trait SecureStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CoreError>;
    fn delete(&self, key: &str) -> Result<(), CoreError>;

    /// Keys currently present under `prefix` (used by reset and migrations).
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CoreError>;

    /// Wipe every key the engine owns. Individual delete failures are logged
    /// and swallowed: by the time reset runs, in-memory state is already
    /// cleared and a partial wipe must not resurrect it as an error.
    fn reset(&self) -> Result<(), CoreError> {
        let keys = self.keys_with_prefix(namespace::PREFIX)?;
        for key in keys {
            if let Err(e) = self.delete(&key) {
                tracing::warn!(key, error = %e, "reset: failed to delete key, continuing");
            }
        }
        Ok(())
    }
}

// ── Sled-backed store ────────────────────────────────────────────────────────

/// Durable keystore backed by sled (pure-Rust, no C dependencies).
///
/// One unnamed tree, UTF-8 keys and values. The tree directory is expected to
/// sit inside the platform's per-app protected storage.
pub struct SledKeystore {
    db: sled::Db,
}

impl SledKeystore {
    /// Open or create the keystore at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let db = sled::open(path).map_err(|e| CoreError::Internal(format!("keystore open: {e}")))?;
        Ok(Self { db })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), CoreError> {
        self.db
            .flush()
            .map_err(|e| CoreError::Internal(format!("keystore flush: {e}")))?;
        Ok(())
    }
}

impl SecureStore for SledKeystore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        match self
            .db
            .get(key.as_bytes())
            .map_err(|e| CoreError::Internal(format!("keystore get: {e}")))?
        {
            Some(bytes) => {
                let value = String::from_utf8(bytes.to_vec())
                    .map_err(|e| CoreError::Internal(format!("keystore value not utf-8: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.db
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| CoreError::Internal(format!("keystore set: {e}")))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CoreError> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| CoreError::Internal(format!("keystore delete: {e}")))?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CoreError> {
        let mut keys = Vec::new();
        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item.map_err(|e| CoreError::Internal(format!("keystore scan: {e}")))?;
            if let Ok(s) = String::from_utf8(key.to_vec()) {
                keys.push(s);
            }
        }
        Ok(keys)
    }
}

// ── In-memory store ──────────────────────────────────────────────────────────

/// Volatile store for tests and previews. Same contract, no durability.
#[derive(Default)]
pub struct MemoryKeystore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeystore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStore for MemoryKeystore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.entries.lock().map_err(|_| poisoned())?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.entries
            .lock()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CoreError> {
        self.entries.lock().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CoreError> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| poisoned())?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

fn poisoned() -> CoreError {
    CoreError::Internal("keystore lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_none_not_error() {
        let store = MemoryKeystore::new();
        assert_eq!(store.get("starkclaw.wallet.v1").unwrap(), None);
    }

    #[test]
    fn sled_round_trip_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledKeystore::open(dir.path()).unwrap();

        store.set(namespace::WALLET, "{\"a\":1}").unwrap();
        store
            .set(&namespace::session_secret("0xabc"), "0x123")
            .unwrap();
        store.set("unrelated.key", "kept").unwrap();

        assert_eq!(store.get(namespace::WALLET).unwrap().as_deref(), Some("{\"a\":1}"));

        store.reset().unwrap();
        assert_eq!(store.get(namespace::WALLET).unwrap(), None);
        assert_eq!(store.get(&namespace::session_secret("0xabc")).unwrap(), None);
        // Reset only touches the engine's namespace.
        assert_eq!(store.get("unrelated.key").unwrap().as_deref(), Some("kept"));
    }

    #[test]
    fn sled_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledKeystore::open(dir.path()).unwrap();
            store.set(namespace::SESSION_INDEX, "[]").unwrap();
            store.flush().unwrap();
        }
        let store = SledKeystore::open(dir.path()).unwrap();
        assert_eq!(store.get(namespace::SESSION_INDEX).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemoryKeystore::new();
        store.set("starkclaw.x", "1").unwrap();
        store.delete("starkclaw.x").unwrap();
        store.delete("starkclaw.x").unwrap();
        assert_eq!(store.get("starkclaw.x").unwrap(), None);
    }
}
