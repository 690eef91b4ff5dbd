//! Persisted feature flags.
//!
//! `session_signer_v2` is hard-enforced on: reads always return `true` and a
//! write of `false` is coerced before persisting. A flag regression here
//! would be a silent signature-format downgrade, so it is not gated — it is
//! unrepresentable.

use std::collections::BTreeMap;
use std::sync::Arc;

use starkclaw_core::CoreError;

use crate::namespace;
use crate::store::SecureStore;

/// Flag names with special handling.
pub const SESSION_SIGNER_V2: &str = "session_signer_v2";

pub struct FeatureFlags {
    store: Arc<dyn SecureStore>,
}

impl FeatureFlags {
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self { store }
    }

    fn read_all(&self) -> Result<BTreeMap<String, bool>, CoreError> {
        match self.store.get(namespace::FEATURE_FLAGS)? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| CoreError::Internal(format!("feature flags corrupt: {e}"))),
            None => Ok(BTreeMap::new()),
        }
    }

    fn write_all(&self, flags: &BTreeMap<String, bool>) -> Result<(), CoreError> {
        let json = serde_json::to_string(flags)
            .map_err(|e| CoreError::Internal(format!("feature flags encode: {e}")))?;
        self.store.set(namespace::FEATURE_FLAGS, &json)
    }

    /// Read a flag, falling back to `default` when unset.
    pub fn is_enabled(&self, name: &str, default: bool) -> Result<bool, CoreError> {
        if name == SESSION_SIGNER_V2 {
            return Ok(true);
        }
        Ok(self.read_all()?.get(name).copied().unwrap_or(default))
    }

    /// Persist a flag. Attempts to disable `session_signer_v2` are coerced to
    /// `true` and logged.
    pub fn set_flag(&self, name: &str, value: bool) -> Result<(), CoreError> {
        let effective = if name == SESSION_SIGNER_V2 && !value {
            tracing::warn!("refusing to disable {SESSION_SIGNER_V2}; coercing to true");
            true
        } else {
            value
        };
        let mut flags = self.read_all()?;
        flags.insert(name.to_string(), effective);
        self.write_all(&flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKeystore;

    fn flags() -> FeatureFlags {
        FeatureFlags::new(Arc::new(MemoryKeystore::new()))
    }

    #[test]
    fn session_signer_v2_reads_true_unconditionally() {
        let f = flags();
        assert!(f.is_enabled(SESSION_SIGNER_V2, false).unwrap());
    }

    #[test]
    fn session_signer_v2_cannot_be_disabled() {
        let f = flags();
        f.set_flag(SESSION_SIGNER_V2, false).unwrap();
        assert!(f.is_enabled(SESSION_SIGNER_V2, false).unwrap());
        // The persisted document also records true, never false.
        let stored = f.read_all().unwrap();
        assert_eq!(stored.get(SESSION_SIGNER_V2), Some(&true));
    }

    #[test]
    fn other_flags_get_set_with_defaults() {
        let f = flags();
        assert!(!f.is_enabled("demo_mode", false).unwrap());
        assert!(f.is_enabled("demo_mode", true).unwrap());
        f.set_flag("demo_mode", true).unwrap();
        assert!(f.is_enabled("demo_mode", false).unwrap());
        f.set_flag("demo_mode", false).unwrap();
        assert!(!f.is_enabled("demo_mode", true).unwrap());
    }
}
