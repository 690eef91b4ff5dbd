//! Persisted session-key index.
//!
//! One JSON document under the session namespace, read-modify-write with
//! last-writer-wins. Concurrent owner-signed mutations are the UI layer's
//! responsibility to serialize; the index itself can only lose an update,
//! never corrupt.

use std::sync::Arc;

use starknet::core::types::Felt;

use starkclaw_core::codec::felt_to_hex;
use starkclaw_core::{CoreError, SessionCredential};
use starkclaw_keystore::{namespace, SecureStore};

pub struct SessionIndex {
    store: Arc<dyn SecureStore>,
}

impl SessionIndex {
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &Arc<dyn SecureStore> {
        &self.store
    }

    pub fn load(&self) -> Result<Vec<SessionCredential>, CoreError> {
        match self.store.get(namespace::SESSION_INDEX)? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| CoreError::Internal(format!("session index corrupt: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    pub fn save(&self, credentials: &[SessionCredential]) -> Result<(), CoreError> {
        let json = serde_json::to_string(credentials)
            .map_err(|e| CoreError::Internal(format!("session index encode: {e}")))?;
        self.store.set(namespace::SESSION_INDEX, &json)
    }

    /// Append a credential to the index.
    pub fn append(&self, credential: SessionCredential) -> Result<(), CoreError> {
        let mut all = self.load()?;
        all.push(credential);
        self.save(&all)
    }

    /// Read-modify-write a single credential in place. Returns the updated
    /// record, or `SessionNotFound` when the key is absent.
    pub fn update<F: FnOnce(&mut SessionCredential)>(
        &self,
        public_key: &Felt,
        apply: F,
    ) -> Result<SessionCredential, CoreError> {
        let mut all = self.load()?;
        let Some(credential) = all.iter_mut().find(|c| c.public_key == *public_key) else {
            return Err(CoreError::SessionNotFound(Some(felt_to_hex(public_key))));
        };
        apply(credential);
        let updated = credential.clone();
        self.save(&all)?;
        Ok(updated)
    }

    pub fn find(&self, public_key: &Felt) -> Result<SessionCredential, CoreError> {
        self.load()?
            .into_iter()
            .find(|c| c.public_key == *public_key)
            .ok_or_else(|| CoreError::SessionNotFound(Some(felt_to_hex(public_key))))
    }

    /// Store a session private key under its namespaced key.
    pub fn store_secret(&self, public_key: &Felt, private_key: &Felt) -> Result<(), CoreError> {
        self.store.set(
            &namespace::session_secret(&felt_to_hex(public_key)),
            &felt_to_hex(private_key),
        )
    }

    /// Load a session private key; absence is `SessionNotFound`.
    pub fn load_secret(&self, public_key: &Felt) -> Result<Felt, CoreError> {
        let hex = self
            .store
            .get(&namespace::session_secret(&felt_to_hex(public_key)))?
            .ok_or_else(|| CoreError::SessionNotFound(Some(felt_to_hex(public_key))))?;
        starkclaw_core::codec::felt_from_hex(&hex)
    }

    pub fn delete_secret(&self, public_key: &Felt) -> Result<(), CoreError> {
        self.store
            .delete(&namespace::session_secret(&felt_to_hex(public_key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starkclaw_core::TokenSymbol;
    use starkclaw_keystore::MemoryKeystore;

    fn credential(public_key: u64, created_at: i64) -> SessionCredential {
        SessionCredential {
            public_key: Felt::from(public_key),
            token_symbol: TokenSymbol::Usdc,
            token_address: Felt::from(1u8),
            spending_limit_base_units: "1000".into(),
            valid_after: created_at,
            valid_until: created_at + 3_600,
            allowed_contracts: vec![],
            created_at,
            registered_at: None,
            revoked_at: None,
            last_tx_hash: None,
        }
    }

    #[test]
    fn append_update_find_round_trip() {
        let index = SessionIndex::new(Arc::new(MemoryKeystore::new()));
        index.append(credential(1, 100)).unwrap();
        index.append(credential(2, 200)).unwrap();

        let updated = index
            .update(&Felt::from(2u8), |c| c.registered_at = Some(250))
            .unwrap();
        assert_eq!(updated.registered_at, Some(250));
        assert_eq!(index.find(&Felt::from(2u8)).unwrap().registered_at, Some(250));
        assert_eq!(index.load().unwrap().len(), 2);
    }

    #[test]
    fn missing_key_is_session_not_found() {
        let index = SessionIndex::new(Arc::new(MemoryKeystore::new()));
        let err = index.find(&Felt::from(9u8)).unwrap_err();
        assert_eq!(err.machine_code(), "SESSION_NOT_FOUND");
        let err = index.load_secret(&Felt::from(9u8)).unwrap_err();
        assert_eq!(err.machine_code(), "SESSION_NOT_FOUND");
    }

    #[test]
    fn secrets_are_stored_separately_from_the_index() {
        let store = Arc::new(MemoryKeystore::new());
        let index = SessionIndex::new(store.clone());
        index.append(credential(5, 100)).unwrap();
        index.store_secret(&Felt::from(5u8), &Felt::from(0xabcu64)).unwrap();

        // The index document never contains the private key.
        let raw = store.get(namespace::SESSION_INDEX).unwrap().unwrap();
        assert!(!raw.contains("0xabc"));

        assert_eq!(index.load_secret(&Felt::from(5u8)).unwrap(), Felt::from(0xabcu64));
        index.delete_secret(&Felt::from(5u8)).unwrap();
        assert!(index.load_secret(&Felt::from(5u8)).is_err());
    }
}
