//! Owner signer: the device owner's key over transaction and typed-data
//! hashes. Administrative operations (session register/revoke, declare,
//! deploy-account) always route here, never to a session signer.

use starknet::core::types::Felt;
use starknet::signers::SigningKey;
use std::fmt;

use starkclaw_core::CoreError;
use starkclaw_typed_data::BuiltTypedData;

pub struct OwnerSigner {
    signing_key: SigningKey,
    public_key: Felt,
}

impl OwnerSigner {
    pub fn new(private_key: Felt) -> Self {
        let signing_key = SigningKey::from_secret_scalar(private_key);
        let public_key = signing_key.verifying_key().scalar();
        Self { signing_key, public_key }
    }

    pub fn public_key(&self) -> Felt {
        self.public_key
    }

    /// `[r, s]` over an invoke transaction hash.
    pub fn sign_transaction(&self, tx_hash: &Felt) -> Result<Vec<Felt>, CoreError> {
        let signature = self
            .signing_key
            .sign(tx_hash)
            .map_err(|e| CoreError::Internal(format!("owner signing failed: {e}")))?;
        Ok(vec![signature.r, signature.s])
    }

    /// `[r, s]` over a typed-data message hash — the owner-consent artifact
    /// for session administration.
    pub fn sign_typed_data(&self, typed: &BuiltTypedData) -> Result<Vec<Felt>, CoreError> {
        self.sign_transaction(&typed.message_hash)
    }
}

impl fmt::Debug for OwnerSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerSigner {{ public_key: {:#x} }}", self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starknet::core::crypto::{ecdsa_verify, Signature};

    fn verify_rs(public_key: &Felt, hash: &Felt, r: &Felt, s: &Felt) -> bool {
        ecdsa_verify(public_key, hash, &Signature { r: *r, s: *s }).unwrap_or(false)
    }

    #[test]
    fn owner_signature_is_two_felts_and_verifies() {
        let signer = OwnerSigner::new(Felt::from(1234567u64));
        let hash = Felt::from(99u8);
        let sig = signer.sign_transaction(&hash).unwrap();
        assert_eq!(sig.len(), 2);
        assert!(verify_rs(&signer.public_key(), &hash, &sig[0], &sig[1]));
    }

    #[test]
    fn typed_data_signature_matches_message_hash() {
        let signer = OwnerSigner::new(Felt::from(42u8));
        let typed = starkclaw_typed_data::build_revoke_session_key(
            &starkclaw_typed_data::RevokeSessionKeyInput {
                chain_id: Felt::ONE,
                account_address: Felt::TWO,
                session_key: Felt::THREE,
            },
        )
        .unwrap();
        let via_typed = signer.sign_typed_data(&typed).unwrap();
        let direct = signer.sign_transaction(&typed.message_hash).unwrap();
        assert_eq!(via_typed, direct);
    }
}
