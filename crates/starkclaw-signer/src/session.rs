//! Local session signer: Stark-curve ECDSA with the session's own key.
//!
//! Emission shape is fixed at five felts
//! `[session_pubkey, r, s, valid_until, spec_version]` for transactions and
//! typed-data messages alike. There is no API for deploy-account or declare
//! work — those are owner-only by construction.

use starknet::core::types::Felt;
use starknet::signers::SigningKey;
use std::fmt;

use starkclaw_core::constants::SESSION_SPEC_VERSION;
use starkclaw_core::CoreError;
use starkclaw_typed_data::BuiltTypedData;

use crate::{SessionSignRequest, SessionSignature};

pub struct LocalSessionSigner {
    signing_key: SigningKey,
    public_key: Felt,
}

impl LocalSessionSigner {
    /// Build a signer from the session private key loaded out of the secure
    /// store. The caller's record of the public key is cross-checked against
    /// the derived one so a corrupted index cannot sign under the wrong
    /// identity.
    pub fn new(private_key: Felt, expected_public_key: Felt) -> Result<Self, CoreError> {
        let signing_key = SigningKey::from_secret_scalar(private_key);
        let public_key = signing_key.verifying_key().scalar();
        if public_key != expected_public_key {
            return Err(CoreError::Internal(
                "stored session key does not match its public key".into(),
            ));
        }
        Ok(Self { signing_key, public_key })
    }

    pub fn public_key(&self) -> Felt {
        self.public_key
    }

    fn signature_over(&self, hash: &Felt, valid_until: i64) -> Result<SessionSignature, CoreError> {
        let valid_until_felt = u64::try_from(valid_until)
            .map(Felt::from)
            .map_err(|_| CoreError::InvalidInput("valid_until must be non-negative".into()))?;
        let signature = self
            .signing_key
            .sign(hash)
            .map_err(|e| CoreError::Internal(format!("session signing failed: {e}")))?;
        Ok(SessionSignature {
            felts: [
                self.public_key,
                signature.r,
                signature.s,
                valid_until_felt,
                Felt::from(SESSION_SPEC_VERSION),
            ],
            session_public_key: self.public_key,
            request_id: None,
        })
    }

    /// Sign an invoke transaction hash.
    pub fn sign_transaction(&self, request: &SessionSignRequest) -> Result<SessionSignature, CoreError> {
        self.signature_over(&request.tx_hash, request.valid_until)
    }

    /// Sign a SNIP-12 message hash.
    pub fn sign_typed_data(
        &self,
        typed: &BuiltTypedData,
        valid_until: i64,
    ) -> Result<SessionSignature, CoreError> {
        self.signature_over(&typed.message_hash, valid_until)
    }
}

impl fmt::Debug for LocalSessionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalSessionSigner {{ public_key: {:#x} }}", self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SignContext;

    fn signer() -> LocalSessionSigner {
        let key = SigningKey::from_secret_scalar(Felt::from(0xdeadbeefu64));
        LocalSessionSigner::new(Felt::from(0xdeadbeefu64), key.verifying_key().scalar()).unwrap()
    }

    fn request(valid_until: i64) -> SessionSignRequest {
        SessionSignRequest {
            account_address: Felt::ONE,
            chain_id: Felt::TWO,
            nonce: Felt::ZERO,
            tx_hash: Felt::from(777u64),
            valid_until,
            calls: vec![],
            context: SignContext::default(),
        }
    }

    #[test]
    fn emits_exactly_five_felts_with_pubkey_first() {
        let signer = signer();
        let sig = signer.sign_transaction(&request(2_000)).unwrap();
        assert_eq!(sig.felts.len(), 5);
        assert_eq!(sig.felts[0], signer.public_key());
        assert_eq!(sig.felts[3], Felt::from(2_000u64));
        assert_eq!(sig.felts[4], Felt::from(SESSION_SPEC_VERSION));
    }

    #[test]
    fn mismatched_public_key_is_rejected_at_construction() {
        let result = LocalSessionSigner::new(Felt::from(5u8), Felt::from(6u8));
        assert!(result.is_err());
    }

    #[test]
    fn typed_data_and_transaction_share_the_shape() {
        let signer = signer();
        let typed = starkclaw_typed_data::build_revoke_session_key(
            &starkclaw_typed_data::RevokeSessionKeyInput {
                chain_id: Felt::ONE,
                account_address: Felt::TWO,
                session_key: signer.public_key(),
            },
        )
        .unwrap();
        let sig = signer.sign_typed_data(&typed, 3_000).unwrap();
        assert_eq!(sig.felts[0], signer.public_key());
        assert_eq!(sig.felts[3], Felt::from(3_000u64));
        assert_eq!(sig.felts[4], Felt::from(SESSION_SPEC_VERSION));
    }

    #[test]
    fn negative_validity_is_invalid_input() {
        let signer = signer();
        assert!(signer.sign_transaction(&request(-1)).is_err());
    }
}
