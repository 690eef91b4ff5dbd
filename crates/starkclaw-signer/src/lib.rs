//! starkclaw-signer
//!
//! The signing boundary of the wallet. Two session-signing variants — local
//! Stark-curve ECDSA over the transaction hash, and a remote keyring-proxy
//! that performs the scalar multiplication in an enclave — plus the owner
//! signer used for administrative transactions.
//!
//! Both session variants emit the same strict-v2 five-felt signature
//! `[session_pubkey, r, s, valid_until, spec_version]`; a failure in one
//! variant never silently degrades to the other.

pub mod config;
mod owner;
mod remote;
mod session;

pub use config::{Environment, RuntimeSignerSettings, SignerMode, SignerRuntime, SignerRuntimeConfig};
pub use owner::OwnerSigner;
pub use remote::{
    HttpProxyTransport, KeyringProxySigner, ProxyResponse, ProxyTransport, SignContext,
};
pub use session::LocalSessionSigner;

use starknet::core::types::Felt;

/// A single call as the remote signing API sees it (entry point by name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSpec {
    pub contract_address: Felt,
    pub entrypoint: String,
    pub calldata: Vec<Felt>,
}

/// Everything a session signer needs to authorize one transaction.
#[derive(Debug, Clone)]
pub struct SessionSignRequest {
    pub account_address: Felt,
    pub chain_id: Felt,
    pub nonce: Felt,
    /// Invoke-v3 hash the local variant signs.
    pub tx_hash: Felt,
    /// Session validity bound; bound into the emitted signature.
    pub valid_until: i64,
    /// Structured calls the remote variant forwards.
    pub calls: Vec<CallSpec>,
    pub context: SignContext,
}

/// A strict-v2 session signature plus correlation metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSignature {
    /// Exactly `[session_pubkey, r, s, valid_until, spec_version]`.
    pub felts: [Felt; 5],
    pub session_public_key: Felt,
    /// Request id assigned by the remote proxy, when one served the request.
    pub request_id: Option<String>,
}

impl SessionSignature {
    pub fn to_vec(&self) -> Vec<Felt> {
        self.felts.to_vec()
    }
}

/// The two session-signing variants. An enum, not a trait object: the set is
/// closed and a variant can never be swapped in behind a caller's back.
pub enum SessionWalletSigner {
    Local(LocalSessionSigner),
    Remote(KeyringProxySigner),
}

impl SessionWalletSigner {
    pub fn mode(&self) -> SignerMode {
        match self {
            SessionWalletSigner::Local(_) => SignerMode::Local,
            SessionWalletSigner::Remote(_) => SignerMode::Remote,
        }
    }

    pub fn session_public_key(&self) -> Option<Felt> {
        match self {
            SessionWalletSigner::Local(signer) => Some(signer.public_key()),
            SessionWalletSigner::Remote(signer) => signer.pinned_public_key(),
        }
    }

    /// Sign one session transaction. Errors propagate as-is — there is no
    /// fallback from remote to local.
    pub async fn sign_session_transaction(
        &self,
        request: &SessionSignRequest,
    ) -> Result<SessionSignature, starkclaw_core::CoreError> {
        match self {
            SessionWalletSigner::Local(signer) => signer.sign_transaction(request),
            SessionWalletSigner::Remote(signer) => signer.sign_transaction(request).await,
        }
    }
}
