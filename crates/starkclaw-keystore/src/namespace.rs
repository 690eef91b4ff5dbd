//! Key namespace for the secure store.
//!
//! The version suffix is part of the key: a migration writes the next suffix
//! and leaves the previous generation in place for rollback.

/// Owner credential (JSON `OwnerCredential`).
pub const WALLET: &str = "starkclaw.wallet.v1";

/// Session-key index (JSON array of `SessionCredential`).
pub const SESSION_INDEX: &str = "starkclaw.session_keys.v1";

/// Feature flags (JSON map of bools).
pub const FEATURE_FLAGS: &str = "starkclaw.feature_flags.v1";

/// Policy settings (JSON `Policy`).
pub const POLICY: &str = "starkclaw.policy.v1";

/// Activity log (JSON array of records, bounded).
pub const ACTIVITY: &str = "starkclaw.activity.v1";

/// Remote keyring-proxy credentials.
pub const KEYRING_CLIENT_ID: &str = "starkclaw.keyring.v1.client_id";
pub const KEYRING_HMAC_SECRET: &str = "starkclaw.keyring.v1.hmac_secret";
pub const KEYRING_KEY_ID: &str = "starkclaw.keyring.v1.key_id";

/// Prefix shared by every key the engine owns; `reset` wipes this prefix.
pub const PREFIX: &str = "starkclaw.";

/// Per-session private key, keyed by the canonical hex of the public key.
pub fn session_secret(public_key_hex: &str) -> String {
    format!("starkclaw.session_pk.{public_key_hex}")
}
