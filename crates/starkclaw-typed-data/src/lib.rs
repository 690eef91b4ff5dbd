//! starkclaw-typed-data
//!
//! Deterministic SNIP-12 v2 typed-data construction for session
//! administration and session-transaction signing.
//!
//! Field order inside each type is part of the hash. Payloads are therefore
//! plain structs — serde emits struct fields in declaration order, so the
//! wire order is fixed at compile time and can never drift with a map
//! implementation. The same field order feeds the Poseidon struct hash.
//!
//! The domain is pinned to `name = "Starkclaw", version = "2"`. There is no
//! version-"1" code path anywhere in this crate.

mod hash;
mod payload;

pub use hash::{short_string_felt, type_hash};
pub use payload::{
    build_emergency_revoke_all, build_register_session_key, build_revoke_session_key,
    build_session_transaction, BuiltTypedData, EmergencyRevokeAllInput, RegisterSessionKeyInput,
    RevokeSessionKeyInput, SessionTransactionInput,
};
