//! starkclaw-core
//!
//! Shared foundation of the Starkclaw session-authority engine: field-element
//! and U256 codecs, the network/token registries, the session data model, and
//! the error taxonomy every other crate returns.

pub mod codec;
pub mod constants;
pub mod error;
pub mod network;
pub mod session;
pub mod token;

pub use codec::{
    bigint_from_u256, felt_from_hex, felt_to_hex, format_units, parse_units, u256_from_bigint,
    U256,
};
pub use error::CoreError;
pub use network::NetworkId;
pub use session::{
    ActionPolicySnapshot, OwnerCredential, PreparedAction, PreparedActionKind, SessionCredential,
    SwapDetail,
};
pub use token::{Token, TokenSymbol};

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Current Unix time in seconds.
pub fn unix_now() -> Timestamp {
    chrono::Utc::now().timestamp()
}
