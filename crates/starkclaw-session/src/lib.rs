//! starkclaw-session
//!
//! Lifecycle of session credentials: local creation, on-chain registration
//! and revocation, emergency revoke-all, and fail-closed on-chain validity
//! queries. All on-chain writes are owner-signed; the typed-data consent
//! artifact is built and signed before any transaction leaves the device.

mod index;
mod registry;

pub use index::SessionIndex;
pub use registry::{CreateSessionParams, SessionRegistry};
