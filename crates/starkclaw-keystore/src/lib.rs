//! starkclaw-keystore
//!
//! Platform-backed secret storage. Everything the engine persists — the owner
//! credential, per-session private keys, the session index, feature flags,
//! remote-signer credentials and the activity log — goes through the
//! `SecureStore` trait under a documented key namespace.

pub mod flags;
pub mod namespace;
mod store;

pub use flags::FeatureFlags;
pub use store::{MemoryKeystore, SecureStore, SledKeystore};
