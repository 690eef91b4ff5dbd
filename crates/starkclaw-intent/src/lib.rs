//! starkclaw-intent
//!
//! Turns user/agent intents (transfer, swap) into validated, immutable
//! prepared actions, and executes prepared actions through the configured
//! session signer. Nothing here signs or submits unless preparation — and
//! with it the policy gate — succeeded.

mod engine;
mod swap;

pub use engine::{ExecuteOutcome, IntentEngine, TransferIntent};
pub use swap::{AggregatorClient, AggregatorPreset, SwapIntent, SwapQuote};
