//! starkclaw-policy
//!
//! Local pre-flight policy enforcement. Every prepared action passes through
//! `PolicyEngine::evaluate` before a signer ever sees it; denials carry one
//! user-facing sentence and a stable machine code, and the evaluation order
//! is fixed so tightening any bound can only turn ALLOW into DENY.

mod engine;
mod rates;
mod window;

pub use engine::{ContractAllowlistMode, Policy, PolicyEngine, Verdict};
pub use rates::usd_cents_for_amount;
pub use window::SpendWindow;
