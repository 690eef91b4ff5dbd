//! starkclaw-rpc
//!
//! Thin Starknet JSON-RPC client plus the invoke-v3 assembly the signers
//! feed, and the self-rescheduling status poller that tracks submitted
//! transactions to a terminal state.
//!
//! Uses raw HTTP POST with serde_json rather than a full RPC framework to
//! keep the client lean: one method per call, fixed request id, no
//! multiplexing.

mod client;
mod invoke;
mod poller;
mod receipt;

pub use client::ProviderClient;
pub use invoke::{calls_hash, execute_calldata, invoke_v3_hash, Call, InvokeDraft, ResourceBounds, ResourceBoundsMapping};
pub use poller::{PollerGates, PollerHandle, StatusPoller};
pub use receipt::{ReceiptProvider, TxReceiptStatus};
