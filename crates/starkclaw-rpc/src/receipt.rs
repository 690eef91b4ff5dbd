//! Receipt status extraction and the confirmation wait loop.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use starknet::core::types::Felt;

use starkclaw_core::constants::{CONFIRM_INTERVAL_SECS, CONFIRM_RETRIES};
use starkclaw_core::CoreError;

use crate::client::ProviderClient;

/// The slice of a transaction receipt the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceiptStatus {
    pub execution_status: String,
    pub finality_status: String,
    pub revert_reason: Option<String>,
}

impl TxReceiptStatus {
    pub(crate) fn from_json(receipt: &Value) -> Result<Self, CoreError> {
        let execution_status = receipt
            .get("execution_status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let finality_status = receipt
            .get("finality_status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let revert_reason = receipt
            .get("revert_reason")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self { execution_status, finality_status, revert_reason })
    }

    /// The transaction failed on-chain.
    pub fn is_reverted(&self) -> bool {
        matches!(self.execution_status.as_str(), "REVERTED" | "FAILED")
    }

    /// The transaction executed successfully (or reached accepted finality
    /// without an execution verdict, which older nodes report).
    pub fn is_succeeded(&self) -> bool {
        self.execution_status == "SUCCEEDED" || (!self.is_reverted() && self.finality_status.starts_with("ACCEPTED"))
    }
}

/// Receipt lookup seam so the poller can run against a fake in tests.
pub trait ReceiptProvider: Send + Sync {
    fn receipt_status(
        &self,
        tx_hash: Felt,
    ) -> impl Future<Output = Result<Option<TxReceiptStatus>, CoreError>> + Send;
}

impl ReceiptProvider for ProviderClient {
    fn receipt_status(
        &self,
        tx_hash: Felt,
    ) -> impl Future<Output = Result<Option<TxReceiptStatus>, CoreError>> + Send {
        self.get_transaction_receipt(tx_hash)
    }
}

impl ProviderClient {
    /// Poll for a receipt until the transaction reaches a terminal state or
    /// the retry budget runs out (60 × 3 s).
    pub async fn wait_for_acceptance(&self, tx_hash: Felt) -> Result<TxReceiptStatus, CoreError> {
        for _ in 0..CONFIRM_RETRIES {
            match self.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.is_reverted() || receipt.is_succeeded() => {
                    return Ok(receipt);
                }
                Ok(_) => {}
                Err(e) if e.retryable() => {
                    tracing::debug!(error = %e, "receipt fetch failed, retrying");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(Duration::from_secs(CONFIRM_INTERVAL_SECS)).await;
        }
        Err(CoreError::TransportTimeout(format!(
            "transaction {tx_hash:#x} not confirmed after {}s",
            CONFIRM_RETRIES as u64 * CONFIRM_INTERVAL_SECS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(exec: &str, finality: &str) -> TxReceiptStatus {
        TxReceiptStatus {
            execution_status: exec.into(),
            finality_status: finality.into(),
            revert_reason: None,
        }
    }

    #[test]
    fn reverted_and_failed_map_to_reverted() {
        assert!(status("REVERTED", "ACCEPTED_ON_L2").is_reverted());
        assert!(status("FAILED", "").is_reverted());
        assert!(!status("SUCCEEDED", "ACCEPTED_ON_L2").is_reverted());
    }

    #[test]
    fn accepted_finality_counts_as_success() {
        assert!(status("SUCCEEDED", "ACCEPTED_ON_L2").is_succeeded());
        assert!(status("", "ACCEPTED_ON_L1").is_succeeded());
        assert!(!status("", "RECEIVED").is_succeeded());
        assert!(!status("REVERTED", "ACCEPTED_ON_L2").is_succeeded());
    }

    #[test]
    fn from_json_extracts_revert_reason() {
        let receipt = serde_json::json!({
            "execution_status": "REVERTED",
            "finality_status": "ACCEPTED_ON_L2",
            "revert_reason": "assert failed",
        });
        let parsed = TxReceiptStatus::from_json(&receipt).unwrap();
        assert!(parsed.is_reverted());
        assert_eq!(parsed.revert_reason.as_deref(), Some("assert failed"));
    }
}
