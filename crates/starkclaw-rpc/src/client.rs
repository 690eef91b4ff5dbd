use std::time::Duration;

use serde_json::{json, Value};
use starknet::core::types::Felt;
use starknet::core::utils::get_selector_from_name;

use num_bigint::BigUint;
use starkclaw_core::codec::{bigint_from_u256, felt_from_hex};
use starkclaw_core::constants::{RPC_READ_TIMEOUT_SECS, RPC_TIMEOUT_SECS};
use starkclaw_core::{CoreError, NetworkId};

use crate::receipt::TxReceiptStatus;

/// JSON-RPC error code for "transaction hash not found".
const TXN_HASH_NOT_FOUND: i64 = 29;

/// Simple JSON-RPC 2.0 client for a Starknet node.
///
/// Single request per call with a fixed id of 1 — the client never
/// multiplexes. Reads use a tighter timeout than submissions.
pub struct ProviderClient {
    url: String,
    http: reqwest::Client,
}

impl ProviderClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Client against the network's default public endpoint.
    pub fn for_network(network: NetworkId) -> Self {
        Self::new(network.rpc_url())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call a JSON-RPC method and return the `result` field.
    pub(crate) async fn call_method(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, CoreError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&self.url)
            .header("content-type", "application/json")
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::TransportTimeout(format!("{method} against {}", self.url))
                } else {
                    CoreError::Transport(format!("{method} against {}: {e}", self.url))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let snippet: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(CoreError::Rpc {
                code: None,
                message: format!("HTTP {status} from {method}: {snippet}"),
            });
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| CoreError::Transport(format!("parsing {method} response: {e}")))?;

        if let Some(err) = payload.get("error") {
            let code = err.get("code").and_then(Value::as_i64);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error")
                .to_string();
            let message = match err.get("data") {
                Some(data) if !data.is_null() => format!("{message} ({data})"),
                _ => message,
            };
            return Err(CoreError::Rpc { code, message });
        }

        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    fn read_timeout() -> Duration {
        Duration::from_secs(RPC_READ_TIMEOUT_SECS)
    }

    fn write_timeout() -> Duration {
        Duration::from_secs(RPC_TIMEOUT_SECS)
    }

    // ── Read methods ─────────────────────────────────────────────────────────

    pub async fn chain_id(&self) -> Result<Felt, CoreError> {
        let result = self
            .call_method("starknet_chainId", json!([]), Self::read_timeout())
            .await?;
        felt_from_value(&result, "chainId")
    }

    /// `starknet_call` against the latest block.
    pub async fn contract_call(
        &self,
        contract_address: Felt,
        entrypoint: &str,
        calldata: &[Felt],
    ) -> Result<Vec<Felt>, CoreError> {
        let selector = selector(entrypoint)?;
        let request = json!({
            "contract_address": hex(&contract_address),
            "entry_point_selector": hex(&selector),
            "calldata": calldata.iter().map(hex).collect::<Vec<_>>(),
        });
        let result = self
            .call_method("starknet_call", json!([request, "latest"]), Self::read_timeout())
            .await?;
        let Value::Array(items) = result else {
            return Err(CoreError::Rpc {
                code: None,
                message: "starknet_call result is not an array".into(),
            });
        };
        items.iter().map(|v| felt_from_value(v, "call result")).collect()
    }

    pub async fn get_class_hash_at(&self, address: Felt) -> Result<Felt, CoreError> {
        let result = self
            .call_method(
                "starknet_getClassHashAt",
                json!(["latest", hex(&address)]),
                Self::read_timeout(),
            )
            .await?;
        felt_from_value(&result, "class hash")
    }

    pub async fn get_nonce(&self, address: Felt) -> Result<Felt, CoreError> {
        let result = self
            .call_method(
                "starknet_getNonce",
                json!(["pending", hex(&address)]),
                Self::read_timeout(),
            )
            .await?;
        felt_from_value(&result, "nonce")
    }

    /// Receipt for a transaction, or `None` while the node does not know the
    /// hash yet.
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: Felt,
    ) -> Result<Option<TxReceiptStatus>, CoreError> {
        let result = self
            .call_method(
                "starknet_getTransactionReceipt",
                json!([hex(&tx_hash)]),
                Self::read_timeout(),
            )
            .await;
        match result {
            Ok(value) => Ok(Some(TxReceiptStatus::from_json(&value)?)),
            Err(CoreError::Rpc { code: Some(TXN_HASH_NOT_FOUND), .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// ERC-20 `balanceOf` as a full-width integer.
    pub async fn erc20_balance_of(
        &self,
        token: Felt,
        account: Felt,
    ) -> Result<BigUint, CoreError> {
        let result = self.contract_call(token, "balanceOf", &[account]).await?;
        if result.len() != 2 {
            return Err(CoreError::Rpc {
                code: None,
                message: format!("balanceOf returned {} felts, expected u256 pair", result.len()),
            });
        }
        bigint_from_u256(&result[0], &result[1])
    }

    // ── Write methods ────────────────────────────────────────────────────────

    pub(crate) async fn add_invoke_transaction(&self, tx: Value) -> Result<Felt, CoreError> {
        let result = self
            .call_method("starknet_addInvokeTransaction", json!([tx]), Self::write_timeout())
            .await?;
        let hash = result
            .get("transaction_hash")
            .ok_or_else(|| CoreError::Rpc {
                code: None,
                message: "addInvokeTransaction result missing transaction_hash".into(),
            })?;
        felt_from_value(hash, "transaction hash")
    }

    pub(crate) async fn estimate_fee(&self, tx: Value) -> Result<Value, CoreError> {
        let result = self
            .call_method(
                "starknet_estimateFee",
                json!([[tx], ["SKIP_VALIDATE"], "pending"]),
                Self::write_timeout(),
            )
            .await?;
        result
            .as_array()
            .and_then(|a| a.first())
            .cloned()
            .ok_or_else(|| CoreError::Rpc {
                code: None,
                message: "estimateFee returned no estimates".into(),
            })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

pub(crate) fn hex(f: &Felt) -> String {
    format!("{f:#x}")
}

pub(crate) fn selector(entrypoint: &str) -> Result<Felt, CoreError> {
    get_selector_from_name(entrypoint)
        .map_err(|e| CoreError::InvalidInput(format!("bad entrypoint name {entrypoint:?}: {e}")))
}

pub(crate) fn felt_from_value(v: &Value, what: &str) -> Result<Felt, CoreError> {
    let s = v.as_str().ok_or_else(|| CoreError::Rpc {
        code: None,
        message: format!("{what} is not a hex string: {v}"),
    })?;
    felt_from_hex(s).map_err(|_| CoreError::Rpc {
        code: None,
        message: format!("{what} is not a valid felt: {s}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matches_known_transfer_value() {
        // Canonical entry-point selector for "transfer".
        let s = selector("transfer").unwrap();
        assert_eq!(
            hex(&s),
            "0x83afd3f4caedc6eebf44246fe54e38c95e3179a5ec9ea81740eca5b482d12e"
        );
    }

    #[test]
    fn felt_from_value_rejects_non_strings() {
        assert!(felt_from_value(&serde_json::json!(5), "x").is_err());
        assert!(felt_from_value(&serde_json::json!("0xzz"), "x").is_err());
        assert!(felt_from_value(&serde_json::json!("0x1a"), "x").is_ok());
    }
}
