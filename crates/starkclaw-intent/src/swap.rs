//! Aggregator quote client for swap intents.
//!
//! The set of routers a quote may name is bounded by the active preset;
//! a quote routed anywhere else is rejected before it reaches the policy
//! gate. Approvals are always the exact sell amount.

use num_bigint::BigUint;
use serde_json::Value;
use starknet::core::types::Felt;
use url::Url;

use starkclaw_core::codec::{biguint_from_decimal, felt_from_hex, felt_to_hex};
use starkclaw_core::{CoreError, NetworkId, TokenSymbol};

/// A vetted aggregator deployment: base URL plus the routers it may quote.
#[derive(Debug, Clone)]
pub struct AggregatorPreset {
    pub id: String,
    pub base_url: String,
    pub routers: Vec<Felt>,
}

impl AggregatorPreset {
    /// Default preset per network.
    pub fn default_for(network: NetworkId) -> Self {
        match network {
            NetworkId::Sepolia => Self {
                id: "avnu-sepolia".into(),
                base_url: "https://sepolia.api.avnu.fi".into(),
                routers: vec![
                    // AVNU exchange router on Sepolia.
                    felt_from_hex(
                        "0x02c56e8b00dbe2a71e57472685378fc8988bba947e9a99b26a00fade2b4fe7c2",
                    )
                    .unwrap_or(Felt::ZERO),
                ],
            },
            NetworkId::Mainnet => Self {
                id: "avnu-mainnet".into(),
                base_url: "https://starknet.api.avnu.fi".into(),
                routers: vec![
                    felt_from_hex(
                        "0x04270219d365d6b017231b52e92b3fb5d7c8378b05e9abc97724537a80e93b0f",
                    )
                    .unwrap_or(Felt::ZERO),
                ],
            },
        }
    }

    pub fn allows_router(&self, router: &Felt) -> bool {
        self.routers.contains(router)
    }
}

/// A swap intent as entered by the user or the agent tool.
#[derive(Debug, Clone)]
pub struct SwapIntent {
    pub network: NetworkId,
    pub sell_token: TokenSymbol,
    pub buy_token: TokenSymbol,
    pub amount_text: String,
    pub session_public_key: Option<Felt>,
}

/// A quote as returned by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    pub buy_amount: BigUint,
    pub router_address: Felt,
    pub router_entrypoint: String,
    pub router_calldata: Vec<Felt>,
    pub route_summary: String,
}

impl SwapQuote {
    pub fn from_json(value: &Value) -> Result<Self, CoreError> {
        let buy_amount = value
            .get("buyAmount")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::Unavailable("quote is missing buyAmount".into()))?;
        let router = value
            .get("router")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::Unavailable("quote is missing router".into()))?;
        let entrypoint = value
            .get("entrypoint")
            .and_then(Value::as_str)
            .unwrap_or("swap")
            .to_string();
        let calldata = value
            .get("calldata")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .ok_or_else(|| CoreError::Unavailable("quote calldata not hex".into()))
                            .and_then(felt_from_hex)
                    })
                    .collect::<Result<Vec<Felt>, CoreError>>()
            })
            .transpose()?
            .unwrap_or_default();
        let route_summary = value
            .get("routes")
            .and_then(Value::as_array)
            .map(|routes| {
                routes
                    .iter()
                    .filter_map(|r| r.get("name").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(" -> ")
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "direct".into());

        Ok(Self {
            buy_amount: biguint_from_decimal(buy_amount)
                .map_err(|_| CoreError::Unavailable("quote buyAmount is not a decimal".into()))?,
            router_address: felt_from_hex(router)
                .map_err(|_| CoreError::Unavailable("quote router is not a felt".into()))?,
            router_entrypoint: entrypoint,
            router_calldata: calldata,
            route_summary,
        })
    }
}

/// Thin HTTP client for the aggregator's quote endpoint.
pub struct AggregatorClient {
    base_url: Url,
    http: reqwest::Client,
}

impl AggregatorClient {
    pub fn new(preset: &AggregatorPreset) -> Result<Self, CoreError> {
        let base_url = Url::parse(&preset.base_url)
            .map_err(|e| CoreError::Internal(format!("aggregator base URL: {e}")))?;
        Ok(Self { base_url, http: reqwest::Client::new() })
    }

    pub async fn quote(
        &self,
        sell_token: Felt,
        buy_token: Felt,
        sell_amount: &BigUint,
    ) -> Result<SwapQuote, CoreError> {
        let mut url = self
            .base_url
            .join("swap/v1/quote")
            .map_err(|e| CoreError::Internal(format!("quote endpoint join: {e}")))?;
        url.query_pairs_mut()
            .append_pair("sellTokenAddress", &felt_to_hex(&sell_token))
            .append_pair("buyTokenAddress", &felt_to_hex(&buy_token))
            .append_pair("sellAmount", &sell_amount.to_string());

        let response = self
            .http
            .get(url)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::TransportTimeout("aggregator quote timed out".into())
                } else {
                    CoreError::Unavailable(format!("aggregator unreachable: {e}"))
                }
            })?;
        if !response.status().is_success() {
            return Err(CoreError::Unavailable(format!(
                "aggregator returned HTTP {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| CoreError::Unavailable(format!("aggregator response not JSON: {e}")))?;
        SwapQuote::from_json(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_parses_the_documented_shape() {
        let quote = SwapQuote::from_json(&serde_json::json!({
            "buyAmount": "990000",
            "router": "0x2c56",
            "entrypoint": "multi_route_swap",
            "calldata": ["0x1", "0x2"],
            "routes": [{"name": "Ekubo"}, {"name": "JediSwap"}],
        }))
        .unwrap();
        assert_eq!(quote.buy_amount, BigUint::from(990_000u64));
        assert_eq!(quote.router_entrypoint, "multi_route_swap");
        assert_eq!(quote.router_calldata.len(), 2);
        assert_eq!(quote.route_summary, "Ekubo -> JediSwap");
    }

    #[test]
    fn quote_without_routes_reads_direct() {
        let quote = SwapQuote::from_json(&serde_json::json!({
            "buyAmount": "5",
            "router": "0x1",
        }))
        .unwrap();
        assert_eq!(quote.route_summary, "direct");
        assert!(quote.router_calldata.is_empty());
    }

    #[test]
    fn quote_missing_fields_is_unavailable() {
        let err = SwapQuote::from_json(&serde_json::json!({ "router": "0x1" })).unwrap_err();
        assert_eq!(err.machine_code(), "UNAVAILABLE");
    }

    #[test]
    fn preset_bounds_routers() {
        let preset = AggregatorPreset::default_for(NetworkId::Sepolia);
        assert!(!preset.allows_router(&Felt::from(0x999u64)));
        assert!(preset.allows_router(&preset.routers[0]));
    }
}
