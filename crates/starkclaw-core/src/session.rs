//! Shared data model: owner and session credentials, prepared actions.
//!
//! Session private keys are NOT part of `SessionCredential`; they live in the
//! secure keystore under their own namespaced key and only exist in process
//! memory for the duration of a signing call.

use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;
use std::fmt;

use crate::constants::MAX_ALLOWED_TARGETS;
use crate::error::CoreError;
use crate::network::NetworkId;
use crate::token::TokenSymbol;
use crate::Timestamp;

// ── Owner credential ─────────────────────────────────────────────────────────

/// The device owner's account credential. Created once per device, destroyed
/// only by explicit reset.
#[derive(Clone, Serialize, Deserialize)]
pub struct OwnerCredential {
    pub private_key: Felt,
    pub public_key: Felt,
    pub account_address: Felt,
    pub class_hash: Felt,
    pub network_id: NetworkId,
}

impl fmt::Debug for OwnerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerCredential")
            .field("public_key", &format_args!("{:#x}", self.public_key))
            .field("account_address", &format_args!("{:#x}", self.account_address))
            .field("network_id", &self.network_id)
            .finish_non_exhaustive()
    }
}

// ── Session credential ───────────────────────────────────────────────────────

/// A scoped, revocable session key as stored in the local index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredential {
    /// Identity: the session public key.
    pub public_key: Felt,
    pub token_symbol: TokenSymbol,
    pub token_address: Felt,
    /// Decimal string of base units; non-negative.
    pub spending_limit_base_units: String,
    pub valid_after: Timestamp,
    pub valid_until: Timestamp,
    /// Up to four target contracts; empty means wildcard.
    #[serde(default)]
    pub allowed_contracts: Vec<Felt>,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tx_hash: Option<Felt>,
}

impl SessionCredential {
    /// Structural validity of the stored record.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.valid_after >= self.valid_until {
            return Err(CoreError::InvalidInput(
                "session validity window is empty (valid_after >= valid_until)".into(),
            ));
        }
        if self.valid_until <= self.created_at + crate::constants::MIN_SESSION_VALIDITY_SECS {
            return Err(CoreError::InvalidInput(format!(
                "session must remain valid at least {}s past creation",
                crate::constants::MIN_SESSION_VALIDITY_SECS
            )));
        }
        if self.allowed_contracts.len() > MAX_ALLOWED_TARGETS {
            return Err(CoreError::InvalidInput(format!(
                "at most {MAX_ALLOWED_TARGETS} allowed contracts per session"
            )));
        }
        if self.spending_limit_base_units.trim().is_empty()
            || !self
                .spending_limit_base_units
                .bytes()
                .all(|b| b.is_ascii_digit())
        {
            return Err(CoreError::InvalidInput(
                "spending limit must be a non-negative decimal integer".into(),
            ));
        }
        Ok(())
    }

    /// Local usability: not revoked and inside `[valid_after, valid_until)`.
    /// On-chain usability is checked separately and fail-closed.
    pub fn is_usable_at(&self, now: Timestamp) -> bool {
        self.revoked_at.is_none() && now >= self.valid_after && now < self.valid_until
    }
}

// ── Prepared actions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreparedActionKind {
    Erc20Transfer,
    Swap,
}

/// Session policy fields carried alongside a prepared action so the executor
/// and any UI confirmation render from the same snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPolicySnapshot {
    pub spending_limit_base_units: String,
    pub valid_until: Timestamp,
}

/// Swap-specific fields attached when `kind == Swap`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapDetail {
    pub buy_token_symbol: TokenSymbol,
    pub buy_amount_base_units: String,
    /// Bounded approval: exactly the sell amount, never unlimited.
    pub approval_base_units: String,
    pub route_summary: String,
    /// Router the aggregator quoted; must sit inside the active preset.
    pub router_address: Felt,
    pub router_entrypoint: String,
    pub router_calldata: Vec<Felt>,
}

/// An immutable, validated description of a pending on-chain operation.
/// Construction happens only in the intent preparer; nothing mutates one
/// after it is returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedAction {
    pub kind: PreparedActionKind,
    pub token_symbol: TokenSymbol,
    pub token_address: Felt,
    pub to: Felt,
    /// Human-entered decimal amount.
    pub amount: String,
    pub amount_base_units: String,
    pub balance_base_units: String,
    pub calldata: Vec<Felt>,
    pub session_public_key: Felt,
    pub policy: ActionPolicySnapshot,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap: Option<SwapDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> SessionCredential {
        SessionCredential {
            public_key: Felt::from(7u8),
            token_symbol: TokenSymbol::Usdc,
            token_address: Felt::from(1u8),
            spending_limit_base_units: "10000000".into(),
            valid_after: 1_000,
            valid_until: 10_000,
            allowed_contracts: vec![],
            created_at: 1_000,
            registered_at: None,
            revoked_at: None,
            last_tx_hash: None,
        }
    }

    #[test]
    fn window_must_be_nonempty_and_past_creation() {
        let mut c = credential();
        assert!(c.validate().is_ok());
        c.valid_until = c.valid_after;
        assert!(c.validate().is_err());
        c = credential();
        c.valid_until = c.created_at + 30;
        assert!(c.validate().is_err());
    }

    #[test]
    fn allowed_contracts_capped_at_four() {
        let mut c = credential();
        c.allowed_contracts = (0..5u8).map(Felt::from).collect();
        assert!(c.validate().is_err());
        c.allowed_contracts.truncate(4);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn usability_excludes_revoked_and_out_of_window() {
        let mut c = credential();
        assert!(c.is_usable_at(5_000));
        assert!(!c.is_usable_at(999));
        assert!(!c.is_usable_at(10_000));
        c.revoked_at = Some(6_000);
        assert!(!c.is_usable_at(5_000));
    }

    #[test]
    fn spending_limit_must_be_decimal() {
        let mut c = credential();
        c.spending_limit_base_units = "-5".into();
        assert!(c.validate().is_err());
        c.spending_limit_base_units = "0".into();
        assert!(c.validate().is_ok());
    }
}
