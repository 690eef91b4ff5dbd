use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, RwLock};

use num_traits::Zero;
use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;

use starkclaw_core::codec::biguint_from_decimal;
use starkclaw_core::token::token_by_symbol;
use starkclaw_core::{
    CoreError, NetworkId, PreparedAction, PreparedActionKind, SessionCredential, Timestamp,
};
use starkclaw_keystore::{namespace, SecureStore};

use crate::rates::usd_cents_for_amount;
use crate::window::SpendWindow;

/// How targets outside the trusted list are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContractAllowlistMode {
    TrustedOnly,
    Warn,
    Open,
}

/// Process-wide policy settings. Mutations go through `PolicyEngine::update`,
/// which the app shell only reaches after owner authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub daily_spend_cap_usd_cents: u64,
    pub per_tx_cap_usd_cents: u64,
    pub allowlisted_recipients: BTreeSet<Felt>,
    pub contract_allowlist_mode: ContractAllowlistMode,
    pub allowed_targets: Vec<Felt>,
    pub allowed_targets_preset: String,
    pub emergency_lockdown: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            daily_spend_cap_usd_cents: 50_000,
            per_tx_cap_usd_cents: 10_000,
            allowlisted_recipients: BTreeSet::new(),
            contract_allowlist_mode: ContractAllowlistMode::Warn,
            allowed_targets: Vec::new(),
            allowed_targets_preset: "default".into(),
            emergency_lockdown: false,
        }
    }
}

/// A passed pre-flight check. Warnings ride along without blocking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub warnings: Vec<String>,
}

pub struct PolicyEngine {
    policy: RwLock<Policy>,
    window: Mutex<SpendWindow>,
    store: Option<Arc<dyn SecureStore>>,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(Policy::default())
    }
}

impl PolicyEngine {
    /// In-memory engine with the given starting policy.
    pub fn new(policy: Policy) -> Self {
        Self {
            policy: RwLock::new(policy),
            window: Mutex::new(SpendWindow::new()),
            store: None,
        }
    }

    /// Engine backed by the secure store: the persisted policy is loaded at
    /// open and every update is written through.
    pub fn open(store: Arc<dyn SecureStore>) -> Result<Self, CoreError> {
        let policy = match store.get(namespace::POLICY)? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| CoreError::Internal(format!("policy document corrupt: {e}")))?,
            None => Policy::default(),
        };
        let mut engine = Self::new(policy);
        engine.store = Some(store);
        Ok(engine)
    }

    pub fn policy(&self) -> Policy {
        self.policy.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Replace or adjust the policy. The caller holds owner authentication;
    /// this engine only applies the already-authorized change.
    pub fn update<F: FnOnce(&mut Policy)>(&self, apply: F) -> Result<(), CoreError> {
        let mut policy = self.policy.write().unwrap_or_else(|p| p.into_inner());
        apply(&mut policy);
        tracing::info!(lockdown = policy.emergency_lockdown, "policy updated");
        if let Some(store) = &self.store {
            let json = serde_json::to_string(&*policy)
                .map_err(|e| CoreError::Internal(format!("policy encode: {e}")))?;
            store.set(namespace::POLICY, &json)?;
        }
        Ok(())
    }

    /// Record a completed spend into the rolling 24 h window.
    pub fn record_spend(&self, cents: u64, now: Timestamp) {
        self.window.lock().unwrap_or_else(|p| p.into_inner()).record(cents, now);
    }

    /// Pre-flight check, applied to every prepared action in a fixed order:
    /// lockdown, token identity, amount, session spend limit, USD caps,
    /// target allow-list mode, recipient allow-list, per-session contracts.
    pub fn evaluate(
        &self,
        action: &PreparedAction,
        session: &SessionCredential,
        network: NetworkId,
        now: Timestamp,
    ) -> Result<Verdict, CoreError> {
        let policy = self.policy.read().unwrap_or_else(|p| p.into_inner()).clone();
        let mut warnings = action.warnings.clone();

        if policy.emergency_lockdown {
            return Err(CoreError::EmergencyLockdown);
        }

        let token = token_by_symbol(action.token_symbol);
        if token.address_on(network) != action.token_address {
            return Err(CoreError::PolicyDenied(format!(
                "{} is not a supported token on {network}",
                action.token_symbol
            )));
        }

        let amount = biguint_from_decimal(&action.amount_base_units)?;
        if amount.is_zero() {
            return Err(CoreError::PolicyDenied(
                "amount must be greater than zero".into(),
            ));
        }

        let limit = biguint_from_decimal(&session.spending_limit_base_units)?;
        if amount > limit {
            return Err(CoreError::PolicyDenied(format!(
                "amount exceeds the session spend limit of {} {} base units",
                limit, action.token_symbol
            )));
        }

        let usd_cents = usd_cents_for_amount(token, &amount);
        if usd_cents > policy.per_tx_cap_usd_cents {
            return Err(CoreError::PolicyDenied(format!(
                "amount ${}.{:02} exceeds the per-transaction cap of ${}.{:02}",
                usd_cents / 100,
                usd_cents % 100,
                policy.per_tx_cap_usd_cents / 100,
                policy.per_tx_cap_usd_cents % 100,
            )));
        }

        let spent = self.window.lock().unwrap_or_else(|p| p.into_inner()).total(now);
        if spent.saturating_add(usd_cents) > policy.daily_spend_cap_usd_cents {
            return Err(CoreError::PolicyDenied(format!(
                "daily spend cap of ${}.{:02} would be exceeded",
                policy.daily_spend_cap_usd_cents / 100,
                policy.daily_spend_cap_usd_cents % 100,
            )));
        }

        // The contract actually invoked: the token for transfers, the quoted
        // router for swaps.
        let target = action
            .swap
            .as_ref()
            .map(|s| s.router_address)
            .unwrap_or(action.token_address);
        match policy.contract_allowlist_mode {
            ContractAllowlistMode::TrustedOnly => {
                if !policy.allowed_targets.contains(&target) {
                    return Err(CoreError::PolicyDenied(
                        "target contract is not in the trusted allow-list".into(),
                    ));
                }
            }
            ContractAllowlistMode::Warn => {
                if !policy.allowed_targets.contains(&target) {
                    warnings.push("target contract is outside the configured allow-list".into());
                }
            }
            ContractAllowlistMode::Open => {}
        }

        if action.kind == PreparedActionKind::Erc20Transfer
            && !policy.allowlisted_recipients.is_empty()
            && !policy.allowlisted_recipients.contains(&action.to)
        {
            return Err(CoreError::PolicyDenied(
                "recipient is not in the allow-list".into(),
            ));
        }

        if !session.allowed_contracts.is_empty() && !session.allowed_contracts.contains(&target) {
            return Err(CoreError::PolicyDenied(
                "target contract is not allowed for this session key".into(),
            ));
        }

        Ok(Verdict { warnings })
    }
}
