use std::sync::Arc;

use num_bigint::BigUint;
use serde::Serialize;
use starknet::core::types::Felt;
use starknet::core::utils::get_selector_from_name;

use starkclaw_activity::{ActivityDraft, ActivityKind, ActivityLog};
use starkclaw_core::codec::{
    biguint_from_decimal, felt_from_hex, felt_to_hex, parse_units, u256_from_bigint,
};
use starkclaw_core::session::ActionPolicySnapshot;
use starkclaw_core::token::token_by_symbol;
use starkclaw_core::{
    CoreError, NetworkId, OwnerCredential, PreparedAction, PreparedActionKind, SessionCredential,
    SwapDetail,
};
use starkclaw_keystore::{namespace, SecureStore};
use starkclaw_policy::{usd_cents_for_amount, PolicyEngine};
use starkclaw_rpc::{calls_hash, Call, ProviderClient};
use starkclaw_session::SessionRegistry;
use starkclaw_signer::{CallSpec, SessionSignRequest, SessionWalletSigner, SignContext};
use starkclaw_typed_data::{build_session_transaction, SessionTransactionInput};

use crate::swap::{AggregatorClient, AggregatorPreset, SwapIntent, SwapQuote};

/// A transfer intent as entered by the user or the agent tool.
#[derive(Debug, Clone)]
pub struct TransferIntent {
    pub network: NetworkId,
    pub token_symbol: starkclaw_core::TokenSymbol,
    pub amount_text: String,
    pub to: String,
    pub session_public_key: Option<Felt>,
}

/// What execution hands back to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOutcome {
    pub tx_hash: Felt,
    pub execution_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    pub signer_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_action_id: Option<String>,
}

pub struct IntentEngine {
    store: Arc<dyn SecureStore>,
    provider: Arc<ProviderClient>,
    registry: Arc<SessionRegistry>,
    policy: Arc<PolicyEngine>,
    activity: Arc<ActivityLog>,
    network: NetworkId,
    preset: AggregatorPreset,
}

impl IntentEngine {
    pub fn new(
        store: Arc<dyn SecureStore>,
        provider: Arc<ProviderClient>,
        registry: Arc<SessionRegistry>,
        policy: Arc<PolicyEngine>,
        activity: Arc<ActivityLog>,
        network: NetworkId,
    ) -> Self {
        let preset = AggregatorPreset::default_for(network);
        Self { store, provider, registry, policy, activity, network, preset }
    }

    pub fn with_preset(mut self, preset: AggregatorPreset) -> Self {
        self.preset = preset;
        self
    }

    fn owner(&self) -> Result<OwnerCredential, CoreError> {
        let json = self
            .store
            .get(namespace::WALLET)?
            .ok_or_else(|| CoreError::InvalidInput("no wallet credential on this device".into()))?;
        serde_json::from_str(&json)
            .map_err(|e| CoreError::Internal(format!("owner credential corrupt: {e}")))
    }

    /// Resolve the session a prepared action binds to: the supplied key, or
    /// the most recent non-revoked credential.
    fn resolve_session(
        &self,
        supplied: Option<Felt>,
        now: i64,
    ) -> Result<SessionCredential, CoreError> {
        match supplied {
            Some(public_key) => {
                let credential = self.registry.index().find(&public_key)?;
                if !credential.is_usable_at(now) {
                    return Err(CoreError::SessionExpired);
                }
                Ok(credential)
            }
            None => self
                .registry
                .most_recent_usable(now)?
                .ok_or(CoreError::SessionNotFound(None)),
        }
    }

    // ── Transfer preparation ─────────────────────────────────────────────────

    /// Prepare an ERC-20 transfer: resolve and validate everything, bind it
    /// to a session, run the policy gate, and freeze the result.
    pub async fn prepare_transfer(&self, intent: &TransferIntent) -> Result<PreparedAction, CoreError> {
        if intent.network != self.network {
            return Err(CoreError::InvalidInput(format!(
                "intent targets {} but the wallet is on {}",
                intent.network, self.network
            )));
        }
        let token = token_by_symbol(intent.token_symbol);
        let token_address = token.address_on(self.network);
        let owner = self.owner()?;
        let balance = self
            .provider
            .erc20_balance_of(token_address, owner.account_address)
            .await?;
        self.prepare_transfer_with_balance(intent, balance)
    }

    fn prepare_transfer_with_balance(
        &self,
        intent: &TransferIntent,
        balance: BigUint,
    ) -> Result<PreparedAction, CoreError> {
        let token = token_by_symbol(intent.token_symbol);
        let token_address = token.address_on(self.network);
        let amount = parse_units(&intent.amount_text, token.decimals)?;
        let to = felt_from_hex(&intent.to)?;

        let now = starkclaw_core::unix_now();
        let session = self.resolve_session(intent.session_public_key, now)?;

        let mut warnings = Vec::new();
        if amount > balance {
            warnings.push(format!(
                "amount exceeds the current balance of {} base units",
                balance
            ));
        }

        let pair = u256_from_bigint(&amount)?;
        let calldata = vec![to, pair.low, pair.high];

        let action = PreparedAction {
            kind: PreparedActionKind::Erc20Transfer,
            token_symbol: intent.token_symbol,
            token_address,
            to,
            amount: intent.amount_text.trim().to_string(),
            amount_base_units: amount.to_string(),
            balance_base_units: balance.to_string(),
            calldata,
            session_public_key: session.public_key,
            policy: ActionPolicySnapshot {
                spending_limit_base_units: session.spending_limit_base_units.clone(),
                valid_until: session.valid_until,
            },
            warnings,
            swap: None,
        };

        let verdict = self.policy.evaluate(&action, &session, self.network, now)?;
        Ok(PreparedAction { warnings: verdict.warnings, ..action })
    }

    // ── Swap preparation ─────────────────────────────────────────────────────

    /// Prepare a swap: quote it through the preset-bounded aggregator, emit a
    /// bounded approval (exactly the sell amount), and run the policy gate.
    pub async fn prepare_swap(&self, intent: &SwapIntent) -> Result<PreparedAction, CoreError> {
        if intent.network != self.network {
            return Err(CoreError::InvalidInput(format!(
                "intent targets {} but the wallet is on {}",
                intent.network, self.network
            )));
        }
        let sell = token_by_symbol(intent.sell_token);
        let sell_address = sell.address_on(self.network);
        let buy_address = token_by_symbol(intent.buy_token).address_on(self.network);
        let amount = parse_units(&intent.amount_text, sell.decimals)?;

        let owner = self.owner()?;
        let balance = self
            .provider
            .erc20_balance_of(sell_address, owner.account_address)
            .await?;

        let quote = AggregatorClient::new(&self.preset)?
            .quote(sell_address, buy_address, &amount)
            .await?;
        self.prepare_swap_with_quote(intent, balance, quote)
    }

    fn prepare_swap_with_quote(
        &self,
        intent: &SwapIntent,
        balance: BigUint,
        quote: SwapQuote,
    ) -> Result<PreparedAction, CoreError> {
        if !self.preset.allows_router(&quote.router_address) {
            return Err(CoreError::PolicyDenied(format!(
                "quoted router {} is outside the {} preset",
                felt_to_hex(&quote.router_address),
                self.preset.id
            )));
        }

        let sell = token_by_symbol(intent.sell_token);
        let sell_address = sell.address_on(self.network);
        let amount = parse_units(&intent.amount_text, sell.decimals)?;

        let now = starkclaw_core::unix_now();
        let session = self.resolve_session(intent.session_public_key, now)?;

        let mut warnings = Vec::new();
        if amount > balance {
            warnings.push(format!(
                "amount exceeds the current balance of {} base units",
                balance
            ));
        }

        // The approve call the session signs; the approval is never MAX.
        let pair = u256_from_bigint(&amount)?;
        let calldata = vec![quote.router_address, pair.low, pair.high];

        let action = PreparedAction {
            kind: PreparedActionKind::Swap,
            token_symbol: intent.sell_token,
            token_address: sell_address,
            to: quote.router_address,
            amount: intent.amount_text.trim().to_string(),
            amount_base_units: amount.to_string(),
            balance_base_units: balance.to_string(),
            calldata,
            session_public_key: session.public_key,
            policy: ActionPolicySnapshot {
                spending_limit_base_units: session.spending_limit_base_units.clone(),
                valid_until: session.valid_until,
            },
            warnings,
            swap: Some(SwapDetail {
                buy_token_symbol: intent.buy_token,
                buy_amount_base_units: quote.buy_amount.to_string(),
                approval_base_units: amount.to_string(),
                route_summary: quote.route_summary,
                router_address: quote.router_address,
                router_entrypoint: quote.router_entrypoint,
                router_calldata: quote.router_calldata,
            }),
        };

        let verdict = self.policy.evaluate(&action, &session, self.network, now)?;
        Ok(PreparedAction { warnings: verdict.warnings, ..action })
    }

    // ── Execution ────────────────────────────────────────────────────────────

    /// Execute a prepared action through the given session signer. The
    /// pending activity record is persisted the moment submission is
    /// accepted; confirmation is the status poller's job.
    pub async fn execute(
        &self,
        action: &PreparedAction,
        signer: &SessionWalletSigner,
    ) -> Result<ExecuteOutcome, CoreError> {
        let owner = self.owner()?;
        let (calls, specs, tool) = self.call_plan(action)?;

        let draft = self
            .provider
            .prepare_invoke(owner.account_address, &calls)
            .await?;

        // The typed-data binding of this exact call plan doubles as the
        // action correlation id.
        let typed = build_session_transaction(&SessionTransactionInput {
            chain_id: draft.chain_id,
            account_address: owner.account_address,
            session_key: action.session_public_key,
            nonce: draft.nonce,
            valid_until: action.policy.valid_until,
            calls_hash: calls_hash(&calls),
        })?;
        let mobile_action_id = felt_to_hex(&typed.message_hash);

        let request = SessionSignRequest {
            account_address: owner.account_address,
            chain_id: draft.chain_id,
            nonce: draft.nonce,
            tx_hash: draft.tx_hash,
            valid_until: action.policy.valid_until,
            calls: specs,
            context: SignContext {
                tool: tool.to_string(),
                reason: format!("{} {} {}", tool, action.amount, action.token_symbol),
                mobile_action_id: Some(mobile_action_id.clone()),
            },
        };
        let signature = signer.sign_session_transaction(&request).await?;
        let tx_hash = self.provider.submit_invoke(&draft, &signature.to_vec()).await?;

        let kind = match action.kind {
            PreparedActionKind::Erc20Transfer => ActivityKind::TransferSubmitted,
            PreparedActionKind::Swap => ActivityKind::SwapSubmitted,
        };
        let mut record = ActivityDraft::new(
            kind,
            format!("Sent {} {}", action.amount, action.token_symbol),
        )
        .with_subtitle(format!("to {}", felt_to_hex(&action.to)))
        .with_tx_hash(tx_hash);
        record.signer_mode = Some(signer.mode().to_string());
        record.signer_request_id = signature.request_id.clone();
        record.mobile_action_id = Some(mobile_action_id.clone());
        self.activity.append(record)?;

        let amount = biguint_from_decimal(&action.amount_base_units)?;
        self.policy.record_spend(
            usd_cents_for_amount(token_by_symbol(action.token_symbol), &amount),
            starkclaw_core::unix_now(),
        );

        Ok(ExecuteOutcome {
            tx_hash,
            execution_status: "PENDING".into(),
            revert_reason: None,
            signer_mode: signer.mode().to_string(),
            signer_request_id: signature.request_id,
            mobile_action_id: Some(mobile_action_id),
        })
    }

    /// Calls and their remote-signing mirror for one prepared action.
    fn call_plan(
        &self,
        action: &PreparedAction,
    ) -> Result<(Vec<Call>, Vec<CallSpec>, &'static str), CoreError> {
        match action.kind {
            PreparedActionKind::Erc20Transfer => {
                let calls = vec![Call {
                    to: action.token_address,
                    selector: selector("transfer")?,
                    calldata: action.calldata.clone(),
                }];
                let specs = vec![CallSpec {
                    contract_address: action.token_address,
                    entrypoint: "transfer".into(),
                    calldata: action.calldata.clone(),
                }];
                Ok((calls, specs, "erc20_transfer"))
            }
            PreparedActionKind::Swap => {
                let detail = action.swap.as_ref().ok_or_else(|| {
                    CoreError::Internal("swap action is missing its swap detail".into())
                })?;
                let calls = vec![
                    Call {
                        to: action.token_address,
                        selector: selector("approve")?,
                        calldata: action.calldata.clone(),
                    },
                    Call {
                        to: detail.router_address,
                        selector: selector(&detail.router_entrypoint)?,
                        calldata: detail.router_calldata.clone(),
                    },
                ];
                let specs = vec![
                    CallSpec {
                        contract_address: action.token_address,
                        entrypoint: "approve".into(),
                        calldata: action.calldata.clone(),
                    },
                    CallSpec {
                        contract_address: detail.router_address,
                        entrypoint: detail.router_entrypoint.clone(),
                        calldata: detail.router_calldata.clone(),
                    },
                ];
                Ok((calls, specs, "swap"))
            }
        }
    }
}

fn selector(name: &str) -> Result<Felt, CoreError> {
    get_selector_from_name(name)
        .map_err(|e| CoreError::Internal(format!("selector for {name:?}: {e}")))
}
