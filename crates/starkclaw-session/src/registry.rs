use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::{Num, Zero};
use rand::RngCore;
use starknet::core::types::Felt;
use starknet::signers::SigningKey;

use starkclaw_activity::{ActivityDraft, ActivityKind, ActivityLog, ActivityStatus, StatusUpdate};
use starkclaw_core::codec::{
    biguint_from_decimal, biguint_to_felt, felt_to_hex, u256_from_bigint,
};
use starkclaw_core::constants::{
    MAX_ALLOWED_TARGETS, MIN_SESSION_VALIDITY_SECS, SESSION_ENTRYPOINTS, SESSION_MAX_CALLS,
    STARK_CURVE_ORDER_HEX,
};
use starkclaw_core::token::token_by_symbol;
use starkclaw_core::{CoreError, NetworkId, OwnerCredential, SessionCredential, TokenSymbol};
use starkclaw_keystore::SecureStore;
use starkclaw_rpc::{Call, ProviderClient};
use starkclaw_signer::OwnerSigner;
use starkclaw_typed_data::{
    build_emergency_revoke_all, build_register_session_key, build_revoke_session_key,
    EmergencyRevokeAllInput, RegisterSessionKeyInput, RevokeSessionKeyInput,
};

use crate::index::SessionIndex;

/// Inputs for local session-key creation.
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub token_symbol: TokenSymbol,
    /// Base units, decimal string, non-negative.
    pub spending_limit_base_units: String,
    pub valid_for_seconds: i64,
    pub allowed_contracts: Vec<Felt>,
}

pub struct SessionRegistry {
    index: SessionIndex,
    provider: Arc<ProviderClient>,
    activity: Arc<ActivityLog>,
    network: NetworkId,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn SecureStore>,
        provider: Arc<ProviderClient>,
        activity: Arc<ActivityLog>,
        network: NetworkId,
    ) -> Self {
        Self {
            index: SessionIndex::new(store),
            provider,
            activity,
            network,
        }
    }

    pub fn index(&self) -> &SessionIndex {
        &self.index
    }

    // ── Listing ──────────────────────────────────────────────────────────────

    /// All stored credentials, most recently created first.
    pub fn list_session_keys(&self) -> Result<Vec<SessionCredential>, CoreError> {
        let mut all = self.index.load()?;
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    /// The most recently created credential still usable at `now`.
    pub fn most_recent_usable(&self, now: i64) -> Result<Option<SessionCredential>, CoreError> {
        Ok(self
            .list_session_keys()?
            .into_iter()
            .find(|c| c.is_usable_at(now)))
    }

    // ── Creation ─────────────────────────────────────────────────────────────

    /// Generate a fresh session key: 32 random bytes normalized to a curve
    /// scalar, public key derived, secret persisted under its own namespaced
    /// key, credential appended to the index.
    pub fn create_local(&self, params: CreateSessionParams) -> Result<SessionCredential, CoreError> {
        if params.valid_for_seconds < MIN_SESSION_VALIDITY_SECS {
            return Err(CoreError::InvalidInput(format!(
                "session must be valid for at least {MIN_SESSION_VALIDITY_SECS} seconds"
            )));
        }
        if params.allowed_contracts.len() > MAX_ALLOWED_TARGETS {
            return Err(CoreError::InvalidInput(format!(
                "at most {MAX_ALLOWED_TARGETS} allowed contracts per session"
            )));
        }
        // Rejects signs, fractions and garbage; zero is a valid (if useless) limit.
        let _ = biguint_from_decimal(&params.spending_limit_base_units)?;

        let private_key = random_curve_scalar()?;
        let public_key = SigningKey::from_secret_scalar(private_key)
            .verifying_key()
            .scalar();

        let now = starkclaw_core::unix_now();
        let token = token_by_symbol(params.token_symbol);
        let credential = SessionCredential {
            public_key,
            token_symbol: params.token_symbol,
            token_address: token.address_on(self.network),
            spending_limit_base_units: params.spending_limit_base_units,
            valid_after: now,
            valid_until: now + params.valid_for_seconds,
            allowed_contracts: params.allowed_contracts,
            created_at: now,
            registered_at: None,
            revoked_at: None,
            last_tx_hash: None,
        };
        credential.validate()?;

        self.index.store_secret(&public_key, &private_key)?;
        self.index.append(credential.clone())?;
        self.activity.append(
            ActivityDraft::new(ActivityKind::SessionCreated, "Session key created")
                .with_subtitle(format!(
                    "{} limit, expires in {}s",
                    credential.token_symbol, params.valid_for_seconds
                ))
                .with_status(ActivityStatus::Succeeded),
        )?;

        tracing::info!(session_key = %felt_to_hex(&public_key), "session key created");
        Ok(credential)
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Register a session key on the account contract. Owner-signed.
    ///
    /// The on-chain API scopes sessions by entry-point selector only; a
    /// credential carrying contract restrictions cannot be represented there
    /// and is rejected outright. The local list stays in force for
    /// preparer-side filtering.
    pub async fn register_onchain(
        &self,
        owner: &OwnerCredential,
        public_key: Felt,
    ) -> Result<Felt, CoreError> {
        let credential = self.index.find(&public_key)?;
        if !credential.allowed_contracts.is_empty() {
            return Err(CoreError::InvalidInput(
                "the on-chain session API does not enforce per-contract restrictions; \
                 clear the allowed-contracts list to register (it still filters locally)"
                    .into(),
            ));
        }

        let chain_id = self.provider.chain_id().await?;
        let spending_limit =
            u256_from_bigint(&biguint_from_decimal(&credential.spending_limit_base_units)?)?;

        // Owner consent over the canonical typed-data payload precedes any
        // transaction leaving the device.
        let typed = build_register_session_key(&RegisterSessionKeyInput {
            chain_id,
            account_address: owner.account_address,
            session_key: public_key,
            valid_after: credential.valid_after,
            valid_until: credential.valid_until,
            spending_limit,
            spending_token: credential.token_address,
            allowed_contracts: credential.allowed_contracts.clone(),
        })?;
        let owner_signer = OwnerSigner::new(owner.private_key);
        let consent = owner_signer.sign_typed_data(&typed)?;
        tracing::debug!(
            message_hash = %felt_to_hex(&typed.message_hash),
            "owner consent signed for session registration"
        );

        let mut calldata = vec![
            public_key,
            Felt::from(credential.valid_until as u64),
            Felt::from(SESSION_MAX_CALLS),
            Felt::from(SESSION_ENTRYPOINTS.len()),
        ];
        for entrypoint in SESSION_ENTRYPOINTS {
            calldata.push(selector(entrypoint)?);
        }
        let call = Call {
            to: owner.account_address,
            selector: selector("add_or_update_session_key")?,
            calldata,
        };

        let tx_hash = self
            .submit_owner_call(owner, &owner_signer, call, ActivityKind::SessionRegistered,
                "Session key registered", &consent)
            .await?;

        // Hash lands in the index before we wait on confirmation.
        self.index.update(&public_key, |c| c.last_tx_hash = Some(tx_hash))?;

        self.confirm(tx_hash).await?;
        self.index
            .update(&public_key, |c| c.registered_at = Some(starkclaw_core::unix_now()))?;
        Ok(tx_hash)
    }

    // ── Revocation ───────────────────────────────────────────────────────────

    /// Revoke one session key on-chain; on confirmation the local record is
    /// marked revoked and its private key destroyed.
    pub async fn revoke_onchain(
        &self,
        owner: &OwnerCredential,
        public_key: Felt,
    ) -> Result<Felt, CoreError> {
        let _ = self.index.find(&public_key)?;
        let chain_id = self.provider.chain_id().await?;

        let typed = build_revoke_session_key(&RevokeSessionKeyInput {
            chain_id,
            account_address: owner.account_address,
            session_key: public_key,
        })?;
        let owner_signer = OwnerSigner::new(owner.private_key);
        let consent = owner_signer.sign_typed_data(&typed)?;

        let call = Call {
            to: owner.account_address,
            selector: selector("revoke_session_key")?,
            calldata: vec![public_key],
        };
        let tx_hash = self
            .submit_owner_call(owner, &owner_signer, call, ActivityKind::SessionRevoked,
                "Session key revoked", &consent)
            .await?;
        self.index.update(&public_key, |c| c.last_tx_hash = Some(tx_hash))?;

        self.confirm(tx_hash).await?;
        self.mark_revoked_locally(&public_key)?;
        Ok(tx_hash)
    }

    /// Revoke every session key in one on-chain call; on confirmation all
    /// local records are marked revoked and every private key wiped.
    pub async fn emergency_revoke_all_onchain(
        &self,
        owner: &OwnerCredential,
    ) -> Result<Felt, CoreError> {
        let chain_id = self.provider.chain_id().await?;
        let nonce = self.provider.get_nonce(owner.account_address).await?;

        let typed = build_emergency_revoke_all(&EmergencyRevokeAllInput {
            chain_id,
            account_address: owner.account_address,
            nonce,
            timestamp: starkclaw_core::unix_now(),
        })?;
        let owner_signer = OwnerSigner::new(owner.private_key);
        let consent = owner_signer.sign_typed_data(&typed)?;

        let call = Call {
            to: owner.account_address,
            selector: selector("emergency_revoke_all")?,
            calldata: vec![],
        };
        let tx_hash = self
            .submit_owner_call(owner, &owner_signer, call, ActivityKind::EmergencyRevoke,
                "All session keys revoked", &consent)
            .await?;

        self.confirm(tx_hash).await?;
        let now = starkclaw_core::unix_now();
        for credential in self.index.load()? {
            if credential.revoked_at.is_none() {
                self.index.update(&credential.public_key, |c| c.revoked_at = Some(now))?;
            }
            if let Err(e) = self.index.delete_secret(&credential.public_key) {
                tracing::warn!(error = %e, "failed to wipe a session secret during emergency revoke");
            }
        }
        Ok(tx_hash)
    }

    /// Mark a credential revoked and destroy its private key.
    pub(crate) fn mark_revoked_locally(&self, public_key: &Felt) -> Result<(), CoreError> {
        self.index
            .update(public_key, |c| c.revoked_at = Some(starkclaw_core::unix_now()))?;
        self.index.delete_secret(public_key)
    }

    // ── On-chain validity ────────────────────────────────────────────────────

    /// `get_session_data(key)` → usable iff still inside its validity window
    /// with call budget remaining. Any RPC failure reads as *not valid* —
    /// this is deliberately fail-closed.
    pub async fn is_valid_onchain(&self, public_key: Felt) -> bool {
        let owner_account = match self.index.find(&public_key) {
            Ok(_) => match self.load_owner_account() {
                Some(account) => account,
                None => return false,
            },
            Err(_) => return false,
        };
        match self
            .provider
            .contract_call(owner_account, "get_session_data", &[public_key])
            .await
        {
            Ok(data) => session_data_is_valid(&data, starkclaw_core::unix_now()),
            Err(e) => {
                tracing::warn!(error = %e, "get_session_data failed; treating session as invalid");
                false
            }
        }
    }

    fn load_owner_account(&self) -> Option<Felt> {
        // The owner credential is stored as JSON in the wallet slot.
        let json = self
            .index_store_get(starkclaw_keystore::namespace::WALLET)
            .ok()??;
        let owner: OwnerCredential = serde_json::from_str(&json).ok()?;
        Some(owner.account_address)
    }

    fn index_store_get(&self, key: &str) -> Result<Option<String>, CoreError> {
        self.index.store().get(key)
    }

    // ── Submission plumbing ──────────────────────────────────────────────────

    async fn submit_owner_call(
        &self,
        owner: &OwnerCredential,
        owner_signer: &OwnerSigner,
        call: Call,
        kind: ActivityKind,
        title: &str,
        consent: &[Felt],
    ) -> Result<Felt, CoreError> {
        let draft = self
            .provider
            .prepare_invoke(owner.account_address, &[call])
            .await?;
        let signature = owner_signer.sign_transaction(&draft.tx_hash)?;
        let tx_hash = self.provider.submit_invoke(&draft, &signature).await?;

        self.activity.append(
            ActivityDraft::new(kind, title)
                .with_subtitle(format!("consent {}", felt_to_hex(&consent[0])))
                .with_tx_hash(tx_hash),
        )?;
        Ok(tx_hash)
    }

    /// Wait for the administrative transaction to land. A revert is surfaced
    /// as an error; a transport failure leaves the record
    /// submitted-but-unconfirmed for the poller to settle.
    async fn confirm(&self, tx_hash: Felt) -> Result<(), CoreError> {
        let receipt = self.provider.wait_for_acceptance(tx_hash).await?;
        if receipt.is_reverted() {
            self.activity.update_by_tx_hash(
                &tx_hash,
                StatusUpdate {
                    status: ActivityStatus::Reverted,
                    execution_status: Some(receipt.execution_status.clone()),
                    revert_reason: receipt.revert_reason.clone(),
                },
            )?;
            return Err(CoreError::Rpc {
                code: None,
                message: format!(
                    "transaction reverted: {}",
                    receipt.revert_reason.unwrap_or_else(|| "unknown reason".into())
                ),
            });
        }
        self.activity.update_by_tx_hash(
            &tx_hash,
            StatusUpdate {
                status: ActivityStatus::Succeeded,
                execution_status: Some(receipt.execution_status),
                revert_reason: None,
            },
        )?;
        Ok(())
    }
}

/// Interpret `get_session_data` output `(valid_until, max_calls, calls_used, …)`.
fn session_data_is_valid(data: &[Felt], now: i64) -> bool {
    if data.len() < 3 {
        return false;
    }
    let as_u128 = |f: &Felt| -> Option<u128> {
        let bytes = f.to_bytes_be();
        if bytes[..16].iter().any(|b| *b != 0) {
            return None;
        }
        Some(u128::from_be_bytes(bytes[16..].try_into().ok()?))
    };
    let (Some(valid_until), Some(max_calls), Some(calls_used)) =
        (as_u128(&data[0]), as_u128(&data[1]), as_u128(&data[2]))
    else {
        return false;
    };
    valid_until > now as u128 && calls_used < max_calls
}

fn selector(name: &str) -> Result<Felt, CoreError> {
    starknet::core::utils::get_selector_from_name(name)
        .map_err(|e| CoreError::Internal(format!("selector for {name:?}: {e}")))
}

/// 32 random bytes reduced into the Stark curve's scalar field, never zero.
fn random_curve_scalar() -> Result<Felt, CoreError> {
    let order = BigUint::from_str_radix(STARK_CURVE_ORDER_HEX.trim_start_matches("0x"), 16)
        .map_err(|e| CoreError::Internal(format!("curve order constant: {e}")))?;
    let mut rng = rand::thread_rng();
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        let scalar = BigUint::from_bytes_be(&bytes) % &order;
        if !scalar.is_zero() {
            return biguint_to_felt(&scalar);
        }
    }
}
