//! starkclaw
//!
//! Operator CLI for the Starkclaw session-authority core. Manages the owner
//! credential, session keys and transfers against a live network, and carries
//! the class-declaration tooling used when shipping a new session-account
//! build.
//!
//! Usage:
//!   starkclaw keygen        --class-hash <hex> [--network <id>]
//!   starkclaw session new   --token <sym> --limit <base_units> --valid-for <secs>
//!   starkclaw session list
//!   starkclaw session register --key <hex>
//!   starkclaw session revoke   --key <hex>
//!   starkclaw session revoke-all
//!   starkclaw transfer      --token <sym> --amount <text> --to <hex>
//!   starkclaw activity
//!   starkclaw declare-class     (env-driven; see DECLARE ENVIRONMENT below)
//!
//! DECLARE ENVIRONMENT:
//!   STARKNET_DEPLOYER_ADDRESS, STARKNET_DEPLOYER_PRIVATE_KEY,
//!   STARKNET_RPC_URL (optional), UPSTREAM_SESSION_ACCOUNT_PATH,
//!   EXPECTED_SESSION_ACCOUNT_CLASS_HASH.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use starkclaw_activity::ActivityLog;
use starkclaw_core::codec::{felt_from_hex, felt_to_hex};
use starkclaw_core::{NetworkId, OwnerCredential, TokenSymbol};
use starkclaw_intent::{IntentEngine, TransferIntent};
use starkclaw_keystore::{namespace, SecureStore, SledKeystore};
use starkclaw_policy::PolicyEngine;
use starkclaw_rpc::ProviderClient;
use starkclaw_session::{CreateSessionParams, SessionRegistry};
use starkclaw_signer::{
    Environment, KeyringProxySigner, LocalSessionSigner, RuntimeSignerSettings, SignerMode,
    SignerRuntime, SignerRuntimeConfig, SessionWalletSigner,
};

mod declare;

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "starkclaw", version, about = "Starkclaw session-authority CLI")]
struct Args {
    /// Data directory holding the secure keystore.
    #[arg(long, global = true, default_value = "~/.starkclaw")]
    data_dir: PathBuf,

    /// Network to operate on.
    #[arg(long, global = true, default_value = "sepolia")]
    network: NetworkId,

    /// Override the network's default RPC endpoint.
    #[arg(long, global = true)]
    rpc: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the owner credential for this device (once).
    Keygen {
        /// Class hash of the deployed session-account contract.
        #[arg(long)]
        class_hash: String,
    },

    /// Session-key management.
    #[command(subcommand)]
    Session(SessionCommand),

    /// Transfer tokens through the active session key.
    Transfer {
        #[arg(long)]
        token: TokenSymbol,
        /// Human decimal amount, e.g. "1.5".
        #[arg(long)]
        amount: String,
        /// Recipient address (hex felt).
        #[arg(long)]
        to: String,
    },

    /// Print the activity log, newest last.
    Activity,

    /// Toggle the emergency lockdown. While enabled, every transfer and swap
    /// is denied before it reaches a signer.
    Lockdown {
        #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
        enabled: bool,
    },

    /// Declare the session-account class if it is not already declared.
    /// Driven entirely by environment variables; exits 0 when the class is
    /// declared or already was.
    DeclareClass,
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Create a new local session key.
    New {
        #[arg(long)]
        token: TokenSymbol,
        /// Spending limit in base units (decimal).
        #[arg(long)]
        limit: String,
        /// Validity in seconds from now (min 60).
        #[arg(long, default_value_t = 3_600)]
        valid_for: i64,
    },

    /// List stored session keys, most recent first.
    List,

    /// Register a session key on the account contract (owner-signed).
    Register {
        /// Session public key (hex felt).
        #[arg(long)]
        key: String,
    },

    /// Revoke a session key on-chain and destroy its secret.
    Revoke {
        #[arg(long)]
        key: String,
    },

    /// Revoke every session key in one transaction.
    RevokeAll,
}

// ── Wiring ───────────────────────────────────────────────────────────────────

struct App {
    store: Arc<dyn SecureStore>,
    provider: Arc<ProviderClient>,
    activity: Arc<ActivityLog>,
    registry: Arc<SessionRegistry>,
    policy: Arc<PolicyEngine>,
    intents: IntentEngine,
    network: NetworkId,
}

impl App {
    fn open(args: &Args) -> anyhow::Result<Self> {
        let dir = expand_tilde(&args.data_dir);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating data directory {}", dir.display()))?;
        let store: Arc<dyn SecureStore> =
            Arc::new(SledKeystore::open(dir.join("keystore")).context("opening keystore")?);

        let provider = Arc::new(match &args.rpc {
            Some(url) => ProviderClient::new(url),
            None => ProviderClient::for_network(args.network),
        });
        let activity = Arc::new(ActivityLog::open(store.clone()).context("opening activity log")?);
        let registry = Arc::new(SessionRegistry::new(
            store.clone(),
            provider.clone(),
            activity.clone(),
            args.network,
        ));
        let policy = Arc::new(PolicyEngine::open(store.clone()).context("loading policy")?);
        let intents = IntentEngine::new(
            store.clone(),
            provider.clone(),
            registry.clone(),
            policy.clone(),
            activity.clone(),
            args.network,
        );
        Ok(Self { store, provider, activity, registry, policy, intents, network: args.network })
    }

    fn owner(&self) -> anyhow::Result<OwnerCredential> {
        let json = self
            .store
            .get(namespace::WALLET)
            .map_err(|e| anyhow::anyhow!("{e}"))?
            .context("no owner credential — run `starkclaw keygen` first")?;
        serde_json::from_str(&json).context("parsing owner credential")
    }

    /// Select local or remote session signing per the runtime mode.
    fn session_signer(&self, session_key: &starknet::core::types::Felt) -> anyhow::Result<SessionWalletSigner> {
        let mode = match std::env::var("STARKCLAW_SIGNER_MODE").as_deref() {
            Ok("remote") => SignerMode::Remote,
            _ => SignerMode::Local,
        };
        let settings = RuntimeSignerSettings {
            mode,
            proxy_url: std::env::var("STARKCLAW_PROXY_URL").ok(),
            mtls_required: std::env::var("STARKCLAW_MTLS_REQUIRED").as_deref() == Ok("true"),
            environment: Environment::Development,
            ..RuntimeSignerSettings::default()
        };
        match SignerRuntimeConfig::load(&settings, &self.store).map_err(|e| anyhow::anyhow!("{e}"))? {
            SignerRuntime::Local => {
                let secret = self
                    .registry
                    .index()
                    .load_secret(session_key)
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                let signer = LocalSessionSigner::new(secret, *session_key)
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                Ok(SessionWalletSigner::Local(signer))
            }
            SignerRuntime::Remote(config) => {
                Ok(SessionWalletSigner::Remote(KeyringProxySigner::new(config)))
            }
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn,starkclaw=info")
        .init();

    let args = Args::parse();

    if let Command::DeclareClass = args.command {
        // Env-driven; does not touch the local keystore.
        return declare::run(args.rpc.clone(), args.network).await;
    }

    let app = App::open(&args)?;

    match args.command {
        Command::Keygen { class_hash } => cmd_keygen(&app, &class_hash),

        Command::Session(SessionCommand::New { token, limit, valid_for }) => {
            let credential = app
                .registry
                .create_local(CreateSessionParams {
                    token_symbol: token,
                    spending_limit_base_units: limit,
                    valid_for_seconds: valid_for,
                    allowed_contracts: vec![],
                })
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Session key: {}", felt_to_hex(&credential.public_key));
            println!("Valid until: {}", credential.valid_until);
            println!("\nRegister it on-chain with:");
            println!("  starkclaw session register --key {}", felt_to_hex(&credential.public_key));
            Ok(())
        }

        Command::Session(SessionCommand::List) => {
            let keys = app.registry.list_session_keys().map_err(|e| anyhow::anyhow!("{e}"))?;
            if keys.is_empty() {
                println!("No session keys.");
            }
            for credential in keys {
                let state = if credential.revoked_at.is_some() {
                    "revoked"
                } else if credential.registered_at.is_some() {
                    "registered"
                } else {
                    "local"
                };
                println!(
                    "{}  {}  limit={}  until={}  [{state}]",
                    felt_to_hex(&credential.public_key),
                    credential.token_symbol,
                    credential.spending_limit_base_units,
                    credential.valid_until,
                );
            }
            Ok(())
        }

        Command::Session(SessionCommand::Register { key }) => {
            let owner = app.owner()?;
            let public_key = felt_from_hex(&key).map_err(|e| anyhow::anyhow!("{e}"))?;
            let tx_hash = app
                .registry
                .register_onchain(&owner, public_key)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Registered: {}", felt_to_hex(&tx_hash));
            Ok(())
        }

        Command::Session(SessionCommand::Revoke { key }) => {
            let owner = app.owner()?;
            let public_key = felt_from_hex(&key).map_err(|e| anyhow::anyhow!("{e}"))?;
            let tx_hash = app
                .registry
                .revoke_onchain(&owner, public_key)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Revoked: {}", felt_to_hex(&tx_hash));
            Ok(())
        }

        Command::Session(SessionCommand::RevokeAll) => {
            let owner = app.owner()?;
            let tx_hash = app
                .registry
                .emergency_revoke_all_onchain(&owner)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("All sessions revoked: {}", felt_to_hex(&tx_hash));
            Ok(())
        }

        Command::Transfer { token, amount, to } => {
            let intent = TransferIntent {
                network: app.network,
                token_symbol: token,
                amount_text: amount,
                to,
                session_public_key: None,
            };
            let action = app
                .intents
                .prepare_transfer(&intent)
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e, e.machine_code()))?;
            for warning in &action.warnings {
                println!("warning: {warning}");
            }
            let signer = app.session_signer(&action.session_public_key)?;
            let outcome = app
                .intents
                .execute(&action, &signer)
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e, e.machine_code()))?;
            info!(signer_mode = %outcome.signer_mode, "transfer submitted");
            println!("Submitted: {}", felt_to_hex(&outcome.tx_hash));

            let receipt = app
                .provider
                .wait_for_acceptance(outcome.tx_hash)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            let update = if receipt.is_reverted() {
                starkclaw_activity::StatusUpdate {
                    status: starkclaw_activity::ActivityStatus::Reverted,
                    execution_status: Some(receipt.execution_status.clone()),
                    revert_reason: receipt.revert_reason.clone(),
                }
            } else {
                starkclaw_activity::StatusUpdate {
                    status: starkclaw_activity::ActivityStatus::Succeeded,
                    execution_status: Some(receipt.execution_status.clone()),
                    revert_reason: None,
                }
            };
            app.activity
                .update_by_tx_hash(&outcome.tx_hash, update)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            match receipt.revert_reason {
                Some(reason) => println!("Reverted: {reason}"),
                None => println!("Confirmed: {}", receipt.execution_status),
            }
            Ok(())
        }

        Command::Lockdown { enabled } => {
            app.policy
                .update(|p| p.emergency_lockdown = enabled)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            app.activity
                .append(
                    starkclaw_activity::ActivityDraft::new(
                        starkclaw_activity::ActivityKind::PolicyUpdated,
                        if enabled { "Emergency lockdown enabled" } else { "Emergency lockdown disabled" },
                    )
                    .with_status(starkclaw_activity::ActivityStatus::Succeeded),
                )
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Emergency lockdown: {}", if enabled { "ON" } else { "off" });
            Ok(())
        }

        Command::Activity => {
            for record in app.activity.list().map_err(|e| anyhow::anyhow!("{e}"))? {
                let tx = record
                    .tx_hash
                    .map(|h| felt_to_hex(&h))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "#{:<4} {:<20} {:?}  {}  {}",
                    record.id,
                    format!("{:?}", record.kind),
                    record.status,
                    record.title,
                    tx,
                );
            }
            Ok(())
        }

        Command::DeclareClass => unreachable!("handled above"),
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn cmd_keygen(app: &App, class_hash: &str) -> anyhow::Result<()> {
    if app.store.get(namespace::WALLET).map_err(|e| anyhow::anyhow!("{e}"))?.is_some() {
        bail!("An owner credential already exists. Reset the keystore to generate a new one.");
    }
    let class_hash = felt_from_hex(class_hash).map_err(|e| anyhow::anyhow!("{e}"))?;

    let signing_key = starknet::signers::SigningKey::from_random();
    let public_key = signing_key.verifying_key().scalar();
    let account_address = starknet::core::utils::get_contract_address(
        public_key,
        class_hash,
        &[public_key],
        starknet::core::types::Felt::ZERO,
    );

    let credential = OwnerCredential {
        private_key: signing_key.secret_scalar(),
        public_key,
        account_address,
        class_hash,
        network_id: app.network,
    };
    let json = serde_json::to_string(&credential)?;
    app.store
        .set(namespace::WALLET, &json)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    app.activity
        .append(
            starkclaw_activity::ActivityDraft::new(
                starkclaw_activity::ActivityKind::Onboarding,
                "Wallet created",
            )
            .with_status(starkclaw_activity::ActivityStatus::Succeeded),
        )
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("Generated owner credential.");
    println!("Public key:      {}", felt_to_hex(&public_key));
    println!("Account address: {}", felt_to_hex(&account_address));
    println!("\nFund and deploy the account, then create a session key.");
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.clone()
}
