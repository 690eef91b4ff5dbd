//! Env-driven class declaration for the session-account contract.
//!
//! Exit code contract: 0 when the expected class is already declared or the
//! declaration lands; non-zero on a class-hash mismatch or any transport
//! failure. CI runs this after every account-contract build.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use starknet::accounts::{Account, ConnectedAccount, ExecutionEncoding, SingleOwnerAccount};
use starknet::core::types::contract::{CompiledClass, SierraClass};
use starknet::core::types::{BlockId, BlockTag, Felt, StarknetError};
use starknet::providers::jsonrpc::HttpTransport;
use starknet::providers::{JsonRpcClient, Provider, ProviderError};
use starknet::signers::{LocalWallet, SigningKey};
use tracing::info;

use starkclaw_core::codec::{felt_from_hex, felt_to_hex};
use starkclaw_core::constants::{CONFIRM_INTERVAL_SECS, CONFIRM_RETRIES};
use starkclaw_core::NetworkId;

pub async fn run(rpc_override: Option<String>, network: NetworkId) -> anyhow::Result<()> {
    let deployer_address = required_env("STARKNET_DEPLOYER_ADDRESS")?;
    let deployer_key = required_env("STARKNET_DEPLOYER_PRIVATE_KEY")?;
    let artifact_path = required_env("UPSTREAM_SESSION_ACCOUNT_PATH")?;
    let expected_hash = required_env("EXPECTED_SESSION_ACCOUNT_CLASS_HASH")?;

    let rpc_url = std::env::var("STARKNET_RPC_URL")
        .ok()
        .or(rpc_override)
        .unwrap_or_else(|| network.rpc_url().to_string());

    let deployer_address =
        felt_from_hex(&deployer_address).map_err(|e| anyhow::anyhow!("deployer address: {e}"))?;
    let deployer_key =
        felt_from_hex(&deployer_key).map_err(|e| anyhow::anyhow!("deployer key: {e}"))?;
    let expected_hash =
        felt_from_hex(&expected_hash).map_err(|e| anyhow::anyhow!("expected class hash: {e}"))?;

    // The artifact's hash must match what the mobile build pins before
    // anything touches the network.
    let sierra: SierraClass = serde_json::from_str(
        &std::fs::read_to_string(&artifact_path)
            .with_context(|| format!("reading {artifact_path}"))?,
    )
    .context("parsing sierra artifact")?;
    let computed_hash = sierra.class_hash().context("computing class hash")?;
    if computed_hash != expected_hash {
        bail!(
            "class hash mismatch: artifact computes {}, expected {}",
            felt_to_hex(&computed_hash),
            felt_to_hex(&expected_hash),
        );
    }

    let provider = JsonRpcClient::new(HttpTransport::new(
        url::Url::parse(&rpc_url).with_context(|| format!("parsing RPC URL {rpc_url}"))?,
    ));

    match provider.get_class(BlockId::Tag(BlockTag::Latest), computed_hash).await {
        Ok(_) => {
            println!("Class {} already declared.", felt_to_hex(&computed_hash));
            return Ok(());
        }
        Err(ProviderError::StarknetError(StarknetError::ClassHashNotFound)) => {}
        Err(e) => bail!("checking declaration status: {e}"),
    }

    // Not declared yet; declare with the deployer account.
    let casm_path = casm_path_for(&artifact_path);
    let casm: CompiledClass = serde_json::from_str(
        &std::fs::read_to_string(&casm_path).with_context(|| format!("reading {casm_path}"))?,
    )
    .context("parsing casm artifact")?;
    let casm_hash = casm.class_hash().context("computing compiled class hash")?;

    let chain_id = provider.chain_id().await.context("fetching chain id")?;
    let signer = LocalWallet::from(SigningKey::from_secret_scalar(deployer_key));
    let mut account =
        SingleOwnerAccount::new(provider, signer, deployer_address, chain_id, ExecutionEncoding::New);
    account.set_block_id(BlockId::Tag(BlockTag::Latest));

    let flattened = sierra.flatten().context("flattening sierra class")?;
    let result = match account.declare_v3(Arc::new(flattened), casm_hash).send().await {
        Ok(result) => result,
        // A concurrent declaration is a success for our exit contract.
        Err(e) if format!("{e}").to_ascii_lowercase().contains("already declared") => {
            println!("Class {} already declared.", felt_to_hex(&computed_hash));
            return Ok(());
        }
        Err(e) => bail!("declare transaction failed: {e}"),
    };

    info!(tx_hash = %felt_to_hex(&result.transaction_hash), "declare submitted");
    watch_declare(account.provider(), result.transaction_hash).await?;
    println!(
        "Declared class {} in {}",
        felt_to_hex(&computed_hash),
        felt_to_hex(&result.transaction_hash),
    );
    Ok(())
}

/// Wait for the declare transaction: poll the receipt until a terminal
/// execution status or the retry budget runs out.
async fn watch_declare(
    provider: &JsonRpcClient<HttpTransport>,
    tx_hash: Felt,
) -> anyhow::Result<()> {
    use starknet::core::types::TransactionExecutionStatus;

    for _ in 0..CONFIRM_RETRIES {
        match provider.get_transaction_receipt(tx_hash).await {
            Ok(receipt) => match receipt.receipt.execution_result().status() {
                TransactionExecutionStatus::Succeeded => return Ok(()),
                TransactionExecutionStatus::Reverted => bail!(
                    "declare {} reverted: {}",
                    felt_to_hex(&tx_hash),
                    receipt
                        .receipt
                        .execution_result()
                        .revert_reason()
                        .unwrap_or("unknown reason"),
                ),
            },
            Err(_) => {
                tokio::time::sleep(Duration::from_secs(CONFIRM_INTERVAL_SECS)).await;
            }
        }
    }
    bail!(
        "declare {} not confirmed after {}s",
        felt_to_hex(&tx_hash),
        CONFIRM_RETRIES as u64 * CONFIRM_INTERVAL_SECS,
    )
}

fn required_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

/// Casm artifact next to the sierra artifact, following scarb's naming.
fn casm_path_for(sierra_path: &str) -> String {
    if let Some(stem) = sierra_path.strip_suffix(".contract_class.json") {
        format!("{stem}.compiled_contract_class.json")
    } else {
        format!("{sierra_path}.casm")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn casm_path_follows_scarb_naming() {
        assert_eq!(
            casm_path_for("target/dev/session_account.contract_class.json"),
            "target/dev/session_account.compiled_contract_class.json",
        );
        assert_eq!(casm_path_for("legacy.json"), "legacy.json.casm");
    }
}
