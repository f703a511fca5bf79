//! Deployment of compiled contracts to the ephemeral chain or a live network.

pub mod abi;
mod gas;
mod tx;

use std::{fmt, sync::Arc, time::Duration};

use alloy_core::primitives::{Address, B256};
use alloy_signer_local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

pub use gas::{Estimate, FeeModel, GasEstimator, gas_limit};
pub use tx::{DeployTx, SignedDeployTx};

use crate::{
    artifact::ContractArtifact,
    chain::EphemeralChain,
    config::DeployConfig,
    credential::Credential,
    error::{EngineError, Result},
    rpc::{EthApi, HttpRpc, JsonRpc, RpcError, TransactionReceipt},
};

/// Where a contract is deployed.
pub enum ChainTarget {
    /// The ephemeral chain, deploying from dev account 0.
    Local,
    /// A network reachable at `endpoint`, deploying from `credential`.
    Live { endpoint: Url, credential: Credential },
}

impl fmt::Debug for ChainTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("Local"),
            // Hosted endpoint URLs often embed API keys.
            Self::Live { endpoint, .. } => f
                .debug_struct("Live")
                .field("host", &endpoint.host_str().unwrap_or_default())
                .finish_non_exhaustive(),
        }
    }
}

/// Which kind of chain a resolved target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TargetKind {
    Local,
    Live,
}

/// Per-call deployment knobs. Unset fields take the configured defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployOptions {
    /// Use this chain id instead of asking the endpoint.
    pub chain_id: Option<u64>,
    pub gas_multiplier: Option<f64>,
}

/// Outcome of a deployment, real or simulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployResult {
    pub contract_name: String,
    /// Deployed address, or the zero address for a dry run.
    #[serde(serialize_with = "serialize_checksummed")]
    pub address: Address,
    /// Transaction hash, or the zero hash for a dry run.
    pub tx_hash: B256,
    pub block_number: u64,
    /// Gas consumed according to the receipt; the raw estimate for a dry run.
    pub gas_used: u64,
    pub gas_limit: u64,
    pub chain_id: u64,
    pub fee_model: FeeModel,
    pub abi: Value,
    pub bytecode: String,
    pub is_dry_run: bool,
    /// Conditions worth surfacing that did not stop the deployment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn serialize_checksummed<S: serde::Serializer>(
    address: &Address,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&address.to_checksum(None))
}

/// Gas needed to deploy a contract, measured by a trial deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasEstimate {
    pub contract_name: String,
    pub estimated_gas: u64,
    pub estimated_gas_with_buffer: u64,
}

/// A target resolved to an endpoint and a signer.
struct Session<'a, R> {
    rpc: &'a R,
    signer: PrivateKeySigner,
    kind: TargetKind,
}

/// Estimates, builds, signs and submits contract creations.
#[derive(Debug, Clone)]
pub struct DeploymentPipeline {
    config: DeployConfig,
    estimator: GasEstimator,
    chain: Arc<EphemeralChain>,
}

impl DeploymentPipeline {
    pub fn new(config: DeployConfig, chain: Arc<EphemeralChain>) -> Self {
        Self {
            estimator: GasEstimator::new(&config),
            config,
            chain,
        }
    }

    pub fn chain(&self) -> &Arc<EphemeralChain> {
        &self.chain
    }

    /// Deploy `artifact` with the given constructor arguments.
    ///
    /// With `dry_run` the transaction is built and sized but never signed or
    /// sent, and the result carries zero sentinels for address and hash.
    pub async fn deploy(
        &self,
        artifact: &ContractArtifact,
        args: &[Value],
        target: ChainTarget,
        dry_run: bool,
        options: &DeployOptions,
    ) -> Result<DeployResult> {
        match target {
            ChainTarget::Local => {
                let rpc = self.chain.ensure_ready().await?;
                let signer = self.chain.private_key(0)?.signer()?;
                let session = Session {
                    rpc: &rpc,
                    signer,
                    kind: TargetKind::Local,
                };
                self.execute(session, artifact, args, dry_run, options).await
            }
            ChainTarget::Live {
                endpoint,
                credential,
            } => {
                let signer = credential.signer()?;
                drop(credential);

                let rpc = HttpRpc::new(endpoint)
                    .map_err(|e| EngineError::rpc("failed to create RPC client", e))?;
                let session = Session {
                    rpc: &rpc,
                    signer,
                    kind: TargetKind::Live,
                };
                self.execute(session, artifact, args, dry_run, options).await
            }
        }
    }

    /// Measure the gas `artifact` consumes by deploying it on a fresh
    /// ephemeral chain. The chain is reset before and after, even on failure.
    pub async fn estimate_only(
        &self,
        artifact: &ContractArtifact,
        args: &[Value],
        options: &DeployOptions,
    ) -> Result<GasEstimate> {
        self.chain.reset().await;
        let outcome = self
            .deploy(artifact, args, ChainTarget::Local, false, options)
            .await;
        self.chain.reset().await;

        let result = outcome.map_err(|e| match e {
            EngineError::Deployment { reason } => {
                EngineError::deployment(format!("gas estimation via trial deploy failed: {}", reason))
            }
            other => other,
        })?;

        let multiplier = options.gas_multiplier.unwrap_or(self.config.gas_multiplier);
        Ok(GasEstimate {
            contract_name: result.contract_name,
            estimated_gas: result.gas_used,
            estimated_gas_with_buffer: gas_limit(result.gas_used, multiplier)?,
        })
    }

    async fn execute<R: JsonRpc>(
        &self,
        session: Session<'_, R>,
        artifact: &ContractArtifact,
        args: &[Value],
        dry_run: bool,
        options: &DeployOptions,
    ) -> Result<DeployResult> {
        let Session { rpc, signer, kind } = session;
        let eth = EthApi::new(rpc);
        let from = signer.address();
        let mut warnings = Vec::new();

        tracing::info!(
            contract = %artifact.name,
            target = %kind,
            %from,
            dry_run,
            "Deploying contract..."
        );

        let init_code = abi::deploy_data(artifact, args)?;

        let chain_id = match options.chain_id {
            Some(chain_id) => chain_id,
            None => eth.chain_id().await.unwrap_or_else(|e| {
                tracing::warn!(
                    error = %e,
                    fallback = self.config.fallback_chain_id,
                    "Could not query chain id, using fallback"
                );
                self.config.fallback_chain_id
            }),
        };

        let estimate = self.estimator.estimate(&eth, kind, from, &init_code).await?;
        if estimate.fell_back {
            warnings.push(format!(
                "local gas estimation failed; used default of {} gas",
                estimate.gas
            ));
        }

        let multiplier = options.gas_multiplier.unwrap_or(self.config.gas_multiplier);
        let gas_limit = gas_limit(estimate.gas, multiplier)?;

        let nonce = eth
            .transaction_count(from)
            .await
            .map_err(|e| EngineError::rpc("failed to query nonce", e))?;

        let fee_model = self.estimator.fee_model(&eth).await?;

        tracing::debug!(
            chain_id,
            nonce,
            estimated_gas = estimate.gas,
            gas_limit,
            %fee_model,
            "Transaction built"
        );

        if dry_run {
            tracing::info!(contract = %artifact.name, estimated_gas = estimate.gas, "Dry run complete");
            return Ok(DeployResult {
                contract_name: artifact.name.clone(),
                address: Address::ZERO,
                tx_hash: B256::ZERO,
                block_number: 0,
                gas_used: estimate.gas,
                gas_limit,
                chain_id,
                fee_model,
                abi: artifact.abi.clone(),
                bytecode: artifact.bytecode.clone(),
                is_dry_run: true,
                warnings,
            });
        }

        let signed = DeployTx {
            chain_id,
            nonce,
            gas_limit,
            fee: fee_model,
            input: init_code,
        }
        .sign(&signer)?;
        drop(signer);

        let submitted = eth
            .send_raw_transaction(&signed.raw)
            .await
            .map_err(|e| EngineError::rpc("failed to submit transaction", e))?;
        if submitted != signed.hash {
            tracing::warn!(local = %signed.hash, node = %submitted, "Node reported a different transaction hash");
        }
        let tx_hash = signed.hash;
        tracing::info!(%tx_hash, "Transaction submitted, waiting for receipt...");

        let receipt = self.wait_for_receipt(&eth, tx_hash, kind).await?;

        if !receipt.succeeded() {
            return Err(EngineError::deployment(format!(
                "transaction reverted (tx_hash={})",
                tx_hash
            )));
        }

        let address = receipt.contract_address.ok_or_else(|| {
            EngineError::deployment(format!(
                "receipt carries no contract address (tx_hash={})",
                tx_hash
            ))
        })?;

        match eth.code_at(address).await {
            Ok(code) if code.is_empty() => {
                tracing::warn!(%address, "No code found at deployed address");
                warnings.push(format!("no code found at {} right after deployment", address));
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(%address, error = %e, "Could not verify deployed code"),
        }

        tracing::info!(
            contract = %artifact.name,
            %address,
            %tx_hash,
            block = receipt.block_number,
            gas_used = receipt.gas_used,
            "Contract deployed"
        );

        Ok(DeployResult {
            contract_name: artifact.name.clone(),
            address,
            tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            gas_limit,
            chain_id,
            fee_model,
            abi: artifact.abi.clone(),
            bytecode: artifact.bytecode.clone(),
            is_dry_run: false,
            warnings,
        })
    }

    async fn wait_for_receipt<R: JsonRpc>(
        &self,
        eth: &EthApi<'_, R>,
        tx_hash: B256,
        kind: TargetKind,
    ) -> Result<TransactionReceipt> {
        let timeout = Duration::from_secs(match kind {
            TargetKind::Local => self.config.local_receipt_timeout_secs,
            TargetKind::Live => self.config.live_receipt_timeout_secs,
        });
        let interval = Duration::from_millis(self.config.receipt_poll_interval_ms);

        let poll = async {
            loop {
                match eth.transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => {}
                    // Asking again will not make the node's answer parse.
                    Err(e @ RpcError::Malformed { .. }) => {
                        return Err(EngineError::rpc(
                            &format!("unreadable receipt (tx_hash={})", tx_hash),
                            e,
                        ));
                    }
                    Err(e) => tracing::debug!(%tx_hash, error = %e, "Receipt query failed, retrying..."),
                }
                tokio::time::sleep(interval).await;
            }
        };

        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            EngineError::deployment(format!(
                "timed out after {:?} waiting for receipt (tx_hash={})",
                timeout, tx_hash
            ))
        })?
    }
}
