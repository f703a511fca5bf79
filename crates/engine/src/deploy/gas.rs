//! Gas sizing and fee model selection.

use alloy_core::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

use super::TargetKind;
use crate::{
    config::DeployConfig,
    error::{EngineError, Result},
    rpc::{EthApi, JsonRpc},
};

/// How a transaction pays for gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeModel {
    /// Fee-market transaction (EIP-1559).
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    /// Single gas price, for chains without a base fee.
    Legacy { gas_price: u128 },
}

impl std::fmt::Display for FeeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => write!(
                f,
                "EIP-1559 (max fee {} wei, priority {} wei)",
                max_fee_per_gas, max_priority_fee_per_gas
            ),
            Self::Legacy { gas_price } => write!(f, "legacy (gas price {} wei)", gas_price),
        }
    }
}

/// Outcome of a gas estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub gas: u64,
    /// The endpoint could not estimate and the local default was used.
    pub fell_back: bool,
}

/// Sizes deployment transactions.
#[derive(Debug, Clone)]
pub struct GasEstimator {
    local_fallback: u64,
    priority_fee: u128,
}

impl GasEstimator {
    pub fn new(config: &DeployConfig) -> Self {
        Self {
            local_fallback: config.local_gas_fallback,
            priority_fee: u128::from(config.priority_fee_wei),
        }
    }

    /// Ask the endpoint to estimate the creation.
    ///
    /// On the ephemeral chain a failed estimate falls back to a fixed default;
    /// on a live network it aborts the deployment.
    pub async fn estimate<R: JsonRpc>(
        &self,
        eth: &EthApi<'_, R>,
        kind: TargetKind,
        from: Address,
        init_code: &Bytes,
    ) -> Result<Estimate> {
        match eth.estimate_deploy_gas(from, init_code).await {
            Ok(gas) => Ok(Estimate {
                gas,
                fell_back: false,
            }),
            Err(e) => match kind {
                TargetKind::Local => {
                    tracing::warn!(
                        error = %e,
                        fallback = self.local_fallback,
                        "Gas estimation failed on local chain, using default gas"
                    );
                    Ok(Estimate {
                        gas: self.local_fallback,
                        fell_back: true,
                    })
                }
                TargetKind::Live => {
                    tracing::debug!(error = %e, "Gas estimation failed");
                    Err(EngineError::deployment(format!(
                        "gas estimation failed on live network: {}",
                        e
                    )))
                }
            },
        }
    }

    /// Pick the fee model from the latest block.
    ///
    /// With a base fee: `max_fee = 2 * base_fee` and the configured priority
    /// fee, capped at `max_fee`. Without one: the endpoint's gas price.
    pub async fn fee_model<R: JsonRpc>(&self, eth: &EthApi<'_, R>) -> Result<FeeModel> {
        let base_fee = match eth.latest_base_fee().await {
            Ok(base_fee) => base_fee,
            Err(e) => {
                tracing::debug!(error = %e, "Could not read base fee, using legacy pricing");
                None
            }
        };

        match base_fee {
            Some(base_fee) => {
                let max_fee_per_gas = base_fee.saturating_mul(2);
                Ok(FeeModel::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas: self.priority_fee.min(max_fee_per_gas),
                })
            }
            None => {
                let gas_price = eth
                    .gas_price()
                    .await
                    .map_err(|e| EngineError::rpc("failed to query gas price", e))?;
                Ok(FeeModel::Legacy { gas_price })
            }
        }
    }
}

/// Apply the safety multiplier to an estimate.
pub fn gas_limit(estimate: u64, multiplier: f64) -> Result<u64> {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(EngineError::deployment(format!(
            "gas multiplier must be a positive number, got {}",
            multiplier
        )));
    }
    Ok((estimate as f64 * multiplier) as u64)
}
