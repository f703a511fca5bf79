//! Engine configuration, persisted as TOML.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{EngineError, Result};

/// Compiler version used when none is requested.
pub const DEFAULT_SOLC_VERSION: &str = "0.8.24";

/// Port of the ephemeral node, kept off the conventional 8545 so it never
/// collides with a node the user already runs.
pub const DEFAULT_CHAIN_PORT: u16 = 8546;

pub const DEFAULT_CHAIN_ID: u64 = 1337;

/// Default gas-limit multiplier applied on top of the estimate.
pub const DEFAULT_GAS_MULTIPLIER: f64 = 1.2;

/// Gas used on the ephemeral chain when its estimator fails.
pub const DEFAULT_LOCAL_GAS: u64 = 3_000_000;

/// 1 gwei.
pub const DEFAULT_PRIORITY_FEE_WEI: u64 = 1_000_000_000;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub compiler: CompilerConfig,
    pub chain: ChainConfig,
    pub deploy: DeployConfig,
}

/// Where compilers and artifacts live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Version used when a request does not name one.
    pub solc_version: String,
    /// Directory of the artifact cache.
    pub cache_dir: PathBuf,
    /// Directory compilers are installed into.
    pub install_dir: PathBuf,
    /// Use this binary for every version instead of installing compilers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solc_path: Option<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let cache_root = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        let data_root = dirs::data_dir().unwrap_or_else(std::env::temp_dir);

        Self {
            solc_version: DEFAULT_SOLC_VERSION.to_string(),
            cache_dir: cache_root.join("soldeploy").join("artifacts"),
            install_dir: data_root.join("soldeploy").join("solc"),
            solc_path: None,
        }
    }
}

/// How the ephemeral node is launched and supervised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Node executable, looked up in `PATH` unless absolute.
    pub program: PathBuf,
    pub host: String,
    pub port: u16,
    pub chain_id: u64,
    /// Connectivity probes before giving up on startup.
    pub startup_attempts: u32,
    /// Delay between two probes.
    pub poll_interval_secs: u64,
    /// How long the node gets to exit after SIGTERM before it is killed.
    pub shutdown_grace_secs: u64,
    /// Extra arguments appended to the node command line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("anvil"),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_CHAIN_PORT,
            chain_id: DEFAULT_CHAIN_ID,
            startup_attempts: 30,
            poll_interval_secs: 1,
            shutdown_grace_secs: 5,
            extra_args: Vec::new(),
        }
    }
}

impl ChainConfig {
    /// HTTP endpoint the node serves JSON-RPC on.
    pub fn endpoint(&self) -> Result<Url> {
        Url::parse(&format!("http://{}:{}/", self.host, self.port))
            .map_err(|e| EngineError::Config(format!("invalid chain endpoint: {}", e)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Deployment pipeline tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub gas_multiplier: f64,
    pub local_gas_fallback: u64,
    pub priority_fee_wei: u64,
    /// Chain id used when the endpoint cannot be asked for one.
    pub fallback_chain_id: u64,
    pub live_receipt_timeout_secs: u64,
    pub local_receipt_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            gas_multiplier: DEFAULT_GAS_MULTIPLIER,
            local_gas_fallback: DEFAULT_LOCAL_GAS,
            priority_fee_wei: DEFAULT_PRIORITY_FEE_WEI,
            fallback_chain_id: 1,
            live_receipt_timeout_secs: 120,
            local_receipt_timeout_secs: 30,
            receipt_poll_interval_ms: 500,
        }
    }
}

impl EngineConfig {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            EngineError::Config(format!("failed to write config to {}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file. Missing keys take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EngineError::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("failed to read config from {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("failed to parse config file: {}", e)))?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }
}
