//! Layered configuration: defaults, then the TOML file, then the environment.

use std::path::Path;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use soldeploy_engine::EngineConfig;

/// Environment prefix for configuration overrides.
const ENV_PREFIX: &str = "SOLDEPLOY_";

/// Variables under the prefix that are CLI flags rather than settings.
const NON_CONFIG_VARS: &[&str] = &[
    "CONFIG",
    "VERBOSITY",
    "RPC_URL",
    "PRIVATE_KEY",
    "SOLC_VERSION",
];

pub fn load(config_path: Option<&Path>) -> Result<EngineConfig> {
    let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

    if let Some(path) = config_path {
        if !path.is_file() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: EngineConfig = figment
        .merge(
            Env::prefixed(ENV_PREFIX)
                .ignore(NON_CONFIG_VARS)
                .split("__"),
        )
        .extract()
        .context("Failed to load configuration")?;

    tracing::debug!(?config, "Configuration loaded");
    Ok(config)
}
