use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use soldeploy_engine::{CompileOptions, DeployOptions, DeployRequest, SourceInput};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "soldeploy")]
#[command(
    author,
    version,
    about = "Compile Solidity contracts and deploy them to a throwaway chain or a live network"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "SOLDEPLOY_VERBOSITY", default_value_t = LevelFilter::INFO, global = true)]
    pub verbosity: LevelFilter,

    /// Path to a soldeploy.toml configuration file.
    ///
    /// Environment variables prefixed with SOLDEPLOY_ (sections separated by
    /// a double underscore, e.g. SOLDEPLOY_CHAIN__PORT) override the file.
    #[arg(short, long, env = "SOLDEPLOY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a contract and list the artifacts.
    Compile(SourceArgs),

    /// Deploy a contract to the ephemeral local chain.
    DeployLocal(DeployArgs),

    /// Deploy a contract to a live network.
    DeployLive(LiveArgs),

    /// Measure deployment gas with a trial deploy on a fresh local chain.
    EstimateGas(ContractArgs),

    /// Print the ABI of a contract.
    PrintAbi {
        #[command(flatten)]
        source: SourceArgs,

        /// The contract to print. Defaults to the first compiled contract.
        #[arg(long)]
        contract: Option<String>,
    },
}

#[derive(Args)]
pub struct SourceArgs {
    /// Path to a .sol file, or raw Solidity source.
    pub source: String,

    /// The solc version. Defaults to the configured version.
    #[arg(long, env = "SOLDEPLOY_SOLC_VERSION")]
    pub solc_version: Option<String>,

    /// Recompile even if the artifacts are cached.
    #[arg(long)]
    pub force: bool,
}

impl SourceArgs {
    pub fn input(&self) -> SourceInput {
        SourceInput::detect(&self.source)
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            version: self.solc_version.clone(),
            force_refresh: self.force,
        }
    }
}

#[derive(Args)]
pub struct ContractArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// The contract to deploy. Defaults to the first compiled contract.
    #[arg(long)]
    pub contract: Option<String>,

    /// A constructor argument, in order. Parsed as JSON when possible,
    /// otherwise passed as a string.
    #[arg(long = "arg", value_name = "VALUE", value_parser = parse_constructor_arg)]
    pub args: Vec<Value>,

    /// Safety factor applied to the gas estimate.
    #[arg(long)]
    pub gas_multiplier: Option<f64>,
}

#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub contract: ContractArgs,

    /// Build and size the transaction without sending it.
    #[arg(long)]
    pub dry_run: bool,
}

impl DeployArgs {
    pub fn request(&self, chain_id: Option<u64>) -> DeployRequest {
        DeployRequest {
            contract_name: self.contract.contract.clone(),
            constructor_args: self.contract.args.clone(),
            dry_run: self.dry_run,
            options: DeployOptions {
                chain_id,
                gas_multiplier: self.contract.gas_multiplier,
            },
        }
    }
}

#[derive(Args)]
pub struct LiveArgs {
    #[command(flatten)]
    pub deploy: DeployArgs,

    /// The HTTP JSON-RPC endpoint of the network.
    #[arg(long, env = "SOLDEPLOY_RPC_URL", hide_env_values = true)]
    pub rpc_url: Url,

    /// The deployer's private key (hex).
    #[arg(long, env = "SOLDEPLOY_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,

    /// Use this chain id instead of asking the endpoint.
    #[arg(long)]
    pub chain_id: Option<u64>,
}

/// Parse a constructor argument: JSON when it parses, a plain string otherwise.
fn parse_constructor_arg(s: &str) -> Result<Value, std::convert::Infallible> {
    Ok(serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_constructor_arg() {
        assert_eq!(parse_constructor_arg("42").unwrap(), serde_json::json!(42));
        assert_eq!(parse_constructor_arg("true").unwrap(), serde_json::json!(true));
        assert_eq!(
            parse_constructor_arg("[1, 2]").unwrap(),
            serde_json::json!([1, 2])
        );
        assert_eq!(
            parse_constructor_arg("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap(),
            serde_json::json!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
    }

    #[test]
    fn test_deploy_local_args() {
        let cli = Cli::parse_from([
            "soldeploy",
            "deploy-local",
            "Token.sol",
            "--contract",
            "Token",
            "--arg",
            "1000",
            "--arg",
            "My Token",
            "--dry-run",
        ]);

        let Command::DeployLocal(args) = cli.command else {
            panic!("expected deploy-local");
        };
        let request = args.request(None);

        assert!(request.dry_run);
        assert_eq!(request.contract_name.as_deref(), Some("Token"));
        assert_eq!(
            request.constructor_args,
            vec![serde_json::json!(1000), serde_json::json!("My Token")]
        );
    }

    #[test]
    fn test_deploy_live_requires_endpoint_and_key() {
        let result = Cli::try_parse_from(["soldeploy", "deploy-live", "Token.sol"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
