//! soldeploy compiles Solidity contracts and deploys them, to a throwaway local
//! chain or to a live network.

mod cli;
mod output;
mod settings;
mod signals;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use cli::{Cli, Command};
use signals::Shutdown;
use soldeploy_engine::{Credential, Engine};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger. Results go to stdout, logs to stderr.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    let mut shutdown = Shutdown::install()?;

    let config = settings::load(cli.config.as_deref())?;
    let engine = Engine::from_config(config)?;

    let outcome = tokio::select! {
        outcome = run(&engine, cli.command, cli.json) => outcome,
        signal = shutdown.recv() => {
            tracing::warn!(signal, "Interrupted, shutting down...");
            Err(anyhow::anyhow!("interrupted by {}", signal))
        }
    };

    engine.shutdown().await;
    outcome
}

async fn run(engine: &Engine, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Compile(source) => {
            let bundle = engine
                .compile(&source.input(), &source.compile_options())
                .await?;
            print(&bundle, json, output::bundle)
        }
        Command::DeployLocal(args) => {
            let source = &args.contract.source;
            let result = engine
                .compile_and_deploy_local(
                    &source.input(),
                    &source.compile_options(),
                    &args.request(None),
                )
                .await?;
            print(&result, json, output::deploy_result)
        }
        Command::DeployLive(live) => {
            let source = &live.deploy.contract.source;
            let request = live.deploy.request(live.chain_id);
            let credential = Credential::new(live.private_key);

            tracing::info!(
                host = live.rpc_url.host_str().unwrap_or_default(),
                "Deploying to live network..."
            );

            let result = engine
                .compile_and_deploy_live(
                    &source.input(),
                    &source.compile_options(),
                    &request,
                    live.rpc_url,
                    credential,
                )
                .await?;
            print(&result, json, output::deploy_result)
        }
        Command::EstimateGas(args) => {
            let options = soldeploy_engine::DeployOptions {
                chain_id: None,
                gas_multiplier: args.gas_multiplier,
            };
            let estimate = engine
                .estimate_gas(
                    &args.source.input(),
                    &args.source.compile_options(),
                    args.contract.as_deref(),
                    &args.args,
                    &options,
                )
                .await?;
            print(&estimate, json, output::gas_estimate)
        }
        Command::PrintAbi { source, contract } => {
            let abi = engine
                .print_abi(
                    &source.input(),
                    &source.compile_options(),
                    contract.as_deref(),
                )
                .await?;
            println!("{}", abi);
            Ok(())
        }
    }
}

fn print<T: Serialize>(value: &T, json: bool, render: impl Fn(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", render(value));
    }
    Ok(())
}
