//! Compile-then-deploy compositions over the compiler and the pipeline.

use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::{
    artifact::ArtifactBundle,
    cache::FingerprintCache,
    chain::EphemeralChain,
    compiler::{CompilerAdapter, Solc, SourceInput, Toolchain},
    config::EngineConfig,
    credential::Credential,
    deploy::{ChainTarget, DeployOptions, DeployResult, DeploymentPipeline, GasEstimate},
    error::{EngineError, Result},
};

/// How to compile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Compiler version; the configured default when unset.
    pub version: Option<String>,
    pub force_refresh: bool,
}

/// What to deploy from a compiled bundle, and how.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployRequest {
    /// Contract to deploy; the first one the compiler emitted when unset.
    pub contract_name: Option<String>,
    pub constructor_args: Vec<Value>,
    pub dry_run: bool,
    pub options: DeployOptions,
}

/// The compile and deploy engine.
///
/// Owns one artifact cache, one compiler toolchain and one ephemeral chain.
#[derive(Debug)]
pub struct Engine<T = Solc> {
    config: EngineConfig,
    compiler: CompilerAdapter<T>,
    pipeline: DeploymentPipeline,
}

impl Engine<Solc> {
    /// Build an engine using the `solc` toolchain described by `config`.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let solc = Solc::new(
            config.compiler.install_dir.clone(),
            config.compiler.solc_path.clone(),
        )?;
        let chain = Arc::new(EphemeralChain::new(config.chain.clone())?);
        Self::new(config, solc, chain)
    }
}

impl<T: Toolchain> Engine<T> {
    pub fn new(config: EngineConfig, toolchain: T, chain: Arc<EphemeralChain>) -> Result<Self> {
        let cache = FingerprintCache::open(&config.compiler.cache_dir)?;

        Ok(Self {
            compiler: CompilerAdapter::new(toolchain, cache),
            pipeline: DeploymentPipeline::new(config.deploy.clone(), chain),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compiler(&self) -> &CompilerAdapter<T> {
        &self.compiler
    }

    pub fn pipeline(&self) -> &DeploymentPipeline {
        &self.pipeline
    }

    pub fn chain(&self) -> &Arc<EphemeralChain> {
        self.pipeline.chain()
    }

    /// Compile a file or raw source.
    pub async fn compile(&self, input: &SourceInput, options: &CompileOptions) -> Result<ArtifactBundle> {
        let version = options
            .version
            .as_deref()
            .unwrap_or(&self.config.compiler.solc_version);
        self.compiler
            .compile_input(input, version, options.force_refresh)
            .await
    }

    /// Compile, then deploy the selected contract to the ephemeral chain.
    pub async fn compile_and_deploy_local(
        &self,
        input: &SourceInput,
        compile: &CompileOptions,
        request: &DeployRequest,
    ) -> Result<DeployResult> {
        self.compile_and_deploy(input, compile, request, ChainTarget::Local)
            .await
    }

    /// Compile, then deploy the selected contract to a live network.
    pub async fn compile_and_deploy_live(
        &self,
        input: &SourceInput,
        compile: &CompileOptions,
        request: &DeployRequest,
        endpoint: Url,
        credential: Credential,
    ) -> Result<DeployResult> {
        let target = ChainTarget::Live {
            endpoint,
            credential,
        };
        self.compile_and_deploy(input, compile, request, target).await
    }

    /// Compile, then measure the gas of deploying the selected contract on a
    /// fresh ephemeral chain.
    pub async fn estimate_gas(
        &self,
        input: &SourceInput,
        compile: &CompileOptions,
        contract_name: Option<&str>,
        constructor_args: &[Value],
        options: &DeployOptions,
    ) -> Result<GasEstimate> {
        let bundle = self.compile(input, compile).await?;
        let artifact = bundle.select(contract_name)?;

        self.pipeline
            .estimate_only(artifact, constructor_args, options)
            .await
    }

    /// Compile and return the selected contract's ABI as pretty JSON.
    pub async fn print_abi(
        &self,
        input: &SourceInput,
        compile: &CompileOptions,
        contract_name: Option<&str>,
    ) -> Result<String> {
        let bundle = self.compile(input, compile).await?;
        let artifact = bundle.select(contract_name)?;

        serde_json::to_string_pretty(&artifact.abi)
            .map_err(|e| EngineError::deployment(format!("failed to render ABI: {}", e)))
    }

    /// Stop the ephemeral chain if it is running.
    pub async fn shutdown(&self) {
        self.chain().teardown().await;
    }

    async fn compile_and_deploy(
        &self,
        input: &SourceInput,
        compile: &CompileOptions,
        request: &DeployRequest,
        target: ChainTarget,
    ) -> Result<DeployResult> {
        let bundle = self.compile(input, compile).await?;
        let artifact = bundle.select(request.contract_name.as_deref())?;

        self.pipeline
            .deploy(
                artifact,
                &request.constructor_args,
                target,
                request.dry_run,
                &request.options,
            )
            .await
    }
}
