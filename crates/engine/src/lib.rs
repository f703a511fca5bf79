//! soldeploy-engine - Solidity compile and deploy engine.
//!
//! This crate compiles Solidity through a fingerprint-keyed artifact cache,
//! runs a disposable local node on demand, and deploys contracts to it or to a
//! live network, with gas estimation and dry runs.

mod artifact;
pub use artifact::{ArtifactBundle, ContractArtifact};

mod cache;
pub use cache::{FileLock, FingerprintCache};

pub mod chain;
pub use chain::{ChainProcessState, EphemeralChain};

pub mod compiler;
pub use compiler::{CompilerAdapter, Solc, SourceInput, Toolchain};

mod config;
pub use config::{ChainConfig, CompilerConfig, DeployConfig, EngineConfig};

mod credential;
pub use credential::Credential;

pub mod deploy;
pub use deploy::{
    ChainTarget, DeployOptions, DeployResult, DeploymentPipeline, FeeModel, GasEstimate,
    TargetKind,
};

mod engine;
pub use engine::{CompileOptions, DeployRequest, Engine};

mod error;
pub use error::{EngineError, Result};

mod fingerprint;
pub use fingerprint::{CompilationRequest, Fingerprint};

pub mod rpc;
