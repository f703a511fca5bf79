//! Error types for the compile and deploy engine.

use crate::rpc::RpcError;

/// Errors surfaced by the engine to its callers.
///
/// The first four variants form the user-facing taxonomy; the remaining ones
/// cover the environment the engine runs in (toolchain, disk, config files).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The compiler reported one or more `error`-severity diagnostics.
    #[error("compilation failed:\n{diagnostics}")]
    Compilation {
        /// Every fatal diagnostic, formatted by the compiler, newline separated.
        diagnostics: String,
    },

    /// The ephemeral chain process did not become reachable.
    #[error("ephemeral chain failed to start: {reason}{}", format_output(.output))]
    ChainStart {
        reason: String,
        /// Tail of the process' stdout/stderr, if any was captured.
        output: String,
    },

    /// Anything that prevents a deployment from completing successfully.
    #[error("deployment failed: {reason}")]
    Deployment { reason: String },

    /// A dev account beyond the deterministic set was requested.
    #[error("dev account index {index} is out of range (only {available} known accounts)")]
    IndexOutOfRange { index: usize, available: usize },

    /// The compiler toolchain could not be installed or invoked.
    #[error("compiler toolchain error: {0}")]
    Toolchain(String),

    /// The artifact cache could not be read or written.
    #[error("artifact cache error: {0}")]
    Cache(String),

    /// A configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn deployment(reason: impl Into<String>) -> Self {
        Self::Deployment {
            reason: reason.into(),
        }
    }

    pub(crate) fn chain_start(reason: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ChainStart {
            reason: reason.into(),
            output: output.into(),
        }
    }

    /// Wrap an RPC failure that happened during a deployment step.
    pub(crate) fn rpc(step: &str, err: RpcError) -> Self {
        Self::deployment(format!("{step}: {err}"))
    }
}

fn format_output(output: &str) -> String {
    if output.trim().is_empty() {
        String::new()
    } else {
        format!("\nprocess output:\n{}", output.trim_end())
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_start_includes_output() {
        let err = EngineError::chain_start("exited with status 1", "Error: address in use\n");
        let msg = err.to_string();
        assert!(msg.contains("exited with status 1"));
        assert!(msg.ends_with("Error: address in use"));
    }

    #[test]
    fn test_chain_start_without_output() {
        let err = EngineError::chain_start("timed out", "  \n");
        assert_eq!(
            err.to_string(),
            "ephemeral chain failed to start: timed out"
        );
    }
}
