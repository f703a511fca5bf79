//! Types for the compiler's `--standard-json` interface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    artifact::{ArtifactBundle, ContractArtifact},
    error::{EngineError, Result},
    fingerprint::CompilationRequest,
};

/// Structured compiler input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandardJsonInput {
    pub language: &'static str,
    pub sources: BTreeMap<String, SourceContent>,
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceContent {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub output_selection: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remappings: Vec<String>,
}

impl StandardJsonInput {
    /// Build the input for a request, selecting only ABI and creation bytecode.
    pub fn from_request(request: &CompilationRequest) -> Self {
        Self {
            language: "Solidity",
            sources: request
                .sources
                .iter()
                .map(|(name, content)| {
                    (
                        name.clone(),
                        SourceContent {
                            content: content.clone(),
                        },
                    )
                })
                .collect(),
            settings: Settings {
                output_selection: serde_json::json!({
                    "*": { "*": ["abi", "evm.bytecode.object"] }
                }),
                remappings: request.remappings.clone(),
            },
        }
    }
}

/// Structured compiler output.
///
/// `contracts` keeps the compiler's own ordering (file, then contract), which
/// decides the default contract when a caller does not name one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StandardJsonOutput {
    #[serde(default)]
    pub errors: Vec<Diagnostic>,
    #[serde(default)]
    pub contracts: Map<String, Value>,
}

/// A compiler diagnostic (error, warning or info).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: String,
    pub message: String,
    #[serde(default)]
    pub formatted_message: Option<String>,
}

impl Diagnostic {
    pub fn is_fatal(&self) -> bool {
        self.severity == "error"
    }

    /// The compiler-formatted message (file, line and caret), or the bare
    /// message when the compiler did not format one.
    pub fn render(&self) -> &str {
        self.formatted_message.as_deref().unwrap_or(&self.message)
    }
}

#[derive(Debug, Deserialize)]
struct CompiledContract {
    abi: Value,
    evm: Evm,
}

#[derive(Debug, Deserialize)]
struct Evm {
    bytecode: Bytecode,
}

#[derive(Debug, Deserialize)]
struct Bytecode {
    object: String,
}

impl StandardJsonOutput {
    /// Fail with every fatal diagnostic if there is at least one.
    pub fn check_diagnostics(&self) -> Result<()> {
        let fatals: Vec<&str> = self
            .errors
            .iter()
            .filter(|d| d.is_fatal())
            .map(Diagnostic::render)
            .collect();

        if fatals.is_empty() {
            for warning in self.errors.iter().filter(|d| !d.is_fatal()) {
                tracing::debug!(severity = %warning.severity, message = %warning.message, "Compiler diagnostic");
            }
            return Ok(());
        }

        Err(EngineError::Compilation {
            diagnostics: fatals.join("\n"),
        })
    }

    /// Flatten per-file, per-contract output into a bundle.
    pub fn into_bundle(self) -> Result<ArtifactBundle> {
        let mut bundle = ArtifactBundle::default();

        for (source_file, file_output) in self.contracts {
            let Value::Object(contracts) = file_output else {
                return Err(EngineError::Toolchain(format!(
                    "unexpected output shape for {}",
                    source_file
                )));
            };

            for (name, contract) in contracts {
                let contract: CompiledContract = serde_json::from_value(contract).map_err(|e| {
                    EngineError::Toolchain(format!(
                        "missing abi or bytecode for {}:{}: {}",
                        source_file, name, e
                    ))
                })?;

                bundle.insert(ContractArtifact {
                    name,
                    abi: contract.abi,
                    bytecode: format!("0x{}", contract.evm.bytecode.object.trim_start_matches("0x")),
                    source_file: source_file.clone(),
                });
            }
        }

        Ok(bundle)
    }
}
