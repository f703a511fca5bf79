//! Compiled contract artifacts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// ABI and bytecode for a single compiled contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractArtifact {
    /// Contract name as declared in the source.
    pub name: String,
    /// The contract's ABI, as emitted by the compiler.
    pub abi: Value,
    /// Creation bytecode, hex encoded with a leading `0x`.
    pub bytecode: String,
    /// Name of the source file that declares the contract.
    pub source_file: String,
}

/// Every contract produced by one compilation, in compiler output order.
///
/// Bundles are immutable once produced; the cache stores them keyed by the
/// request fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactBundle {
    contracts: Vec<ContractArtifact>,
}

impl ArtifactBundle {
    /// Insert a contract. A later contract with an already present name
    /// replaces the earlier one in place.
    pub(crate) fn insert(&mut self, artifact: ContractArtifact) {
        match self.contracts.iter_mut().find(|c| c.name == artifact.name) {
            Some(existing) => *existing = artifact,
            None => self.contracts.push(artifact),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ContractArtifact> {
        self.contracts.iter().find(|c| c.name == name)
    }

    pub fn contracts(&self) -> &[ContractArtifact] {
        &self.contracts
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contracts.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Pick the contract to deploy: the named one, or the first one the
    /// compiler emitted.
    pub fn select(&self, name: Option<&str>) -> Result<&ContractArtifact> {
        let Some(first) = self.contracts.first() else {
            return Err(EngineError::deployment("compilation produced no contracts"));
        };

        match name {
            None => Ok(first),
            Some(name) => self.get(name).ok_or_else(|| {
                EngineError::deployment(format!(
                    "contract '{}' not found; available: {}",
                    name,
                    self.names().collect::<Vec<_>>().join(", ")
                ))
            }),
        }
    }
}

impl FromIterator<ContractArtifact> for ArtifactBundle {
    fn from_iter<I: IntoIterator<Item = ContractArtifact>>(iter: I) -> Self {
        let mut bundle = Self::default();
        for artifact in iter {
            bundle.insert(artifact);
        }
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(name: &str, source_file: &str) -> ContractArtifact {
        ContractArtifact {
            name: name.to_string(),
            abi: serde_json::json!([]),
            bytecode: "0x6080".to_string(),
            source_file: source_file.to_string(),
        }
    }

    #[test]
    fn test_select_defaults_to_first() {
        let bundle: ArtifactBundle = [artifact("Token", "Token.sol"), artifact("Vault", "Vault.sol")]
            .into_iter()
            .collect();

        assert_eq!(bundle.select(None).unwrap().name, "Token");
        assert_eq!(bundle.select(Some("Vault")).unwrap().name, "Vault");
    }

    #[test]
    fn test_select_unknown_lists_available() {
        let bundle: ArtifactBundle = [artifact("Token", "Token.sol")].into_iter().collect();

        let err = bundle.select(Some("Missing")).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, EngineError::Deployment { .. }));
        assert!(msg.contains("Missing"));
        assert!(msg.contains("Token"));
    }

    #[test]
    fn test_select_empty_bundle() {
        let err = ArtifactBundle::default().select(None).unwrap_err();
        assert!(err.to_string().contains("no contracts"));
    }

    #[test]
    fn test_duplicate_name_replaces_in_place() {
        let bundle: ArtifactBundle = [
            artifact("Shared", "A.sol"),
            artifact("Other", "B.sol"),
            artifact("Shared", "C.sol"),
        ]
        .into_iter()
        .collect();

        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.contracts()[0].source_file, "C.sol");
        assert_eq!(bundle.contracts()[1].name, "Other");
    }
}
