use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr};

use derive_more::Deref;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A request to compile a set of Solidity sources.
///
/// Only `sources`, `version` and `remappings` take part in the request's
/// identity. `base_path` tells the compiler where to resolve imports from but
/// does not change the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationRequest {
    /// Source file name to source text. Kept sorted so serialization is canonical.
    pub sources: BTreeMap<String, String>,
    /// Compiler version, e.g. `0.8.24`.
    pub version: String,
    /// Import remappings, e.g. `@openzeppelin/=node_modules/@openzeppelin/`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remappings: Vec<String>,
    /// Root for relative import resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,
}

impl CompilationRequest {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            sources: BTreeMap::new(),
            version: version.into(),
            remappings: Vec::new(),
            base_path: None,
        }
    }

    /// Add (or replace) a source file.
    pub fn source(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.sources.insert(name.into(), content.into());
        self
    }

    pub fn remappings(mut self, remappings: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.remappings = remappings.into_iter().map(Into::into).collect();
        self
    }

    pub fn base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Compute the fingerprint of this request.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

/// The fields of a [`CompilationRequest`] that identify it.
///
/// Field order here is the serialization order; `BTreeMap` keeps the sources
/// sorted by name, so two requests that differ only in insertion order
/// serialize identically.
#[derive(Serialize)]
struct CanonicalRequest<'a> {
    remappings: &'a [String],
    sources: &'a BTreeMap<String, String>,
    version: &'a str,
}

/// SHA-256 digest identifying a unique compilation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deref)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint the canonical serialization of a request.
    pub fn of(request: &CompilationRequest) -> Self {
        let canonical = CanonicalRequest {
            remappings: &request.remappings,
            sources: &request.sources,
            version: &request.version,
        };

        // Serializing plain strings and maps to a Vec cannot fail.
        let json = serde_json::to_vec(&canonical).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(&json);
        Self(hasher.finalize().into())
    }

    /// Lowercase hex encoding, used as the cache file stem.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE_A: &str = "pragma solidity ^0.8.0; contract A {}";
    const SOURCE_B: &str = "pragma solidity ^0.8.0; contract B {}";

    fn base_request() -> CompilationRequest {
        CompilationRequest::new("0.8.24")
            .source("A.sol", SOURCE_A)
            .source("B.sol", SOURCE_B)
            .remappings(["@openzeppelin/=node_modules/@openzeppelin/"])
    }

    #[test]
    fn test_fingerprint_determinism() {
        let request = base_request();

        let first = request.fingerprint();
        let second = request.fingerprint();

        assert_eq!(first, second, "Fingerprint should be deterministic");
        assert_eq!(first.to_hex().len(), 64, "SHA-256 hex should be 64 characters");
    }

    #[test]
    fn test_fingerprint_ignores_source_insertion_order() {
        let forward = CompilationRequest::new("0.8.24")
            .source("A.sol", SOURCE_A)
            .source("B.sol", SOURCE_B);
        let backward = CompilationRequest::new("0.8.24")
            .source("B.sol", SOURCE_B)
            .source("A.sol", SOURCE_A);

        assert_eq!(forward.fingerprint(), backward.fingerprint());
    }

    #[test]
    fn test_fingerprint_ignores_base_path() {
        let request = base_request();
        let with_base = base_request().base_path("/tmp/contracts");

        assert_eq!(request.fingerprint(), with_base.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_source_content() {
        let request = base_request();
        let changed = base_request().source("A.sol", "pragma solidity ^0.8.0; contract A { }");

        assert_ne!(
            request.fingerprint(),
            changed.fingerprint(),
            "Fingerprint should change when a source changes"
        );
    }

    #[test]
    fn test_fingerprint_changes_with_source_name() {
        let request = CompilationRequest::new("0.8.24").source("A.sol", SOURCE_A);
        let renamed = CompilationRequest::new("0.8.24").source("Renamed.sol", SOURCE_A);

        assert_ne!(request.fingerprint(), renamed.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_version() {
        let request = base_request();
        let mut changed = request.clone();
        changed.version = "0.8.25".to_string();

        assert_ne!(
            request.fingerprint(),
            changed.fingerprint(),
            "Fingerprint should change when the compiler version changes"
        );
    }

    #[test]
    fn test_fingerprint_changes_with_remappings() {
        let request = base_request();
        let without = base_request().remappings(Vec::<String>::new());

        assert_ne!(
            request.fingerprint(),
            without.fingerprint(),
            "Fingerprint should change when remappings change"
        );
    }

    #[test]
    fn test_fingerprint_hex_round_trip() {
        let fingerprint = base_request().fingerprint();
        let parsed: Fingerprint = fingerprint.to_hex().parse().expect("valid hex");

        assert_eq!(fingerprint, parsed);
        assert!("not-hex".parse::<Fingerprint>().is_err());
    }
}
