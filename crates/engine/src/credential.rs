//! Raw private keys, held only for the duration of one call.

use std::fmt;

use alloy_core::primitives::B256;
use alloy_signer_local::PrivateKeySigner;
use k256::elliptic_curve::zeroize::Zeroize;

use crate::error::{EngineError, Result};

/// A hex-encoded private key.
///
/// The key is wiped from memory when dropped, never serialized, and its
/// `Debug` output is redacted.
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for handing back to a caller that explicitly asked for it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Parse into a signer.
    ///
    /// Accepts 64 hex digits with or without `0x`. The error never contains
    /// the input.
    pub(crate) fn signer(&self) -> Result<PrivateKeySigner> {
        let mut bytes: B256 = self
            .0
            .trim()
            .parse()
            .map_err(|_| EngineError::deployment("invalid key format"))?;

        let signer = PrivateKeySigner::from_bytes(&bytes)
            .map_err(|_| EngineError::deployment("invalid key format"));
        bytes.0.zeroize();
        signer
    }
}

impl From<String> for Credential {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for Credential {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_parse_with_and_without_prefix() {
        let expected = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

        let with_prefix = Credential::new(KEY).signer().unwrap();
        let without_prefix = Credential::new(KEY.trim_start_matches("0x")).signer().unwrap();

        assert_eq!(with_prefix.address().to_checksum(None), expected);
        assert_eq!(without_prefix.address(), with_prefix.address());
    }

    #[test]
    fn test_invalid_key_is_not_echoed() {
        let secret = "0xdeadbeefnothex";
        let err = Credential::new(secret).signer().unwrap_err();

        assert_eq!(err.to_string(), "deployment failed: invalid key format");
        assert!(!err.to_string().contains("deadbeef"));
    }

    #[test]
    fn test_zero_key_is_rejected() {
        let zero = format!("0x{}", "0".repeat(64));
        assert!(Credential::new(zero).signer().is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let debug = format!("{:?}", Credential::new(KEY));
        assert!(!debug.contains("ac0974"));
    }
}
