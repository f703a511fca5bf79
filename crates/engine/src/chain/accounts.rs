//! Deterministic pre-funded dev identities.

use alloy_core::primitives::Address;
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};

use crate::{
    credential::Credential,
    error::{EngineError, Result},
};

/// Mnemonic the node is started with; its first accounts are funded at genesis.
pub const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// Number of dev accounts derived and funded.
pub const DEV_ACCOUNT_COUNT: usize = 10;

/// The dev accounts of the ephemeral node, in derivation order.
#[derive(Clone)]
pub struct DevAccounts {
    signers: Vec<PrivateKeySigner>,
}

impl DevAccounts {
    /// Derive the first `count` accounts of [`DEV_MNEMONIC`].
    pub fn derive(count: usize) -> Result<Self> {
        let signers = (0..count as u32)
            .map(|index| {
                MnemonicBuilder::<English>::default()
                    .phrase(DEV_MNEMONIC)
                    .index(index)
                    .and_then(|builder| builder.build())
                    .map_err(|e| {
                        EngineError::chain_start(format!("failed to derive dev account {}: {}", index, e), "")
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { signers })
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    fn get(&self, index: usize) -> Result<&PrivateKeySigner> {
        self.signers.get(index).ok_or(EngineError::IndexOutOfRange {
            index,
            available: self.signers.len(),
        })
    }

    pub fn address(&self, index: usize) -> Result<Address> {
        self.get(index).map(|signer| signer.address())
    }

    pub fn private_key(&self, index: usize) -> Result<Credential> {
        self.get(index)
            .map(|signer| Credential::new(format!("0x{}", hex::encode(signer.to_bytes()))))
    }
}

impl std::fmt::Debug for DevAccounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.signers.iter().map(|s| s.address()))
            .finish()
    }
}
