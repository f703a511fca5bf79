//! Contract-creation transactions: build, sign, encode.

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy_core::primitives::{B256, Bytes, Signature, TxKind, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer_local::PrivateKeySigner;

use super::gas::FeeModel;
use crate::error::{EngineError, Result};

/// An unsigned contract creation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fee: FeeModel,
    pub input: Bytes,
}

/// A signed, EIP-2718 encoded transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDeployTx {
    pub hash: B256,
    pub raw: Vec<u8>,
}

impl DeployTx {
    pub fn sign(self, signer: &PrivateKeySigner) -> Result<SignedDeployTx> {
        let envelope: TxEnvelope = match self.fee {
            FeeModel::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let tx = TxEip1559 {
                    chain_id: self.chain_id,
                    nonce: self.nonce,
                    gas_limit: self.gas_limit,
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                    to: TxKind::Create,
                    value: U256::ZERO,
                    access_list: Default::default(),
                    input: self.input,
                };
                let signature = sign_hash(signer, tx.signature_hash())?;
                tx.into_signed(signature).into()
            }
            FeeModel::Legacy { gas_price } => {
                let tx = TxLegacy {
                    chain_id: Some(self.chain_id),
                    nonce: self.nonce,
                    gas_price,
                    gas_limit: self.gas_limit,
                    to: TxKind::Create,
                    value: U256::ZERO,
                    input: self.input,
                };
                let signature = sign_hash(signer, tx.signature_hash())?;
                tx.into_signed(signature).into()
            }
        };

        Ok(SignedDeployTx {
            hash: *envelope.tx_hash(),
            raw: envelope.encoded_2718(),
        })
    }
}

fn sign_hash(signer: &PrivateKeySigner, hash: B256) -> Result<Signature> {
    let (signature, recovery_id) = signer
        .credential()
        .sign_prehash_recoverable(hash.as_slice())
        .map_err(|e| EngineError::deployment(format!("failed to sign transaction: {}", e)))?;

    Ok(Signature::new(
        U256::from_be_slice(&signature.r().to_bytes()),
        U256::from_be_slice(&signature.s().to_bytes()),
        recovery_id.is_y_odd(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Credential;
    use alloy_core::primitives::keccak256;

    fn signer() -> PrivateKeySigner {
        Credential::new("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80")
            .signer()
            .unwrap()
    }

    fn tx(fee: FeeModel) -> DeployTx {
        DeployTx {
            chain_id: 1337,
            nonce: 0,
            gas_limit: 120_000,
            fee,
            input: Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]),
        }
    }

    #[test]
    fn test_eip1559_envelope() {
        let signed = tx(FeeModel::Eip1559 {
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
        })
        .sign(&signer())
        .unwrap();

        assert_eq!(signed.raw[0], 0x02, "typed transaction prefix");
        assert_eq!(signed.hash, keccak256(&signed.raw));
    }

    #[test]
    fn test_legacy_envelope() {
        let signed = tx(FeeModel::Legacy {
            gas_price: 2_000_000_000,
        })
        .sign(&signer())
        .unwrap();

        assert!(signed.raw[0] >= 0xc0, "legacy transactions are a bare RLP list");
        assert_eq!(signed.hash, keccak256(&signed.raw));
    }

    #[test]
    fn test_signing_is_deterministic() {
        let fee = FeeModel::Legacy { gas_price: 1 };
        let a = tx(fee).sign(&signer()).unwrap();
        let b = tx(fee).sign(&signer()).unwrap();

        assert_eq!(a, b);
    }
}
