//! JSON-RPC transport and the typed Ethereum calls the deployment pipeline uses.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors talking to a JSON-RPC endpoint.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The request never got a well-formed HTTP response.
    #[error("failed to send {method} request: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    /// The node answered with a JSON-RPC error object.
    #[error("{method} returned error {code}: {message}")]
    Node {
        method: String,
        code: i64,
        message: String,
    },

    /// The node answered, but not with what the method promises.
    #[error("malformed {method} response: {reason}")]
    Malformed { method: String, reason: String },
}

impl RpcError {
    fn malformed(method: &str, reason: impl ToString) -> Self {
        Self::Malformed {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Something that answers JSON-RPC calls.
pub trait JsonRpc: Send + Sync {
    /// Make a call and return the raw `result` value.
    fn request(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send;
}

/// JSON-RPC over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRpc {
    client: reqwest::Client,
    url: Url,
}

impl HttpRpc {
    /// Create a client for the endpoint at `url`.
    pub fn new(url: Url) -> Result<Self, RpcError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport {
                method: "client setup".to_string(),
                source: e,
            })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl JsonRpc for HttpRpc {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        // URLs of hosted endpoints often embed API keys; keep them out of errors.
        let transport = |e: reqwest::Error| RpcError::Transport {
            method: method.to_string(),
            source: e.without_url(),
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .map_err(transport)?;

        let mut body: Value = response.json().await.map_err(transport)?;

        if let Some(error) = body.get("error") {
            return Err(RpcError::Node {
                method: method.to_string(),
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        body.get_mut("result")
            .map(Value::take)
            .ok_or_else(|| RpcError::malformed(method, "no result in response"))
    }
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub block_number: u64,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub gas_used: u64,
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// `0x1` on success, `0x0` when reverted.
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    pub status: Option<u64>,
}

impl TransactionReceipt {
    /// Whether the transaction succeeded. Pre-Byzantium receipts carry no
    /// status and are treated as successful.
    pub fn succeeded(&self) -> bool {
        self.status != Some(0)
    }
}

/// Deserialize a u64 from a hex string (with 0x prefix).
fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

fn deserialize_opt_u64_from_hex<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16))
        .transpose()
        .map_err(serde::de::Error::custom)
}

/// Parse a hex quantity (`"0x1a"`) into a `u128`.
pub fn parse_quantity(method: &str, value: &Value) -> Result<u128, RpcError> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcError::malformed(method, format!("expected hex quantity, got {}", value)))?;
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::malformed(method, format!("missing 0x prefix in {}", s)))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| RpcError::malformed(method, e))
}

/// Typed access to the Ethereum JSON-RPC methods used when deploying.
#[derive(Debug)]
pub struct EthApi<'a, R> {
    rpc: &'a R,
}

impl<'a, R: JsonRpc> EthApi<'a, R> {
    pub fn new(rpc: &'a R) -> Self {
        Self { rpc }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T, RpcError> {
        let result = self.rpc.request(method, params).await?;
        serde_json::from_value(result).map_err(|e| RpcError::malformed(method, e))
    }

    async fn quantity(&self, method: &str, params: Vec<Value>) -> Result<u128, RpcError> {
        let result = self.rpc.request(method, params).await?;
        parse_quantity(method, &result)
    }

    async fn quantity_u64(&self, method: &str, params: Vec<Value>) -> Result<u64, RpcError> {
        let value = self.quantity(method, params).await?;
        u64::try_from(value).map_err(|e| RpcError::malformed(method, e))
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        self.quantity_u64("eth_chainId", vec![]).await
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        self.quantity_u64("eth_blockNumber", vec![]).await
    }

    /// Next nonce for `address`, counting transactions still in the pool.
    pub async fn transaction_count(&self, address: Address) -> Result<u64, RpcError> {
        self.quantity_u64(
            "eth_getTransactionCount",
            vec![serde_json::json!(address), serde_json::json!("pending")],
        )
        .await
    }

    pub async fn gas_price(&self) -> Result<u128, RpcError> {
        self.quantity("eth_gasPrice", vec![]).await
    }

    /// Base fee of the latest block, or `None` on chains without EIP-1559.
    pub async fn latest_base_fee(&self) -> Result<Option<u128>, RpcError> {
        const METHOD: &str = "eth_getBlockByNumber";
        let block = self
            .rpc
            .request(METHOD, vec![serde_json::json!("latest"), serde_json::json!(false)])
            .await?;

        match block.get("baseFeePerGas") {
            None | Some(Value::Null) => Ok(None),
            Some(fee) => parse_quantity(METHOD, fee).map(Some),
        }
    }

    /// Estimate the gas of a contract creation with the given init code.
    pub async fn estimate_deploy_gas(&self, from: Address, init_code: &Bytes) -> Result<u64, RpcError> {
        self.quantity_u64(
            "eth_estimateGas",
            vec![serde_json::json!({ "from": from, "data": init_code })],
        )
        .await
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError> {
        self.call(
            "eth_sendRawTransaction",
            vec![serde_json::json!(format!("0x{}", hex::encode(raw)))],
        )
        .await
    }

    /// Receipt for `hash`, or `None` while the transaction is pending.
    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>, RpcError> {
        self.call("eth_getTransactionReceipt", vec![serde_json::json!(hash)])
            .await
    }

    pub async fn code_at(&self, address: Address) -> Result<Bytes, RpcError> {
        self.call(
            "eth_getCode",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("m", &serde_json::json!("0x0")).unwrap(), 0);
        assert_eq!(parse_quantity("m", &serde_json::json!("0x")).unwrap(), 0);
        assert_eq!(parse_quantity("m", &serde_json::json!("0x539")).unwrap(), 1337);
        assert_eq!(
            parse_quantity("m", &serde_json::json!("0x3b9aca00")).unwrap(),
            1_000_000_000
        );
        assert!(parse_quantity("m", &serde_json::json!("539")).is_err());
        assert!(parse_quantity("m", &serde_json::json!(1337)).is_err());
        assert!(parse_quantity("m", &serde_json::json!("0xzz")).is_err());
    }

    #[test]
    fn test_receipt_deserialization() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x1",
            "gasUsed": "0x1d4c0",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "status": "0x1",
            "logs": []
        }))
        .unwrap();

        assert_eq!(receipt.block_number, 1);
        assert_eq!(receipt.gas_used, 120_000);
        assert!(receipt.succeeded());
        assert_eq!(
            receipt.contract_address.unwrap().to_checksum(None),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );
    }

    #[test]
    fn test_reverted_receipt() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x2",
            "gasUsed": "0x5208",
            "contractAddress": null,
            "status": "0x0"
        }))
        .unwrap();

        assert!(!receipt.succeeded());
        assert!(receipt.contract_address.is_none());
    }
}
