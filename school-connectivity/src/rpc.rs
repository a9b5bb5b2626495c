//! Ethereum JSON-RPC wallet
//!
//! Talks to a node exposing unlocked accounts (`eth_accounts`,
//! `eth_sendTransaction`). RPC error objects surface as
//! [`ChainError::Rpc`] so the error classifier can map their codes.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::{ChainError, TxConfig, TxReceipt, WalletProvider};
use crate::models::Address;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
    contract_address: Option<String>,
}

/// Wallet backed by an Ethereum node's JSON-RPC endpoint
#[derive(Debug)]
pub struct RpcWallet {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcWallet {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::debug!(method, id, "JSON-RPC call");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(transport_err)?;
        let response: RpcResponse = response.json().await.map_err(transport_err)?;
        into_result(response)
    }
}

fn transport_err(err: reqwest::Error) -> ChainError {
    ChainError::Transport(err.to_string())
}

fn into_result(response: RpcResponse) -> Result<Value, ChainError> {
    match response.error {
        Some(error) => Err(ChainError::Rpc {
            code: error.code,
            message: error.message,
        }),
        None => Ok(response.result),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn quantity(value: u64) -> String {
    format!("0x{value:x}")
}

fn parse_quantity(raw: &str) -> Result<u64, ChainError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16)
        .map_err(|_| ChainError::Malformed(format!("bad quantity {raw}")))
}

fn parse_accounts(value: Value) -> Result<Vec<Address>, ChainError> {
    let raw: Vec<String> = serde_json::from_value(value)?;
    raw.iter()
        .map(|a| Address::parse(a).map_err(ChainError::from))
        .collect()
}

fn tx_params(tx: &TxConfig) -> Value {
    let mut params = serde_json::Map::new();
    if let Some(from) = &tx.from {
        params.insert("from".into(), json!(from));
    }
    if let Some(to) = &tx.to {
        params.insert("to".into(), json!(to));
    }
    params.insert("data".into(), json!(to_hex(&tx.data)));
    if let Some(gas) = tx.gas {
        params.insert("gas".into(), json!(quantity(gas)));
    }
    if let Some(gas_price) = tx.gas_price {
        params.insert("gasPrice".into(), json!(quantity(gas_price)));
    }
    if let Some(value) = tx.value {
        params.insert("value".into(), json!(quantity(value)));
    }
    Value::Array(vec![Value::Object(params)])
}

fn parse_receipt(value: Value) -> Result<Option<TxReceipt>, ChainError> {
    let Some(raw) = serde_json::from_value::<Option<RawReceipt>>(value)? else {
        return Ok(None);
    };
    // Pending transactions have no block yet
    let Some(block) = raw.block_number.as_deref() else {
        return Ok(None);
    };
    Ok(Some(TxReceipt {
        tx_hash: raw.transaction_hash,
        block_number: parse_quantity(block)?,
        status: raw.status.as_deref().map(parse_quantity).transpose()? != Some(0),
        contract_address: raw.contract_address.as_deref().map(Address::parse).transpose()?,
    }))
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn enable(&self) -> Result<Vec<Address>, ChainError> {
        parse_accounts(self.call("eth_requestAccounts", json!([])).await?)
    }

    async fn current_account(&self) -> Result<Option<Address>, ChainError> {
        let accounts = parse_accounts(self.call("eth_accounts", json!([])).await?)?;
        Ok(accounts.into_iter().next())
    }

    async fn send_transaction(&self, tx: &TxConfig) -> Result<String, ChainError> {
        let hash = self.call("eth_sendTransaction", tx_params(tx)).await?;
        serde_json::from_value(hash).map_err(ChainError::from)
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, ChainError> {
        parse_receipt(self.call("eth_getTransactionReceipt", json!([tx_hash])).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_object() {
        let response: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"query returned more than 10000 results"}}"#,
        )
        .unwrap();
        let err = into_result(response).unwrap_err();
        assert!(matches!(err, ChainError::Rpc { code: -32005, .. }));
    }

    #[test]
    fn test_tx_params() {
        let tx = TxConfig {
            from: Some(Address::parse("0x8C3F546A89DA0e431Ea2D13a790b199f653cbf01").unwrap()),
            to: None,
            data: vec![0xde, 0xad, 0x01],
            gas: Some(21000),
            ..TxConfig::default()
        };
        let params = tx_params(&tx);
        assert_eq!(params[0]["from"], "0x8c3f546a89da0e431ea2d13a790b199f653cbf01");
        assert_eq!(params[0]["data"], "0xdead01");
        assert_eq!(params[0]["gas"], "0x5208");
        assert!(params[0].get("to").is_none());
    }

    #[test]
    fn test_parse_receipt() {
        let mined = json!({
            "transactionHash": "0xabc",
            "blockNumber": "0x1b4",
            "status": "0x1",
            "contractAddress": null
        });
        let receipt = parse_receipt(mined).unwrap().unwrap();
        assert_eq!(receipt.block_number, 436);
        assert!(receipt.status);

        let failed = json!({"transactionHash": "0xabc", "blockNumber": "0x1", "status": "0x0"});
        assert!(!parse_receipt(failed).unwrap().unwrap().status);

        assert_eq!(parse_receipt(Value::Null).unwrap(), None);
        let pending = json!({"transactionHash": "0xabc", "blockNumber": null});
        assert_eq!(parse_receipt(pending).unwrap(), None);
    }

    #[test]
    fn test_parse_accounts() {
        let accounts =
            parse_accounts(json!(["0x8C3F546A89DA0e431Ea2D13a790b199f653cbf01"])).unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(matches!(
            parse_accounts(json!(["nope"])),
            Err(ChainError::Address(_))
        ));
    }
}
