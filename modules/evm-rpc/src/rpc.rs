//! Raw Ethereum JSON-RPC over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::signer::Address;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    /// Node refused the call because the contract reverted.
    pub fn is_revert(&self) -> bool {
        matches!(self, RpcError::Rpc { code, message } if *code == 3 || message.to_ascii_lowercase().contains("revert"))
    }
}

#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

pub struct HttpTransport {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(timeout).gzip(true).build()?;
        Ok(HttpTransport { client, url: url.into(), next_id: AtomicU64::new(1) })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        tracing::trace!(method, id, "rpc request");
        let resp = self.client.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RpcError::Transport(format!("{} returned {}: {}", self.url, status, text)));
        }
        let value: Value = resp.json().await?;
        unwrap_envelope(value)
    }
}

fn unwrap_envelope(mut value: Value) -> Result<Value, RpcError> {
    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        return Err(RpcError::Rpc {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: err.get("message").and_then(Value::as_str).unwrap_or("unknown error").to_string(),
        });
    }
    match value.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(RpcError::InvalidResponse("missing result".into())),
    }
}

pub fn parse_quantity(value: &Value) -> Result<u128, RpcError> {
    let s = value.as_str().ok_or_else(|| RpcError::InvalidResponse(format!("expected hex quantity, got {}", value)))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|_| RpcError::InvalidResponse(format!("bad quantity {}", s)))
}

fn parse_u64(value: &Value) -> Result<u64, RpcError> {
    u64::try_from(parse_quantity(value)?).map_err(|_| RpcError::InvalidResponse(format!("quantity too large: {}", value)))
}

pub fn parse_data(value: &Value) -> Result<Vec<u8>, RpcError> {
    let s = value.as_str().ok_or_else(|| RpcError::InvalidResponse(format!("expected hex data, got {}", value)))?;
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| RpcError::InvalidResponse(format!("bad hex data: {}", e)))
}

pub fn quantity(v: u128) -> String {
    format!("0x{:x}", v)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub status: Option<u64>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

/// Typed wrappers over the handful of `eth_*` calls the backend makes.
#[derive(Clone)]
pub struct EthClient {
    transport: Arc<dyn RpcTransport>,
}

impl EthClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        EthClient { transport }
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        parse_u64(&self.transport.request("eth_chainId", json!([])).await?)
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        parse_u64(&self.transport.request("eth_blockNumber", json!([])).await?)
    }

    pub async fn balance(&self, who: Address) -> Result<u128, RpcError> {
        parse_quantity(&self.transport.request("eth_getBalance", json!([who.to_lower_hex(), "latest"])).await?)
    }

    pub async fn code(&self, at: Address) -> Result<Vec<u8>, RpcError> {
        parse_data(&self.transport.request("eth_getCode", json!([at.to_lower_hex(), "latest"])).await?)
    }

    pub async fn pending_nonce(&self, who: Address) -> Result<u64, RpcError> {
        parse_u64(&self.transport.request("eth_getTransactionCount", json!([who.to_lower_hex(), "pending"])).await?)
    }

    pub async fn estimate_gas(&self, from: Address, to: Address, data: &[u8]) -> Result<u64, RpcError> {
        let call = json!({"from": from.to_lower_hex(), "to": to.to_lower_hex(), "data": format!("0x{}", hex::encode(data))});
        parse_u64(&self.transport.request("eth_estimateGas", json!([call])).await?)
    }

    pub async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        let call = json!({"to": to.to_lower_hex(), "data": format!("0x{}", hex::encode(data))});
        parse_data(&self.transport.request("eth_call", json!([call, "latest"])).await?)
    }

    pub async fn send_raw(&self, raw: &[u8]) -> Result<String, RpcError> {
        let v = self.transport.request("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(raw))])).await?;
        v.as_str().map(str::to_string).ok_or_else(|| RpcError::InvalidResponse(format!("expected tx hash, got {}", v)))
    }

    /// `None` while the transaction is pending.
    pub async fn receipt(&self, tx: &str) -> Result<Option<Receipt>, RpcError> {
        let v = self.transport.request("eth_getTransactionReceipt", json!([tx])).await?;
        if v.is_null() {
            return Ok(None);
        }
        let field = |name: &str| v.get(name).filter(|x| !x.is_null()).map(parse_u64).transpose();
        Ok(Some(Receipt { status: field("status")?, block_number: field("blockNumber")?, gas_used: field("gasUsed")? }))
    }
}
