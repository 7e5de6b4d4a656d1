//! Ethereum JSON-RPC transport over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use certchain_types::{Address, Digest, Timestamp, TxHash};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::transport::{revert_reason, CallRequest, ChainTransport, Log, LogFilter, Receipt};
use crate::ChainError;

/// JSON-RPC error code geth and most providers use for reverted calls.
const EXECUTION_REVERTED: i64 = 3;

/// HTTP client for an Ethereum node.
pub struct JsonRpcTransport {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<Digest>,
    data: String,
    block_number: Option<String>,
    log_index: Option<String>,
    transaction_hash: Option<TxHash>,
    #[serde(default)]
    removed: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: TxHash,
    block_number: Option<String>,
    status: Option<String>,
    gas_used: String,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Deserialize)]
struct RpcBlock {
    timestamp: String,
}

pub(crate) fn parse_quantity(s: &str) -> Result<u128, ChainError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Decode(format!("quantity {s} lacks 0x prefix")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| ChainError::Decode(format!("quantity {s}: {e}")))
}

fn parse_u64(s: &str) -> Result<u64, ChainError> {
    u64::try_from(parse_quantity(s)?).map_err(|_| ChainError::Decode(format!("{s} exceeds u64")))
}

fn parse_data(s: &str) -> Result<Vec<u8>, ChainError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| ChainError::Decode(format!("hex data: {e}")))
}

fn quantity(value: u64) -> String {
    format!("0x{value:x}")
}

fn data_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

impl RpcLog {
    /// `None` for pending or reorged-out logs.
    fn into_log(self) -> Result<Option<Log>, ChainError> {
        if self.removed {
            return Ok(None);
        }
        let (Some(block), Some(index), Some(tx_hash)) =
            (self.block_number, self.log_index, self.transaction_hash)
        else {
            return Ok(None);
        };
        Ok(Some(Log {
            address: self.address,
            topics: self.topics,
            data: parse_data(&self.data)?,
            block_number: parse_u64(&block)?,
            log_index: parse_u64(&index)?,
            tx_hash,
        }))
    }
}

/// Map a JSON-RPC error object to a typed error.
pub(crate) fn classify_error(err: RpcErrorObject) -> ChainError {
    let revert_data = err
        .data
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| parse_data(s).ok());
    if err.code == EXECUTION_REVERTED || err.message.contains("revert") {
        let reason = match revert_data {
            Some(data) if !data.is_empty() => revert_reason(&data),
            _ => err.message,
        };
        return ChainError::Reverted { reason };
    }
    ChainError::Rpc {
        code: err.code,
        message: err.message,
    }
}

impl JsonRpcTransport {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ChainError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Network(format!("{method}: request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ChainError::Network(format!(
                "{method}: node returned HTTP {}",
                response.status()
            )));
        }

        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Network(format!("{method}: invalid JSON response: {e}")))?;

        if let Some(err) = rpc.error {
            return Err(classify_error(err));
        }
        serde_json::from_value(rpc.result.unwrap_or(Value::Null))
            .map_err(|e| ChainError::Decode(format!("{method}: unexpected result: {e}")))
    }
}

#[async_trait]
impl ChainTransport for JsonRpcTransport {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id: String = self.request("eth_chainId", json!([])).await?;
        parse_u64(&id)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let number: String = self.request("eth_blockNumber", json!([])).await?;
        parse_u64(&number)
    }

    async fn block_timestamp(&self, number: u64) -> Result<Timestamp, ChainError> {
        let block: Option<RpcBlock> = self
            .request("eth_getBlockByNumber", json!([quantity(number), false]))
            .await?;
        let block = block.ok_or_else(|| ChainError::NotFound(format!("block {number}")))?;
        Ok(Timestamp::new(parse_u64(&block.timestamp)?))
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        let price: String = self.request("eth_gasPrice", json!([])).await?;
        parse_quantity(&price)
    }

    async fn pending_nonce(&self, address: &Address) -> Result<u64, ChainError> {
        let count: String = self
            .request("eth_getTransactionCount", json!([address.to_string(), "pending"]))
            .await?;
        parse_u64(&count)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError> {
        self.request("eth_sendRawTransaction", json!([data_hex(raw)]))
            .await
    }

    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, ChainError> {
        let receipt: Option<RpcReceipt> = self
            .request("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        let Some(receipt) = receipt else {
            return Ok(None);
        };
        let Some(block) = receipt.block_number else {
            return Ok(None);
        };
        let mut logs = Vec::with_capacity(receipt.logs.len());
        for log in receipt.logs {
            if let Some(log) = log.into_log()? {
                logs.push(log);
            }
        }
        Ok(Some(Receipt {
            tx_hash: receipt.transaction_hash,
            block_number: parse_u64(&block)?,
            success: receipt
                .status
                .as_deref()
                .map(parse_u64)
                .transpose()?
                .map_or(true, |s| s == 1),
            gas_used: parse_u64(&receipt.gas_used)?,
            logs,
        }))
    }

    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, ChainError> {
        let mut tx = json!({ "to": request.to.to_string(), "data": data_hex(&request.data) });
        if let Some(from) = request.from {
            tx["from"] = json!(from.to_string());
        }
        let output: String = self.request("eth_call", json!([tx, "latest"])).await?;
        parse_data(&output)
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError> {
        let query = json!({
            "address": filter.address.to_string(),
            "topics": [filter.topic.to_string()],
            "fromBlock": quantity(filter.from_block),
            "toBlock": quantity(filter.to_block),
        });
        let raw: Vec<RpcLog> = self.request("eth_getLogs", json!([query])).await?;
        let mut logs = Vec::with_capacity(raw.len());
        for log in raw {
            if let Some(log) = log.into_log()? {
                logs.push(log);
            }
        }
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::encode_revert_reason;

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("0x4a817c800").unwrap(), 20_000_000_000);
        assert!(parse_quantity("42").is_err());
        assert_eq!(quantity(255), "0xff");
    }

    #[test]
    fn revert_with_data_is_decoded() {
        let err = RpcErrorObject {
            code: 3,
            message: "execution reverted".into(),
            data: Some(json!(data_hex(&encode_revert_reason("Not an admin")))),
        };
        match classify_error(err) {
            ChainError::Reverted { reason } => assert_eq!(reason, "Not an admin"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_errors_stay_rpc_errors() {
        let err = RpcErrorObject {
            code: -32000,
            message: "nonce too low".into(),
            data: None,
        };
        assert!(matches!(
            classify_error(err),
            ChainError::Rpc { code: -32000, .. }
        ));
    }

    #[test]
    fn receipt_json_is_parsed() {
        let json = json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "blockNumber": "0x10",
            "status": "0x1",
            "gasUsed": "0x5208",
            "logs": [{
                "address": format!("0x{}", "11".repeat(20)),
                "topics": [format!("0x{}", "22".repeat(32))],
                "data": "0x",
                "blockNumber": "0x10",
                "logIndex": "0x2",
                "transactionHash": format!("0x{}", "ab".repeat(32)),
                "removed": false
            }]
        });
        let receipt: RpcReceipt = serde_json::from_value(json).unwrap();
        assert_eq!(receipt.gas_used, "0x5208");
        let log = receipt.logs.into_iter().next().unwrap().into_log().unwrap().unwrap();
        assert_eq!(log.block_number, 16);
        assert_eq!(log.log_index, 2);
        assert!(log.data.is_empty());
    }

    #[test]
    fn pending_logs_are_dropped() {
        let log: RpcLog = serde_json::from_value(json!({
            "address": format!("0x{}", "11".repeat(20)),
            "topics": [],
            "data": "0x",
            "blockNumber": null,
            "logIndex": null,
            "transactionHash": null
        }))
        .unwrap();
        assert_eq!(log.into_log().unwrap(), None);
    }
}
