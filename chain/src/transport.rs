//! The seam between the gateway and an Ethereum node.

use async_trait::async_trait;
use certchain_types::{Address, Digest, EventPosition, Timestamp, TxHash};

use crate::abi::{decode, ParamType, Token};
use crate::ChainError;

/// Selector of the standard `Error(string)` revert payload.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Digest>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: TxHash,
}

impl Log {
    pub fn position(&self) -> EventPosition {
        EventPosition::new(self.block_number, self.log_index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// `status == 1`.
    pub success: bool,
    pub gas_used: u64,
    pub logs: Vec<Log>,
}

/// An `eth_call` against the latest block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Vec<u8>,
}

/// An `eth_getLogs` query for one event topic of one contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topic: Digest,
    pub from_block: u64,
    pub to_block: u64,
}

/// The node operations the gateway relies on.
#[async_trait]
pub trait ChainTransport: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Fails with [`ChainError::NotFound`] for a block the node does not have.
    async fn block_timestamp(&self, number: u64) -> Result<Timestamp, ChainError>;

    async fn gas_price(&self) -> Result<u128, ChainError>;

    /// Transaction count of `address` including pending transactions.
    async fn pending_nonce(&self, address: &Address) -> Result<u64, ChainError>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError>;

    /// `None` while the transaction is pending or unknown.
    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, ChainError>;

    /// Execute a read-only call. A revert is reported as [`ChainError::Reverted`].
    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, ChainError>;

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError>;
}

/// Human-readable reason from revert data.
pub fn revert_reason(data: &[u8]) -> String {
    if data.is_empty() {
        return "execution reverted".to_string();
    }
    if data.len() > 4 && data[..4] == ERROR_STRING_SELECTOR {
        if let Ok(mut tokens) = decode(&[ParamType::String], &data[4..]) {
            if let Some(Token::String(reason)) = tokens.pop() {
                return reason;
            }
        }
    }
    format!("execution reverted (0x{})", hex::encode(data))
}

/// Revert data carrying `Error(reason)`.
pub fn encode_revert_reason(reason: &str) -> Vec<u8> {
    let mut out = ERROR_STRING_SELECTOR.to_vec();
    out.extend(crate::abi::encode(&[Token::String(reason.to_string())]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_string_reason_roundtrip() {
        let data = encode_revert_reason("Certificate already exists");
        assert_eq!(hex::encode(&data[..4]), "08c379a0");
        assert_eq!(revert_reason(&data), "Certificate already exists");
    }

    #[test]
    fn empty_and_custom_revert_data() {
        assert_eq!(revert_reason(&[]), "execution reverted");
        assert_eq!(
            revert_reason(&[0xde, 0xad, 0xbe, 0xef]),
            "execution reverted (0xdeadbeef)"
        );
    }
}
