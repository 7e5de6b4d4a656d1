use certchain_crypto::CryptoError;
use certchain_types::TxHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// The node could not be reached or returned garbage at the HTTP level.
    #[error("network error: {0}")]
    Network(String),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// A read-only call or simulation reverted.
    #[error("execution reverted: {reason}")]
    Reverted { reason: String },

    /// The transaction was rejected before broadcast or mined with status 0.
    #[error("transaction failed: {reason}")]
    TransactionFailed {
        tx_hash: Option<TxHash>,
        reason: String,
    },

    /// Broadcast succeeded but no receipt arrived in time. The outcome is
    /// unknown until the hash is looked up again.
    #[error("transaction {tx_hash} not mined within the timeout")]
    TransactionTimeout { tx_hash: TxHash },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("abi error: {0}")]
    Abi(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl ChainError {
    /// Transport-level failures that may succeed if simply tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Network(_) | ChainError::Rpc { .. })
    }
}
