use certchain_chain::ChainError;
use certchain_crypto::CryptoError;
use certchain_store::StoreError;
use certchain_types::{CertificateId, TxHash};
use thiserror::Error;

/// Startup and configuration failures.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("key error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a certificate service operation.
///
/// Every variant maps to exactly one HTTP status in the RPC layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The chain node could not be reached or answered with an RPC error.
    #[error("network error: {0}")]
    Network(String),

    /// The transaction was rejected in simulation (`tx_hash` is `None`) or
    /// mined with a failed status.
    #[error("transaction failed: {reason}")]
    TransactionFailed {
        tx_hash: Option<TxHash>,
        reason: String,
    },

    /// No receipt arrived in time. The transaction may still be mined.
    #[error("transaction {tx_hash} not mined in time")]
    TransactionTimeout { tx_hash: TxHash },

    #[error("certificate {0} already exists")]
    DuplicateId(CertificateId),

    #[error("not found: {0}")]
    NotFound(String),

    /// Mirror and chain disagree on a field that is immutable once issued.
    #[error("mirror and chain disagree on {field} of certificate {id}")]
    DataIntegrity {
        id: CertificateId,
        field: &'static str,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The chain answered with something this node cannot interpret.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether the same request may succeed if simply retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Network(_))
    }
}

impl From<ChainError> for ServiceError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::Network(msg) => ServiceError::Network(msg),
            ChainError::Rpc { code, message } => {
                ServiceError::Network(format!("rpc error {code}: {message}"))
            }
            ChainError::Reverted { reason } => ServiceError::TransactionFailed {
                tx_hash: None,
                reason,
            },
            ChainError::TransactionFailed { tx_hash, reason } => {
                ServiceError::TransactionFailed { tx_hash, reason }
            }
            ChainError::TransactionTimeout { tx_hash } => {
                ServiceError::TransactionTimeout { tx_hash }
            }
            ChainError::NotFound(what) => ServiceError::NotFound(what),
            ChainError::InvalidInput(msg) => ServiceError::InvalidInput(msg),
            other @ (ChainError::Decode(_) | ChainError::Abi(_) | ChainError::Crypto(_)) => {
                ServiceError::Internal(other.to_string())
            }
        }
    }
}

impl From<certchain_types::TypesError> for ServiceError {
    fn from(e: certchain_types::TypesError) -> Self {
        ServiceError::InvalidInput(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_failures_are_retryable() {
        let rpc: ServiceError = ChainError::Rpc {
            code: -32000,
            message: "busy".into(),
        }
        .into();
        assert!(rpc.is_retryable());

        let reverted: ServiceError = ChainError::Reverted {
            reason: "Certificate already exists".into(),
        }
        .into();
        assert!(!reverted.is_retryable());
        assert!(matches!(
            reverted,
            ServiceError::TransactionFailed { tx_hash: None, .. }
        ));
    }

    #[test]
    fn timeout_keeps_tx_hash() {
        let hash = TxHash::new([3; 32]);
        let err: ServiceError = ChainError::TransactionTimeout { tx_hash: hash }.into();
        match err {
            ServiceError::TransactionTimeout { tx_hash } => assert_eq!(tx_hash, hash),
            other => panic!("unexpected {other:?}"),
        }
    }
}
