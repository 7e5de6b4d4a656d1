//! Parse and validation errors for the value types.

use thiserror::Error;

/// Errors raised while parsing or validating a value type.
///
/// Every variant describes malformed caller input; none is retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("invalid hex for {kind}: {reason}")]
    InvalidHex { kind: &'static str, reason: String },

    #[error("invalid length for {kind}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid certificate id: {0}")]
    InvalidCertificateId(String),

    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),
}
