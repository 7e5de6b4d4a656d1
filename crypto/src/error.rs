use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("malformed signature: {0}")]
    InvalidSignature(String),

    #[error("public key recovery failed: {0}")]
    Recovery(String),
}
