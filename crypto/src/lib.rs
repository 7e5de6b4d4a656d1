//! Cryptographic primitives for certchain.
//!
//! - **Keccak-256** for content commitments, ABI selectors and transaction hashes
//! - **secp256k1 ECDSA** (RFC 6979, low-S) with public-key recovery
//! - Account address derivation from public keys

pub mod address;
pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::{address_from_verifying_key, to_checksum};
pub use error::CryptoError;
pub use hash::{hash_text, keccak256, keccak256_multi};
pub use keys::AdminKey;
pub use sign::{
    certificate_message, personal_message_hash, recover_signer, sign_certificate, sign_prehash,
    verify_certificate_signature,
};
