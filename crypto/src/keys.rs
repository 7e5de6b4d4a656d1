//! The admin signing key.

use std::fmt;

use certchain_types::Address;
use k256::ecdsa::{SigningKey, VerifyingKey};
use zeroize::Zeroizing;

use crate::address::address_from_verifying_key;
use crate::CryptoError;

/// The admin account's secp256k1 key together with its derived address.
///
/// The inner `SigningKey` zeroizes its scalar on drop; this type
/// intentionally does not implement `Clone`, `Serialize` or a revealing
/// `Debug`.
pub struct AdminKey {
    signing: SigningKey,
    address: Address,
}

impl AdminKey {
    /// Parse a 32-byte private key from `0x`-prefixed or bare hex.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let trimmed = hex_key.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let raw = Zeroizing::new(
            hex::decode(trimmed).map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
        );
        Self::from_slice(&raw)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let signing =
            SigningKey::from_slice(bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let address = address_from_verifying_key(signing.verifying_key());
        Ok(Self { signing, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing.verifying_key()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing
    }
}

impl fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminKey")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
