//! Recoverable ECDSA signing of certificate commitments.
//!
//! A certificate signature commits to `(id, recipient_hash, course_hash)`:
//!
//! 1. `message = keccak256(id ‖ recipient_hash ‖ course_hash)` (Solidity
//!    packed encoding of `string, bytes32, bytes32`)
//! 2. `digest = keccak256("\x19Ethereum Signed Message:\n32" ‖ message)`
//! 3. `signature = r ‖ s ‖ v` over `digest`, low-S, `v = 27 + recovery_id`
//!
//! This matches what wallet `personal_sign` produces, so signatures can be
//! checked by any standard tooling and by the contract itself.

use certchain_types::{Address, Digest, RecoverableSignature};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use crate::address::address_from_verifying_key;
use crate::hash::{keccak256, keccak256_multi};
use crate::{AdminKey, CryptoError};

const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// The packed commitment to a certificate's identifying fields.
pub fn certificate_message(id: &str, recipient_hash: &Digest, course_hash: &Digest) -> [u8; 32] {
    keccak256_multi(&[id.as_bytes(), recipient_hash.as_bytes(), course_hash.as_bytes()])
}

/// Wrap a 32-byte message in the human-readable signed-message envelope.
pub fn personal_message_hash(message: &[u8; 32]) -> [u8; 32] {
    keccak256_multi(&[PERSONAL_MESSAGE_PREFIX, message])
}

/// Sign a 32-byte prehash, returning the low-S signature and its recovery id.
pub fn sign_prehash(
    key: &AdminKey,
    prehash: &[u8; 32],
) -> Result<(Signature, RecoveryId), CryptoError> {
    let (signature, recovery_id) = key
        .signing_key()
        .sign_prehash_recoverable(prehash)
        .map_err(|e| CryptoError::Signing(e.to_string()))?;
    // A high-S signature negates s, which flips the parity of R's y.
    match signature.normalize_s() {
        Some(low) => Ok((
            low,
            RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
        )),
        None => Ok((signature, recovery_id)),
    }
}

/// Sign `(id, recipient_hash, course_hash)` with the admin key.
pub fn sign_certificate(
    key: &AdminKey,
    id: &str,
    recipient_hash: &Digest,
    course_hash: &Digest,
) -> Result<RecoverableSignature, CryptoError> {
    let message = certificate_message(id, recipient_hash, course_hash);
    let digest = personal_message_hash(&message);
    let (signature, recovery_id) = sign_prehash(key, &digest)?;

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = 27 + recovery_id.to_byte();
    Ok(RecoverableSignature::new(out))
}

/// Recover the address that produced `signature` over `prehash`.
pub fn recover_signer(
    prehash: &[u8; 32],
    signature: &RecoverableSignature,
) -> Result<Address, CryptoError> {
    let v = signature.v();
    let recovery_byte = match v {
        27 | 28 => v - 27,
        0 | 1 => v,
        other => {
            return Err(CryptoError::InvalidSignature(format!(
                "recovery byte {other} out of range"
            )))
        }
    };
    let recovery_id = RecoveryId::from_byte(recovery_byte)
        .ok_or_else(|| CryptoError::InvalidSignature(format!("recovery byte {v}")))?;
    let sig = Signature::from_slice(signature.rs())
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let key = VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id)
        .map_err(|e| CryptoError::Recovery(e.to_string()))?;
    Ok(address_from_verifying_key(&key))
}

/// Recover the signer of a certificate signature.
pub fn verify_certificate_signature(
    id: &str,
    recipient_hash: &Digest,
    course_hash: &Digest,
    signature: &RecoverableSignature,
) -> Result<Address, CryptoError> {
    let message = certificate_message(id, recipient_hash, course_hash);
    recover_signer(&personal_message_hash(&message), signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_text;

    fn test_key() -> AdminKey {
        AdminKey::from_hex("0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318")
            .unwrap()
    }

    #[test]
    fn sign_and_recover() {
        let key = test_key();
        let rh = hash_text("Alice");
        let ch = hash_text("Course A");
        let sig = sign_certificate(&key, "C1", &rh, &ch).unwrap();
        assert!(sig.v() == 27 || sig.v() == 28);
        let signer = verify_certificate_signature("C1", &rh, &ch, &sig).unwrap();
        assert_eq!(signer, key.address());
    }

    #[test]
    fn signature_is_deterministic() {
        let key = test_key();
        let rh = hash_text("Alice");
        let ch = hash_text("Course A");
        let a = sign_certificate(&key, "C1", &rh, &ch).unwrap();
        let b = sign_certificate(&key, "C1", &rh, &ch).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tampered_fields_recover_another_signer() {
        let key = test_key();
        let rh = hash_text("Alice");
        let ch = hash_text("Course A");
        let sig = sign_certificate(&key, "C1", &rh, &ch).unwrap();
        let forged = hash_text("Mallory");
        match verify_certificate_signature("C1", &forged, &ch, &sig) {
            Ok(addr) => assert_ne!(addr, key.address()),
            Err(_) => {}
        }
    }

    #[test]
    fn s_is_low() {
        let key = test_key();
        for i in 0..16 {
            let id = format!("C{i}");
            let sig = sign_certificate(&key, &id, &hash_text("r"), &hash_text("c")).unwrap();
            let parsed = Signature::from_slice(sig.rs()).unwrap();
            assert!(parsed.normalize_s().is_none());
        }
    }

    #[test]
    fn bad_recovery_byte_rejected() {
        let mut raw = [1u8; 65];
        raw[64] = 99;
        let sig = RecoverableSignature::new(raw);
        assert!(matches!(
            recover_signer(&[0u8; 32], &sig),
            Err(CryptoError::InvalidSignature(_))
        ));
    }
}
