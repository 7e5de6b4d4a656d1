//! Keccak-256 hashing.

use certchain_types::Digest;
use sha3::{Digest as _, Keccak256};

/// Compute the Keccak-256 hash of arbitrary data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn keccak256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// Commitment to a UTF-8 string, as stored on chain for recipients and courses.
pub fn hash_text(text: &str) -> Digest {
    Digest::new(keccak256(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_known_answer() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn hello_known_answer() {
        assert_eq!(
            hex::encode(keccak256(b"hello")),
            "1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn multi_equivalent() {
        assert_eq!(keccak256(b"helloworld"), keccak256_multi(&[b"hello", b"world"]));
    }

    #[test]
    fn text_hash_is_deterministic() {
        assert_eq!(hash_text("Alice"), hash_text("Alice"));
        assert_ne!(hash_text("Alice"), hash_text("alice"));
    }
}
