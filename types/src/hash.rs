//! 32-byte digests and transaction hashes.

fixed_bytes!(
    /// A 32-byte Keccak-256 digest, used for recipient and course commitments.
    Digest,
    32,
    "digest"
);

fixed_bytes!(
    /// A 32-byte transaction hash as reported by the chain.
    TxHash,
    32,
    "transaction hash"
);

impl Digest {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl TxHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_accepts_prefixed_and_bare() {
        let bare = "11".repeat(32);
        let a = Digest::from_hex(&bare).unwrap();
        let b = Digest::from_hex(&format!("0x{bare}")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex(), format!("0x{bare}"));
    }

    #[test]
    fn short_hex_is_rejected_with_length() {
        let err = Digest::from_hex("0xabcd").unwrap_err();
        assert_eq!(
            err,
            crate::TypesError::InvalidLength {
                kind: "digest",
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn non_hex_is_rejected() {
        assert!(matches!(
            TxHash::from_hex(&"zz".repeat(32)),
            Err(crate::TypesError::InvalidHex { .. })
        ));
    }

    #[test]
    fn json_uses_hex_and_bincode_uses_bytes() {
        let h = TxHash::new([7u8; 32]);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "07".repeat(32)));
        let back: TxHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);

        let bin = bincode::serialize(&h).unwrap();
        let back: TxHash = bincode::deserialize(&bin).unwrap();
        assert_eq!(back, h);
    }
}
