//! 20-byte EVM account addresses.

fixed_bytes!(
    /// A 20-byte account identifier (admin accounts, the contract address).
    ///
    /// Parsing accepts any hex case; display is lowercase with `0x`.
    Address,
    20,
    "address"
);

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_case_parses() {
        let addr: Address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap();
        assert_eq!(
            addr.to_string(),
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
        );
    }

    #[test]
    fn wrong_width_is_rejected() {
        assert!(Address::from_hex(&"ab".repeat(32)).is_err());
    }
}
