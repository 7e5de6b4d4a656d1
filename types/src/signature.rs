//! 65-byte recoverable ECDSA signatures.

fixed_bytes!(
    /// A secp256k1 signature in `r ‖ s ‖ v` layout, with `v ∈ {27, 28}`.
    RecoverableSignature,
    65,
    "signature"
);

impl RecoverableSignature {
    /// The 64-byte `r ‖ s` part.
    pub fn rs(&self) -> &[u8] {
        &self.0[..64]
    }

    /// The recovery byte as stored (27 or 28 for well-formed signatures).
    pub fn v(&self) -> u8 {
        self.0[64]
    }
}
