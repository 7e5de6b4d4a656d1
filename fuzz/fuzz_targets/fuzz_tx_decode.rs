#![no_main]

use certchain_chain::decode_signed;
use certchain_crypto::keccak256;
use libfuzzer_sys::fuzz_target;

// Raw transactions reach the in-memory ledger as arbitrary bytes.
fuzz_target!(|data: &[u8]| {
    if let Ok(tx) = decode_signed(data) {
        assert_eq!(tx.hash.as_bytes(), &keccak256(data));
    }
});
