#![no_main]

use arbitrary::Arbitrary;
use certchain_crypto::verify_certificate_signature;
use certchain_types::{Digest, RecoverableSignature};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    id: String,
    recipient_hash: [u8; 32],
    course_hash: [u8; 32],
    signature: [u8; 65],
}

// Chain-returned signatures are attacker controlled; recovery must not panic.
fuzz_target!(|input: Input| {
    let _ = verify_certificate_signature(
        &input.id,
        &Digest::new(input.recipient_hash),
        &Digest::new(input.course_hash),
        &RecoverableSignature::new(input.signature),
    );
});
