use criterion::{black_box, criterion_group, criterion_main, Criterion};

use certchain_crypto::{hash_text, keccak256, sign_certificate, verify_certificate_signature, AdminKey};

fn keccak_256b_bench(c: &mut Criterion) {
    let data = [0xABu8; 256];

    c.bench_function("keccak256_256B", |b| b.iter(|| keccak256(black_box(&data))));
}

fn sign_certificate_bench(c: &mut Criterion) {
    let key = AdminKey::from_slice(&[42u8; 32]).expect("valid key");
    let rh = hash_text("Alice");
    let ch = hash_text("Course A");

    c.bench_function("sign_certificate", |b| {
        b.iter(|| sign_certificate(&key, black_box("CERT-001"), &rh, &ch))
    });
}

fn recover_signer_bench(c: &mut Criterion) {
    let key = AdminKey::from_slice(&[42u8; 32]).expect("valid key");
    let rh = hash_text("Alice");
    let ch = hash_text("Course A");
    let sig = sign_certificate(&key, "CERT-001", &rh, &ch).expect("sign");

    c.bench_function("recover_certificate_signer", |b| {
        b.iter(|| verify_certificate_signature(black_box("CERT-001"), &rh, &ch, &sig))
    });
}

criterion_group!(
    benches,
    keccak_256b_bench,
    sign_certificate_bench,
    recover_signer_bench
);
criterion_main!(benches);
