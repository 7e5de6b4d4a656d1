#![no_main]

use certchain_store::{AdminRecord, AppliedEvent, CertificateRecord};
use libfuzzer_sys::fuzz_target;

// A corrupted mirror database must surface as a decode error, never a panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(record) = bincode::deserialize::<CertificateRecord>(data) {
        let encoded = bincode::serialize(&record).expect("decoded record re-encodes");
        let again: CertificateRecord = bincode::deserialize(&encoded).expect("re-encoded record decodes");
        assert_eq!(again, record);
    }

    let _ = bincode::deserialize::<AdminRecord>(data);
    let _ = bincode::deserialize::<AppliedEvent>(data);

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<CertificateRecord>(text);
        let _ = serde_json::from_str::<AdminRecord>(text);
    }
});
