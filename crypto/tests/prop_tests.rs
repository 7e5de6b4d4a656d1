use proptest::prelude::*;

use certchain_crypto::{hash_text, sign_certificate, verify_certificate_signature, AdminKey};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Hashing is deterministic.
    #[test]
    fn hash_deterministic(s in ".*") {
        prop_assert_eq!(hash_text(&s), hash_text(&s));
    }

    /// Distinct inputs never collide in the tested space.
    #[test]
    fn hash_distinct(a in ".{0,64}", b in ".{0,64}") {
        prop_assume!(a != b);
        prop_assert_ne!(hash_text(&a), hash_text(&b));
    }

    /// Every signature recovers to the signing admin.
    #[test]
    fn signatures_recover(id in "[A-Za-z0-9-]{1,32}", recipient in ".{0,40}", course in ".{0,40}") {
        let key = AdminKey::from_slice(&[0x42; 32]).unwrap();
        let rh = hash_text(&recipient);
        let ch = hash_text(&course);
        let sig = sign_certificate(&key, &id, &rh, &ch).unwrap();
        prop_assert_eq!(verify_certificate_signature(&id, &rh, &ch, &sig).unwrap(), key.address());
    }
}
