use proptest::prelude::*;

use certchain_types::{Address, Digest, EventPosition, RecoverableSignature, TxHash};

proptest! {
    /// Digest hex text form parses back to the same bytes.
    #[test]
    fn digest_hex_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let d = Digest::new(bytes);
        prop_assert_eq!(Digest::from_hex(&d.to_hex()).unwrap(), d);
    }

    /// TxHash::is_zero is true only for all-zero bytes.
    #[test]
    fn tx_hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        prop_assert_eq!(TxHash::new(bytes).is_zero(), bytes == [0u8; 32]);
    }

    /// Signatures survive bincode, the LMDB value encoding.
    #[test]
    fn signature_bincode_roundtrip(head in prop::array::uniform32(0u8..), tail in prop::array::uniform32(0u8..), v in 27u8..=28) {
        let mut raw = [0u8; 65];
        raw[..32].copy_from_slice(&head);
        raw[32..64].copy_from_slice(&tail);
        raw[64] = v;
        let sig = RecoverableSignature::new(raw);
        let encoded = bincode::serialize(&sig).unwrap();
        let decoded: RecoverableSignature = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, sig);
        prop_assert_eq!(decoded.v(), v);
    }

    /// Storage keys sort exactly like positions.
    #[test]
    fn position_key_order_matches(a in (0u64..1_000_000, 0u64..512), b in (0u64..1_000_000, 0u64..512)) {
        let pa = EventPosition::new(a.0, a.1);
        let pb = EventPosition::new(b.0, b.1);
        prop_assert_eq!(pa.cmp(&pb), pa.to_key().cmp(&pb.to_key()));
        prop_assert_eq!(EventPosition::from_key(&pa.to_key()), Some(pa));
    }

    /// Any 20 bytes render as a parseable address.
    #[test]
    fn address_display_parses(bytes in prop::collection::vec(any::<u8>(), 20)) {
        let addr = Address::from_slice(&bytes).unwrap();
        prop_assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);
    }
}
