//! Recursive Length Prefix encoding, as far as legacy transactions need it.

/// An RLP item: a byte string or a list of items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RlpItem {
    Bytes(Vec<u8>),
    List(Vec<RlpItem>),
}

impl RlpItem {
    /// An unsigned integer as its minimal big-endian byte string (zero is empty).
    pub fn uint(value: u128) -> Self {
        let bytes = value.to_be_bytes();
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        RlpItem::Bytes(bytes[first..].to_vec())
    }

    /// A big-endian integer given as bytes, with leading zeros stripped.
    pub fn uint_bytes(bytes: &[u8]) -> Self {
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        RlpItem::Bytes(bytes[first..].to_vec())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        RlpItem::Bytes(bytes.into())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            RlpItem::Bytes(bytes) if bytes.len() == 1 && bytes[0] < 0x80 => out.push(bytes[0]),
            RlpItem::Bytes(bytes) => {
                encode_length(bytes.len(), 0x80, out);
                out.extend_from_slice(bytes);
            }
            RlpItem::List(items) => {
                let mut payload = Vec::new();
                for item in items {
                    item.encode_into(&mut payload);
                }
                encode_length(payload.len(), 0xc0, out);
                out.extend(payload);
            }
        }
    }
}

fn encode_length(len: usize, offset: u8, out: &mut Vec<u8>) {
    if len < 56 {
        out.push(offset + len as u8);
    } else {
        let be = (len as u64).to_be_bytes();
        let first = be.iter().position(|b| *b != 0).unwrap_or(be.len() - 1);
        let len_bytes = &be[first..];
        out.push(offset + 55 + len_bytes.len() as u8);
        out.extend_from_slice(len_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_hex(item: &RlpItem) -> String {
        hex::encode(item.encode())
    }

    #[test]
    fn canonical_vectors() {
        assert_eq!(encoded_hex(&RlpItem::bytes(b"dog".to_vec())), "83646f67");
        assert_eq!(encoded_hex(&RlpItem::bytes(Vec::new())), "80");
        assert_eq!(encoded_hex(&RlpItem::List(vec![])), "c0");
        assert_eq!(encoded_hex(&RlpItem::uint(0)), "80");
        assert_eq!(encoded_hex(&RlpItem::uint(15)), "0f");
        assert_eq!(encoded_hex(&RlpItem::uint(1024)), "820400");
        assert_eq!(
            encoded_hex(&RlpItem::List(vec![
                RlpItem::bytes(b"cat".to_vec()),
                RlpItem::bytes(b"dog".to_vec())
            ])),
            "c88363617483646f67"
        );
    }

    #[test]
    fn long_string_uses_length_of_length() {
        let text = b"Lorem ipsum dolor sit amet, consectetur adipisicing elit".to_vec();
        let encoded = RlpItem::bytes(text.clone()).encode();
        assert_eq!(&encoded[..2], &[0xb8, 0x38]);
        assert_eq!(&encoded[2..], &text[..]);
    }

    #[test]
    fn nested_empty_lists() {
        // [ [], [[]], [ [], [[]] ] ]
        let empty = || RlpItem::List(vec![]);
        let item = RlpItem::List(vec![
            empty(),
            RlpItem::List(vec![empty()]),
            RlpItem::List(vec![empty(), RlpItem::List(vec![empty()])]),
        ]);
        assert_eq!(encoded_hex(&item), "c7c0c1c0c3c0c1c0");
    }

    #[test]
    fn leading_zeros_are_stripped() {
        assert_eq!(RlpItem::uint_bytes(&[0, 0, 1, 2]), RlpItem::bytes(vec![1, 2]));
        assert_eq!(RlpItem::uint_bytes(&[0, 0]), RlpItem::bytes(Vec::new()));
    }
}
