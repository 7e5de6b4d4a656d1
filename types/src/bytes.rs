//! Fixed-width byte newtypes.
//!
//! Every type generated here has a `0x`-prefixed lowercase hex text form.
//! Human-readable serializers (JSON, TOML) see that hex string; binary
//! serializers (bincode, used by the LMDB backend) see raw bytes.

use serde::de::{self, Visitor};
use std::fmt;

use crate::TypesError;

/// Decode `0x`-prefixed or bare hex into exactly `N` bytes.
pub(crate) fn decode_fixed<const N: usize>(
    kind: &'static str,
    s: &str,
) -> Result<[u8; N], TypesError> {
    let trimmed = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let raw = hex::decode(trimmed).map_err(|e| TypesError::InvalidHex {
        kind,
        reason: e.to_string(),
    })?;
    let actual = raw.len();
    raw.try_into().map_err(|_| TypesError::InvalidLength {
        kind,
        expected: N,
        actual,
    })
}

pub(crate) struct FixedVisitor<const N: usize>(pub &'static str);

impl<'de, const N: usize> Visitor<'de> for FixedVisitor<N> {
    type Value = [u8; N];

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} bytes or a hex string", N)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        decode_fixed(self.0, v).map_err(E::custom)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        v.try_into()
            .map_err(|_| E::invalid_length(v.len(), &self))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut arr = [0u8; N];
        for (i, byte) in arr.iter_mut().enumerate() {
            *byte = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(arr)
    }
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Width in bytes.
            pub const LEN: usize = $len;

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Parse from `0x`-prefixed or bare hex.
            pub fn from_hex(s: &str) -> Result<Self, $crate::TypesError> {
                $crate::bytes::decode_fixed::<{ $len }>($kind, s).map(Self)
            }

            /// Build from a slice that must be exactly `LEN` bytes long.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, $crate::TypesError> {
                let arr: [u8; $len] =
                    bytes
                        .try_into()
                        .map_err(|_| $crate::TypesError::InvalidLength {
                            kind: $kind,
                            expected: $len,
                            actual: bytes.len(),
                        })?;
                Ok(Self(arr))
            }

            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::TypesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_hex())
                } else {
                    serializer.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let visitor = $crate::bytes::FixedVisitor::<{ $len }>($kind);
                let bytes = if deserializer.is_human_readable() {
                    deserializer.deserialize_str(visitor)?
                } else {
                    deserializer.deserialize_bytes(visitor)?
                };
                Ok(Self(bytes))
            }
        }
    };
}
