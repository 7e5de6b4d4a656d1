//! Ledger event kinds and their total order.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// The four lifecycle events emitted by the certificate contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    CertificateIssued,
    CertificateRevoked,
    AdminAdded,
    AdminRemoved,
}

impl EventKind {
    /// All kinds, in the order the poller scans them each cycle.
    pub const ALL: [EventKind; 4] = [
        EventKind::CertificateIssued,
        EventKind::CertificateRevoked,
        EventKind::AdminAdded,
        EventKind::AdminRemoved,
    ];

    /// The event name as declared in the contract ABI.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CertificateIssued => "CertificateIssued",
            EventKind::CertificateRevoked => "CertificateRevoked",
            EventKind::AdminAdded => "AdminAdded",
            EventKind::AdminRemoved => "AdminRemoved",
        }
    }

    /// Stable single-byte tag, used in storage keys.
    pub fn tag(&self) -> u8 {
        match self {
            EventKind::CertificateIssued => 0,
            EventKind::CertificateRevoked => 1,
            EventKind::AdminAdded => 2,
            EventKind::AdminRemoved => 3,
        }
    }

    pub fn is_admin_event(&self) -> bool {
        matches!(self, EventKind::AdminAdded | EventKind::AdminRemoved)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TypesError::UnknownEventKind(s.to_string()))
    }
}

/// Where an event sits in the chain's append-only log.
///
/// Ordered by block number, then by log index within the block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl EventPosition {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }

    /// Big-endian key whose byte order matches the position order.
    pub fn to_key(&self) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&self.block_number.to_be_bytes());
        key[8..].copy_from_slice(&self.log_index.to_be_bytes());
        key
    }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        let block: [u8; 8] = key.get(..8)?.try_into().ok()?;
        let index: [u8; 8] = key.get(8..16)?.try_into().ok()?;
        Some(Self::new(u64::from_be_bytes(block), u64::from_be_bytes(index)))
    }
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}
