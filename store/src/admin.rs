//! Admin records.

use certchain_types::{Address, EventPosition, Timestamp, TxHash};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{MergeOutcome, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminStatus {
    Active,
    Removed,
}

impl fmt::Display for AdminStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminStatus::Active => f.write_str("active"),
            AdminStatus::Removed => f.write_str("removed"),
        }
    }
}

/// Mirrored admin authorization state, keyed by address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRecord {
    pub address: Address,
    pub status: AdminStatus,
    pub last_tx_hash: TxHash,
    /// Block time of the event that produced this state.
    pub updated_at: Timestamp,
    /// Log position of that event. Later positions win.
    pub position: EventPosition,
}

impl AdminRecord {
    /// Decide how `incoming` affects `existing`.
    ///
    /// Events are applied in log-position order per address no matter in
    /// which order they are delivered: an older or equal position never
    /// overwrites a newer one.
    pub fn merge_outcome(existing: Option<&AdminRecord>, incoming: &AdminRecord) -> MergeOutcome {
        match existing {
            None => MergeOutcome::Created,
            Some(current) if incoming.position > current.position => MergeOutcome::Updated,
            Some(_) => MergeOutcome::Unchanged,
        }
    }
}

/// Keyed access to mirrored admins.
pub trait AdminStore {
    /// Position-guarded upsert (see [`AdminRecord::merge_outcome`]).
    fn update_admin(&self, record: &AdminRecord) -> Result<MergeOutcome, StoreError>;

    fn find_admin(&self, address: &Address) -> Result<Option<AdminRecord>, StoreError>;

    fn find_all_admins(&self) -> Result<Vec<AdminRecord>, StoreError>;
}
