//! The applied-event feed.

use certchain_types::{EventKind, EventPosition, Timestamp, TxHash};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// One ledger event the reconciler has applied to the mirror.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEvent {
    pub position: EventPosition,
    pub kind: EventKind,
    /// Certificate id or admin address, as text.
    pub subject: String,
    pub tx_hash: TxHash,
    /// Block time of the event.
    pub timestamp: Timestamp,
}

/// Append-only feed keyed by log position.
pub trait EventLogStore {
    /// Record `event` under its position. Returns `false` if the position
    /// was already recorded (the entry is left as is).
    fn record_event(&self, event: &AppliedEvent) -> Result<bool, StoreError>;

    /// Events in position order, skipping `offset` and returning at most `limit`.
    fn list_events(&self, offset: usize, limit: usize) -> Result<Vec<AppliedEvent>, StoreError>;

    fn event_count(&self) -> Result<u64, StoreError>;
}
