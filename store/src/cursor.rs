//! Persisted poller positions.

use certchain_types::EventKind;

use crate::StoreError;

/// Per event kind, the next block the poller has yet to scan.
///
/// Persisting this is what lets the poller resume after a restart without
/// reprocessing settled history or missing events emitted while offline.
pub trait CursorStore {
    fn get_cursor(&self, kind: EventKind) -> Result<Option<u64>, StoreError>;

    fn put_cursor(&self, kind: EventKind, next_block: u64) -> Result<(), StoreError>;
}
