//! LMDB implementation of EventLogStore.
//!
//! Keys are big-endian `(block_number, log_index)` so that LMDB's byte order
//! is the ledger's order and `list_events` is a plain forward scan.

use certchain_store::{AppliedEvent, EventLogStore, StoreError};

use crate::{LmdbEnvironment, LmdbError};

impl EventLogStore for LmdbEnvironment {
    fn record_event(&self, event: &AppliedEvent) -> Result<bool, StoreError> {
        let key = event.position.to_key();
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;
        if self
            .events_db
            .get(&wtxn, &key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Ok(false);
        }
        let value = bincode::serialize(event).map_err(LmdbError::from)?;
        self.events_db
            .put(&mut wtxn, &key, &value)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(true)
    }

    fn list_events(&self, offset: usize, limit: usize) -> Result<Vec<AppliedEvent>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        let iter = self.events_db.iter(&rtxn).map_err(LmdbError::from)?;
        let mut result = Vec::with_capacity(limit.min(1024));
        for entry in iter.skip(offset).take(limit) {
            let (_, value) = entry.map_err(LmdbError::from)?;
            result.push(bincode::deserialize(value).map_err(LmdbError::from)?);
        }
        Ok(result)
    }

    fn event_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        Ok(self.events_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}
