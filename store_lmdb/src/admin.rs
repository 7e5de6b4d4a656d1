//! LMDB implementation of AdminStore.

use certchain_store::{AdminRecord, AdminStore, MergeOutcome, StoreError};
use certchain_types::Address;

use crate::{LmdbEnvironment, LmdbError};

impl AdminStore for LmdbEnvironment {
    fn update_admin(&self, record: &AdminRecord) -> Result<MergeOutcome, StoreError> {
        let key = record.address.as_bytes();
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;
        let existing: Option<AdminRecord> = match self.admins_db.get(&wtxn, key).map_err(LmdbError::from)? {
            Some(bytes) => Some(bincode::deserialize(bytes).map_err(LmdbError::from)?),
            None => None,
        };

        let outcome = AdminRecord::merge_outcome(existing.as_ref(), record);
        if outcome.wrote() {
            let value = bincode::serialize(record).map_err(LmdbError::from)?;
            self.admins_db
                .put(&mut wtxn, key, &value)
                .map_err(LmdbError::from)?;
            wtxn.commit().map_err(LmdbError::from)?;
        }
        Ok(outcome)
    }

    fn find_admin(&self, address: &Address) -> Result<Option<AdminRecord>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        match self
            .admins_db
            .get(&rtxn, address.as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes).map_err(LmdbError::from)?)),
            None => Ok(None),
        }
    }

    fn find_all_admins(&self) -> Result<Vec<AdminRecord>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        let iter = self.admins_db.iter(&rtxn).map_err(LmdbError::from)?;
        let mut result = Vec::new();
        for entry in iter {
            let (_, value) = entry.map_err(LmdbError::from)?;
            result.push(bincode::deserialize(value).map_err(LmdbError::from)?);
        }
        Ok(result)
    }
}
