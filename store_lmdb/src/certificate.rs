//! LMDB implementation of CertificateStore.

use certchain_crypto::keccak256;
use certchain_store::{CertificatePatch, CertificateRecord, CertificateStore, MergeOutcome, StoreError};
use certchain_types::{CertificateId, Timestamp};

use crate::{LmdbEnvironment, LmdbError};

/// Ids up to this many bytes are stored under their own bytes. LMDB caps
/// keys at 511 bytes, so longer ids are keyed by their hash.
const INLINE_KEY_LIMIT: usize = 256;

/// Prefix of hashed keys. No UTF-8 string starts with 0xFF, so hashed and
/// inline keys never collide.
const HASHED_KEY_PREFIX: u8 = 0xFF;

fn certificate_key(id: &CertificateId) -> Vec<u8> {
    let raw = id.as_str().as_bytes();
    if raw.len() <= INLINE_KEY_LIMIT {
        return raw.to_vec();
    }
    let mut key = Vec::with_capacity(33);
    key.push(HASHED_KEY_PREFIX);
    key.extend_from_slice(&keccak256(raw));
    key
}

fn decode(bytes: &[u8]) -> Result<CertificateRecord, LmdbError> {
    Ok(bincode::deserialize(bytes)?)
}

impl CertificateStore for LmdbEnvironment {
    fn insert_certificate(&self, record: &CertificateRecord) -> Result<(), StoreError> {
        let key = certificate_key(&record.id);
        let value = bincode::serialize(record).map_err(LmdbError::from)?;
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;
        if self
            .certificates_db
            .get(&wtxn, key.as_slice())
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(record.id.to_string()));
        }
        self.certificates_db
            .put(&mut wtxn, key.as_slice(), &value)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn update_certificate(
        &self,
        id: &CertificateId,
        patch: &CertificatePatch,
        now: Timestamp,
    ) -> Result<MergeOutcome, StoreError> {
        let key = certificate_key(id);
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;
        let existing = self
            .certificates_db
            .get(&wtxn, key.as_slice())
            .map_err(LmdbError::from)?
            .map(decode)
            .transpose()?;

        let (mut record, created) = match existing {
            Some(record) => (record, false),
            None => (CertificateRecord::empty(id.clone(), now), true),
        };

        let outcome = match record.apply(patch, now) {
            MergeOutcome::Updated if created => MergeOutcome::Created,
            other => other,
        };
        if !outcome.wrote() {
            // Dropping the write txn aborts it.
            return Ok(outcome);
        }

        let value = bincode::serialize(&record).map_err(LmdbError::from)?;
        self.certificates_db
            .put(&mut wtxn, key.as_slice(), &value)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(outcome)
    }

    fn replace_certificate(&self, record: &CertificateRecord) -> Result<(), StoreError> {
        let value = bincode::serialize(record).map_err(LmdbError::from)?;
        let mut wtxn = self.env().write_txn().map_err(LmdbError::from)?;
        self.certificates_db
            .put(&mut wtxn, certificate_key(&record.id).as_slice(), &value)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn find_certificate(&self, id: &CertificateId) -> Result<Option<CertificateRecord>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        let record = self
            .certificates_db
            .get(&rtxn, certificate_key(id).as_slice())
            .map_err(LmdbError::from)?
            .map(decode)
            .transpose()?;
        Ok(record)
    }

    fn find_all_certificates(&self) -> Result<Vec<CertificateRecord>, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        let iter = self.certificates_db.iter(&rtxn).map_err(LmdbError::from)?;
        let mut result = Vec::new();
        for entry in iter {
            let (_, value) = entry.map_err(LmdbError::from)?;
            result.push(decode(value)?);
        }
        Ok(result)
    }

    fn certificate_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env().read_txn().map_err(LmdbError::from)?;
        Ok(self.certificates_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}
