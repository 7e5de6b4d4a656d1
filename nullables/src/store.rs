//! Nullable mirror store backed by mutex-guarded maps.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use certchain_store::{
    AdminRecord, AdminStore, AppliedEvent, CertificatePatch, CertificateRecord, CertificateStore,
    CursorStore, EventLogStore, MergeOutcome, MetaStore, StoreError,
};
use certchain_types::{Address, CertificateId, EventKind, EventPosition, Timestamp};

#[derive(Default)]
struct MirrorState {
    certificates: BTreeMap<CertificateId, CertificateRecord>,
    admins: BTreeMap<Address, AdminRecord>,
    events: BTreeMap<EventPosition, AppliedEvent>,
    cursors: HashMap<EventKind, u64>,
    meta: HashMap<String, Vec<u8>>,
}

/// An in-memory mirror store for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Default)]
pub struct NullMirrorStore {
    state: Mutex<MirrorState>,
    failing_writes: AtomicU32,
}

impl NullMirrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` record writes fail with a backend error.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), StoreError> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(StoreError::Backend("injected write failure".into())),
            Err(_) => Ok(()),
        }
    }
}

impl CertificateStore for NullMirrorStore {
    fn insert_certificate(&self, record: &CertificateRecord) -> Result<(), StoreError> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        if state.certificates.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id.to_string()));
        }
        state.certificates.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn update_certificate(
        &self,
        id: &CertificateId,
        patch: &CertificatePatch,
        now: Timestamp,
    ) -> Result<MergeOutcome, StoreError> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        let created = !state.certificates.contains_key(id);
        let mut record = state
            .certificates
            .get(id)
            .cloned()
            .unwrap_or_else(|| CertificateRecord::empty(id.clone(), now));
        let outcome = match record.apply(patch, now) {
            MergeOutcome::Updated if created => MergeOutcome::Created,
            other => other,
        };
        if outcome.wrote() {
            state.certificates.insert(id.clone(), record);
        }
        Ok(outcome)
    }

    fn replace_certificate(&self, record: &CertificateRecord) -> Result<(), StoreError> {
        self.check_write()?;
        self.state
            .lock()
            .unwrap()
            .certificates
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn find_certificate(&self, id: &CertificateId) -> Result<Option<CertificateRecord>, StoreError> {
        Ok(self.state.lock().unwrap().certificates.get(id).cloned())
    }

    fn find_all_certificates(&self) -> Result<Vec<CertificateRecord>, StoreError> {
        Ok(self.state.lock().unwrap().certificates.values().cloned().collect())
    }

    fn certificate_count(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().unwrap().certificates.len() as u64)
    }
}

impl AdminStore for NullMirrorStore {
    fn update_admin(&self, record: &AdminRecord) -> Result<MergeOutcome, StoreError> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        let outcome = AdminRecord::merge_outcome(state.admins.get(&record.address), record);
        if outcome.wrote() {
            state.admins.insert(record.address, record.clone());
        }
        Ok(outcome)
    }

    fn find_admin(&self, address: &Address) -> Result<Option<AdminRecord>, StoreError> {
        Ok(self.state.lock().unwrap().admins.get(address).cloned())
    }

    fn find_all_admins(&self) -> Result<Vec<AdminRecord>, StoreError> {
        Ok(self.state.lock().unwrap().admins.values().cloned().collect())
    }
}

impl EventLogStore for NullMirrorStore {
    fn record_event(&self, event: &AppliedEvent) -> Result<bool, StoreError> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        if state.events.contains_key(&event.position) {
            return Ok(false);
        }
        state.events.insert(event.position, event.clone());
        Ok(true)
    }

    fn list_events(&self, offset: usize, limit: usize) -> Result<Vec<AppliedEvent>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn event_count(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().unwrap().events.len() as u64)
    }
}

impl CursorStore for NullMirrorStore {
    fn get_cursor(&self, kind: EventKind) -> Result<Option<u64>, StoreError> {
        Ok(self.state.lock().unwrap().cursors.get(&kind).copied())
    }

    fn put_cursor(&self, kind: EventKind, next_block: u64) -> Result<(), StoreError> {
        self.state.lock().unwrap().cursors.insert(kind, next_block);
        Ok(())
    }
}

impl MetaStore for NullMirrorStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.state
            .lock()
            .unwrap()
            .meta
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.state.lock().unwrap().meta.get(key).cloned())
    }

    fn delete_meta(&self, key: &str) -> Result<(), StoreError> {
        self.state.lock().unwrap().meta.remove(key);
        Ok(())
    }

    fn get_schema_version(&self) -> Result<u32, StoreError> {
        Ok(0)
    }

    fn set_schema_version(&self, _version: u32) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_store::Issuance;
    use certchain_types::{Digest, RecoverableSignature, TxHash};

    #[test]
    fn injected_failures_are_consumed() {
        let store = NullMirrorStore::new();
        let id: CertificateId = "CERT-1".parse().unwrap();
        store.fail_next_writes(1);
        let patch = CertificatePatch::revoked(None);
        assert!(store.update_certificate(&id, &patch, Timestamp::new(1)).is_err());
        assert_eq!(
            store.update_certificate(&id, &patch, Timestamp::new(1)).unwrap(),
            MergeOutcome::Created
        );
    }

    #[test]
    fn conflicting_issue_is_not_written() {
        let store = NullMirrorStore::new();
        let id: CertificateId = "CERT-2".parse().unwrap();
        let issuance = |b: u8| Issuance {
            recipient_hash: Digest::new([b; 32]),
            course_hash: Digest::new([b; 32]),
            issue_date: Timestamp::new(9),
            signature: RecoverableSignature::new([b; 65]),
            tx_hash: Some(TxHash::new([b; 32])),
        };
        store
            .update_certificate(&id, &CertificatePatch::issued(issuance(1)), Timestamp::new(1))
            .unwrap();
        assert_eq!(
            store
                .update_certificate(&id, &CertificatePatch::issued(issuance(2)), Timestamp::new(2))
                .unwrap(),
            MergeOutcome::Conflict
        );
        let stored = store.find_certificate(&id).unwrap().unwrap();
        assert_eq!(stored.issuance, Some(issuance(1)));
    }
}
