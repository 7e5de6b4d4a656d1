//! Certificate records and their merge rules.

use certchain_types::{CertificateId, Digest, RecoverableSignature, Timestamp, TxHash};
use serde::{Deserialize, Serialize};

use crate::{MergeOutcome, StoreError};

/// The on-chain commitment of an issued certificate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuance {
    pub recipient_hash: Digest,
    pub course_hash: Digest,
    /// Block time of the issuing transaction.
    pub issue_date: Timestamp,
    pub signature: RecoverableSignature,
    pub tx_hash: Option<TxHash>,
}

impl Issuance {
    /// Whether two issuances commit to the same certificate content.
    pub fn same_commitment(&self, other: &Issuance) -> bool {
        self.recipient_hash == other.recipient_hash
            && self.course_hash == other.course_hash
            && self.signature == other.signature
    }
}

/// A mirrored certificate.
///
/// `issuance` is `None` for a placeholder created by a revocation that
/// arrived before its issue event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub id: CertificateId,
    pub recipient: Option<String>,
    pub course: Option<String>,
    pub issuance: Option<Issuance>,
    pub revoked: bool,
    pub revoke_tx_hash: Option<TxHash>,
    pub updated_at: Timestamp,
}

/// A partial update. Only `Some` fields are applied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertificatePatch {
    pub recipient: Option<String>,
    pub course: Option<String>,
    pub issuance: Option<Issuance>,
    /// `Some(true)` revokes. `Some(false)` never clears an existing revocation.
    pub revoked: Option<bool>,
    pub revoke_tx_hash: Option<TxHash>,
}

impl CertificatePatch {
    pub fn issued(issuance: Issuance) -> Self {
        Self {
            issuance: Some(issuance),
            ..Default::default()
        }
    }

    pub fn revoked(tx_hash: Option<TxHash>) -> Self {
        Self {
            revoked: Some(true),
            revoke_tx_hash: tx_hash,
            ..Default::default()
        }
    }

    pub fn with_plaintext(mut self, recipient: String, course: String) -> Self {
        self.recipient = Some(recipient);
        self.course = Some(course);
        self
    }
}

impl CertificateRecord {
    /// An empty record for `id`, the starting point for an upsert.
    pub fn empty(id: CertificateId, now: Timestamp) -> Self {
        Self {
            id,
            recipient: None,
            course: None,
            issuance: None,
            revoked: false,
            revoke_tx_hash: None,
            updated_at: now,
        }
    }

    /// Whether the issue side of this certificate has been mirrored.
    pub fn is_issued(&self) -> bool {
        self.issuance.is_some()
    }

    /// Merge `patch` into this record.
    ///
    /// Stored content commitments are immutable: an issuance whose hashes or
    /// signature differ from the stored one is a conflict and leaves the
    /// record untouched. Revocation is monotonic.
    pub fn apply(&mut self, patch: &CertificatePatch, now: Timestamp) -> MergeOutcome {
        if let (Some(existing), Some(incoming)) = (&self.issuance, &patch.issuance) {
            if !existing.same_commitment(incoming) {
                return MergeOutcome::Conflict;
            }
        }

        let before = self.clone();

        if let Some(recipient) = &patch.recipient {
            self.recipient = Some(recipient.clone());
        }
        if let Some(course) = &patch.course {
            self.course = Some(course.clone());
        }
        if let Some(incoming) = &patch.issuance {
            match &mut self.issuance {
                Some(existing) => {
                    if existing.tx_hash.is_none() {
                        existing.tx_hash = incoming.tx_hash;
                    }
                    if existing.issue_date == Timestamp::EPOCH {
                        existing.issue_date = incoming.issue_date;
                    }
                }
                None => self.issuance = Some(incoming.clone()),
            }
        }
        if patch.revoked == Some(true) {
            self.revoked = true;
        }
        if self.revoked && self.revoke_tx_hash.is_none() {
            self.revoke_tx_hash = patch.revoke_tx_hash;
        }

        if *self == before {
            MergeOutcome::Unchanged
        } else {
            self.updated_at = now;
            MergeOutcome::Updated
        }
    }
}

/// Keyed access to mirrored certificates.
pub trait CertificateStore {
    /// Insert a new record. Fails with [`StoreError::Duplicate`] if the id exists.
    fn insert_certificate(&self, record: &CertificateRecord) -> Result<(), StoreError>;

    /// Atomically merge `patch` into the record for `id`, creating it if absent.
    ///
    /// Idempotent: applying the same patch twice yields `Unchanged` the second time.
    fn update_certificate(
        &self,
        id: &CertificateId,
        patch: &CertificatePatch,
        now: Timestamp,
    ) -> Result<MergeOutcome, StoreError>;

    /// Unconditionally overwrite a record. Reserved for manual reconciliation.
    fn replace_certificate(&self, record: &CertificateRecord) -> Result<(), StoreError>;

    fn find_certificate(&self, id: &CertificateId) -> Result<Option<CertificateRecord>, StoreError>;

    fn find_all_certificates(&self) -> Result<Vec<CertificateRecord>, StoreError>;

    fn certificate_count(&self) -> Result<u64, StoreError> {
        self.find_all_certificates().map(|v| v.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_types::RecoverableSignature;

    fn id() -> CertificateId {
        CertificateId::new("C1").unwrap()
    }

    fn issuance(byte: u8) -> Issuance {
        Issuance {
            recipient_hash: Digest::new([byte; 32]),
            course_hash: Digest::new([byte.wrapping_add(1); 32]),
            issue_date: Timestamp::new(1_700_000_000),
            signature: RecoverableSignature::new([byte; 65]),
            tx_hash: Some(TxHash::new([9; 32])),
        }
    }

    #[test]
    fn same_patch_twice_is_unchanged() {
        let mut rec = CertificateRecord::empty(id(), Timestamp::new(1));
        let patch = CertificatePatch::issued(issuance(1));
        assert_eq!(rec.apply(&patch, Timestamp::new(2)), MergeOutcome::Updated);
        let snapshot = rec.clone();
        assert_eq!(rec.apply(&patch, Timestamp::new(3)), MergeOutcome::Unchanged);
        assert_eq!(rec, snapshot);
    }

    #[test]
    fn revoke_then_issue_keeps_revoked() {
        let mut rec = CertificateRecord::empty(id(), Timestamp::new(1));
        rec.apply(&CertificatePatch::revoked(Some(TxHash::new([5; 32]))), Timestamp::new(2));
        rec.apply(&CertificatePatch::issued(issuance(1)), Timestamp::new(3));
        assert!(rec.revoked);
        assert!(rec.is_issued());
        assert_eq!(rec.revoke_tx_hash, Some(TxHash::new([5; 32])));
    }

    #[test]
    fn revocation_is_monotonic() {
        let mut rec = CertificateRecord::empty(id(), Timestamp::new(1));
        rec.apply(&CertificatePatch::revoked(None), Timestamp::new(2));
        let patch = CertificatePatch {
            revoked: Some(false),
            ..Default::default()
        };
        assert_eq!(rec.apply(&patch, Timestamp::new(3)), MergeOutcome::Unchanged);
        assert!(rec.revoked);
    }

    #[test]
    fn conflicting_issuance_is_rejected() {
        let mut rec = CertificateRecord::empty(id(), Timestamp::new(1));
        rec.apply(&CertificatePatch::issued(issuance(1)), Timestamp::new(2));
        let before = rec.clone();
        let outcome = rec.apply(&CertificatePatch::issued(issuance(7)), Timestamp::new(3));
        assert_eq!(outcome, MergeOutcome::Conflict);
        assert_eq!(rec, before);
    }

    #[test]
    fn missing_tx_hash_is_filled() {
        let mut rec = CertificateRecord::empty(id(), Timestamp::new(1));
        let mut without = issuance(1);
        without.tx_hash = None;
        rec.apply(&CertificatePatch::issued(without), Timestamp::new(2));
        rec.apply(&CertificatePatch::issued(issuance(1)), Timestamp::new(3));
        assert_eq!(rec.issuance.unwrap().tx_hash, Some(TxHash::new([9; 32])));
    }
}
