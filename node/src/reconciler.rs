//! Applies ledger events and request-path results to the mirror, and
//! cross-checks the mirror against the chain on every read.
//!
//! The chain is authoritative. The mirror may lag, but it may never
//! contradict the chain on a field that is immutable once issued:
//! such a contradiction surfaces as [`ServiceError::DataIntegrity`] and is
//! never corrected automatically.

use std::sync::Arc;

use certchain_chain::{ChainError, ChainEvent, ChainGateway, EventPayload, OnChainCertificate};
use certchain_crypto::verify_certificate_signature;
use certchain_store::{
    AdminRecord, AdminStatus, AppliedEvent, CertificatePatch, CertificateRecord, Issuance,
    MergeOutcome, MirrorStore, StoreError,
};
use certchain_types::{
    Address, CertificateId, Digest, RecoverableSignature, Timestamp, TxHash,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::{MirrorMetrics, ServiceError};

/// A certificate as returned by a verification: chain-checked, with the
/// signer recovered from the stored signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerifiedCertificate {
    pub id: CertificateId,
    /// Plaintext recipient, only known when this node issued the certificate.
    pub recipient: Option<String>,
    pub course: Option<String>,
    pub recipient_hash: Digest,
    pub course_hash: Digest,
    pub issue_date: Timestamp,
    pub signature: RecoverableSignature,
    /// Address recovered from `signature`, `None` if recovery failed.
    pub signer: Option<Address>,
    pub revoked: bool,
    pub issue_tx_hash: Option<TxHash>,
    pub revoke_tx_hash: Option<TxHash>,
    /// `false` when the mirror has no issued record and the answer comes from
    /// the chain alone.
    pub mirror_synced: bool,
}

pub struct Reconciler {
    store: Arc<dyn MirrorStore>,
    gateway: Arc<ChainGateway>,
    metrics: Arc<MirrorMetrics>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        gateway: Arc<ChainGateway>,
        metrics: Arc<MirrorMetrics>,
    ) -> Self {
        Self {
            store,
            gateway,
            metrics,
        }
    }

    /// Apply one decoded ledger event. `block_time` is the timestamp of the
    /// event's block.
    pub fn apply_event(
        &self,
        event: &ChainEvent,
        block_time: Timestamp,
    ) -> Result<MergeOutcome, StoreError> {
        match &event.payload {
            EventPayload::Issued { .. } => self.apply_issued(event, block_time),
            EventPayload::Revoked { .. } => self.apply_revoked(event, block_time),
            EventPayload::AdminAdded { .. } | EventPayload::AdminRemoved { .. } => {
                self.apply_admin_change(event, block_time)
            }
        }
    }

    /// Merge issuance fields; never touches revocation.
    ///
    /// A conflicting issuance is logged and counted but still lands in the
    /// event feed, since the event did happen on chain.
    pub fn apply_issued(
        &self,
        event: &ChainEvent,
        block_time: Timestamp,
    ) -> Result<MergeOutcome, StoreError> {
        let EventPayload::Issued {
            id,
            recipient_hash,
            course_hash,
            issue_date,
            signature,
        } = &event.payload
        else {
            return Err(StoreError::MismatchedEvent {
                expected: "issue",
                actual: event.kind(),
            });
        };

        let patch = CertificatePatch::issued(Issuance {
            recipient_hash: *recipient_hash,
            course_hash: *course_hash,
            issue_date: *issue_date,
            signature: *signature,
            tx_hash: Some(event.tx_hash),
        });
        let outcome = self.store.update_certificate(id, &patch, block_time)?;
        if outcome == MergeOutcome::Conflict {
            self.metrics.merge_conflicts.inc();
            warn!(
                id = %id,
                position = %event.position,
                tx_hash = %event.tx_hash,
                "issue event contradicts mirrored commitment, mirror left untouched"
            );
        }
        self.record_feed_entry(event, block_time)?;
        Ok(outcome)
    }

    /// Mark a certificate revoked, creating a placeholder if its issue event
    /// has not been seen yet.
    pub fn apply_revoked(
        &self,
        event: &ChainEvent,
        block_time: Timestamp,
    ) -> Result<MergeOutcome, StoreError> {
        let EventPayload::Revoked { id } = &event.payload else {
            return Err(StoreError::MismatchedEvent {
                expected: "revoke",
                actual: event.kind(),
            });
        };
        let patch = CertificatePatch::revoked(Some(event.tx_hash));
        let outcome = self.store.update_certificate(id, &patch, block_time)?;
        self.record_feed_entry(event, block_time)?;
        Ok(outcome)
    }

    /// Position-guarded admin upsert.
    pub fn apply_admin_change(
        &self,
        event: &ChainEvent,
        block_time: Timestamp,
    ) -> Result<MergeOutcome, StoreError> {
        let (address, status) = match &event.payload {
            EventPayload::AdminAdded { admin } => (*admin, AdminStatus::Active),
            EventPayload::AdminRemoved { admin } => (*admin, AdminStatus::Removed),
            _ => {
                return Err(StoreError::MismatchedEvent {
                    expected: "admin",
                    actual: event.kind(),
                })
            }
        };
        let outcome = self.store.update_admin(&AdminRecord {
            address,
            status,
            last_tx_hash: event.tx_hash,
            updated_at: block_time,
            position: event.position,
        })?;
        self.record_feed_entry(event, block_time)?;
        Ok(outcome)
    }

    fn record_feed_entry(&self, event: &ChainEvent, block_time: Timestamp) -> Result<(), StoreError> {
        let fresh = self.store.record_event(&AppliedEvent {
            position: event.position,
            kind: event.kind(),
            subject: event.subject(),
            tx_hash: event.tx_hash,
            timestamp: block_time,
        })?;
        if !fresh {
            debug!(position = %event.position, "event already in feed");
        }
        Ok(())
    }

    /// Write-through after a successful issue transaction.
    pub fn record_issue(
        &self,
        id: &CertificateId,
        recipient: &str,
        course: &str,
        issuance: Issuance,
    ) -> Result<MergeOutcome, StoreError> {
        let patch =
            CertificatePatch::issued(issuance).with_plaintext(recipient.to_owned(), course.to_owned());
        let outcome = self.store.update_certificate(id, &patch, Timestamp::now())?;
        if outcome == MergeOutcome::Conflict {
            self.metrics.merge_conflicts.inc();
            warn!(id = %id, "issued certificate contradicts mirrored commitment");
        }
        Ok(outcome)
    }

    /// Write-through after a successful revoke transaction.
    pub fn record_revoke(
        &self,
        id: &CertificateId,
        tx_hash: TxHash,
    ) -> Result<MergeOutcome, StoreError> {
        self.store
            .update_certificate(id, &CertificatePatch::revoked(Some(tx_hash)), Timestamp::now())
    }

    /// Read the mirror and the chain for `id` and reconcile the two.
    pub async fn reconcile_on_read(
        &self,
        id: &CertificateId,
    ) -> Result<VerifiedCertificate, ServiceError> {
        let mirror = self.store.find_certificate(id)?;
        let chain = match self.gateway.verify(id).await {
            Ok(found) => Some(found),
            Err(ChainError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let result = reconcile(id, mirror, chain);
        if let Err(ServiceError::DataIntegrity { id, field }) = &result {
            self.metrics.integrity_failures.inc();
            error!(id = %id, field, "mirror and chain disagree");
        }
        result
    }
}

/// Combine a mirror record and the chain's view of the same certificate.
pub fn reconcile(
    id: &CertificateId,
    mirror: Option<CertificateRecord>,
    chain: Option<OnChainCertificate>,
) -> Result<VerifiedCertificate, ServiceError> {
    let integrity = |field: &'static str| ServiceError::DataIntegrity {
        id: id.clone(),
        field,
    };

    if let Some(onchain) = &chain {
        if onchain.id != id.as_str() {
            return Err(integrity("id"));
        }
    }

    match (mirror, chain) {
        (Some(record), Some(onchain)) if record.is_issued() => {
            let Some(issuance) = record.issuance else {
                return Err(integrity("issuance"));
            };
            if issuance.recipient_hash != onchain.recipient_hash {
                return Err(integrity("recipient_hash"));
            }
            if issuance.course_hash != onchain.course_hash {
                return Err(integrity("course_hash"));
            }
            if issuance.signature != onchain.signature {
                return Err(integrity("signature"));
            }
            if record.revoked && onchain.revoked == Some(false) {
                return Err(integrity("revoked"));
            }
            if onchain.revoked == Some(true) && !record.revoked {
                warn!(id = %id, "chain reports a revocation the mirror has not seen");
            }
            Ok(VerifiedCertificate {
                signer: recover(id, &onchain),
                id: record.id,
                recipient: record.recipient,
                course: record.course,
                recipient_hash: onchain.recipient_hash,
                course_hash: onchain.course_hash,
                issue_date: onchain.issue_date,
                signature: onchain.signature,
                revoked: record.revoked || onchain.revoked == Some(true),
                issue_tx_hash: issuance.tx_hash,
                revoke_tx_hash: record.revoke_tx_hash,
                mirror_synced: true,
            })
        }
        (Some(record), None) if record.is_issued() => Err(integrity("existence")),
        (placeholder, Some(onchain)) => {
            let (mirror_revoked, revoke_tx_hash) = placeholder
                .map(|r| (r.revoked, r.revoke_tx_hash))
                .unwrap_or((false, None));
            Ok(VerifiedCertificate {
                signer: recover(id, &onchain),
                id: id.clone(),
                recipient: None,
                course: None,
                recipient_hash: onchain.recipient_hash,
                course_hash: onchain.course_hash,
                issue_date: onchain.issue_date,
                signature: onchain.signature,
                revoked: mirror_revoked || onchain.revoked == Some(true),
                issue_tx_hash: None,
                revoke_tx_hash,
                mirror_synced: false,
            })
        }
        (_, None) => Err(ServiceError::NotFound(format!("certificate {id}"))),
    }
}

fn recover(id: &CertificateId, onchain: &OnChainCertificate) -> Option<Address> {
    match verify_certificate_signature(
        id.as_str(),
        &onchain.recipient_hash,
        &onchain.course_hash,
        &onchain.signature,
    ) {
        Ok(signer) => Some(signer),
        Err(e) => {
            warn!(id = %id, error = %e, "could not recover certificate signer");
            None
        }
    }
}
