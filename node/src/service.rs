//! The certificate service: the operations the HTTP surface exposes.
//!
//! Issue and revoke write through to the mirror as soon as the receipt is
//! in; the poller later replays the same change from the event log, which
//! the merge rules turn into a no-op. Admin changes reach the mirror only
//! through the poller.

use std::sync::Arc;
use std::time::Instant;

use certchain_chain::{ChainError, ChainGateway, Receipt, TransactionStatus};
use certchain_crypto::hash_text;
use certchain_store::{
    AdminRecord, AppliedEvent, CertificateRecord, Issuance, MirrorStore,
};
use certchain_types::{Address, CertificateId, Digest, RecoverableSignature, Timestamp, TxHash};
use serde::Serialize;
use tracing::{error, info, warn, Instrument};

use crate::tracing_spans::{submit_span, verify_span};
use crate::{MirrorMetrics, Reconciler, ServiceError, VerifiedCertificate};

/// Result of a successful issue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IssueOutcome {
    pub id: CertificateId,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub recipient_hash: Digest,
    pub course_hash: Digest,
    pub signature: RecoverableSignature,
}

pub struct CertificateService {
    gateway: Arc<ChainGateway>,
    store: Arc<dyn MirrorStore>,
    reconciler: Arc<Reconciler>,
    metrics: Arc<MirrorMetrics>,
}

impl CertificateService {
    pub fn new(
        gateway: Arc<ChainGateway>,
        store: Arc<dyn MirrorStore>,
        reconciler: Arc<Reconciler>,
        metrics: Arc<MirrorMetrics>,
    ) -> Self {
        Self {
            gateway,
            store,
            reconciler,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<MirrorMetrics> {
        &self.metrics
    }

    /// Issue a certificate on chain and mirror it with its plaintext fields.
    pub async fn issue(
        &self,
        id: &str,
        recipient: &str,
        course: &str,
    ) -> Result<IssueOutcome, ServiceError> {
        let id = CertificateId::new(id)?;
        if recipient.trim().is_empty() {
            return Err(ServiceError::InvalidInput("recipient is required".into()));
        }
        if course.trim().is_empty() {
            return Err(ServiceError::InvalidInput("course is required".into()));
        }
        let span = submit_span("issue", id.as_str());
        self.issue_inner(id, recipient, course).instrument(span).await
    }

    async fn issue_inner(
        &self,
        id: CertificateId,
        recipient: &str,
        course: &str,
    ) -> Result<IssueOutcome, ServiceError> {
        if self
            .store
            .find_certificate(&id)?
            .is_some_and(|r| r.is_issued())
        {
            return Err(ServiceError::DuplicateId(id));
        }
        if self.exists_on_chain(&id).await? {
            return Err(ServiceError::DuplicateId(id));
        }

        let recipient_hash = hash_text(recipient);
        let course_hash = hash_text(course);
        let signature = self
            .gateway
            .sign(&id, &recipient_hash.to_hex(), &course_hash.to_hex())?;

        let started = Instant::now();
        let result = self
            .gateway
            .issue_certificate(&id, &recipient_hash, &course_hash, &signature)
            .await;
        let receipt = match self.track("issue", started, result) {
            Ok(receipt) => receipt,
            Err(ChainError::TransactionFailed { tx_hash, reason }) => {
                // Another issuer may have won the race for this id.
                if self.exists_on_chain(&id).await.unwrap_or(false) {
                    return Err(ServiceError::DuplicateId(id));
                }
                return Err(ServiceError::TransactionFailed { tx_hash, reason });
            }
            Err(e) => return Err(e.into()),
        };

        let issue_date = match self.gateway.block_timestamp(receipt.block_number).await {
            Ok(ts) => ts,
            Err(e) => {
                warn!(block = receipt.block_number, error = %e, "issue date left for the poller");
                Timestamp::EPOCH
            }
        };
        let issuance = Issuance {
            recipient_hash,
            course_hash,
            issue_date,
            signature,
            tx_hash: Some(receipt.tx_hash),
        };
        // The chain already holds the certificate; a mirror failure here is
        // repaired by the poller, minus the plaintext fields.
        if let Err(e) = self.reconciler.record_issue(&id, recipient, course, issuance) {
            error!(id = %id, tx_hash = %receipt.tx_hash, error = %e, "mirror write-through failed");
        }

        info!(id = %id, tx_hash = %receipt.tx_hash, block = receipt.block_number, "certificate issued");
        Ok(IssueOutcome {
            id,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            recipient_hash,
            course_hash,
            signature,
        })
    }

    /// Revoke a certificate on chain and mark it revoked in the mirror.
    pub async fn revoke(&self, id: &str) -> Result<TxHash, ServiceError> {
        let id = CertificateId::lookup(id)?;
        let span = submit_span("revoke", id.as_str());
        async {
            let started = Instant::now();
            let result = self.gateway.revoke_certificate(&id).await;
            let receipt = match self.track("revoke", started, result) {
                Ok(receipt) => receipt,
                Err(ChainError::TransactionFailed { tx_hash, reason }) => {
                    if !self.exists_on_chain(&id).await.unwrap_or(true) {
                        return Err(ServiceError::NotFound(format!("certificate {id}")));
                    }
                    return Err(ServiceError::TransactionFailed { tx_hash, reason });
                }
                Err(e) => return Err(e.into()),
            };
            if let Err(e) = self.reconciler.record_revoke(&id, receipt.tx_hash) {
                error!(id = %id, tx_hash = %receipt.tx_hash, error = %e, "mirror write-through failed");
            }
            info!(id = %id, tx_hash = %receipt.tx_hash, "certificate revoked");
            Ok::<_, ServiceError>(receipt.tx_hash)
        }
        .instrument(span)
        .await
    }

    /// Verify a certificate against the chain, reconciling with the mirror.
    pub async fn verify(&self, id: &str) -> Result<VerifiedCertificate, ServiceError> {
        let id = CertificateId::lookup(id)?;
        let span = verify_span(id.as_str());
        self.reconciler.reconcile_on_read(&id).instrument(span).await
    }

    /// The applied-event feed in log order.
    pub fn list_events(&self, offset: usize, limit: usize) -> Result<Vec<AppliedEvent>, ServiceError> {
        Ok(self.store.list_events(offset, limit)?)
    }

    pub fn event_count(&self) -> Result<u64, ServiceError> {
        Ok(self.store.event_count()?)
    }

    pub fn list_certificates(&self) -> Result<Vec<CertificateRecord>, ServiceError> {
        Ok(self.store.find_all_certificates()?)
    }

    pub fn list_admins(&self) -> Result<Vec<AdminRecord>, ServiceError> {
        Ok(self.store.find_all_admins()?)
    }

    pub async fn add_admin(&self, address: &Address) -> Result<TxHash, ServiceError> {
        let span = submit_span("add_admin", &address.to_string());
        async {
            let started = Instant::now();
            let result = self.gateway.add_admin(address).await;
            let receipt = self.track("add_admin", started, result)?;
            info!(admin = %address, tx_hash = %receipt.tx_hash, "admin added");
            Ok::<_, ServiceError>(receipt.tx_hash)
        }
        .instrument(span)
        .await
    }

    pub async fn remove_admin(&self, address: &Address) -> Result<TxHash, ServiceError> {
        let span = submit_span("remove_admin", &address.to_string());
        async {
            let started = Instant::now();
            let result = self.gateway.remove_admin(address).await;
            let receipt = self.track("remove_admin", started, result)?;
            info!(admin = %address, tx_hash = %receipt.tx_hash, "admin removed");
            Ok::<_, ServiceError>(receipt.tx_hash)
        }
        .instrument(span)
        .await
    }

    /// Look up a transaction, typically one that previously timed out.
    pub async fn transaction_status(&self, tx_hash: &TxHash) -> Result<TransactionStatus, ServiceError> {
        Ok(self.gateway.transaction_status(tx_hash).await?)
    }

    /// Overwrite the mirror record for `id` with the chain's state.
    ///
    /// Plaintext fields survive only if they still hash to the chain's
    /// commitments.
    pub async fn repair_from_chain(&self, id: &str) -> Result<CertificateRecord, ServiceError> {
        let id = CertificateId::lookup(id)?;
        let onchain = self.gateway.verify(&id).await?;
        let existing = self.store.find_certificate(&id)?;

        let mut record = CertificateRecord::empty(id.clone(), Timestamp::now());
        let mut issue_tx_hash = None;
        if let Some(old) = existing {
            if old.recipient.as_deref().map(hash_text) == Some(onchain.recipient_hash) {
                record.recipient = old.recipient;
            }
            if old.course.as_deref().map(hash_text) == Some(onchain.course_hash) {
                record.course = old.course;
            }
            issue_tx_hash = old.issuance.and_then(|i| i.tx_hash);
            record.revoked = old.revoked;
            record.revoke_tx_hash = old.revoke_tx_hash;
        }
        if let Some(revoked) = onchain.revoked {
            record.revoked = revoked;
            if !revoked {
                record.revoke_tx_hash = None;
            }
        }
        record.issuance = Some(Issuance {
            recipient_hash: onchain.recipient_hash,
            course_hash: onchain.course_hash,
            issue_date: onchain.issue_date,
            signature: onchain.signature,
            tx_hash: issue_tx_hash,
        });

        self.store.replace_certificate(&record)?;
        warn!(id = %id, "mirror record replaced from chain");
        Ok(record)
    }

    async fn exists_on_chain(&self, id: &CertificateId) -> Result<bool, ServiceError> {
        match self.gateway.verify(id).await {
            Ok(_) => Ok(true),
            Err(ChainError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn track(
        &self,
        operation: &str,
        started: Instant,
        result: Result<Receipt, ChainError>,
    ) -> Result<Receipt, ChainError> {
        match &result {
            Ok(_) => {
                self.metrics
                    .submit_latency_ms
                    .observe(started.elapsed().as_secs_f64() * 1_000.0);
                self.metrics
                    .transactions_submitted
                    .with_label_values(&[operation])
                    .inc();
            }
            Err(e) => {
                self.metrics
                    .transactions_failed
                    .with_label_values(&[operation])
                    .inc();
                warn!(operation, error = %e, "transaction did not succeed");
            }
        }
        result
    }
}
