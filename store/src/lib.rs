//! Mirror store records and abstract storage traits.
//!
//! The mirror is an off-chain cache of certificate and admin state. Every
//! storage backend (LMDB, in-memory for testing) implements these traits;
//! the rest of the codebase depends only on the traits.
//!
//! Merge rules live on the record types so that every backend applies the
//! exact same semantics inside its own atomic read-modify-write.

pub mod admin;
pub mod certificate;
pub mod cursor;
pub mod error;
pub mod event_log;
pub mod meta;

pub use admin::{AdminRecord, AdminStatus, AdminStore};
pub use certificate::{CertificatePatch, CertificateRecord, CertificateStore, Issuance};
pub use cursor::CursorStore;
pub use error::StoreError;
pub use event_log::{AppliedEvent, EventLogStore};
pub use meta::MetaStore;

/// Result of applying a patch or upsert to a stored record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No record existed; one was created.
    Created,
    /// The stored record changed.
    Updated,
    /// The patch was already reflected; nothing was written.
    Unchanged,
    /// The patch contradicts immutable stored fields; nothing was written.
    Conflict,
}

impl MergeOutcome {
    pub fn wrote(&self) -> bool {
        matches!(self, MergeOutcome::Created | MergeOutcome::Updated)
    }
}

/// Everything the reconciler and request path need from a mirror backend.
pub trait MirrorStore:
    CertificateStore + AdminStore + EventLogStore + CursorStore + Send + Sync
{
}

impl<T> MirrorStore for T where
    T: CertificateStore + AdminStore + EventLogStore + CursorStore + Send + Sync
{
}
