//! Pre-built [`tracing::Span`] constructors for common node operations.
//!
//! Consistent span names and field sets make it easy to filter and
//! correlate a certificate's lifecycle across the request path and the
//! poller.

use certchain_types::EventKind;
use tracing::{info_span, Span};

/// Span covering one full poll cycle over every event kind.
pub fn poll_cycle_span(head: u64) -> Span {
    info_span!("poll_cycle", head)
}

/// Span covering the scan of one block range for one event kind.
pub fn poll_range_span(kind: EventKind, from: u64, to: u64) -> Span {
    info_span!("poll_range", kind = %kind, from, to)
}

/// Span covering a state-changing request (issue, revoke, admin change).
pub fn submit_span(operation: &'static str, subject: &str) -> Span {
    info_span!("submit", operation, subject = %subject)
}

/// Span covering a verification read.
pub fn verify_span(id: &str) -> Span {
    info_span!("verify", id = %id)
}
