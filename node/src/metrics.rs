//! Prometheus metrics for the certchain node.
//!
//! Covers the event poller, the reconciler's merge outcomes and the
//! request path's transaction submissions. [`MirrorMetrics`] owns a
//! dedicated [`Registry`] that the HTTP `/metrics` endpoint encodes into
//! the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter,
    IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

pub struct MirrorMetrics {
    pub registry: Registry,

    // ── Poller ──────────────────────────────────────────────────────────
    /// Completed poll cycles.
    pub poll_cycles: IntCounter,
    /// Failed range scans, by event kind.
    pub poll_errors: IntCounterVec,
    /// Events applied to the mirror, by event kind.
    pub events_applied: IntCounterVec,
    /// Next block to scan, by event kind.
    pub cursor_block: IntGaugeVec,
    /// Last observed (confirmation-adjusted) chain head.
    pub chain_head: IntGauge,

    // ── Reconciler ──────────────────────────────────────────────────────
    /// Issue events whose content contradicted the mirror.
    pub merge_conflicts: IntCounter,
    /// Verifications that found mirror and chain disagreeing.
    pub integrity_failures: IntCounter,
    /// Mirrored certificates.
    pub certificate_count: IntGauge,

    // ── Request path ────────────────────────────────────────────────────
    /// Transactions that reached a receipt, by operation.
    pub transactions_submitted: IntCounterVec,
    /// Transactions that reverted, failed or timed out, by operation.
    pub transactions_failed: IntCounterVec,
    /// Time from submission to receipt, in milliseconds.
    pub submit_latency_ms: Histogram,
}

impl MirrorMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let poll_cycles = register_int_counter_with_registry!(
            Opts::new("certchain_poll_cycles_total", "Completed poll cycles"),
            registry
        )
        .expect("failed to register poll_cycles counter");

        let poll_errors = register_int_counter_vec_with_registry!(
            Opts::new("certchain_poll_errors_total", "Failed event range scans"),
            &["kind"],
            registry
        )
        .expect("failed to register poll_errors counter");

        let events_applied = register_int_counter_vec_with_registry!(
            Opts::new(
                "certchain_events_applied_total",
                "Ledger events applied to the mirror"
            ),
            &["kind"],
            registry
        )
        .expect("failed to register events_applied counter");

        let cursor_block = register_int_gauge_vec_with_registry!(
            Opts::new("certchain_cursor_block", "Next block the poller will scan"),
            &["kind"],
            registry
        )
        .expect("failed to register cursor_block gauge");

        let chain_head = register_int_gauge_with_registry!(
            Opts::new("certchain_chain_head", "Confirmed chain head seen by the poller"),
            registry
        )
        .expect("failed to register chain_head gauge");

        let merge_conflicts = register_int_counter_with_registry!(
            Opts::new(
                "certchain_merge_conflicts_total",
                "Issue events contradicting the mirrored commitment"
            ),
            registry
        )
        .expect("failed to register merge_conflicts counter");

        let integrity_failures = register_int_counter_with_registry!(
            Opts::new(
                "certchain_integrity_failures_total",
                "Verifications where mirror and chain disagreed"
            ),
            registry
        )
        .expect("failed to register integrity_failures counter");

        let certificate_count = register_int_gauge_with_registry!(
            Opts::new("certchain_certificate_count", "Certificates in the mirror"),
            registry
        )
        .expect("failed to register certificate_count gauge");

        let transactions_submitted = register_int_counter_vec_with_registry!(
            Opts::new(
                "certchain_transactions_submitted_total",
                "Transactions mined successfully"
            ),
            &["operation"],
            registry
        )
        .expect("failed to register transactions_submitted counter");

        let transactions_failed = register_int_counter_vec_with_registry!(
            Opts::new(
                "certchain_transactions_failed_total",
                "Transactions that reverted, failed or timed out"
            ),
            &["operation"],
            registry
        )
        .expect("failed to register transactions_failed counter");

        let submit_latency_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "certchain_submit_latency_ms",
                "Submission to receipt latency in milliseconds"
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 15_000.0, 30_000.0,
                60_000.0, 120_000.0,
            ]),
            registry
        )
        .expect("failed to register submit_latency_ms histogram");

        Self {
            registry,
            poll_cycles,
            poll_errors,
            events_applied,
            cursor_block,
            chain_head,
            merge_conflicts,
            integrity_failures,
            certificate_count,
            transactions_submitted,
            transactions_failed,
            submit_latency_ms,
        }
    }

    /// Encode every metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for MirrorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
