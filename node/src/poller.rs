//! The event poller: scans the registry's logs and feeds them to the
//! reconciler, one event kind at a time.
//!
//! Delivery is at-least-once. A kind's cursor only moves past a block range
//! once every event in it has been applied, so a failure anywhere in the
//! range replays the whole range next cycle, which the reconciler's merge
//! rules make harmless.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use certchain_chain::{ChainError, ChainGateway};
use certchain_store::{MirrorStore, StoreError};
use certchain_types::{EventKind, Timestamp};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn, Instrument};

use crate::config::StartBlock;
use crate::tracing_spans::{poll_cycle_span, poll_range_span};
use crate::{MirrorMetrics, Reconciler};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub confirmations: u64,
    pub max_block_range: u64,
    pub start_block: StartBlock,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            confirmations: 0,
            max_block_range: 5_000,
            start_block: StartBlock::Latest,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PollerPhase {
    Idle = 0,
    Polling = 1,
    Applying = 2,
}

impl PollerPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PollerPhase::Polling,
            2 => PollerPhase::Applying,
            _ => PollerPhase::Idle,
        }
    }
}

#[derive(Debug, Error)]
enum PollError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one cycle did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Confirmation-adjusted head, `None` if it could not be fetched.
    pub head: Option<u64>,
    /// Events applied, summed over kinds.
    pub applied: usize,
    /// Kinds whose range scan failed this cycle.
    pub failed: Vec<EventKind>,
    /// Set when shutdown interrupted the cycle between kinds.
    pub interrupted: bool,
}

pub struct EventPoller {
    gateway: Arc<ChainGateway>,
    store: Arc<dyn MirrorStore>,
    reconciler: Arc<Reconciler>,
    metrics: Arc<MirrorMetrics>,
    config: PollerConfig,
    phase: AtomicU8,
}

impl EventPoller {
    pub fn new(
        gateway: Arc<ChainGateway>,
        store: Arc<dyn MirrorStore>,
        reconciler: Arc<Reconciler>,
        metrics: Arc<MirrorMetrics>,
        config: PollerConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            reconciler,
            metrics,
            config,
            phase: AtomicU8::new(PollerPhase::Idle as u8),
        }
    }

    pub fn phase(&self) -> PollerPhase {
        PollerPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: PollerPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Poll until `shutdown` fires. Never returns an error; failures are
    /// logged and retried on the next cycle.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            confirmations = self.config.confirmations,
            "event poller started"
        );
        loop {
            let report = self.cycle(Some(&mut shutdown)).await;
            if report.interrupted {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.recv() => break,
            }
        }
        self.set_phase(PollerPhase::Idle);
        info!("event poller stopped");
    }

    /// Run exactly one cycle over every event kind.
    pub async fn poll_once(&self) -> PollReport {
        self.cycle(None).await
    }

    async fn cycle(&self, mut shutdown: Option<&mut broadcast::Receiver<()>>) -> PollReport {
        let mut report = PollReport::default();
        let head = match self.gateway.head().await {
            Ok(head) => head.saturating_sub(self.config.confirmations),
            Err(e) => {
                warn!(error = %e, "could not fetch chain head, skipping cycle");
                for kind in EventKind::ALL {
                    self.metrics.poll_errors.with_label_values(&[kind.as_str()]).inc();
                }
                report.failed = EventKind::ALL.to_vec();
                return report;
            }
        };
        report.head = Some(head);
        self.metrics.chain_head.set(gauge_value(head));

        let mut block_times = HashMap::new();
        async {
            for kind in EventKind::ALL {
                if let Some(rx) = shutdown.as_deref_mut() {
                    if shutdown_requested(rx) {
                        report.interrupted = true;
                        break;
                    }
                }
                match self.poll_kind(kind, head, &mut block_times).await {
                    Ok(applied) => report.applied += applied,
                    Err(e) => {
                        self.set_phase(PollerPhase::Idle);
                        self.metrics.poll_errors.with_label_values(&[kind.as_str()]).inc();
                        warn!(kind = %kind, error = %e, "poll failed, cursor not advanced");
                        report.failed.push(kind);
                    }
                }
            }
        }
        .instrument(poll_cycle_span(head))
        .await;

        self.metrics.poll_cycles.inc();
        if let Ok(count) = self.store.certificate_count() {
            self.metrics
                .certificate_count
                .set(gauge_value(count));
        }
        report
    }

    /// Scan one range for `kind` and advance its cursor past it.
    async fn poll_kind(
        &self,
        kind: EventKind,
        head: u64,
        block_times: &mut HashMap<u64, Timestamp>,
    ) -> Result<usize, PollError> {
        let from = self.cursor(kind, head)?;
        if from > head {
            return Ok(0);
        }
        let to = head.min(from.saturating_add(self.config.max_block_range.max(1) - 1));

        async {
            self.set_phase(PollerPhase::Polling);
            let events = self.gateway.events(kind, from, to).await?;

            self.set_phase(PollerPhase::Applying);
            for event in &events {
                let block = event.position.block_number;
                let block_time = match block_times.get(&block) {
                    Some(ts) => *ts,
                    None => {
                        let ts = self.gateway.block_timestamp(block).await?;
                        block_times.insert(block, ts);
                        ts
                    }
                };
                let outcome = self.reconciler.apply_event(event, block_time)?;
                debug!(position = %event.position, subject = %event.subject(), ?outcome, "applied");
            }

            let next = to + 1;
            self.store.put_cursor(kind, next)?;
            self.metrics
                .cursor_block
                .with_label_values(&[kind.as_str()])
                .set(gauge_value(next));
            self.metrics
                .events_applied
                .with_label_values(&[kind.as_str()])
                .inc_by(events.len() as u64);
            self.set_phase(PollerPhase::Idle);
            Ok::<_, PollError>(events.len())
        }
        .instrument(poll_range_span(kind, from, to))
        .await
    }

    /// The persisted cursor, or the configured start block on first run.
    fn cursor(&self, kind: EventKind, head: u64) -> Result<u64, StoreError> {
        if let Some(next) = self.store.get_cursor(kind)? {
            return Ok(next);
        }
        let start = match self.config.start_block {
            StartBlock::Latest => head,
            StartBlock::Earliest => 0,
            StartBlock::Number(n) => n,
        };
        self.store.put_cursor(kind, start)?;
        info!(kind = %kind, start, "no cursor persisted, starting fresh");
        Ok(start)
    }
}

fn shutdown_requested(rx: &mut broadcast::Receiver<()>) -> bool {
    !matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty))
}

/// Block numbers and counts as gauge values, saturating at `i64::MAX`.
fn gauge_value(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
