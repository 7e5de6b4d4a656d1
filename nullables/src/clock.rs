//! Nullable clock with manually advanced time.

use certchain_types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Seconds-resolution clock that stamps blocks mined by [`crate::NullChain`].
///
/// Nothing moves it except [`NullClock::advance`] and [`NullClock::set`].
#[derive(Debug)]
pub struct NullClock {
    current: AtomicU64,
}

impl NullClock {
    pub fn new(initial_secs: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_secs),
        }
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.current.load(Ordering::SeqCst))
    }

    pub fn advance(&self, secs: u64) {
        self.current.fetch_add(secs, Ordering::SeqCst);
    }

    /// Jump to an absolute time. Going backwards is allowed.
    pub fn set(&self, secs: u64) {
        self.current.store(secs, Ordering::SeqCst);
    }
}
