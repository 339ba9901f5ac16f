//! Time sources for state calculation.
//!
//! The reconciler never calls `Utc::now()` directly; it asks a [`Clock`]
//! once per calculated event. Production wiring uses [`SystemClock`]. Tests
//! use [`ManualClock`] to step simulated time across event boundaries.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};

/// A source of the current instant.
pub trait Clock: Send + Sync {
    /// Sample the current instant.
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock with millisecond resolution.
///
/// The instant is held as epoch milliseconds in an atomic so it can be
/// shared between a test body and a running scheduler without locks.
#[derive(Debug)]
pub struct ManualClock {
    epoch_ms: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            epoch_ms: AtomicI64::new(at.timestamp_millis()),
        }
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        self.epoch_ms.store(at.timestamp_millis(), Ordering::Release);
    }

    /// Move the clock forward (or backward, for a negative delta).
    pub fn advance(&self, by: TimeDelta) {
        let delta = by.num_milliseconds();
        let _ = self
            .epoch_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |ms| {
                Some(ms.saturating_add(delta))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.epoch_ms.load(Ordering::Acquire)).unwrap_or_default()
    }
}
