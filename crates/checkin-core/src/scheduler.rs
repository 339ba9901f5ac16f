//! Fixed-cadence driver for event state reconciliation.
//!
//! A [`Scheduler`] is an explicit instance owned by the hosting application.
//! While running it owns one background loop task that wakes every cadence
//! interval and runs a *gated sync*:
//!
//! 1. Probe the store with [`Reconciler::health_check`]. If it is unhealthy,
//!    log a warning and skip the cycle.
//! 2. If nothing has drifted, skip silently.
//! 3. Otherwise run [`Reconciler::sync_all`] and log a one-line summary.
//!
//! # Overlap
//!
//! Each sync runs on its own task so the loop keeps ticking regardless of
//! store latency. An in-flight flag (claimed with `compare_exchange`) makes
//! a tick that fires while the previous sync is still running a no-op.
//!
//! # Shutdown
//!
//! [`Scheduler::stop`] signals the loop over a `watch` channel and waits for
//! it to exit. A sync already in flight is not interrupted; it finishes on
//! its own and records its outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::reconciler::{Reconciler, SyncResult};
use crate::store::EventStateStore;

/// Default cadence: once per minute.
pub const DEFAULT_CADENCE: Duration = Duration::from_secs(60);

/// Sentinel for "no next run scheduled".
const NO_NEXT_RUN: i64 = i64::MIN;

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Interval between ticks.
    pub cadence: Duration,
    /// Delay the first tick to the next whole minute.
    pub align_to_minute: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cadence: DEFAULT_CADENCE,
            align_to_minute: true,
        }
    }
}

/// Result of [`Scheduler::start`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    /// The loop was registered.
    Started {
        /// When the first tick is expected.
        next_run: DateTime<Utc>,
    },
    /// A loop was already registered; nothing changed.
    AlreadyRunning,
    /// The loop could not be registered. The hosting application decides
    /// whether this is fatal.
    Error {
        /// What went wrong.
        message: String,
    },
}

/// Result of [`Scheduler::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StopOutcome {
    /// The loop was cancelled.
    Stopped,
    /// No loop was registered; nothing changed.
    NotRunning,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// The health probe failed; no sync was attempted.
    Unhealthy {
        /// Probe failure detail.
        error: Option<String>,
    },
    /// Nothing had drifted.
    Idle,
    /// Every drifted event was rewritten.
    Synced {
        /// Events rewritten.
        events_updated: usize,
        /// Length of the sync pass.
        duration_ms: u64,
    },
    /// At least one write failed.
    Failed {
        /// Events rewritten before and after the failures.
        events_updated: usize,
        /// Writes that failed.
        events_failed: usize,
        /// Sync summary message.
        message: String,
    },
}

/// The most recent completed tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// When the tick's sync started.
    pub at: DateTime<Utc>,
    /// What it did.
    pub outcome: TickOutcome,
}

/// Snapshot returned by [`Scheduler::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Whether a loop is registered.
    pub running: bool,
    /// Configured cadence.
    pub cadence_ms: u64,
    /// Estimated next tick, when running.
    pub next_run: Option<DateTime<Utc>>,
    /// Whether a sync is executing right now.
    pub sync_in_flight: bool,
    /// The last tick that completed, if any.
    pub last_run: Option<TickReport>,
}

/// State shared between the scheduler handle, its loop, and sync tasks.
#[derive(Debug)]
struct Shared {
    running: AtomicBool,
    in_flight: AtomicBool,
    next_run_ms: AtomicI64,
    last_run: Mutex<Option<TickReport>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            next_run_ms: AtomicI64::new(NO_NEXT_RUN),
            last_run: Mutex::new(None),
        }
    }

    /// Claim the in-flight flag. `None` if a sync is already running.
    fn try_claim(self: &Arc<Self>) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                shared: Arc::clone(self),
            })
    }

    fn set_next_run(&self, at: Option<DateTime<Utc>>) {
        let ms = at.map_or(NO_NEXT_RUN, |t| t.timestamp_millis());
        self.next_run_ms.store(ms, Ordering::Release);
    }

    fn next_run(&self) -> Option<DateTime<Utc>> {
        match self.next_run_ms.load(Ordering::Acquire) {
            NO_NEXT_RUN => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }
}

/// Releases the in-flight flag when dropped, even if the sync task panics.
struct InFlightGuard {
    shared: Arc<Shared>,
}

impl InFlightGuard {
    async fn record(&self, report: TickReport) {
        *self.shared.last_run.lock().await = Some(report);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.shared.in_flight.store(false, Ordering::Release);
    }
}

/// Handle to the registered loop.
struct Job {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Periodically reconciles event state.
pub struct Scheduler<S, C = SystemClock> {
    reconciler: Arc<Reconciler<S, C>>,
    config: SchedulerConfig,
    shared: Arc<Shared>,
    job: Mutex<Option<Job>>,
}

impl<S, C> Scheduler<S, C>
where
    S: EventStateStore + 'static,
    C: Clock + 'static,
{
    /// Create a stopped scheduler.
    pub fn new(reconciler: Arc<Reconciler<S, C>>, config: SchedulerConfig) -> Self {
        Self {
            reconciler,
            config,
            shared: Arc::new(Shared::new()),
            job: Mutex::new(None),
        }
    }

    /// The reconciler this scheduler drives.
    pub const fn reconciler(&self) -> &Arc<Reconciler<S, C>> {
        &self.reconciler
    }

    /// The scheduler settings.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register the recurring tick.
    ///
    /// Never panics: an unusable cadence is reported as
    /// [`StartOutcome::Error`].
    pub async fn start(&self) -> StartOutcome {
        let mut job = self.job.lock().await;
        if job.is_some() {
            warn!("Event state job already running");
            return StartOutcome::AlreadyRunning;
        }

        let cadence = self.config.cadence;
        if cadence.is_zero() {
            error!("Failed to start event state job: cadence is zero");
            return StartOutcome::Error {
                message: String::from("cadence must be greater than zero"),
            };
        }

        let first_delay = self.first_delay();
        let (Some(next_run), Some(first_tick)) = (
            wall_clock_after(first_delay),
            Instant::now().checked_add(first_delay),
        ) else {
            error!(
                cadence_ms = duration_ms(cadence),
                "Failed to start event state job: cadence out of range"
            );
            return StartOutcome::Error {
                message: String::from("cadence out of range"),
            };
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        self.shared.set_next_run(Some(next_run));
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.reconciler),
            Arc::clone(&self.shared),
            cadence,
            first_tick,
            stop_rx,
        ));
        *job = Some(Job { stop_tx, task });
        self.shared.running.store(true, Ordering::Release);

        info!(
            cadence_ms = duration_ms(cadence),
            %next_run,
            "Event state job started"
        );
        StartOutcome::Started { next_run }
    }

    /// Cancel the recurring tick.
    ///
    /// Waits for the loop task to exit. A sync already in flight keeps
    /// running to completion on its own task.
    pub async fn stop(&self) -> StopOutcome {
        let Some(job) = self.job.lock().await.take() else {
            debug!("Event state job is not running");
            return StopOutcome::NotRunning;
        };

        self.shared.running.store(false, Ordering::Release);
        self.shared.set_next_run(None);

        let _ = job.stop_tx.send(true);
        if let Err(e) = job.task.await {
            warn!(error = %e, "Event state loop ended abnormally");
        }

        info!("Event state job stopped");
        StopOutcome::Stopped
    }

    /// Whether a loop is registered.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Current state, cadence, and next-tick estimate.
    pub async fn status(&self) -> SchedulerStatus {
        let running = self.is_running();
        SchedulerStatus {
            running,
            cadence_ms: duration_ms(self.config.cadence),
            next_run: if running { self.shared.next_run() } else { None },
            sync_in_flight: self.shared.in_flight.load(Ordering::Acquire),
            last_run: self.shared.last_run.lock().await.clone(),
        }
    }

    /// Run a sync pass now, bypassing cadence and the health gate.
    ///
    /// Works whether or not the loop is running. While it runs, ticks
    /// that fire are skipped as if a scheduled sync were in flight.
    pub async fn trigger_now(&self) -> SyncResult {
        info!("Manually triggering event state synchronization");
        let _guard = self.shared.try_claim();
        self.reconciler.sync_all().await
    }

    fn first_delay(&self) -> Duration {
        if self.config.align_to_minute {
            let into_minute = Utc::now().timestamp_millis().rem_euclid(60_000);
            let wait = 60_000_i64.saturating_sub(into_minute);
            Duration::from_millis(u64::try_from(wait).unwrap_or(60_000))
        } else {
            self.config.cadence
        }
    }
}

async fn run_loop<S, C>(
    reconciler: Arc<Reconciler<S, C>>,
    shared: Arc<Shared>,
    cadence: Duration,
    first_tick: Instant,
    mut stop_rx: watch::Receiver<bool>,
) where
    S: EventStateStore + 'static,
    C: Clock + 'static,
{
    let mut interval = tokio::time::interval_at(first_tick, cadence);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                shared.set_next_run(wall_clock_after(cadence));
                let Some(guard) = shared.try_claim() else {
                    debug!("Previous event state sync still in flight, skipping tick");
                    continue;
                };
                let reconciler = Arc::clone(&reconciler);
                tokio::spawn(async move {
                    let at = reconciler.clock().now();
                    let outcome = gated_sync(&reconciler).await;
                    guard.record(TickReport { at, outcome }).await;
                });
            }
        }
    }

    debug!("Event state loop exited");
}

/// One tick's worth of work: health gate, drift check, sync.
async fn gated_sync<S: EventStateStore, C: Clock>(reconciler: &Reconciler<S, C>) -> TickOutcome {
    let health = reconciler.health_check().await;
    if !health.is_healthy() {
        warn!(
            error = health.error.as_deref().unwrap_or("unknown"),
            "Event state health check failed, skipping sync"
        );
        return TickOutcome::Unhealthy {
            error: health.error,
        };
    }

    if health.events_needing_update == 0 {
        return TickOutcome::Idle;
    }

    let result = reconciler.sync_all().await;
    if result.success {
        info!(
            events_updated = result.events_updated,
            duration_ms = result.duration_ms,
            "Event state sync completed"
        );
        TickOutcome::Synced {
            events_updated: result.events_updated,
            duration_ms: result.duration_ms,
        }
    } else {
        error!(
            events_updated = result.events_updated,
            events_failed = result.errors.len(),
            message = %result.message,
            "Event state sync failed"
        );
        TickOutcome::Failed {
            events_updated: result.events_updated,
            events_failed: result.errors.len(),
            message: result.message,
        }
    }
}

fn wall_clock_after(delay: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d))
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::panic
)]
mod tests {
    use checkin_types::{Event, EventId, EventState};

    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::InMemoryEventStore;

    type TestScheduler = Scheduler<Arc<InMemoryEventStore>, Arc<ManualClock>>;

    const CADENCE: Duration = Duration::from_secs(1);

    fn upcoming_but_open() -> Event {
        Event {
            id: EventId::new(),
            title: String::from("Keynote"),
            start_time: Some(Utc::now() + TimeDelta::minutes(5)),
            duration_minutes: Some(10),
            state: EventState::Open,
            updated_at: Utc::now(),
        }
    }

    fn scheduler_over(store: InMemoryEventStore) -> (TestScheduler, Arc<InMemoryEventStore>) {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&store), clock));
        let config = SchedulerConfig {
            cadence: CADENCE,
            align_to_minute: false,
        };
        (Scheduler::new(reconciler, config), store)
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_reports_already_running() {
        let (scheduler, _store) = scheduler_over(InMemoryEventStore::new());

        assert!(matches!(
            scheduler.start().await,
            StartOutcome::Started { .. }
        ));
        assert_eq!(scheduler.start().await, StartOutcome::AlreadyRunning);
        assert!(scheduler.is_running());

        assert_eq!(scheduler.stop().await, StopOutcome::Stopped);
        assert_eq!(scheduler.stop().await, StopOutcome::NotRunning);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_cadence_is_reported_not_raised() {
        let store = Arc::new(InMemoryEventStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let reconciler = Arc::new(Reconciler::new(store, clock));
        let scheduler = Scheduler::new(
            reconciler,
            SchedulerConfig {
                cadence: Duration::ZERO,
                align_to_minute: false,
            },
        );

        assert!(matches!(
            scheduler.start().await,
            StartOutcome::Error { .. }
        ));
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.stop().await, StopOutcome::NotRunning);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_corrects_drifted_state() {
        let event = upcoming_but_open();
        let id = event.id;
        let (scheduler, store) = scheduler_over(InMemoryEventStore::with_events([event]));

        let _ = scheduler.start().await;
        tokio::time::sleep(CADENCE + Duration::from_millis(500)).await;

        assert_eq!(store.get(id).await.unwrap().state, EventState::Closed);
        let status = scheduler.status().await;
        assert!(matches!(
            status.last_run.unwrap().outcome,
            TickOutcome::Synced {
                events_updated: 1,
                ..
            }
        ));
        let _ = scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn idle_tick_when_nothing_drifted() {
        let (scheduler, _store) = scheduler_over(InMemoryEventStore::new());
        let _ = scheduler.start().await;
        tokio::time::sleep(CADENCE + Duration::from_millis(500)).await;

        let status = scheduler.status().await;
        assert_eq!(status.last_run.unwrap().outcome, TickOutcome::Idle);
        let _ = scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_store_skips_sync() {
        let event = upcoming_but_open();
        let id = event.id;
        let (scheduler, store) = scheduler_over(InMemoryEventStore::with_events([event]));
        store.set_available(false);

        let _ = scheduler.start().await;
        tokio::time::sleep(CADENCE + Duration::from_millis(500)).await;

        let status = scheduler.status().await;
        assert!(matches!(
            status.last_run.unwrap().outcome,
            TickOutcome::Unhealthy { error: Some(_) }
        ));
        assert_eq!(store.get(id).await.unwrap().state, EventState::Open);
        let _ = scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_ticks_after_stop() {
        let (scheduler, store) = scheduler_over(InMemoryEventStore::new());
        let _ = scheduler.start().await;
        tokio::time::sleep(CADENCE * 3 + Duration::from_millis(500)).await;
        let _ = scheduler.stop().await;

        let reads_at_stop = store.reads();
        assert!(reads_at_stop > 0);
        tokio::time::sleep(CADENCE * 10).await;
        assert_eq!(store.reads(), reads_at_stop);

        let status = scheduler.status().await;
        assert!(!status.running);
        assert!(status.next_run.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_registers_one_loop() {
        let (scheduler, store) = scheduler_over(InMemoryEventStore::new());
        let _ = scheduler.start().await;
        let _ = scheduler.stop().await;
        assert!(matches!(
            scheduler.start().await,
            StartOutcome::Started { .. }
        ));

        let before = store.reads();
        tokio::time::sleep(CADENCE + Duration::from_millis(500)).await;
        // One idle tick: one count plus one list.
        assert_eq!(store.reads(), before + 2);
        let _ = scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sync_does_not_overlap() {
        let store = InMemoryEventStore::with_events([upcoming_but_open()])
            .with_latency(Duration::from_secs(5));
        let (scheduler, store) = scheduler_over(store);

        let _ = scheduler.start().await;
        // Ticks at 1s, 2s and 3s; only the first may start a sync.
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        assert_eq!(store.reads(), 1);
        assert!(scheduler.status().await.sync_in_flight);
        let _ = scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_in_flight_sync_finish() {
        let event = upcoming_but_open();
        let id = event.id;
        let store = InMemoryEventStore::with_events([event]).with_latency(Duration::from_secs(2));
        let (scheduler, store) = scheduler_over(store);

        let _ = scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(scheduler.status().await.sync_in_flight);

        assert_eq!(scheduler.stop().await, StopOutcome::Stopped);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(store.get(id).await.unwrap().state, EventState::Closed);
        assert!(!scheduler.status().await.sync_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_write_failure_is_recorded_as_failed() {
        let keep = upcoming_but_open();
        let lose = upcoming_but_open();
        let (keep_id, lose_id) = (keep.id, lose.id);
        let store = InMemoryEventStore::with_events([keep, lose]).with_latency(CADENCE);
        let (scheduler, store) = scheduler_over(store);

        // Tick at 1s: probe count and drift list finish at 3s, the sync's
        // list at 4s, then one write each at 5s and 6s.
        let _ = scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        let _ = store.remove(lose_id).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let status = scheduler.status().await;
        assert!(matches!(
            status.last_run.unwrap().outcome,
            TickOutcome::Failed {
                events_updated: 1,
                events_failed: 1,
                ..
            }
        ));
        assert_eq!(store.get(keep_id).await.unwrap().state, EventState::Closed);
        let _ = scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_now_bypasses_cadence() {
        let event = upcoming_but_open();
        let id = event.id;
        let (scheduler, store) = scheduler_over(InMemoryEventStore::with_events([event]));

        let result = scheduler.trigger_now().await;
        assert!(result.success);
        assert_eq!(result.events_updated, 1);
        assert_eq!(store.get(id).await.unwrap().state, EventState::Closed);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_cadence_and_next_run() {
        let (scheduler, _store) = scheduler_over(InMemoryEventStore::new());
        let idle = scheduler.status().await;
        assert!(!idle.running);
        assert_eq!(idle.cadence_ms, 1_000);
        assert!(idle.next_run.is_none());

        let StartOutcome::Started { next_run } = scheduler.start().await else {
            panic!("scheduler did not start");
        };
        let running = scheduler.status().await;
        assert!(running.running);
        assert_eq!(
            running.next_run.map(|t| t.timestamp_millis()),
            Some(next_run.timestamp_millis())
        );
        let _ = scheduler.stop().await;
    }

    #[test]
    fn outcomes_serialize_with_status_tag() {
        let json = serde_json::to_value(StartOutcome::AlreadyRunning).unwrap();
        assert_eq!(json["status"], "already_running");
        let json = serde_json::to_value(StopOutcome::NotRunning).unwrap();
        assert_eq!(json["status"], "not_running");
    }
}
