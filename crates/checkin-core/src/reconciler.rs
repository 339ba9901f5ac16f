//! Reconciliation of stored event state with schedule-derived state.
//!
//! State goes stale purely by the passage of time, so nothing upstream
//! tells us an event has opened or closed. Each sync pass re-reads every
//! eligible event, recalculates its state, and writes back only the ones
//! that drifted.
//!
//! # Failure model
//!
//! - Store read failures during drift detection are logged and treated as
//!   "nothing to do" for this pass.
//! - A failed write in a batch is recorded against its event id and never
//!   aborts the rest of the batch.
//! - Targeted single-record updates ([`Reconciler::update_one`]) surface
//!   [`ReconcileError::NotFound`] and [`ReconcileError::InvalidArgument`] to
//!   the caller.

use std::time::Instant;

use chrono::{DateTime, Utc};
use checkin_types::{Event, EventId, EventState, EventStateDetails, EventUpdate};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::state;
use crate::store::{EventStateStore, StoreError};

/// Errors returned by targeted reconciler operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// The event id did not resolve.
    #[error("event not found: {0}")]
    NotFound(EventId),

    /// The request was malformed (e.g. asking to write `DRAFT`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The store failed for a reason other than a missing record.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// A single failed write within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// The event whose update failed.
    pub event_id: EventId,
    /// Why it failed.
    pub error: String,
}

/// Aggregate outcome of [`Reconciler::batch_update`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Updates that were written.
    pub success_count: usize,
    /// Updates that failed.
    pub error_count: usize,
    /// One entry per failed update, in input order.
    pub errors: Vec<BatchError>,
}

impl BatchResult {
    /// True when no update failed.
    pub const fn is_success(&self) -> bool {
        self.error_count == 0
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// True iff every drifted event was rewritten.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Number of drifted events found.
    pub events_checked: usize,
    /// Number of events rewritten.
    pub events_updated: usize,
    /// Per-event write failures.
    pub errors: Vec<BatchError>,
    /// Wall-clock length of the pass.
    pub duration_ms: u64,
}

/// Whether the store answered the health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Store reachable and drift computable.
    Healthy,
    /// Store unreachable or failing.
    Unhealthy,
}

/// Result of [`Reconciler::health_check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall verdict.
    pub status: HealthStatus,
    /// Number of eligible events (0 when unhealthy).
    pub events_total: u64,
    /// Number of eligible events whose state has drifted (0 when unhealthy).
    pub events_needing_update: usize,
    /// Failure detail when unhealthy.
    pub error: Option<String>,
    /// When the probe ran.
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// True when the store answered.
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Brings stored event state in line with the schedule.
///
/// Generic over the store and the clock so tests can drive it with an
/// in-memory store and simulated time.
#[derive(Debug)]
pub struct Reconciler<S, C = SystemClock> {
    store: S,
    clock: C,
}

impl<S: EventStateStore> Reconciler<S> {
    /// Create a reconciler over `store` using wall-clock time.
    pub const fn with_system_clock(store: S) -> Self {
        Self {
            store,
            clock: SystemClock,
        }
    }
}

impl<S: EventStateStore, C: Clock> Reconciler<S, C> {
    /// Create a reconciler over `store` reading time from `clock`.
    pub const fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The time source.
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Calculate the state of `event`, sampling the clock for this call only.
    pub fn calculate_state(&self, event: &Event) -> EventState {
        state::calculate_state_at(event, self.clock.now())
    }

    /// Eligible events whose stored state disagrees with the calculated one.
    ///
    /// A store failure is logged and yields an empty list, which callers must
    /// read as "nothing to do this pass".
    pub async fn find_drifted(&self) -> Vec<Event> {
        match self.try_find_drifted().await {
            Ok(drifted) => drifted,
            Err(e) => {
                error!(error = %e, "Failed to load events for state reconciliation");
                Vec::new()
            }
        }
    }

    async fn try_find_drifted(&self) -> Result<Vec<Event>, StoreError> {
        let events = self.store.list_eligible_events().await?;
        Ok(events
            .into_iter()
            .filter(|event| self.calculate_state(event) != event.state)
            .collect())
    }

    /// Set one event's state.
    ///
    /// No write happens when the stored state already equals `new_state`;
    /// the current record is returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::InvalidArgument`] if `new_state` is `DRAFT`.
    /// - [`ReconcileError::NotFound`] if `id` does not resolve.
    /// - [`ReconcileError::Store`] for any other store failure.
    pub async fn update_one(
        &self,
        id: EventId,
        new_state: EventState,
    ) -> Result<Event, ReconcileError> {
        ensure_managed(new_state)?;

        let event = self.store.get_event_by_id(id).await?;
        if event.state == new_state {
            debug!(event_id = %id, state = %new_state, "Event already in requested state");
            return Ok(event);
        }

        let updated = self
            .store
            .write_event_state(id, new_state, self.clock.now())
            .await?;
        info!(event_id = %id, from = %event.state, to = %new_state, "Event state updated");
        Ok(updated)
    }

    /// Apply each update independently.
    ///
    /// A failing update is recorded in [`BatchResult::errors`] and the
    /// remaining updates still run.
    pub async fn batch_update(&self, updates: &[EventUpdate]) -> BatchResult {
        let mut result = BatchResult::default();

        for update in updates {
            let written = match ensure_managed(update.state) {
                Ok(()) => self
                    .store
                    .write_event_state(update.id, update.state, self.clock.now())
                    .await
                    .map_err(ReconcileError::from),
                Err(e) => Err(e),
            };

            match written {
                Ok(_) => {
                    result.success_count = result.success_count.saturating_add(1);
                }
                Err(e) => {
                    warn!(event_id = %update.id, error = %e, "Event state update failed");
                    result.error_count = result.error_count.saturating_add(1);
                    result.errors.push(BatchError {
                        event_id: update.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        result
    }

    /// Run one full sync pass: detect drift, recalculate, write back.
    pub async fn sync_all(&self) -> SyncResult {
        let started = Instant::now();

        let drifted = self.find_drifted().await;
        if drifted.is_empty() {
            return SyncResult {
                success: true,
                message: String::from("All events are in correct state"),
                events_checked: 0,
                events_updated: 0,
                errors: Vec::new(),
                duration_ms: elapsed_ms(started),
            };
        }

        let updates: Vec<EventUpdate> = drifted
            .iter()
            .map(|event| EventUpdate {
                id: event.id,
                state: self.calculate_state(event),
            })
            .collect();

        let batch = self.batch_update(&updates).await;
        let duration_ms = elapsed_ms(started);

        info!(
            events_checked = drifted.len(),
            events_updated = batch.success_count,
            events_failed = batch.error_count,
            duration_ms,
            "Event state synchronization"
        );

        SyncResult {
            success: batch.is_success(),
            message: format!("Synced {} events", batch.success_count),
            events_checked: drifted.len(),
            events_updated: batch.success_count,
            errors: batch.errors,
            duration_ms,
        }
    }

    /// Probe the store: count eligible events and compute current drift.
    pub async fn health_check(&self) -> HealthReport {
        let probe = async {
            let total = self.store.count_eligible_events().await?;
            let drifted = self.try_find_drifted().await?;
            Ok::<_, StoreError>((total, drifted.len()))
        };

        match probe.await {
            Ok((events_total, events_needing_update)) => HealthReport {
                status: HealthStatus::Healthy,
                events_total,
                events_needing_update,
                error: None,
                timestamp: self.clock.now(),
            },
            Err(e) => HealthReport {
                status: HealthStatus::Unhealthy,
                events_total: 0,
                events_needing_update: 0,
                error: Some(e.to_string()),
                timestamp: self.clock.now(),
            },
        }
    }

    /// Stored versus calculated state of one event, with timing breakdown.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::NotFound`] if `id` does not resolve, otherwise
    /// [`ReconcileError::Store`].
    pub async fn state_details(&self, id: EventId) -> Result<EventStateDetails, ReconcileError> {
        let event = self.store.get_event_by_id(id).await?;
        Ok(state::state_details_at(&event, self.clock.now()))
    }
}

fn ensure_managed(state: EventState) -> Result<(), ReconcileError> {
    if state.is_managed() {
        Ok(())
    } else {
        Err(ReconcileError::InvalidArgument(format!(
            "invalid state: {state}. Must be OPEN or CLOSED."
        )))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;

    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::InMemoryEventStore;

    type TestReconciler = Reconciler<Arc<InMemoryEventStore>, Arc<ManualClock>>;

    fn event(start: DateTime<Utc>, duration: i32, state: EventState) -> Event {
        Event {
            id: EventId::new(),
            title: String::from("Session"),
            start_time: Some(start),
            duration_minutes: Some(duration),
            state,
            updated_at: start - TimeDelta::days(1),
        }
    }

    fn setup(events: Vec<Event>) -> (TestReconciler, Arc<InMemoryEventStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryEventStore::with_events(events));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&clock));
        (reconciler, store, clock)
    }

    #[tokio::test]
    async fn find_drifted_returns_only_disagreeing_events() {
        let now = Utc::now();
        let running_closed = event(now - TimeDelta::minutes(5), 30, EventState::Closed);
        let running_open = event(now - TimeDelta::minutes(5), 30, EventState::Open);
        let future_open = event(now + TimeDelta::hours(1), 30, EventState::Open);
        let drifted_ids = [running_closed.id, future_open.id];

        let (reconciler, _store, clock) =
            setup(vec![running_closed, running_open, future_open]);
        clock.set(now);

        let mut found: Vec<EventId> = reconciler
            .find_drifted()
            .await
            .into_iter()
            .map(|e| e.id)
            .collect();
        found.sort();
        let mut expected = drifted_ids.to_vec();
        expected.sort();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn find_drifted_ignores_drafts() {
        let now = Utc::now();
        let draft = event(now - TimeDelta::minutes(5), 30, EventState::Draft);
        let (reconciler, _store, clock) = setup(vec![draft]);
        clock.set(now);
        assert!(reconciler.find_drifted().await.is_empty());
    }

    #[tokio::test]
    async fn find_drifted_soft_fails_when_store_is_down() {
        let now = Utc::now();
        let (reconciler, store, _clock) =
            setup(vec![event(now + TimeDelta::hours(1), 30, EventState::Open)]);
        store.set_available(false);
        assert!(reconciler.find_drifted().await.is_empty());
    }

    #[tokio::test]
    async fn update_one_is_idempotent() {
        let now = Utc::now();
        let e = event(now, 30, EventState::Open);
        let id = e.id;
        let original_updated_at = e.updated_at;
        let (reconciler, _store, clock) = setup(vec![e]);
        clock.set(now);

        let first = reconciler.update_one(id, EventState::Closed).await.unwrap();
        assert_eq!(first.state, EventState::Closed);
        assert!(first.updated_at > original_updated_at);

        clock.advance(TimeDelta::seconds(30));
        let second = reconciler.update_one(id, EventState::Closed).await.unwrap();
        assert_eq!(second.state, EventState::Closed);
        assert_eq!(second.updated_at, first.updated_at);
    }

    #[tokio::test]
    async fn update_one_unknown_id_is_not_found() {
        let (reconciler, _store, _clock) = setup(Vec::new());
        let id = EventId::new();
        let err = reconciler.update_one(id, EventState::Open).await.unwrap_err();
        assert_eq!(err, ReconcileError::NotFound(id));
    }

    #[tokio::test]
    async fn update_one_rejects_draft() {
        let now = Utc::now();
        let e = event(now, 30, EventState::Open);
        let id = e.id;
        let (reconciler, store, _clock) = setup(vec![e]);
        let err = reconciler.update_one(id, EventState::Draft).await.unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidArgument(_)));
        assert_eq!(store.get(id).await.unwrap().state, EventState::Open);
    }

    #[tokio::test]
    async fn update_one_propagates_store_outage() {
        let now = Utc::now();
        let e = event(now, 30, EventState::Open);
        let id = e.id;
        let (reconciler, store, _clock) = setup(vec![e]);
        store.set_available(false);
        let err = reconciler.update_one(id, EventState::Closed).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn batch_update_isolates_failures_at_any_position() {
        let now = Utc::now();
        for failing in 0..4 {
            let events: Vec<Event> = (0..4)
                .map(|_| event(now, 30, EventState::Closed))
                .collect();
            let ids: Vec<EventId> = events.iter().map(|e| e.id).collect();
            let (reconciler, store, _clock) = setup(events);

            let doomed = ids[failing];
            let _ = store.remove(doomed).await;

            let updates: Vec<EventUpdate> = ids
                .iter()
                .map(|&id| EventUpdate {
                    id,
                    state: EventState::Open,
                })
                .collect();
            let result = reconciler.batch_update(&updates).await;

            assert_eq!(result.success_count, 3, "failing position {failing}");
            assert_eq!(result.error_count, 1);
            assert_eq!(result.errors[0].event_id, doomed);
            assert!(!result.is_success());
            for &id in ids.iter().filter(|&&id| id != doomed) {
                assert_eq!(store.get(id).await.unwrap().state, EventState::Open);
            }
        }
    }

    #[tokio::test]
    async fn batch_update_records_draft_as_error() {
        let now = Utc::now();
        let e = event(now, 30, EventState::Open);
        let id = e.id;
        let (reconciler, _store, _clock) = setup(vec![e]);
        let result = reconciler
            .batch_update(&[EventUpdate {
                id,
                state: EventState::Draft,
            }])
            .await;
        assert_eq!(result.error_count, 1);
        assert!(result.errors[0].error.contains("invalid state"));
    }

    #[tokio::test]
    async fn sync_all_short_circuits_when_nothing_drifted() {
        let now = Utc::now();
        let (reconciler, store, clock) =
            setup(vec![event(now + TimeDelta::hours(1), 30, EventState::Closed)]);
        clock.set(now);

        let reads_before = store.reads();
        let result = reconciler.sync_all().await;
        assert!(result.success);
        assert_eq!(result.events_checked, 0);
        assert_eq!(result.events_updated, 0);
        assert_eq!(result.message, "All events are in correct state");
        assert_eq!(store.reads(), reads_before + 1);
    }

    #[tokio::test]
    async fn sync_all_converges_every_eligible_event() {
        let now = Utc::now();
        let events = vec![
            event(now - TimeDelta::hours(3), 60, EventState::Open),
            event(now - TimeDelta::minutes(10), 60, EventState::Closed),
            event(now + TimeDelta::minutes(10), 60, EventState::Open),
            event(now - TimeDelta::minutes(10), 60, EventState::Open),
            event(now + TimeDelta::days(2), 1440, EventState::Closed),
        ];
        let ids: Vec<EventId> = events.iter().map(|e| e.id).collect();
        let (reconciler, store, clock) = setup(events);
        clock.set(now);

        let result = reconciler.sync_all().await;
        assert!(result.success);
        assert_eq!(result.events_checked, 3);
        assert_eq!(result.events_updated, 3);
        assert_eq!(result.message, "Synced 3 events");

        for id in ids {
            let stored = store.get(id).await.unwrap();
            assert_eq!(stored.state, reconciler.calculate_state(&stored));
        }
        assert!(reconciler.find_drifted().await.is_empty());
    }

    #[tokio::test]
    async fn health_check_reports_drift_and_totals() {
        let now = Utc::now();
        let (reconciler, _store, clock) = setup(vec![
            event(now + TimeDelta::hours(1), 30, EventState::Open),
            event(now + TimeDelta::hours(1), 30, EventState::Closed),
            event(now + TimeDelta::hours(1), 30, EventState::Draft),
        ]);
        clock.set(now);

        let report = reconciler.health_check().await;
        assert!(report.is_healthy());
        assert_eq!(report.events_total, 2);
        assert_eq!(report.events_needing_update, 1);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn health_check_reports_outage() {
        let (reconciler, store, _clock) = setup(Vec::new());
        store.set_available(false);
        let report = reconciler.health_check().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.error.unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn state_details_uses_reconciler_clock() {
        let now = Utc::now();
        let e = event(now + TimeDelta::minutes(5), 10, EventState::Open);
        let id = e.id;
        let (reconciler, _store, clock) = setup(vec![e]);
        clock.set(now);

        let details = reconciler.state_details(id).await.unwrap();
        assert_eq!(details.calculated_state, EventState::Closed);
        assert!(!details.state_matches_calculation);

        clock.advance(TimeDelta::minutes(6));
        let details = reconciler.state_details(id).await.unwrap();
        assert_eq!(details.calculated_state, EventState::Open);
        assert!(details.state_matches_calculation);
    }

    #[tokio::test]
    async fn state_details_unknown_id() {
        let (reconciler, _store, _clock) = setup(Vec::new());
        let id = EventId::new();
        assert_eq!(
            reconciler.state_details(id).await.unwrap_err(),
            ReconcileError::NotFound(id)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sync_all_reports_partial_failure() {
        let now = Utc::now();
        let first = event(now + TimeDelta::hours(1), 30, EventState::Open);
        let second = event(now + TimeDelta::hours(2), 30, EventState::Open);
        let ids = [first.id, second.id];
        let latency = std::time::Duration::from_secs(1);
        let store =
            Arc::new(InMemoryEventStore::with_events([first, second]).with_latency(latency));
        let clock = Arc::new(ManualClock::new(now));
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&store), clock));

        let pass = tokio::spawn({
            let reconciler = Arc::clone(&reconciler);
            async move { reconciler.sync_all().await }
        });

        // The list read lands at 1s and the writes at 2s and 3s.
        tokio::time::sleep(latency + latency / 2).await;
        let vanished = ids[1];
        let _ = store.remove(vanished).await;

        let result = pass.await.unwrap();
        assert!(!result.success);
        assert_eq!(result.events_checked, 2);
        assert_eq!(result.events_updated, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].event_id, vanished);
        assert_eq!(result.message, "Synced 1 events");
        assert_eq!(store.get(ids[0]).await.unwrap().state, EventState::Closed);
    }
}
