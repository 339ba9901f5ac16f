//! End-to-end reconciliation scenarios for `checkin-core`.
//!
//! Drives a [`Reconciler`] over the in-memory store with a manual clock and
//! walks events through their whole lifecycle by advancing simulated time.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use checkin_core::{
    EventStateStore, InMemoryEventStore, ManualClock, Reconciler, Scheduler, SchedulerConfig,
    TickOutcome,
};
use checkin_types::{Event, EventId, EventState, EventUpdate};

type TestReconciler = Reconciler<Arc<InMemoryEventStore>, Arc<ManualClock>>;

fn event(start: Option<DateTime<Utc>>, duration: Option<i32>, state: EventState) -> Event {
    Event {
        id: EventId::new(),
        title: String::from("Workshop"),
        start_time: start,
        duration_minutes: duration,
        state,
        updated_at: Utc::now() - TimeDelta::days(1),
    }
}

fn setup(
    events: impl IntoIterator<Item = Event>,
    now: DateTime<Utc>,
) -> (TestReconciler, Arc<InMemoryEventStore>, Arc<ManualClock>) {
    let store = Arc::new(InMemoryEventStore::with_events(events));
    let clock = Arc::new(ManualClock::new(now));
    let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&clock));
    (reconciler, store, clock)
}

#[tokio::test]
async fn event_walks_through_its_lifecycle() {
    let t0 = Utc::now();
    let workshop = event(Some(t0 + TimeDelta::minutes(5)), Some(10), EventState::Open);
    let id = workshop.id;
    let (reconciler, store, clock) = setup([workshop], t0);

    // Not started yet: stored OPEN is wrong.
    let result = reconciler.sync_all().await;
    assert!(result.success);
    assert_eq!(result.events_updated, 1);
    assert_eq!(store.get(id).await.unwrap().state, EventState::Closed);

    // Inside the window.
    clock.advance(TimeDelta::minutes(6));
    let result = reconciler.sync_all().await;
    assert_eq!(result.events_updated, 1);
    assert_eq!(store.get(id).await.unwrap().state, EventState::Open);

    // Past the end.
    clock.advance(TimeDelta::minutes(10));
    let result = reconciler.sync_all().await;
    assert_eq!(result.events_updated, 1);
    assert_eq!(store.get(id).await.unwrap().state, EventState::Closed);

    // Nothing changed since the last pass.
    let result = reconciler.sync_all().await;
    assert!(result.success);
    assert_eq!(result.events_updated, 0);
    assert_eq!(result.message, "All events are in correct state");
}

#[tokio::test]
async fn window_end_is_exclusive() {
    let t0 = Utc::now();
    let talk = event(Some(t0), Some(30), EventState::Closed);
    let id = talk.id;
    let (reconciler, store, clock) = setup([talk], t0);

    let _ = reconciler.sync_all().await;
    assert_eq!(store.get(id).await.unwrap().state, EventState::Open);

    clock.set(t0 + TimeDelta::minutes(30) - TimeDelta::milliseconds(1));
    assert_eq!(reconciler.sync_all().await.events_updated, 0);

    clock.set(t0 + TimeDelta::minutes(30));
    assert_eq!(reconciler.sync_all().await.events_updated, 1);
    assert_eq!(store.get(id).await.unwrap().state, EventState::Closed);
}

#[tokio::test]
async fn malformed_events_settle_closed_and_drafts_stay_put() {
    let t0 = Utc::now();
    let no_start = event(None, Some(30), EventState::Open);
    let no_duration = event(Some(t0), None, EventState::Open);
    let too_long = event(Some(t0), Some(1441), EventState::Open);
    let running_draft = event(Some(t0 - TimeDelta::minutes(1)), Some(30), EventState::Draft);
    let ids = [no_start.id, no_duration.id, too_long.id];
    let draft_id = running_draft.id;
    let (reconciler, store, _clock) = setup([no_start, no_duration, too_long, running_draft], t0);

    let result = reconciler.sync_all().await;
    assert!(result.success);
    assert_eq!(result.events_updated, 3);
    for id in ids {
        assert_eq!(store.get(id).await.unwrap().state, EventState::Closed);
    }
    assert_eq!(store.get(draft_id).await.unwrap().state, EventState::Draft);
}

#[tokio::test]
async fn one_failing_write_does_not_stop_the_pass() {
    let t0 = Utc::now();
    let events: Vec<Event> = (0..5)
        .map(|i| event(Some(t0 + TimeDelta::hours(i)), Some(60), EventState::Open))
        .collect();
    let ids: Vec<EventId> = events.iter().map(|e| e.id).collect();
    let (reconciler, store, _clock) = setup(events, t0);

    // Deleted between read and write: the write reports NotFound.
    let vanished = ids[2];
    let updates: Vec<EventUpdate> = ids
        .iter()
        .map(|&id| EventUpdate {
            id,
            state: EventState::Closed,
        })
        .collect();
    let _ = store.remove(vanished).await;

    let batch = reconciler.batch_update(&updates).await;
    assert_eq!(batch.success_count, 4);
    assert_eq!(batch.error_count, 1);
    assert_eq!(batch.errors[0].event_id, vanished);
}

#[tokio::test]
async fn repeated_passes_converge() {
    let t0 = Utc::now();
    let events: Vec<Event> = (0..20)
        .map(|i| {
            let state = if i % 2 == 0 {
                EventState::Open
            } else {
                EventState::Closed
            };
            event(
                Some(t0 + TimeDelta::minutes(i64::from(i) * 7 - 70)),
                Some(15 + i * 3),
                state,
            )
        })
        .collect();
    let (reconciler, store, _clock) = setup(events, t0);

    let first = reconciler.sync_all().await;
    assert!(first.success);
    let second = reconciler.sync_all().await;
    assert_eq!(second.events_updated, 0);

    for stored in store.list_eligible_events().await.unwrap() {
        assert_eq!(stored.state, reconciler.calculate_state(&stored));
    }
}

#[tokio::test]
async fn outage_is_a_noop_pass() {
    let t0 = Utc::now();
    let e = event(Some(t0 + TimeDelta::hours(1)), Some(30), EventState::Open);
    let id = e.id;
    let (reconciler, store, _clock) = setup([e], t0);

    store.set_available(false);
    let result = reconciler.sync_all().await;
    assert!(result.success);
    assert_eq!(result.events_updated, 0);

    store.set_available(true);
    assert_eq!(store.get(id).await.unwrap().state, EventState::Open);
    assert_eq!(reconciler.sync_all().await.events_updated, 1);
}

#[tokio::test(start_paused = true)]
async fn scheduler_follows_simulated_time() {
    let t0 = Utc::now();
    let e = event(Some(t0 + TimeDelta::minutes(5)), Some(10), EventState::Closed);
    let id = e.id;
    let (reconciler, store, clock) = setup([e], t0);

    let scheduler = Scheduler::new(
        Arc::new(reconciler),
        SchedulerConfig {
            cadence: Duration::from_secs(60),
            align_to_minute: false,
        },
    );
    let _ = scheduler.start().await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(
        scheduler.status().await.last_run.unwrap().outcome,
        TickOutcome::Idle
    );

    clock.advance(TimeDelta::minutes(6));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(store.get(id).await.unwrap().state, EventState::Open);

    clock.advance(TimeDelta::minutes(10));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(store.get(id).await.unwrap().state, EventState::Closed);

    let _ = scheduler.stop().await;
}
