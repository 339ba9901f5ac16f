//! Data-access contract for event state.
//!
//! The reconciler only needs four things from persistence: list the events
//! it manages, look one up, rewrite one event's state, and count the managed
//! events for the health gate. Anything beyond that (authoring, attendance,
//! exports) lives behind other interfaces.
//!
//! Implementations: [`InMemoryEventStore`](crate::memory::InMemoryEventStore)
//! here, and `PgEventStore` in `checkin-db`.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use checkin_types::{Event, EventId, EventState};

/// Errors surfaced by an [`EventStateStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No event has the given id.
    #[error("event not found: {0}")]
    NotFound(EventId),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store was reached but the operation failed.
    #[error("store error: {0}")]
    Backend(String),
}

/// Read/write access to the scheduling and state fields of events.
///
/// All futures are `Send` so reconciliation can run on spawned tasks.
pub trait EventStateStore: Send + Sync {
    /// All events whose state the reconciler manages (every non-`DRAFT` event).
    fn list_eligible_events(&self) -> impl Future<Output = Result<Vec<Event>, StoreError>> + Send;

    /// Look up a single event, whatever its state.
    fn get_event_by_id(
        &self,
        id: EventId,
    ) -> impl Future<Output = Result<Event, StoreError>> + Send;

    /// Rewrite one event's state and `updated_at`, returning the new record.
    ///
    /// Fails with [`StoreError::NotFound`] when the id does not resolve.
    fn write_event_state(
        &self,
        id: EventId,
        state: EventState,
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Event, StoreError>> + Send;

    /// Number of eligible events. Used as a cheap reachability probe.
    fn count_eligible_events(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

impl<S: EventStateStore> EventStateStore for Arc<S> {
    fn list_eligible_events(&self) -> impl Future<Output = Result<Vec<Event>, StoreError>> + Send {
        (**self).list_eligible_events()
    }

    fn get_event_by_id(
        &self,
        id: EventId,
    ) -> impl Future<Output = Result<Event, StoreError>> + Send {
        (**self).get_event_by_id(id)
    }

    fn write_event_state(
        &self,
        id: EventId,
        state: EventState,
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Event, StoreError>> + Send {
        (**self).write_event_state(id, state, updated_at)
    }

    fn count_eligible_events(&self) -> impl Future<Output = Result<u64, StoreError>> + Send {
        (**self).count_eligible_events()
    }
}
