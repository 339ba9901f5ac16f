//! In-memory [`EventStateStore`].
//!
//! Backs unit and integration tests and lets the service run without a
//! database. Besides the store contract it exposes a few test levers: an
//! availability switch that makes every call fail as if the database were
//! down, an artificial per-call latency, and a counter of reads.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use checkin_types::{Event, EventId, EventState};
use tokio::sync::RwLock;

use crate::store::{EventStateStore, StoreError};

/// Event records held in a `BTreeMap` behind an async lock.
#[derive(Debug)]
pub struct InMemoryEventStore {
    events: RwLock<BTreeMap<EventId, Event>>,
    available: AtomicBool,
    latency: Duration,
    reads: AtomicU64,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    /// Create an empty, available store with no latency.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            latency: Duration::ZERO,
            reads: AtomicU64::new(0),
        }
    }

    /// Create a store pre-populated with `events`.
    pub fn with_events(events: impl IntoIterator<Item = Event>) -> Self {
        let map = events.into_iter().map(|e| (e.id, e)).collect();
        Self {
            events: RwLock::new(map),
            ..Self::new()
        }
    }

    /// Delay every store call by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Insert or replace an event.
    pub async fn insert(&self, event: Event) {
        let _ = self.events.write().await.insert(event.id, event);
    }

    /// Remove an event, returning it if present.
    pub async fn remove(&self, id: EventId) -> Option<Event> {
        self.events.write().await.remove(&id)
    }

    /// Fetch an event without going through the store contract.
    pub async fn get(&self, id: EventId) -> Option<Event> {
        self.events.read().await.get(&id).cloned()
    }

    /// Toggle simulated reachability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Number of list and count calls received so far, including ones that
    /// failed or are still waiting out the artificial latency.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Acquire)
    }

    async fn enter(&self) -> Result<(), StoreError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(String::from(
                "in-memory store marked unavailable",
            )))
        }
    }
}

impl EventStateStore for InMemoryEventStore {
    async fn list_eligible_events(&self) -> Result<Vec<Event>, StoreError> {
        let _ = self.reads.fetch_add(1, Ordering::AcqRel);
        self.enter().await?;
        let events = self.events.read().await;
        Ok(events
            .values()
            .filter(|e| e.state.is_managed())
            .cloned()
            .collect())
    }

    async fn get_event_by_id(&self, id: EventId) -> Result<Event, StoreError> {
        self.enter().await?;
        self.events
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn write_event_state(
        &self,
        id: EventId,
        state: EventState,
        updated_at: DateTime<Utc>,
    ) -> Result<Event, StoreError> {
        self.enter().await?;
        let mut events = self.events.write().await;
        let event = events.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        event.state = state;
        event.updated_at = updated_at;
        Ok(event.clone())
    }

    async fn count_eligible_events(&self) -> Result<u64, StoreError> {
        let _ = self.reads.fetch_add(1, Ordering::AcqRel);
        self.enter().await?;
        let events = self.events.read().await;
        let count = events.values().filter(|e| e.state.is_managed()).count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}
