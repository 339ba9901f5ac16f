//! [`EventStateStore`] backed by the `events` table.
//!
//! Only the scheduling and state columns are touched. The `state` column is
//! a `PostgreSQL` enum; it is read as `state::TEXT` and written with a
//! `$n::event_state` cast so the enum never needs a Rust-side `sqlx::Type`.

use chrono::{DateTime, Utc};
use checkin_core::{EventStateStore, StoreError};
use checkin_types::{Event, EventId, EventState};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;
use crate::postgres::PostgresPool;

/// Columns selected for every event read.
const EVENT_COLUMNS: &str =
    "id, title, start_time, duration_minutes, state::TEXT AS state, updated_at";

/// `PostgreSQL` implementation of [`EventStateStore`].
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Create a store over an existing pool.
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }

    /// Insert a new event. Used for seeding and tests; authoring lives
    /// elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert_event(&self, event: &Event) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO events (id, title, start_time, duration_minutes, state, updated_at)
              VALUES ($1, $2, $3, $4, $5::event_state, $6)",
        )
        .bind(event.id.into_inner())
        .bind(&event.title)
        .bind(event.start_time)
        .bind(event.duration_minutes)
        .bind(event.state.as_str())
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete an event by id. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the delete fails.
    pub async fn delete_event(&self, id: EventId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id.into_inner())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_eligible(&self) -> Result<Vec<Event>, DbError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE state <> 'DRAFT' ORDER BY start_time, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        let events = rows
            .into_iter()
            .map(Event::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(count = events.len(), "Loaded eligible events");
        Ok(events)
    }

    async fn fetch_one(&self, id: EventId) -> Result<Option<Event>, DbError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Event::try_from).transpose()
    }

    async fn update_state(
        &self,
        id: EventId,
        state: EventState,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Event>, DbError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "UPDATE events SET state = $2::event_state, updated_at = $3 \
             WHERE id = $1 RETURNING {EVENT_COLUMNS}"
        ))
        .bind(id.into_inner())
        .bind(state.as_str())
        .bind(updated_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Event::try_from).transpose()
    }

    async fn count_eligible(&self) -> Result<u64, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE state <> 'DRAFT'")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl EventStateStore for PgEventStore {
    async fn list_eligible_events(&self) -> Result<Vec<Event>, StoreError> {
        Ok(self.fetch_eligible().await?)
    }

    async fn get_event_by_id(&self, id: EventId) -> Result<Event, StoreError> {
        self.fetch_one(id).await?.ok_or(StoreError::NotFound(id))
    }

    async fn write_event_state(
        &self,
        id: EventId,
        state: EventState,
        updated_at: DateTime<Utc>,
    ) -> Result<Event, StoreError> {
        self.update_state(id, state, updated_at)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn count_eligible_events(&self) -> Result<u64, StoreError> {
        Ok(self.count_eligible().await?)
    }
}

/// A row from the `events` table.
///
/// Uses runtime types rather than compile-time checked types to
/// avoid requiring a live database during builds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// Event id.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Scheduled start, if set.
    pub start_time: Option<DateTime<Utc>>,
    /// Scheduled length in minutes, if set.
    pub duration_minutes: Option<i32>,
    /// State as a string (cast from the `PostgreSQL` enum).
    pub state: String,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = DbError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<EventState>()
            .map_err(|e| DbError::InvalidRow(format!("event {}: {e}", row.id)))?;
        Ok(Self {
            id: EventId::from(row.id),
            title: row.title,
            start_time: row.start_time,
            duration_minutes: row.duration_minutes,
            state,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(state: &str) -> EventRow {
        EventRow {
            id: Uuid::now_v7(),
            title: String::from("Standup"),
            start_time: Some(Utc::now()),
            duration_minutes: Some(15),
            state: state.to_owned(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn row_converts_to_event() {
        let r = row("OPEN");
        let id = r.id;
        let event = Event::try_from(r).unwrap();
        assert_eq!(event.id, EventId::from(id));
        assert_eq!(event.state, EventState::Open);
        assert_eq!(event.duration_minutes, Some(15));
    }

    #[test]
    fn unknown_state_is_invalid_row() {
        let err = Event::try_from(row("ARCHIVED")).unwrap_err();
        assert!(matches!(err, DbError::InvalidRow(_)));
    }
}
