//! Core data structures shared across the check-in service.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::EventState;
use crate::ids::EventId;

/// Shortest schedulable event, in minutes.
pub const MIN_DURATION_MINUTES: i32 = 1;

/// Longest schedulable event (24 hours), in minutes.
pub const MAX_DURATION_MINUTES: i32 = 1440;

/// An event as seen by state reconciliation.
///
/// The scheduling fields are optional because rows written by other
/// collaborators are not guaranteed to be well-formed. A missing or
/// out-of-range schedule makes the event calculate as [`EventState::Closed`]
/// rather than failing the whole sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Unique identifier.
    pub id: EventId,
    /// Display title, carried through for logging and details.
    pub title: String,
    /// Scheduled start.
    pub start_time: Option<DateTime<Utc>>,
    /// Scheduled length in minutes (1 to 1440).
    pub duration_minutes: Option<i32>,
    /// Stored check-in state.
    pub state: EventState,
    /// When the row was last rewritten.
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Scheduled end (`start_time + duration_minutes`), when both are set,
    /// the duration is in range, and the sum is representable.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        let start = self.start_time?;
        let minutes = self
            .duration_minutes
            .filter(|m| (MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(m))?;
        TimeDelta::try_minutes(i64::from(minutes)).and_then(|d| start.checked_add_signed(d))
    }
}

/// One entry of a batch state update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventUpdate {
    /// The event to rewrite.
    pub id: EventId,
    /// The state to write.
    pub state: EventState,
}

/// A span of time until some instant, with a human-readable rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TimeRemaining {
    /// Milliseconds until the instant; negative once it has passed.
    pub ms: i64,
    /// Rendering such as `"2d 3h"`, `"5m 12s"` or `"Finished"`.
    pub formatted: String,
}

/// Resolved schedule of an event relative to a sampled `now`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StateTiming {
    /// Scheduled start.
    pub start_time: DateTime<Utc>,
    /// Scheduled end (start plus duration).
    pub end_time: DateTime<Utc>,
    /// Scheduled length in minutes.
    pub duration_minutes: i32,
    /// Time until the event starts.
    pub time_until_start: TimeRemaining,
    /// Time until the event ends.
    pub time_until_end: TimeRemaining,
}

/// Coarse progress flags for an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StateFlags {
    /// `now >= start_time`.
    pub started: bool,
    /// `now >= end_time`.
    pub ended: bool,
    /// `start_time <= now < end_time`.
    pub in_progress: bool,
}

/// Diagnostic view of an event's stored versus calculated state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventStateDetails {
    /// The event.
    pub id: EventId,
    /// Display title.
    pub title: String,
    /// The state currently stored.
    pub current_state: EventState,
    /// The state derived from the schedule at `now`.
    pub calculated_state: EventState,
    /// Whether stored and derived state agree.
    pub state_matches_calculation: bool,
    /// The instant the calculation was made against.
    pub now: DateTime<Utc>,
    /// Schedule breakdown, absent when the schedule is malformed.
    pub timing: Option<StateTiming>,
    /// Progress flags (all false when the schedule is malformed).
    pub status: StateFlags,
}
