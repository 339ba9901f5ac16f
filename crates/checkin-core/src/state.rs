//! Pure mapping from an event's schedule to its check-in state.
//!
//! An event with `start_time = S` and `duration_minutes = D` occupies the
//! half-open window `[S, S + D minutes)`:
//!
//! - `now < S` -- `CLOSED` (not yet begun)
//! - `S <= now < S + D` -- `OPEN` (in progress)
//! - `now >= S + D` -- `CLOSED` (finished)
//!
//! A schedule that is missing or out of range never raises. It is logged
//! and calculated as `CLOSED`, so one malformed row cannot stall a sync pass.

use chrono::{DateTime, Utc};
use checkin_types::{
    Event, EventState, EventStateDetails, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES,
    StateFlags, StateTiming, TimeRemaining,
};
use tracing::warn;

/// Why an event's schedule could not be resolved to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MalformedSchedule {
    /// `start_time` is absent.
    #[error("missing start_time")]
    MissingStartTime,

    /// `duration_minutes` is absent.
    #[error("missing duration_minutes")]
    MissingDuration,

    /// `duration_minutes` lies outside 1 to 1440.
    #[error("duration_minutes {0} outside 1..=1440")]
    DurationOutOfRange(i32),

    /// `start_time + duration` is not representable.
    #[error("end time overflows")]
    EndTimeOverflow,
}

/// The half-open interval during which an event accepts check-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
    /// Length in minutes.
    pub duration_minutes: i32,
}

impl Window {
    /// Resolve the window of `event`.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedSchedule`] when either scheduling field is missing,
    /// the duration is out of range, or the end instant overflows.
    pub fn of(event: &Event) -> Result<Self, MalformedSchedule> {
        let start = event.start_time.ok_or(MalformedSchedule::MissingStartTime)?;
        let duration_minutes = event
            .duration_minutes
            .ok_or(MalformedSchedule::MissingDuration)?;
        if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration_minutes) {
            return Err(MalformedSchedule::DurationOutOfRange(duration_minutes));
        }
        let end = event.end_time().ok_or(MalformedSchedule::EndTimeOverflow)?;
        Ok(Self {
            start,
            end,
            duration_minutes,
        })
    }

    /// The state this window implies at `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> EventState {
        if self.start <= now && now < self.end {
            EventState::Open
        } else {
            EventState::Closed
        }
    }
}

/// Calculate the state of `event` against the current wall-clock time.
pub fn calculate_state(event: &Event) -> EventState {
    calculate_state_at(event, Utc::now())
}

/// Calculate the state of `event` at a given instant.
///
/// Deterministic for a fixed `now`; the only side effect is a warning when
/// the schedule is malformed.
pub fn calculate_state_at(event: &Event, now: DateTime<Utc>) -> EventState {
    match Window::of(event) {
        Ok(window) => window.state_at(now),
        Err(reason) => {
            warn!(
                event_id = %event.id,
                %reason,
                "Invalid event schedule for state calculation, treating as CLOSED"
            );
            EventState::Closed
        }
    }
}

/// Build a diagnostic breakdown of `event` at `now`.
pub fn state_details_at(event: &Event, now: DateTime<Utc>) -> EventStateDetails {
    let calculated_state = calculate_state_at(event, now);

    let (timing, status) = Window::of(event).map_or((None, StateFlags::default()), |window| {
        let until_start = window.start.signed_duration_since(now).num_milliseconds();
        let until_end = window.end.signed_duration_since(now).num_milliseconds();
        let timing = StateTiming {
            start_time: window.start,
            end_time: window.end,
            duration_minutes: window.duration_minutes,
            time_until_start: TimeRemaining {
                ms: until_start,
                formatted: if until_start < 0 {
                    String::from("Already started")
                } else {
                    format_remaining(until_start)
                },
            },
            time_until_end: TimeRemaining {
                ms: until_end,
                formatted: format_remaining(until_end),
            },
        };
        let status = StateFlags {
            started: now >= window.start,
            ended: now >= window.end,
            in_progress: window.state_at(now) == EventState::Open,
        };
        (Some(timing), status)
    });

    EventStateDetails {
        id: event.id,
        title: event.title.clone(),
        current_state: event.state,
        calculated_state,
        state_matches_calculation: event.state == calculated_state,
        now,
        timing,
        status,
    }
}

/// Render a millisecond span using its two most significant units.
///
/// Negative spans render as `"Finished"`.
pub fn format_remaining(ms: i64) -> String {
    if ms < 0 {
        return String::from("Finished");
    }
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{days}d {}h", hours % 24)
    } else if hours > 0 {
        format!("{hours}h {}m", minutes % 60)
    } else if minutes > 0 {
        format!("{minutes}m {}s", seconds % 60)
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::TimeDelta;
    use checkin_types::EventId;

    use super::*;

    fn event(start: Option<DateTime<Utc>>, duration: Option<i32>) -> Event {
        Event {
            id: EventId::new(),
            title: String::from("Workshop"),
            start_time: start,
            duration_minutes: duration,
            state: EventState::Open,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn window_boundaries() {
        let t = Utc::now();
        let d = 90;
        let e = event(Some(t), Some(d));
        let end = t + TimeDelta::minutes(i64::from(d));
        let ms = TimeDelta::milliseconds(1);

        assert_eq!(calculate_state_at(&e, t - ms), EventState::Closed);
        assert_eq!(calculate_state_at(&e, t), EventState::Open);
        assert_eq!(calculate_state_at(&e, end - ms), EventState::Open);
        assert_eq!(calculate_state_at(&e, end), EventState::Closed);
    }

    #[test]
    fn far_past_and_future_are_closed() {
        let t = Utc::now();
        let e = event(Some(t), Some(30));
        assert_eq!(
            calculate_state_at(&e, t - TimeDelta::days(400)),
            EventState::Closed
        );
        assert_eq!(
            calculate_state_at(&e, t + TimeDelta::days(400)),
            EventState::Closed
        );
    }

    #[test]
    fn missing_start_time_is_closed() {
        let e = event(None, Some(60));
        assert_eq!(calculate_state(&e), EventState::Closed);
        assert_eq!(Window::of(&e), Err(MalformedSchedule::MissingStartTime));
    }

    #[test]
    fn missing_duration_is_closed() {
        let e = event(Some(Utc::now()), None);
        assert_eq!(calculate_state(&e), EventState::Closed);
        assert_eq!(Window::of(&e), Err(MalformedSchedule::MissingDuration));
    }

    #[test]
    fn out_of_range_duration_is_closed() {
        let now = Utc::now();
        for bad in [0, -5, 1441] {
            let e = event(Some(now), Some(bad));
            assert_eq!(calculate_state_at(&e, now), EventState::Closed);
            assert_eq!(
                Window::of(&e),
                Err(MalformedSchedule::DurationOutOfRange(bad))
            );
        }
    }

    #[test]
    fn extreme_durations_are_accepted() {
        let now = Utc::now();
        let shortest = event(Some(now), Some(MIN_DURATION_MINUTES));
        let longest = event(Some(now), Some(MAX_DURATION_MINUTES));
        assert_eq!(calculate_state_at(&shortest, now), EventState::Open);
        assert_eq!(
            calculate_state_at(&longest, now + TimeDelta::hours(23)),
            EventState::Open
        );
    }

    #[test]
    fn overflowing_end_is_closed() {
        let e = event(Some(DateTime::<Utc>::MAX_UTC), Some(60));
        assert_eq!(Window::of(&e), Err(MalformedSchedule::EndTimeOverflow));
        assert_eq!(
            calculate_state_at(&e, DateTime::<Utc>::MAX_UTC),
            EventState::Closed
        );
    }

    #[test]
    fn format_remaining_units() {
        assert_eq!(format_remaining(-1), "Finished");
        assert_eq!(format_remaining(0), "0s");
        assert_eq!(format_remaining(8_999), "8s");
        assert_eq!(format_remaining(7 * 60_000 + 12_000), "7m 12s");
        assert_eq!(format_remaining(4 * 3_600_000 + 5 * 60_000), "4h 5m");
        assert_eq!(format_remaining(2 * 86_400_000 + 3 * 3_600_000), "2d 3h");
    }

    #[test]
    fn details_for_upcoming_event() {
        let now = Utc::now();
        let mut e = event(Some(now + TimeDelta::minutes(5)), Some(10));
        e.state = EventState::Open;

        let details = state_details_at(&e, now);
        assert_eq!(details.calculated_state, EventState::Closed);
        assert!(!details.state_matches_calculation);

        let timing = details.timing.unwrap();
        assert_eq!(timing.time_until_start.ms, 5 * 60_000);
        assert_eq!(timing.time_until_start.formatted, "5m 0s");
        assert_eq!(timing.time_until_end.formatted, "15m 0s");
        assert_eq!(details.status, StateFlags::default());
    }

    #[test]
    fn details_for_running_and_finished_event() {
        let now = Utc::now();
        let e = event(Some(now - TimeDelta::minutes(5)), Some(10));

        let running = state_details_at(&e, now);
        let timing = running.timing.unwrap();
        assert_eq!(timing.time_until_start.formatted, "Already started");
        assert!(running.status.started && running.status.in_progress);
        assert!(!running.status.ended);
        assert!(running.state_matches_calculation);

        let finished = state_details_at(&e, now + TimeDelta::hours(1));
        assert_eq!(finished.timing.unwrap().time_until_end.formatted, "Finished");
        assert!(finished.status.ended && !finished.status.in_progress);
        assert_eq!(finished.calculated_state, EventState::Closed);
    }

    #[test]
    fn details_for_malformed_event() {
        let e = event(None, Some(60));
        let details = state_details_at(&e, Utc::now());
        assert!(details.timing.is_none());
        assert_eq!(details.calculated_state, EventState::Closed);
        assert_eq!(details.status, StateFlags::default());
    }
}
