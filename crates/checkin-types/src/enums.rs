//! Enumeration types for the check-in service.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Check-in availability of an event.
///
/// `Open` and `Closed` are derived from the event's schedule and owned by the
/// state reconciler. `Draft` belongs to the authoring flow; the reconciler
/// never reads or writes draft events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export, export_to = "bindings/")]
pub enum EventState {
    /// Not yet published. Ignored by reconciliation.
    Draft,
    /// Accepting check-ins.
    Open,
    /// Not accepting check-ins (not started yet, or finished).
    Closed,
}

impl EventState {
    /// The canonical upper-case name, matching the `PostgreSQL` enum label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }

    /// Whether the reconciler is responsible for this state.
    pub const fn is_managed(self) -> bool {
        matches!(self, Self::Open | Self::Closed)
    }
}

impl core::fmt::Display for EventState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name an [`EventState`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid event state: {0:?} (expected DRAFT, OPEN or CLOSED)")]
pub struct ParseEventStateError(pub String);

impl FromStr for EventState {
    type Err = ParseEventStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => Err(ParseEventStateError(other.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_upper_case() {
        let json = serde_json::to_string(&EventState::Open).unwrap();
        assert_eq!(json, "\"OPEN\"");
        let back: EventState = serde_json::from_str("\"CLOSED\"").unwrap();
        assert_eq!(back, EventState::Closed);
    }

    #[test]
    fn parse_matches_as_str() {
        for state in [EventState::Draft, EventState::Open, EventState::Closed] {
            assert_eq!(state.as_str().parse::<EventState>().unwrap(), state);
        }
    }

    #[test]
    fn parse_is_case_sensitive() {
        let err = "open".parse::<EventState>().unwrap_err();
        assert_eq!(err, ParseEventStateError("open".to_owned()));
    }

    #[test]
    fn draft_is_not_managed() {
        assert!(!EventState::Draft.is_managed());
        assert!(EventState::Open.is_managed());
        assert!(EventState::Closed.is_managed());
    }
}
