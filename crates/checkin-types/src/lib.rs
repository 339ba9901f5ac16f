//! Shared type definitions for the event check-in service.
//!
//! These types cross every crate boundary: the state calculator and
//! reconciler in `checkin-core`, the `PostgreSQL` store in `checkin-db`, and
//! the operator API in `checkin-api`. The serializable ones also export
//! TypeScript bindings for the frontend via [`ts_rs`].
//!
//! # Modules
//!
//! - [`ids`] -- Strongly-typed event identifier.
//! - [`enums`] -- Event lifecycle state.
//! - [`structs`] -- Event records, batch updates, and state details.

pub mod enums;
pub mod ids;
pub mod structs;

pub use enums::{EventState, ParseEventStateError};
pub use ids::EventId;
pub use structs::{
    Event, EventStateDetails, EventUpdate, StateFlags, StateTiming, TimeRemaining,
    MAX_DURATION_MINUTES, MIN_DURATION_MINUTES,
};
