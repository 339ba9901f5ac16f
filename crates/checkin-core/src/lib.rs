//! Event state synchronization for the check-in service.
//!
//! An event accepts check-ins (`OPEN`) exactly while the current time lies
//! inside its scheduled window, and is `CLOSED` otherwise. Nothing mutates
//! the stored state when a window opens or closes, so this crate keeps it
//! honest in the background:
//!
//! ```text
//! Scheduler tick
//!     |
//!     +-- health gate --> Reconciler::health_check
//!     |
//!     +-- sync pass ----> Reconciler::sync_all
//!         |-- find_drifted    (store read + calculate_state per event)
//!         +-- batch_update    (per-record writes, failures isolated)
//! ```
//!
//! # Modules
//!
//! - [`clock`] -- Time source abstraction ([`SystemClock`], [`ManualClock`]).
//! - [`config`] -- Configuration loading from `checkin-config.yaml`.
//! - [`memory`] -- In-memory [`EventStateStore`] for tests and local runs.
//! - [`reconciler`] -- Drift detection and state write-back.
//! - [`scheduler`] -- Fixed-cadence driver with start/stop and manual trigger.
//! - [`state`] -- Pure schedule-to-state calculation.
//! - [`store`] -- The [`EventStateStore`] data-access contract.
//!
//! [`SystemClock`]: clock::SystemClock
//! [`ManualClock`]: clock::ManualClock
//! [`EventStateStore`]: store::EventStateStore

pub mod clock;
pub mod config;
pub mod memory;
pub mod reconciler;
pub mod scheduler;
pub mod state;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CheckinConfig, ConfigError, LogFormat};
pub use memory::InMemoryEventStore;
pub use reconciler::{
    BatchError, BatchResult, HealthReport, HealthStatus, ReconcileError, Reconciler, SyncResult,
};
pub use scheduler::{
    Scheduler, SchedulerConfig, SchedulerStatus, StartOutcome, StopOutcome, TickOutcome,
    TickReport,
};
pub use store::{EventStateStore, StoreError};
