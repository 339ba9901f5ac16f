//! Operator HTTP API for the check-in event state scheduler.
//!
//! A small Axum surface that lets an operator inspect and drive the
//! background sync: scheduler status and health, start/stop, a manual sync,
//! and per-event state inspection and override.
//!
//! # Modules
//!
//! - [`error`] -- [`ApiError`] and its JSON response mapping
//! - [`handlers`] -- Request handlers
//! - [`router`] -- Route table and middleware
//! - [`server`] -- TCP bind and serve with graceful shutdown
//! - [`state`] -- Shared [`AppState`]

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use server::{ServeError, ServerConfig, start_server};
pub use state::AppState;
