//! `PostgreSQL` persistence for the check-in service.
//!
//! ```text
//! Reconciler
//!     |
//!     +-- EventStateStore --> PgEventStore
//!                                 |
//!                                 +-- PostgresPool (sqlx::PgPool)
//!                                         +-- events table
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool, configuration and migrations
//! - [`event_store`] -- [`PgEventStore`], the `EventStateStore` implementation
//! - [`error`] -- Shared error types

pub mod error;
pub mod event_store;
pub mod postgres;

pub use error::DbError;
pub use event_store::{EventRow, PgEventStore};
pub use postgres::{PostgresConfig, PostgresPool};
