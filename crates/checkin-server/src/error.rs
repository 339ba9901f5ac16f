//! Error types for the server binary.

/// Top-level error for the server binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: checkin_core::ConfigError,
    },

    /// Database connection or migration failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying database error.
        #[from]
        source: checkin_db::DbError,
    },

    /// The operator API failed to bind or serve.
    #[error("api error: {source}")]
    Api {
        /// The underlying server error.
        #[from]
        source: checkin_api::ServeError,
    },

    /// Logging could not be initialized.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
