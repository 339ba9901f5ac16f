//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`], which wraps the underlying
//! [`sqlx`] errors. At the store boundary a [`DbError`] is folded into a
//! [`StoreError`] so the reconciler can tell an unreachable database from a
//! failing query.

use checkin_core::StoreError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A row held a value the domain types cannot represent.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Whether the failure means the database could not be reached at all.
    pub const fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Postgres(
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            )
        )
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if err.is_unavailable() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_unavailable() {
        let err: StoreError = DbError::Postgres(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(err, StoreError::Unavailable(_)));
        let err: StoreError = DbError::Postgres(sqlx::Error::PoolClosed).into();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn io_errors_are_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: StoreError = DbError::Postgres(sqlx::Error::Io(io)).into();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn query_errors_are_backend() {
        let err: StoreError = DbError::Postgres(sqlx::Error::RowNotFound).into();
        assert!(matches!(err, StoreError::Backend(_)));
        let err: StoreError = DbError::InvalidRow(String::from("bad state")).into();
        assert_eq!(err, StoreError::Backend(String::from("Invalid row: bad state")));
    }
}
