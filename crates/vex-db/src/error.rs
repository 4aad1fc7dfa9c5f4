//! Error types for the vex-db crate.
//!
//! Provides a unified error type that wraps `SQLx` errors with additional context.

use thiserror::Error;

/// Database operation errors.
///
/// # Example
///
/// ```rust
/// use vex_db::DbError;
///
/// fn describe(err: &DbError) -> &'static str {
///     match err {
///         DbError::ConnectionFailed(_) => "cannot connect",
///         DbError::QueryFailed(_) => "query error",
///         DbError::NotFound(_) => "missing",
///         DbError::ValidationFailed(_) => "invalid data",
///         DbError::Conflict(_) => "constraint violated",
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation failed, either locally or by a data exception in Postgres.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// An integrity constraint was violated (unique flag key, foreign key).
    #[error("Constraint violated: {0}")]
    Conflict(String),
}

impl DbError {
    /// Map a raw `sqlx` error, turning `RowNotFound` into `NotFound` and
    /// Postgres SQLSTATE classes 22/23 into validation and conflict errors.
    pub fn from_query(err: sqlx::Error, what: impl Into<String>) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound(what.into()),
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.to_string()).unwrap_or_default();
                if code.starts_with("22") {
                    DbError::ValidationFailed(db.message().to_string())
                } else if code.starts_with("23") {
                    DbError::Conflict(db.message().to_string())
                } else {
                    DbError::QueryFailed(sqlx::Error::Database(db))
                }
            }
            other => DbError::QueryFailed(other),
        }
    }

    /// Check if this error indicates a connection problem.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DbError::ConnectionFailed(_))
    }

    /// Check if this error indicates a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }

    /// Check if this error indicates a validation error.
    #[must_use]
    pub fn is_validation_failed(&self) -> bool {
        matches!(self, DbError::ValidationFailed(_))
    }
}
