//! Error types and SQLSTATE classification for the PostgreSQL backend.

use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for an aborted transaction (25P02,
/// `in_failed_sql_transaction`): every statement on the connection fails
/// until the transaction is rolled back or the connection is replaced.
pub const PG_ABORTED_TRANSACTION: &str = "25P02";

/// PostgreSQL error code for undefined table (42P01).
pub const PG_UNDEFINED_TABLE: &str = "42P01";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Checks if a sqlx error is "aborted transaction" (25P02).
///
/// This state is never recovered silently: at connection acquisition it
/// triggers a single reconnect, anywhere later it is fatal to the search.
pub fn is_aborted_transaction(err: &SqlxError) -> bool {
    has_pg_error_code(err, PG_ABORTED_TRANSACTION)
}

/// Checks if a sqlx error is "undefined table" (42P01).
pub fn is_undefined_table(err: &SqlxError) -> bool {
    has_pg_error_code(err, PG_UNDEFINED_TABLE)
}

/// Errors specific to the PostgreSQL backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] SqlxError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Pool error.
    #[error("Pool error: {message}")]
    Pool { message: String },

    /// Schema management error.
    #[error("Schema error: {message}")]
    Schema { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new pool error.
    #[must_use]
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool {
            message: message.into(),
        }
    }

    /// Creates a new schema error.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Returns `true` if the underlying cause is the aborted-transaction
    /// connection state.
    #[must_use]
    pub fn is_aborted_transaction(&self) -> bool {
        matches!(self, Self::Connection(err) if is_aborted_transaction(err))
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PostgresError::config("invalid URL");
        assert!(err.to_string().contains("Configuration error"));

        let err = PostgresError::pool("pool exhausted");
        assert!(err.to_string().contains("Pool error"));

        let err = PostgresError::schema("bad identifier");
        assert!(err.to_string().contains("Schema error"));
    }

    #[test]
    fn test_non_database_errors_have_no_pg_code() {
        let err = SqlxError::PoolTimedOut;
        assert!(!has_pg_error_code(&err, PG_ABORTED_TRANSACTION));
        assert!(!is_aborted_transaction(&err));
        assert!(!is_undefined_table(&err));
    }

    #[test]
    fn test_constructed_errors_are_not_aborted_transaction() {
        assert!(!PostgresError::config("x").is_aborted_transaction());
        assert!(!PostgresError::Connection(SqlxError::PoolTimedOut).is_aborted_transaction());
    }
}
