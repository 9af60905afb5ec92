//! Error types for pgrecord.
//!
//! Every fallible operation returns [`DbResult`]. Lifecycle and cardinality
//! failures get their own variants; errors raised by the PostgreSQL driver are
//! carried through untouched in [`DbError::Driver`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection already established: close the current connection before opening another")]
    ConnectionAlreadyEstablished,

    #[error(
        "Connection not established: open a session or enable auto_create_connection before running queries"
    )]
    ConnectionNotEstablished,

    #[error("Did not receive any records for query: {query}")]
    NoRecordsReturned { query: String },

    #[error("Received two or more records for query: {query}")]
    MultipleRecordsReturned { query: String },

    #[error("Could not marshall record {record} into model {model}")]
    MarshallRecord {
        /// JSON rendering of the row that failed to marshal
        record: String,
        model: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Driver(#[from] sqlx::Error),

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },
}

impl DbError {
    /// Create a no-records error for the given query text.
    pub fn no_records(query: impl Into<String>) -> Self {
        Self::NoRecordsReturned {
            query: query.into(),
        }
    }

    /// Create a multiple-records error for the given query text.
    pub fn multiple_records(query: impl Into<String>) -> Self {
        Self::MultipleRecordsReturned {
            query: query.into(),
        }
    }

    /// Create a marshalling error carrying the offending record.
    pub fn marshall_record(
        record: &serde_json::Value,
        model: &'static str,
        source: serde_json::Error,
    ) -> Self {
        let record =
            serde_json::to_string(record).unwrap_or_else(|_| "<unprintable record>".to_string());
        Self::MarshallRecord {
            record,
            model,
            source,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an invalid credentials error.
    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::InvalidCredentials {
            message: message.into(),
        }
    }

    /// Check if this error came from the driver.
    pub fn is_driver_error(&self) -> bool {
        matches!(self, Self::Driver(_))
    }

    /// SQLSTATE code of a database error reported by the server, e.g. "23505".
    pub fn sql_state(&self) -> Option<String> {
        match self {
            Self::Driver(sqlx::Error::Database(db_err)) => db_err.code().map(|c| c.to_string()),
            _ => None,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = DbError::no_records("select 1");
        assert_eq!(
            err.to_string(),
            "Did not receive any records for query: select 1"
        );

        let err = DbError::multiple_records("select * from users");
        assert!(err.to_string().contains("two or more records"));
    }

    #[test]
    fn test_marshall_record_includes_record_and_model() {
        let row = json!({"id": "not-a-number"});
        let source = serde_json::from_value::<u32>(json!("x")).unwrap_err();

        let err = DbError::marshall_record(&row, "User", source);
        let message = err.to_string();
        assert!(message.contains(r#"{"id":"not-a-number"}"#));
        assert!(message.contains("User"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_driver_error_is_transparent() {
        let err = DbError::from(sqlx::Error::Protocol("unexpected message".to_string()));
        assert!(err.is_driver_error());
        assert!(err.to_string().contains("unexpected message"));
        assert_eq!(err.sql_state(), None);
    }

    #[test]
    fn test_lifecycle_errors_are_not_driver_errors() {
        assert!(!DbError::ConnectionAlreadyEstablished.is_driver_error());
        assert!(!DbError::ConnectionNotEstablished.is_driver_error());
        assert!(!DbError::timeout("query", 30).is_driver_error());
    }
}
