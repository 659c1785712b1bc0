//! Coded error types for statement, pool and driver operations.
//!
//! Every failure surfaced by this crate is a [`QueryError`] carrying an
//! [`ErrorCode`] so callers can branch on the kind of failure instead of
//! matching on message text.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: Q{category}{number}
//! - 3xxx: Pool and connection errors (timeout, closed, creation failure)
//! - 4xxx: Transaction errors
//! - 5xxx: Statement and execution errors (bind, render, database)
//! - 6xxx: Data errors (row decoding)
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use quarry_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::value_not_supplied("id");
//! assert_eq!(err.code, ErrorCode::ValueNotSupplied);
//! assert_eq!(err.code.code(), "Q5003");
//! assert!(err.to_string().contains("id"));
//! ```

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Pool and connection errors (3xxx)
    /// Timed out waiting for a pooled connection (Q3001).
    PoolTimedOut = 3001,
    /// The pool is closing or closed (Q3002).
    PoolClosed = 3002,
    /// A background task driving the pool failed (Q3003).
    WorkerCrashed = 3003,
    /// The connection factory could not open a connection (Q3004).
    ConnectionFailed = 3004,
    /// The pooled handle was already released (Q3005).
    ConnectionClosed = 3005,
    /// The notification registry was closed (Q3006).
    RegistryClosed = 3006,

    // Transaction errors (4xxx)
    /// Transaction begin/commit/rollback failed (Q4001).
    TransactionFailed = 4001,
    /// Transaction already committed or rolled back (Q4002).
    TransactionClosed = 4002,

    // Statement and execution errors (5xxx)
    /// Positional index outside the discovered placeholders (Q5001).
    ParameterIndexOutOfBounds = 5001,
    /// Named parameter not present in the SQL text (Q5002).
    UnknownParameter = 5002,
    /// A discovered placeholder has no bound value (Q5003).
    ValueNotSupplied = 5003,
    /// No encoder is registered for the value's type (Q5004).
    UnsupportedValueType = 5004,
    /// The value cannot be represented in SQL (Q5005).
    InvalidValue = 5005,
    /// The database rejected the statement (Q5006).
    DatabaseError = 5006,

    // Data errors (6xxx)
    /// A result column is missing or has an unexpected shape (Q6001).
    RowDecode = 6001,

    // Configuration errors (7xxx)
    /// Invalid configuration (Q7001).
    InvalidConfiguration = 7001,

    // Internal errors (9xxx)
    /// Internal error (Q9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "Q3001").
    pub fn code(&self) -> String {
        format!("Q{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::PoolTimedOut => "Timed out acquiring a connection",
            Self::PoolClosed => "Connection pool closed",
            Self::WorkerCrashed => "Pool worker crashed",
            Self::ConnectionFailed => "Database connection failed",
            Self::ConnectionClosed => "Connection already released",
            Self::RegistryClosed => "Notification registry closed",
            Self::TransactionFailed => "Transaction failed",
            Self::TransactionClosed => "Transaction already closed",
            Self::ParameterIndexOutOfBounds => "Parameter index out of bounds",
            Self::UnknownParameter => "Unknown named parameter",
            Self::ValueNotSupplied => "Value not supplied",
            Self::UnsupportedValueType => "Unsupported value type",
            Self::InvalidValue => "Invalid value",
            Self::DatabaseError => "Database error",
            Self::RowDecode => "Row decode error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The parameter involved (`:name` or positional index).
    pub parameter: Option<String>,
    /// The SQL text (if available).
    pub sql: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
}

/// Errors that can occur during query operations.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Set the parameter involved.
    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.context.parameter = Some(parameter.into());
        self
    }

    /// Set the SQL text.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create an acquire timeout error.
    pub fn pool_timed_out(waited: Duration) -> Self {
        Self::new(
            ErrorCode::PoolTimedOut,
            format!(
                "Timed out after {}ms waiting for a pooled connection",
                waited.as_millis()
            ),
        )
        .with_suggestion("Increase max_connections or acquire_timeout in the pool options")
        .with_suggestion("Ensure connections are released after use")
    }

    /// Create a pool closed error.
    pub fn pool_closed() -> Self {
        Self::new(
            ErrorCode::PoolClosed,
            "The connection pool is already closed",
        )
    }

    /// Create a worker crashed error.
    pub fn worker_crashed(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::WorkerCrashed,
            format!("Pool worker crashed: {}", message.into()),
        )
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ConnectionFailed,
            format!("Connection error: {}", message.into()),
        )
        .with_suggestion("Check that the database server is running")
    }

    /// Create an error for a handle used after release.
    pub fn connection_closed() -> Self {
        Self::new(
            ErrorCode::ConnectionClosed,
            "The pooled connection has already been released",
        )
    }

    /// Create an error for a closed notification registry.
    pub fn registry_closed() -> Self {
        Self::new(
            ErrorCode::RegistryClosed,
            "The notification registry has been closed",
        )
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::TransactionFailed,
            format!("Transaction error: {}", message.into()),
        )
    }

    /// Create an error for a finished transaction.
    pub fn transaction_closed() -> Self {
        Self::new(
            ErrorCode::TransactionClosed,
            "The transaction has already been committed or rolled back",
        )
    }

    /// Create a positional index out of bounds error.
    pub fn index_out_of_bounds(index: usize, count: usize) -> Self {
        Self::new(
            ErrorCode::ParameterIndexOutOfBounds,
            format!(
                "Positional parameter index {} is out of bounds (statement has {} positional parameters)",
                index, count
            ),
        )
        .with_parameter(index.to_string())
    }

    /// Create an unknown named parameter error.
    pub fn unknown_parameter(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::UnknownParameter,
            format!("Named parameter ':{}' does not appear in the statement", name),
        )
        .with_parameter(name)
    }

    /// Create a missing value error for a named parameter or positional index.
    pub fn value_not_supplied(parameter: impl Into<String>) -> Self {
        let parameter = parameter.into();
        Self::new(
            ErrorCode::ValueNotSupplied,
            format!("Value not supplied for parameter '{}'", parameter),
        )
        .with_parameter(parameter)
    }

    /// Create an unsupported value type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self::new(
            ErrorCode::UnsupportedValueType,
            format!("No encoder registered for values of type '{}'", type_name),
        )
        .with_suggestion("Register an encoder for this type in the ValueEncoderRegistry")
    }

    /// Create an invalid value error.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidValue, message.into())
    }

    /// Create a general database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message.into())
    }

    /// Create a row decode error.
    pub fn row_decode(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RowDecode, message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidConfiguration,
            format!("Invalid configuration: {}", message.into()),
        )
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message.into()))
    }

    // ============== Error Checks ==============

    /// Check if this is an acquire timeout.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::PoolTimedOut
    }

    /// Check if this error was raised by the pool.
    pub fn is_pool_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::PoolTimedOut
                | ErrorCode::PoolClosed
                | ErrorCode::WorkerCrashed
                | ErrorCode::ConnectionFailed
                | ErrorCode::ConnectionClosed
        )
    }

    /// Check if this error was raised while binding or rendering a statement.
    pub fn is_statement_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ParameterIndexOutOfBounds
                | ErrorCode::UnknownParameter
                | ErrorCode::ValueNotSupplied
                | ErrorCode::UnsupportedValueType
                | ErrorCode::InvalidValue
        )
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::PoolTimedOut | ErrorCode::ConnectionFailed
        )
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = format!("Error [{}]: {}\n", self.code.code(), self.message);

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref parameter) = self.context.parameter {
            output.push_str(&format!("  → Parameter: {}\n", parameter));
        }
        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.chars().count() > 200 {
                format!("{}...", sql.chars().take(200).collect::<String>())
            } else {
                sql.clone()
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}
