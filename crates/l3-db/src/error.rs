//! Error types for L3 data-layer operations.
//!
//! All errors implement `std::error::Error` via `thiserror`. Client errors
//! ([`L3Error::NotFound`], [`L3Error::BadRequest`]) are raised before any
//! state is touched; everything else comes from the storage layer.

use std::io;
use thiserror::Error;

/// Result type alias for L3 operations.
pub type L3Result<T> = Result<T, L3Error>;

/// Errors that can occur during L3 data-layer operations.
#[derive(Debug, Error)]
pub enum L3Error {
    /// The referenced resource does not exist.
    #[error("{resource} {id} could not be found")]
    NotFound {
        /// Resource kind (e.g., "router", "port").
        resource: String,
        /// The identifier that did not resolve.
        id: String,
    },

    /// The request was rejected by validation.
    #[error("Bad {resource} request: {msg}")]
    BadRequest {
        /// Resource kind the request targeted.
        resource: String,
        /// Validation message.
        msg: String,
    },

    /// A table-level constraint rejected a commit.
    #[error("Constraint violation on {table}: {message}")]
    ConstraintViolation {
        /// The table whose constraint failed.
        table: String,
        /// Error message.
        message: String,
    },

    /// Storage operation failed.
    #[error("Database operation failed: {operation}: {message}")]
    Database {
        /// The operation that failed (e.g., "commit", "insert").
        operation: String,
        /// Error message.
        message: String,
    },

    /// Schema migration failed.
    #[error("Schema migration failed: {message}")]
    Schema {
        /// Error message.
        message: String,
    },

    /// Reading or writing a snapshot file failed.
    #[error("Snapshot I/O failed for '{path}': {source}")]
    Io {
        /// The snapshot path.
        path: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Snapshot (de)serialization failed.
    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl L3Error {
    /// Creates a not-found error.
    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Creates a bad-request error.
    pub fn bad_request(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::BadRequest {
            resource: resource.into(),
            msg: msg.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a database error.
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates an IO error for a snapshot path.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the caller's request was at fault rather than the
    /// storage layer.
    pub fn is_client_error(&self) -> bool {
        matches!(self, L3Error::NotFound { .. } | L3Error::BadRequest { .. })
    }
}
