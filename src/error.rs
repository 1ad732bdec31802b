//! # Store Errors
//!
//! Shared error taxonomy for both backends. Every public store operation
//! either succeeds or returns one of these variants; the store never
//! logs-and-swallows an error that should reach the caller.

use std::fmt;

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Detail carried by validation failures: which field, what was expected,
/// what was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDetails {
    /// Offending field name
    pub field: String,
    /// Expected type or condition
    pub expected: String,
    /// Actual value or type found
    pub actual: String,
}

impl ValidationDetails {
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            expected: "field to be present".into(),
            actual: "missing".into(),
        }
    }

    pub fn missing_id() -> Self {
        Self {
            field: "id".into(),
            expected: "caller-supplied id".into(),
            actual: "missing".into(),
        }
    }

    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn duplicate_value(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            expected: "unique value".into(),
            actual: format!("duplicate value '{}'", value.into()),
        }
    }
}

impl fmt::Display for ValidationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field '{}': expected {}, got {}",
            self.field, self.expected, self.actual
        )
    }
}

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Table or record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Table already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Record or schema failed validation
    #[error("validation failed: {0}")]
    Validation(ValidationDetails),

    /// Unsupported or malformed configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem or serialization failure, wrapping the underlying cause
    #[error("i/o failure: {message}")]
    Io {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Backend connect or health-check failure
    #[error("connection failure: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Reserved; not raised by normal paths
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an already exists error
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Create a validation error
    pub fn validation(details: ValidationDetails) -> Self {
        Self::Validation(details)
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an I/O error wrapping its cause
    pub fn io(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Io {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Create a connection error wrapping its cause
    pub fn connection(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Connection error for a store that has been closed
    pub fn closed() -> Self {
        Self::Connection {
            message: "store is closed".into(),
            source: None,
        }
    }

    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io { .. } => "IO_ERROR",
            Self::Connection { .. } => "CONNECTION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
