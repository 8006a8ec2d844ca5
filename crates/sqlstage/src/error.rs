//! Error types for sqlstage
//!
//! Request building only ever fails with [`Error::Configuration`]
//! (invalid-configuration). The remaining variants belong to the
//! execution side (engine, connections, runner) and carry enough
//! classification for callers to decide on retries themselves.

use std::fmt;
use thiserror::Error;

/// Result type for sqlstage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid stage configuration (raised at build time)
    Configuration,
    /// Credentials could not be loaded or are unusable
    Credentials,
    /// Schema parsing or tuple shaping errors
    Schema,
    /// Connection-related errors (retriable)
    Connection,
    /// Statement execution errors
    Query,
    /// Transaction errors
    Transaction,
    /// Type conversion errors (not retriable)
    TypeConversion,
    /// Filesystem errors
    Io,
    /// Unknown/other errors
    Other,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection)
    }
}

/// Main error type for sqlstage
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Stage configuration rejected before anything was submitted
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// Credentials missing, unreadable or malformed
    #[error("credentials error: {message}")]
    Credentials {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Schema error (bad type name, unknown attribute)
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Connection failed
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Statement execution failed
    #[error("query error: {message}")]
    Query { message: String, sql: Option<String> },

    /// Transaction error
    #[error("transaction error: {message}")]
    Transaction { message: String },

    /// Type conversion failed
    #[error("type conversion error: {message}")]
    TypeConversion { message: String },

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Credentials { .. } => ErrorCategory::Credentials,
            Self::Schema { .. } => ErrorCategory::Schema,
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Query { .. } => ErrorCategory::Query,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::TypeConversion { .. } => ErrorCategory::TypeConversion,
            Self::Io(_) => ErrorCategory::Io,
            Self::Internal { .. } => ErrorCategory::Other,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Whether this is an invalid-configuration error
    #[inline]
    pub fn is_invalid_configuration(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a credentials error
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials {
            message: message.into(),
            source: None,
        }
    }

    /// Create a credentials error with source
    pub fn credentials_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Credentials {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a query error with SQL
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create a type conversion error
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "invalid_configuration"),
            Self::Credentials => write!(f, "credentials"),
            Self::Schema => write!(f, "schema"),
            Self::Connection => write!(f, "connection"),
            Self::Query => write!(f, "query"),
            Self::Transaction => write!(f, "transaction"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Io => write!(f, "io"),
            Self::Other => write!(f, "other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retriable() {
        assert!(ErrorCategory::Connection.is_retriable());

        assert!(!ErrorCategory::Configuration.is_retriable());
        assert!(!ErrorCategory::Query.is_retriable());
        assert!(!ErrorCategory::TypeConversion.is_retriable());
    }

    #[test]
    fn test_config_error_is_invalid_configuration() {
        let err = Error::config("driver library missing");
        assert!(err.is_invalid_configuration());
        assert!(!err.is_retriable());
        assert_eq!(err.category().to_string(), "invalid_configuration");
    }

    #[test]
    fn test_error_display() {
        let err = Error::connection("connection refused");
        assert!(err.to_string().contains("connection refused"));

        let err = Error::query_with_sql("syntax error", "SELEC 1");
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.category(), ErrorCategory::Io);
    }
}
