//! Unified error handling for the wavescope crate
//!
//! This module provides a unified error type that consolidates the
//! domain-specific errors into a single `Error` enum, while keeping the
//! analytics error available on its own where a component needs it.
//!
//! # Architecture
//!
//! - [`WaveErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use wavescope::error::{Error, WaveErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying trend derivation: {err}");
//!     } else {
//!         eprintln!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::analytics::AnalyticsError;

/// Common trait for all wavescope error types
pub trait WaveErrorTrait: std::error::Error {
    /// Check if this error is recoverable (the whole trend derivation can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Persistence store errors
    Storage,
    /// Serialization and payload decoding errors
    Parsing,
    /// Configuration and validation errors
    Config,
    /// Statistical computation errors
    Analytics,
    /// Deadline exceeded while waiting on I/O
    Timeout,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get string representation, used as a metrics label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Parsing => "parsing",
            Self::Config => "config",
            Self::Analytics => "analytics",
            Self::Timeout => "timeout",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the wavescope crate
#[derive(Error, Debug)]
pub enum Error {
    /// Statistical analysis errors
    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// A store operation did not finish before the caller's deadline
    #[error("Store operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl WaveErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Analytics(_) => false,
            Self::Database(_) => true, // store unreachable / busy; upserts are idempotent
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Timeout { .. } => true,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Analytics(_) => ErrorCategory::Analytics,
            Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error for a named store operation
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

// Conversion from rusqlite::Error
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let db_err = Error::Database(rusqlite::Error::InvalidQuery);
        assert_eq!(db_err.category(), ErrorCategory::Storage);

        let analytics_err = Error::Analytics(AnalyticsError::InsufficientData {
            needed: 5,
            actual: 3,
        });
        assert_eq!(analytics_err.category(), ErrorCategory::Analytics);
    }

    #[test]
    fn test_is_recoverable() {
        let db_err = Error::Database(rusqlite::Error::InvalidQuery);
        assert!(db_err.is_recoverable());

        let timeout = Error::timeout("query_series", std::time::Duration::from_secs(2));
        assert!(timeout.is_recoverable());
        assert_eq!(timeout.category(), ErrorCategory::Timeout);

        let analytics_err = Error::Analytics(AnalyticsError::InsufficientData {
            needed: 10,
            actual: 2,
        });
        assert!(!analytics_err.is_recoverable());
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::timeout("upsert_variants", std::time::Duration::from_millis(1500));
        assert_eq!(
            err.to_string(),
            "Store operation 'upsert_variants' timed out after 1500ms"
        );
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let unified: Error = json_err.into();
        assert!(matches!(unified, Error::Json(_)));
        assert!(!unified.is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("max_concurrent_trends must be greater than 0");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(ErrorCategory::Other.as_str(), "other");
    }
}
