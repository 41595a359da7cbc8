//! Unified error handling for the numlog crate
//!
//! Each module defines its own error enum; this module gathers them into a
//! single [`Error`] for callers that cross module boundaries.
//!
//! - [`NumlogErrorTrait`] - common interface implemented by all error types
//! - [`ErrorCategory`] - classification of errors for handling strategies
//! - [`Error`] - unified error enum wrapping all domain-specific errors

use std::io;
use thiserror::Error;

pub use crate::protocol::ProtocolError;
pub use crate::server::ServerError;
pub use crate::storage::StorageError;

/// Common trait for numlog error types
pub trait NumlogErrorTrait: std::error::Error {
    /// Check if this error is recoverable (the process can keep serving)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Socket and listener errors
    Network,
    /// Malformed client input
    Protocol,
    /// Code log I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the numlog crate
#[derive(Error, Debug)]
pub enum Error {
    /// Client input violated the line protocol
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Code log errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Listener errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Errors from anyhow-based glue code
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NumlogErrorTrait for ProtocolError {
    fn is_recoverable(&self) -> bool {
        // Only the offending connection is closed
        true
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Protocol
    }
}

impl NumlogErrorTrait for StorageError {
    fn is_recoverable(&self) -> bool {
        true
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

impl NumlogErrorTrait for ServerError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Config,
            Self::Bind { .. } | Self::Listener(_) => ErrorCategory::Network,
            Self::Storage(_) => ErrorCategory::Storage,
        }
    }
}

impl NumlogErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Protocol(e) => e.is_recoverable(),
            Self::Storage(e) => e.is_recoverable(),
            Self::Server(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Config(_) | Self::Other(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Protocol(e) => e.category(),
            Self::Storage(e) => e.category(),
            Self::Server(e) => e.category(),
            Self::Io(_) => ErrorCategory::Network,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_category() {
        let err = Error::from(ProtocolError::InvalidLength(8));
        assert_eq!(err.category(), ErrorCategory::Protocol);
        assert!(err.is_recoverable());

        let err = Error::from(StorageError::io(
            "append",
            Path::new("numbers.log"),
            io::Error::new(io::ErrorKind::Other, "disk full"),
        ));
        assert_eq!(err.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_server_error_category() {
        let err = Error::from(ServerError::Bind {
            addr: "127.0.0.1:4000".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        });
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("127.0.0.1:4000"));
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("max_connections must be greater than 0");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_server_config_error_keeps_cause() {
        use std::error::Error as _;

        let mut config = crate::config::Config::default();
        config.report.interval_secs = 0;
        let cause = config.validate().unwrap_err();

        let err = Error::from(ServerError::Config(cause.into()));
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());

        let server_err = match &err {
            Error::Server(e) => e,
            other => panic!("unexpected variant: {other:?}"),
        };
        let source = server_err.source().unwrap();
        assert!(source.to_string().contains("interval_secs"));
    }

    #[test]
    fn test_anyhow_error_is_other() {
        let mut config = crate::config::Config::default();
        config.server.max_connections = 0;

        let err = Error::from(config.validate().unwrap_err());
        assert_eq!(err.category(), ErrorCategory::Other);
        assert!(err.to_string().contains("max_connections"));
    }
}
