//! UnifiedError trait implementation for CascadeError

use super::types::{CascadeError, UnifiedError};
use std::io::ErrorKind;

impl UnifiedError for CascadeError {
    fn error_code(&self) -> &str {
        match self {
            Self::Config { .. } => "CASCADE_CONFIG",
            Self::Io { .. } => "CASCADE_IO",
            Self::Json { .. } => "CASCADE_JSON",
            Self::Crypto { .. } => "CASCADE_CRYPTO",
            Self::Connectivity { .. } => "CASCADE_CONNECTIVITY",
            Self::Cache { .. } => "CASCADE_CACHE",
            Self::InvalidInput { .. } => "CASCADE_INVALID_INPUT",
            Self::NotFound { .. } => "CASCADE_NOT_FOUND",
            Self::Other { .. } => "CASCADE_OTHER",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Config { message, .. } => message,
            Self::Io { message, .. } => message,
            Self::Json { message, .. } => message,
            Self::Crypto { message, .. } => message,
            Self::Connectivity { message, .. } => message,
            Self::Cache { message, .. } => message,
            Self::InvalidInput { message, .. } => message,
            Self::NotFound { message, .. } => message,
            Self::Other { message, .. } => message,
        }
    }

    fn context(&self) -> Option<&str> {
        match self {
            Self::Config { context, .. } => context.as_deref(),
            Self::Io { context, .. } => context.as_deref(),
            Self::Json { context, .. } => context.as_deref(),
            Self::Crypto { context, .. } => context.as_deref(),
            Self::Connectivity { context, .. } => context.as_deref(),
            Self::Cache { context, .. } => context.as_deref(),
            Self::InvalidInput { context, .. } => context.as_deref(),
            Self::NotFound { context, .. } => context.as_deref(),
            Self::Other { context, .. } => context.as_deref(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Io { kind: Some(kind), .. } => is_transient_kind(*kind),
            Self::Connectivity { .. } => true,
            _ => false,
        }
    }
}

/// I/O error kinds that usually clear up when another process releases a file
pub(crate) fn is_transient_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::PermissionDenied
            | ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::ResourceBusy
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CascadeError::config("x").error_code(), "CASCADE_CONFIG");
        assert_eq!(CascadeError::crypto("x").error_code(), "CASCADE_CRYPTO");
        assert_eq!(CascadeError::not_found("x").error_code(), "CASCADE_NOT_FOUND");
    }

    #[test]
    fn test_locked_file_is_retryable() {
        let io = std::io::Error::new(ErrorKind::PermissionDenied, "in use");
        let err = CascadeError::io_with_path(&io, "/tmp/appsettings.json");
        assert!(err.is_retryable());
        assert_eq!(err.message(), "in use");
    }

    #[test]
    fn test_missing_file_is_not_retryable() {
        let io = std::io::Error::new(ErrorKind::NotFound, "gone");
        let err = CascadeError::io_with_path(&io, "/tmp/appsettings.json");
        assert!(!err.is_retryable());
        assert!(!CascadeError::json("bad").is_retryable());
    }
}
