//! Core error types and traits for Cascade

use thiserror::Error;

/// Result type alias for Cascade operations
pub type CascadeResult<T> = Result<T, CascadeError>;

/// Unified error trait implemented by every Cascade error.
///
/// - error_code(): Unique code for programmatic error identification
/// - message(): Human-readable error message
/// - context(): Optional additional context
pub trait UnifiedError: std::error::Error + Send + Sync {
    /// Get the error code for programmatic handling
    fn error_code(&self) -> &str;

    /// Get the human-readable error message
    fn message(&self) -> &str;

    /// Get optional context about the error
    fn context(&self) -> Option<&str> {
        None
    }

    /// Check if this error is retryable
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C: std::fmt::Display>(self, context: C) -> CascadeResult<T>;

    /// Add context lazily (only evaluated on error)
    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> CascadeResult<T>;
}

impl<T, E: Into<CascadeError>> ResultExt<T> for Result<T, E> {
    fn context<C: std::fmt::Display>(self, context: C) -> CascadeResult<T> {
        self.map_err(|e| e.into().with_added_context(context.to_string()))
    }

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> CascadeResult<T> {
        self.map_err(|e| e.into().with_added_context(f().to_string()))
    }
}

/// Main error type for Cascade
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CascadeError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
        kind: Option<std::io::ErrorKind>,
        context: Option<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        context: Option<String>,
    },

    /// Encryption, decryption or key handling errors
    #[error("Crypto error: {message}")]
    Crypto {
        message: String,
        context: Option<String>,
    },

    /// Database connectivity probe failures
    #[error("Connectivity error: {message}")]
    Connectivity {
        message: String,
        context: Option<String>,
    },

    /// Cache errors
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        context: Option<String>,
    },

    /// Invalid input errors
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
        context: Option<String>,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        resource_type: Option<String>,
        context: Option<String>,
    },

    /// Generic error with context
    #[error("Error: {message}")]
    Other {
        message: String,
        context: Option<String>,
    },
}

impl CascadeError {
    /// Attach (or extend) the context string of this error
    pub fn with_added_context(mut self, added: impl Into<String>) -> Self {
        let added = added.into();
        let slot = match &mut self {
            Self::Config { context, .. }
            | Self::Io { context, .. }
            | Self::Json { context, .. }
            | Self::Crypto { context, .. }
            | Self::Connectivity { context, .. }
            | Self::Cache { context, .. }
            | Self::InvalidInput { context, .. }
            | Self::NotFound { context, .. }
            | Self::Other { context, .. } => context,
        };
        *slot = Some(match slot.take() {
            Some(existing) => format!("{added}: {existing}"),
            None => added,
        });
        self
    }
}
