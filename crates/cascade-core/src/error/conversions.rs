//! From trait implementations for CascadeError conversions

use super::types::CascadeError;
use crate::crypto::CryptoError;

impl From<anyhow::Error> for CascadeError {
    fn from(error: anyhow::Error) -> Self {
        Self::other(error.to_string())
    }
}

impl From<std::io::Error> for CascadeError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
            path: None,
            kind: Some(error.kind()),
            context: None,
        }
    }
}

impl From<serde_json::Error> for CascadeError {
    fn from(error: serde_json::Error) -> Self {
        Self::json(error.to_string())
    }
}

impl From<tokio::task::JoinError> for CascadeError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Other {
            message: error.to_string(),
            context: Some("Blocking settings task did not complete".to_string()),
        }
    }
}

impl From<CryptoError> for CascadeError {
    fn from(error: CryptoError) -> Self {
        Self::crypto(error.to_string())
    }
}
