//! Cascade Core Library
//!
//! Cascading JSON settings for installed applications: a base file next to
//! the executable, a per-user copy, and a one-shot setup file that gets
//! merged in and retired. Connection strings can be stored sealed with an
//! RSA + AES-GCM envelope and are probed for reachability when picking which
//! settings file to use.

pub mod cache;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod options;
pub mod recovery;
pub mod repository;
pub mod settings;

// Re-export commonly used types
pub use cache::{CacheKey, CachePolicy, SettingsCache};
pub use connection::{
    ConnectionStringParts, ConnectionStringResolver, ConnectivityProbe, Endpoint, FnProbe,
    Placeholder, PlaceholderMap, TcpProbe,
};
pub use crypto::{ConnectionCipher, CryptoError, KeyMaterial, KeySource, ProtectedString};
pub use error::{CascadeError, CascadeResult, ResultExt, UnifiedError};
pub use options::{CascadeOptions, LogFormat, LoggingConfig};
pub use recovery::RetryPolicy;
pub use repository::{
    CopyOutcome, LoadOutcome, LoadRequest, LoadStep, SettingsRepository,
    SettingsRepositoryBuilder,
};
pub use settings::{
    Capabilities, ConfigValue, ConfigurationRoot, FallbackValue, MergeOutcome, SettingsDocument,
    SettingsFileKind, SettingsMerger, SettingsModel, SettingsProperty,
};
