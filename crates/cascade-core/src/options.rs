//! Options for a settings cascade
//!
//! Defaults suit an installed application: settings next to the executable,
//! a per-user copy under the platform configuration directory. Every field
//! can be overridden programmatically or through `CASCADE_*` environment
//! variables.

use crate::cache::CachePolicy;
use crate::crypto::{DEFAULT_ENCRYPTION_THRESHOLD, KeySource};
use crate::error::{CascadeError, CascadeResult};
use crate::recovery::RetryPolicy;
use crate::settings::{
    SettingsFileLocator, default_application_name, default_base_dir, default_user_dir,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default settings file name
pub const DEFAULT_FILE_NAME: &str = "appsettings.json";
/// Default setup file name
pub const DEFAULT_SETUP_FILE_NAME: &str = "appsettings.setup.json";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = CascadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(CascadeError::invalid_field(
                "log_format",
                format!("unknown log format '{other}', expected pretty, compact or json"),
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, compact, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    /// Merge with another logging config; empty levels do not override
    pub fn merge(&mut self, other: LoggingConfig) {
        if !other.level.is_empty() {
            self.level = other.level;
        }
        self.format = other.format;
    }
}

/// Everything a [`SettingsRepository`](crate::repository::SettingsRepository) needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeOptions {
    /// Used for the user directory and `%AssemblyName%`
    pub application_name: String,
    /// Directory holding the base and setup files
    pub base_dir: PathBuf,
    /// Directory holding the per-user copy
    pub user_dir: PathBuf,
    pub file_name: String,
    pub setup_file_name: String,
    /// Longest connection string (in chars) that gets sealed
    pub encryption_threshold: usize,
    pub cache: CachePolicy,
    pub retry: RetryPolicy,
    /// Connect timeout of the TCP connectivity probe
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    pub keys: KeySource,
    pub logging: LoggingConfig,
}

impl Default for CascadeOptions {
    fn default() -> Self {
        let application_name = default_application_name();
        Self {
            user_dir: default_user_dir(&application_name),
            base_dir: default_base_dir(),
            application_name,
            file_name: DEFAULT_FILE_NAME.to_string(),
            setup_file_name: DEFAULT_SETUP_FILE_NAME.to_string(),
            encryption_threshold: DEFAULT_ENCRYPTION_THRESHOLD,
            cache: CachePolicy::default(),
            retry: RetryPolicy::default(),
            probe_timeout: Duration::from_secs(2),
            keys: KeySource::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CascadeOptions {
    /// Options for `application_name` with default directories
    pub fn for_application(application_name: impl Into<String>) -> Self {
        let application_name = application_name.into();
        Self {
            user_dir: default_user_dir(&application_name),
            application_name,
            ..Self::default()
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_user_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_dir = dir.into();
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    pub fn with_setup_file_name(mut self, name: impl Into<String>) -> Self {
        self.setup_file_name = name.into();
        self
    }

    pub fn with_encryption_threshold(mut self, threshold: usize) -> Self {
        self.encryption_threshold = threshold;
        self
    }

    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_keys(mut self, keys: KeySource) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Locator over this configuration's directories and file names
    pub fn locator(&self) -> SettingsFileLocator {
        SettingsFileLocator::new(
            &self.base_dir,
            &self.user_dir,
            &self.file_name,
            &self.setup_file_name,
        )
    }

    /// Apply `CASCADE_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> CascadeResult<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> CascadeResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        // CASCADE_APP_NAME moves the default user directory along with it
        if let Some(name) = var("CASCADE_APP_NAME") {
            if self.user_dir == default_user_dir(&self.application_name) {
                self.user_dir = default_user_dir(&name);
            }
            self.application_name = name;
        }
        if let Some(dir) = var("CASCADE_BASE_DIR") {
            self.base_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("CASCADE_USER_DIR") {
            self.user_dir = PathBuf::from(dir);
        }
        if let Some(name) = var("CASCADE_FILE_NAME") {
            self.file_name = name;
        }
        if let Some(name) = var("CASCADE_SETUP_FILE_NAME") {
            self.setup_file_name = name;
        }
        if let Some(level) = var("CASCADE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("CASCADE_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    /// Reject options that cannot describe a cascade
    pub fn validate(&self) -> CascadeResult<()> {
        if self.application_name.trim().is_empty() {
            return Err(CascadeError::invalid_field(
                "application_name",
                "application name must not be empty",
            ));
        }
        for (field, value) in [
            ("file_name", &self.file_name),
            ("setup_file_name", &self.setup_file_name),
        ] {
            if value.trim().is_empty() {
                return Err(CascadeError::invalid_field(field, "file name must not be empty"));
            }
            if value.contains(['/', '\\']) {
                return Err(CascadeError::invalid_field(
                    field,
                    format!("'{value}' must be a bare file name"),
                ));
            }
        }
        if self.file_name.eq_ignore_ascii_case(&self.setup_file_name) {
            return Err(CascadeError::invalid_field(
                "setup_file_name",
                "setup file name must differ from the settings file name",
            ));
        }
        if self.cache.capacity == 0 {
            return Err(CascadeError::invalid_field(
                "cache.capacity",
                "cache capacity must be at least 1",
            ));
        }
        Ok(())
    }
}
