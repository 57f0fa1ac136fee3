//! CLI commands

pub mod connection;
pub mod get;
pub mod keys;
pub mod load;
pub mod locate;
pub mod merge;

use cascade_core::error::CascadeResult;
use cascade_core::options::CascadeOptions;
use cascade_core::SettingsRepository;

/// Repository over the options, with key material when a key source is configured
pub(crate) fn repository(options: &CascadeOptions) -> CascadeResult<SettingsRepository> {
    SettingsRepository::builder(options.clone())
        .with_configured_keys()?
        .build()
}
