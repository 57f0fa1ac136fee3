//! Settings files, their cascade and the settings model
//!
//! - [`SettingsDocument`]: one JSON file, addressed with `:`-separated keys
//! - [`ConfigurationRoot`]: documents layered by precedence
//! - [`SettingsFileLocator`]: setup/base/user candidate paths
//! - [`SettingsMerger`]: deep-merge one file into another
//! - [`SettingsModel`]: lazily resolved, observable settings properties

pub mod document;
pub mod locations;
pub mod merger;
pub mod model;
pub mod root;

pub use document::{KEY_SEPARATOR, SettingsDocument};
pub use locations::{
    SettingsFileKind, SettingsFileLocator, SettingsLocations, default_application_name,
    default_base_dir, default_user_dir,
};
pub use merger::{MergeOutcome, SettingsMerger};
pub use model::{
    CONNECTION_STRINGS_SECTION, Capabilities, DEFAULT_CACHE_LIFETIME,
    DEFAULT_CONNECTION_STRING_NAME, PropertyChanged, PropertyObserver, SettingsModel,
    SettingsProperty, connection_string_key,
};
pub use root::{ConfigValue, ConfigurationRoot, ConfigurationSource, FallbackValue};
