//! The settings model
//!
//! Properties read their backing field first. An unset field is looked up in
//! the configuration root on first access and memoized, so later changes to
//! the root are not observed. Setters replace the field and notify observers
//! when the value actually changed.

use super::root::{ConfigValue, ConfigurationRoot};
use super::document::SettingsDocument;
use crate::crypto::{ConnectionCipher, ProtectedString};
use crate::error::{CascadeError, CascadeResult};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Connection string name used when none is configured
pub const DEFAULT_CONNECTION_STRING_NAME: &str = "DefaultConnection";
/// How long a resolved settings path stays cached when none is configured
pub const DEFAULT_CACHE_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);
/// Configuration section holding named connection strings
pub const CONNECTION_STRINGS_SECTION: &str = "ConnectionStrings";

/// What a settings type can do beyond plain values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    /// Carries a connection string that is selected by probing
    pub has_database: bool,
    /// Connection strings are sealed at rest
    pub has_crypto: bool,
}

impl Capabilities {
    pub const NONE: Self = Self {
        has_database: false,
        has_crypto: false,
    };
    pub const DATABASE: Self = Self {
        has_database: true,
        has_crypto: false,
    };
    pub const FULL: Self = Self {
        has_database: true,
        has_crypto: true,
    };

    pub fn with_database(mut self) -> Self {
        self.has_database = true;
        self
    }

    pub fn with_crypto(mut self) -> Self {
        self.has_crypto = true;
        self
    }
}

/// Properties of [`SettingsModel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsProperty {
    FileName,
    FilePath,
    ConnectionStringName,
    ConnectionString,
    CacheLifeTime,
    CheckAndMigrate,
    LastMigrateDateTime,
}

impl SettingsProperty {
    /// Configuration key backing the property. `ConnectionString` lives under
    /// `ConnectionStrings:{ConnectionStringName}` instead.
    pub fn key(self) -> &'static str {
        match self {
            Self::FileName => "FileName",
            Self::FilePath => "FilePath",
            Self::ConnectionStringName => "ConnectionStringName",
            Self::ConnectionString => "ConnectionString",
            Self::CacheLifeTime => "CacheLifeTime",
            Self::CheckAndMigrate => "CheckAndMigrate",
            Self::LastMigrateDateTime => "LastMigrateDateTime",
        }
    }
}

impl fmt::Display for SettingsProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyChanged {
    pub property: SettingsProperty,
}

pub type PropertyObserver = Arc<dyn Fn(&PropertyChanged) + Send + Sync>;

/// Configuration key of a named connection string
pub fn connection_string_key(name: &str) -> String {
    format!("{CONNECTION_STRINGS_SECTION}:{name}")
}

/// A settings object over a configuration root
pub struct SettingsModel {
    type_name: String,
    capabilities: Capabilities,
    root: Arc<ConfigurationRoot>,
    cipher: Option<ConnectionCipher>,
    default_file_name: String,

    file_name: OnceCell<String>,
    file_path: OnceCell<Option<PathBuf>>,
    connection_string_name: OnceCell<String>,
    connection_string: OnceCell<Option<ProtectedString>>,
    cache_life_time: OnceCell<Duration>,
    check_and_migrate: OnceCell<bool>,
    last_migrate_date_time: OnceCell<DateTime<Utc>>,

    observers: RwLock<Vec<PropertyObserver>>,
}

impl fmt::Debug for SettingsModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsModel")
            .field("type_name", &self.type_name)
            .field("capabilities", &self.capabilities)
            .field("file_name", &self.file_name.get())
            .field("file_path", &self.file_path.get())
            .field("connection_string_name", &self.connection_string_name.get())
            .field("connection_string", &self.connection_string.get())
            .finish_non_exhaustive()
    }
}

impl SettingsModel {
    /// A model over an empty configuration root
    pub fn new(type_name: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            type_name: type_name.into(),
            capabilities,
            root: Arc::new(ConfigurationRoot::new()),
            cipher: None,
            default_file_name: crate::options::DEFAULT_FILE_NAME.to_string(),
            file_name: OnceCell::new(),
            file_path: OnceCell::new(),
            connection_string_name: OnceCell::new(),
            connection_string: OnceCell::new(),
            cache_life_time: OnceCell::new(),
            check_and_migrate: OnceCell::new(),
            last_migrate_date_time: OnceCell::new(),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn with_root(mut self, root: Arc<ConfigurationRoot>) -> Self {
        self.root = root;
        self
    }

    pub fn with_cipher(mut self, cipher: Option<ConnectionCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_default_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.default_file_name = file_name.into();
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = OnceCell::with_value(Some(path.into()));
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn root(&self) -> &Arc<ConfigurationRoot> {
        &self.root
    }

    pub fn cipher(&self) -> Option<&ConnectionCipher> {
        self.cipher.as_ref()
    }

    /// Register an observer for property changes
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&PropertyChanged) + Send + Sync + 'static,
    {
        self.observers.write().push(Arc::new(observer));
    }

    fn lookup<T: ConfigValue>(&self, key: &str) -> Option<T> {
        match self.root.try_get::<T>(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, type_name = %self.type_name, "ignoring unusable setting: {}", e);
                None
            }
        }
    }

    fn notify(&self, property: SettingsProperty) {
        let observers: Vec<PropertyObserver> = self.observers.read().clone();
        let event = PropertyChanged { property };
        for observer in observers {
            observer(&event);
        }
    }

    fn changed_if(&self, changed: bool, property: SettingsProperty) {
        if changed {
            self.notify(property);
        }
    }

    // --- FileName ---

    pub fn file_name(&self) -> &str {
        self.file_name.get_or_init(|| {
            self.lookup::<String>(SettingsProperty::FileName.key())
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| self.default_file_name.clone())
        })
    }

    pub fn set_file_name(&mut self, value: impl Into<String>) {
        let value = value.into();
        let changed = self.file_name() != value;
        self.file_name = OnceCell::with_value(value);
        self.changed_if(changed, SettingsProperty::FileName);
    }

    // --- FilePath ---

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path
            .get_or_init(|| self.lookup::<PathBuf>(SettingsProperty::FilePath.key()))
            .as_deref()
    }

    pub fn set_file_path(&mut self, value: Option<PathBuf>) {
        let changed = self.file_path() != value.as_deref();
        self.file_path = OnceCell::with_value(value);
        self.changed_if(changed, SettingsProperty::FilePath);
    }

    // --- ConnectionStringName ---

    pub fn connection_string_name(&self) -> &str {
        self.connection_string_name.get_or_init(|| {
            self.lookup::<String>(SettingsProperty::ConnectionStringName.key())
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CONNECTION_STRING_NAME.to_string())
        })
    }

    /// Changing the name re-selects the connection string from configuration
    /// on next access
    pub fn set_connection_string_name(&mut self, value: impl Into<String>) {
        let value = value.into();
        let changed = self.connection_string_name() != value;
        self.connection_string_name = OnceCell::with_value(value);
        if changed {
            self.connection_string.take();
        }
        self.changed_if(changed, SettingsProperty::ConnectionStringName);
    }

    // --- ConnectionString ---

    /// The connection string in its at-rest form. Always `None` for models
    /// without the database capability.
    pub fn connection_string(&self) -> Option<&ProtectedString> {
        if !self.capabilities.has_database {
            return None;
        }
        self.connection_string
            .get_or_init(|| {
                let key = connection_string_key(self.connection_string_name());
                self.lookup::<String>(&key)
                    .filter(|raw| !raw.trim().is_empty())
                    .map(ProtectedString::classify)
            })
            .as_ref()
    }

    /// Set the connection string from plaintext, sealing it when the model
    /// has the crypto capability and the value is within the threshold
    pub fn set_connection_string(&mut self, plaintext: &str) -> CascadeResult<()> {
        let protected = if self.capabilities.has_crypto {
            let cipher = self.cipher.as_ref().ok_or_else(|| {
                CascadeError::config_with_context(
                    "connection string encryption requires key material",
                    self.type_name.clone(),
                )
            })?;
            cipher.protect(plaintext)?
        } else {
            ProtectedString::Plain(plaintext.to_string())
        };
        self.set_protected_connection_string(Some(protected))
    }

    /// Set the connection string in its at-rest form
    pub fn set_protected_connection_string(
        &mut self,
        value: Option<ProtectedString>,
    ) -> CascadeResult<()> {
        if !self.capabilities.has_database {
            return Err(CascadeError::invalid_field(
                SettingsProperty::ConnectionString.key(),
                format!("{} has no database capability", self.type_name),
            ));
        }
        let changed = self.connection_string() != value.as_ref();
        self.connection_string = OnceCell::with_value(value);
        self.changed_if(changed, SettingsProperty::ConnectionString);
        Ok(())
    }

    /// Decrypt the connection string. Placeholders are left as they are.
    pub fn reveal_connection_string(&self) -> CascadeResult<Option<String>> {
        match self.connection_string() {
            None => Ok(None),
            Some(ProtectedString::Plain(plain)) => Ok(Some(plain.clone())),
            Some(sealed @ ProtectedString::Sealed(_)) => {
                let cipher = self.cipher.as_ref().ok_or_else(|| {
                    CascadeError::crypto("connection string is sealed but no key material is configured")
                })?;
                Ok(Some(cipher.reveal(sealed)?))
            }
        }
    }

    /// Seal a plaintext connection string that is within the threshold.
    /// Returns whether anything changed.
    pub fn seal_connection_string(&mut self) -> CascadeResult<bool> {
        if !self.capabilities.has_crypto {
            return Ok(false);
        }
        let plaintext = match (self.connection_string(), self.cipher.as_ref()) {
            (Some(ProtectedString::Plain(plain)), Some(cipher))
                if plain.chars().count() <= cipher.threshold() =>
            {
                plain.clone()
            }
            _ => return Ok(false),
        };
        self.set_connection_string(&plaintext)?;
        Ok(true)
    }

    // --- CacheLifeTime ---

    pub fn cache_life_time(&self) -> Duration {
        *self.cache_life_time.get_or_init(|| {
            self.lookup::<Duration>(SettingsProperty::CacheLifeTime.key())
                .unwrap_or(DEFAULT_CACHE_LIFETIME)
        })
    }

    pub fn set_cache_life_time(&mut self, value: Duration) {
        let changed = self.cache_life_time() != value;
        self.cache_life_time = OnceCell::with_value(value);
        self.changed_if(changed, SettingsProperty::CacheLifeTime);
    }

    // --- CheckAndMigrate ---

    pub fn check_and_migrate(&self) -> bool {
        *self.check_and_migrate.get_or_init(|| {
            self.lookup::<bool>(SettingsProperty::CheckAndMigrate.key())
                .unwrap_or(false)
        })
    }

    pub fn set_check_and_migrate(&mut self, value: bool) {
        let changed = self.check_and_migrate() != value;
        self.check_and_migrate = OnceCell::with_value(value);
        self.changed_if(changed, SettingsProperty::CheckAndMigrate);
    }

    // --- LastMigrateDateTime ---

    pub fn last_migrate_date_time(&self) -> DateTime<Utc> {
        *self.last_migrate_date_time.get_or_init(|| {
            self.lookup::<DateTime<Utc>>(SettingsProperty::LastMigrateDateTime.key())
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
    }

    pub fn set_last_migrate_date_time(&mut self, value: DateTime<Utc>) {
        let changed = self.last_migrate_date_time() != value;
        self.last_migrate_date_time = OnceCell::with_value(value);
        self.changed_if(changed, SettingsProperty::LastMigrateDateTime);
    }

    /// Serialize the model on top of everything its configuration root holds.
    ///
    /// Keys are PascalCase; the connection string is written in its at-rest
    /// form. `FilePath` is not written, it describes where the document goes.
    pub fn to_document(&self) -> SettingsDocument {
        let mut document = self.root.snapshot();
        document.remove(SettingsProperty::FilePath.key());

        document.set(
            SettingsProperty::FileName.key(),
            Value::String(self.file_name().to_string()),
        );

        if self.capabilities.has_database {
            let name = self.connection_string_name().to_string();
            if let Some(connection_string) = self.connection_string() {
                document.set(
                    &connection_string_key(&name),
                    Value::String(connection_string.stored().to_string()),
                );
            }
            document.set(
                SettingsProperty::ConnectionStringName.key(),
                Value::String(name),
            );
        }

        let life_time = humantime_serde::serialize(
            &self.cache_life_time(),
            serde_json::value::Serializer,
        )
        .unwrap_or_else(|_| Value::from(self.cache_life_time().as_secs()));
        document.set(SettingsProperty::CacheLifeTime.key(), life_time);

        document.set(
            SettingsProperty::CheckAndMigrate.key(),
            Value::Bool(self.check_and_migrate()),
        );

        let last_migrate = self.last_migrate_date_time();
        if last_migrate != DateTime::<Utc>::MIN_UTC {
            document.set(
                SettingsProperty::LastMigrateDateTime.key(),
                Value::String(last_migrate.to_rfc3339()),
            );
        }

        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_support::test_cipher;
    use serde_json::json;

    fn root(value: Value) -> Arc<ConfigurationRoot> {
        Arc::new(
            ConfigurationRoot::new()
                .with_document(SettingsDocument::from_value(value).unwrap()),
        )
    }

    #[test]
    fn test_fallbacks_on_empty_root() {
        let model = SettingsModel::new("AppSettings", Capabilities::DATABASE);

        assert_eq!(model.file_name(), "appsettings.json");
        assert_eq!(model.file_path(), None);
        assert_eq!(model.connection_string_name(), "DefaultConnection");
        assert_eq!(model.connection_string(), None);
        assert_eq!(model.cache_life_time(), Duration::from_secs(86_400));
        assert!(!model.check_and_migrate());
        assert_eq!(model.last_migrate_date_time(), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_reads_from_root() {
        let model = SettingsModel::new("AppSettings", Capabilities::DATABASE).with_root(root(
            json!({
                "FileName": "orders.json",
                "ConnectionStringName": "Orders",
                "ConnectionStrings": { "Orders": "Server=db;Database=orders" },
                "CacheLifeTime": "2h",
                "CheckAndMigrate": "true",
                "LastMigrateDateTime": "2024-01-02T03:04:05Z"
            }),
        ));

        assert_eq!(model.file_name(), "orders.json");
        assert_eq!(
            model.connection_string(),
            Some(&ProtectedString::Plain("Server=db;Database=orders".into()))
        );
        assert_eq!(model.cache_life_time(), Duration::from_secs(7_200));
        assert!(model.check_and_migrate());
        assert_eq!(
            model.last_migrate_date_time().to_rfc3339(),
            "2024-01-02T03:04:05+00:00"
        );
    }

    #[test]
    fn test_setters_notify_only_on_change() {
        let mut model = SettingsModel::new("AppSettings", Capabilities::NONE);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        model.subscribe(move |event| sink.lock().push(event.property));

        model.set_check_and_migrate(true);
        model.set_check_and_migrate(true);
        model.set_file_name("appsettings.json");
        model.set_cache_life_time(Duration::from_secs(60));

        assert_eq!(
            *seen.lock(),
            vec![SettingsProperty::CheckAndMigrate, SettingsProperty::CacheLifeTime]
        );
    }

    #[test]
    fn test_connection_string_requires_database_capability() {
        let mut model = SettingsModel::new("Plain", Capabilities::NONE)
            .with_root(root(json!({ "ConnectionStrings": { "DefaultConnection": "x" } })));

        assert_eq!(model.connection_string(), None);
        assert!(model.set_connection_string("Server=db").is_err());
    }

    #[test]
    fn test_crypto_model_seals_on_set() {
        let mut model =
            SettingsModel::new("AppSettings", Capabilities::FULL).with_cipher(Some(test_cipher()));

        model.set_connection_string("Server=db;Password=p").unwrap();

        assert!(model.connection_string().unwrap().is_sealed());
        assert_eq!(
            model.reveal_connection_string().unwrap().as_deref(),
            Some("Server=db;Password=p")
        );
    }

    #[test]
    fn test_crypto_model_without_keys_refuses_plaintext() {
        let mut model = SettingsModel::new("AppSettings", Capabilities::FULL);
        let err = model.set_connection_string("Server=db").unwrap_err();
        assert!(matches!(err, CascadeError::Config { .. }));
    }

    #[test]
    fn test_seal_connection_string_from_plain_file_value() {
        let mut model = SettingsModel::new("AppSettings", Capabilities::FULL)
            .with_cipher(Some(test_cipher()))
            .with_root(root(json!({ "ConnectionStrings": { "DefaultConnection": "Server=db" } })));

        assert!(!model.connection_string().unwrap().is_sealed());
        assert!(model.seal_connection_string().unwrap());
        assert!(model.connection_string().unwrap().is_sealed());
        assert!(!model.seal_connection_string().unwrap());
    }

    #[test]
    fn test_renaming_reselects_connection_string() {
        let mut model = SettingsModel::new("AppSettings", Capabilities::DATABASE).with_root(root(
            json!({ "ConnectionStrings": { "DefaultConnection": "a", "Reporting": "b" } }),
        ));
        assert_eq!(model.connection_string().map(|c| c.stored()), Some("a"));

        model.set_connection_string_name("Reporting");
        assert_eq!(model.connection_string().map(|c| c.stored()), Some("b"));
    }

    #[test]
    fn test_memoizes_first_lookup() {
        let model = SettingsModel::new("AppSettings", Capabilities::NONE)
            .with_root(root(json!({ "CheckAndMigrate": true })));
        assert!(model.check_and_migrate());
        // root is immutable behind the Arc; a second read is served from the field
        assert!(model.check_and_migrate());
        assert!(model.check_and_migrate.get().is_some());
    }

    #[test]
    fn test_to_document_preserves_unknown_keys() {
        let mut model = SettingsModel::new("AppSettings", Capabilities::DATABASE).with_root(root(
            json!({
                "Logging": { "Level": "Debug" },
                "ConnectionStrings": { "DefaultConnection": "Server=db" }
            }),
        ));
        model.set_check_and_migrate(true);

        let document = model.to_document();
        assert_eq!(document.get("Logging:Level"), Some(&json!("Debug")));
        assert_eq!(
            document.get("ConnectionStrings:DefaultConnection"),
            Some(&json!("Server=db"))
        );
        assert_eq!(document.get("CheckAndMigrate"), Some(&json!(true)));
        assert_eq!(document.get("CacheLifeTime"), Some(&json!("1day")));
        assert_eq!(document.get("LastMigrateDateTime"), None);
        assert_eq!(document.get("FilePath"), None);
    }

    #[test]
    fn test_to_document_drops_file_path_from_source() {
        let model = SettingsModel::new("AppSettings", Capabilities::NONE)
            .with_root(root(json!({ "filePath": "/tmp/stale.json", "Name": "orders" })))
            .with_file_path("/srv/orders/appsettings.json");

        let document = model.to_document();
        assert_eq!(document.get("FilePath"), None);
        assert_eq!(document.get("Name"), Some(&json!("orders")));
    }
}
