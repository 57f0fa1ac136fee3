//! Settings repository
//!
//! Orchestrates the settings cascade: copying files into the user directory,
//! merging models into files, typed lookups and the load sequence that picks
//! the settings file a model is built from. The chosen file path is memoized
//! per settings type in an injected [`SettingsCache`].

mod async_ops;
mod cascade;
pub mod types;

pub use types::{CopyOutcome, LoadOutcome, LoadRequest, LoadState, LoadStep};

use crate::cache::{CacheKey, FILE_PATH_NAMESPACE, SettingsCache};
use crate::connection::{ConnectionStringResolver, ConnectivityProbe, PlaceholderMap, TcpProbe};
use crate::crypto::{ConnectionCipher, KeyMaterial};
use crate::error::{CascadeError, CascadeResult};
use crate::options::CascadeOptions;
use crate::recovery::retry_for;
use crate::settings::{
    ConfigValue, ConfigurationRoot, FallbackValue, SettingsDocument, SettingsFileLocator,
    SettingsLocations, SettingsMerger, SettingsModel, SettingsProperty,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct RepositoryInner {
    options: CascadeOptions,
    locator: SettingsFileLocator,
    merger: SettingsMerger,
    resolver: ConnectionStringResolver,
    probe: Arc<dyn ConnectivityProbe>,
    cache: Arc<SettingsCache>,
    /// Configuration of the most recent load of any type. Dropped when a
    /// cached path is invalidated and whenever the repository writes a file.
    root: RwLock<Option<Arc<ConfigurationRoot>>>,
    /// Serialises `load` so the cascade does not run twice before the cache entry lands
    load_lock: Mutex<()>,
}

/// Cheap-to-clone handle to a settings cascade
#[derive(Clone)]
pub struct SettingsRepository {
    inner: Arc<RepositoryInner>,
}

impl std::fmt::Debug for SettingsRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsRepository")
            .field("options", &self.inner.options)
            .field("cache", &self.inner.cache)
            .field("has_cipher", &self.inner.resolver.cipher().is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SettingsRepository`]
pub struct SettingsRepositoryBuilder {
    options: CascadeOptions,
    cipher: Option<ConnectionCipher>,
    placeholders: Option<PlaceholderMap>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    cache: Option<Arc<SettingsCache>>,
}

impl SettingsRepositoryBuilder {
    pub fn new(options: CascadeOptions) -> Self {
        Self {
            options,
            cipher: None,
            placeholders: None,
            probe: None,
            cache: None,
        }
    }

    pub fn with_cipher(mut self, cipher: ConnectionCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Build the cipher from key material
    pub fn with_key_material(self, keys: &KeyMaterial) -> CascadeResult<Self> {
        Ok(self.with_cipher(ConnectionCipher::from_key_material(keys)?))
    }

    /// Load key material from the options' key source, when one is configured
    pub fn with_configured_keys(self) -> CascadeResult<Self> {
        if !self.options.keys.is_configured() {
            return Ok(self);
        }
        let keys = self.options.keys.load()?;
        self.with_key_material(&keys)
    }

    /// Replace the standard placeholder map
    pub fn with_placeholders(mut self, placeholders: PlaceholderMap) -> Self {
        self.placeholders = Some(placeholders);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Share a cache between repositories
    pub fn with_cache(mut self, cache: Arc<SettingsCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> CascadeResult<SettingsRepository> {
        self.options.validate()?;
        let options = self.options;

        let placeholders = self.placeholders.unwrap_or_else(|| {
            PlaceholderMap::standard(&options.base_dir, &options.application_name)
        });
        let cipher = self
            .cipher
            .map(|cipher| cipher.with_threshold(options.encryption_threshold));
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(TcpProbe::new(options.probe_timeout)));
        let cache = self
            .cache
            .unwrap_or_else(|| SettingsCache::shared(options.cache));

        let inner = Arc::new(RepositoryInner {
            locator: options.locator(),
            merger: SettingsMerger::new(options.retry),
            resolver: ConnectionStringResolver::new(placeholders).with_cipher(cipher),
            probe,
            cache,
            root: RwLock::new(None),
            load_lock: Mutex::new(()),
            options,
        });

        let weak = Arc::downgrade(&inner);
        inner.cache.on_invalidate(move |key, reason| {
            if key.namespace != FILE_PATH_NAMESPACE {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                tracing::debug!(key = %key, ?reason, "settings path invalidated");
                *inner.root.write() = None;
            }
        });

        Ok(SettingsRepository { inner })
    }
}

impl SettingsRepository {
    pub fn builder(options: CascadeOptions) -> SettingsRepositoryBuilder {
        SettingsRepositoryBuilder::new(options)
    }

    /// Repository with default collaborators and no cipher
    pub fn new(options: CascadeOptions) -> CascadeResult<Self> {
        Self::builder(options).build()
    }

    pub fn options(&self) -> &CascadeOptions {
        &self.inner.options
    }

    pub fn locations(&self) -> SettingsLocations {
        self.inner.locator.locations()
    }

    pub fn cache(&self) -> &Arc<SettingsCache> {
        &self.inner.cache
    }

    pub fn resolver(&self) -> &ConnectionStringResolver {
        &self.inner.resolver
    }

    fn target_path<'a>(&self, model: &'a SettingsModel) -> CascadeResult<&'a Path> {
        model.file_path().ok_or_else(|| {
            CascadeError::invalid_field(
                SettingsProperty::FilePath.key(),
                format!("{} has no file path to write to", model.type_name()),
            )
        })
    }

    /// Serialize the model and write it to its FilePath
    pub fn save(&self, model: &SettingsModel) -> CascadeResult<PathBuf> {
        let path = self.target_path(model)?.to_path_buf();
        self.inner.merger.save(&model.to_document(), &path)?;
        self.forget_configuration();
        tracing::debug!(path = %path.display(), type_name = model.type_name(), "saved settings");
        Ok(path)
    }

    /// Merge the serialized model into the file at its FilePath, creating
    /// the file when absent
    pub fn merge_and_save(&self, model: &SettingsModel) -> CascadeResult<PathBuf> {
        let path = self.target_path(model)?.to_path_buf();
        self.inner
            .merger
            .merge_document_into(&model.to_document(), &path)?;
        self.forget_configuration();
        Ok(path)
    }

    /// Copy a settings file into the user directory unless a file of the same
    /// name is already there
    pub fn copy_to_user_directory(&self, path: impl AsRef<Path>) -> CascadeResult<CopyOutcome> {
        let source = path.as_ref();
        let file_name = source.file_name().ok_or_else(|| {
            CascadeError::invalid_input(format!("{} does not name a file", source.display()))
        })?;

        let target = self.inner.locator.ensure_user_directory()?.join(file_name);
        if target.is_file() {
            return Ok(CopyOutcome::AlreadyPresent(target));
        }
        if !source.is_file() {
            return Ok(CopyOutcome::SourceMissing(source.to_path_buf()));
        }

        retry_for(&self.inner.options.retry, || {
            std::fs::copy(source, &target)
                .map(|_| ())
                .map_err(|e| CascadeError::io_with_path(&e, source))
        })?;
        self.forget_configuration();
        tracing::debug!(
            source = %source.display(),
            target = %target.display(),
            "copied settings into user directory"
        );
        Ok(CopyOutcome::Copied(target))
    }

    /// Copy the model's file into the user directory, then merge the model
    /// into the user copy. Returns the user copy's path.
    pub fn merge_and_copy_to_user_directory(&self, model: &SettingsModel) -> CascadeResult<PathBuf> {
        let path = self.target_path(model)?.to_path_buf();
        self.merge_and_copy_document(&model.to_document(), &path)
    }

    fn merge_and_copy_document(
        &self,
        document: &SettingsDocument,
        path: &Path,
    ) -> CascadeResult<PathBuf> {
        let target = match self.copy_to_user_directory(path)? {
            CopyOutcome::Copied(target) | CopyOutcome::AlreadyPresent(target) => target,
            CopyOutcome::SourceMissing(_) => {
                let file_name = path.file_name().unwrap_or(path.as_os_str());
                self.inner.locator.user_dir().join(file_name)
            }
        };
        self.inner.merger.merge_document_into(document, &target)?;
        self.forget_configuration();
        Ok(target)
    }

    /// Configuration of the last load, or base and user files layered.
    ///
    /// The memoized configuration is last-load-wins across types: loading
    /// another type replaces it.
    pub fn configuration(&self) -> CascadeResult<Arc<ConfigurationRoot>> {
        if let Some(root) = self.inner.root.read().as_ref() {
            return Ok(Arc::clone(root));
        }
        let locations = self.locations();
        Ok(Arc::new(ConfigurationRoot::from_files([
            &locations.base,
            &locations.user,
        ])?))
    }

    pub(crate) fn remember_configuration(&self, root: Arc<ConfigurationRoot>) {
        *self.inner.root.write() = Some(root);
    }

    fn forget_configuration(&self) {
        self.inner.root.write().take();
    }

    /// Typed value, `Ok(None)` when absent
    pub fn try_get_value<T: ConfigValue>(&self, key: &str) -> CascadeResult<Option<T>> {
        self.configuration()?.try_get(key)
    }

    /// Typed value with the legacy fallback table (`false`, `i32::MIN`,
    /// `DateTime::MIN_UTC`, ...) on absence or any failure
    pub fn get_value<T: FallbackValue>(&self, key: &str) -> T {
        match self.configuration() {
            Ok(root) => root.get_value(key),
            Err(e) => {
                tracing::warn!(key, "settings unavailable, using fallback value: {}", e);
                T::fallback()
            }
        }
    }

    /// Plaintext connection string of a model, placeholders substituted
    pub fn connection_string(&self, model: &SettingsModel) -> CascadeResult<Option<String>> {
        model
            .connection_string()
            .map(|value| self.inner.resolver.reveal(value))
            .transpose()
    }

    /// Drop the cached settings path of a type, forcing the next load to run
    /// the cascade again
    pub fn invalidate(&self, type_name: &str) -> bool {
        self.inner.cache.invalidate(&CacheKey::file_path(type_name))
    }

    /// Mark migrations as done at `at` and persist
    pub fn record_migration(
        &self,
        model: &mut SettingsModel,
        at: DateTime<Utc>,
    ) -> CascadeResult<PathBuf> {
        model.set_check_and_migrate(false);
        model.set_last_migrate_date_time(at);
        self.merge_and_save(model)
    }
}
