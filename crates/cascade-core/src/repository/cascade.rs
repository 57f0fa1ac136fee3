//! The load sequence
//!
//! ```text
//! NoFilePathCached -> Locating -> Merging -> ConnectionStringSelection -> Cached
//!        ^                                                                  |
//!        +-------------------- invalidate / expiry -------------------------+
//! ```

use super::types::{LoadOutcome, LoadRequest, LoadState, LoadStep};
use super::SettingsRepository;
use crate::cache::CacheKey;
use crate::error::{CascadeError, CascadeResult};
use crate::recovery::retry_for;
use crate::settings::{ConfigurationRoot, SettingsFileKind, SettingsLocations, SettingsModel};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Merge order: setup into user, user back into base, base into user
const MERGE_ORDER: [(SettingsFileKind, SettingsFileKind); 3] = [
    (SettingsFileKind::Setup, SettingsFileKind::User),
    (SettingsFileKind::User, SettingsFileKind::Base),
    (SettingsFileKind::Base, SettingsFileKind::User),
];

impl SettingsRepository {
    /// Load a settings model, running the cascade unless the settings path of
    /// the type is cached and still present on disk.
    ///
    /// Copy, merge and persist failures are logged and recorded in
    /// [`LoadOutcome::steps`]; they do not abort the load. Failing to read the
    /// selected file does.
    pub fn load(&self, request: &LoadRequest) -> CascadeResult<LoadOutcome> {
        let _guard = self.inner.load_lock.lock();
        let key = CacheKey::file_path(&request.type_name);
        let mut steps = Vec::new();

        if let Some(path) = self.inner.cache.get::<PathBuf>(&key) {
            if path.is_file() {
                step(LoadState::Cached, request, "settings path served from cache");
                steps.push(LoadStep::CacheHit { path: path.clone() });
                let model = self.build_model(request, &path)?;
                return Ok(LoadOutcome {
                    model,
                    path,
                    from_cache: true,
                    steps,
                });
            }
            tracing::debug!(path = %path.display(), "cached settings path vanished");
            self.inner.cache.invalidate(&key);
        }
        step(LoadState::NoFilePathCached, request, "resolving settings path");

        step(LoadState::Locating, request, "locating settings files");
        let locations = self.inner.locator.locations();
        if let Err(e) = self.inner.locator.ensure_user_directory() {
            tracing::warn!("cannot create user settings directory: {}", e);
        }
        steps.push(LoadStep::Located {
            setup: locations.setup.clone(),
            base: locations.base.clone(),
            user: locations.user.clone(),
        });

        step(LoadState::Merging, request, "merging settings files");
        self.merge_cascade(&locations, &mut steps);

        step(
            LoadState::ConnectionStringSelection,
            request,
            "selecting settings file",
        );
        let (kind, path) = self.select(request, &locations, &mut steps);
        steps.push(LoadStep::Selected {
            kind,
            path: path.clone(),
        });

        let mut model = self.build_model(request, &path)?;
        if model.seal_connection_string()? {
            steps.push(LoadStep::ConnectionStringSealed);
        }
        match self.merge_and_save(&model) {
            Ok(path) => steps.push(LoadStep::Persisted { path }),
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to persist settings: {}", e);
                steps.push(LoadStep::PersistFailed {
                    path: path.clone(),
                    error: e.to_string(),
                });
            }
        }

        let ttl = model.cache_life_time();
        self.inner.cache.insert(key, &path, Some(ttl))?;
        steps.push(LoadStep::Cached {
            path: path.clone(),
            ttl,
        });
        // reread so lookups see what persisting wrote
        let loaded = match ConfigurationRoot::from_files([&path]) {
            Ok(root) => Arc::new(root),
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot reread settings: {}", e);
                Arc::clone(model.root())
            }
        };
        self.remember_configuration(loaded);
        step(LoadState::Cached, request, "settings path cached");

        Ok(LoadOutcome {
            model,
            path,
            from_cache: false,
            steps,
        })
    }

    /// Copy base into the user directory, run the three merges and retire the
    /// setup file once it has been applied
    fn merge_cascade(&self, locations: &SettingsLocations, steps: &mut Vec<LoadStep>) {
        if !locations.exists(SettingsFileKind::User) && locations.exists(SettingsFileKind::Base) {
            match self.copy_to_user_directory(&locations.base) {
                Ok(outcome) => steps.push(LoadStep::CopiedToUser(outcome)),
                Err(e) => {
                    tracing::warn!("failed to copy base settings into user directory: {}", e);
                    steps.push(LoadStep::CopyFailed {
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut all_merged = true;
        let mut setup_applied = false;
        for (from, to) in MERGE_ORDER {
            match self
                .inner
                .merger
                .merge_and_save(locations.path(from), locations.path(to))
            {
                Ok(outcome) => {
                    if from == SettingsFileKind::Setup && outcome.is_merged() {
                        setup_applied = true;
                    }
                    steps.push(LoadStep::Merged { from, to, outcome });
                }
                Err(e) => {
                    tracing::warn!(%from, %to, "settings merge failed: {}", e);
                    all_merged = false;
                    steps.push(LoadStep::MergeFailed {
                        from,
                        to,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !locations.exists(SettingsFileKind::Setup) {
            return;
        }
        let setup = locations.setup.clone();
        let reason = if !all_merged {
            "a merge step failed".to_string()
        } else if !setup_applied {
            "no user settings file to merge into".to_string()
        } else {
            match self.delete_file(&setup) {
                Ok(()) => {
                    tracing::info!(path = %setup.display(), "applied and removed setup settings");
                    steps.push(LoadStep::SetupDeleted { path: setup });
                    return;
                }
                Err(e) => e.to_string(),
            }
        };
        tracing::warn!(path = %setup.display(), %reason, "keeping setup settings");
        steps.push(LoadStep::SetupKept {
            path: setup,
            reason,
        });
    }

    fn delete_file(&self, path: &Path) -> CascadeResult<()> {
        retry_for(&self.inner.options.retry, || {
            std::fs::remove_file(path).map_err(|e| CascadeError::io_with_path(&e, path))
        })
    }

    /// With the database capability the first candidate (user, then base)
    /// whose connection string opens wins. Otherwise, or when none opens, the
    /// user file if present, else the base file.
    fn select(
        &self,
        request: &LoadRequest,
        locations: &SettingsLocations,
        steps: &mut Vec<LoadStep>,
    ) -> (SettingsFileKind, PathBuf) {
        let candidates: Vec<(SettingsFileKind, PathBuf)> =
            [SettingsFileKind::User, SettingsFileKind::Base]
                .into_iter()
                .filter(|kind| locations.exists(*kind))
                .map(|kind| (kind, locations.path(kind).to_path_buf()))
                .collect();

        if request.capabilities.has_database {
            for (kind, path) in &candidates {
                let reachable = self.probe_candidate(request, path);
                tracing::debug!(%kind, reachable, "probed connection string");
                steps.push(LoadStep::Probed {
                    kind: *kind,
                    reachable,
                });
                if reachable {
                    return (*kind, path.clone());
                }
            }
        }

        candidates.into_iter().next().unwrap_or_else(|| {
            tracing::debug!("no settings file present, defaulting to the user file");
            (SettingsFileKind::User, locations.user.clone())
        })
    }

    fn probe_candidate(&self, request: &LoadRequest, path: &Path) -> bool {
        let resolved = ConfigurationRoot::from_files([path]).and_then(|root| {
            let model = SettingsModel::new(request.type_name.as_str(), request.capabilities)
                .with_root(Arc::new(root));
            self.inner
                .resolver
                .resolve(model.root(), model.connection_string_name())
        });
        match resolved {
            Ok(Some(connection_string)) => self.inner.probe.try_open(&connection_string),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot resolve connection string: {}", e);
                false
            }
        }
    }

    /// A model over the file at `path`
    pub(crate) fn build_model(
        &self,
        request: &LoadRequest,
        path: &Path,
    ) -> CascadeResult<SettingsModel> {
        let root = ConfigurationRoot::from_files([path])?;
        Ok(
            SettingsModel::new(request.type_name.as_str(), request.capabilities)
                .with_root(Arc::new(root))
                .with_cipher(self.inner.resolver.cipher().cloned())
                .with_default_file_name(self.inner.options.file_name.as_str())
                .with_file_path(path),
        )
    }
}

fn step(state: LoadState, request: &LoadRequest, message: &str) {
    tracing::debug!(step = ?state, type_name = %request.type_name, "{}", message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{FnProbe, MockConnectivityProbe};
    use crate::crypto::test_support::test_cipher;
    use crate::options::CascadeOptions;
    use crate::repository::CopyOutcome;
    use crate::settings::{MergeOutcome, SettingsDocument};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        locations: SettingsLocations,
        options: CascadeOptions,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let options = CascadeOptions::for_application("orders")
                .with_base_dir(dir.path().join("app"))
                .with_user_dir(dir.path().join("user"));
            fs::create_dir_all(&options.base_dir).unwrap();
            Self {
                locations: options.locator().locations(),
                options,
                _dir: dir,
            }
        }

        fn write(&self, kind: SettingsFileKind, value: serde_json::Value) {
            let path = self.locations.path(kind);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, value.to_string()).unwrap();
        }

        fn read(&self, kind: SettingsFileKind) -> SettingsDocument {
            SettingsDocument::load(self.locations.path(kind))
                .unwrap()
                .unwrap()
        }

        fn repository(&self, reachable: fn(&str) -> bool) -> SettingsRepository {
            SettingsRepository::builder(self.options.clone())
                .with_probe(Arc::new(FnProbe(reachable)))
                .build()
                .unwrap()
        }
    }

    #[test]
    fn test_first_load_copies_base_into_user_directory() {
        let fx = Fixture::new();
        fx.write(SettingsFileKind::Base, json!({ "Feature": { "Enabled": true } }));
        let repo = fx.repository(|_| false);

        let outcome = repo.load(&LoadRequest::new("AppSettings")).unwrap();

        assert!(!outcome.from_cache);
        assert_eq!(outcome.path, fx.locations.user);
        assert!(outcome.steps.iter().any(|s| matches!(
            s,
            LoadStep::CopiedToUser(CopyOutcome::Copied(_))
        )));
        assert_eq!(
            fx.read(SettingsFileKind::User).get("Feature:Enabled"),
            Some(&json!(true))
        );
        assert_eq!(outcome.failures().count(), 0);
    }

    #[test]
    fn test_setup_is_applied_and_removed() {
        let fx = Fixture::new();
        fx.write(SettingsFileKind::Base, json!({ "Level": "Info", "Keep": 1 }));
        fx.write(SettingsFileKind::Setup, json!({ "Level": "Debug" }));
        let repo = fx.repository(|_| false);

        let outcome = repo.load(&LoadRequest::new("AppSettings")).unwrap();

        assert!(outcome.setup_deleted());
        assert!(!fx.locations.setup.exists());
        // setup -> user -> base -> user
        assert_eq!(fx.read(SettingsFileKind::User).get("Level"), Some(&json!("Debug")));
        assert_eq!(fx.read(SettingsFileKind::Base).get("Level"), Some(&json!("Debug")));
        assert_eq!(fx.read(SettingsFileKind::Base).get("Keep"), Some(&json!(1)));
        assert_eq!(outcome.model.root().get_raw("Level"), Some(json!("Debug")));
    }

    #[test]
    fn test_setup_kept_when_a_merge_fails() {
        let fx = Fixture::new();
        fx.write(SettingsFileKind::Base, json!({ "Level": "Info" }));
        fx.write(SettingsFileKind::Setup, json!({ "Level": "Debug" }));
        fs::create_dir_all(&fx.options.user_dir).unwrap();
        fs::write(&fx.locations.user, "{ not json").unwrap();
        let repo = fx.repository(|_| false);

        let result = repo.load(&LoadRequest::new("AppSettings"));

        // the broken user file is still selected, so the load itself fails
        assert!(result.is_err());
        assert!(fx.locations.setup.exists());
        assert_eq!(fx.read(SettingsFileKind::Base).get("Level"), Some(&json!("Info")));
    }

    #[test]
    fn test_setup_kept_without_destination() {
        let fx = Fixture::new();
        fx.write(SettingsFileKind::Setup, json!({ "Level": "Debug" }));
        let repo = fx.repository(|_| false);

        let outcome = repo.load(&LoadRequest::new("AppSettings")).unwrap();

        assert!(!outcome.setup_deleted());
        assert!(fx.locations.setup.exists());
        assert!(outcome.steps.iter().any(|s| matches!(
            s,
            LoadStep::Merged {
                from: SettingsFileKind::Setup,
                outcome: MergeOutcome::DestinationMissing,
                ..
            }
        )));
        assert!(outcome.steps.iter().any(|s| matches!(s, LoadStep::SetupKept { .. })));
    }

    #[test]
    fn test_no_files_defaults_to_user_path() {
        let fx = Fixture::new();
        let repo = fx.repository(|_| false);

        let outcome = repo.load(&LoadRequest::new("AppSettings")).unwrap();

        assert_eq!(outcome.path, fx.locations.user);
        assert!(fx.locations.user.is_file());
        assert_eq!(
            fx.read(SettingsFileKind::User).get("FileName"),
            Some(&json!("appsettings.json"))
        );
    }

    #[test]
    fn test_second_load_hits_cache() {
        let fx = Fixture::new();
        fx.write(SettingsFileKind::Base, json!({ "A": 1 }));
        let repo = fx.repository(|_| false);
        let request = LoadRequest::new("AppSettings");

        let first = repo.load(&request).unwrap();
        fx.write(SettingsFileKind::Setup, json!({ "A": 2 }));
        let second = repo.load(&request).unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.path, first.path);
        assert!(fx.locations.setup.exists());
        assert_eq!(repo.cache().statistics().hits, 1);
    }

    #[test]
    fn test_invalidate_forces_cascade() {
        let fx = Fixture::new();
        fx.write(SettingsFileKind::Base, json!({ "A": 1 }));
        let repo = fx.repository(|_| false);
        let request = LoadRequest::new("AppSettings");

        repo.load(&request).unwrap();
        fx.write(SettingsFileKind::Setup, json!({ "A": 2 }));
        assert!(repo.invalidate("AppSettings"));
        assert!(!repo.invalidate("AppSettings"));

        let outcome = repo.load(&request).unwrap();
        assert!(!outcome.from_cache);
        assert!(outcome.setup_deleted());
        assert_eq!(outcome.model.root().get_raw("A"), Some(json!(2)));
    }

    #[test]
    fn test_vanished_cached_path_reruns_cascade() {
        let fx = Fixture::new();
        fx.write(SettingsFileKind::Base, json!({ "A": 1 }));
        let repo = fx.repository(|_| false);
        let request = LoadRequest::new("AppSettings");

        repo.load(&request).unwrap();
        fs::remove_file(&fx.locations.user).unwrap();

        let outcome = repo.load(&request).unwrap();
        assert!(!outcome.from_cache);
        assert!(fx.locations.user.is_file());
    }

    #[test]
    fn test_cache_ttl_comes_from_model() {
        let fx = Fixture::new();
        fx.write(SettingsFileKind::Base, json!({ "CacheLifeTime": "5m" }));
        let repo = fx.repository(|_| false);

        let outcome = repo.load(&LoadRequest::new("AppSettings")).unwrap();
        let ttl = outcome.steps.iter().find_map(|s| match s {
            LoadStep::Cached { ttl, .. } => Some(*ttl),
            _ => None,
        });
        assert_eq!(ttl, Some(std::time::Duration::from_secs(300)));
    }

    #[test]
    fn test_out_of_range_cache_ttl_uses_default() {
        let fx = Fixture::new();
        fx.write(SettingsFileKind::Base, json!({ "CacheLifeTime": 1e20 }));
        let repo = fx.repository(|_| false);

        let outcome = repo.load(&LoadRequest::new("AppSettings")).unwrap();
        let ttl = outcome.steps.iter().find_map(|s| match s {
            LoadStep::Cached { ttl, .. } => Some(*ttl),
            _ => None,
        });
        assert_eq!(ttl, Some(crate::settings::DEFAULT_CACHE_LIFETIME));
    }

    #[test]
    fn test_database_selection_skips_unreadable_user() {
        let fx = Fixture::new();
        fx.write(
            SettingsFileKind::Base,
            json!({ "ConnectionStrings": { "DefaultConnection": "Server=good" } }),
        );
        fs::create_dir_all(&fx.options.user_dir).unwrap();
        fs::write(&fx.locations.user, "{ truncated").unwrap();

        let mut probe = MockConnectivityProbe::new();
        probe
            .expect_try_open()
            .withf(|cs| cs == "Server=good")
            .times(1)
            .return_const(true);
        let repo = SettingsRepository::builder(fx.options.clone())
            .with_probe(Arc::new(probe))
            .build()
            .unwrap();

        let outcome = repo
            .load(&LoadRequest::new("AppSettings").with_database())
            .unwrap();

        assert_eq!(outcome.path, fx.locations.base);
        assert!(outcome.failures().count() >= 1);
        assert_eq!(
            repo.connection_string(&outcome.model).unwrap().as_deref(),
            Some("Server=good")
        );
    }

    #[test]
    fn test_database_selection_prefers_reachable_user() {
        let fx = Fixture::new();
        fx.write(
            SettingsFileKind::Base,
            json!({ "ConnectionStrings": { "DefaultConnection": "Server=db" } }),
        );

        let mut probe = MockConnectivityProbe::new();
        probe.expect_try_open().times(1).return_const(true);
        let repo = SettingsRepository::builder(fx.options.clone())
            .with_probe(Arc::new(probe))
            .build()
            .unwrap();

        let outcome = repo
            .load(&LoadRequest::new("AppSettings").with_database())
            .unwrap();

        assert_eq!(outcome.path, fx.locations.user);
        assert!(outcome.steps.contains(&LoadStep::Probed {
            kind: SettingsFileKind::User,
            reachable: true,
        }));
    }

    #[test]
    fn test_database_selection_falls_back_to_user() {
        let fx = Fixture::new();
        fx.write(
            SettingsFileKind::Base,
            json!({ "ConnectionStrings": { "DefaultConnection": "Server=down" } }),
        );
        let repo = fx.repository(|_| false);

        let outcome = repo
            .load(&LoadRequest::new("AppSettings").with_database())
            .unwrap();

        assert_eq!(outcome.path, fx.locations.user);
        let probes = outcome
            .steps
            .iter()
            .filter(|s| matches!(s, LoadStep::Probed { reachable: false, .. }))
            .count();
        assert_eq!(probes, 2);
    }

    #[test]
    fn test_load_seals_connection_string_with_crypto() {
        let fx = Fixture::new();
        fx.write(
            SettingsFileKind::Base,
            json!({ "ConnectionStrings": { "DefaultConnection": "Server=db;Password=pw" } }),
        );
        let repo = SettingsRepository::builder(fx.options.clone())
            .with_cipher(test_cipher())
            .with_probe(Arc::new(FnProbe(|cs: &str| cs == "Server=db;Password=pw")))
            .build()
            .unwrap();

        let request = LoadRequest::new("AppSettings").with_database().with_crypto();
        let outcome = repo.load(&request).unwrap();

        assert!(outcome.steps.contains(&LoadStep::ConnectionStringSealed));
        let stored = fx.read(SettingsFileKind::User);
        let raw = stored
            .get("ConnectionStrings:DefaultConnection")
            .and_then(|v| v.as_str())
            .unwrap()
            .to_string();
        assert_ne!(raw, "Server=db;Password=pw");

        let again = repo.load(&request).unwrap();
        assert!(again.from_cache);
        assert_eq!(
            repo.connection_string(&again.model).unwrap().as_deref(),
            Some("Server=db;Password=pw")
        );
    }

    #[test]
    fn test_base64_shaped_plain_connection_string() {
        let fx = Fixture::new();
        let raw = "OrdersPrimaryReplicaWestEurope2024Shard1";
        fx.write(
            SettingsFileKind::Base,
            json!({ "ConnectionStrings": { "DefaultConnection": raw } }),
        );

        let repo = fx.repository(|_| true);
        let outcome = repo
            .load(&LoadRequest::new("AppSettings").with_database())
            .unwrap();
        assert_eq!(
            repo.connection_string(&outcome.model).unwrap().as_deref(),
            Some(raw)
        );

        let sealing = SettingsRepository::builder(fx.options.clone())
            .with_cipher(test_cipher())
            .with_probe(Arc::new(FnProbe(|_: &str| true)))
            .build()
            .unwrap();
        let request = LoadRequest::new("SealedSettings").with_database().with_crypto();
        let outcome = sealing.load(&request).unwrap();
        assert!(outcome.steps.contains(&LoadStep::ConnectionStringSealed));
        let stored = fx.read(SettingsFileKind::User);
        assert!(
            stored
                .get("ConnectionStrings:DefaultConnection")
                .and_then(|v| v.as_str())
                .unwrap()
                .starts_with(crate::crypto::SEALED_PREFIX)
        );
        assert_eq!(
            sealing.connection_string(&outcome.model).unwrap().as_deref(),
            Some(raw)
        );
    }
}
