//! Settings file location discovery
//!
//! Three candidate files take part in the cascade:
//! - Setup: `<base dir>/appsettings.setup.json`, shipped with an installation
//! - Base: `<base dir>/appsettings.json`, the application defaults
//! - User: `<user dir>/appsettings.json`, the per-user copy

use crate::error::{CascadeError, CascadeResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which of the three candidate files a path refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SettingsFileKind {
    Setup,
    Base,
    User,
}

impl fmt::Display for SettingsFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Base => "base",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

/// Candidate paths. Nothing guarantees that they exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsLocations {
    pub setup: PathBuf,
    pub base: PathBuf,
    pub user: PathBuf,
}

impl SettingsLocations {
    pub fn path(&self, kind: SettingsFileKind) -> &Path {
        match kind {
            SettingsFileKind::Setup => &self.setup,
            SettingsFileKind::Base => &self.base,
            SettingsFileKind::User => &self.user,
        }
    }

    pub fn exists(&self, kind: SettingsFileKind) -> bool {
        self.path(kind).is_file()
    }

    /// Candidates that currently exist, in setup, base, user order
    pub fn existing(&self) -> impl Iterator<Item = (SettingsFileKind, &Path)> {
        [
            SettingsFileKind::Setup,
            SettingsFileKind::Base,
            SettingsFileKind::User,
        ]
        .into_iter()
        .filter(|kind| self.exists(*kind))
        .map(|kind| (kind, self.path(kind)))
    }
}

/// Computes candidate settings paths from a base and a user directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFileLocator {
    base_dir: PathBuf,
    user_dir: PathBuf,
    file_name: String,
    setup_file_name: String,
}

impl SettingsFileLocator {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        user_dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
        setup_file_name: impl Into<String>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            user_dir: user_dir.into(),
            file_name: file_name.into(),
            setup_file_name: setup_file_name.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn locations(&self) -> SettingsLocations {
        SettingsLocations {
            setup: self.base_dir.join(&self.setup_file_name),
            base: self.base_dir.join(&self.file_name),
            user: self.user_dir.join(&self.file_name),
        }
    }

    /// Create the user directory if it does not exist yet
    pub fn ensure_user_directory(&self) -> CascadeResult<&Path> {
        if !self.user_dir.is_dir() {
            std::fs::create_dir_all(&self.user_dir)
                .map_err(|e| CascadeError::io_with_path(&e, &self.user_dir))?;
            tracing::debug!(path = %self.user_dir.display(), "created user settings directory");
        }
        Ok(&self.user_dir)
    }
}

/// Directory of the running executable, or the current directory
pub fn default_base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Per-user settings directory for `application_name`
pub fn default_user_dir(application_name: &str) -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(application_name)
}

/// Name of the running executable without extension
pub fn default_application_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "cascade".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn locator(dir: &TempDir) -> SettingsFileLocator {
        SettingsFileLocator::new(
            dir.path().join("app"),
            dir.path().join("user"),
            "appsettings.json",
            "appsettings.setup.json",
        )
    }

    #[test]
    fn test_candidate_paths() {
        let dir = TempDir::new().unwrap();
        let locations = locator(&dir).locations();

        assert_eq!(locations.setup, dir.path().join("app/appsettings.setup.json"));
        assert_eq!(locations.base, dir.path().join("app/appsettings.json"));
        assert_eq!(locations.user, dir.path().join("user/appsettings.json"));
        assert_eq!(locations.existing().count(), 0);
    }

    #[test]
    fn test_existing_only_lists_present_files() {
        let dir = TempDir::new().unwrap();
        let locator = locator(&dir);
        fs::create_dir_all(locator.base_dir()).unwrap();
        fs::write(locator.locations().base, "{}").unwrap();

        let locations = locator.locations();
        let existing: Vec<_> = locations.existing().map(|(kind, _)| kind).collect();
        assert_eq!(existing, vec![SettingsFileKind::Base]);
    }

    #[test]
    fn test_ensure_user_directory() {
        let dir = TempDir::new().unwrap();
        let locator = locator(&dir);
        assert!(!locator.user_dir().exists());

        locator.ensure_user_directory().unwrap();
        assert!(locator.user_dir().is_dir());
        // idempotent
        locator.ensure_user_directory().unwrap();
    }

    #[test]
    fn test_default_user_dir_ends_with_app_name() {
        let path = default_user_dir("orders-service");
        assert!(path.ends_with("orders-service"));
    }
}
