//! Requests and outcomes of repository operations

use crate::settings::{Capabilities, MergeOutcome, SettingsFileKind, SettingsModel};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which settings type to load and what it can do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Identifies the settings type; also keys the cached file path
    pub type_name: String,
    pub capabilities: Capabilities,
}

impl LoadRequest {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            capabilities: Capabilities::NONE,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_database(mut self) -> Self {
        self.capabilities = self.capabilities.with_database();
        self
    }

    pub fn with_crypto(mut self) -> Self {
        self.capabilities = self.capabilities.with_crypto();
        self
    }
}

/// Result of copying a settings file into the user directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CopyOutcome {
    /// Copied to the contained path
    Copied(PathBuf),
    /// The user directory already had the contained file; nothing copied
    AlreadyPresent(PathBuf),
    /// The contained source path does not exist
    SourceMissing(PathBuf),
}

impl CopyOutcome {
    /// The file in the user directory, if there is one now
    pub fn target(&self) -> Option<&Path> {
        match self {
            Self::Copied(path) | Self::AlreadyPresent(path) => Some(path),
            Self::SourceMissing(_) => None,
        }
    }
}

/// States of the load cascade, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadState {
    NoFilePathCached,
    Locating,
    Merging,
    ConnectionStringSelection,
    Cached,
}

/// One recorded step of a load
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LoadStep {
    CacheHit {
        path: PathBuf,
    },
    Located {
        setup: PathBuf,
        base: PathBuf,
        user: PathBuf,
    },
    CopiedToUser(CopyOutcome),
    CopyFailed {
        error: String,
    },
    Merged {
        from: SettingsFileKind,
        to: SettingsFileKind,
        outcome: MergeOutcome,
    },
    MergeFailed {
        from: SettingsFileKind,
        to: SettingsFileKind,
        error: String,
    },
    SetupDeleted {
        path: PathBuf,
    },
    SetupKept {
        path: PathBuf,
        reason: String,
    },
    Probed {
        kind: SettingsFileKind,
        reachable: bool,
    },
    Selected {
        kind: SettingsFileKind,
        path: PathBuf,
    },
    ConnectionStringSealed,
    Persisted {
        path: PathBuf,
    },
    PersistFailed {
        path: PathBuf,
        error: String,
    },
    Cached {
        path: PathBuf,
        #[serde(with = "humantime_serde")]
        ttl: Duration,
    },
}

impl LoadStep {
    /// Whether the step records a degraded operation
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::CopyFailed { .. } | Self::MergeFailed { .. } | Self::PersistFailed { .. }
        )
    }
}

/// Result of [`SettingsRepository::load`](super::SettingsRepository::load)
#[derive(Debug)]
pub struct LoadOutcome {
    pub model: SettingsModel,
    /// The settings file the model was built from
    pub path: PathBuf,
    /// The path came from the settings cache; no merging happened
    pub from_cache: bool,
    pub steps: Vec<LoadStep>,
}

impl LoadOutcome {
    /// Steps that failed without aborting the load
    pub fn failures(&self) -> impl Iterator<Item = &LoadStep> {
        self.steps.iter().filter(|step| step.is_failure())
    }

    pub fn setup_deleted(&self) -> bool {
        self.steps
            .iter()
            .any(|step| matches!(step, LoadStep::SetupDeleted { .. }))
    }
}
