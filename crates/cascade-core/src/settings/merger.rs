//! Merging one settings file into another

use super::document::SettingsDocument;
use crate::error::{CascadeResult, ResultExt};
use crate::recovery::{RetryPolicy, retry_for};
use std::path::Path;

/// What `merge_and_save` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum MergeOutcome {
    /// Source merged into destination and destination written
    Merged,
    /// Source file absent or blank; destination untouched
    SourceMissing,
    /// Destination file absent; nothing written
    DestinationMissing,
}

impl MergeOutcome {
    pub fn is_merged(self) -> bool {
        self == Self::Merged
    }
}

/// Merges settings files, retrying file access on transient failures
#[derive(Debug, Clone, Default)]
pub struct SettingsMerger {
    retry: RetryPolicy,
}

impl SettingsMerger {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Deep-merge the file at `source` into the file at `dest`.
    ///
    /// A parse failure on either side is returned and leaves `dest` as it was.
    pub fn merge_and_save(
        &self,
        source: impl AsRef<Path>,
        dest: impl AsRef<Path>,
    ) -> CascadeResult<MergeOutcome> {
        let (source, dest) = (source.as_ref(), dest.as_ref());

        if !source.is_file() {
            tracing::debug!(source = %source.display(), "merge skipped, source missing");
            return Ok(MergeOutcome::SourceMissing);
        }
        if !dest.is_file() {
            tracing::debug!(dest = %dest.display(), "merge skipped, destination missing");
            return Ok(MergeOutcome::DestinationMissing);
        }

        let Some(incoming) = self.load(source)? else {
            return Ok(MergeOutcome::SourceMissing);
        };
        let mut merged = self.load(dest)?.unwrap_or_default();
        merged.merge_from(&incoming);
        self.save(&merged, dest)?;

        tracing::debug!(
            source = %source.display(),
            dest = %dest.display(),
            "merged settings"
        );
        Ok(MergeOutcome::Merged)
    }

    /// Merge an in-memory document into the file at `dest`, creating the file
    /// when it does not exist
    pub fn merge_document_into(
        &self,
        document: &SettingsDocument,
        dest: impl AsRef<Path>,
    ) -> CascadeResult<()> {
        let dest = dest.as_ref();
        let mut merged = self.load(dest)?.unwrap_or_default();
        merged.merge_from(document);
        self.save(&merged, dest)
    }

    /// Load with retry
    pub fn load(&self, path: &Path) -> CascadeResult<Option<SettingsDocument>> {
        retry_for(&self.retry, || SettingsDocument::load(path))
            .with_context(|| format!("reading {}", path.display()))
    }

    /// Save with retry
    pub fn save(&self, document: &SettingsDocument, path: &Path) -> CascadeResult<()> {
        retry_for(&self.retry, || document.save(path))
            .with_context(|| format!("writing {}", path.display()))
    }
}
