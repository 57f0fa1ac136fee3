//! Async variants of the repository operations
//!
//! File access stays blocking; it runs on tokio's blocking pool so async
//! callers are not stalled.

use super::types::{CopyOutcome, LoadOutcome, LoadRequest};
use super::SettingsRepository;
use crate::error::CascadeResult;
use crate::settings::{ConfigValue, FallbackValue, SettingsModel};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

impl SettingsRepository {
    async fn blocking<T, F>(&self, operation: F) -> CascadeResult<T>
    where
        F: FnOnce(SettingsRepository) -> CascadeResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let repository = self.clone();
        tokio::task::spawn_blocking(move || operation(repository)).await?
    }

    pub async fn load_async(&self, request: LoadRequest) -> CascadeResult<LoadOutcome> {
        self.blocking(move |repo| repo.load(&request)).await
    }

    pub async fn save_async(&self, model: &SettingsModel) -> CascadeResult<PathBuf> {
        let path = self.target_path(model)?.to_path_buf();
        let document = model.to_document();
        self.blocking(move |repo| {
            repo.inner.merger.save(&document, &path)?;
            Ok(path)
        })
        .await
    }

    pub async fn merge_and_save_async(&self, model: &SettingsModel) -> CascadeResult<PathBuf> {
        let path = self.target_path(model)?.to_path_buf();
        let document = model.to_document();
        self.blocking(move |repo| {
            repo.inner.merger.merge_document_into(&document, &path)?;
            Ok(path)
        })
        .await
    }

    pub async fn copy_to_user_directory_async(
        &self,
        path: impl Into<PathBuf>,
    ) -> CascadeResult<CopyOutcome> {
        let path = path.into();
        self.blocking(move |repo| repo.copy_to_user_directory(&path))
            .await
    }

    pub async fn merge_and_copy_to_user_directory_async(
        &self,
        model: &SettingsModel,
    ) -> CascadeResult<PathBuf> {
        let path = self.target_path(model)?.to_path_buf();
        let document = model.to_document();
        self.blocking(move |repo| repo.merge_and_copy_document(&document, &path))
            .await
    }

    pub async fn try_get_value_async<T>(&self, key: &str) -> CascadeResult<Option<T>>
    where
        T: ConfigValue + Send + 'static,
    {
        let key = key.to_string();
        self.blocking(move |repo| repo.try_get_value(&key)).await
    }

    pub async fn get_value_async<T>(&self, key: &str) -> T
    where
        T: FallbackValue + Send + 'static,
    {
        let key = key.to_string();
        match self.blocking(move |repo| Ok(repo.get_value::<T>(&key))).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("settings lookup task failed: {}", e);
                T::fallback()
            }
        }
    }

    pub async fn record_migration_async(
        &self,
        model: &mut SettingsModel,
        at: DateTime<Utc>,
    ) -> CascadeResult<PathBuf> {
        model.set_check_and_migrate(false);
        model.set_last_migrate_date_time(at);
        self.merge_and_save_async(model).await
    }
}
