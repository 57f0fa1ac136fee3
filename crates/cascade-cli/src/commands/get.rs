//! Print a single settings value

use super::repository;
use crate::console::CliConsole;
use cascade_core::error::{CascadeError, CascadeResult};
use cascade_core::options::CascadeOptions;
use cascade_core::settings::ConfigurationRoot;
use std::path::Path;
use std::sync::Arc;

pub async fn execute(
    options: &CascadeOptions,
    key: &str,
    file: Option<&Path>,
    console: &CliConsole,
) -> CascadeResult<()> {
    let root = match file {
        Some(path) => {
            if !path.is_file() {
                return Err(CascadeError::not_found_resource(
                    format!("{} does not exist", path.display()),
                    "settings file",
                ));
            }
            let path = path.to_path_buf();
            let root = tokio::task::spawn_blocking(move || ConfigurationRoot::from_files([path]))
                .await??;
            Arc::new(root)
        }
        None => {
            let repo = repository(options)?;
            tokio::task::spawn_blocking(move || repo.configuration()).await??
        }
    };

    match root.get_raw(key) {
        Some(value) => {
            console.print_json(&value);
            Ok(())
        }
        None => Err(CascadeError::not_found_resource(
            format!("no value at '{key}'"),
            "settings key",
        )),
    }
}
