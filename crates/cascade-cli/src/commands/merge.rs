//! Merge one settings file into another

use crate::console::CliConsole;
use cascade_core::error::CascadeResult;
use cascade_core::options::CascadeOptions;
use cascade_core::settings::{MergeOutcome, SettingsMerger};
use std::path::Path;

pub async fn execute(
    options: &CascadeOptions,
    source: &Path,
    dest: &Path,
    console: &CliConsole,
) -> CascadeResult<()> {
    let merger = SettingsMerger::new(options.retry);
    let (source, dest) = (source.to_path_buf(), dest.to_path_buf());
    let outcome = {
        let (source, dest) = (source.clone(), dest.clone());
        tokio::task::spawn_blocking(move || merger.merge_and_save(&source, &dest)).await??
    };

    match outcome {
        MergeOutcome::Merged => console.success(&format!(
            "Merged {} into {}",
            source.display(),
            dest.display()
        )),
        MergeOutcome::SourceMissing => {
            console.warn(&format!("Nothing merged, {} is missing", source.display()))
        }
        MergeOutcome::DestinationMissing => {
            console.warn(&format!("Nothing merged, {} is missing", dest.display()))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_merge_command_writes_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.json");
        let dest = dir.path().join("dest.json");
        std::fs::write(&source, r#"{ "A": 1 }"#).unwrap();
        std::fs::write(&dest, r#"{ "B": 2 }"#).unwrap();

        let options = CascadeOptions::for_application("cli-test");
        execute(&options, &source, &dest, &CliConsole::new(false))
            .await
            .unwrap();

        let merged: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&dest).unwrap()).unwrap();
        assert_eq!(merged, serde_json::json!({ "A": 1, "B": 2 }));
    }
}
