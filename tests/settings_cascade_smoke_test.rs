//! Settings cascade smoke test
//!
//! Runs the async load path once against a throwaway install directory.

use cascade_core::{CascadeOptions, LoadRequest, SettingsRepository};
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn test_async_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let options = CascadeOptions::for_application("smoke")
        .with_base_dir(dir.path().join("bin"))
        .with_user_dir(dir.path().join("home"));
    let base = options.locator().locations().base;
    std::fs::create_dir_all(base.parent().unwrap()).unwrap();
    std::fs::write(&base, json!({ "Greeting": "hello" }).to_string()).unwrap();

    let repo = SettingsRepository::new(options).unwrap();
    let outcome = repo.load_async(LoadRequest::new("SmokeSettings")).await.unwrap();

    assert!(outcome.path.starts_with(dir.path().join("home")));
    assert_eq!(repo.get_value_async::<String>("Greeting").await, "hello");

    let again = repo.load_async(LoadRequest::new("SmokeSettings")).await.unwrap();
    assert!(again.from_cache);
}
