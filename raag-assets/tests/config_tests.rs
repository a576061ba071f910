//! Search credential resolution and pipeline config tests
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that touch RAAG_SEARCH_* are marked with #[serial].

use raag_assets::config::{
    resolve_search_credentials, PipelineConfig, SEARCH_API_KEY_ENV, SEARCH_ENGINE_ID_ENV,
};
use raag_common::config::{load_toml_config, SearchSettings, TomlConfig};
use serial_test::serial;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn toml_with_search(api_key: Option<&str>, engine_id: Option<&str>) -> TomlConfig {
    TomlConfig {
        search: SearchSettings {
            api_key: api_key.map(str::to_string),
            engine_id: engine_id.map(str::to_string),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn clear_env() {
    std::env::remove_var(SEARCH_API_KEY_ENV);
    std::env::remove_var(SEARCH_ENGINE_ID_ENV);
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    std::env::set_var(SEARCH_API_KEY_ENV, "env-key");
    std::env::set_var(SEARCH_ENGINE_ID_ENV, "env-cx");

    let creds = resolve_search_credentials(&toml_with_search(Some("toml-key"), Some("toml-cx")))
        .unwrap();
    assert_eq!(creds.api_key, "env-key");
    assert_eq!(creds.engine_id, "env-cx");

    clear_env();
}

#[test]
#[serial]
fn test_toml_fallback_when_env_empty() {
    clear_env();
    std::env::set_var(SEARCH_API_KEY_ENV, "   ");

    let creds = resolve_search_credentials(&toml_with_search(Some("toml-key"), Some("toml-cx")))
        .unwrap();
    assert_eq!(creds.api_key, "toml-key");
    assert_eq!(creds.engine_id, "toml-cx");

    clear_env();
}

#[test]
#[serial]
fn test_mixed_sources_combine() {
    clear_env();
    std::env::set_var(SEARCH_ENGINE_ID_ENV, "env-cx");

    let creds = resolve_search_credentials(&toml_with_search(Some("toml-key"), None)).unwrap();
    assert_eq!(creds.api_key, "toml-key");
    assert_eq!(creds.engine_id, "env-cx");

    clear_env();
}

#[test]
#[serial]
fn test_search_disabled_without_both_values() {
    clear_env();
    assert!(resolve_search_credentials(&TomlConfig::default()).is_none());
    assert!(resolve_search_credentials(&toml_with_search(Some("key"), None)).is_none());
    assert!(resolve_search_credentials(&toml_with_search(None, Some("cx"))).is_none());
}

#[test]
fn test_pipeline_config_from_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("raag-assets.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/site/public"

[acquisition]
max_attempts = 5
base_delay_ms = 250
inter_asset_delay_ms = 0
manifest_file = "data/manifest.json"

[search]
daily_quota = 40
"#,
    )
    .unwrap();

    let toml_config = load_toml_config(&path).unwrap();
    let config = PipelineConfig::from_toml("/srv/site/public", &toml_config);

    assert_eq!(config.max_attempts, 5);
    assert_eq!(config.base_delay, Duration::from_millis(250));
    assert_eq!(config.inter_asset_delay, Duration::ZERO);
    assert_eq!(
        config.manifest_path,
        PathBuf::from("/srv/site/public/data/manifest.json")
    );
    assert_eq!(
        config.checkpoint_path,
        PathBuf::from("/srv/site/public/.download_checkpoint.txt")
    );
    assert_eq!(config.daily_search_quota, 40);
    assert!(config.categories.is_empty());
    assert_eq!(config.limit, None);
}
