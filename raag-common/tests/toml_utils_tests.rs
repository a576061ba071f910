//! Atomic write utility tests (temp file + rename)

#[cfg(unix)]
use raag_common::config::check_toml_permissions_loose;
use raag_common::config::{load_toml_config, write_atomic, write_toml_config, TomlConfig};
use std::path::PathBuf;
use tempfile::TempDir;

fn sample_config() -> TomlConfig {
    let mut config = TomlConfig {
        root_folder: Some(PathBuf::from("/srv/public")),
        ..Default::default()
    };
    config.search.api_key = Some("key123".to_string());
    config.search.engine_id = Some("cx456".to_string());
    config
}

#[test]
fn test_atomic_write_leaves_no_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("manifest.json");

    write_atomic(&target, b"{\"version\":\"1.0\"}").unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("manifest.json.tmp").exists());
    assert_eq!(
        std::fs::read_to_string(&target).unwrap(),
        "{\"version\":\"1.0\"}"
    );
}

#[test]
fn test_atomic_write_replaces_existing_content() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("manifest.json");

    write_atomic(&target, b"old content that is longer").unwrap();
    write_atomic(&target, b"new").unwrap();

    assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
}

#[test]
fn test_atomic_write_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("nested").join("deeper").join("out.json");

    write_atomic(&target, b"[]").unwrap();

    assert!(target.exists());
}

#[test]
fn test_toml_write_then_load_preserves_fields() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("raag-assets.toml");

    let config = sample_config();
    write_toml_config(&config, &target).unwrap();

    let loaded = load_toml_config(&target).unwrap();
    assert_eq!(loaded, config);
}

#[cfg(unix)]
#[test]
fn test_toml_write_sets_private_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("raag-assets.toml");

    write_toml_config(&sample_config(), &target).unwrap();

    let mode = std::fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    assert!(!check_toml_permissions_loose(&target).unwrap());
}

#[cfg(unix)]
#[test]
fn test_loose_permissions_detected() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("loose.toml");
    std::fs::write(&target, "").unwrap();
    std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o644)).unwrap();

    assert!(check_toml_permissions_loose(&target).unwrap());
}
