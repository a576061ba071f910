//! Configuration loading and root folder resolution
//!
//! Every setting follows the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is never fatal: the tools log a warning and run on
//! compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the asset root folder
pub const ROOT_FOLDER_ENV: &str = "RAAG_ROOT_FOLDER";

/// Environment variable overriding the TOML config location
pub const CONFIG_PATH_ENV: &str = "RAAG_CONFIG";

/// Root folder used when nothing else is configured (the website's public tree)
pub const DEFAULT_ROOT_FOLDER: &str = "public";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder under which all asset destinations are resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry, timeout and threshold settings for the acquisition pipeline
    #[serde(default)]
    pub acquisition: AcquisitionSettings,

    /// Image search credentials and quota
    #[serde(default)]
    pub search: SearchSettings,

    /// External tool used to find audio for query-only entries
    #[serde(default)]
    pub audio_search: AudioSearchSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr only if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Acquisition pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcquisitionSettings {
    /// Transfer attempts per asset before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay; attempt k waits base * 2^k
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Per-attempt network timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Courtesy delay between assets that touched the network
    #[serde(default = "default_inter_asset_delay_ms")]
    pub inter_asset_delay_ms: u64,

    /// Audio files smaller than this are treated as placeholders
    #[serde(default = "default_audio_genuine_min_bytes")]
    pub audio_genuine_min_bytes: u64,

    /// Image files smaller than this are treated as placeholders
    #[serde(default = "default_image_genuine_min_bytes")]
    pub image_genuine_min_bytes: u64,

    /// Checkpoint file, relative to the root folder unless absolute
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: PathBuf,

    /// Manifest document, relative to the root folder unless absolute
    #[serde(default = "default_manifest_file")]
    pub manifest_file: PathBuf,

    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            inter_asset_delay_ms: default_inter_asset_delay_ms(),
            audio_genuine_min_bytes: default_audio_genuine_min_bytes(),
            image_genuine_min_bytes: default_image_genuine_min_bytes(),
            checkpoint_file: default_checkpoint_file(),
            manifest_file: default_manifest_file(),
            user_agent: default_user_agent(),
        }
    }
}

/// Image search credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSettings {
    /// API key for the custom search endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Search engine identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_id: Option<String>,

    /// Free queries per day before billing applies
    #[serde(default = "default_daily_quota")]
    pub daily_quota: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            engine_id: None,
            daily_quota: default_daily_quota(),
        }
    }
}

/// Audio search tool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioSearchSettings {
    /// Set to false to give query-only audio placeholders without trying
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Program to run (looked up on PATH unless absolute)
    #[serde(default = "default_audio_search_program")]
    pub program: PathBuf,

    /// Arguments placed before the query
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Output format passed as `--format`
    #[serde(default = "default_audio_format")]
    pub format: String,

    /// Output bitrate passed as `--bitrate`
    #[serde(default = "default_audio_bitrate")]
    pub bitrate: String,

    /// One search-and-download attempt is killed after this long
    #[serde(default = "default_audio_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AudioSearchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            program: default_audio_search_program(),
            args: Vec::new(),
            format: default_audio_format(),
            bitrate: default_audio_bitrate(),
            timeout_secs: default_audio_search_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_audio_search_program() -> PathBuf {
    PathBuf::from("spotdl")
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_audio_bitrate() -> String {
    "192k".to_string()
}

fn default_audio_search_timeout_secs() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_inter_asset_delay_ms() -> u64 {
    1000
}

fn default_audio_genuine_min_bytes() -> u64 {
    300_000
}

fn default_image_genuine_min_bytes() -> u64 {
    50_000
}

fn default_checkpoint_file() -> PathBuf {
    PathBuf::from(".download_checkpoint.txt")
}

fn default_manifest_file() -> PathBuf {
    PathBuf::from("manifest.json")
}

fn default_user_agent() -> String {
    format!("raag-assets/{} (Musical Map of India)", env!("CARGO_PKG_VERSION"))
}

fn default_daily_quota() -> u32 {
    100
}

/// Default TOML location: `<config_dir>/raag/raag-assets.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("raag").join("raag-assets.toml"))
}

/// Resolve the TOML config path: CLI > `RAAG_CONFIG` > platform default
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path()
}

/// Resolve the asset root folder: CLI > `RAAG_ROOT_FOLDER` > TOML > `./public`
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    PathBuf::from(DEFAULT_ROOT_FOLDER)
}

/// Load TOML configuration, falling back to defaults when the file is absent
///
/// A file that exists but cannot be parsed is an error: silently ignoring a
/// typo in retry settings would hide misconfiguration.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using compiled defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    #[cfg(unix)]
    {
        if config.search.api_key.is_some() && check_toml_permissions_loose(path)? {
            warn!(
                "Config file {} holds an API key but is readable by other users (chmod 600 recommended)",
                path.display()
            );
        }
    }

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write TOML configuration atomically (temp file + rename)
///
/// On Unix the file is restricted to 0600 because it may carry an API key.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    write_atomic(path, content.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Write bytes atomically: a reader sees either the old file or the new one
///
/// Data goes to `<name>.tmp` in the same directory, is synced, then renamed
/// over the target. Parent directories are created when missing.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_path_for(path);
    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::Io(e));
    }

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// True when group or other users can read the file
#[cfg(unix)]
pub fn check_toml_permissions_loose(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o077 != 0)
}
