//! Pipeline configuration for raag-assets
//!
//! Gathers the bootstrap TOML settings and command-line overrides into one
//! [`PipelineConfig`] value handed to the orchestrator at construction.
//! Search credentials are resolved separately: ENV > TOML.

use crate::catalog::AssetCategory;
use raag_common::config::{AcquisitionSettings, TomlConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable carrying the image search API key
pub const SEARCH_API_KEY_ENV: &str = "RAAG_SEARCH_API_KEY";

/// Environment variable carrying the image search engine id
pub const SEARCH_ENGINE_ID_ENV: &str = "RAAG_SEARCH_ENGINE_ID";

/// Everything the orchestrator needs to know for one run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root folder all destinations are resolved against
    pub root: PathBuf,
    /// Absolute (or root-joined) checkpoint file location
    pub checkpoint_path: PathBuf,
    /// Absolute (or root-joined) manifest document location
    pub manifest_path: PathBuf,
    /// Transfer attempts per asset (at least 1)
    pub max_attempts: u32,
    /// Attempt k waits `base_delay * 2^k` before the next one
    pub base_delay: Duration,
    /// Per-attempt network timeout
    pub request_timeout: Duration,
    /// Courtesy delay after an asset that touched the network
    pub inter_asset_delay: Duration,
    pub audio_genuine_min_bytes: u64,
    pub image_genuine_min_bytes: u64,
    /// Category filter; empty selects everything
    pub categories: Vec<AssetCategory>,
    /// Process at most this many selected assets
    pub limit: Option<usize>,
    /// Free search queries per day (estimate only)
    pub daily_search_quota: u32,
    pub user_agent: String,
}

impl PipelineConfig {
    /// Configuration with compiled defaults rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_settings(root, &AcquisitionSettings::default(), 100)
    }

    /// Build from the `[acquisition]` TOML table
    pub fn from_settings(
        root: impl Into<PathBuf>,
        settings: &AcquisitionSettings,
        daily_search_quota: u32,
    ) -> Self {
        let root = root.into();
        let max_attempts = if settings.max_attempts == 0 {
            warn!("acquisition.max_attempts = 0 is invalid, using 1");
            1
        } else {
            settings.max_attempts
        };

        Self {
            checkpoint_path: resolve_under_root(&root, &settings.checkpoint_file),
            manifest_path: resolve_under_root(&root, &settings.manifest_file),
            root,
            max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            request_timeout: Duration::from_secs(settings.request_timeout_secs.max(1)),
            inter_asset_delay: Duration::from_millis(settings.inter_asset_delay_ms),
            audio_genuine_min_bytes: settings.audio_genuine_min_bytes,
            image_genuine_min_bytes: settings.image_genuine_min_bytes,
            categories: Vec::new(),
            limit: None,
            daily_search_quota,
            user_agent: settings.user_agent.clone(),
        }
    }

    /// Build from a whole TOML config with an already-resolved root
    pub fn from_toml(root: impl Into<PathBuf>, toml_config: &TomlConfig) -> Self {
        Self::from_settings(root, &toml_config.acquisition, toml_config.search.daily_quota)
    }
}

fn resolve_under_root(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Credentials for the image search provider
#[derive(Clone, PartialEq, Eq)]
pub struct SearchCredentials {
    pub api_key: String,
    pub engine_id: String,
}

impl std::fmt::Debug for SearchCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCredentials")
            .field("api_key", &"<redacted>")
            .field("engine_id", &self.engine_id)
            .finish()
    }
}

/// Resolve image search credentials
///
/// **Priority:** ENV → TOML
///
/// Returns `None` (search disabled) unless both the key and the engine id are
/// configured somewhere.
pub fn resolve_search_credentials(toml_config: &TomlConfig) -> Option<SearchCredentials> {
    let api_key = resolve_setting(
        "Search API key",
        SEARCH_API_KEY_ENV,
        toml_config.search.api_key.as_deref(),
    );
    let engine_id = resolve_setting(
        "Search engine id",
        SEARCH_ENGINE_ID_ENV,
        toml_config.search.engine_id.as_deref(),
    );

    match (api_key, engine_id) {
        (Some(api_key), Some(engine_id)) => Some(SearchCredentials { api_key, engine_id }),
        (None, None) => {
            info!(
                "Image search not configured ({} / {}); query-based assets will get placeholders",
                SEARCH_API_KEY_ENV, SEARCH_ENGINE_ID_ENV
            );
            None
        }
        (Some(_), None) => {
            warn!("Search API key configured without an engine id; image search disabled");
            None
        }
        (None, Some(_)) => {
            warn!("Search engine id configured without an API key; image search disabled");
            None
        }
    }
}

fn resolve_setting(name: &str, env_var: &str, toml_value: Option<&str>) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_key(v));
    let toml_value = toml_value.filter(|v| is_valid_key(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} found in multiple sources: environment, TOML. Using environment (highest priority).",
            name
        );
    }

    if let Some(value) = env_value {
        info!("{} loaded from environment variable", name);
        return Some(value);
    }

    toml_value.map(|value| {
        info!("{} loaded from TOML config", name);
        value.to_string()
    })
}

/// Validate a credential (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
