//! Asset catalog
//!
//! The catalog is the static, ordered list of assets the website expects,
//! each with a source hint (direct URL or search query), a destination
//! relative to the root folder, and a category. Catalog order is processing
//! order.

use raag_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Built-in catalog mirroring the asset tables of the website
const BUILTIN_CATALOG: &str = include_str!("../data/catalog.toml");

/// Asset category; decides media kind, genuineness threshold and manifest bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetCategory {
    Instrument,
    Performance,
    Artist,
    AmbientAudio,
    InstrumentAudio,
    EnsembleAudio,
    Other,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 7] = [
        AssetCategory::Instrument,
        AssetCategory::Performance,
        AssetCategory::Artist,
        AssetCategory::AmbientAudio,
        AssetCategory::InstrumentAudio,
        AssetCategory::EnsembleAudio,
        AssetCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Instrument => "instrument",
            AssetCategory::Performance => "performance",
            AssetCategory::Artist => "artist",
            AssetCategory::AmbientAudio => "ambient-audio",
            AssetCategory::InstrumentAudio => "instrument-audio",
            AssetCategory::EnsembleAudio => "ensemble-audio",
            AssetCategory::Other => "other",
        }
    }

    /// Top-level key of this category in the manifest document
    pub fn bucket(&self) -> &'static str {
        match self {
            AssetCategory::Instrument => "instruments",
            AssetCategory::Performance => "performance",
            AssetCategory::Artist => "artists",
            AssetCategory::AmbientAudio => "ambient",
            AssetCategory::InstrumentAudio => "instrumentAudio",
            AssetCategory::EnsembleAudio => "ensembles",
            AssetCategory::Other => "other",
        }
    }

    /// Media kind implied by the category; `Other` falls back to the extension
    pub fn media_kind(&self, destination: &Path) -> MediaKind {
        match self {
            AssetCategory::Instrument | AssetCategory::Performance | AssetCategory::Artist => {
                MediaKind::Image
            }
            AssetCategory::AmbientAudio
            | AssetCategory::InstrumentAudio
            | AssetCategory::EnsembleAudio => MediaKind::Audio,
            AssetCategory::Other => MediaKind::from_extension(destination),
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        AssetCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Unknown category '{}' (expected one of: {})",
                    s,
                    AssetCategory::ALL
                        .iter()
                        .map(|c| c.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

/// Whether an asset is an image or an audio clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    /// Guess from the file extension; unknown extensions count as images
    pub fn from_extension(path: &Path) -> MediaKind {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "mp3" | "wav" | "ogg" | "oga" | "flac" | "m4a" | "aac" | "opus" => MediaKind::Audio,
            _ => MediaKind::Image,
        }
    }
}

/// Where an asset comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceHint {
    /// Direct download URL
    Url(String),
    /// Query terms for a search provider
    Query(String),
}

impl SourceHint {
    pub fn is_query(&self) -> bool {
        matches!(self, SourceHint::Query(_))
    }
}

/// Immutable description of one cataloged asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDescriptor {
    /// Unique identifier (also the checkpoint line)
    pub id: String,
    /// Direct URL or search query
    pub source: SourceHint,
    /// Destination relative to the root folder
    pub destination: PathBuf,
    pub category: AssetCategory,
    /// Human-readable label used for placeholders and the manifest description
    pub label: String,
}

impl AssetDescriptor {
    /// Create a descriptor with a label derived from the destination filename
    pub fn new(
        id: impl Into<String>,
        source: SourceHint,
        destination: impl Into<PathBuf>,
        category: AssetCategory,
    ) -> Self {
        let destination = destination.into();
        let label = derive_label(&destination);
        Self {
            id: id.into(),
            source,
            destination,
            category,
            label,
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        self.category.media_kind(&self.destination)
    }

    /// Absolute destination under `root`
    pub fn destination_under(&self, root: &Path) -> PathBuf {
        root.join(&self.destination)
    }
}

/// Derive a display label from a filename
///
/// `artists/lakha-khan-profile.jpg` → `Lakha Khan`,
/// `tabla_isolated_beat.mp3` → `Tabla Isolated Beat`
pub fn derive_label(destination: &Path) -> String {
    let stem = destination
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let stem = stem
        .strip_suffix("-profile")
        .or_else(|| stem.strip_suffix("-performance"))
        .unwrap_or(stem);

    stem.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Catalog file layout (TOML)
#[derive(Debug, Deserialize)]
struct CatalogFile {
    /// Extra query words per category, appended to search queries
    #[serde(default)]
    search_context: HashMap<String, String>,
    #[serde(default)]
    assets: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: String,
    category: AssetCategory,
    path: PathBuf,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

/// Ordered, validated asset catalog
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<AssetDescriptor>,
    search_context: HashMap<AssetCategory, String>,
}

impl Catalog {
    /// Catalog compiled into the binary
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// Load a catalog TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read catalog {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a catalog document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;

        let mut search_context = HashMap::new();
        for (key, words) in file.search_context {
            search_context.insert(key.parse::<AssetCategory>()?, words);
        }

        let mut entries = Vec::with_capacity(file.assets.len());
        for entry in file.assets {
            let source = match (entry.url, entry.query) {
                (Some(url), None) => SourceHint::Url(url),
                (None, Some(query)) => SourceHint::Query(query),
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "Catalog entry '{}' must have exactly one of `url` or `query`",
                        entry.id
                    )))
                }
            };
            let mut descriptor = AssetDescriptor::new(entry.id, source, entry.path, entry.category);
            if let Some(label) = entry.label {
                descriptor.label = label;
            }
            entries.push(descriptor);
        }

        let mut catalog = Self::from_descriptors(entries)?;
        catalog.search_context = search_context;
        Ok(catalog)
    }

    /// Build a catalog from descriptors, validating ids and destinations
    pub fn from_descriptors(entries: Vec<AssetDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for descriptor in &entries {
            validate_descriptor(descriptor)?;
            if !seen.insert(descriptor.id.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Duplicate catalog id '{}'",
                    descriptor.id
                )));
            }
        }

        Ok(Self {
            entries,
            search_context: HashMap::new(),
        })
    }

    pub fn with_search_context(mut self, category: AssetCategory, words: impl Into<String>) -> Self {
        self.search_context.insert(category, words.into());
        self
    }

    pub fn entries(&self) -> &[AssetDescriptor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&AssetDescriptor> {
        self.entries.iter().find(|d| d.id == id)
    }

    /// Extra search words for a category (empty when none configured)
    pub fn search_context(&self, category: AssetCategory) -> &str {
        self.search_context
            .get(&category)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Entries matching the category filter, in catalog order, capped at `limit`
    ///
    /// An empty filter selects every category.
    pub fn select(&self, categories: &[AssetCategory], limit: Option<usize>) -> Vec<&AssetDescriptor> {
        self.entries
            .iter()
            .filter(|d| categories.is_empty() || categories.contains(&d.category))
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }
}

fn validate_descriptor(descriptor: &AssetDescriptor) -> Result<()> {
    let id = descriptor.id.as_str();
    if id.trim().is_empty() {
        return Err(Error::InvalidInput("Catalog id must not be empty".to_string()));
    }
    // Checkpoint lines are trimmed on read, so padded ids would never match
    if id != id.trim() {
        return Err(Error::InvalidInput(format!(
            "Catalog id {:?} must not have leading or trailing whitespace",
            id
        )));
    }
    if id.contains('\n') || id.contains('\r') {
        return Err(Error::InvalidInput(format!(
            "Catalog id {:?} must not contain line breaks",
            id
        )));
    }

    let source_empty = match &descriptor.source {
        SourceHint::Url(url) | SourceHint::Query(url) => url.trim().is_empty(),
    };
    if source_empty {
        return Err(Error::InvalidInput(format!(
            "Catalog entry '{}' has an empty source",
            id
        )));
    }

    let destination = &descriptor.destination;
    if destination.as_os_str().is_empty() || destination.file_name().is_none() {
        return Err(Error::InvalidInput(format!(
            "Catalog entry '{}' has no destination filename",
            id
        )));
    }
    let escapes_root = destination
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes_root {
        return Err(Error::InvalidInput(format!(
            "Catalog entry '{}' destination {} must be relative and stay under the root folder",
            id,
            destination.display()
        )));
    }

    Ok(())
}
