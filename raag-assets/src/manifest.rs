//! Manifest reconciler
//!
//! Rebuilds the JSON manifest from what is on disk right now. Run statistics
//! and the checkpoint describe what happened; the manifest only describes
//! what is true, so every entry is re-classified on every reconcile.

use crate::catalog::{AssetCategory, AssetDescriptor, Catalog};
use crate::classifier::{AssetState, ExistenceClassifier};
use raag_common::config::write_atomic;
use raag_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};
use tracing::{debug, info, warn};

pub const MANIFEST_VERSION: &str = "1.0";

/// Timestamp format of `lastUpdated`
const LAST_UPDATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Status of one asset as observed on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub exists: bool,
    pub is_placeholder: bool,
    /// Web path of the genuine asset (`/images/...`)
    pub path: String,
    pub category: AssetCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Web path of the placeholder sibling currently standing in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_path: Option<String>,
}

/// Bucket name → asset id → entry
pub type Buckets = BTreeMap<String, BTreeMap<String, ManifestEntry>>;

/// The manifest document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    pub version: String,
    #[serde(rename = "lastUpdated")]
    pub last_updated: String,
    #[serde(flatten)]
    pub buckets: Buckets,
}

impl ManifestDocument {
    /// Look up an entry by id across buckets
    pub fn entry(&self, id: &str) -> Option<&ManifestEntry> {
        self.buckets.values().find_map(|bucket| bucket.get(id))
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.buckets.values().flat_map(|bucket| bucket.iter())
    }
}

/// Outcome of writing the manifest
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub document: ManifestDocument,
    /// False when entries matched the previous manifest and the file kept its timestamp
    pub changed: bool,
    pub present: usize,
    pub placeholders: usize,
    pub missing: usize,
}

/// Classify every catalog entry under `root` into manifest entries
pub fn build_entries(catalog: &Catalog, root: &Path, classifier: &ExistenceClassifier) -> Buckets {
    let mut buckets = Buckets::new();
    for descriptor in catalog.entries() {
        buckets
            .entry(descriptor.category.bucket().to_string())
            .or_default()
            .insert(descriptor.id.clone(), entry_for(descriptor, root, classifier));
    }
    buckets
}

fn entry_for(
    descriptor: &AssetDescriptor,
    root: &Path,
    classifier: &ExistenceClassifier,
) -> ManifestEntry {
    let destination = descriptor.destination_under(root);
    let classification = classifier.classify(&destination, descriptor.category);

    let fallback_path = if classification.is_sibling_of(&destination) {
        classification
            .occupant
            .as_deref()
            .and_then(|occupant| occupant.strip_prefix(root).ok())
            .map(web_path)
    } else {
        None
    };

    ManifestEntry {
        exists: classification.state != AssetState::Missing,
        is_placeholder: classification.state == AssetState::PlaceholderPresent,
        path: web_path(&descriptor.destination),
        category: descriptor.category,
        description: Some(descriptor.label.clone()).filter(|l| !l.is_empty()),
        fallback_path,
    }
}

/// `images/a b.jpg` → `/images/a b.jpg` (forward slashes on every platform)
pub fn web_path(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", parts.join("/"))
}

/// Read an existing manifest; unreadable or malformed files count as absent
pub fn read_manifest(path: &Path) -> Option<ManifestDocument> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(document) => Some(document),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Existing manifest is malformed, rewriting it");
            None
        }
    }
}

/// Reconcile the manifest at `manifest_path` with disk state under `root`
///
/// The previous `lastUpdated` is kept when no entry changed, so an unchanged
/// tree produces a byte-identical manifest. Written atomically.
pub fn reconcile(
    catalog: &Catalog,
    root: &Path,
    classifier: &ExistenceClassifier,
    manifest_path: &Path,
) -> Result<ReconcileReport> {
    let buckets = build_entries(catalog, root, classifier);
    let previous = read_manifest(manifest_path);

    let unchanged = previous
        .as_ref()
        .is_some_and(|p| p.version == MANIFEST_VERSION && p.buckets == buckets);

    let last_updated = match (&previous, unchanged) {
        (Some(p), true) => p.last_updated.clone(),
        _ => chrono::Local::now().format(LAST_UPDATED_FORMAT).to_string(),
    };

    let document = ManifestDocument {
        version: MANIFEST_VERSION.to_string(),
        last_updated,
        buckets,
    };

    let mut json = serde_json::to_string_pretty(&document)?;
    json.push('\n');
    write_atomic(manifest_path, json.as_bytes())?;

    let (mut present, mut placeholders, mut missing) = (0, 0, 0);
    for (_, entry) in document.entries() {
        match (entry.exists, entry.is_placeholder) {
            (false, _) => missing += 1,
            (true, true) => placeholders += 1,
            (true, false) => present += 1,
        }
    }

    if unchanged {
        debug!(path = %manifest_path.display(), "Manifest unchanged");
    } else {
        info!(
            path = %manifest_path.display(),
            present, placeholders, missing,
            "Manifest written"
        );
    }

    Ok(ReconcileReport {
        document,
        changed: !unchanged,
        present,
        placeholders,
        missing,
    })
}
