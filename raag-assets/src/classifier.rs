//! Existence classifier
//!
//! Decides whether an asset is missing, backed by a placeholder, or present
//! as genuine content, purely from filesystem state and the size thresholds.
//!
//! Lookup order is exact destination first, then the declared placeholder
//! siblings (`<stem>.wav` for audio, `<stem>.placeholder.txt` marker for
//! images). A zero-length file is a torn write and counts as absent.

use crate::catalog::{AssetCategory, MediaKind};
use crate::config::PipelineConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// Derived on-disk state of one asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetState {
    Missing,
    PlaceholderPresent,
    GenuinePresent,
}

/// Classification result with the file that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub state: AssetState,
    /// File occupying the asset slot (exact destination or a placeholder sibling)
    pub occupant: Option<PathBuf>,
}

impl Classification {
    fn missing() -> Self {
        Self {
            state: AssetState::Missing,
            occupant: None,
        }
    }

    /// True when the occupant is a declared sibling, not the destination itself
    pub fn is_sibling_of(&self, destination: &Path) -> bool {
        self.occupant
            .as_deref()
            .is_some_and(|occupant| occupant != destination)
    }
}

/// Size-threshold classifier
#[derive(Debug, Clone, Copy)]
pub struct ExistenceClassifier {
    audio_min_bytes: u64,
    image_min_bytes: u64,
}

impl ExistenceClassifier {
    pub fn new(audio_min_bytes: u64, image_min_bytes: u64) -> Self {
        Self {
            audio_min_bytes,
            image_min_bytes,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.audio_genuine_min_bytes, config.image_genuine_min_bytes)
    }

    fn threshold(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Audio => self.audio_min_bytes,
            MediaKind::Image => self.image_min_bytes,
        }
    }

    /// Classify the absolute `destination` of an asset of `category`
    pub fn classify(&self, destination: &Path, category: AssetCategory) -> Classification {
        let kind = category.media_kind(destination);

        if let Some(len) = non_empty_len(destination) {
            let state = if len < self.threshold(kind) {
                AssetState::PlaceholderPresent
            } else {
                AssetState::GenuinePresent
            };
            return Classification {
                state,
                occupant: Some(destination.to_path_buf()),
            };
        }

        placeholder_siblings(destination, kind)
            .into_iter()
            .find(|sibling| non_empty_len(sibling).is_some())
            .map(|sibling| Classification {
                state: AssetState::PlaceholderPresent,
                occupant: Some(sibling),
            })
            .unwrap_or_else(Classification::missing)
    }
}

fn non_empty_len(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .filter(|len| *len > 0)
}

/// Sibling for a silent audio placeholder
///
/// `ambient/river.mp3` → `ambient/river.wav`;
/// `ambient/river.wav` → `ambient/river.placeholder.wav`
pub fn audio_placeholder_path(destination: &Path) -> PathBuf {
    let is_wav = destination
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

    if is_wav {
        with_suffix(destination, ".placeholder.wav")
    } else {
        destination.with_extension("wav")
    }
}

/// Marker written when an image placeholder cannot be rendered
pub fn image_marker_path(destination: &Path) -> PathBuf {
    with_suffix(destination, ".placeholder.txt")
}

/// Every sibling a placeholder of this kind may live at
pub fn placeholder_siblings(destination: &Path, kind: MediaKind) -> Vec<PathBuf> {
    match kind {
        MediaKind::Audio => vec![audio_placeholder_path(destination)],
        MediaKind::Image => vec![image_marker_path(destination)],
    }
}

/// Replace the extension of the file name with `suffix` (which includes the dot)
fn with_suffix(destination: &Path, suffix: &str) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!("{}{}", stem, suffix))
}
