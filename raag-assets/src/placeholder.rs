//! Placeholder fallback generator
//!
//! Writes the terminal stand-in for an asset whose acquisition failed.
//! Images are rendered (800x600, label in a built-in bitmap font) and encoded
//! in the destination's format; if that is not possible a text marker
//! `<stem>.placeholder.txt` is written instead. Audio gets one second of
//! silence as a WAV sibling of the destination.

use crate::catalog::{AssetDescriptor, MediaKind};
use crate::classifier::{audio_placeholder_path, image_marker_path};
use crate::content::encode_image;
use crate::error::AcquireError;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use raag_common::config::write_atomic;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PLACEHOLDER_WIDTH: u32 = 800;
pub const PLACEHOLDER_HEIGHT: u32 = 600;
const BACKGROUND: Rgb<u8> = Rgb([0xcc, 0xcc, 0xcc]);
const FOREGROUND: Rgb<u8> = Rgb([0x66, 0x66, 0x66]);

/// External placeholder service suggested in marker files
pub const PLACEHOLDER_SERVICE_URL: &str = "https://via.placeholder.com/800x600/e5e7eb/9ca3af";

pub const SILENCE_SAMPLE_RATE: u32 = 44_100;
pub const SILENCE_CHANNELS: u16 = 2;
pub const SILENCE_SECONDS: u32 = 1;

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const SCALE: u32 = 6;
const ADVANCE: u32 = (GLYPH_W + 1) * SCALE;
const LINE_HEIGHT: u32 = GLYPH_H * SCALE + 3 * SCALE;
const MARGIN: u32 = 40;

/// What was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    RenderedImage,
    Marker,
    SilentAudio,
}

/// A placeholder on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub path: PathBuf,
    pub kind: PlaceholderKind,
}

/// Writes placeholders under a root folder
#[derive(Debug, Clone)]
pub struct PlaceholderGenerator {
    root: PathBuf,
    audio_min_bytes: u64,
    image_min_bytes: u64,
}

impl PlaceholderGenerator {
    pub fn new(root: impl Into<PathBuf>, audio_min_bytes: u64, image_min_bytes: u64) -> Self {
        Self {
            root: root.into(),
            audio_min_bytes,
            image_min_bytes,
        }
    }

    /// Write the placeholder for `descriptor`, replacing any stale one
    ///
    /// Only errors when neither tier could write anything.
    pub fn make_placeholder(&self, descriptor: &AssetDescriptor) -> Result<Placeholder, AcquireError> {
        let destination = descriptor.destination_under(&self.root);
        match descriptor.media_kind() {
            MediaKind::Audio => self.silent_audio(&destination),
            MediaKind::Image => self.image(&destination, &descriptor.label),
        }
    }

    fn image(&self, destination: &Path, label: &str) -> Result<Placeholder, AcquireError> {
        match render_image_bytes(destination, label) {
            Ok(bytes) => {
                write_atomic(destination, &bytes).map_err(|e| fs_error(destination, e))?;
                remove_if_present(&image_marker_path(destination));
                debug!(path = %destination.display(), bytes = bytes.len(), "Rendered image placeholder");
                Ok(Placeholder {
                    path: destination.to_path_buf(),
                    kind: PlaceholderKind::RenderedImage,
                })
            }
            Err(reason) => {
                warn!(
                    path = %destination.display(),
                    reason = %reason,
                    "Cannot render image placeholder, writing marker instead"
                );
                let marker = image_marker_path(destination);
                write_atomic(&marker, marker_text(destination, label).as_bytes())
                    .map_err(|e| fs_error(&marker, e))?;
                remove_stale(destination, self.image_min_bytes);
                Ok(Placeholder {
                    path: marker,
                    kind: PlaceholderKind::Marker,
                })
            }
        }
    }

    fn silent_audio(&self, destination: &Path) -> Result<Placeholder, AcquireError> {
        let sibling = audio_placeholder_path(destination);
        remove_stale(destination, self.audio_min_bytes);
        write_silence(&sibling)?;
        debug!(path = %sibling.display(), "Wrote silent audio placeholder");
        Ok(Placeholder {
            path: sibling,
            kind: PlaceholderKind::SilentAudio,
        })
    }
}

fn fs_error(path: &Path, err: raag_common::Error) -> AcquireError {
    AcquireError::Filesystem {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Remove a sub-threshold file at `path` so it does not shadow the placeholder
fn remove_stale(path: &Path, threshold: u64) {
    let stale = fs::metadata(path)
        .map(|m| m.is_file() && m.len() < threshold)
        .unwrap_or(false);
    if stale {
        remove_if_present(path);
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed stale placeholder"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove stale file"),
    }
}

/// Render the label image and encode it in the destination's format
fn render_image_bytes(destination: &Path, label: &str) -> Result<Vec<u8>, String> {
    let format = ImageFormat::from_path(destination)
        .map_err(|e| format!("no image format for {}: {}", destination.display(), e))?;
    let img = DynamicImage::ImageRgb8(render_label(label));
    encode_image(&img, format).map_err(|e| e.to_string())
}

/// Text of the `.placeholder.txt` marker
pub fn marker_text(destination: &Path, label: &str) -> String {
    let url = reqwest::Url::parse_with_params(PLACEHOLDER_SERVICE_URL, &[("text", label)])
        .map(|u| u.to_string())
        .unwrap_or_else(|_| PLACEHOLDER_SERVICE_URL.to_string());
    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    format!(
        "Placeholder for: {}\nReplace with a real image saved as {}\nSuggested placeholder: {}\n",
        label, file_name, url
    )
}

/// Write one second of 16-bit stereo silence at 44.1 kHz
pub fn write_silence(path: &Path) -> Result<(), AcquireError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AcquireError::filesystem(parent, e))?;
    }

    let spec = hound::WavSpec {
        channels: SILENCE_CHANNELS,
        sample_rate: SILENCE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let temp = path.with_extension("wav.tmp");
    let to_error = |e: hound::Error| AcquireError::Filesystem {
        path: temp.clone(),
        message: e.to_string(),
    };

    let result = (|| -> Result<(), AcquireError> {
        let mut writer = hound::WavWriter::create(&temp, spec).map_err(to_error)?;
        let samples = SILENCE_SAMPLE_RATE * SILENCE_SECONDS * u32::from(SILENCE_CHANNELS);
        for _ in 0..samples {
            writer.write_sample(0i16).map_err(to_error)?;
        }
        writer.finalize().map_err(to_error)?;
        fs::rename(&temp, path).map_err(|e| AcquireError::filesystem(path, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// Draw `label` centred on an 800x600 grey canvas
pub fn render_label(label: &str) -> RgbImage {
    let mut img = RgbImage::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, BACKGROUND);

    let max_chars = ((PLACEHOLDER_WIDTH - 2 * MARGIN + SCALE) / ADVANCE) as usize;
    let max_lines = ((PLACEHOLDER_HEIGHT - 2 * MARGIN + 3 * SCALE) / LINE_HEIGHT) as usize;
    let lines: Vec<String> = wrap_label(label, max_chars).into_iter().take(max_lines).collect();

    let block_height = (lines.len() as u32 * LINE_HEIGHT).saturating_sub(3 * SCALE);
    let mut y = (PLACEHOLDER_HEIGHT.saturating_sub(block_height)) / 2;

    for line in &lines {
        let chars = line.chars().count() as u32;
        let line_width = (chars * ADVANCE).saturating_sub(SCALE);
        let mut x = (PLACEHOLDER_WIDTH.saturating_sub(line_width)) / 2;
        for c in line.chars() {
            draw_glyph(&mut img, x, y, glyph(c));
            x += ADVANCE;
        }
        y += LINE_HEIGHT;
    }

    img
}

/// Greedy word wrap; words longer than a line are split
pub fn wrap_label(label: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in label.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn draw_glyph(img: &mut RgbImage, x0: u32, y0: u32, rows: [u8; 7]) {
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_W {
            if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                continue;
            }
            let px = x0 + col * SCALE;
            let py = y0 + row as u32 * SCALE;
            for dy in 0..SCALE {
                for dx in 0..SCALE {
                    if px + dx < img.width() && py + dy < img.height() {
                        img.put_pixel(px + dx, py + dy, FOREGROUND);
                    }
                }
            }
        }
    }
}

/// 5x7 bitmap rows, bit 4 is the leftmost column
fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        ' ' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '&' => [0x0C, 0x12, 0x14, 0x08, 0x15, 0x12, 0x0D],
        '\'' => [0x0C, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AssetCategory, SourceHint};
    use tempfile::TempDir;

    fn generator(root: &Path) -> PlaceholderGenerator {
        PlaceholderGenerator::new(root, 300_000, 50_000)
    }

    fn asset(path: &str, category: AssetCategory) -> AssetDescriptor {
        AssetDescriptor::new(path, SourceHint::Url("https://example.org/x".into()), path, category)
    }

    #[test]
    fn test_wrap_label() {
        assert_eq!(wrap_label("Tamilnadu Veena", 20), vec!["Tamilnadu Veena"]);
        assert_eq!(
            wrap_label("Rajasthan Performance Evening", 20),
            vec!["Rajasthan", "Performance Evening"]
        );
        assert_eq!(wrap_label("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert!(wrap_label("   ", 10).is_empty());
    }

    #[test]
    fn test_render_label_draws_text() {
        let img = render_label("Kerala Chenda");
        assert_eq!(img.dimensions(), (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT));
        assert_eq!(*img.get_pixel(0, 0), BACKGROUND);
        assert!(img.pixels().any(|p| *p == FOREGROUND));
    }

    #[test]
    fn test_image_placeholder_is_small_jpeg() {
        let dir = TempDir::new().unwrap();
        let gen = generator(dir.path());
        let placeholder = gen
            .make_placeholder(&asset("images/kerala-chenda.jpg", AssetCategory::Instrument))
            .unwrap();

        assert_eq!(placeholder.kind, PlaceholderKind::RenderedImage);
        let bytes = fs::read(&placeholder.path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        assert!(!bytes.is_empty());
        assert!((bytes.len() as u64) < 50_000);
    }

    #[test]
    fn test_unrenderable_extension_writes_marker() {
        let dir = TempDir::new().unwrap();
        let gen = generator(dir.path());
        let placeholder = gen
            .make_placeholder(&asset("images/india-map.svg", AssetCategory::Other))
            .unwrap();

        assert_eq!(placeholder.kind, PlaceholderKind::Marker);
        assert_eq!(placeholder.path, dir.path().join("images/india-map.placeholder.txt"));
        let text = fs::read_to_string(&placeholder.path).unwrap();
        assert!(text.contains("India Map"));
        assert!(text.contains("via.placeholder.com/800x600/e5e7eb/9ca3af?text=India+Map"));
    }

    #[test]
    fn test_marker_replaced_by_rendered_image() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("images/a.jpg");
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(image_marker_path(&destination), "Placeholder for: A\n").unwrap();

        generator(dir.path())
            .make_placeholder(&asset("images/a.jpg", AssetCategory::Instrument))
            .unwrap();

        assert!(destination.exists());
        assert!(!image_marker_path(&destination).exists());
    }

    #[test]
    fn test_silent_audio_sibling() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("audio/ambient/river.mp3");
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(&destination, b"truncated").unwrap();

        let placeholder = generator(dir.path())
            .make_placeholder(&asset("audio/ambient/river.mp3", AssetCategory::AmbientAudio))
            .unwrap();

        assert_eq!(placeholder.kind, PlaceholderKind::SilentAudio);
        assert_eq!(placeholder.path, dir.path().join("audio/ambient/river.wav"));
        assert!(!destination.exists());

        let reader = hound::WavReader::open(&placeholder.path).unwrap();
        assert_eq!(reader.spec().sample_rate, 44_100);
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.duration(), 44_100);
        let len = fs::metadata(&placeholder.path).unwrap().len();
        assert!(len < 300_000);
    }

    #[test]
    fn test_wav_destination_uses_placeholder_suffix() {
        let dir = TempDir::new().unwrap();
        let placeholder = generator(dir.path())
            .make_placeholder(&asset("audio/drone.wav", AssetCategory::InstrumentAudio))
            .unwrap();
        assert_eq!(placeholder.path, dir.path().join("audio/drone.placeholder.wav"));
    }

    #[test]
    fn test_placeholder_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let gen = generator(dir.path());
        let descriptor = asset("images/b.png", AssetCategory::Performance);

        let first = gen.make_placeholder(&descriptor).unwrap();
        let first_bytes = fs::read(&first.path).unwrap();
        let second = gen.make_placeholder(&descriptor).unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read(&second.path).unwrap(), first_bytes);
    }
}
