//! Content validation and image normalization
//!
//! Runs on the staging file after a successful transfer and before it is
//! promoted over the destination. Bytes that are not the expected media kind
//! are rejected with `InvalidContent`, which is terminal for the asset.

use crate::catalog::MediaKind;
use crate::error::AcquireError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;

/// Largest width kept as-is
pub const MAX_IMAGE_WIDTH: u32 = 1920;

/// Largest height kept as-is
pub const MAX_IMAGE_HEIGHT: u32 = 1080;

/// JPEG quality for re-encoded images
pub const JPEG_QUALITY: u8 = 85;

/// Validate `staging` as `kind`; images may be rewritten in place
///
/// `destination` only decides the output image format. Returns the final
/// size of the staging file.
pub fn validate_staged(
    staging: &Path,
    destination: &Path,
    kind: MediaKind,
) -> Result<u64, AcquireError> {
    match kind {
        MediaKind::Audio => check_audio(staging),
        MediaKind::Image => normalize_image(staging, destination),
    }
}

fn check_audio(path: &Path) -> Result<u64, AcquireError> {
    let detected = infer::get_from_path(path).map_err(|e| AcquireError::filesystem(path, e))?;

    match detected {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Audio => {
            debug!(path = %path.display(), mime = kind.mime_type(), "Audio content verified");
            file_len(path)
        }
        Some(kind) => Err(AcquireError::InvalidContent(format!(
            "expected audio, received {}",
            kind.mime_type()
        ))),
        None if is_mpeg_frame_header(&read_header(path)?) => {
            debug!(path = %path.display(), "MPEG frame sync found");
            file_len(path)
        }
        None => Err(AcquireError::InvalidContent(
            "unrecognised bytes, expected audio".to_string(),
        )),
    }
}

/// True when `header` starts with a plausible MPEG audio frame header
///
/// `infer` only knows ID3 tags and MPEG-1 Layer III without CRC, so untagged
/// MPEG-2/2.5 streams and CRC-protected frames are checked here: 11 sync
/// bits, then no reserved version, layer or sample rate and no bad bitrate.
pub fn is_mpeg_frame_header(header: &[u8]) -> bool {
    let &[b0, b1, b2, ..] = header else {
        return false;
    };
    let version = (b1 >> 3) & 0b11;
    let layer = (b1 >> 1) & 0b11;
    let bitrate = b2 >> 4;
    let sample_rate = (b2 >> 2) & 0b11;

    b0 == 0xFF
        && b1 & 0xE0 == 0xE0
        && version != 0b01
        && layer != 0b00
        && bitrate != 0b1111
        && sample_rate != 0b11
}

fn read_header(path: &Path) -> Result<Vec<u8>, AcquireError> {
    let file = fs::File::open(path).map_err(|e| AcquireError::filesystem(path, e))?;
    let mut header = Vec::with_capacity(4);
    file.take(4)
        .read_to_end(&mut header)
        .map_err(|e| AcquireError::filesystem(path, e))?;
    Ok(header)
}

fn normalize_image(staging: &Path, destination: &Path) -> Result<u64, AcquireError> {
    let bytes = fs::read(staging).map_err(|e| AcquireError::filesystem(staging, e))?;

    let source_format = image::guess_format(&bytes).ok();
    let img = image::load_from_memory(&bytes)
        .map_err(|e| AcquireError::InvalidContent(format!("not a decodable image: {}", e)))?;

    let target_format = ImageFormat::from_path(destination).ok().or(source_format);
    let (width, height) = img.dimensions();
    let oversized = width > MAX_IMAGE_WIDTH || height > MAX_IMAGE_HEIGHT;
    let format_mismatch = target_format.is_some() && target_format != source_format;

    if !oversized && !format_mismatch {
        return Ok(bytes.len() as u64);
    }

    let img = if oversized {
        debug!(width, height, "Downscaling oversized image");
        img.resize(MAX_IMAGE_WIDTH, MAX_IMAGE_HEIGHT, FilterType::Lanczos3)
    } else {
        img
    };

    let encoded = encode_image(&img, target_format.unwrap_or(ImageFormat::Jpeg))?;
    fs::write(staging, &encoded).map_err(|e| AcquireError::filesystem(staging, e))?;
    Ok(encoded.len() as u64)
}

/// Encode `img` as `format`; JPEG output drops alpha by compositing on white
pub fn encode_image(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, AcquireError> {
    let mut buf = Vec::new();
    let result = match format {
        ImageFormat::Jpeg => {
            let rgb = flatten_onto_white(img);
            let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
            rgb.write_with_encoder(encoder)
        }
        other => img.write_to(&mut Cursor::new(&mut buf), other),
    };

    result.map_err(|e| AcquireError::InvalidContent(format!("re-encoding as {:?} failed: {}", format, e)))?;
    Ok(buf)
}

/// Composite any transparency over a white background
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

fn file_len(path: &Path) -> Result<u64, AcquireError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| AcquireError::filesystem(path, e))
}
