//! JPEG re-encoding for images sent inline to generative models.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ColorType;
use std::path::Path;

use crate::error::{MediaError, MediaResult};

/// Default longest-edge bound for inline images.
pub const DEFAULT_MAX_EDGE: u32 = 1024;

/// Default JPEG quality for inline images.
pub const DEFAULT_QUALITY: u8 = 85;

/// Decode an image, downscale it so neither edge exceeds `max_edge`, and
/// re-encode it as RGB JPEG.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn encode_bounded_jpeg(path: &Path, max_edge: u32, quality: u8) -> MediaResult<Vec<u8>> {
    let img = image::open(path)
        .map_err(|e| MediaError::image(format!("{}: {}", path.display(), e)))?;

    let img = if img.width() > max_edge || img.height() > max_edge {
        img.resize(max_edge, max_edge, FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| MediaError::image(e.to_string()))?;

    Ok(buf)
}
