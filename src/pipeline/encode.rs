//! Image encoding: `DynamicImage` → AVIF file.
//!
//! AVIF keeps photos small enough for a static gallery page while holding
//! up visually at quality 80. The encoder is fed 8-bit RGB(A) only; other
//! pixel layouts are converted first so every source takes the same path.

use crate::error::ConvertError;
use image::codecs::avif::AvifEncoder;
use image::DynamicImage;
use std::path::Path;
use tracing::debug;

/// Quality/speed pair passed to the AVIF encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvifSettings {
    /// 1–100.
    pub quality: u8,
    /// 1 (slowest, smallest) – 10 (fastest).
    pub speed: u8,
}

impl Default for AvifSettings {
    fn default() -> Self {
        Self {
            quality: 80,
            speed: 6,
        }
    }
}

/// Encode `img` as AVIF into memory.
pub fn encode_avif(img: &DynamicImage, settings: AvifSettings) -> Result<Vec<u8>, ConvertError> {
    let normalised = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };

    let mut buf = Vec::new();
    let encoder = AvifEncoder::new_with_speed_quality(&mut buf, settings.speed, settings.quality);
    normalised
        .write_with_encoder(encoder)
        .map_err(|e| ConvertError::Encode(e.to_string()))?;

    debug!(
        "Encoded {}x{} image → {} bytes AVIF (q={}, speed={})",
        img.width(),
        img.height(),
        buf.len(),
        settings.quality,
        settings.speed
    );
    Ok(buf)
}

/// Encode `img` as AVIF and write it to `dest`.
pub fn write_avif(img: &DynamicImage, dest: &Path, settings: AvifSettings) -> Result<(), ConvertError> {
    let bytes = encode_avif(img, settings)?;
    std::fs::write(dest, bytes).map_err(|source| ConvertError::Io {
        path: dest.to_path_buf(),
        source,
    })
}
