//! Camera-native (HEIC/HEIF) decoding through libheif.
//!
//! Only compiled in with the `heic` feature, since it links against the
//! system libheif. Without the feature [`probe`] reports the decoder as
//! unavailable and HEIC payloads fail conversion with a clear reason.

use crate::error::ConvertError;
use image::DynamicImage;
use std::path::Path;

/// Whether this build can decode HEIC/HEIF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeifSupport {
    Available,
    Unavailable(String),
}

/// Check decoder availability. Called once per converter.
#[cfg(feature = "heic")]
pub fn probe() -> HeifSupport {
    HeifSupport::Available
}

#[cfg(not(feature = "heic"))]
pub fn probe() -> HeifSupport {
    HeifSupport::Unavailable("built without the `heic` feature".to_string())
}

/// Decode the primary image of a HEIC/HEIF file to 8-bit RGB(A).
#[cfg(feature = "heic")]
pub fn decode(path: &Path) -> Result<DynamicImage, ConvertError> {
    use image::{RgbImage, RgbaImage};
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let decode_err = |e: libheif_rs::HeifError| ConvertError::Decode(e.to_string());

    let path_str = path
        .to_str()
        .ok_or_else(|| ConvertError::Decode(format!("non UTF-8 path '{}'", path.display())))?;

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_file(path_str).map_err(decode_err)?;
    let handle = ctx.primary_image_handle().map_err(decode_err)?;
    let has_alpha = handle.has_alpha_channel();
    let chroma = if has_alpha {
        RgbChroma::Rgba
    } else {
        RgbChroma::Rgb
    };

    let decoded = lib_heif
        .decode(&handle, ColorSpace::Rgb(chroma), None)
        .map_err(decode_err)?;
    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| ConvertError::Decode("decoder returned no interleaved plane".into()))?;

    let channels = if has_alpha { 4 } else { 3 };
    let row_len = plane.width as usize * channels;
    // Rows are padded to `stride`; copy out the tight pixel rows.
    let mut pixels = Vec::with_capacity(row_len * plane.height as usize);
    for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
        pixels.extend_from_slice(&row[..row_len]);
    }

    let image = if has_alpha {
        RgbaImage::from_raw(plane.width, plane.height, pixels).map(DynamicImage::ImageRgba8)
    } else {
        RgbImage::from_raw(plane.width, plane.height, pixels).map(DynamicImage::ImageRgb8)
    };
    image.ok_or_else(|| ConvertError::Decode("decoded buffer has the wrong size".into()))
}

#[cfg(not(feature = "heic"))]
pub fn decode(path: &Path) -> Result<DynamicImage, ConvertError> {
    let _ = path;
    Err(ConvertError::CameraNativeUnavailable(
        "built without the `heic` feature".to_string(),
    ))
}
