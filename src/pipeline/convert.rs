//! Format conversion: classified payload → canonical AVIF asset.
//!
//! Every kind goes through the same three steps:
//!
//! ```text
//!  staged payload ──► strategy (kind → DynamicImage) ──► AVIF encode ──► validation gate
//!                                                                          │
//!                                     delete staged payload ◄── passed ────┤
//!                                     remove output, keep staged ◄── failed┘
//! ```
//!
//! Strategies are looked up in [`STRATEGIES`] by [`ClassifiedKind`]. A kind
//! with no entry fails as [`ConvertError::Unsupported`]. A payload that
//! already carries the canonical extension skips decoding and is moved into
//! place after the size check.
//!
//! The staged payload is only deleted after the canonical file has been
//! written and passed the size check, so a bad conversion never loses the
//! source bytes.

use crate::config::{HarvestConfig, CANONICAL_EXTENSION};
use crate::error::ConvertError;
use crate::pipeline::classify::{Classification, ClassifiedKind};
use crate::pipeline::encode::{self, AvifSettings};
use crate::pipeline::heif::{self, HeifSupport};
use crate::pipeline::render;
use image::{DynamicImage, ImageReader};
use pdfium_bootstrap::Bootstrap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Turns a staged file of one kind into pixels.
type Strategy = fn(&FormatConverter, &Path) -> Result<DynamicImage, ConvertError>;

/// One entry per convertible kind. `Unknown` has none on purpose.
const STRATEGIES: &[(ClassifiedKind, Strategy)] = &[
    (ClassifiedKind::Document, FormatConverter::decode_document),
    (ClassifiedKind::Raster, FormatConverter::decode_raster),
    (ClassifiedKind::CameraNative, FormatConverter::decode_camera_native),
];

/// Canonical asset path for `target`: its extension replaced, never appended.
pub fn canonical_path(target: &Path) -> PathBuf {
    target.with_extension(CANONICAL_EXTENSION)
}

/// Converts classified payloads to canonical assets.
///
/// Holds the lazily probed HEIF decoder state, so one converter should be
/// shared across a run rather than built per slot.
#[derive(Debug)]
pub struct FormatConverter {
    settings: AvifSettings,
    min_output_bytes: u64,
    render_scale: f32,
    engine: Bootstrap,
    heif: OnceLock<HeifSupport>,
}

impl FormatConverter {
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            settings: AvifSettings {
                quality: config.avif_quality,
                speed: config.avif_speed,
            },
            min_output_bytes: config.min_output_bytes,
            render_scale: config.render_scale,
            engine: Bootstrap::from_env().allow_download(config.allow_engine_download),
            heif: OnceLock::new(),
        }
    }

    /// Replace the PDF engine locator.
    pub fn with_engine(mut self, engine: Bootstrap) -> Self {
        self.engine = engine;
        self
    }

    /// Probe the HEIF decoder on first call; later calls return the cached answer.
    pub fn ensure_heif_support(&self) -> &HeifSupport {
        self.heif.get_or_init(|| {
            let support = heif::probe();
            match &support {
                HeifSupport::Available => debug!("HEIC/HEIF decoder registered"),
                HeifSupport::Unavailable(reason) => {
                    warn!("HEIC/HEIF uploads cannot be converted: {}", reason)
                }
            }
            support
        })
    }

    /// True once [`Self::ensure_heif_support`] has run.
    pub fn heif_initialised(&self) -> bool {
        self.heif.get().is_some()
    }

    /// Convert `classified` into the canonical asset for `target`.
    ///
    /// Returns the canonical path. On error no canonical file is left behind
    /// and the staged payload is untouched.
    pub fn convert(
        &self,
        classified: &Classification,
        target: &Path,
    ) -> Result<PathBuf, ConvertError> {
        let staged = classified.path.as_path();
        if has_canonical_extension(staged) {
            return self.adopt(staged, target);
        }

        let strategy = STRATEGIES
            .iter()
            .find(|(kind, _)| *kind == classified.kind)
            .map(|(_, strategy)| *strategy)
            .ok_or_else(|| ConvertError::Unsupported {
                extension: staged
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_string(),
            })?;

        let image = strategy(self, staged)?;
        let canonical = canonical_path(target);

        if let Err(e) = encode::write_avif(&image, &canonical, self.settings) {
            discard(&canonical);
            return Err(e);
        }
        self.validate(&canonical)?;

        if staged != canonical {
            if let Err(e) = std::fs::remove_file(staged) {
                warn!("Could not remove staged file {}: {}", staged.display(), e);
            }
        }
        info!(
            "Converted {} → {}",
            staged.display(),
            canonical.display()
        );
        Ok(canonical)
    }

    /// Run [`Self::convert`] on the blocking pool.
    pub async fn convert_blocking(
        self: &Arc<Self>,
        classified: Classification,
        target: PathBuf,
    ) -> Result<PathBuf, ConvertError> {
        let converter = Arc::clone(self);
        tokio::task::spawn_blocking(move || converter.convert(&classified, &target))
            .await
            .map_err(|e| ConvertError::Task(e.to_string()))?
    }

    /// A payload delivered in the canonical format is moved into place as-is,
    /// once it has passed the size check.
    fn adopt(&self, staged: &Path, target: &Path) -> Result<PathBuf, ConvertError> {
        let size = std::fs::metadata(staged).map(|m| m.len()).unwrap_or(0);
        if size <= self.min_output_bytes {
            return Err(ConvertError::Undersized {
                path: staged.to_path_buf(),
                size,
                min: self.min_output_bytes,
            });
        }
        let canonical = canonical_path(target);
        std::fs::rename(staged, &canonical).map_err(|source| ConvertError::Io {
            path: staged.to_path_buf(),
            source,
        })?;
        info!("Kept {} as delivered", canonical.display());
        Ok(canonical)
    }

    /// The canonical file must exist and be larger than `min_output_bytes`.
    fn validate(&self, canonical: &Path) -> Result<(), ConvertError> {
        let size = std::fs::metadata(canonical).map(|m| m.len()).unwrap_or(0);
        if size > self.min_output_bytes {
            return Ok(());
        }
        discard(canonical);
        Err(ConvertError::Undersized {
            path: canonical.to_path_buf(),
            size,
            min: self.min_output_bytes,
        })
    }

    // ── Strategies ───────────────────────────────────────────────────────

    fn decode_document(&self, path: &Path) -> Result<DynamicImage, ConvertError> {
        render::render_first_page(path, self.render_scale, &self.engine)
    }

    fn decode_raster(&self, path: &Path) -> Result<DynamicImage, ConvertError> {
        let reader = open_sniffed(path)?;
        Ok(reader.decode()?)
    }

    /// Phones often label plain JPEGs as HEIC, so sniff before reaching for libheif.
    fn decode_camera_native(&self, path: &Path) -> Result<DynamicImage, ConvertError> {
        let reader = open_sniffed(path)?;
        if let Some(format) = reader.format() {
            debug!("{} sniffed as {:?}", path.display(), format);
            return Ok(reader.decode()?);
        }

        match self.ensure_heif_support() {
            HeifSupport::Available => heif::decode(path),
            HeifSupport::Unavailable(reason) => {
                Err(ConvertError::CameraNativeUnavailable(reason.clone()))
            }
        }
    }
}

fn open_sniffed(path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>, ConvertError> {
    let io_err = |source| ConvertError::Io {
        path: path.to_path_buf(),
        source,
    };
    ImageReader::open(path)
        .map_err(io_err)?
        .with_guessed_format()
        .map_err(io_err)
}

fn has_canonical_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(CANONICAL_EXTENSION))
}

fn discard(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Could not remove rejected output {}: {}", path.display(), e);
        }
    }
}
