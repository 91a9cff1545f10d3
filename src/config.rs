//! Configuration for a harvest run.
//!
//! Every knob lives in [`HarvestConfig`], built via [`HarvestConfigBuilder`].
//! Retry counts and pauses are plain fields rather than constants because the
//! right values depend on how tolerant the remote service is on a given day.

use crate::error::HarvestError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Extension given to every canonical asset.
pub const CANONICAL_EXTENSION: &str = "avif";

/// Configuration for downloading and normalising a roster's submissions.
///
/// # Example
/// ```rust
/// use submission_harvest::{HarvestConfig, RunMode};
/// use std::time::Duration;
///
/// let config = HarvestConfig::builder()
///     .mode(RunMode::Uncompressed)
///     .max_attempts(5)
///     .retry_pause(Duration::from_secs(4))
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Clone)]
pub struct HarvestConfig {
    /// Convert to the canonical format, or keep raw bytes. Default: Compressed.
    pub mode: RunMode,

    /// Download attempts per slot before giving up. Default: 3.
    pub max_attempts: u32,

    /// Pause after a failed attempt. Default: 2 s. No backoff growth.
    pub retry_pause: Duration,

    /// Pause after every roster row, successful or not. Default: 1 s.
    ///
    /// The drive endpoint starts answering with interstitials and 429s when
    /// hit in a tight loop; this is the throughput ceiling that avoids it.
    pub submission_pause: Duration,

    /// Download endpoint; `export=download&id=<id>` is appended as a query.
    /// Default: `https://drive.google.com/uc`.
    pub download_endpoint: String,

    /// Host a submission link must point at to be resolved. Default: `drive.google.com`.
    pub link_host: String,

    /// Per-request timeout in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// AVIF quality, 1–100. Default: 80.
    pub avif_quality: u8,

    /// AVIF encoder speed, 1 (slowest) – 10 (fastest). Default: 6.
    pub avif_speed: u8,

    /// A canonical asset must be larger than this to count as a successful
    /// encode. Default: 1024 bytes.
    pub min_output_bytes: u64,

    /// What to assume about an opaque payload with no PDF signature.
    pub unknown_payload_policy: UnknownPayloadPolicy,

    /// Scale applied to the PDF page size when rasterising. Default: 1.0
    /// (one pixel per PDF point).
    pub render_scale: f32,

    /// Allow downloading the PDF engine when no local copy exists. Default: true.
    pub allow_engine_download: bool,

    /// Where the CLI and [`crate::run`] append failure lines. Default: `failed.txt`.
    pub failure_log_path: PathBuf,

    /// Roster column names.
    pub columns: RosterColumns,

    /// Progress callback for per-slot events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            max_attempts: 3,
            retry_pause: Duration::from_secs(2),
            submission_pause: Duration::from_secs(1),
            download_endpoint: "https://drive.google.com/uc".to_string(),
            link_host: "drive.google.com".to_string(),
            request_timeout_secs: 120,
            avif_quality: 80,
            avif_speed: 6,
            min_output_bytes: 1024,
            unknown_payload_policy: UnknownPayloadPolicy::default(),
            render_scale: 1.0,
            allow_engine_download: true,
            failure_log_path: PathBuf::from("failed.txt"),
            columns: RosterColumns::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for HarvestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestConfig")
            .field("mode", &self.mode)
            .field("max_attempts", &self.max_attempts)
            .field("retry_pause", &self.retry_pause)
            .field("submission_pause", &self.submission_pause)
            .field("download_endpoint", &self.download_endpoint)
            .field("link_host", &self.link_host)
            .field("avif_quality", &self.avif_quality)
            .field("avif_speed", &self.avif_speed)
            .field("min_output_bytes", &self.min_output_bytes)
            .field("unknown_payload_policy", &self.unknown_payload_policy)
            .field("render_scale", &self.render_scale)
            .field("failure_log_path", &self.failure_log_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn HarvestProgressCallback>"),
            )
            .finish()
    }
}

impl HarvestConfig {
    /// Create a new builder for `HarvestConfig`.
    pub fn builder() -> HarvestConfigBuilder {
        HarvestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`HarvestConfig`].
#[derive(Debug)]
pub struct HarvestConfigBuilder {
    config: HarvestConfig,
}

impl HarvestConfigBuilder {
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_pause(mut self, pause: Duration) -> Self {
        self.config.retry_pause = pause;
        self
    }

    pub fn submission_pause(mut self, pause: Duration) -> Self {
        self.config.submission_pause = pause;
        self
    }

    pub fn download_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.download_endpoint = url.into();
        self
    }

    pub fn link_host(mut self, host: impl Into<String>) -> Self {
        self.config.link_host = host.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn avif_quality(mut self, q: u8) -> Self {
        self.config.avif_quality = q;
        self
    }

    pub fn avif_speed(mut self, s: u8) -> Self {
        self.config.avif_speed = s;
        self
    }

    pub fn min_output_bytes(mut self, n: u64) -> Self {
        self.config.min_output_bytes = n;
        self
    }

    pub fn unknown_payload_policy(mut self, policy: UnknownPayloadPolicy) -> Self {
        self.config.unknown_payload_policy = policy;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn allow_engine_download(mut self, v: bool) -> Self {
        self.config.allow_engine_download = v;
        self
    }

    pub fn failure_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.failure_log_path = path.into();
        self
    }

    pub fn columns(mut self, columns: RosterColumns) -> Self {
        self.config.columns = columns;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<HarvestConfig, HarvestError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(HarvestError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if !(1..=100).contains(&c.avif_quality) {
            return Err(HarvestError::InvalidConfig(format!(
                "AVIF quality must be 1–100, got {}",
                c.avif_quality
            )));
        }
        if !(1..=10).contains(&c.avif_speed) {
            return Err(HarvestError::InvalidConfig(format!(
                "AVIF speed must be 1–10, got {}",
                c.avif_speed
            )));
        }
        if !(c.render_scale.is_finite() && c.render_scale > 0.0) {
            return Err(HarvestError::InvalidConfig(format!(
                "render scale must be positive, got {}",
                c.render_scale
            )));
        }
        if reqwest::Url::parse(&c.download_endpoint).is_err() {
            return Err(HarvestError::InvalidConfig(format!(
                "download endpoint '{}' is not a valid URL",
                c.download_endpoint
            )));
        }
        if c.columns.max_numbered_slots == 0 {
            return Err(HarvestError::InvalidConfig(
                "max_numbered_slots must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Whether downloaded payloads are normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunMode {
    /// Classify and convert every payload to the canonical format. (default)
    #[default]
    Compressed,
    /// Keep the bytes exactly as delivered; no classification or conversion.
    Uncompressed,
}

/// Treatment of an opaque payload (generic declared type, no PDF signature).
///
/// In practice these are phone photos the drive serves as
/// `application/octet-stream`, so the default assumes a camera-native image.
/// `Reject` fails the slot instead, for rosters where that guess is unsafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnknownPayloadPolicy {
    #[default]
    AssumeCameraNative,
    Reject,
}

/// Column names the roster is read with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterColumns {
    pub entrant_number: String,
    pub entrant_name: String,
    /// Presence of this header selects the single-slot schema.
    pub single_link: String,
    /// Prefix of the numbered link columns: `"<prefix> <n>"`.
    pub numbered_link_prefix: String,
    pub max_numbered_slots: u8,
}

impl Default for RosterColumns {
    fn default() -> Self {
        Self {
            entrant_number: "Team Number".to_string(),
            entrant_name: "Team Name".to_string(),
            single_link: "Submission Image".to_string(),
            numbered_link_prefix: "Submission Image".to_string(),
            max_numbered_slots: 4,
        }
    }
}

impl RosterColumns {
    /// Header of numbered link column `n` (1-based).
    pub fn numbered_link(&self, n: u8) -> String {
        format!("{} {}", self.numbered_link_prefix, n)
    }
}
