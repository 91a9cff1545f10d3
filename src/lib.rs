//! # submission-harvest
//!
//! Download contest submissions from shared-drive links and normalise every
//! one of them to a single image format (AVIF), laid out as
//! `<root>/<entrant>/<Photo|PhotoN>.avif` for a static gallery to pick up.
//!
//! Entrants upload whatever their phone or laptop produced: JPEGs, PNGs,
//! HEIC straight off an iPhone (often served as `application/octet-stream`),
//! and the occasional one-page PDF poster. This crate turns all of them into
//! the same file at a predictable path, and keeps going when one of them
//! cannot be fetched or converted.
//!
//! ## Pipeline Overview
//!
//! ```text
//! roster CSV
//!  │
//!  ├─ 1. Roster    detect single / numbered slot schema, normalise entrant numbers
//!  ├─ 2. Link      sharing URL → resource id (pure string work)
//!  ├─ 3. Fetch     download with retries, confirm large-file interstitials
//!  ├─ 4. Classify  declared type, or PDF signature when the type is generic
//!  ├─ 5. Convert   PDF page 1 / raster / HEIC → AVIF, size-checked
//!  └─ 6. Report    tally + failure records; failures appended to failed.txt
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use submission_harvest::{run, HarvestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HarvestConfig::default();
//!     let report = run("data.csv", "public/image", &config).await?;
//!     eprintln!(
//!         "Completed: {} succeeded, {} failed",
//!         report.tally.succeeded, report.tally.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `harvest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `heic`  | off     | Decodes HEIC/HEIF through libheif (needs libheif installed) |
//!
//! Without `heic`, camera-native uploads that are really JPEG/PNG still
//! convert (the bytes are sniffed); true HEIC payloads fail with a clear
//! reason and are kept on disk.
//!
//! ## PDF engine
//!
//! PDF posters are rendered with pdfium. The library is looked up via
//! `PDFIUM_LIB_PATH`, then a per-user cache, then the system, and finally
//! downloaded once into the cache (see the `pdfium-bootstrap` crate).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod failure_log;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod roster;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{organize, prepare_output_root, BatchOrganizer};
pub use config::{
    HarvestConfig, HarvestConfigBuilder, RosterColumns, RunMode, UnknownPayloadPolicy,
    CANONICAL_EXTENSION,
};
pub use error::{ConvertError, FetchError, HarvestError};
pub use failure_log::FailureLog;
pub use output::{BatchReport, BatchTally, FailureRecord, FailureStage, SlotOutcome};
pub use pipeline::classify::{classify, ClassifiedKind};
pub use pipeline::convert::FormatConverter;
pub use pipeline::fetch::Retriever;
pub use pipeline::link::{resolve_link, ResourceId};
pub use progress::{HarvestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use roster::{normalize_entrant_number, Roster, RosterRow, SlotSchema};
pub use run::{run, run_sync};
