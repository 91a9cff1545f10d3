//! Error types for the submission-harvest library.
//!
//! Three error types for three scopes:
//!
//! * [`HarvestError`] (**fatal**): the run cannot start (output root not
//!   creatable, roster unreadable). Returned as `Err` from [`crate::run`] and
//!   friends. [`crate::FailureLog`] uses it too, but a run only warns when
//!   the log cannot be written.
//!
//! * [`FetchError`]: one download *attempt* failed. The orchestrator turns
//!   it into a [`crate::output::FailureRecord`] and moves on to the next attempt.
//!
//! * [`ConvertError`]: one staged payload could not be turned into the
//!   canonical asset. Also recorded, never propagated past the slot.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the submission-harvest library.
#[derive(Debug, Error)]
pub enum HarvestError {
    // ── Setup errors ──────────────────────────────────────────────────────
    /// The output root could not be wiped or recreated.
    #[error("Cannot prepare output directory '{path}': {source}")]
    OutputSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Roster errors ─────────────────────────────────────────────────────
    /// Roster file does not exist.
    #[error("Roster not found: '{path}'")]
    RosterNotFound { path: PathBuf },

    /// Roster file exists but could not be parsed as CSV.
    #[error("Roster '{path}' is malformed: {detail}")]
    RosterMalformed { path: PathBuf, detail: String },

    // ── Failure log ───────────────────────────────────────────────────────
    /// Appending to the failure log failed.
    #[error("Failed to write failure log '{path}': {source}")]
    FailureLogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single failed download attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Server answered with a non-success status.
    #[error("HTTP {status}")]
    Status { status: u16 },

    /// The request could not be sent or timed out.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body could not be read to the end.
    #[error("reading response body failed: {0}")]
    Body(String),

    /// The body arrived but could not be written to the staging path.
    #[error("writing '{path}' failed: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_body() || e.is_decode() {
            FetchError::Body(e.to_string())
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

/// Why a staged payload did not become a canonical asset.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// pdfium could not be located or bound.
    #[error("PDF engine unavailable: {0}")]
    EngineUnavailable(String),

    /// pdfium refused to open the document.
    #[error("cannot open PDF: {0}")]
    OpenDocument(String),

    /// The document opened but has nothing to render.
    #[error("PDF has no pages")]
    EmptyDocument,

    /// Rasterising the first page failed.
    #[error("rendering first page failed: {0}")]
    Render(String),

    /// The source image could not be decoded.
    #[error("cannot decode image: {0}")]
    Decode(String),

    /// HEIC/HEIF payload but no decoder is available in this build.
    #[error("HEIC/HEIF support unavailable: {0}")]
    CameraNativeUnavailable(String),

    /// Encoding the canonical output failed.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// Payload type has no conversion strategy.
    #[error("unsupported payload type '.{extension}'")]
    Unsupported { extension: String },

    /// Output missing or below the minimum size after encoding.
    #[error("output '{path}' was not created or is too small ({size} bytes, must exceed {min})")]
    Undersized { path: PathBuf, size: u64, min: u64 },

    /// Filesystem error while reading the source or writing the output.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking conversion task panicked or was cancelled.
    #[error("conversion task failed: {0}")]
    Task(String),
}

impl From<image::ImageError> for ConvertError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Encoding(_) | image::ImageError::Parameter(_) => {
                ConvertError::Encode(e.to_string())
            }
            other => ConvertError::Decode(other.to_string()),
        }
    }
}
