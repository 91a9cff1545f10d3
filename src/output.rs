//! Result types: per-slot outcomes, failure records, and batch totals.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Pipeline stage a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The link had no recognisable resource id.
    Link,
    /// One download attempt failed.
    Download,
    /// The payload's type could not be settled.
    Classification,
    /// Conversion or output validation failed.
    Conversion,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Link => "link",
            FailureStage::Download => "download",
            FailureStage::Classification => "classification",
            FailureStage::Conversion => "conversion",
        };
        f.write_str(s)
    }
}

/// One failed operation, with enough context to diagnose it later.
///
/// `Display` renders the single line written to the failure log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub stage: FailureStage,
    /// Resource id, link, or staged path, depending on the stage.
    pub subject: String,
    /// 1-based attempt number for download failures.
    pub attempt: Option<u32>,
    pub detail: String,
}

impl FailureRecord {
    pub fn new(stage: FailureStage, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            stage,
            subject: subject.into(),
            attempt: None,
            detail: detail.into(),
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.subject)?;
        if let Some(n) = self.attempt {
            write!(f, " (attempt {n})")?;
        }
        write!(f, ": {}", self.detail)
    }
}

/// What happened to one submission slot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SlotOutcome {
    /// Final asset on disk: the canonical file, or the raw file in uncompressed mode.
    pub asset: Option<PathBuf>,
    /// Staged payload left behind after a failed conversion.
    pub preserved_payload: Option<PathBuf>,
    /// Every failure observed along the way, including retried attempts.
    pub failures: Vec<FailureRecord>,
}

impl SlotOutcome {
    pub fn is_success(&self) -> bool {
        self.asset.is_some()
    }

    pub(crate) fn failed(failures: Vec<FailureRecord>) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }
}

/// Success/failure counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchTally {
    pub succeeded: usize,
    pub failed: usize,
    /// Rows without a usable entrant number.
    pub skipped_rows: usize,
    /// Slots whose link cell was empty.
    pub empty_slots: usize,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub output_root: PathBuf,
    pub tally: BatchTally,
    /// Assets in roster order.
    pub assets: Vec<PathBuf>,
    /// Failures in the order they happened.
    pub failures: Vec<FailureRecord>,
    /// Staged payloads left on disk by a failed classification or conversion.
    pub preserved_payloads: Vec<PathBuf>,
    /// Why failure lines could not be appended to the failure log, if they couldn't.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_log_error: Option<String>,
}
