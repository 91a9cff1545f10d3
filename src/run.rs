//! Whole-run entry points.
//!
//! [`run`] is what the CLI calls: load the roster, prepare the output root,
//! then organize with each slot's failures appended to the configured log as
//! the slot finishes. Library users who want to keep failures in memory call
//! [`crate::batch::organize`] directly.

use crate::batch::{prepare_output_root, BatchOrganizer};
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::failure_log::FailureLog;
use crate::output::BatchReport;
use crate::roster::Roster;
use std::path::Path;
use tracing::{info, warn};

/// Harvest every submission in the roster at `roster_path` into `out_root`.
///
/// # Errors
/// Only fatal errors: the output root cannot be prepared, or the roster is
/// missing or malformed. Per-slot failures are in the returned report, and
/// so is a failure log that could not be written.
pub async fn run(
    roster_path: impl AsRef<Path>,
    out_root: impl AsRef<Path>,
    config: &HarvestConfig,
) -> Result<BatchReport, HarvestError> {
    let roster_path = roster_path.as_ref();
    let out_root = out_root.as_ref();

    let roster = Roster::from_path(roster_path)?;
    prepare_output_root(out_root)?;
    info!(
        "Harvesting {} rows from {} ({:?} mode)",
        roster.len(),
        roster_path.display(),
        config.mode
    );

    let report = BatchOrganizer::new(config)?
        .with_failure_log(FailureLog::new(&config.failure_log_path))
        .organize(&roster, out_root)
        .await;

    if let Some(e) = &report.failure_log_error {
        warn!("Some failures are missing from the failure log: {}", e);
    }
    Ok(report)
}

/// Synchronous wrapper around [`run`] for non-async callers.
pub fn run_sync(
    roster_path: impl AsRef<Path>,
    out_root: impl AsRef<Path>,
    config: &HarvestConfig,
) -> Result<BatchReport, HarvestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| HarvestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(roster_path, out_root, config))
}
