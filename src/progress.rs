//! Progress-callback trait for per-slot harvest events.
//!
//! Inject an [`Arc<dyn HarvestProgressCallback>`] via
//! [`crate::config::HarvestConfigBuilder::progress_callback`] to receive
//! events as the batch walks the roster. The library never prints; the CLI
//! turns these events into a progress bar and one line per slot.
//!
//! # Example
//!
//! ```rust
//! use submission_harvest::{HarvestConfig, HarvestProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl HarvestProgressCallback for CountingCallback {
//!     fn on_slot_complete(&self, entrant: &str, slot: &str, asset: &Path) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{entrant}/{slot} → {}", asset.display());
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//! let config = HarvestConfig::builder()
//!     .progress_callback(cb as Arc<dyn HarvestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::BatchTally;
use std::path::Path;
use std::sync::Arc;

/// Called by the batch organizer as it processes each row and slot.
///
/// All methods default to no-ops so callers only override what they need.
/// Calls arrive strictly in roster order from a single task.
pub trait HarvestProgressCallback: Send + Sync {
    /// Called once, before the first row.
    fn on_batch_start(&self, total_rows: usize) {
        let _ = total_rows;
    }

    /// Called when a row with a usable entrant number is reached.
    fn on_entrant_start(&self, entrant: &str, name: &str) {
        let _ = (entrant, name);
    }

    /// Called just before a slot's download begins.
    fn on_slot_start(&self, entrant: &str, slot: &str) {
        let _ = (entrant, slot);
    }

    /// Called when a slot produced its final asset.
    fn on_slot_complete(&self, entrant: &str, slot: &str, asset: &Path) {
        let _ = (entrant, slot, asset);
    }

    /// Called when a slot counts as a failure.
    fn on_slot_failed(&self, entrant: &str, slot: &str, reason: &str) {
        let _ = (entrant, slot, reason);
    }

    /// Called for a slot with no link; not a failure.
    fn on_slot_skipped(&self, entrant: &str, slot: &str, reason: &str) {
        let _ = (entrant, slot, reason);
    }

    /// Called after each roster row, skipped rows included.
    fn on_row_done(&self) {}

    /// Called once after every row has been attempted.
    fn on_batch_complete(&self, tally: &BatchTally) {
        let _ = tally;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl HarvestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::HarvestConfig`].
pub type ProgressCallback = Arc<dyn HarvestProgressCallback>;
