//! Batch organizer: walk the roster and fill `<root>/<entrant>/<slot>.avif`.
//!
//! Rows are processed strictly in order, one slot at a time, with
//! `submission_pause` after every entrant. Nothing a row does can stop the
//! batch; only output-root setup (before the first row) is fatal.

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::failure_log::FailureLog;
use crate::output::{BatchReport, FailureRecord, FailureStage};
use crate::pipeline::fetch::Retriever;
use crate::pipeline::link::resolve_link;
use crate::progress::{HarvestProgressCallback, NoopProgressCallback};
use crate::roster::{normalize_entrant_number, Roster, RosterRow, SlotSchema, SlotSpec};
use std::path::Path;
use tracing::{debug, info, warn};

/// Wipe `path` if it exists and recreate it empty.
///
/// Concurrent runs against the same root are not supported.
pub fn prepare_output_root(path: &Path) -> Result<(), HarvestError> {
    let setup_err = |source| HarvestError::OutputSetup {
        path: path.to_path_buf(),
        source,
    };
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(setup_err)?;
    }
    std::fs::create_dir_all(path).map_err(setup_err)?;
    debug!("Prepared output root {}", path.display());
    Ok(())
}

/// Process every roster row into `out_root` with a fresh [`BatchOrganizer`].
pub async fn organize(
    roster: &Roster,
    out_root: &Path,
    config: &HarvestConfig,
) -> Result<BatchReport, HarvestError> {
    Ok(BatchOrganizer::new(config)?.organize(roster, out_root).await)
}

/// Owns the retriever (and with it the HTTP session and converter state)
/// for one run.
pub struct BatchOrganizer<'a> {
    config: &'a HarvestConfig,
    retriever: Retriever,
    failure_log: Option<FailureLog>,
}

impl<'a> BatchOrganizer<'a> {
    pub fn new(config: &'a HarvestConfig) -> Result<Self, HarvestError> {
        Ok(Self {
            config,
            retriever: Retriever::new(config)?,
            failure_log: None,
        })
    }

    /// Append each slot's failures to `log` as soon as the slot finishes.
    ///
    /// A write error does not stop the batch: it is logged and kept in
    /// [`BatchReport::failure_log_error`].
    pub fn with_failure_log(mut self, log: FailureLog) -> Self {
        self.failure_log = Some(log);
        self
    }

    /// Swap in a pre-built retriever.
    pub fn with_retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = retriever;
        self
    }

    /// Process every row. Per-slot problems are counted and recorded, never returned.
    pub async fn organize(&self, roster: &Roster, out_root: &Path) -> BatchReport {
        let noop = NoopProgressCallback;
        let cb: &dyn HarvestProgressCallback = match &self.config.progress_callback {
            Some(cb) => cb.as_ref(),
            None => &noop,
        };

        let columns = &self.config.columns;
        let schema = roster.schema(columns);
        let slots = schema.slots(columns);
        info!(
            "Organizing {} rows into {} ({:?} schema)",
            roster.len(),
            out_root.display(),
            schema
        );

        let mut report = BatchReport {
            output_root: out_root.to_path_buf(),
            ..BatchReport::default()
        };
        cb.on_batch_start(roster.len());

        for row in roster.rows() {
            let Some(entrant) = normalize_entrant_number(row.get(&columns.entrant_number)) else {
                debug!("Skipping row without entrant number");
                report.tally.skipped_rows += 1;
                cb.on_row_done();
                continue;
            };

            let name = row.get(&columns.entrant_name).trim();
            info!("Team {}: {}", entrant, name);
            cb.on_entrant_start(&entrant, name);

            self.process_row(row, &entrant, &slots, schema, out_root, cb, &mut report)
                .await;

            if !self.config.submission_pause.is_zero() {
                tokio::time::sleep(self.config.submission_pause).await;
            }
            cb.on_row_done();
        }

        info!(
            "Completed: {} succeeded, {} failed",
            report.tally.succeeded, report.tally.failed
        );
        cb.on_batch_complete(&report.tally);
        report
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_row(
        &self,
        row: &RosterRow,
        entrant: &str,
        slots: &[SlotSpec],
        schema: SlotSchema,
        out_root: &Path,
        cb: &dyn HarvestProgressCallback,
        report: &mut BatchReport,
    ) {
        let entrant_dir = out_root.join(entrant);
        let dir_error = std::fs::create_dir_all(&entrant_dir).err();

        for slot in slots {
            let link = row.get(&slot.column).trim();
            if link.is_empty() {
                match schema {
                    SlotSchema::Single => warn!("No URL for {} of team {}", slot.label, entrant),
                    SlotSchema::Numbered(_) => debug!("No URL for {} of team {}", slot.label, entrant),
                }
                report.tally.empty_slots += 1;
                cb.on_slot_skipped(entrant, &slot.label, "no link");
                continue;
            }

            let Some(id) = resolve_link(link, &self.config.link_host) else {
                warn!("Invalid URL for {} of team {}: {}", slot.label, entrant, link);
                let record = FailureRecord::new(
                    FailureStage::Link,
                    link,
                    format!("no resource id (team {entrant}, {})", slot.label),
                );
                self.fail(report, cb, entrant, &slot.label, record);
                continue;
            };

            if let Some(e) = &dir_error {
                let record = FailureRecord::new(
                    FailureStage::Conversion,
                    entrant_dir.display().to_string(),
                    format!("cannot create entrant directory: {e}"),
                );
                self.fail(report, cb, entrant, &slot.label, record);
                continue;
            }

            info!("Downloading {} for team {}", slot.label, entrant);
            cb.on_slot_start(entrant, &slot.label);
            let outcome = self
                .retriever
                .retrieve_slot(&id, &entrant_dir.join(&slot.label))
                .await;

            let reason = outcome
                .failures
                .last()
                .map(|f| f.detail.clone())
                .unwrap_or_default();
            self.record(report, outcome.failures);
            if let Some(kept) = outcome.preserved_payload {
                report.preserved_payloads.push(kept);
            }
            match outcome.asset {
                Some(asset) => {
                    report.tally.succeeded += 1;
                    cb.on_slot_complete(entrant, &slot.label, &asset);
                    report.assets.push(asset);
                }
                None => {
                    warn!("Failed {} for team {}", slot.label, entrant);
                    report.tally.failed += 1;
                    cb.on_slot_failed(entrant, &slot.label, &reason);
                }
            }
        }
    }

    fn fail(
        &self,
        report: &mut BatchReport,
        cb: &dyn HarvestProgressCallback,
        entrant: &str,
        slot: &str,
        record: FailureRecord,
    ) {
        report.tally.failed += 1;
        let reason = record.detail.clone();
        self.record(report, vec![record]);
        cb.on_slot_failed(entrant, slot, &reason);
    }

    fn record(&self, report: &mut BatchReport, records: Vec<FailureRecord>) {
        if let Some(log) = &self.failure_log {
            if let Err(e) = log.append(&records) {
                warn!("{e}");
                report.failure_log_error.get_or_insert_with(|| e.to_string());
            }
        }
        report.failures.extend(records);
    }
}
