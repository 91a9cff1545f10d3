//! Plain-text failure log.
//!
//! The pipeline returns failures in memory; whoever runs it decides whether
//! and where to persist them. [`FailureLog`] appends one line per
//! [`FailureRecord`] and never truncates on its own.

use crate::error::HarvestError;
use crate::output::FailureRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line per record, creating the file if needed.
    pub fn append(&self, records: &[FailureRecord]) -> Result<(), HarvestError> {
        if records.is_empty() {
            return Ok(());
        }
        let write_err = |source| HarvestError::FailureLogWrite {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        let mut buf = String::new();
        for record in records {
            buf.push_str(&record.to_string());
            buf.push('\n');
        }
        file.write_all(buf.as_bytes()).map_err(write_err)
    }

    /// Empty the log. Only called on explicit request before a fresh run.
    pub fn truncate(&self) -> Result<(), HarvestError> {
        std::fs::File::create(&self.path)
            .map(|_| ())
            .map_err(|source| HarvestError::FailureLogWrite {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::FailureStage;

    fn record(n: u32) -> FailureRecord {
        FailureRecord::new(FailureStage::Download, "ID abc", "HTTP 500").with_attempt(n)
    }

    #[test]
    fn appends_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::new(dir.path().join("failed.txt"));

        log.append(&[record(1)]).unwrap();
        log.append(&[record(2), record(3)]).unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "[download] ID abc (attempt 2): HTTP 500");
    }

    #[test]
    fn empty_batch_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::new(dir.path().join("failed.txt"));
        log.append(&[]).unwrap();
        assert!(!log.path().exists());
    }

    #[test]
    fn truncate_clears_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::new(dir.path().join("failed.txt"));
        log.append(&[record(1)]).unwrap();
        log.truncate().unwrap();
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "");
    }

    #[test]
    fn unwritable_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::new(dir.path().join("missing").join("failed.txt"));
        let err = log.append(&[record(1)]).unwrap_err();
        assert!(matches!(err, HarvestError::FailureLogWrite { .. }));
    }
}
