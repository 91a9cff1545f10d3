//! Roster input: the CSV export with one row per entrant.
//!
//! Only the columns named in [`RosterColumns`] are interpreted; everything
//! else in the export is carried along untouched. Spreadsheet exports
//! sometimes repeat a header (two "Team Name" columns from a merged form);
//! the first occurrence wins.

use crate::config::RosterColumns;
use crate::error::HarvestError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

static TEAM_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"Team (\d+)").unwrap());

/// Reduce a raw entrant-number cell to a directory name.
///
/// `"Team 42"` and `"Team 42 (late)"` become `"42"`. Otherwise a literal
/// `"Team "` is stripped and the rest trimmed. Returns `None` when nothing
/// is left, or when the value would not stay a single path component.
pub fn normalize_entrant_number(raw: &str) -> Option<String> {
    let number = match TEAM_NUMBER.captures(raw) {
        Some(caps) => caps[1].to_string(),
        None => raw.replace("Team ", "").trim().to_string(),
    };

    if number.is_empty()
        || number == "."
        || number == ".."
        || number.contains(['/', '\\'])
    {
        return None;
    }
    Some(number)
}

/// How many link columns a row has, decided once from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSchema {
    /// One link column; the slot is labelled `Photo`.
    Single,
    /// Numbered link columns `1..=n`; slots are labelled `Photo1`..`Photo<n>`.
    Numbered(u8),
}

/// One slot to fill for each entrant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    /// File stem under the entrant directory.
    pub label: String,
    /// Roster column holding the link.
    pub column: String,
}

impl SlotSchema {
    /// `Single` if the single-link header is present, otherwise `Numbered`.
    pub fn detect(headers: &[String], columns: &RosterColumns) -> Self {
        if headers.iter().any(|h| h == &columns.single_link) {
            SlotSchema::Single
        } else {
            SlotSchema::Numbered(columns.max_numbered_slots)
        }
    }

    pub fn slots(&self, columns: &RosterColumns) -> Vec<SlotSpec> {
        match *self {
            SlotSchema::Single => vec![SlotSpec {
                label: "Photo".to_string(),
                column: columns.single_link.clone(),
            }],
            SlotSchema::Numbered(n) => (1..=n)
                .map(|i| SlotSpec {
                    label: format!("Photo{i}"),
                    column: columns.numbered_link(i),
                })
                .collect(),
        }
    }
}

/// A single roster row, keyed by header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterRow {
    cells: HashMap<String, String>,
}

impl RosterRow {
    /// Cell for `column`, or `""` if the column does not exist.
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let mut cells = HashMap::new();
        for (k, v) in pairs {
            cells.entry(k.into()).or_insert_with(|| v.into());
        }
        Self { cells }
    }
}

/// The parsed roster: headers in file order plus all rows.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    headers: Vec<String>,
    rows: Vec<RosterRow>,
}

impl Roster {
    pub fn new(headers: Vec<String>, rows: Vec<RosterRow>) -> Self {
        Self { headers, rows }
    }

    /// Read a roster CSV from disk.
    pub fn from_path(path: &Path) -> Result<Self, HarvestError> {
        if !path.is_file() {
            return Err(HarvestError::RosterNotFound {
                path: path.to_path_buf(),
            });
        }
        let file = std::fs::File::open(path).map_err(|e| HarvestError::RosterMalformed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let roster = Self::read(file).map_err(|detail| HarvestError::RosterMalformed {
            path: path.to_path_buf(),
            detail,
        })?;
        debug!(
            "Roster {}: {} rows, {} columns",
            path.display(),
            roster.len(),
            roster.headers.len()
        );
        Ok(roster)
    }

    /// Read a roster CSV from any reader (header row required).
    pub fn from_reader(reader: impl Read) -> Result<Self, HarvestError> {
        Self::read(reader).map_err(|detail| HarvestError::RosterMalformed {
            path: PathBuf::from("<reader>"),
            detail,
        })
    }

    fn read(reader: impl Read) -> Result<Self, String> {
        let mut csv = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv
            .headers()
            .map_err(|e| e.to_string())?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in csv.records() {
            let record = record.map_err(|e| e.to_string())?;
            let pairs = headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.as_str(), record.get(i).unwrap_or("")));
            rows.push(RosterRow::from_pairs(pairs));
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[RosterRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn schema(&self, columns: &RosterColumns) -> SlotSchema {
        SlotSchema::detect(&self.headers, columns)
    }
}
