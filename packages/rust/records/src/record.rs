//! Batch record files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use curator_shared::{Category, CuratorError, DisplayId, PrNumber, Result, ValidationStatus};

use crate::artifact::write_atomic;

/// One extracted entry, as stored in a batch CSV file.
///
/// The validation columns are filled in by reviewers between `identify` and
/// `merge`; everything else is written by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub display_id: DisplayId,
    pub original_id: PrNumber,
    #[serde(default)]
    pub split_index: Option<u32>,
    pub split_total: u32,
    pub title: String,
    pub rendered_line: String,
    pub url: String,
    pub name: String,
    pub author: String,
    pub category: Category,
    #[serde(default)]
    pub validation_status: ValidationStatus,
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub approval_count: u32,
    #[serde(default)]
    pub first_approver: Option<String>,
    #[serde(default)]
    pub first_approved_at: Option<DateTime<Utc>>,
}

impl EntryRecord {
    /// Whether this entry was split out of a multi-entry PR.
    pub fn is_split(&self) -> bool {
        self.split_total > 1
    }
}

/// Write `records` to a CSV file at `path`, replacing it atomically.
pub fn write_records(path: &Path, records: &[EntryRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| CuratorError::record(path, e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CuratorError::record(path, e.to_string()))?;

    write_atomic(path, &bytes)?;
    debug!(path = %path.display(), count = records.len(), "wrote record file");
    Ok(())
}

/// Read every row of a record file.
///
/// Rows that fail to parse are skipped with a warning; a file without the
/// record header is an error.
pub fn read_records(path: &Path) -> Result<Vec<EntryRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| CuratorError::record(path, e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| CuratorError::record(path, e.to_string()))?;
    if !headers.iter().any(|h| h == "display_id") {
        return Err(CuratorError::record(path, "missing display_id column"));
    }

    let mut records = Vec::new();
    for (row, result) in reader.deserialize::<EntryRecord>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), row = row + 2, error = %e, "skipping unreadable row"),
        }
    }
    Ok(records)
}

/// Read all `*.csv` record files in `dir`, in file name order.
///
/// Files that cannot be read are skipped with a warning.
pub fn collect_records(dir: &Path) -> Result<Vec<EntryRecord>> {
    let entries = std::fs::read_dir(dir).map_err(|e| CuratorError::io(dir, e))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();

    let mut records = Vec::new();
    for file in &files {
        match read_records(file) {
            Ok(rows) => {
                debug!(file = %file.display(), rows = rows.len(), "read record file");
                records.extend(rows);
            }
            Err(e) => warn!(file = %file.display(), error = %e, "skipping record file"),
        }
    }
    Ok(records)
}
