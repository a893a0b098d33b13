//! Rejection ledger: one CSV row per PR the classifier turned down.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use curator_shared::{CuratorError, Result};

use crate::artifact::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionRow {
    pub identifier: String,
    pub title: String,
    pub author: String,
    pub reason_code: String,
    pub detail: String,
    /// Label names joined with `; `.
    pub labels: String,
    pub timestamp: DateTime<Utc>,
}

/// Write `rows` to `rejected_prs_{stamp}.csv` in `dir`.
pub fn write_rejection_ledger(dir: &Path, stamp: &str, rows: &[RejectionRow]) -> Result<PathBuf> {
    let path = dir.join(format!("rejected_prs_{stamp}.csv"));

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| CuratorError::record(&path, e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CuratorError::record(&path, e.to_string()))?;

    write_atomic(&path, &bytes)?;
    info!(path = %path.display(), count = rows.len(), "wrote rejection ledger");
    Ok(path)
}
