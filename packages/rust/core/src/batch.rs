//! Batch writer: partition records by category and chunk them into CSV files.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use curator_records::{EntryRecord, write_records};
use curator_shared::{Category, CuratorError, Result};

/// One planned batch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub category: Category,
    /// 1-based within its category.
    pub number: usize,
    pub records: Vec<EntryRecord>,
}

impl Batch {
    pub fn file_name(&self, prefix: &str) -> String {
        format!("{prefix}_{}_batch_{}.csv", self.category, self.number)
    }
}

/// Split `records` into batches: official first, each category sorted by
/// name case-insensitively, at most `batch_size` records per batch.
pub fn plan_batches(records: &[EntryRecord], batch_size: usize) -> Result<Vec<Batch>> {
    if batch_size == 0 {
        return Err(CuratorError::config("batch_size must be at least 1"));
    }

    let mut batches = Vec::new();
    for category in Category::ALL {
        let mut members: Vec<&EntryRecord> =
            records.iter().filter(|r| r.category == category).collect();
        members.sort_by_cached_key(|r| r.name.to_lowercase());

        for (i, chunk) in members.chunks(batch_size).enumerate() {
            batches.push(Batch {
                category,
                number: i + 1,
                records: chunk.iter().map(|r| (*r).clone()).collect(),
            });
        }
    }
    Ok(batches)
}

/// Plan batches and write each to `{prefix}_{category}_batch_{n}.csv` in `dir`.
#[instrument(skip_all, fields(dir = %dir.display(), records = records.len()))]
pub fn write_batches(
    dir: &Path,
    prefix: &str,
    records: &[EntryRecord],
    batch_size: usize,
) -> Result<Vec<PathBuf>> {
    let batches = plan_batches(records, batch_size)?;

    let mut paths = Vec::with_capacity(batches.len());
    for batch in &batches {
        let path = dir.join(batch.file_name(prefix));
        write_records(&path, &batch.records)?;
        info!(
            file = %path.display(),
            category = %batch.category,
            count = batch.records.len(),
            "wrote batch"
        );
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, temp_dir};
    use std::collections::HashSet;

    #[test]
    fn zero_batch_size_is_a_config_error() {
        let err = plan_batches(&[], 0).unwrap_err();
        assert!(matches!(err, CuratorError::Config { .. }));
    }

    #[test]
    fn official_first_sorted_and_chunked() {
        let records = vec![
            record("1", "delta", Category::Community),
            record("2", "Alpha", Category::Community),
            record("3", "charlie", Category::Community),
            record("4", "Zulu", Category::Official),
            record("5", "bravo", Category::Community),
        ];
        let batches = plan_batches(&records, 2).unwrap();

        let summary: Vec<(Category, usize, Vec<&str>)> = batches
            .iter()
            .map(|b| {
                (
                    b.category,
                    b.number,
                    b.records.iter().map(|r| r.name.as_str()).collect(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (Category::Official, 1, vec!["Zulu"]),
                (Category::Community, 1, vec!["Alpha", "bravo"]),
                (Category::Community, 2, vec!["charlie", "delta"]),
            ]
        );
    }

    #[test]
    fn batches_cover_every_record_once() {
        let records: Vec<EntryRecord> = (1..=23)
            .map(|i| {
                let category = if i % 3 == 0 { Category::Official } else { Category::Community };
                record(&i.to_string(), &format!("entry{i:02}"), category)
            })
            .collect();
        let batches = plan_batches(&records, 5).unwrap();

        let mut seen = HashSet::new();
        for batch in &batches {
            assert!(batch.records.len() <= 5);
            for r in &batch.records {
                assert_eq!(r.category, batch.category);
                assert!(seen.insert(r.display_id), "duplicate {}", r.display_id);
            }
        }
        assert_eq!(seen.len(), records.len());
    }

    #[test]
    fn empty_category_writes_no_file() {
        let tmp = temp_dir();
        let records = vec![record("1", "solo", Category::Community)];
        let paths = write_batches(&tmp, "server_addition_prs", &records, 10).unwrap();
        assert_eq!(paths, vec![tmp.join("server_addition_prs_community_batch_1.csv")]);
        assert!(paths[0].exists());
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
