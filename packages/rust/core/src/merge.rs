//! Merge engine: fold validated records into a section of the canonical document.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use curator_markdown::{Document, bullet_name_key, bullet_url_key, contains_icon};
use curator_records::{EntryRecord, write_atomic};
use curator_shared::{Category, CuratorError, DisplayId, Result, SectionConfig};

/// An incoming or existing line left out of the merged section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// `None` for lines already in the document.
    pub display_id: Option<DisplayId>,
    pub name: String,
    pub url: String,
}

impl SkippedEntry {
    fn from_record(record: &EntryRecord) -> Self {
        Self {
            display_id: Some(record.display_id),
            name: record.name.clone(),
            url: record.url.clone(),
        }
    }

    fn from_line(line: &str) -> Self {
        Self {
            display_id: None,
            name: line.trim().to_string(),
            url: bullet_url_key(line),
        }
    }
}

/// Result of a merge, computed in full before anything is written.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub category: Category,
    /// Bullet lines in the section before the merge.
    pub existing: usize,
    /// Records that made it into the section.
    pub added: Vec<EntryRecord>,
    /// Lines dropped because their URL was already present.
    pub duplicates: Vec<SkippedEntry>,
    /// Icon-bearing records kept out of the community section.
    pub excluded_icons: Vec<SkippedEntry>,
    /// Bullet lines in the section after the merge.
    pub total: usize,
    /// The full rewritten document.
    pub document: String,
    /// Whether `document` differs from the input.
    pub changed: bool,
}

/// Records eligible for `category`: validated, of that category, and for the
/// community section free of icons.
///
/// Returns the eligible records and the icon-bearing ones that were excluded.
pub fn eligible_records(
    records: &[EntryRecord],
    category: Category,
) -> (Vec<&EntryRecord>, Vec<&EntryRecord>) {
    records
        .iter()
        .filter(|r| r.validation_status.is_valid() && r.category == category)
        .partition(|r| category != Category::Community || !contains_icon(&r.rendered_line))
}

/// Merge `records` into the section configured by `section`.
///
/// Existing bullets come first in dedup order, so an existing line always
/// wins over an incoming record with the same URL.
pub fn merge(
    document: &str,
    records: &[EntryRecord],
    category: Category,
    section: &SectionConfig,
) -> Result<MergeOutcome> {
    let doc = Document::parse(document);
    let bounds = doc.section(&section.header)?;
    let existing = doc.bullets(&bounds);

    let (incoming, excluded) = eligible_records(records, category);
    for record in &excluded {
        warn!(id = %record.display_id, name = %record.name, "icon entry kept out of community section");
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut lines: Vec<String> = Vec::with_capacity(existing.len() + incoming.len());
    let mut duplicates = Vec::new();
    let mut added = Vec::new();

    for line in &existing {
        if seen.insert(bullet_url_key(line)) {
            lines.push((*line).to_string());
        } else {
            debug!(line, "dropping duplicate existing line");
            duplicates.push(SkippedEntry::from_line(line));
        }
    }
    for record in incoming {
        if seen.insert(bullet_url_key(&record.rendered_line)) {
            lines.push(record.rendered_line.clone());
            added.push(record.clone());
        } else {
            debug!(id = %record.display_id, url = %record.url, "skipping duplicate URL");
            duplicates.push(SkippedEntry::from_record(record));
        }
    }

    lines.sort_by_cached_key(|line| bullet_name_key(line));

    let rewritten = doc.splice_bullets(&bounds, &lines);
    let changed = rewritten != document;

    Ok(MergeOutcome {
        category,
        existing: existing.len(),
        total: lines.len(),
        added,
        duplicates,
        excluded_icons: excluded.into_iter().map(SkippedEntry::from_record).collect(),
        document: rewritten,
        changed,
    })
}

/// Merge into the document at `path`, replacing it atomically unless `dry_run`.
#[instrument(skip_all, fields(path = %path.display(), category = %category, dry_run = dry_run))]
pub fn merge_file(
    path: &Path,
    records: &[EntryRecord],
    category: Category,
    section: &SectionConfig,
    dry_run: bool,
) -> Result<MergeOutcome> {
    let document = std::fs::read_to_string(path).map_err(|e| CuratorError::io(path, e))?;
    let outcome = merge(&document, records, category, section)?;

    if dry_run {
        info!(added = outcome.added.len(), "dry run, document not written");
    } else if outcome.changed {
        write_atomic(path, outcome.document.as_bytes())?;
        info!(
            added = outcome.added.len(),
            total = outcome.total,
            "document updated"
        );
    } else {
        info!("document already up to date");
    }

    Ok(outcome)
}

/// Split context shown next to entries from multi-entry PRs.
pub fn split_context(record: &EntryRecord, item_label: &str) -> Option<String> {
    match (record.split_index, record.is_split()) {
        (Some(index), true) => Some(format!("{item_label} {index} of {}", record.split_total)),
        _ => None,
    }
}

/// Human-readable change log of a merge.
pub fn render_merge_log(
    outcome: &MergeOutcome,
    section: &SectionConfig,
    document_path: &Path,
    at: DateTime<Utc>,
) -> String {
    let mut log = String::new();
    let rule = "=".repeat(50);

    let _ = writeln!(log, "{} Merge Log", section.display_name);
    let _ = writeln!(log, "Timestamp: {}", at.to_rfc3339());
    let _ = writeln!(log, "Document: {}", document_path.display());
    let _ = writeln!(log, "Entries Added: {}", outcome.added.len());
    let _ = writeln!(log, "Section Size: {} -> {}", outcome.existing, outcome.total);
    let _ = writeln!(log);

    let _ = writeln!(log, "Added Entries:");
    let _ = writeln!(log, "{rule}");
    for record in &outcome.added {
        let split = split_context(record, &section.item_label)
            .map(|s| format!(" ({s})"))
            .unwrap_or_default();
        let _ = writeln!(log, "PR #{}: {}{split}", record.display_id, record.name);
        let _ = writeln!(log, "  Author: {}", record.author);
        let _ = writeln!(log, "  URL: {}", record.url);
        let _ = writeln!(log, "  Category: {}", record.category);
        if record.is_split() {
            let _ = writeln!(log, "  Original PR: #{}", record.original_id);
        }
        let _ = writeln!(log, "  Line: {}", record.rendered_line);
        let _ = writeln!(log);
    }

    for (heading, skipped) in [
        ("Skipped Duplicates", &outcome.duplicates),
        ("Excluded Icon Entries", &outcome.excluded_icons),
    ] {
        if skipped.is_empty() {
            continue;
        }
        let _ = writeln!(log, "{heading}:");
        let _ = writeln!(log, "{rule}");
        for entry in skipped {
            match entry.display_id {
                Some(id) => {
                    let _ = writeln!(log, "PR #{id}: {} ({})", entry.name, entry.url);
                }
                None => {
                    let _ = writeln!(log, "existing: {}", entry.name);
                }
            }
        }
        let _ = writeln!(log);
    }

    log
}
