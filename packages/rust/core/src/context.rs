//! Per-run state shared by the pipeline stages.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use curator_records::RejectionRow;
use curator_shared::{PrNumber, PullRequestMeta};

/// Why the classifier turned a PR down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RejectionReason {
    /// Labelled as a different kind of contribution.
    ResourceNotServer,
    DiffFetchFailed,
    /// The diff does not touch the canonical document.
    NoDocumentChanges,
    NoEntriesFound,
    ExceedsEntryLimit,
    MultipleEntriesDisabled,
    /// Too many added lines that are not entries.
    TooMuchNoise,
}

impl RejectionReason {
    /// Stable code written to the rejection ledger.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ResourceNotServer => "resource-not-server",
            Self::DiffFetchFailed => "diff-fetch-failed",
            Self::NoDocumentChanges => "no-document-changes",
            Self::NoEntriesFound => "no-entries-found",
            Self::ExceedsEntryLimit => "exceeds-entry-limit",
            Self::MultipleEntriesDisabled => "multiple-entries-disabled",
            Self::TooMuchNoise => "too-much-noise",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A PR the classifier declined, with enough context for the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub pr: PrNumber,
    pub title: String,
    pub author: String,
    pub labels: Vec<String>,
    pub reason: RejectionReason,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl Rejection {
    pub fn new(meta: &PullRequestMeta, reason: RejectionReason, detail: impl Into<String>) -> Self {
        Self {
            pr: meta.number,
            title: meta.title.clone(),
            author: meta.author.clone(),
            labels: meta.labels.clone(),
            reason,
            detail: detail.into(),
            at: Utc::now(),
        }
    }

    pub fn to_row(&self) -> RejectionRow {
        RejectionRow {
            identifier: self.pr.to_string(),
            title: self.title.clone(),
            author: self.author.clone(),
            reason_code: self.reason.code().to_string(),
            detail: self.detail.clone(),
            labels: self.labels.join("; "),
            timestamp: self.at,
        }
    }
}

/// State carried through one CLI invocation.
#[derive(Debug)]
pub struct RunContext {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    rejections: Vec<Rejection>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            rejections: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Timestamp fragment used in artifact file names (`20250102_030405`).
    pub fn file_stamp(&self) -> String {
        self.started_at.format("%Y%m%d_%H%M%S").to_string()
    }

    /// Record a rejection. Rejections are data, never errors.
    pub fn reject(&mut self, rejection: Rejection) {
        warn!(
            pr = %rejection.pr,
            reason = rejection.reason.code(),
            detail = %rejection.detail,
            "rejected PR"
        );
        self.rejections.push(rejection);
    }

    pub fn rejections(&self) -> &[Rejection] {
        &self.rejections
    }

    /// Rejection counts per reason, most frequent first.
    pub fn reason_breakdown(&self) -> Vec<(RejectionReason, usize)> {
        let mut counts: HashMap<RejectionReason, usize> = HashMap::new();
        for rejection in &self.rejections {
            *counts.entry(rejection.reason).or_default() += 1;
        }
        let mut breakdown: Vec<(RejectionReason, usize)> = counts.into_iter().collect();
        breakdown.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        breakdown
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
