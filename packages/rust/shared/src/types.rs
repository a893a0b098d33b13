//! Core domain types shared by every Curator stage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CuratorError, Result};

// ---------------------------------------------------------------------------
// PrNumber
// ---------------------------------------------------------------------------

/// A pull request number on the code-hosting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrNumber(pub u64);

impl fmt::Display for PrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PrNumber {
    type Err = CuratorError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches('#');
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|e| CuratorError::parse(format!("invalid PR number '{s}': {e}")))
    }
}

// ---------------------------------------------------------------------------
// DisplayId
// ---------------------------------------------------------------------------

/// Identifier of one entry derived from a PR.
///
/// Single-entry PRs keep the bare PR number (`1729`); entries split out of a
/// multi-entry PR carry a 1-based suffix (`1729-2`). The original PR is always
/// recoverable with [`DisplayId::pr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayId {
    pr: PrNumber,
    index: Option<u32>,
}

impl DisplayId {
    /// Identifier for the only entry of a PR.
    pub fn single(pr: PrNumber) -> Self {
        Self { pr, index: None }
    }

    /// Identifier for entry `index` (1-based) of a multi-entry PR.
    pub fn split(pr: PrNumber, index: u32) -> Self {
        Self {
            pr,
            index: Some(index),
        }
    }

    /// Pick the right form for entry `index` (1-based) out of `total`.
    pub fn for_entry(pr: PrNumber, index: u32, total: usize) -> Self {
        if total > 1 {
            Self::split(pr, index)
        } else {
            Self::single(pr)
        }
    }

    /// The originating PR.
    pub fn pr(&self) -> PrNumber {
        self.pr
    }

    /// Position within a split PR, if any.
    pub fn index(&self) -> Option<u32> {
        self.index
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}-{i}", self.pr),
            None => write!(f, "{}", self.pr),
        }
    }
}

impl FromStr for DisplayId {
    type Err = CuratorError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('-') {
            Some((pr, index)) => {
                let index = index.parse::<u32>().map_err(|e| {
                    CuratorError::parse(format!("invalid split suffix in '{s}': {e}"))
                })?;
                if index == 0 {
                    return Err(CuratorError::parse(format!(
                        "split suffix in '{s}' must be 1-based"
                    )));
                }
                Ok(Self::split(pr.parse()?, index))
            }
            None => Ok(Self::single(s.parse()?)),
        }
    }
}

impl TryFrom<String> for DisplayId {
    type Error = CuratorError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DisplayId> for String {
    fn from(id: DisplayId) -> Self {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Which list section an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Official,
    Community,
}

impl Category {
    /// All categories in output order.
    pub const ALL: [Category; 2] = [Category::Official, Category::Community];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Community => "community",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CuratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "official" => Ok(Self::Official),
            "community" => Ok(Self::Community),
            other => Err(CuratorError::parse(format!("unknown category '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Approval snapshot
// ---------------------------------------------------------------------------

/// Review approval state of a PR, captured once and copied onto every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSnapshot {
    /// At least one approving review exists.
    pub approved: bool,
    /// Number of approving reviews.
    pub approval_count: u32,
    /// Login of the earliest approver.
    pub first_approver: Option<String>,
    /// When the earliest approval was submitted.
    pub first_approved_at: Option<DateTime<Utc>>,
}

impl ApprovalSnapshot {
    /// Snapshot for a PR without approvals.
    pub fn unapproved() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Validation status
// ---------------------------------------------------------------------------

/// Externally supplied verdict on a record.
///
/// Stored as `Valid`, `Invalid`, or an empty string for records nobody has
/// reviewed yet. Anything else is preserved verbatim and never merged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    #[default]
    Pending,
    Other(String),
}

impl ValidationStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl From<String> for ValidationStatus {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Self::Pending
        } else if trimmed.eq_ignore_ascii_case("valid") {
            Self::Valid
        } else if trimmed.eq_ignore_ascii_case("invalid") {
            Self::Invalid
        } else {
            Self::Other(trimmed.to_string())
        }
    }
}

impl From<ValidationStatus> for String {
    fn from(status: ValidationStatus) -> Self {
        match status {
            ValidationStatus::Valid => "Valid".into(),
            ValidationStatus::Invalid => "Invalid".into(),
            ValidationStatus::Pending => String::new(),
            ValidationStatus::Other(s) => s,
        }
    }
}

// ---------------------------------------------------------------------------
// Pull request views
// ---------------------------------------------------------------------------

/// The subset of PR metadata the classifier needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestMeta {
    pub number: PrNumber,
    pub title: String,
    /// Login of the PR author.
    pub author: String,
    /// Label names attached to the PR.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl PullRequestMeta {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Open/closed state of a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
}

/// Live status of a PR, checked right before closing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestStatus {
    pub state: PullRequestState,
    pub merged: bool,
    pub title: String,
}
