//! GitHub REST response shapes, reduced to the fields Curator reads.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use curator_shared::{
    ApprovalSnapshot, PrNumber, PullRequestMeta, PullRequestState, PullRequestStatus,
};

#[derive(Debug, Deserialize)]
pub(crate) struct UserDto {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelDto {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullDto {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub user: Option<UserDto>,
    #[serde(default)]
    pub labels: Vec<LabelDto>,
    pub body: Option<String>,
}

impl From<PullDto> for PullRequestMeta {
    fn from(dto: PullDto) -> Self {
        Self {
            number: PrNumber(dto.number),
            title: dto.title,
            author: dto.user.map(|u| u.login).unwrap_or_default(),
            labels: dto.labels.into_iter().map(|l| l.name).collect(),
            body: dto.body,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullStatusDto {
    pub state: PullRequestState,
    #[serde(default)]
    pub merged: bool,
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: String,
}

impl From<PullStatusDto> for PullRequestStatus {
    fn from(dto: PullStatusDto) -> Self {
        Self {
            state: dto.state,
            merged: dto.merged || dto.merged_at.is_some(),
            title: dto.title,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewDto {
    pub user: Option<UserDto>,
    pub state: String,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Reduce a review list to an approval snapshot.
///
/// Only `APPROVED` reviews count; the earliest submission names the first
/// approver. Reviews without a timestamp sort last.
pub(crate) fn approval_snapshot(reviews: Vec<ReviewDto>) -> ApprovalSnapshot {
    let mut approved: Vec<ReviewDto> = reviews
        .into_iter()
        .filter(|r| r.state.eq_ignore_ascii_case("APPROVED"))
        .collect();
    approved.sort_by_key(|r| (r.submitted_at.is_none(), r.submitted_at));

    let Some(first) = approved.first() else {
        return ApprovalSnapshot::unapproved();
    };

    ApprovalSnapshot {
        approved: true,
        approval_count: u32::try_from(approved.len()).unwrap_or(u32::MAX),
        first_approver: first.user.as_ref().map(|u| u.login.clone()),
        first_approved_at: first.submitted_at,
    }
}
