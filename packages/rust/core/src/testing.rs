//! In-memory [`Forge`] and fixtures for stage tests.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use curator_forge::Forge;
use curator_records::EntryRecord;
use curator_shared::{
    ApprovalSnapshot, Category, CuratorError, DisplayId, PrNumber, PullRequestMeta,
    PullRequestState, PullRequestStatus, Result, ValidationStatus,
};

#[derive(Default)]
pub(crate) struct FakeForge {
    pages: Vec<Vec<PullRequestMeta>>,
    failing_page: Option<u32>,
    diffs: HashMap<PrNumber, String>,
    approvals: HashMap<PrNumber, ApprovalSnapshot>,
    failing_approvals: HashSet<PrNumber>,
    statuses: HashMap<PrNumber, PullRequestStatus>,
    bodies: HashMap<PrNumber, String>,
    failing_comments: HashSet<PrNumber>,
    failing_closes: HashSet<PrNumber>,
    calls: Mutex<Vec<String>>,
}

impl FakeForge {
    pub fn with_page(mut self, prs: Vec<PullRequestMeta>) -> Self {
        self.pages.push(prs);
        self
    }

    pub fn with_failing_page(mut self, page: u32) -> Self {
        self.failing_page = Some(page);
        self
    }

    pub fn with_diff(mut self, pr: u64, diff: &str) -> Self {
        self.diffs.insert(PrNumber(pr), diff.to_string());
        self
    }

    pub fn with_approval(mut self, pr: u64, approver: &str) -> Self {
        self.approvals.insert(
            PrNumber(pr),
            ApprovalSnapshot {
                approved: true,
                approval_count: 1,
                first_approver: Some(approver.to_string()),
                first_approved_at: Some("2025-01-02T03:04:05Z".parse().expect("timestamp")),
            },
        );
        self
    }

    pub fn with_failing_approvals(mut self, pr: u64) -> Self {
        self.failing_approvals.insert(PrNumber(pr));
        self
    }

    pub fn with_status(mut self, pr: u64, state: PullRequestState, merged: bool) -> Self {
        self.statuses.insert(
            PrNumber(pr),
            PullRequestStatus {
                state,
                merged,
                title: format!("PR {pr}"),
            },
        );
        self
    }

    pub fn with_open(self, prs: &[u64]) -> Self {
        prs.iter()
            .fold(self, |forge, pr| forge.with_status(*pr, PullRequestState::Open, false))
    }

    pub fn with_body(mut self, pr: u64, body: &str) -> Self {
        self.bodies.insert(PrNumber(pr), body.to_string());
        self
    }

    pub fn with_failing_comment(mut self, pr: u64) -> Self {
        self.failing_comments.insert(PrNumber(pr));
        self
    }

    pub fn with_failing_close(mut self, pr: u64) -> Self {
        self.failing_closes.insert(PrNumber(pr));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

impl Forge for FakeForge {
    async fn list_pull_requests(&self, page: u32, per_page: u32) -> Result<Vec<PullRequestMeta>> {
        self.record(format!("list {page}"));
        if self.failing_page == Some(page) {
            return Err(CuratorError::Network(format!("page {page} unavailable")));
        }
        let idx = usize::try_from(page).unwrap_or(usize::MAX).saturating_sub(1);
        let mut prs = self.pages.get(idx).cloned().unwrap_or_default();
        prs.truncate(per_page as usize);
        Ok(prs)
    }

    async fn pull_request(&self, pr: PrNumber) -> Result<PullRequestMeta> {
        self.record(format!("pull {pr}"));
        let body = self
            .bodies
            .get(&pr)
            .cloned()
            .ok_or_else(|| CuratorError::Network(format!("PR #{pr}: HTTP 404")))?;
        Ok(PullRequestMeta {
            number: pr,
            title: "Combined".into(),
            author: "bot".into(),
            labels: Vec::new(),
            body: Some(body),
        })
    }

    async fn pull_request_diff(&self, pr: PrNumber) -> Result<String> {
        self.record(format!("diff {pr}"));
        self.diffs
            .get(&pr)
            .cloned()
            .ok_or_else(|| CuratorError::Network(format!("diff of PR #{pr}: HTTP 404")))
    }

    async fn approvals(&self, pr: PrNumber) -> Result<ApprovalSnapshot> {
        self.record(format!("approvals {pr}"));
        if self.failing_approvals.contains(&pr) {
            return Err(CuratorError::Network("reviews unavailable".into()));
        }
        Ok(self.approvals.get(&pr).cloned().unwrap_or_default())
    }

    async fn pull_request_status(&self, pr: PrNumber) -> Result<PullRequestStatus> {
        self.record(format!("status {pr}"));
        self.statuses
            .get(&pr)
            .cloned()
            .ok_or_else(|| CuratorError::Network(format!("status of PR #{pr}: HTTP 404")))
    }

    async fn post_comment(&self, pr: PrNumber, _body: &str) -> Result<()> {
        self.record(format!("comment {pr}"));
        if self.failing_comments.contains(&pr) {
            return Err(CuratorError::Network(format!("comment on PR #{pr}: HTTP 500")));
        }
        Ok(())
    }

    async fn close_pull_request(&self, pr: PrNumber) -> Result<()> {
        self.record(format!("close {pr}"));
        if self.failing_closes.contains(&pr) {
            return Err(CuratorError::Network(format!("close PR #{pr}: HTTP 500")));
        }
        Ok(())
    }
}

pub(crate) fn meta(number: u64, labels: &[&str]) -> PullRequestMeta {
    PullRequestMeta {
        number: PrNumber(number),
        title: format!("Add entry in PR {number}"),
        author: format!("author{number}"),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        body: None,
    }
}

/// A README diff adding `lines`.
pub(crate) fn diff_adding(lines: &[&str]) -> String {
    let mut diff = String::from(
        "diff --git a/README.md b/README.md\nindex 111..222 100644\n--- a/README.md\n+++ b/README.md\n@@ -10,3 +10,6 @@\n",
    );
    for line in lines {
        diff.push('+');
        diff.push_str(line);
        diff.push('\n');
    }
    diff
}

/// A community-style record for `name`, not yet validated.
pub(crate) fn record(id: &str, name: &str, category: Category) -> EntryRecord {
    let display_id: DisplayId = id.parse().expect("display id");
    let url = format!("https://example.com/{}", name.to_lowercase());
    EntryRecord {
        display_id,
        original_id: display_id.pr(),
        split_index: display_id.index(),
        split_total: if display_id.index().is_some() { 2 } else { 1 },
        title: format!("Add {name}"),
        rendered_line: format!("- **[{name}]({url})** - {name} server"),
        url,
        name: name.to_string(),
        author: "octo".into(),
        category,
        validation_status: ValidationStatus::Pending,
        confidence: String::new(),
        notes: String::new(),
        is_approved: false,
        approval_count: 0,
        first_approver: None,
        first_approved_at: None,
    }
}

pub(crate) fn valid(mut record: EntryRecord) -> EntryRecord {
    record.validation_status = ValidationStatus::Valid;
    record
}

pub(crate) fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("curator-core-test-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}
