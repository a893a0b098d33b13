//! Access to the code-hosting service.
//!
//! The pipeline talks to pull requests only through the [`Forge`] trait so
//! stages can be exercised against an in-memory fake. [`GitHubClient`] is the
//! REST implementation used by the CLI.

mod github;
mod wire;

pub use github::GitHubClient;

use curator_shared::{ApprovalSnapshot, PrNumber, PullRequestMeta, PullRequestStatus, Result};

/// Operations the pipeline needs from the code-hosting service.
#[allow(async_fn_in_trait)]
pub trait Forge {
    /// One page (1-based) of open pull requests, oldest first.
    ///
    /// An empty page means pagination is complete.
    async fn list_pull_requests(&self, page: u32, per_page: u32) -> Result<Vec<PullRequestMeta>>;

    /// Metadata (including the body) of a single pull request.
    async fn pull_request(&self, pr: PrNumber) -> Result<PullRequestMeta>;

    /// Unified diff of a pull request.
    async fn pull_request_diff(&self, pr: PrNumber) -> Result<String>;

    /// Approving reviews of a pull request, earliest first.
    async fn approvals(&self, pr: PrNumber) -> Result<ApprovalSnapshot>;

    /// Live open/closed/merged state of a pull request.
    async fn pull_request_status(&self, pr: PrNumber) -> Result<PullRequestStatus>;

    /// Post a conversation comment on a pull request.
    async fn post_comment(&self, pr: PrNumber, body: &str) -> Result<()>;

    /// Close a pull request without merging it.
    async fn close_pull_request(&self, pr: PrNumber) -> Result<()>;
}
