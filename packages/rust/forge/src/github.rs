//! GitHub REST client.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use curator_shared::{
    ApprovalSnapshot, CuratorError, PrNumber, PullRequestMeta, PullRequestStatus,
    RepositoryConfig, Result,
};

use crate::Forge;
use crate::wire::{PullDto, PullStatusDto, ReviewDto, approval_snapshot};

const USER_AGENT: &str = concat!("curator/", env!("CARGO_PKG_VERSION"));
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";
const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const REVIEWS_PER_PAGE: u32 = 100;

/// [`Forge`] implementation backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    repo_base: String,
    cooldown: Duration,
}

impl GitHubClient {
    /// Build a client for the repository in `repo`.
    ///
    /// `token` is optional for read-only use; commenting and closing need it.
    /// A rate-limited request is retried once after `cooldown`.
    pub fn new(repo: &RepositoryConfig, token: Option<&str>, cooldown: Duration) -> Result<Self> {
        let api_base = Url::parse(&repo.api_base)
            .map_err(|e| CuratorError::config(format!("invalid api_base '{}': {e}", repo.api_base)))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| CuratorError::config(format!("token is not a valid header value: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CuratorError::Network(format!("failed to build HTTP client: {e}")))?;

        let repo_base = format!(
            "{}/repos/{}/{}",
            api_base.as_str().trim_end_matches('/'),
            repo.owner,
            repo.name
        );

        Ok(Self {
            http,
            repo_base,
            cooldown,
        })
    }

    fn endpoint(&self, tail: &str) -> String {
        format!("{}/{tail}", self.repo_base)
    }

    /// Send a request, retrying it once after the cool-down when rate limited.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let retry = request.try_clone();
        match self.send_once(request, what).await {
            Err(e) if e.is_rate_limited() => {
                let Some(retry) = retry else {
                    return Err(e);
                };
                warn!(
                    what,
                    cooldown_secs = self.cooldown.as_secs(),
                    "rate limited, waiting before retry"
                );
                tokio::time::sleep(self.cooldown).await;
                self.send_once(retry, what).await
            }
            other => other,
        }
    }

    async fn send_once(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| CuratorError::Network(format!("{what}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let exhausted = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0");
        let body = response.text().await.unwrap_or_default();

        if is_rate_limit(status, exhausted, &body) {
            return Err(CuratorError::RateLimited(format!("{what}: HTTP {status}")));
        }

        Err(CuratorError::Network(format!(
            "{what}: HTTP {status}: {}",
            snippet(&body)
        )))
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        self.send(request, what)
            .await?
            .json::<T>()
            .await
            .map_err(|e| CuratorError::parse(format!("{what}: invalid response body: {e}")))
    }
}

impl Forge for GitHubClient {
    #[instrument(skip(self))]
    async fn list_pull_requests(&self, page: u32, per_page: u32) -> Result<Vec<PullRequestMeta>> {
        let request = self.http.get(self.endpoint("pulls")).query(&[
            ("state", "open".to_string()),
            ("direction", "asc".to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ]);
        let pulls: Vec<PullDto> = self.get_json(request, &format!("list PRs page {page}")).await?;
        debug!(page, count = pulls.len(), "fetched PR page");
        Ok(pulls.into_iter().map(PullRequestMeta::from).collect())
    }

    #[instrument(skip_all, fields(pr = %pr))]
    async fn pull_request(&self, pr: PrNumber) -> Result<PullRequestMeta> {
        let request = self.http.get(self.endpoint(&format!("pulls/{pr}")));
        let pull: PullDto = self.get_json(request, &format!("PR #{pr}")).await?;
        Ok(pull.into())
    }

    #[instrument(skip_all, fields(pr = %pr))]
    async fn pull_request_diff(&self, pr: PrNumber) -> Result<String> {
        let what = format!("diff of PR #{pr}");
        let request = self
            .http
            .get(self.endpoint(&format!("pulls/{pr}")))
            .header(ACCEPT, DIFF_MEDIA_TYPE);
        self.send(request, &what)
            .await?
            .text()
            .await
            .map_err(|e| CuratorError::Network(format!("{what}: failed to read body: {e}")))
    }

    #[instrument(skip_all, fields(pr = %pr))]
    async fn approvals(&self, pr: PrNumber) -> Result<ApprovalSnapshot> {
        let request = self
            .http
            .get(self.endpoint(&format!("pulls/{pr}/reviews")))
            .query(&[("per_page", REVIEWS_PER_PAGE)]);
        let reviews: Vec<ReviewDto> = self
            .get_json(request, &format!("reviews of PR #{pr}"))
            .await?;
        Ok(approval_snapshot(reviews))
    }

    #[instrument(skip_all, fields(pr = %pr))]
    async fn pull_request_status(&self, pr: PrNumber) -> Result<PullRequestStatus> {
        let request = self.http.get(self.endpoint(&format!("pulls/{pr}")));
        let status: PullStatusDto = self
            .get_json(request, &format!("status of PR #{pr}"))
            .await?;
        Ok(status.into())
    }

    #[instrument(skip_all, fields(pr = %pr))]
    async fn post_comment(&self, pr: PrNumber, body: &str) -> Result<()> {
        let request = self
            .http
            .post(self.endpoint(&format!("issues/{pr}/comments")))
            .json(&serde_json::json!({ "body": body }));
        self.send(request, &format!("comment on PR #{pr}")).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(pr = %pr))]
    async fn close_pull_request(&self, pr: PrNumber) -> Result<()> {
        let request = self
            .http
            .patch(self.endpoint(&format!("pulls/{pr}")))
            .json(&serde_json::json!({ "state": "closed" }));
        self.send(request, &format!("close PR #{pr}")).await?;
        Ok(())
    }
}

fn is_rate_limit(status: StatusCode, exhausted: bool, body: &str) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (exhausted || body.to_lowercase().contains("rate limit")))
}

fn snippet(body: &str) -> &str {
    const MAX: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}
