//! Closing the original PRs once their entries landed in a combined submission.

use std::fmt::{self, Write as _};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use curator_forge::Forge;
use curator_shared::{CuratorError, PacingConfig, PullRequestState, Result};

use crate::describe::ClosureTarget;

/// Asks the operator whether a batch of PRs may be closed.
pub trait BatchConfirm {
    /// `batch` is 1-based out of `total`.
    fn confirm(&self, batch: usize, total: usize, targets: &[ClosureTarget]) -> bool;
}

/// Confirms every batch (`--yes`).
pub struct AutoConfirm;

impl BatchConfirm for AutoConfirm {
    fn confirm(&self, _batch: usize, _total: usize, _targets: &[ClosureTarget]) -> bool {
        true
    }
}

/// What happened to one original PR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Commented on and closed.
    Closed,
    /// Left alone, e.g. already closed or merged.
    Skipped { reason: String },
    /// Status lookup or comment failed; nothing was changed.
    Failed { error: String },
    /// The comment was posted but closing failed.
    CommentedNotClosed { error: String },
    /// Would have been commented on and closed.
    DryRun,
}

impl CloseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Closed | Self::DryRun)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::CommentedNotClosed { .. })
    }
}

impl fmt::Display for CloseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("SUCCESS"),
            Self::DryRun => f.write_str("DRY RUN"),
            Self::Skipped { reason } => write!(f, "SKIPPED ({reason})"),
            Self::Failed { error } => write!(f, "FAILED - {error}"),
            Self::CommentedNotClosed { error } => {
                write!(f, "FAILED - commented but not closed: {error}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseResult {
    pub target: ClosureTarget,
    pub outcome: CloseOutcome,
}

/// Settings for one closing run.
#[derive(Debug, Clone)]
pub struct CloseOptions {
    /// Link to the combined submission, quoted in every comment.
    pub combined_url: String,
    /// Comment body, already rendered.
    pub comment: String,
    pub batch_size: usize,
    pub dry_run: bool,
    pub pacing: PacingConfig,
}

impl CloseOptions {
    /// Render `template`, substituting `{combined_url}`.
    pub fn new(
        combined_url: &str,
        template: &str,
        batch_size: usize,
        dry_run: bool,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            combined_url: combined_url.to_string(),
            comment: template.replace("{combined_url}", combined_url),
            batch_size,
            dry_run,
            pacing,
        }
    }
}

/// Tally of a closing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseSummary {
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CloseSummary {
    pub fn from_results(results: &[CloseResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            match &r.outcome {
                o if o.is_success() => acc.successful += 1,
                CloseOutcome::Skipped { .. } => acc.skipped += 1,
                _ => acc.failed += 1,
            }
            acc
        })
    }
}

/// Comment on and close every target, batch by batch.
///
/// Each batch needs confirmation unless this is a dry run. Failures are
/// recorded per PR and never stop the run.
#[instrument(skip_all, fields(targets = targets.len(), dry_run = options.dry_run))]
pub async fn close_originals<F: Forge, C: BatchConfirm>(
    forge: &F,
    targets: &[ClosureTarget],
    options: &CloseOptions,
    confirm: &C,
) -> Result<Vec<CloseResult>> {
    if options.batch_size == 0 {
        return Err(CuratorError::config("close batch_size must be at least 1"));
    }

    let batches: Vec<&[ClosureTarget]> = targets.chunks(options.batch_size).collect();
    let total = batches.len();
    let mut results = Vec::with_capacity(targets.len());

    for (i, batch) in batches.iter().enumerate() {
        let number = i + 1;
        if !options.dry_run && !confirm.confirm(number, total, batch) {
            info!(batch = number, "batch declined by operator");
            results.extend(batch.iter().map(|target| CloseResult {
                target: target.clone(),
                outcome: CloseOutcome::Skipped {
                    reason: "batch declined by operator".into(),
                },
            }));
            continue;
        }

        info!(batch = number, of = total, size = batch.len(), "processing batch");
        for (j, target) in batch.iter().enumerate() {
            let outcome = close_one(forge, target, options).await;
            info!(pr = %target.pr, outcome = %outcome, "processed PR");
            results.push(CloseResult {
                target: target.clone(),
                outcome,
            });
            if j + 1 < batch.len() {
                pause(options, options.pacing.close_delay_ms).await;
            }
        }

        if number < total {
            pause(options, options.pacing.batch_delay_ms).await;
        }
    }

    Ok(results)
}

async fn close_one<F: Forge>(forge: &F, target: &ClosureTarget, options: &CloseOptions) -> CloseOutcome {
    let status = match forge.pull_request_status(target.pr).await {
        Ok(status) => status,
        Err(e) => {
            warn!(pr = %target.pr, error = %e, "could not fetch PR status");
            return CloseOutcome::Failed {
                error: format!("could not fetch PR status: {e}"),
            };
        }
    };

    if status.merged {
        return CloseOutcome::Skipped {
            reason: "Already merged".into(),
        };
    }
    if status.state == PullRequestState::Closed {
        return CloseOutcome::Skipped {
            reason: "Already closed".into(),
        };
    }

    if options.dry_run {
        info!(pr = %target.pr, "dry run, would comment and close");
        return CloseOutcome::DryRun;
    }

    if let Err(e) = forge.post_comment(target.pr, &options.comment).await {
        warn!(pr = %target.pr, error = %e, "comment failed");
        return CloseOutcome::Failed {
            error: format!("failed to add comment: {e}"),
        };
    }

    pause(options, options.pacing.comment_close_delay_ms).await;

    match forge.close_pull_request(target.pr).await {
        Ok(()) => CloseOutcome::Closed,
        Err(e) => {
            warn!(pr = %target.pr, error = %e, "close failed after commenting");
            CloseOutcome::CommentedNotClosed {
                error: e.to_string(),
            }
        }
    }
}

async fn pause(options: &CloseOptions, millis: u64) {
    if !options.dry_run && millis > 0 {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

/// Human-readable log of a closing run.
pub fn render_close_log(
    results: &[CloseResult],
    combined_url: &str,
    dry_run: bool,
    at: DateTime<Utc>,
) -> String {
    let summary = CloseSummary::from_results(results);
    let mut log = String::new();

    let _ = writeln!(log, "Close Original PRs Log");
    let _ = writeln!(log, "Timestamp: {}", at.to_rfc3339());
    let _ = writeln!(log, "Combined PR URL: {combined_url}");
    let _ = writeln!(log, "Dry Run: {dry_run}");
    let _ = writeln!(log, "Total PRs Processed: {}", results.len());
    let _ = writeln!(log);
    let _ = writeln!(log, "Summary:");
    let _ = writeln!(log, "  Successful: {}", summary.successful);
    let _ = writeln!(log, "  Failed: {}", summary.failed);
    let _ = writeln!(log, "  Skipped: {}", summary.skipped);
    let _ = writeln!(log);
    let _ = writeln!(log, "Detailed Results:");
    let _ = writeln!(log, "{}", "=".repeat(50));
    for result in results {
        let _ = writeln!(
            log,
            "PR #{} ({}): {}",
            result.target.pr,
            result.target.label(),
            result.outcome
        );
    }

    log
}
