//! End-to-end stages: identify → (external validation) → merge → close.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};
use url::Url;

use curator_forge::Forge;
use curator_records::{collect_records, write_artifact, write_rejection_ledger};
use curator_shared::{
    AppConfig, Category, CuratorError, PacingConfig, PrNumber, PullRequestMeta,
    RepositoryConfig, Result, SectionConfig,
};

use crate::batch::write_batches;
use crate::classifier::{Classification, ClassifyOptions, classify};
use crate::closure::{
    BatchConfirm, CloseOptions, CloseResult, CloseSummary, close_originals, render_close_log,
};
use crate::context::{RejectionReason, RunContext};
use crate::describe::{ClosureTarget, describe, parse_description};
use crate::merge::{MergeOutcome, eligible_records, merge_file, render_merge_log};

/// Progress callback for reporting stage status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called for each unit of work within a phase.
    fn step(&self, current: usize, total: usize, detail: &str);
    /// Called when the stage completes.
    fn done(&self);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn step(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self) {}
}

async fn pause(millis: u64) {
    if millis > 0 {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

// ---------------------------------------------------------------------------
// Identify
// ---------------------------------------------------------------------------

/// Configuration for the `identify` stage.
#[derive(Debug, Clone)]
pub struct IdentifyOptions {
    /// PRs per listing page (1-100).
    pub per_page: u32,
    pub start_page: u32,
    /// Listing pages to fetch at most; `None` fetches until an empty page.
    pub max_pages: Option<u32>,
    pub batch_size: usize,
    /// Keep only records of this category; `None` keeps all.
    pub category: Option<Category>,
    pub output_prefix: String,
    pub out_dir: PathBuf,
    pub write_rejections: bool,
    pub classify: ClassifyOptions,
    pub pacing: PacingConfig,
}

impl IdentifyOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            per_page: config.identify.per_page,
            start_page: config.identify.start_page,
            max_pages: (config.identify.max_pages > 0).then_some(config.identify.max_pages),
            batch_size: config.identify.batch_size,
            category: None,
            output_prefix: config.identify.output_prefix.clone(),
            out_dir: PathBuf::from(&config.output.dir),
            write_rejections: config.identify.write_rejections,
            classify: ClassifyOptions::from_config(config),
            pacing: config.pacing.clone(),
        }
    }

    fn check(&self) -> Result<()> {
        if !(1..=100).contains(&self.per_page) {
            return Err(CuratorError::validation(format!(
                "per_page must be between 1 and 100, got {}",
                self.per_page
            )));
        }
        if self.start_page == 0 {
            return Err(CuratorError::validation("start_page starts at 1"));
        }
        if self.max_pages == Some(0) {
            return Err(CuratorError::validation(
                "max_pages must be at least 1, or unset to fetch every page",
            ));
        }
        if self.batch_size == 0 {
            return Err(CuratorError::config("batch_size must be at least 1"));
        }
        Ok(())
    }
}

/// Result of the `identify` stage.
#[derive(Debug)]
pub struct IdentifySummary {
    /// Unique PRs classified.
    pub analyzed: usize,
    /// PRs that yielded at least one entry.
    pub accepted: usize,
    /// Accepted PRs that already carried an approval.
    pub pre_approved: usize,
    pub rejected: usize,
    /// Records written after the category filter.
    pub records: usize,
    pub official: usize,
    pub community: usize,
    /// Records dropped by the category filter.
    pub filtered_out: usize,
    /// Rejection counts, most frequent first.
    pub reasons: Vec<(RejectionReason, usize)>,
    pub batch_files: Vec<PathBuf>,
    pub ledger: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Fetch open PRs oldest first, page by page, deduplicated by number.
///
/// Stops at the first empty page, or after `max_pages` when set. A failing
/// page ends the listing with that error.
#[instrument(skip_all, fields(start_page = options.start_page, max_pages = ?options.max_pages))]
pub async fn fetch_open_prs<F: Forge>(
    forge: &F,
    options: &IdentifyOptions,
    progress: &dyn ProgressReporter,
) -> Result<Vec<PullRequestMeta>> {
    if options.max_pages == Some(0) {
        return Err(CuratorError::validation("max_pages must be at least 1"));
    }

    let mut seen: HashSet<PrNumber> = HashSet::new();
    let mut prs = Vec::new();
    let mut fetched_pages: u32 = 0;

    loop {
        if let Some(max) = options.max_pages {
            if fetched_pages >= max {
                info!(max, "reached page limit");
                break;
            }
        }
        let page = options.start_page + fetched_pages;
        if fetched_pages > 0 {
            pause(options.pacing.page_delay_ms).await;
        }
        fetched_pages += 1;
        progress.phase(&format!("Fetching PR page {page}"));

        let listed = forge
            .list_pull_requests(page, options.per_page)
            .await
            .inspect_err(|e| warn!(page, error = %e, "PR listing failed"))?;
        if listed.is_empty() {
            info!(page, "no more PRs, pagination complete");
            break;
        }

        let fetched = listed.len();
        let before = prs.len();
        prs.extend(listed.into_iter().filter(|pr| seen.insert(pr.number)));
        let duplicates = fetched - (prs.len() - before);
        if duplicates > 0 {
            debug!(page, duplicates, "skipped PRs already seen");
        }
        info!(page, fetched, total = prs.len(), "fetched PR page");
    }

    Ok(prs)
}

/// Run the `identify` stage: list, classify, batch, and record rejections.
#[instrument(skip_all, fields(run_id = %ctx.run_id()))]
pub async fn identify<F: Forge>(
    forge: &F,
    options: &IdentifyOptions,
    ctx: &mut RunContext,
    progress: &dyn ProgressReporter,
) -> Result<IdentifySummary> {
    options.check()?;
    let start = Instant::now();

    let prs = fetch_open_prs(forge, options, progress).await?;
    info!(count = prs.len(), "classifying PRs");

    progress.phase("Classifying PRs");
    let total = prs.len();
    let mut accepted = 0;
    let mut pre_approved = 0;
    let mut records = Vec::new();

    for (i, meta) in prs.iter().enumerate() {
        if i > 0 {
            pause(options.pacing.pr_delay_ms).await;
        }
        progress.step(i + 1, total, &format!("PR #{}: {}", meta.number, meta.title));

        match classify(forge, meta, &options.classify).await {
            Classification::Accepted(pr) => {
                accepted += 1;
                if pr.approval.approved {
                    pre_approved += 1;
                }
                records.extend(pr.records);
            }
            Classification::Rejected(rejection) => ctx.reject(rejection),
        }
    }

    let before = records.len();
    if let Some(category) = options.category {
        records.retain(|r| r.category == category);
    }
    let filtered_out = before - records.len();
    if filtered_out > 0 {
        info!(
            kept = records.len(),
            filtered_out,
            category = ?options.category,
            "applied category filter"
        );
    }

    progress.phase("Writing batch files");
    let batch_files = write_batches(
        &options.out_dir,
        &options.output_prefix,
        &records,
        options.batch_size,
    )?;

    let ledger = if options.write_rejections && !ctx.rejections().is_empty() {
        let rows: Vec<_> = ctx.rejections().iter().map(|r| r.to_row()).collect();
        Some(write_rejection_ledger(&options.out_dir, &ctx.file_stamp(), &rows)?)
    } else {
        None
    };

    let count = |category: Category| records.iter().filter(|r| r.category == category).count();
    let summary = IdentifySummary {
        analyzed: total,
        accepted,
        pre_approved,
        rejected: ctx.rejections().len(),
        records: records.len(),
        official: count(Category::Official),
        community: count(Category::Community),
        filtered_out,
        reasons: ctx.reason_breakdown(),
        batch_files,
        ledger,
        elapsed: start.elapsed(),
    };

    info!(
        analyzed = summary.analyzed,
        accepted = summary.accepted,
        rejected = summary.rejected,
        records = summary.records,
        "identify complete"
    );
    progress.done();
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Configuration for the `merge` stage.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub category: Category,
    pub document_path: PathBuf,
    pub validation_dir: PathBuf,
    /// Where the merge log and description are written.
    pub out_dir: PathBuf,
    pub dry_run: bool,
    pub generate_description: bool,
    pub section: SectionConfig,
    pub repository: RepositoryConfig,
}

impl MergeOptions {
    pub fn from_config(config: &AppConfig, category: Category) -> Self {
        Self {
            category,
            document_path: PathBuf::from(&config.document.path),
            validation_dir: PathBuf::from(&config.output.validation_dir),
            out_dir: PathBuf::from(&config.output.dir),
            dry_run: false,
            generate_description: false,
            section: config.sections.get(category).clone(),
            repository: config.repository.clone(),
        }
    }
}

/// Result of the `merge` stage.
#[derive(Debug)]
pub struct MergeReport {
    /// Rows read from the validation directory, any category or status.
    pub records_read: usize,
    /// Valid rows of the requested category.
    pub eligible: usize,
    pub outcome: MergeOutcome,
    pub description: Option<PathBuf>,
    /// Merge log, written only when the document was replaced.
    pub log: Option<PathBuf>,
}

/// Run the `merge` stage for one category.
///
/// The description, when requested, is generated against the document as it
/// was before the merge.
#[instrument(skip_all, fields(run_id = %ctx.run_id(), category = %options.category, dry_run = options.dry_run))]
pub fn run_merge(
    options: &MergeOptions,
    ctx: &RunContext,
    progress: &dyn ProgressReporter,
) -> Result<MergeReport> {
    progress.phase("Reading validated records");
    let records = collect_records(&options.validation_dir)?;
    let (eligible, excluded) = eligible_records(&records, options.category);
    let eligible = eligible.len();
    info!(
        read = records.len(),
        eligible,
        excluded_icons = excluded.len(),
        "collected validated records"
    );
    if eligible == 0 {
        warn!(category = %options.category, "no valid records for this category");
    }

    let description = if options.generate_description {
        progress.phase("Generating description");
        let document = std::fs::read_to_string(&options.document_path)
            .map_err(|e| CuratorError::io(&options.document_path, e))?;
        let text = describe(
            &records,
            options.category,
            &options.section,
            &options.repository,
            Some(&document),
        );
        let name = format!("description_{}_{}.md", options.category, ctx.file_stamp());
        let path = write_artifact(&options.out_dir, &name, &text)?;
        info!(path = %path.display(), "wrote description");
        Some(path)
    } else {
        None
    };

    progress.phase("Merging into document");
    let outcome = merge_file(
        &options.document_path,
        &records,
        options.category,
        &options.section,
        options.dry_run,
    )?;

    let log = if !options.dry_run && outcome.changed {
        let text = render_merge_log(
            &outcome,
            &options.section,
            &options.document_path,
            ctx.started_at(),
        );
        let name = format!("{}_merge_log_{}.txt", options.category, ctx.file_stamp());
        Some(write_artifact(&options.out_dir, &name, &text)?)
    } else {
        None
    };

    progress.done();
    Ok(MergeReport {
        records_read: records.len(),
        eligible,
        outcome,
        description,
        log,
    })
}

// ---------------------------------------------------------------------------
// Close
// ---------------------------------------------------------------------------

/// Configuration for the `close` stage.
#[derive(Debug, Clone)]
pub struct CloseStageOptions {
    /// Link to the combined PR. Its body is the description unless
    /// `description_file` is given.
    pub combined_url: Option<String>,
    pub description_file: Option<PathBuf>,
    /// Comment template; `{combined_url}` is substituted.
    pub comment_template: String,
    pub batch_size: usize,
    pub dry_run: bool,
    pub pacing: PacingConfig,
    pub out_dir: PathBuf,
}

impl CloseStageOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            combined_url: None,
            description_file: None,
            comment_template: config.close.comment_template.clone(),
            batch_size: config.close.batch_size,
            dry_run: false,
            pacing: config.pacing.clone(),
            out_dir: PathBuf::from(&config.output.dir),
        }
    }

    fn close_options(&self) -> Result<CloseOptions> {
        let combined_url = match &self.combined_url {
            Some(url) => url.as_str(),
            None if self.comment_template.contains("{combined_url}") => {
                return Err(CuratorError::validation(
                    "the comment template links the combined PR; pass its URL",
                ));
            }
            None => "",
        };
        Ok(CloseOptions::new(
            combined_url,
            &self.comment_template,
            self.batch_size,
            self.dry_run,
            self.pacing.clone(),
        ))
    }
}

/// Result of the `close` stage.
#[derive(Debug)]
pub struct CloseReport {
    pub results: Vec<CloseResult>,
    pub summary: CloseSummary,
    pub log: PathBuf,
}

/// PR number of a pull request URL such as `https://github.com/o/r/pull/12`.
pub fn combined_pr_number(link: &str) -> Result<PrNumber> {
    let parsed = Url::parse(link)
        .map_err(|e| CuratorError::validation(format!("invalid PR URL '{link}': {e}")))?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();

    segments
        .windows(2)
        .find(|pair| pair[0] == "pull")
        .and_then(|pair| pair[1].parse::<u64>().ok())
        .map(PrNumber)
        .ok_or_else(|| CuratorError::validation(format!("no /pull/<number> in '{link}'")))
}

/// Load the description and recover the original PRs it references.
#[instrument(skip_all)]
pub async fn resolve_targets<F: Forge>(
    forge: &F,
    options: &CloseStageOptions,
) -> Result<Vec<ClosureTarget>> {
    let description = match (&options.description_file, &options.combined_url) {
        (Some(path), _) => {
            std::fs::read_to_string(path).map_err(|e| CuratorError::io(path, e))?
        }
        (None, Some(link)) => {
            let pr = combined_pr_number(link)?;
            let combined = forge.pull_request(pr).await?;
            combined.body.unwrap_or_default()
        }
        (None, None) => {
            return Err(CuratorError::validation(
                "a combined PR URL or a description file is required",
            ));
        }
    };

    let targets = parse_description(&description);
    if targets.is_empty() {
        return Err(CuratorError::validation(
            "no original PR references found in the description",
        ));
    }
    info!(count = targets.len(), "found original PRs");
    Ok(targets)
}

/// Run the `close` stage over already resolved targets and write the log.
#[instrument(skip_all, fields(run_id = %ctx.run_id(), targets = targets.len(), dry_run = options.dry_run))]
pub async fn run_close<F: Forge, C: BatchConfirm>(
    forge: &F,
    targets: &[ClosureTarget],
    options: &CloseStageOptions,
    confirm: &C,
    ctx: &RunContext,
    progress: &dyn ProgressReporter,
) -> Result<CloseReport> {
    let close = options.close_options()?;

    progress.phase(&format!("Closing {} original PRs", targets.len()));
    let results = close_originals(forge, targets, &close, confirm).await?;
    let summary = CloseSummary::from_results(&results);

    let text = render_close_log(&results, &close.combined_url, close.dry_run, ctx.started_at());
    let log = write_artifact(
        &options.out_dir,
        &format!("close_prs_log_{}.txt", ctx.file_stamp()),
        &text,
    )?;

    info!(
        successful = summary.successful,
        skipped = summary.skipped,
        failed = summary.failed,
        log = %log.display(),
        "close complete"
    );
    progress.done();
    Ok(CloseReport {
        results,
        summary,
        log,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::{AutoConfirm, CloseOutcome};
    use crate::testing::{FakeForge, diff_adding, meta, record, temp_dir, valid};
    use curator_records::{read_records, write_records};
    use curator_shared::{PullRequestState, ValidationStatus};

    const ALPHA: &str = "- **[Alpha](https://alpha.dev)** - Alpha server";
    const BETA: &str = "- **[Beta](https://beta.dev)** - Beta server";
    const GAMMA: &str = "- **[Gamma](https://gamma.dev)** - Gamma server";

    fn identify_options(out_dir: PathBuf) -> IdentifyOptions {
        let mut options = IdentifyOptions::from_config(&AppConfig::default());
        options.out_dir = out_dir;
        options.pacing = PacingConfig::none();
        options
    }

    fn forge_with_three_pages() -> FakeForge {
        FakeForge::default()
            .with_page(vec![meta(1, &[]), meta(2, &[])])
            .with_page(vec![meta(2, &[]), meta(3, &["add-official-server"])])
            .with_diff(1, &diff_adding(&[ALPHA]))
            .with_diff(2, "diff --git a/src/lib.rs b/src/lib.rs\n+++ b/src/lib.rs\n+fn x() {}\n")
            .with_diff(3, &diff_adding(&[BETA, GAMMA]))
            .with_approval(3, "maintainer")
    }

    #[tokio::test]
    async fn pagination_dedups_and_stops_on_empty_page() {
        let forge = forge_with_three_pages();
        let options = identify_options(PathBuf::from("unused"));

        let prs = fetch_open_prs(&forge, &options, &SilentProgress).await.unwrap();
        let numbers: Vec<u64> = prs.iter().map(|p| p.number.0).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(forge.calls_matching("list"), 3);
    }

    #[tokio::test]
    async fn listing_failure_ends_with_error() {
        let forge = forge_with_three_pages().with_failing_page(2);
        let options = identify_options(PathBuf::from("unused"));
        let err = fetch_open_prs(&forge, &options, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, CuratorError::Network(_)));
    }

    #[tokio::test]
    async fn identify_writes_batches_and_ledger() {
        let tmp = temp_dir();
        let forge = forge_with_three_pages();
        let options = identify_options(tmp.clone());
        let mut ctx = RunContext::new();

        let summary = identify(&forge, &options, &mut ctx, &SilentProgress).await.unwrap();

        assert_eq!(summary.analyzed, 3);
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.pre_approved, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.records, 3);
        assert_eq!((summary.official, summary.community), (2, 1));
        assert_eq!(summary.reasons, vec![(RejectionReason::NoDocumentChanges, 1)]);
        assert_eq!(summary.batch_files.len(), 2);

        let official = read_records(&tmp.join("server_addition_prs_official_batch_1.csv")).unwrap();
        let ids: Vec<String> = official.iter().map(|r| r.display_id.to_string()).collect();
        assert_eq!(ids, vec!["3-1", "3-2"]);
        assert!(official.iter().all(|r| r.validation_status == ValidationStatus::Valid));
        assert!(official.iter().all(|r| r.first_approver.as_deref() == Some("maintainer")));

        let ledger = summary.ledger.expect("ledger written");
        let text = std::fs::read_to_string(ledger).unwrap();
        assert!(text.contains("no-document-changes"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn category_filter_drops_other_records() {
        let tmp = temp_dir();
        let forge = forge_with_three_pages();
        let mut options = identify_options(tmp.clone());
        options.category = Some(Category::Community);
        options.write_rejections = false;
        let mut ctx = RunContext::new();

        let summary = identify(&forge, &options, &mut ctx, &SilentProgress).await.unwrap();
        assert_eq!(summary.records, 1);
        assert_eq!(summary.filtered_out, 2);
        assert!(summary.ledger.is_none());
        assert_eq!(
            summary.batch_files,
            vec![tmp.join("server_addition_prs_community_batch_1.csv")]
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn per_page_out_of_range_is_rejected() {
        let forge = FakeForge::default();
        let mut options = identify_options(PathBuf::from("unused"));
        options.per_page = 101;
        let err = identify(&forge, &options, &mut RunContext::new(), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CuratorError::Validation { .. }));
        assert!(forge.calls().is_empty());
    }

    #[tokio::test]
    async fn unbounded_listing_reads_until_empty_page() {
        let forge = (1..=25).fold(FakeForge::default(), |forge, n| {
            forge.with_page(vec![meta(n, &[])])
        });
        let mut options = identify_options(PathBuf::from("unused"));
        options.max_pages = None;

        let prs = fetch_open_prs(&forge, &options, &SilentProgress).await.unwrap();
        assert_eq!(prs.len(), 25);
        assert_eq!(forge.calls_matching("list"), 26);
    }

    #[tokio::test]
    async fn page_limit_stops_listing() {
        let forge = forge_with_three_pages();
        let mut options = identify_options(PathBuf::from("unused"));
        options.max_pages = Some(1);

        let prs = fetch_open_prs(&forge, &options, &SilentProgress).await.unwrap();
        let numbers: Vec<u64> = prs.iter().map(|p| p.number.0).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(forge.calls_matching("list"), 1);
    }

    #[tokio::test]
    async fn zero_page_limit_is_rejected() {
        let forge = forge_with_three_pages();
        let mut options = identify_options(PathBuf::from("unused"));
        options.max_pages = Some(0);

        let err = identify(&forge, &options, &mut RunContext::new(), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CuratorError::Validation { .. }));
        let err = fetch_open_prs(&forge, &options, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, CuratorError::Validation { .. }));
        assert!(forge.calls().is_empty());
    }

    #[test]
    fn zero_max_pages_in_config_means_unbounded() {
        let mut config = AppConfig::default();
        assert_eq!(IdentifyOptions::from_config(&config).max_pages, Some(20));
        config.identify.max_pages = 0;
        assert_eq!(IdentifyOptions::from_config(&config).max_pages, None);
    }

    const README: &str = "# Servers\n\n### 🌎 Community Servers\n\n- **[Delta](https://example.com/delta)** - Delta server\n\n## Frameworks\n";

    fn merge_setup() -> (PathBuf, MergeOptions) {
        let tmp = temp_dir();
        let validation = tmp.join("validated");
        write_records(
            &validation.join("batch_1.csv"),
            &[
                valid(record("10", "Charlie", Category::Community)),
                valid(record("11", "Delta", Category::Community)),
                record("12", "Pending", Category::Community),
            ],
        )
        .unwrap();
        std::fs::write(validation.join("notes.txt"), "ignored").unwrap();
        std::fs::write(tmp.join("README.md"), README).unwrap();

        let mut options = MergeOptions::from_config(&AppConfig::default(), Category::Community);
        options.document_path = tmp.join("README.md");
        options.validation_dir = validation;
        options.out_dir = tmp.join("out");
        (tmp, options)
    }

    #[test]
    fn merge_stage_writes_document_log_and_description() {
        let (tmp, mut options) = merge_setup();
        options.generate_description = true;
        let ctx = RunContext::new();

        let report = run_merge(&options, &ctx, &SilentProgress).unwrap();
        assert_eq!(report.records_read, 3);
        assert_eq!(report.eligible, 2);
        assert_eq!(report.outcome.added.len(), 1);

        let document = std::fs::read_to_string(&options.document_path).unwrap();
        assert!(document.contains(
            "- **[Charlie](https://example.com/charlie)** - Charlie server\n- **[Delta](https://example.com/delta)** - Delta server\n"
        ));

        let description = std::fs::read_to_string(report.description.expect("description")).unwrap();
        assert!(description.starts_with("# Add 1 Community MCP Server\n"));
        assert!(description.contains("[Charlie]"));
        assert!(!description.contains("[Delta]"));

        let log = report.log.expect("log written");
        assert!(log.file_name().unwrap().to_string_lossy().starts_with("community_merge_log_"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn merge_stage_dry_run_writes_nothing_to_document() {
        let (tmp, mut options) = merge_setup();
        options.dry_run = true;

        let report = run_merge(&options, &RunContext::new(), &SilentProgress).unwrap();
        assert!(report.outcome.changed);
        assert!(report.log.is_none());
        assert_eq!(std::fs::read_to_string(&options.document_path).unwrap(), README);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn pr_number_from_url() {
        assert_eq!(
            combined_pr_number("https://github.com/o/r/pull/2007").unwrap(),
            PrNumber(2007)
        );
        assert_eq!(
            combined_pr_number("https://github.com/o/r/pull/2007/files").unwrap(),
            PrNumber(2007)
        );
        assert!(combined_pr_number("https://github.com/o/r/issues/5").is_err());
        assert!(combined_pr_number("not a url").is_err());
    }

    fn close_options(out_dir: PathBuf) -> CloseStageOptions {
        let mut options = CloseStageOptions::from_config(&AppConfig::default());
        options.combined_url = Some("https://github.com/o/r/pull/900".into());
        options.pacing = PacingConfig::none();
        options.out_dir = out_dir;
        options
    }

    const DESCRIPTION: &str = "# Add 2 Community MCP Servers\n\n## Added Entries\n\n\
- **[A](https://a.dev)** ([PR #5](https://github.com/o/r/pull/5)) by @x\n\
- **[B](https://b.dev)** ([PR #6](https://github.com/o/r/pull/6)) (server 1 of 2) by @y\n\
- **[C](https://c.dev)** ([PR #6](https://github.com/o/r/pull/6)) (server 2 of 2) by @y\n";

    #[tokio::test]
    async fn targets_come_from_combined_pr_body() {
        let forge = FakeForge::default().with_body(900, DESCRIPTION);
        let targets = resolve_targets(&forge, &close_options(PathBuf::from("unused")))
            .await
            .unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].label(), "B, C");
        assert_eq!(forge.calls(), vec!["pull 900".to_string()]);
    }

    #[tokio::test]
    async fn description_file_wins_over_fetch() {
        let tmp = temp_dir();
        let path = tmp.join("description.md");
        std::fs::write(&path, DESCRIPTION).unwrap();
        let forge = FakeForge::default();
        let mut options = close_options(tmp.clone());
        options.description_file = Some(path);

        let targets = resolve_targets(&forge, &options).await.unwrap();
        assert_eq!(targets.len(), 2);
        assert!(forge.calls().is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn description_without_references_is_an_error() {
        let forge = FakeForge::default().with_body(900, "Nothing to see.");
        let err = resolve_targets(&forge, &close_options(PathBuf::from("unused")))
            .await
            .unwrap_err();
        assert!(matches!(err, CuratorError::Validation { .. }));
    }

    #[tokio::test]
    async fn close_stage_writes_log() {
        let tmp = temp_dir();
        let forge = FakeForge::default()
            .with_open(&[5])
            .with_status(6, PullRequestState::Closed, false);
        let targets = parse_description(DESCRIPTION);
        let ctx = RunContext::new();

        let report = run_close(&forge, &targets, &close_options(tmp.clone()), &AutoConfirm, &ctx, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.results[0].outcome, CloseOutcome::Closed);
        assert_eq!(report.summary.skipped, 1);
        let log = std::fs::read_to_string(&report.log).unwrap();
        assert!(log.contains("Combined PR URL: https://github.com/o/r/pull/900\n"));
        assert!(log.contains("PR #6 (B, C): SKIPPED (Already closed)\n"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn missing_combined_url_is_rejected_when_template_needs_it() {
        let forge = FakeForge::default().with_open(&[5]);
        let mut options = close_options(PathBuf::from("unused"));
        options.combined_url = None;

        let err = run_close(
            &forge,
            &parse_description(DESCRIPTION),
            &options,
            &AutoConfirm,
            &RunContext::new(),
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CuratorError::Validation { .. }));
        assert!(forge.calls().is_empty());
    }
}
