//! PR classification: decide whether a PR adds list entries and extract them.

use tracing::{debug, info, instrument, warn};

use curator_forge::Forge;
use curator_markdown::{Entry, contains_icon, extract};
use curator_records::EntryRecord;
use curator_shared::{
    AppConfig, ApprovalSnapshot, Category, DisplayId, PullRequestMeta, ValidationStatus,
};

use crate::context::{Rejection, RejectionReason};

/// Classification knobs, resolved from [`AppConfig`] and CLI overrides.
#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    /// Repository path of the canonical document.
    pub document_file: String,
    pub max_entries_per_pr: usize,
    pub split_multiple: bool,
    /// Non-entry added lines tolerated on top of one per entry.
    pub noise_allowance: usize,
    pub excluded_labels: Vec<String>,
    pub official_label: String,
    pub community_label: String,
}

impl ClassifyOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            document_file: config.document.file_name.clone(),
            max_entries_per_pr: config.identify.max_entries_per_pr,
            split_multiple: config.identify.split_multiple,
            noise_allowance: config.identify.noise_allowance,
            excluded_labels: config.identify.excluded_labels.clone(),
            official_label: config.identify.official_label.clone(),
            community_label: config.identify.community_label.clone(),
        }
    }
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// What a diff adds, before any policy is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffAnalysis {
    /// Some file header in the diff names the canonical document.
    pub touches_document: bool,
    /// Entries extracted from added lines, in diff order.
    pub entries: Vec<Entry>,
    /// Non-blank added lines that are not entries.
    pub noise: usize,
}

/// Outcome of classifying one PR.
#[derive(Debug, Clone)]
pub enum Classification {
    Accepted(AcceptedPr),
    Rejected(Rejection),
}

/// A PR that yielded at least one entry.
#[derive(Debug, Clone)]
pub struct AcceptedPr {
    pub pr: PullRequestMeta,
    pub approval: ApprovalSnapshot,
    /// One record per entry, all sharing the PR's approval snapshot.
    pub records: Vec<EntryRecord>,
}

/// Scan a unified diff for added entry lines.
pub fn analyze_diff(diff: &str, document_file: &str) -> DiffAnalysis {
    let mut analysis = DiffAnalysis {
        touches_document: touches_document(diff, document_file),
        ..DiffAnalysis::default()
    };

    for line in diff.lines() {
        let Some(added) = added_line(line) else {
            continue;
        };
        match extract(added) {
            Some(entry) => {
                debug!(name = entry.name(), "found entry line");
                analysis.entries.push(entry);
            }
            None if !added.trim().is_empty() => analysis.noise += 1,
            None => {}
        }
    }

    analysis
}

/// Content of an added diff line, excluding `+++` file headers.
fn added_line(line: &str) -> Option<&str> {
    if line.starts_with("+++") {
        return None;
    }
    line.strip_prefix('+')
}

fn touches_document(diff: &str, document_file: &str) -> bool {
    let wanted = document_file.trim_start_matches('/');
    diff.lines().any(|line| {
        if let Some(paths) = line.strip_prefix("diff --git ") {
            paths.split_whitespace().any(|p| diff_path(p) == wanted)
        } else if let Some(path) = line
            .strip_prefix("+++ ")
            .or_else(|| line.strip_prefix("--- "))
        {
            diff_path(path.trim()) == wanted
        } else {
            false
        }
    })
}

fn diff_path(raw: &str) -> &str {
    raw.strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw)
}

/// Apply the entry-count and noise policies to an analyzed diff.
pub fn screen_entries(
    meta: &PullRequestMeta,
    analysis: DiffAnalysis,
    options: &ClassifyOptions,
) -> Result<Vec<Entry>, Rejection> {
    if !analysis.touches_document {
        return Err(Rejection::new(
            meta,
            RejectionReason::NoDocumentChanges,
            format!("no changes to {}", options.document_file),
        ));
    }

    let count = analysis.entries.len();
    if count == 0 {
        return Err(Rejection::new(
            meta,
            RejectionReason::NoEntriesFound,
            "no entry lines found in diff additions",
        ));
    }
    if count > options.max_entries_per_pr {
        return Err(Rejection::new(
            meta,
            RejectionReason::ExceedsEntryLimit,
            format!("{count} entry lines exceed the limit of {}", options.max_entries_per_pr),
        ));
    }
    if count > 1 && !options.split_multiple {
        return Err(Rejection::new(
            meta,
            RejectionReason::MultipleEntriesDisabled,
            format!("{count} entry lines and splitting is disabled"),
        ));
    }

    let tolerated = options.noise_allowance + count;
    if analysis.noise > tolerated {
        return Err(Rejection::new(
            meta,
            RejectionReason::TooMuchNoise,
            format!("{} non-entry additions (at most {tolerated} allowed)", analysis.noise),
        ));
    }

    Ok(analysis.entries)
}

/// Category of an entry: explicit labels win, otherwise the line heuristic.
///
/// The heuristic treats any icon or the word "official" as official; it can
/// misfire on community entries that mention the word.
pub fn categorize(labels: &[String], rendered_line: &str, options: &ClassifyOptions) -> Category {
    if labels.iter().any(|l| *l == options.official_label) {
        return Category::Official;
    }
    if labels.iter().any(|l| *l == options.community_label) {
        return Category::Community;
    }
    if contains_icon(rendered_line) || rendered_line.to_lowercase().contains("official") {
        Category::Official
    } else {
        Category::Community
    }
}

/// Turn accepted entries into records carrying the PR's approval snapshot.
pub fn build_records(
    meta: &PullRequestMeta,
    entries: &[Entry],
    approval: &ApprovalSnapshot,
    options: &ClassifyOptions,
) -> Vec<EntryRecord> {
    let total = entries.len();
    let split_total = u32::try_from(total).unwrap_or(u32::MAX);

    let (validation_status, confidence, notes) = if approval.approved {
        (
            ValidationStatus::Valid,
            "100%".to_string(),
            format!(
                "Pre-approved PR - skipping manual validation (approved by {})",
                approval.first_approver.as_deref().unwrap_or("unknown")
            ),
        )
    } else {
        (ValidationStatus::Pending, String::new(), String::new())
    };

    entries
        .iter()
        .zip(1u32..)
        .map(|(entry, index)| {
            let display_id = DisplayId::for_entry(meta.number, index, total);
            EntryRecord {
                display_id,
                original_id: meta.number,
                split_index: display_id.index(),
                split_total,
                title: meta.title.clone(),
                rendered_line: entry.rendered_line().to_string(),
                url: entry.url().to_string(),
                name: entry.name().to_string(),
                author: meta.author.clone(),
                category: categorize(&meta.labels, entry.rendered_line(), options),
                validation_status: validation_status.clone(),
                confidence: confidence.clone(),
                notes: notes.clone(),
                is_approved: approval.approved,
                approval_count: approval.approval_count,
                first_approver: approval.first_approver.clone(),
                first_approved_at: approval.first_approved_at,
            }
        })
        .collect()
}

/// Classify one PR, fetching its diff and (if accepted) its approvals.
#[instrument(skip_all, fields(pr = %meta.number))]
pub async fn classify<F: Forge>(
    forge: &F,
    meta: &PullRequestMeta,
    options: &ClassifyOptions,
) -> Classification {
    if let Some(label) = meta
        .labels
        .iter()
        .find(|l| options.excluded_labels.contains(l))
    {
        return Classification::Rejected(Rejection::new(
            meta,
            RejectionReason::ResourceNotServer,
            format!("labelled {label}"),
        ));
    }

    let diff = match forge.pull_request_diff(meta.number).await {
        Ok(diff) if !diff.trim().is_empty() => diff,
        Ok(_) => {
            return Classification::Rejected(Rejection::new(
                meta,
                RejectionReason::DiffFetchFailed,
                "empty diff",
            ));
        }
        Err(e) => {
            return Classification::Rejected(Rejection::new(
                meta,
                RejectionReason::DiffFetchFailed,
                e.to_string(),
            ));
        }
    };

    let analysis = analyze_diff(&diff, &options.document_file);
    let entries = match screen_entries(meta, analysis, options) {
        Ok(entries) => entries,
        Err(rejection) => return Classification::Rejected(rejection),
    };

    let approval = match forge.approvals(meta.number).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(pr = %meta.number, error = %e, "approval lookup failed, treating as not approved");
            ApprovalSnapshot::unapproved()
        }
    };
    if approval.approved {
        info!(
            pr = %meta.number,
            approver = approval.first_approver.as_deref().unwrap_or_default(),
            approvals = approval.approval_count,
            "PR is pre-approved"
        );
    }

    let records = build_records(meta, &entries, &approval, options);
    debug!(pr = %meta.number, entries = records.len(), "accepted PR");

    Classification::Accepted(AcceptedPr {
        pr: meta.clone(),
        approval,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeForge, diff_adding, meta};
    use curator_shared::PrNumber;

    const COMMUNITY: &str = "add-community-server";

    #[test]
    fn analyze_counts_entries_and_noise() {
        let diff = "diff --git a/README.md b/README.md\n\
--- a/README.md\n\
+++ b/README.md\n\
@@ -1,2 +1,4 @@\n\
 - **[Old](https://old.dev)** - Existing\n\
+- **[New](https://new.dev)** - Added\n\
+\n\
+Some stray prose\n";
        let analysis = analyze_diff(diff, "README.md");
        assert!(analysis.touches_document);
        assert_eq!(analysis.entries.len(), 1);
        assert_eq!(analysis.entries[0].name(), "New");
        assert_eq!(analysis.noise, 1);
    }

    #[test]
    fn document_match_uses_file_headers() {
        let nested = "diff --git a/src/x/README.md b/src/x/README.md\n+++ b/src/x/README.md\n";
        assert!(!analyze_diff(nested, "README.md").touches_document);
        let root = "diff --git a/README.md b/README.md\n";
        assert!(analyze_diff(root, "README.md").touches_document);
    }

    #[test]
    fn categorize_prefers_labels() {
        let opts = ClassifyOptions::default();
        let icon = r#"- <img src="x" alt="X"> **[X](u)** - d"#;
        assert_eq!(categorize(&[COMMUNITY.into()], icon, &opts), Category::Community);
        assert_eq!(
            categorize(&["add-official-server".into()], "- **[X](u)** - d", &opts),
            Category::Official
        );
        assert_eq!(categorize(&[], icon, &opts), Category::Official);
        assert_eq!(
            categorize(&[], "- **[X](u)** - The OFFICIAL client", &opts),
            Category::Official
        );
        assert_eq!(categorize(&[], "- **[X](u)** - d", &opts), Category::Community);
    }

    #[tokio::test]
    async fn blank_alt_single_entry_is_community_with_alt_filled() {
        let pr = meta(101, &[COMMUNITY]);
        let forge = FakeForge::default().with_diff(
            101,
            &diff_adding(&[r#"- <img src="https://acme.dev/i.png" alt=" "> **[Acme](https://acme.dev)** - Acme tools"#]),
        );

        let Classification::Accepted(accepted) =
            classify(&forge, &pr, &ClassifyOptions::default()).await
        else {
            panic!("expected acceptance");
        };
        assert_eq!(accepted.records.len(), 1);
        let record = &accepted.records[0];
        assert_eq!(record.display_id.to_string(), "101");
        assert_eq!(record.category, Category::Community);
        assert!(record.rendered_line.contains(r#"alt="Acme""#));
        assert_eq!(record.validation_status, ValidationStatus::Pending);
    }

    #[tokio::test]
    async fn multi_entry_pr_is_split_with_shared_approval() {
        let pr = meta(200, &[COMMUNITY]);
        let forge = FakeForge::default()
            .with_diff(
                200,
                &diff_adding(&[
                    "- **[One](https://one.dev)** - First",
                    "- **[Two](https://two.dev)** - Second",
                    "- **[Three](https://three.dev)** - Third",
                ]),
            )
            .with_approval(200, "maint");

        let Classification::Accepted(accepted) =
            classify(&forge, &pr, &ClassifyOptions::default()).await
        else {
            panic!("expected acceptance");
        };
        let ids: Vec<String> = accepted
            .records
            .iter()
            .map(|r| r.display_id.to_string())
            .collect();
        assert_eq!(ids, vec!["200-1", "200-2", "200-3"]);
        for record in &accepted.records {
            assert_eq!(record.display_id.pr(), PrNumber(200));
            assert_eq!(record.split_total, 3);
            assert!(record.is_approved);
            assert_eq!(record.first_approver.as_deref(), Some("maint"));
            assert_eq!(record.validation_status, ValidationStatus::Valid);
            assert_eq!(record.confidence, "100%");
            assert_eq!(
                record.notes,
                "Pre-approved PR - skipping manual validation (approved by maint)"
            );
        }
        assert_eq!(forge.calls_matching("approvals"), 1);
    }

    #[tokio::test]
    async fn rejection_reasons() {
        let opts = ClassifyOptions {
            max_entries_per_pr: 2,
            ..ClassifyOptions::default()
        };
        let forge = FakeForge::default()
            .with_diff(2, "diff --git a/docs/guide.md b/docs/guide.md\n+- **[A](https://a)** - a\n")
            .with_diff(3, &diff_adding(&["just prose"]))
            .with_diff(
                4,
                &diff_adding(&[
                    "- **[A](https://a)** - a",
                    "- **[B](https://b)** - b",
                    "- **[C](https://c)** - c",
                ]),
            )
            .with_diff(
                5,
                &diff_adding(&["- **[A](https://a)** - a", "x", "y", "z", "w"]),
            )
            .with_diff(6, "   \n");

        let cases = [
            (meta(1, &["add-community-resource"]), RejectionReason::ResourceNotServer),
            (meta(2, &[]), RejectionReason::NoDocumentChanges),
            (meta(3, &[]), RejectionReason::NoEntriesFound),
            (meta(4, &[]), RejectionReason::ExceedsEntryLimit),
            (meta(5, &[]), RejectionReason::TooMuchNoise),
            (meta(6, &[]), RejectionReason::DiffFetchFailed),
            (meta(7, &[]), RejectionReason::DiffFetchFailed),
        ];
        for (pr, expected) in cases {
            match classify(&forge, &pr, &opts).await {
                Classification::Rejected(r) => assert_eq!(r.reason, expected, "PR {}", pr.number),
                Classification::Accepted(_) => panic!("PR {} should be rejected", pr.number),
            }
        }
        assert_eq!(forge.calls_matching("approvals"), 0);
    }

    #[tokio::test]
    async fn splitting_disabled_rejects_multi_entry() {
        let opts = ClassifyOptions {
            split_multiple: false,
            ..ClassifyOptions::default()
        };
        let forge = FakeForge::default().with_diff(
            9,
            &diff_adding(&["- **[A](https://a)** - a", "- **[B](https://b)** - b"]),
        );
        match classify(&forge, &meta(9, &[]), &opts).await {
            Classification::Rejected(r) => {
                assert_eq!(r.reason, RejectionReason::MultipleEntriesDisabled);
            }
            Classification::Accepted(_) => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn noise_within_allowance_is_accepted() {
        let forge = FakeForge::default().with_diff(
            10,
            &diff_adding(&["- **[A](https://a)** - a", "x", "y", "z"]),
        );
        assert!(matches!(
            classify(&forge, &meta(10, &[]), &ClassifyOptions::default()).await,
            Classification::Accepted(_)
        ));
    }

    #[tokio::test]
    async fn approval_failure_means_unapproved() {
        let forge = FakeForge::default()
            .with_diff(11, &diff_adding(&["- **[A](https://a)** - a"]))
            .with_failing_approvals(11);
        let Classification::Accepted(accepted) =
            classify(&forge, &meta(11, &[]), &ClassifyOptions::default()).await
        else {
            panic!("expected acceptance");
        };
        assert!(!accepted.approval.approved);
        assert!(!accepted.records[0].is_approved);
    }
}
