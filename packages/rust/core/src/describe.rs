//! Combined-submission descriptions and the parser that reads them back.
//!
//! [`describe`] renders one bullet per merged entry and [`parse_description`]
//! recovers the originating PRs from those bullets. Both sides share the
//! bullet format defined here, so changing one means changing the other.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use curator_markdown::{Document, bullet_url_key};
use curator_records::EntryRecord;
use curator_shared::{Category, PrNumber, RepositoryConfig, SectionConfig};

use crate::merge::{eligible_records, split_context};

pub const NO_ENTRIES: &str = "No entries to add.";
pub const ALL_PRESENT: &str = "No new entries to add (all entries already exist in the document).";

const ENTRIES_HEADING: &str = "## Added Entries";

/// Matches bullets produced by [`render_bullet`].
static DESCRIPTION_BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*-\s+\*\*\[(?P<name>[^\]]+)\]\((?P<url>[^)]+)\)\*\*\s+\(\[PR #(?P<pr>\d+)(?:-\d+)?\]\([^)]*\)\)",
    )
    .expect("valid regex")
});

/// Render the description of a combined submission for `category`.
///
/// With `existing_document`, records whose URL already appears in the live
/// section are left out. A missing section only warns.
pub fn describe(
    records: &[EntryRecord],
    category: Category,
    section: &SectionConfig,
    repo: &RepositoryConfig,
    existing_document: Option<&str>,
) -> String {
    let (eligible, _) = eligible_records(records, category);
    if eligible.is_empty() {
        return NO_ENTRIES.to_string();
    }

    let present = existing_document
        .map(|text| section_urls(text, section))
        .unwrap_or_default();

    let mut seen: HashSet<String> = HashSet::new();
    let mut entries: Vec<&EntryRecord> = eligible
        .into_iter()
        .filter(|r| {
            let key = bullet_url_key(&r.rendered_line);
            if present.contains(&key) {
                debug!(id = %r.display_id, "already in document, left out of description");
                return false;
            }
            seen.insert(key)
        })
        .collect();

    if entries.is_empty() {
        return ALL_PRESENT.to_string();
    }

    entries.sort_by_cached_key(|r| (r.original_id, r.name.to_lowercase()));

    let count = entries.len();
    let mut text = format!(
        "# {}\n\n{}\n\n{ENTRIES_HEADING}\n\n",
        fill_template(&section.title_template, count),
        fill_template(&section.summary_template, count),
    );
    for record in entries {
        text.push_str(&render_bullet(record, section, repo));
        text.push('\n');
    }
    text
}

fn section_urls(document: &str, section: &SectionConfig) -> HashSet<String> {
    let doc = Document::parse(document);
    match doc.section(&section.header) {
        Ok(bounds) => doc
            .bullets(&bounds)
            .into_iter()
            .map(bullet_url_key)
            .collect(),
        Err(e) => {
            warn!(error = %e, "section not found, describing all entries");
            HashSet::new()
        }
    }
}

fn render_bullet(record: &EntryRecord, section: &SectionConfig, repo: &RepositoryConfig) -> String {
    let pr = record.original_id;
    let split = split_context(record, &section.item_label)
        .map(|s| format!(" ({s})"))
        .unwrap_or_default();
    format!(
        "- **[{}]({})** ([PR #{pr}]({})){split} by @{}",
        record.name,
        record.url,
        repo.pull_url(pr),
        record.author
    )
}

/// Substitute `{count}` and the plural suffix `{s}`.
pub fn fill_template(template: &str, count: usize) -> String {
    template
        .replace("{count}", &count.to_string())
        .replace("{s}", if count == 1 { "" } else { "s" })
}

/// An original PR referenced by a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureTarget {
    pub pr: PrNumber,
    /// Entry names contributed by this PR, in description order.
    pub names: Vec<String>,
}

impl ClosureTarget {
    pub fn label(&self) -> String {
        self.names.join(", ")
    }
}

/// Recover the original PRs from a description, one target per PR.
///
/// Split entries of the same PR fold into one target.
pub fn parse_description(text: &str) -> Vec<ClosureTarget> {
    let mut targets: Vec<ClosureTarget> = Vec::new();

    for line in text.lines() {
        let Some(caps) = DESCRIPTION_BULLET_RE.captures(line) else {
            continue;
        };
        let Ok(pr) = caps["pr"].parse::<u64>().map(PrNumber) else {
            continue;
        };
        let name = caps["name"].to_string();

        match targets.iter_mut().find(|t| t.pr == pr) {
            Some(target) => target.names.push(name),
            None => targets.push(ClosureTarget {
                pr,
                names: vec![name],
            }),
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, valid};
    use curator_shared::AppConfig;

    fn setup() -> (SectionConfig, RepositoryConfig) {
        let config = AppConfig::default();
        (config.sections.community, config.repository)
    }

    fn split(id: &str, name: &str, total: u32) -> EntryRecord {
        let mut r = valid(record(id, name, Category::Community));
        r.split_total = total;
        r
    }

    #[test]
    fn renders_sorted_by_pr_then_name() {
        let (section, repo) = setup();
        let records = vec![
            split("300-2", "zeta", 2),
            valid(record("120", "Mono", Category::Community)),
            split("300-1", "Alpha", 2),
        ];
        let text = describe(&records, Category::Community, &section, &repo, None);

        let expected = "# Add 3 Community MCP Servers\n\n\
This PR adds 3 new MCP servers to the README, sourced from community pull requests.\n\n\
## Added Entries\n\n\
- **[Mono](https://example.com/mono)** ([PR #120](https://github.com/modelcontextprotocol/servers/pull/120)) by @octo\n\
- **[Alpha](https://example.com/alpha)** ([PR #300](https://github.com/modelcontextprotocol/servers/pull/300)) (server 1 of 2) by @octo\n\
- **[zeta](https://example.com/zeta)** ([PR #300](https://github.com/modelcontextprotocol/servers/pull/300)) (server 2 of 2) by @octo\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn singular_title() {
        let (section, repo) = setup();
        let text = describe(
            &[valid(record("5", "Solo", Category::Community))],
            Category::Community,
            &section,
            &repo,
            None,
        );
        assert!(text.starts_with("# Add 1 Community MCP Server\n\nThis PR adds 1 new MCP server to"));
    }

    #[test]
    fn empty_inputs() {
        let (section, repo) = setup();
        let pending = record("5", "Solo", Category::Community);
        assert_eq!(describe(&[pending], Category::Community, &section, &repo, None), NO_ENTRIES);

        let doc = "### 🌎 Community Servers\n\n- **[Solo](https://example.com/solo)** - Solo server\n";
        let present = valid(record("5", "Solo", Category::Community));
        assert_eq!(
            describe(&[present], Category::Community, &section, &repo, Some(doc)),
            ALL_PRESENT
        );
    }

    #[test]
    fn missing_section_includes_everything() {
        let (section, repo) = setup();
        let records = vec![valid(record("5", "Solo", Category::Community))];
        let text = describe(&records, Category::Community, &section, &repo, Some("# Empty\n"));
        assert!(text.contains("[Solo]"));
    }

    #[test]
    fn duplicate_urls_described_once() {
        let (section, repo) = setup();
        let records = vec![
            valid(record("5", "Solo", Category::Community)),
            valid(record("6", "Solo", Category::Community)),
        ];
        let text = describe(&records, Category::Community, &section, &repo, None);
        assert!(text.starts_with("# Add 1 Community"));
        assert!(text.contains("PR #5"));
        assert!(!text.contains("PR #6"));
    }

    #[test]
    fn parser_reads_generated_bullets() {
        let (section, repo) = setup();
        let records = vec![
            split("300-1", "Alpha", 2),
            split("300-2", "Beta", 2),
            valid(record("120", "Mono", Category::Community)),
        ];
        let text = describe(&records, Category::Community, &section, &repo, None);
        let targets = parse_description(&text);

        assert_eq!(
            targets,
            vec![
                ClosureTarget {
                    pr: PrNumber(120),
                    names: vec!["Mono".into()],
                },
                ClosureTarget {
                    pr: PrNumber(300),
                    names: vec!["Alpha".into(), "Beta".into()],
                },
            ]
        );
        assert_eq!(targets[1].label(), "Alpha, Beta");
    }

    #[test]
    fn parser_accepts_suffixed_ids_and_ignores_noise() {
        let text = "# Title\n\nSome text.\n\n\
- **[A](https://a)** ([PR #12-2](https://github.com/o/r/pull/12)) by @x\n\
- not a bullet we wrote\n\
* **[B](https://b)** ([PR #13](https://github.com/o/r/pull/13)) by @y\n";
        let targets = parse_description(text);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].pr, PrNumber(12));
    }
}
