//! Application configuration for Curator.
//!
//! User config lives at `~/.curator/curator.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CuratorError, Result};
use crate::types::{Category, PrNumber};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "curator.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".curator";

// ---------------------------------------------------------------------------
// Config structs (matching curator.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Repository hosting the curated list.
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// The canonical document.
    #[serde(default)]
    pub document: DocumentConfig,

    /// Per-category section settings.
    #[serde(default)]
    pub sections: SectionsConfig,

    /// Identify stage defaults.
    #[serde(default)]
    pub identify: IdentifyConfig,

    /// Output locations.
    #[serde(default)]
    pub output: OutputConfig,

    /// Delays between remote calls.
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Close stage defaults.
    #[serde(default)]
    pub close: CloseConfig,
}

/// `[repository]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository owner (user or organization).
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Repository name.
    #[serde(default = "default_repo_name")]
    pub name: String,

    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Web base URL used for PR links in generated text.
    #[serde(default = "default_web_base")]
    pub web_base: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            name: default_repo_name(),
            api_base: default_api_base(),
            web_base: default_web_base(),
            token_env: default_token_env(),
        }
    }
}

impl RepositoryConfig {
    /// Browser link to a pull request.
    pub fn pull_url(&self, pr: PrNumber) -> String {
        format!(
            "{}/{}/{}/pull/{pr}",
            self.web_base.trim_end_matches('/'),
            self.owner,
            self.name
        )
    }
}

fn default_owner() -> String {
    "modelcontextprotocol".into()
}
fn default_repo_name() -> String {
    "servers".into()
}
fn default_api_base() -> String {
    "https://api.github.com".into()
}
fn default_web_base() -> String {
    "https://github.com".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}

/// `[document]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Local path of the canonical document to merge into.
    #[serde(default = "default_document_path")]
    pub path: String,

    /// Repository path of the document as it appears in PR diffs.
    #[serde(default = "default_document_file")]
    pub file_name: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            path: default_document_path(),
            file_name: default_document_file(),
        }
    }
}

fn default_document_path() -> String {
    "README.md".into()
}
fn default_document_file() -> String {
    "README.md".into()
}

/// `[sections]` table, one entry per category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionsConfig {
    #[serde(default = "SectionConfig::official")]
    pub official: SectionConfig,

    #[serde(default = "SectionConfig::community")]
    pub community: SectionConfig,
}

impl Default for SectionsConfig {
    fn default() -> Self {
        Self {
            official: SectionConfig::official(),
            community: SectionConfig::community(),
        }
    }
}

impl SectionsConfig {
    pub fn get(&self, category: Category) -> &SectionConfig {
        match category {
            Category::Official => &self.official,
            Category::Community => &self.community,
        }
    }
}

/// Settings for one document section.
///
/// Templates accept `{count}` and `{s}` (plural suffix) placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionConfig {
    /// Heading line that opens the section, including its `#` marks.
    pub header: String,
    /// Human-readable name used in logs.
    pub display_name: String,
    /// Title of the generated description.
    pub title_template: String,
    /// Opening sentence of the generated description.
    pub summary_template: String,
    /// Word used in split context, e.g. "server 2 of 3".
    #[serde(default = "default_item_label")]
    pub item_label: String,
}

impl SectionConfig {
    fn official() -> Self {
        Self {
            header: "### 🎖️ Official Integrations".into(),
            display_name: "Official Servers".into(),
            title_template: "Add {count} Official MCP Integration{s}".into(),
            summary_template:
                "This PR adds {count} new MCP integration{s} to the README, sourced from official integrations."
                    .into(),
            item_label: default_item_label(),
        }
    }

    fn community() -> Self {
        Self {
            header: "### 🌎 Community Servers".into(),
            display_name: "Community Servers".into(),
            title_template: "Add {count} Community MCP Server{s}".into(),
            summary_template:
                "This PR adds {count} new MCP server{s} to the README, sourced from community pull requests."
                    .into(),
            item_label: default_item_label(),
        }
    }
}

fn default_item_label() -> String {
    "server".into()
}

/// `[identify]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyConfig {
    /// PRs requested per listing page (1-100).
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// First listing page to fetch.
    #[serde(default = "default_start_page")]
    pub start_page: u32,

    /// Maximum number of listing pages to fetch; 0 fetches until an empty page.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Records per batch file.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Upper bound on entries accepted from one PR.
    #[serde(default = "default_max_entries")]
    pub max_entries_per_pr: usize,

    /// Split multi-entry PRs into one record per entry.
    #[serde(default = "default_true")]
    pub split_multiple: bool,

    /// Non-entry added lines tolerated on top of one per entry.
    #[serde(default = "default_noise_allowance")]
    pub noise_allowance: usize,

    /// Labels marking a PR as some other kind of contribution.
    #[serde(default = "default_excluded_labels")]
    pub excluded_labels: Vec<String>,

    /// Label forcing the official category.
    #[serde(default = "default_official_label")]
    pub official_label: String,

    /// Label forcing the community category.
    #[serde(default = "default_community_label")]
    pub community_label: String,

    /// File name prefix of batch record files.
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,

    /// Write the rejection ledger.
    #[serde(default = "default_true")]
    pub write_rejections: bool,
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            start_page: default_start_page(),
            max_pages: default_max_pages(),
            batch_size: default_batch_size(),
            max_entries_per_pr: default_max_entries(),
            split_multiple: true,
            noise_allowance: default_noise_allowance(),
            excluded_labels: default_excluded_labels(),
            official_label: default_official_label(),
            community_label: default_community_label(),
            output_prefix: default_output_prefix(),
            write_rejections: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_per_page() -> u32 {
    20
}
fn default_start_page() -> u32 {
    1
}
fn default_max_pages() -> u32 {
    20
}
fn default_batch_size() -> usize {
    10
}
fn default_max_entries() -> usize {
    10
}
fn default_noise_allowance() -> usize {
    2
}
fn default_excluded_labels() -> Vec<String> {
    vec!["add-community-resource".into()]
}
fn default_official_label() -> String {
    "add-official-server".into()
}
fn default_community_label() -> String {
    "add-community-server".into()
}
fn default_output_prefix() -> String {
    "server_addition_prs".into()
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for batch files, ledgers, and logs.
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Directory holding externally validated record files.
    #[serde(default = "default_validation_dir")]
    pub validation_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            validation_dir: default_validation_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_validation_dir() -> String {
    "output/validation_results".into()
}

/// `[pacing]` section. All delays are skipped in dry-run mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Between PR listing pages.
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,

    /// Between analyzed PRs.
    #[serde(default = "default_pr_delay")]
    pub pr_delay_ms: u64,

    /// Between commenting on and closing the same PR.
    #[serde(default = "default_comment_close_delay")]
    pub comment_close_delay_ms: u64,

    /// Between closing consecutive PRs.
    #[serde(default = "default_close_delay")]
    pub close_delay_ms: u64,

    /// Between closure batches.
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,

    /// Cool-down before the single retry of a rate-limited request.
    #[serde(default = "default_cooldown")]
    pub rate_limit_cooldown_secs: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            page_delay_ms: default_page_delay(),
            pr_delay_ms: default_pr_delay(),
            comment_close_delay_ms: default_comment_close_delay(),
            close_delay_ms: default_close_delay(),
            batch_delay_ms: default_batch_delay(),
            rate_limit_cooldown_secs: default_cooldown(),
        }
    }
}

impl PacingConfig {
    /// Pacing with every delay set to zero.
    pub fn none() -> Self {
        Self {
            page_delay_ms: 0,
            pr_delay_ms: 0,
            comment_close_delay_ms: 0,
            close_delay_ms: 0,
            batch_delay_ms: 0,
            rate_limit_cooldown_secs: 0,
        }
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }
}

fn default_page_delay() -> u64 {
    500
}
fn default_pr_delay() -> u64 {
    200
}
fn default_comment_close_delay() -> u64 {
    1000
}
fn default_close_delay() -> u64 {
    2000
}
fn default_batch_delay() -> u64 {
    5000
}
fn default_cooldown() -> u64 {
    60
}

/// `[close]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseConfig {
    /// PRs per confirmation batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Comment posted on each superseded PR. `{combined_url}` is substituted.
    #[serde(default = "default_comment_template")]
    pub comment_template: String,
}

impl Default for CloseConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            comment_template: default_comment_template(),
        }
    }
}

fn default_comment_template() -> String {
    "Thanks for your contribution to the servers list. This has been merged in this combined PR: {combined_url}\n\n\
     This is a new process we're trying out, so if you see any issues feel free to re-open the PR and tag me."
        .into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.curator/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CuratorError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.curator/curator.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CuratorError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CuratorError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CuratorError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CuratorError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CuratorError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API token from the configured env var, if set.
pub fn resolve_token(config: &AppConfig) -> Option<String> {
    std::env::var(&config.repository.token_env)
        .ok()
        .filter(|t| !t.trim().is_empty())
}

/// Like [`resolve_token`], but an absent token is an error.
///
/// Reads work anonymously; commenting and closing do not.
pub fn require_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.repository.token_env;
    resolve_token(config).ok_or_else(|| {
        CuratorError::config(format!(
            "API token not found. Set the {var_name} environment variable."
        ))
    })
}
