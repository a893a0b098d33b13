//! CLI command definitions, routing, and tracing setup.

use std::fs::File;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{ArgGroup, Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use curator_core::closure::{AutoConfirm, BatchConfirm, CloseOutcome};
use curator_core::describe::ClosureTarget;
use curator_core::pipeline::{
    CloseStageOptions, IdentifyOptions, MergeOptions, ProgressReporter, identify,
    resolve_targets, run_close, run_merge,
};
use curator_core::RunContext;
use curator_forge::GitHubClient;
use curator_shared::{
    AppConfig, Category, init_config, load_config, load_config_from, require_token,
    resolve_token,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Curator: triage pull requests that add entries to a curated list.
#[derive(Parser)]
#[command(
    name = "curator",
    version,
    about = "Identify, merge, and close list-addition pull requests.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also write debug-level logs to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Config file to use instead of ~/.curator/curator.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Category selector on the command line.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum CategoryArg {
    Official,
    Community,
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Official => Category::Official,
            CategoryArg::Community => Category::Community,
        }
    }
}

/// Category filter for `identify`.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum CategoryFilter {
    Official,
    Community,
    All,
}

impl CategoryFilter {
    fn category(self) -> Option<Category> {
        match self {
            Self::Official => Some(Category::Official),
            Self::Community => Some(Category::Community),
            Self::All => None,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Find open PRs that add list entries and write batch files for review.
    Identify(IdentifyArgs),

    /// Merge validated entries into the document.
    Merge(MergeArgs),

    /// Comment on and close the PRs superseded by a combined PR.
    Close(CloseArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub(crate) struct IdentifyArgs {
    /// PRs per listing page (1-100).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    per_page: Option<u32>,

    /// First listing page to fetch.
    #[arg(long)]
    start_page: Option<u32>,

    /// Maximum number of listing pages; 0 fetches until an empty page.
    #[arg(long)]
    max_pages: Option<u32>,

    /// Records per batch file.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Reject PRs adding more than one entry instead of splitting them.
    #[arg(long)]
    no_split: bool,

    /// Upper bound on entries accepted from one PR.
    #[arg(long)]
    max_entries_per_pr: Option<usize>,

    /// Only write records of this category.
    #[arg(long, default_value = "all")]
    category: CategoryFilter,

    /// File name prefix of batch files.
    #[arg(long)]
    output_prefix: Option<String>,

    /// Directory for batch files and the rejection ledger.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Do not write the rejection ledger.
    #[arg(long)]
    no_rejected_ledger: bool,
}

#[derive(Args)]
pub(crate) struct MergeArgs {
    /// Section to merge into.
    #[arg(long)]
    category: CategoryArg,

    /// Document to update (defaults to the configured path).
    #[arg(long)]
    document: Option<PathBuf>,

    /// Directory of validated record files.
    #[arg(long)]
    validation_dir: Option<PathBuf>,

    /// Compute the merge without writing the document.
    #[arg(long)]
    dry_run: bool,

    /// Also write a description for the combined PR.
    #[arg(long)]
    generate_description: bool,
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .multiple(true)
        .args(["combined_url", "description_file"]),
))]
pub(crate) struct CloseArgs {
    /// URL of the combined PR; its description lists the PRs to close.
    #[arg(long)]
    combined_url: Option<String>,

    /// Read the description from this file instead of the combined PR.
    #[arg(long)]
    description_file: Option<PathBuf>,

    /// PRs per confirmation batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Check PR status without commenting or closing.
    #[arg(long)]
    dry_run: bool,

    /// Skip all confirmation prompts.
    #[arg(long)]
    yes: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    let filter = match cli.verbose {
        0 => "curator=info",
        1 => "curator=debug",
        _ => "curator=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    let console = match cli.log_format {
        LogFormat::Text => fmt::layer().with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    }
    .with_filter(env_filter);

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| eyre!("cannot create log file '{}': {e}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new("curator=debug")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();
    Ok(())
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Identify(args) => cmd_identify(config_path, args).await,
        Command::Merge(args) => cmd_merge(config_path, args),
        Command::Close(args) => cmd_close(config_path, args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn client(config: &AppConfig, token: Option<&str>) -> Result<GitHubClient> {
    Ok(GitHubClient::new(
        &config.repository,
        token,
        config.pacing.rate_limit_cooldown(),
    )?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_identify(config_path: Option<&Path>, args: IdentifyArgs) -> Result<()> {
    let config = load(config_path)?;
    let token = resolve_token(&config);
    if token.is_none() {
        info!(
            env = %config.repository.token_env,
            "no API token set, using anonymous requests"
        );
    }
    let forge = client(&config, token.as_deref())?;

    let mut options = IdentifyOptions::from_config(&config);
    if let Some(per_page) = args.per_page {
        options.per_page = per_page;
    }
    if let Some(start_page) = args.start_page {
        options.start_page = start_page;
    }
    if let Some(max_pages) = args.max_pages {
        options.max_pages = (max_pages > 0).then_some(max_pages);
    }
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }
    if let Some(max_entries) = args.max_entries_per_pr {
        options.classify.max_entries_per_pr = max_entries;
    }
    if let Some(prefix) = args.output_prefix {
        options.output_prefix = prefix;
    }
    if let Some(out_dir) = args.out_dir {
        options.out_dir = out_dir;
    }
    if args.no_split {
        options.classify.split_multiple = false;
    }
    if args.no_rejected_ledger {
        options.write_rejections = false;
    }
    options.category = args.category.category();

    info!(
        per_page = options.per_page,
        start_page = options.start_page,
        max_pages = ?options.max_pages,
        "identifying list-addition PRs"
    );

    let mut ctx = RunContext::new();
    let reporter = CliProgress::new();
    let summary = identify(&forge, &options, &mut ctx, &reporter).await?;

    println!();
    println!("  PRs analyzed:   {}", summary.analyzed);
    println!(
        "  Accepted:       {} ({} pre-approved)",
        summary.accepted, summary.pre_approved
    );
    println!("  Rejected:       {}", summary.rejected);
    for (reason, count) in &summary.reasons {
        println!("    {reason}: {count}");
    }
    println!(
        "  Records:        {} (official {}, community {})",
        summary.records, summary.official, summary.community
    );
    if summary.filtered_out > 0 {
        println!("  Filtered out:   {}", summary.filtered_out);
    }
    for file in &summary.batch_files {
        println!("  Batch file:     {}", file.display());
    }
    if let Some(ledger) = &summary.ledger {
        println!("  Rejections:     {}", ledger.display());
    }
    println!("  Time:           {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_merge(config_path: Option<&Path>, args: MergeArgs) -> Result<()> {
    let config = load(config_path)?;
    let category = Category::from(args.category);

    let mut options = MergeOptions::from_config(&config, category);
    if let Some(document) = args.document {
        options.document_path = document;
    }
    if let Some(dir) = args.validation_dir {
        options.validation_dir = dir;
    }
    options.dry_run = args.dry_run;
    options.generate_description = args.generate_description;

    info!(
        category = %category,
        document = %options.document_path.display(),
        dry_run = options.dry_run,
        "merging validated entries"
    );

    let ctx = RunContext::new();
    let reporter = CliProgress::new();
    let report = run_merge(&options, &ctx, &reporter)?;
    let outcome = &report.outcome;

    println!();
    println!("  {} merge", options.section.display_name);
    println!("  Records read:     {}", report.records_read);
    println!("  Eligible:         {}", report.eligible);
    println!("  Added:            {}", outcome.added.len());
    for record in &outcome.added {
        println!("    + {} (PR #{}) by {}", record.name, record.display_id, record.author);
    }
    println!("  Duplicates:       {}", outcome.duplicates.len());
    println!("  Icon exclusions:  {}", outcome.excluded_icons.len());
    println!("  Section size:     {} -> {}", outcome.existing, outcome.total);
    if let Some(path) = &report.description {
        println!("  Description:      {}", path.display());
    }
    if let Some(path) = &report.log {
        println!("  Merge log:        {}", path.display());
    }
    if options.dry_run {
        println!("  Dry run: document not modified");
    } else if !outcome.changed {
        println!("  Document already up to date");
    }
    println!();

    Ok(())
}

async fn cmd_close(config_path: Option<&Path>, args: CloseArgs) -> Result<()> {
    let config = load(config_path)?;
    let token = if args.dry_run {
        resolve_token(&config)
    } else {
        Some(require_token(&config)?)
    };
    let forge = client(&config, token.as_deref())?;

    let mut options = CloseStageOptions::from_config(&config);
    options.combined_url = args.combined_url;
    options.description_file = args.description_file;
    options.dry_run = args.dry_run;
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }

    let targets = resolve_targets(&forge, &options).await?;

    println!();
    println!("  Original PRs referenced: {}", targets.len());
    for target in &targets {
        println!("    PR #{}: {}", target.pr, target.label());
    }
    println!();

    if !options.dry_run
        && !args.yes
        && !ask(&format!("Comment on and close {} PRs?", targets.len()))
    {
        println!("Aborted.");
        return Ok(());
    }

    let ctx = RunContext::new();
    let reporter = CliProgress::new();
    let report = if args.yes {
        run_close(&forge, &targets, &options, &AutoConfirm, &ctx, &reporter).await?
    } else {
        let confirm = PromptConfirm {
            bar: reporter.spinner.clone(),
        };
        run_close(&forge, &targets, &options, &confirm, &ctx, &reporter).await?
    };

    println!();
    for result in &report.results {
        let marker = match result.outcome {
            CloseOutcome::Closed | CloseOutcome::DryRun => "ok",
            CloseOutcome::Skipped { .. } => "--",
            _ => "!!",
        };
        println!("  [{marker}] PR #{}: {}", result.target.pr, result.outcome);
    }
    println!();
    println!("  Successful: {}", report.summary.successful);
    println!("  Skipped:    {}", report.summary.skipped);
    println!("  Failed:     {}", report.summary.failed);
    println!("  Log:        {}", report.log.display());
    if options.dry_run {
        println!("  Dry run: no comments posted, no PRs closed");
    }
    println!();

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// Ask a yes/no question on stdin. Anything but `y`/`yes` is a no.
fn ask(question: &str) -> bool {
    print!("{question} (y/n): ");
    let _ = std::io::stdout().flush();

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Per-batch confirmation on stdin, with the spinner paused.
struct PromptConfirm {
    bar: ProgressBar,
}

impl BatchConfirm for PromptConfirm {
    fn confirm(&self, batch: usize, total: usize, targets: &[ClosureTarget]) -> bool {
        self.bar.suspend(|| {
            println!();
            println!("  Batch {batch}/{total}:");
            for target in targets {
                println!("    PR #{}: {}", target.pr, target.label());
            }
            ask(&format!("Process this batch of {} PRs?", targets.len()))
        })
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn step(&self, current: usize, total: usize, detail: &str) {
        self.spinner.set_message(format!("[{current}/{total}] {detail}"));
    }

    fn done(&self) {
        self.spinner.finish_and_clear();
    }
}
