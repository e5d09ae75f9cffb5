//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use rivalmap_core::{
    ProgressReporter, RunRequest, RunSummary, StageOutcome, run_crawl_stage, run_pipeline,
    run_synthesize_stage, run_trim_stage,
};
use rivalmap_shared::{AppConfig, RunConfig, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// RivalMap — domain evidence pipeline.
#[derive(Parser)]
#[command(
    name = "rivalmap",
    version,
    about = "Crawl a domain, rank its text by topic, and assemble source-diversified evidence packs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline: crawl, score, trim, synthesize, export.
    Run(RunArgs),

    /// Crawl and score pages only, leaving the later stages for separate
    /// invocations against the same run directory.
    Crawl(RunArgs),

    /// Trim previously scored paragraphs into top-K snippets per topic.
    Score(RunArgs),

    /// Build evidence packs and the export bundle from trimmed snippets.
    Synthesize(RunArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags shared by the pipeline commands. Unset flags fall back to the
/// config file, then to built-in defaults.
#[derive(Args)]
pub(crate) struct RunArgs {
    /// Domain or root URL to crawl (a bare domain gets https://).
    seed: String,

    /// Scrape size: small (50), medium (100), large (300), or a page count.
    #[arg(long)]
    size: Option<String>,

    /// Per-host pacing: fast (300), normal (600), slow (1200), or milliseconds.
    #[arg(long)]
    speed: Option<String>,

    /// Snippets kept per topic after trimming.
    #[arg(long)]
    top_k: Option<usize>,

    /// Per-pack cap on snippets sharing one source domain.
    #[arg(long)]
    max_per_domain: Option<usize>,

    /// Fetch worker pool size.
    #[arg(long)]
    workers: Option<usize>,

    /// Maximum link distance from the seed.
    #[arg(long)]
    depth: Option<u32>,

    /// Fetch mode: static, rendered, or auto.
    #[arg(long)]
    mode: Option<String>,

    /// Root directory run output is written under.
    #[arg(long)]
    out: Option<String>,
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
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(&args).await,
        Command::Crawl(args) => cmd_crawl(&args).await,
        Command::Score(args) => cmd_score(&args).await,
        Command::Synthesize(args) => cmd_synthesize(&args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

async fn cmd_run(args: &RunArgs) -> Result<()> {
    let request = build_request(args)?;
    info!(seed = %request.seed, budget = request.config.page_budget, "starting run");

    let reporter = CliProgress::new();
    let cancel = cancel_on_ctrl_c();
    let summary = run_pipeline(&request, None, &reporter, cancel).await?;
    reporter.clear();

    println!();
    if summary.cancelled {
        println!("  Run cancelled — partial output kept.");
    } else {
        println!("  Run complete!");
    }
    println!("  Run ID:   {}", summary.run_id);
    println!("  Domain:   {}", summary.domain);
    println!(
        "  Pages:    {} fetched, {} failed",
        summary.pages_fetched, summary.failed_urls
    );
    println!("  Scored:   {}", summary.scored_paragraphs);
    println!("  Snippets: {}", summary.snippets);
    println!("  Packs:    {}", summary.packs);
    println!("  Output:   {}", summary.run_dir.display());
    println!("  Time:     {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_crawl(args: &RunArgs) -> Result<()> {
    let request = build_request(args)?;
    info!(seed = %request.seed, budget = request.config.page_budget, "starting crawl");

    let reporter = CliProgress::new();
    let cancel = cancel_on_ctrl_c();
    let outcome = run_crawl_stage(&request, &reporter, cancel).await?;
    reporter.clear();

    print_stage(
        if outcome.cancelled {
            "Crawl cancelled — partial output kept."
        } else {
            "Crawl complete!"
        },
        "Pages",
        &outcome,
    );
    Ok(())
}

async fn cmd_score(args: &RunArgs) -> Result<()> {
    let request = build_request(args)?;
    let reporter = CliProgress::new();
    let outcome = run_trim_stage(&request, &reporter)?;
    reporter.clear();

    print_stage("Scoring complete!", "Snippets", &outcome);
    Ok(())
}

async fn cmd_synthesize(args: &RunArgs) -> Result<()> {
    let request = build_request(args)?;
    let reporter = CliProgress::new();
    let outcome = run_synthesize_stage(&request, None, &reporter).await?;
    reporter.clear();

    print_stage("Synthesis complete!", "Packs", &outcome);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_stage(headline: &str, label: &str, outcome: &StageOutcome) {
    println!();
    println!("  {headline}");
    println!("  {label}:  {}", outcome.records);
    println!("  Output: {}", outcome.run_dir.display());
    println!();
}

// ---------------------------------------------------------------------------
// Request assembly
// ---------------------------------------------------------------------------

/// Merge the config file with CLI overrides into a run request.
fn build_request(args: &RunArgs) -> Result<RunRequest> {
    let config = load_config()?;
    let mut run = RunConfig::from(&config);

    if let Some(size) = &args.size {
        run.page_budget = parse_size(size)?;
    }
    if let Some(speed) = &args.speed {
        run.request_delay_ms = parse_speed(speed)?;
    }
    if let Some(top_k) = args.top_k {
        run.top_k = top_k;
    }
    if let Some(cap) = args.max_per_domain {
        run.max_per_domain = cap;
    }
    if let Some(workers) = args.workers {
        run.workers = workers;
    }
    if let Some(depth) = args.depth {
        run.max_depth = depth;
    }
    if let Some(mode) = &args.mode {
        run.fetch_mode = mode.parse()?;
    }
    if let Some(out) = &args.out {
        run.out_root = out.clone();
    }

    Ok(RunRequest {
        seed: args.seed.clone(),
        config: run,
        topics: config.topics,
    })
}

/// Scrape-size presets, or a bare page count.
fn parse_size(raw: &str) -> Result<usize> {
    match raw {
        "small" => Ok(50),
        "medium" => Ok(100),
        "large" => Ok(300),
        other => other
            .parse()
            .map_err(|_| eyre!("size must be small, medium, large, or a number (got {other:?})")),
    }
}

/// Pacing presets, or bare milliseconds.
fn parse_speed(raw: &str) -> Result<u64> {
    match raw {
        "fast" => Ok(300),
        "normal" => Ok(600),
        "slow" => Ok(1200),
        other => other
            .parse()
            .map_err(|_| eyre!("speed must be fast, normal, slow, or milliseconds (got {other:?})")),
    }
}

/// Cancellation flag raised on the first Ctrl-C. In-flight fetches drain;
/// everything written so far stays on disk.
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested, draining in-flight fetches");
            flag.store(true, Ordering::SeqCst);
        }
    });
    cancel
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
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_fetched(&self, url: &str, fetched: usize, budget: usize) {
        self.spinner
            .set_message(format!("Fetching [{fetched}/{budget}] {url}"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
