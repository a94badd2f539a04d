//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use artemis_core::{
    CouncilEvaluator, DrainController, DrainProgress, DrainReport, EntryOutcome, LogNotifier,
    Watchdog,
};
use artemis_crawler::{
    Advisor, CouncilAdvisor, DisabledAdvisor, Harvester, Loom, PriorityRules, RobotsCache,
    build_client,
};
use artemis_shared::{
    AppConfig, DrainConfig, FrontierStatus, HarvestConfig, LoomConfig, WatchdogConfig,
    expand_home, init_config, load_config,
};
use artemis_storage::{FrontierStore, HarvestLog, Storage};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Artemis: grow a prioritized web frontier and harvest it.
#[derive(Parser)]
#[command(
    name = "artemis",
    version,
    about = "Expand seeds into a persistent frontier, harvest it recursively, and route around dead ends.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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
    /// Expand a seed page into scored frontier entries.
    Sow {
        /// Seed URL (http or https).
        url: String,
    },

    /// Recursively harvest one URL and print the extracted pages.
    Harvest {
        /// Start URL.
        url: String,

        /// Store the harvested pages in the harvest log.
        #[arg(long)]
        ingest: bool,

        /// Skip the advisory collaborator.
        #[arg(long)]
        no_enrich: bool,
    },

    /// Claim frontier entries and run them through harvest and evaluation.
    Drain {
        /// Entries claimed per cycle (overrides config).
        #[arg(short, long)]
        limit: Option<usize>,

        /// Keep draining, polling when the frontier is empty.
        #[arg(long)]
        watch: bool,

        /// Stop the whole operation after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// List frontier entries.
    Frontier {
        /// Only entries with this status (pending, queued, scanning,
        /// archived, rejected, error, dead-end).
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum rows to print.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
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
        0 => "artemis=info",
        1 => "artemis=debug",
        _ => "artemis=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
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
        Command::Sow { url } => cmd_sow(&url).await,
        Command::Harvest {
            url,
            ingest,
            no_enrich,
        } => cmd_harvest(&url, ingest, no_enrich).await,
        Command::Drain {
            limit,
            watch,
            timeout_secs,
        } => cmd_drain(limit, watch, timeout_secs).await,
        Command::Frontier { status, limit } => cmd_frontier(status.as_deref(), limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn database_path(config: &AppConfig) -> PathBuf {
    expand_home(&config.storage.database_path)
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = database_path(config);
    info!(path = %path.display(), "opening database");
    Ok(Arc::new(Storage::open(&path).await?))
}

fn build_advisor(config: &AppConfig, enrich: bool) -> Result<Arc<dyn Advisor>> {
    if enrich && config.council.enabled {
        Ok(Arc::new(CouncilAdvisor::from_config(&config.council)?))
    } else {
        Ok(Arc::new(DisabledAdvisor))
    }
}

/// One robots cache per process, shared by the Loom and the Harvester.
fn robots_cache(config: &AppConfig) -> Result<Arc<RobotsCache>> {
    let harvest = HarvestConfig::from(config);
    let client = build_client(&harvest.user_agent, harvest.robots_timeout)?;
    Ok(Arc::new(RobotsCache::new(client, harvest.robots_timeout)))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_sow(url: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let rules = PriorityRules::from_config(&config.priority_rules)?;
    let loom =
        Loom::new(LoomConfig::from(&config), rules, storage)?.with_robots(robots_cache(&config)?);

    let report = loom.sow(url).await?;

    println!();
    println!("  Seed sown: {url}");
    println!("  Candidates: {}", report.harvested);
    println!("  Stored:     {}", report.stored);
    println!("  Errors:     {}", report.errors);
    println!();

    Ok(())
}

async fn cmd_harvest(url: &str, ingest: bool, no_enrich: bool) -> Result<()> {
    let config = load_config()?;
    let harvester = Harvester::new(
        HarvestConfig::from(&config),
        build_advisor(&config, !no_enrich)?,
    )?
    .with_robots(robots_cache(&config)?)
    .with_enrichment(!no_enrich);

    let spinner = spinner(format!("Harvesting {url}"));
    let report = harvester.harvest(url).await?;
    spinner.finish_and_clear();

    for page in &report.pages {
        println!(
            "{}{}  [{}]",
            "  ".repeat(page.depth as usize),
            page.url,
            page.title
        );
        if !page.emails.is_empty() {
            println!("{}  emails: {}", "  ".repeat(page.depth as usize), page.emails.join(", "));
        }
        if !page.structural_flaws.is_empty() {
            println!(
                "{}  flaws:  {}",
                "  ".repeat(page.depth as usize),
                page.structural_flaws.join(", ")
            );
        }
    }

    println!();
    println!("  Pages:  {}", report.stats.pages);
    println!("  Emails: {}", report.stats.emails);
    println!("  Flaws:  {}", report.stats.flaws);
    println!("  Errors: {}", report.stats.errors);
    if let Some(reason) = &report.reason {
        println!("  Stopped: {reason}");
    }

    if ingest && !report.pages.is_empty() {
        let storage = open_storage(&config).await?;
        let job_id = storage.begin_job(url).await?;
        let stored = storage.ingest(&report.pages, Some(&job_id)).await?;
        storage
            .finish_job(&job_id, &serde_json::json!({ "stats": report.stats }).to_string())
            .await?;
        println!("  Ingested: {stored} (job {job_id})");
    }
    println!();

    Ok(())
}

async fn cmd_drain(limit: Option<usize>, watch: bool, timeout_secs: Option<u64>) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;

    let mut drain_config = DrainConfig::from(&config);
    if let Some(limit) = limit {
        if limit == 0 {
            return Err(eyre!("--limit must be at least 1"));
        }
        drain_config.batch_limit = limit;
    }

    let harvester = Harvester::new(HarvestConfig::from(&config), build_advisor(&config, true)?)?
        .with_robots(robots_cache(&config)?);
    let watchdog = Watchdog::from_config(&WatchdogConfig::from(&config), storage.clone());
    let evaluator = CouncilEvaluator::from_config(&config.council)?;

    let controller = Arc::new(
        DrainController::new(
            storage.clone(),
            storage,
            Arc::new(harvester),
            Arc::new(watchdog),
            Arc::new(evaluator),
            Arc::new(LogNotifier),
            drain_config,
        )
        .with_progress(Arc::new(CliProgress::new())),
    );

    info!(watch, timeout_secs, "draining frontier");

    let drain = async {
        if watch {
            controller.watch(None).await
        } else {
            controller.drain_once().await
        }
    };

    let report = match timeout_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), drain).await {
            Ok(result) => result?,
            Err(_) => {
                println!("  Stopped after {secs}s timeout.");
                return Ok(());
            }
        },
        None => drain.await?,
    };

    print_drain_report(&report);
    Ok(())
}

fn print_drain_report(report: &DrainReport) {
    println!();
    println!("  Claimed:   {}", report.claimed);
    println!("  Archived:  {}", report.archived);
    println!("  Rejected:  {}", report.rejected);
    println!("  Errored:   {}", report.errored);
    println!("  Escalated: {}", report.escalated);
    println!();
}

async fn cmd_frontier(status: Option<&str>, limit: usize) -> Result<()> {
    let status = status
        .map(|s| s.parse::<FrontierStatus>())
        .transpose()
        .map_err(|e| eyre!(e))?;

    let config = load_config()?;
    let path = database_path(&config);
    if !path.exists() {
        return Err(eyre!(
            "no database at '{}'; run `artemis sow <url>` first",
            path.display()
        ));
    }
    let storage = Storage::open_readonly(&path).await?;

    let entries = storage.list_entries(status, limit).await?;
    if entries.is_empty() {
        println!("No frontier entries.");
        return Ok(());
    }

    println!("{:<10} {:>3}  {:<20} URL", "STATUS", "PRI", "UPDATED");
    for entry in entries {
        println!(
            "{:<10} {:>3}  {:<20} {}",
            entry.status.as_str(),
            entry.priority_score,
            entry.updated_at.format("%Y-%m-%d %H:%M:%S"),
            entry.url
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("static progress template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message);
    spinner
}

/// Drain progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            spinner: spinner("Claiming frontier entries".into()),
        }
    }
}

impl DrainProgress for CliProgress {
    fn cycle_started(&self, claimed: usize) {
        self.spinner
            .set_message(format!("Draining {claimed} claimed entries"));
    }

    fn entry_started(&self, url: &str) {
        self.spinner.set_message(format!("Harvesting {url}"));
    }

    fn entry_finished(&self, url: &str, outcome: &EntryOutcome) {
        let line = match outcome {
            EntryOutcome::Archived {
                nurture_score,
                notified,
            } => format!(
                "archived  {url} (score {nurture_score:.1}{})",
                if *notified { ", notified" } else { "" }
            ),
            EntryOutcome::Rejected { reason } => format!("rejected  {url} ({reason})"),
            EntryOutcome::Errored { error } => format!("error     {url} ({error})"),
            EntryOutcome::Escalated { new_target } => format!(
                "dead-end  {url} -> {}",
                new_target.as_deref().unwrap_or("no alternative")
            ),
        };
        self.spinner.println(line);
    }

    fn cycle_finished(&self, report: &DrainReport) {
        self.spinner.set_message(format!(
            "Cycle done: {} archived, {} rejected, {} errored, {} escalated",
            report.archived, report.rejected, report.errored, report.escalated
        ));
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        self.spinner.finish_and_clear();
    }
}
