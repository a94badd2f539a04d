//! Application configuration for Artemis.
//!
//! User config lives at `~/.artemis/artemis.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ArtemisError, Result};
use crate::types::RetryPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "artemis.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".artemis";

/// Declared user agent for every outbound request.
pub const USER_AGENT: &str = concat!("Artemis-Harvester/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Config structs (matching artemis.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub loom: LoomSection,

    #[serde(default)]
    pub harvest: HarvestSection,

    #[serde(default)]
    pub watchdog: WatchdogSection,

    #[serde(default)]
    pub council: CouncilConfig,

    #[serde(default)]
    pub drain: DrainSection,

    /// Replaces the built-in priority rules when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priority_rules: Vec<PriorityRuleConfig>,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Path to the libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.artemis/artemis.db".into()
}

/// `[loom]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoomSection {
    #[serde(default = "default_loom_timeout")]
    pub request_timeout_ms: u64,

    /// Candidates beyond this count are dropped in encounter order.
    #[serde(default = "default_max_links_per_seed")]
    pub max_links_per_seed: usize,
}

impl Default for LoomSection {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_loom_timeout(),
            max_links_per_seed: default_max_links_per_seed(),
        }
    }
}

fn default_loom_timeout() -> u64 {
    10_000
}
fn default_max_links_per_seed() -> usize {
    150
}

/// `[harvest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSection {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(default = "default_max_pages_per_domain")]
    pub max_pages_per_domain: usize,

    /// Branching factor for recursion.
    #[serde(default = "default_max_links_per_page")]
    pub max_links_per_page: usize,

    #[serde(default = "default_harvest_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_robots_timeout")]
    pub robots_timeout_ms: u64,

    /// Wait inserted before every page request.
    #[serde(default = "default_polite_delay")]
    pub polite_delay_ms: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Directory for per-page JSON snapshots. Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<String>,
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_pages_per_domain: default_max_pages_per_domain(),
            max_links_per_page: default_max_links_per_page(),
            request_timeout_ms: default_harvest_timeout(),
            robots_timeout_ms: default_robots_timeout(),
            polite_delay_ms: default_polite_delay(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            snapshot_dir: None,
        }
    }
}

fn default_max_depth() -> u32 {
    3
}
fn default_max_pages_per_domain() -> usize {
    50
}
fn default_max_links_per_page() -> usize {
    10
}
fn default_harvest_timeout() -> u64 {
    12_000
}
fn default_robots_timeout() -> u64 {
    5_000
}
fn default_polite_delay() -> u64 {
    1_200
}
fn default_retry_attempts() -> u32 {
    2
}
fn default_retry_backoff() -> u64 {
    2_000
}

/// `[watchdog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogSection {
    /// Consecutive failures before escalation.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_guidance_timeout")]
    pub guidance_timeout_ms: u64,

    /// Where the intervention log and its artifacts are written.
    #[serde(default = "default_intervention_dir")]
    pub intervention_dir: String,
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            guidance_timeout_ms: default_guidance_timeout(),
            intervention_dir: default_intervention_dir(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    3
}
fn default_guidance_timeout() -> u64 {
    2_000
}
fn default_intervention_dir() -> String {
    "~/.artemis/stewardship".into()
}

/// `[council]` section: the external advisory and evaluation collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_advise_endpoint")]
    pub advise_endpoint: String,

    #[serde(default = "default_evaluate_endpoint")]
    pub evaluate_endpoint: String,

    #[serde(default = "default_council_timeout")]
    pub timeout_ms: u64,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            advise_endpoint: default_advise_endpoint(),
            evaluate_endpoint: default_evaluate_endpoint(),
            timeout_ms: default_council_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_advise_endpoint() -> String {
    "http://localhost:3000/api/transmit".into()
}
fn default_evaluate_endpoint() -> String {
    "http://localhost:3000/api/evaluate".into()
}
fn default_council_timeout() -> u64 {
    15_000
}

/// `[drain]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainSection {
    /// Entries claimed per cycle.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Entries processed at once within a cycle.
    #[serde(default = "default_drain_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for DrainSection {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            concurrency: default_drain_concurrency(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_batch_limit() -> usize {
    5
}
fn default_drain_concurrency() -> usize {
    3
}
fn default_poll_interval() -> u64 {
    15
}

/// `[[priority_rules]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRuleConfig {
    /// Regular expression matched against the full URL.
    pub pattern: String,
    pub score: u32,
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration for the seed expander.
#[derive(Debug, Clone)]
pub struct LoomConfig {
    pub request_timeout: Duration,
    pub max_links_per_seed: usize,
    pub user_agent: String,
}

impl From<&AppConfig> for LoomConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(config.loom.request_timeout_ms),
            max_links_per_seed: config.loom.max_links_per_seed,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Runtime configuration for the recursive harvester.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub max_depth: u32,
    pub max_pages_per_domain: usize,
    pub max_links_per_page: usize,
    pub request_timeout: Duration,
    pub robots_timeout: Duration,
    pub polite_delay: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
    pub snapshot_dir: Option<PathBuf>,
}

impl From<&AppConfig> for HarvestConfig {
    fn from(config: &AppConfig) -> Self {
        let h = &config.harvest;
        Self {
            max_depth: h.max_depth,
            max_pages_per_domain: h.max_pages_per_domain,
            max_links_per_page: h.max_links_per_page,
            request_timeout: Duration::from_millis(h.request_timeout_ms),
            robots_timeout: Duration::from_millis(h.robots_timeout_ms),
            polite_delay: Duration::from_millis(h.polite_delay_ms),
            retry: RetryPolicy::new(h.retry_attempts, Duration::from_millis(h.retry_backoff_ms)),
            user_agent: USER_AGENT.to_string(),
            snapshot_dir: h.snapshot_dir.as_deref().map(expand_home),
        }
    }
}

/// Runtime configuration for the watchdog.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub retry: RetryPolicy,
    pub guidance_timeout: Duration,
    pub intervention_dir: PathBuf,
}

impl From<&AppConfig> for WatchdogConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            retry: RetryPolicy::new(config.watchdog.failure_threshold, Duration::ZERO),
            guidance_timeout: Duration::from_millis(config.watchdog.guidance_timeout_ms),
            intervention_dir: expand_home(&config.watchdog.intervention_dir),
        }
    }
}

/// Runtime configuration for the draining controller.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    pub batch_limit: usize,
    pub concurrency: usize,
    pub poll_interval: Duration,
}

impl From<&AppConfig> for DrainConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_limit: config.drain.batch_limit,
            concurrency: config.drain.concurrency.max(1),
            poll_interval: Duration::from_secs(config.drain.poll_interval_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.artemis/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| ArtemisError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.artemis/artemis.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| ArtemisError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ArtemisError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ArtemisError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ArtemisError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ArtemisError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
