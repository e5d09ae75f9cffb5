//! Application configuration for RivalMap.
//!
//! User config lives at `~/.rivalmap/rivalmap.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RivalmapError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "rivalmap.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".rivalmap";

/// Page budgets a run may use (the scrape sizes: small, medium, large).
pub const PAGE_BUDGETS: [usize; 3] = [50, 100, 300];

/// Per-host delays a run may use, in milliseconds (fast, normal, slow).
pub const REQUEST_DELAYS_MS: [u64; 3] = [300, 600, 1200];

// ---------------------------------------------------------------------------
// Config structs (matching rivalmap.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Fetch strategy settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Scoring settings.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Topic profile overrides. Empty means the built-in taxonomy.
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory runs are written under.
    #[serde(default = "default_out_root")]
    pub out_root: String,

    /// Hard cap on pages fetched per run.
    #[serde(default = "default_page_budget")]
    pub page_budget: usize,

    /// Minimum ms between request starts to the same host.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Snippets kept per topic after trimming.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Per-pack cap on snippets sharing one source domain.
    #[serde(default = "default_max_per_domain")]
    pub max_per_domain: usize,

    /// Fetch worker pool size.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum link distance from the seed.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Whether subdomains of the seed's base domain are in scope.
    #[serde(default = "default_true")]
    pub include_subdomains: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            out_root: default_out_root(),
            page_budget: default_page_budget(),
            request_delay_ms: default_request_delay_ms(),
            top_k: default_top_k(),
            max_per_domain: default_max_per_domain(),
            workers: default_workers(),
            max_depth: default_max_depth(),
            include_subdomains: true,
        }
    }
}

fn default_out_root() -> String {
    "data".into()
}
fn default_page_budget() -> usize {
    100
}
fn default_request_delay_ms() -> u64 {
    600
}
fn default_top_k() -> usize {
    20
}
fn default_max_per_domain() -> usize {
    3
}
fn default_workers() -> usize {
    4
}
fn default_max_depth() -> u32 {
    5
}
fn default_true() -> bool {
    true
}

/// How page content is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Plain HTTP GET.
    Static,
    /// Always fetch through the rendering service.
    Rendered,
    /// Static first; rendered retry when the result looks script-thin.
    Auto,
}

impl Default for FetchMode {
    fn default() -> Self {
        Self::Static
    }
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Static => "static",
            Self::Rendered => "rendered",
            Self::Auto => "auto",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for FetchMode {
    type Err = RivalmapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "static" => Ok(Self::Static),
            "rendered" => Ok(Self::Rendered),
            "auto" => Ok(Self::Auto),
            other => Err(RivalmapError::config(format!(
                "fetch mode must be static, rendered, or auto (got {other:?})"
            ))),
        }
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Strategy selection.
    #[serde(default)]
    pub mode: FetchMode,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total fetch attempts per URL (first try + retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in ms, doubled per retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Base URL of a browserless-style rendering service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_endpoint: Option<String>,

    /// Name of the env var holding the rendering token (never the token itself).
    #[serde(default = "default_render_token_env")]
    pub render_token_env: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::default(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            render_endpoint: None,
            render_token_env: default_render_token_env(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    20
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    300
}
fn default_render_token_env() -> String {
    "RIVALMAP_RENDER_TOKEN".into()
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Minimum score a paragraph must exceed to be recorded for a topic.
    #[serde(default = "default_noise_floor")]
    pub noise_floor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            noise_floor: default_noise_floor(),
        }
    }
}

fn default_noise_floor() -> f64 {
    0.05
}

/// `[[topics]]` entry overriding the built-in taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Topic name (pack key).
    pub name: String,
    /// Weighted keyword phrases.
    pub keywords: Vec<KeywordConfig>,
}

/// One weighted keyword phrase within a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Phrase matched on token boundaries (may be multi-word).
    pub term: String,
    /// Relative weight.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime run configuration, merged from config file + CLI flags.
///
/// Validated fail-fast by [`RunConfig::validate`] before any work starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub out_root: String,
    pub page_budget: usize,
    pub request_delay_ms: u64,
    pub top_k: usize,
    pub max_per_domain: usize,
    pub workers: usize,
    pub max_depth: u32,
    pub include_subdomains: bool,
    pub fetch_mode: FetchMode,
    pub fetch_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_endpoint: Option<String>,
    pub render_token_env: String,
    pub noise_floor: f64,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            out_root: config.defaults.out_root.clone(),
            page_budget: config.defaults.page_budget,
            request_delay_ms: config.defaults.request_delay_ms,
            top_k: config.defaults.top_k,
            max_per_domain: config.defaults.max_per_domain,
            workers: config.defaults.workers,
            max_depth: config.defaults.max_depth,
            include_subdomains: config.defaults.include_subdomains,
            fetch_mode: config.fetch.mode,
            fetch_timeout_secs: config.fetch.timeout_secs,
            max_attempts: config.fetch.max_attempts,
            backoff_base_ms: config.fetch.backoff_base_ms,
            render_endpoint: config.fetch.render_endpoint.clone(),
            render_token_env: config.fetch.render_token_env.clone(),
            noise_floor: config.scoring.noise_floor,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl RunConfig {
    /// Check every value before a run starts. The first violation aborts.
    pub fn validate(&self) -> Result<()> {
        if !PAGE_BUDGETS.contains(&self.page_budget) {
            return Err(RivalmapError::config(format!(
                "page_budget must be one of 50, 100, 300 (got {})",
                self.page_budget
            )));
        }
        if !REQUEST_DELAYS_MS.contains(&self.request_delay_ms) {
            return Err(RivalmapError::config(format!(
                "request_delay_ms must be one of 300, 600, 1200 (got {})",
                self.request_delay_ms
            )));
        }
        if !(5..=100).contains(&self.top_k) {
            return Err(RivalmapError::config(format!(
                "top_k must be between 5 and 100 (got {})",
                self.top_k
            )));
        }
        if self.max_per_domain == 0 {
            return Err(RivalmapError::config("max_per_domain must be at least 1"));
        }
        if !(2..=8).contains(&self.workers) {
            return Err(RivalmapError::config(format!(
                "workers must be between 2 and 8 (got {})",
                self.workers
            )));
        }
        if self.max_depth == 0 {
            return Err(RivalmapError::config("max_depth must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.noise_floor) {
            return Err(RivalmapError::config(format!(
                "noise_floor must be within [0, 1] (got {})",
                self.noise_floor
            )));
        }
        if self.max_attempts == 0 {
            return Err(RivalmapError::config("max_attempts must be at least 1"));
        }
        if self.fetch_mode == FetchMode::Rendered && self.render_endpoint.is_none() {
            return Err(RivalmapError::config(
                "fetch mode \"rendered\" requires fetch.render_endpoint",
            ));
        }
        Ok(())
    }

    /// Per-host politeness delay.
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Per-request fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Base retry backoff, doubled per subsequent attempt.
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Rendering token from the configured env var, if set and non-empty.
    pub fn render_token(&self) -> Option<String> {
        std::env::var(&self.render_token_env)
            .ok()
            .filter(|v| !v.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.rivalmap/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RivalmapError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.rivalmap/rivalmap.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| RivalmapError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RivalmapError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RivalmapError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RivalmapError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RivalmapError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
