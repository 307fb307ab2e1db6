//! Configuration types for torrss

use crate::error::{Error, Result};
use crate::types::TaskId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Free bytes that must remain on the backing store after any admission (~2 GB)
pub const DEFAULT_SAFETY_MARGIN: u64 = 2_004_800_000;

/// Browser-like user agent sent with detail-page requests
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36 Edg/109.0.1518.78";

/// Main configuration for torrss
///
/// Fields are grouped into sub-configs:
/// - [`client`](ClientConfig): download client connection
/// - [`persistence`](PersistenceConfig): database location
/// - [`admission`](AdmissionConfig): space margin, fetch behavior, dry-run
/// - [`scheduler`](SchedulerConfig): concurrency and timing of task runs
///
/// `tasks` seeds the task table on startup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download client connection
    #[serde(default)]
    pub client: ClientConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Admission pipeline behavior
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Task scheduling
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Tasks inserted into the database on startup if their feed URL is new
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                "path",
                format!("cannot read config file '{}': {}", path.display(), e),
            )
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_concurrent_runs == 0 {
            return Err(Error::config(
                "max_concurrent_runs",
                "at least one concurrent run is required",
            ));
        }
        if self.admission.fetch_timeout.is_zero() {
            return Err(Error::config("fetch_timeout", "timeout must be non-zero"));
        }
        for task in &self.tasks {
            task.validate()?;
        }
        Ok(())
    }
}

/// Download client (qBittorrent Web API) connection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL, e.g. `http://127.0.0.1:8080` (None = not configured)
    #[serde(default)]
    pub url: Option<String>,

    /// Web UI username
    #[serde(default)]
    pub username: String,

    /// Web UI password
    #[serde(default)]
    pub password: String,

    /// Timeout for each client request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: String::new(),
            password: String::new(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./torrss.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Admission pipeline configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Bytes that must stay free after any admission (default: ~2 GB)
    #[serde(default = "default_safety_margin")]
    pub safety_margin: u64,

    /// Pause after each eviction so the client's free-space figure settles (default: 3 seconds)
    #[serde(default = "default_eviction_pause", with = "duration_serde")]
    pub eviction_pause: Duration,

    /// Detail page fetch timeout (default: 15 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// User agent for feed and detail-page requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Log submissions instead of sending them to the client (default: false)
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            safety_margin: default_safety_margin(),
            eviction_pause: default_eviction_pause(),
            fetch_timeout: default_fetch_timeout(),
            user_agent: default_user_agent(),
            dry_run: false,
        }
    }
}

/// Task scheduling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum task runs executing at once (default: 3)
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// How often the scheduler wakes to look for due tasks (default: 1 second)
    #[serde(default = "default_tick_interval", with = "duration_serde")]
    pub tick_interval: Duration,

    /// Delay before each task's first automatic run after startup (default: 15 minutes)
    #[serde(default = "default_first_run_delay", with = "duration_serde")]
    pub first_run_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: default_max_concurrent_runs(),
            tick_interval: default_tick_interval(),
            first_run_delay: default_first_run_delay(),
        }
    }
}

/// One RSS task: a feed plus its acceptance rules
///
/// The pipeline treats this as a read-only snapshot for the duration of a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Database ID (ignored when seeding from the config file)
    #[serde(default)]
    pub id: TaskId,

    /// Site label; derived from the feed host when empty
    #[serde(default)]
    pub site: String,

    /// Feed URL (RSS or Atom)
    pub feed_url: String,

    /// Cookie string for the site's detail pages (`k=v; k2=v2`)
    #[serde(default)]
    pub cookie: Option<String>,

    /// Minimum declared size in MiB (default: 2)
    #[serde(default = "default_min_size_mb")]
    pub min_size_mb: u64,

    /// Title must match (case-insensitive)
    #[serde(default)]
    pub title_regex: Option<String>,

    /// Title must not match (case-insensitive)
    #[serde(default)]
    pub title_not_regex: Option<String>,

    /// Detail page must match
    #[serde(default)]
    pub info_regex: Option<String>,

    /// Detail page must not match
    #[serde(default)]
    pub info_not_regex: Option<String>,

    /// Either rating must reach this value (None or 0 = disabled)
    #[serde(default)]
    pub min_rating: Option<f64>,

    /// Category assigned in the download client
    #[serde(default)]
    pub category: Option<String>,

    /// Time between runs (default: 2 minutes)
    #[serde(default = "default_task_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Whether the task is scheduled (false = paused)
    #[serde(default = "default_true")]
    pub active: bool,

    /// Cumulative number of entries handed to the client
    #[serde(default)]
    pub accept_count: u64,
}

impl TaskConfig {
    /// Create a task for a feed URL with default rules
    pub fn new(feed_url: impl Into<String>) -> Self {
        let feed_url = feed_url.into();
        Self {
            id: TaskId::default(),
            site: crate::utils::site_name(&feed_url),
            feed_url,
            cookie: None,
            min_size_mb: default_min_size_mb(),
            title_regex: None,
            title_not_regex: None,
            info_regex: None,
            info_not_regex: None,
            min_rating: None,
            category: None,
            interval: default_task_interval(),
            active: true,
            accept_count: 0,
        }
    }

    /// Cookie string, if one is configured and non-blank
    pub fn session_cookie(&self) -> Option<&str> {
        self.cookie.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Rating threshold, if one is configured and positive
    pub fn rating_threshold(&self) -> Option<f64> {
        self.min_rating.filter(|v| *v > 0.0)
    }

    /// Check task-level constraints
    pub fn validate(&self) -> Result<()> {
        if self.feed_url.trim().is_empty() {
            return Err(Error::config("feed_url", "feed URL must not be empty"));
        }
        url::Url::parse(&self.feed_url)
            .map_err(|e| Error::config("feed_url", format!("invalid feed URL: {e}")))?;
        if self.interval.is_zero() {
            return Err(Error::config("interval", "task interval must be non-zero"));
        }
        Ok(())
    }
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("torrss.db")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_safety_margin() -> u64 {
    DEFAULT_SAFETY_MARGIN
}

fn default_eviction_pause() -> Duration {
    Duration::from_secs(3)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_max_concurrent_runs() -> usize {
    3
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_first_run_delay() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_min_size_mb() -> u64 {
    2
}

fn default_task_interval() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
