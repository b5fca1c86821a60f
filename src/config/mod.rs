use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub navigator: NavigatorConfig,
    pub storage: StorageConfig,
    pub watchlist: WatchlistConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigatorKind {
    /// Saved pages on disk
    Snapshot,
    /// Live site over HTTP
    Http,
}

/// Page navigator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NavigatorConfig {
    #[serde(default = "default_navigator_kind")]
    pub kind: NavigatorKind,

    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Csv,
    Duckdb,
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Parent of the per-run database directories.
    #[serde(default)]
    pub root_dir: PathBuf,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Abort the run when a section exhausts its attempts.
    Raise,
    /// Store a placeholder and keep going.
    #[default]
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSpeed {
    #[default]
    Fast,
    Slow,
}

impl PageSpeed {
    /// Settle time after each page load.
    pub fn delay(&self) -> Duration {
        match self {
            PageSpeed::Fast => Duration::from_secs(1),
            PageSpeed::Slow => Duration::from_secs(2),
        }
    }
}

/// Watchlist build configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchlistConfig {
    #[serde(default = "default_true")]
    pub skip_finished: bool,

    #[serde(default)]
    pub save_aggregate: bool,

    #[serde(default)]
    pub error_policy: ErrorPolicy,

    #[serde(default)]
    pub return_skipped: bool,

    #[serde(default)]
    pub page_speed: PageSpeed,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    #[serde(default)]
    pub retry_delay_ms: u64,

    /// Keep compound source rows and descriptions in the summary table.
    #[serde(default)]
    pub full_tables: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_navigator_kind() -> NavigatorKind {
    NavigatorKind::Snapshot
}
fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("snapshots")
}
fn default_base_url() -> String {
    "https://research.tdameritrade.com/grid/public/research/stocks/".to_string()
}
fn default_login_path() -> String {
    "/grid/p/login".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "tds-research-scraper/0.1 (personal watchlist research)".to_string()
}
fn default_jitter_ms() -> u64 {
    500
}
fn default_credentials_path() -> PathBuf {
    PathBuf::from("keys.json")
}
fn default_backend() -> StorageBackend {
    StorageBackend::Csv
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/tds.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_max_attempts() -> usize {
    5
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("TDS").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());
        Ok(app_cfg)
    }
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            kind: default_navigator_kind(),
            snapshot_dir: default_snapshot_dir(),
            base_url: default_base_url(),
            login_path: default_login_path(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            jitter_ms: default_jitter_ms(),
            credentials_path: default_credentials_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            root_dir: PathBuf::new(),
            db_path: default_db_path(),
        }
    }
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            skip_finished: true,
            save_aggregate: false,
            error_policy: ErrorPolicy::Ignore,
            return_skipped: false,
            page_speed: PageSpeed::Fast,
            max_attempts: default_max_attempts(),
            retry_delay_ms: 0,
            full_tables: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            navigator: NavigatorConfig::default(),
            storage: StorageConfig::default(),
            watchlist: WatchlistConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.watchlist.max_attempts, 5);
        assert_eq!(cfg.watchlist.retry_delay_ms, 0);
        assert!(cfg.watchlist.skip_finished);
        assert_eq!(cfg.watchlist.error_policy, ErrorPolicy::Ignore);
        assert_eq!(cfg.storage.backend, StorageBackend::Csv);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[navigator]\nkind = \"http\"\n[storage]\nbackend = \"duckdb\"\n[watchlist]\nerror_policy = \"raise\"\npage_speed = \"slow\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.navigator.kind, NavigatorKind::Http);
        assert_eq!(cfg.navigator.timeout_secs, 30);
        assert_eq!(cfg.storage.backend, StorageBackend::Duckdb);
        assert_eq!(cfg.watchlist.error_policy, ErrorPolicy::Raise);
        assert_eq!(cfg.watchlist.page_speed.delay(), Duration::from_secs(2));
        assert_eq!(cfg.watchlist.max_attempts, 5);
    }
}
