//! Configuration management
//!
//! Handles loading and parsing of the JSON configuration file with
//! environment variable overrides for endpoints and the broker user id.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use tracing::warn;

use crate::common::ReadinessPoll;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub market: MarketConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    ///
    /// A missing file is a configuration problem the pipeline can run
    /// through; a malformed one is not.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }
        warn!("Config file {} not found, using defaults", path.display());
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("OPTION_CHAIN_WEBDRIVER_URL") {
            self.credentials.webdriver_url = Some(url);
        }
        if let Ok(url) = std::env::var("OPTION_CHAIN_BRIDGE_URL") {
            self.backend.bridge_url = Some(url);
        }
        if let Ok(user_id) = std::env::var("OPTION_CHAIN_USER_ID") {
            self.credentials.default_user_id = user_id;
        }
        if let Ok(path) = std::env::var("OPTION_CHAIN_CACHE_PATH") {
            self.credentials.cache_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.market.session().context("Invalid market session")?;
        anyhow::ensure!(
            self.credentials.ttl_hours > 0,
            "credentials.ttl_hours must be positive"
        );
        Ok(())
    }
}

/// External worker process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub exe_path: PathBuf,
    /// Image name used to terminate stale instances before a fresh start
    pub process_name: String,
    pub args: Vec<String>,
    pub kill_existing: bool,
    pub kill_wait_ms: u64,
    pub settle_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            exe_path: PathBuf::from("SmartOptionChainExcel.exe"),
            process_name: "SmartOptionChainExcel.exe".to_string(),
            args: Vec::new(),
            kill_existing: true,
            kill_wait_ms: 1_000,
            settle_ms: 2_000,
            poll_interval_ms: 100,
        }
    }
}

impl WorkerConfig {
    pub fn settle_poll(&self) -> ReadinessPoll {
        ReadinessPoll::new(
            StdDuration::from_millis(self.settle_ms),
            StdDuration::from_millis(self.poll_interval_ms),
            StdDuration::from_millis(self.poll_interval_ms.saturating_mul(4)),
        )
    }
}

/// Credential cache and browser login settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub cache_path: PathBuf,
    pub ttl_hours: i64,
    pub login_url: String,
    /// WebDriver endpoint (e.g. chromedriver); `None` disables live login
    pub webdriver_url: Option<String>,
    pub headless: bool,
    pub dashboard_marker: String,
    pub detect_timeout_secs: u64,
    pub login_timeout_secs: u64,
    pub page_load_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub default_user_id: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        CredentialConfig {
            cache_path: PathBuf::from("token_cache.json"),
            ttl_hours: 8,
            login_url: "https://kite.zerodha.com/".to_string(),
            webdriver_url: None,
            headless: false,
            dashboard_marker: "dashboard".to_string(),
            detect_timeout_secs: 3,
            login_timeout_secs: 30,
            page_load_timeout_secs: 15,
            poll_interval_ms: 500,
            default_user_id: "JOL229".to_string(),
        }
    }
}

impl CredentialConfig {
    pub fn ttl(&self) -> Duration {
        Duration::hours(self.ttl_hours)
    }

    pub fn detect_poll(&self) -> ReadinessPoll {
        ReadinessPoll::new(
            StdDuration::from_secs(self.detect_timeout_secs),
            StdDuration::from_millis(self.poll_interval_ms),
            StdDuration::from_millis(self.poll_interval_ms),
        )
    }

    pub fn login_poll(&self) -> ReadinessPoll {
        ReadinessPoll::new(
            StdDuration::from_secs(self.login_timeout_secs),
            StdDuration::from_millis(self.poll_interval_ms),
            StdDuration::from_millis(self.poll_interval_ms.saturating_mul(2)),
        )
    }
}

/// Compute engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub workbook_path: PathBuf,
    /// Spreadsheet bridge endpoint; `None` means degraded mode only
    pub bridge_url: Option<String>,
    pub request_timeout_secs: u64,
    pub recalc_timeout_ms: u64,
    pub recalc_poll_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            workbook_path: PathBuf::from("SmartOptionChainExcel_Zerodha.xlsm"),
            bridge_url: None,
            request_timeout_secs: 10,
            recalc_timeout_ms: 2_000,
            recalc_poll_ms: 100,
        }
    }
}

impl BackendConfig {
    pub fn recalc_poll(&self) -> ReadinessPoll {
        ReadinessPoll::new(
            StdDuration::from_millis(self.recalc_timeout_ms),
            StdDuration::from_millis(self.recalc_poll_ms),
            StdDuration::from_millis(self.recalc_poll_ms.saturating_mul(5)),
        )
    }
}

/// Exchange session window, local wall-clock `HH:MM`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub open: String,
    pub close: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        MarketConfig {
            open: "09:15".to_string(),
            close: "15:30".to_string(),
        }
    }
}

impl MarketConfig {
    pub fn session(&self) -> Result<MarketSession> {
        let open = NaiveTime::parse_from_str(&self.open, "%H:%M")
            .with_context(|| format!("Bad market open time: {}", self.open))?;
        let close = NaiveTime::parse_from_str(&self.close, "%H:%M")
            .with_context(|| format!("Bad market close time: {}", self.close))?;
        anyhow::ensure!(open < close, "market open must be before close");
        Ok(MarketSession { open, close })
    }
}

/// Inclusive trading session window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSession {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Default for MarketSession {
    fn default() -> Self {
        MarketSession {
            open: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl MarketSession {
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.open <= time && time <= self.close
    }
}
