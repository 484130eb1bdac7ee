//! Pre-flight diagnostics
//!
//! Checks the files and endpoints the pipeline depends on and suggests
//! fixes. Nothing here changes runtime behavior; a failing check only means
//! the pipeline will run in a fallback mode.

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::backend::HttpBridgeConnector;
use crate::config::Config;
use crate::credentials::{BrowserDriver, CacheStatus, CredentialCache, WebDriverClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
    Skipped,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "SKIP",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Check {
    fn ok(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Ok,
            detail: detail.into(),
            recommendation: None,
        }
    }

    fn skipped(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            detail: detail.into(),
            recommendation: None,
        }
    }

    fn problem(
        name: &'static str,
        status: CheckStatus,
        detail: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
            recommendation: Some(recommendation.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub checks: Vec<Check>,
}

impl DiagnosticReport {
    /// No check failed outright. Warnings mean fallback modes.
    pub fn is_healthy(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }

    pub fn recommendations(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter_map(|c| c.recommendation.as_deref())
            .collect()
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "PIPELINE DIAGNOSTICS")?;
        writeln!(f, "{}", "=".repeat(60))?;
        for check in &self.checks {
            writeln!(f, "[{:>4}] {:<14} {}", check.status, check.name, check.detail)?;
        }

        let recommendations = self.recommendations();
        if !recommendations.is_empty() {
            writeln!(f, "\nRecommendations:")?;
            for (i, rec) in recommendations.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, rec)?;
            }
        }
        Ok(())
    }
}

pub async fn run_diagnostics(config: &Config) -> DiagnosticReport {
    let cache = CredentialCache::from_config(&config.credentials);
    let checks = vec![
        check_executable(&config.worker.exe_path),
        check_workbook(&config.backend.workbook_path),
        check_cache(&cache),
        check_webdriver(config).await,
        check_bridge(config).await,
    ];
    DiagnosticReport { checks }
}

pub fn check_executable(path: &Path) -> Check {
    const NAME: &str = "worker";
    if !path.is_file() {
        return Check::problem(
            NAME,
            CheckStatus::Warn,
            format!("{} not found", path.display()),
            format!("Copy the worker executable to {}", path.display()),
        );
    }
    if !is_executable(path) {
        return Check::problem(
            NAME,
            CheckStatus::Fail,
            format!("{} is not executable", path.display()),
            format!("chmod +x {}", path.display()),
        );
    }
    Check::ok(NAME, format!("{} found", path.display()))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

pub fn check_workbook(path: &Path) -> Check {
    const NAME: &str = "workbook";
    if !path.is_file() {
        return Check::problem(
            NAME,
            CheckStatus::Warn,
            format!("{} not found, fetches will be synthetic", path.display()),
            format!("Copy the option-chain workbook to {}", path.display()),
        );
    }
    match std::fs::File::open(path) {
        Ok(_) => Check::ok(NAME, format!("{} readable", path.display())),
        Err(e) => Check::problem(
            NAME,
            CheckStatus::Fail,
            format!("{} unreadable: {}", path.display(), e),
            "Fix the workbook file permissions",
        ),
    }
}

pub fn check_cache(cache: &CredentialCache) -> Check {
    const NAME: &str = "credential";
    let path = cache.path().display();
    match cache.status_at(Utc::now()) {
        CacheStatus::Fresh => Check::ok(NAME, format!("fresh credential cached at {}", path)),
        CacheStatus::Stale => Check::problem(
            NAME,
            CheckStatus::Warn,
            format!("cached credential at {} has expired", path),
            "Log in again during the next initialization",
        ),
        CacheStatus::Absent => Check::problem(
            NAME,
            CheckStatus::Warn,
            "no cached credential",
            "Configure a WebDriver endpoint so the first initialization can log in",
        ),
        CacheStatus::Corrupt => Check::problem(
            NAME,
            CheckStatus::Warn,
            format!("{} is unreadable and will be ignored", path),
            format!("Delete {}", path),
        ),
    }
}

async fn check_webdriver(config: &Config) -> Check {
    const NAME: &str = "webdriver";
    match WebDriverClient::from_config(&config.credentials) {
        Ok(None) => Check::skipped(NAME, "no endpoint configured, live login disabled"),
        Ok(Some(client)) => {
            if client.is_available().await {
                Check::ok(NAME, format!("{} ready", client.base_url()))
            } else {
                Check::problem(
                    NAME,
                    CheckStatus::Warn,
                    format!("{} not ready", client.base_url()),
                    "Start chromedriver (e.g. `chromedriver --port=9515`)",
                )
            }
        }
        Err(e) => Check::problem(
            NAME,
            CheckStatus::Fail,
            e.to_string(),
            "Fix credentials.webdriver_url in the config",
        ),
    }
}

async fn check_bridge(config: &Config) -> Check {
    const NAME: &str = "bridge";
    let Some(url) = config.backend.bridge_url.as_deref() else {
        return Check::skipped(NAME, "no endpoint configured, fetches will be synthetic");
    };
    let connector =
        match HttpBridgeConnector::new(url, Duration::from_secs(config.backend.request_timeout_secs)) {
            Ok(connector) => connector,
            Err(e) => {
                return Check::problem(
                    NAME,
                    CheckStatus::Fail,
                    e.to_string(),
                    "Fix backend.bridge_url in the config",
                )
            }
        };
    match connector.open_workbooks().await {
        Ok(names) => Check::ok(NAME, format!("{} reachable, {} workbook(s) open", url, names.len())),
        Err(e) => Check::problem(
            NAME,
            CheckStatus::Warn,
            format!("{} unreachable: {}", url, e),
            "Start the spreadsheet bridge next to the spreadsheet application",
        ),
    }
}
