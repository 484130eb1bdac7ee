//! Credential acquisition state machine
//!
//! Walks an ordered list of strategies, `Cache -> LiveLogin -> Placeholder`,
//! and stops at the first one that yields a usable credential. The walk
//! always ends with a credential: the placeholder strategy cannot fail, and
//! a list that omits it still falls back to the placeholder at the end.

use chrono::Utc;
use std::fmt;
use tracing::{debug, info, warn};

use super::browser::{BrowserDriver, BrowserSession};
use super::cache::CredentialCache;
use super::webdriver::WebDriverClient;
use crate::common::ReadinessPoll;
use crate::config::CredentialConfig;
use crate::error::{BrowserError, BrowserResult};
use crate::types::{Credential, CredentialOrigin};

/// Stage of the acquisition walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStage {
    TryCache,
    TryLive,
    Fallback,
    Done,
}

impl fmt::Display for AcquisitionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionStage::TryCache => write!(f, "try_cache"),
            AcquisitionStage::TryLive => write!(f, "try_live"),
            AcquisitionStage::Fallback => write!(f, "fallback"),
            AcquisitionStage::Done => write!(f, "done"),
        }
    }
}

/// One way of obtaining a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStrategy {
    Cache,
    LiveLogin,
    Placeholder,
}

impl CredentialStrategy {
    pub const DEFAULT_ORDER: [CredentialStrategy; 3] = [
        CredentialStrategy::Cache,
        CredentialStrategy::LiveLogin,
        CredentialStrategy::Placeholder,
    ];

    pub fn stage(&self) -> AcquisitionStage {
        match self {
            CredentialStrategy::Cache => AcquisitionStage::TryCache,
            CredentialStrategy::LiveLogin => AcquisitionStage::TryLive,
            CredentialStrategy::Placeholder => AcquisitionStage::Fallback,
        }
    }

    pub fn origin(&self) -> CredentialOrigin {
        match self {
            CredentialStrategy::Cache => CredentialOrigin::Cache,
            CredentialStrategy::LiveLogin => CredentialOrigin::Live,
            CredentialStrategy::Placeholder => CredentialOrigin::Placeholder,
        }
    }
}

/// Outcome of evaluating a single strategy
#[derive(Debug, Clone)]
pub enum Attempt {
    Acquired(Credential),
    Skipped(String),
    Failed(String),
}

/// Browser login parameters
#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub login_url: String,
    /// Substring of the post-login URL
    pub dashboard_marker: String,
    /// Short window for an already-authenticated session
    pub detect_poll: ReadinessPoll,
    /// Single manual-login window
    pub login_poll: ReadinessPoll,
    pub default_user_id: String,
}

impl LoginSettings {
    pub fn from_config(config: &CredentialConfig) -> Self {
        Self {
            login_url: config.login_url.clone(),
            dashboard_marker: config.dashboard_marker.clone(),
            detect_poll: config.detect_poll(),
            login_poll: config.login_poll(),
            default_user_id: config.default_user_id.clone(),
        }
    }
}

pub struct CredentialAcquirer {
    cache: CredentialCache,
    browser: Option<Box<dyn BrowserDriver>>,
    login: LoginSettings,
    strategies: Vec<CredentialStrategy>,
}

impl CredentialAcquirer {
    pub fn new(
        cache: CredentialCache,
        browser: Option<Box<dyn BrowserDriver>>,
        login: LoginSettings,
    ) -> Self {
        Self {
            cache,
            browser,
            login,
            strategies: CredentialStrategy::DEFAULT_ORDER.to_vec(),
        }
    }

    pub fn from_config(config: &CredentialConfig) -> Self {
        let browser: Option<Box<dyn BrowserDriver>> = match WebDriverClient::from_config(config) {
            Ok(Some(client)) => Some(Box::new(client)),
            Ok(None) => None,
            Err(e) => {
                warn!("WebDriver disabled: {}", e);
                None
            }
        };
        Self::new(
            CredentialCache::from_config(config),
            browser,
            LoginSettings::from_config(config),
        )
    }

    pub fn with_strategies(mut self, strategies: Vec<CredentialStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn strategies(&self) -> &[CredentialStrategy] {
        &self.strategies
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// Obtain a credential. Never fails and never returns an empty token.
    pub async fn obtain(&self) -> (Credential, CredentialOrigin) {
        for strategy in &self.strategies {
            let stage = strategy.stage();
            debug!("Credential stage {}", stage);

            match self.attempt(*strategy).await {
                Attempt::Acquired(credential) if !credential.is_empty() => {
                    info!(
                        "Credential {} acquired at stage {} (user {})",
                        credential.fingerprint(),
                        stage,
                        credential.user_id()
                    );
                    debug!("Credential stage {}", AcquisitionStage::Done);
                    return (credential, strategy.origin());
                }
                Attempt::Acquired(_) => warn!("Stage {} produced an empty token", stage),
                Attempt::Skipped(reason) => info!("Stage {} skipped: {}", stage, reason),
                Attempt::Failed(reason) => warn!("Stage {} failed: {}", stage, reason),
            }
        }

        warn!("No credential strategy succeeded, using placeholder");
        (
            Credential::placeholder(&self.login.default_user_id),
            CredentialOrigin::Placeholder,
        )
    }

    pub async fn attempt(&self, strategy: CredentialStrategy) -> Attempt {
        match strategy {
            CredentialStrategy::Cache => self.try_cache(),
            CredentialStrategy::LiveLogin => self.try_live().await,
            CredentialStrategy::Placeholder => {
                Attempt::Acquired(Credential::placeholder(&self.login.default_user_id))
            }
        }
    }

    fn try_cache(&self) -> Attempt {
        match self.cache.load() {
            Some(credential) if credential.is_placeholder() => {
                Attempt::Skipped("cached credential is the placeholder".into())
            }
            Some(credential) => Attempt::Acquired(credential),
            None => Attempt::Skipped("no fresh cached credential".into()),
        }
    }

    async fn try_live(&self) -> Attempt {
        let Some(driver) = self.browser.as_deref() else {
            return Attempt::Skipped("no browser automation configured".into());
        };
        if !driver.is_available().await {
            return Attempt::Skipped("browser automation unavailable".into());
        }

        let session = match driver.open_session().await {
            Ok(session) => session,
            Err(e) => return Attempt::Failed(format!("could not open browser: {}", e)),
        };

        let outcome = self.login(session.as_ref()).await;
        if let Err(e) = session.close().await {
            debug!("Browser close reported: {}", e);
        }

        match outcome {
            Ok(credential) => {
                self.cache.save(&credential);
                Attempt::Acquired(credential)
            }
            Err(e) => Attempt::Failed(e.to_string()),
        }
    }

    async fn login(&self, session: &dyn BrowserSession) -> BrowserResult<Credential> {
        session.navigate(&self.login.login_url).await?;

        let marker = self.login.dashboard_marker.as_str();
        let on_dashboard = move || async move {
            session
                .current_url()
                .await
                .map(|url| url.contains(marker))
                .unwrap_or(false)
        };

        if self.login.detect_poll.wait_until(on_dashboard).await.is_ready() {
            info!("Existing broker session detected");
        } else {
            info!(
                "Please log in manually ({}s timeout)",
                self.login.login_poll.timeout.as_secs()
            );
            let outcome = self.login.login_poll.wait_until(on_dashboard).await;
            if !outcome.is_ready() {
                return Err(BrowserError::Timeout("manual login".into()));
            }
        }

        read_token(session, &self.login.default_user_id)
            .await?
            .ok_or_else(|| BrowserError::Protocol("no enctoken in web storage".into()))
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// localStorage first (with its user id), then sessionStorage
async fn read_token(
    session: &dyn BrowserSession,
    default_user_id: &str,
) -> BrowserResult<Option<Credential>> {
    if let Some(token) = present(session.local_storage_item("enctoken").await?) {
        let user_id = present(session.local_storage_item("user_id").await?)
            .unwrap_or_else(|| default_user_id.to_string());
        return Ok(Some(Credential::new(token, user_id, Utc::now())));
    }

    Ok(present(session.session_storage_item("enctoken").await?)
        .map(|token| Credential::new(token, default_user_id, Utc::now())))
}
