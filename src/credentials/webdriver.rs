//! W3C WebDriver client
//!
//! Minimal client for a chromedriver-compatible endpoint: enough to open a
//! window, follow the login page and read the session token out of web
//! storage. Every response is wrapped as `{"value": ...}`; failures carry
//! `{"value": {"error", "message"}}` with a non-2xx status.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::browser::{BrowserDriver, BrowserSession};
use crate::config::CredentialConfig;
use crate::error::{BrowserError, BrowserResult};

const CHROME_ARGS: [&str; 4] = [
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
];

/// Options applied to every new browser session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub headless: bool,
    pub page_load_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            headless: false,
            page_load_timeout: Duration::from_secs(15),
        }
    }
}

impl SessionOptions {
    pub fn capabilities(&self) -> Value {
        let mut args: Vec<&str> = CHROME_ARGS.to_vec();
        if self.headless {
            args.push("--headless=new");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "excludeSwitches": ["enable-automation"],
                        "useAutomationExtension": false
                    }
                }
            }
        })
    }
}

fn endpoint(base: &Url, segments: &[&str]) -> BrowserResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| BrowserError::Protocol(format!("base URL cannot have paths: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Send a command and unwrap the `value` member of the reply
async fn call(request: RequestBuilder) -> BrowserResult<Value> {
    let response = request.send().await?;
    let status = response.status();
    let body: Value = response.json().await?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }
    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
    if error == "timeout" {
        Err(BrowserError::Timeout(message.to_string()))
    } else {
        Err(BrowserError::Protocol(format!("{} ({}): {}", error, status, message)))
    }
}

fn storage_script(storage: &str) -> String {
    format!("return window.{}.getItem(arguments[0]);", storage)
}

/// Empty strings count as missing
fn non_empty(value: Value) -> Option<String> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

pub struct WebDriverClient {
    client: Client,
    base_url: Url,
    options: SessionOptions,
}

impl WebDriverClient {
    pub fn new(base_url: &str, options: SessionOptions) -> BrowserResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BrowserError::Unavailable(format!("bad WebDriver URL {}: {}", base_url, e)))?;
        // Navigation blocks until the page loads, so leave headroom over the page-load timeout
        let client = Client::builder()
            .timeout(options.page_load_timeout + Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url,
            options,
        })
    }

    /// `Ok(None)` when no endpoint is configured
    pub fn from_config(config: &CredentialConfig) -> BrowserResult<Option<Self>> {
        let Some(url) = config.webdriver_url.as_deref() else {
            return Ok(None);
        };
        let options = SessionOptions {
            headless: config.headless,
            page_load_timeout: Duration::from_secs(config.page_load_timeout_secs),
        };
        Self::new(url, options).map(Some)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl BrowserDriver for WebDriverClient {
    async fn is_available(&self) -> bool {
        let url = match endpoint(&self.base_url, &["status"]) {
            Ok(url) => url,
            Err(_) => return false,
        };
        let probe = self.client.get(url).timeout(Duration::from_secs(3));
        match call(probe).await {
            Ok(value) => value.get("ready").and_then(Value::as_bool).unwrap_or(false),
            Err(e) => {
                debug!("WebDriver status probe failed: {}", e);
                false
            }
        }
    }

    async fn open_session(&self) -> BrowserResult<Box<dyn BrowserSession>> {
        let url = endpoint(&self.base_url, &["session"])?;
        let value = call(self.client.post(url).json(&self.options.capabilities())).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("new session reply has no sessionId".into()))?
            .to_string();
        debug!("Opened WebDriver session {}", session_id);

        let session = WebDriverSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            session_id,
        };

        let timeouts = json!({ "pageLoad": self.options.page_load_timeout.as_millis() as u64 });
        let applied = session.post(&["timeouts"], &timeouts).await;
        if let Err(e) = applied {
            let _ = Box::new(session).close().await;
            return Err(e);
        }
        Ok(Box::new(session))
    }
}

pub struct WebDriverSession {
    client: Client,
    base_url: Url,
    session_id: String,
}

impl WebDriverSession {
    fn url(&self, tail: &[&str]) -> BrowserResult<Url> {
        let mut segments = vec!["session", self.session_id.as_str()];
        segments.extend_from_slice(tail);
        endpoint(&self.base_url, &segments)
    }

    async fn post(&self, tail: &[&str], body: &Value) -> BrowserResult<Value> {
        call(self.client.post(self.url(tail)?).json(body)).await
    }

    async fn storage_item(&self, storage: &str, key: &str) -> BrowserResult<Option<String>> {
        let body = json!({ "script": storage_script(storage), "args": [key] });
        Ok(non_empty(self.post(&["execute", "sync"], &body).await?))
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        self.post(&["url"], &json!({ "url": url })).await?;
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        let value = call(self.client.get(self.url(&["url"])?)).await?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| BrowserError::Protocol("current URL is not a string".into()))
    }

    async fn local_storage_item(&self, key: &str) -> BrowserResult<Option<String>> {
        self.storage_item("localStorage", key).await
    }

    async fn session_storage_item(&self, key: &str) -> BrowserResult<Option<String>> {
        self.storage_item("sessionStorage", key).await
    }

    async fn close(self: Box<Self>) -> BrowserResult<()> {
        let result = call(self.client.delete(self.url(&[])?)).await;
        match result {
            Ok(_) => {
                debug!("Closed WebDriver session {}", self.session_id);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to close WebDriver session {}: {}", self.session_id, e);
                Err(e)
            }
        }
    }
}
