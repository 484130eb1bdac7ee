//! HTTP spreadsheet bridge client
//!
//! Talks to a small automation service running next to the spreadsheet
//! application. Endpoints (relative to the configured base URL):
//!
//! | Method | Path | Body / Response |
//! |---|---|---|
//! | GET  | `/workbooks` | `["Name.xlsm", ...]` |
//! | POST | `/workbooks/open` | `{"path"}` -> `{"name"}` |
//! | GET  | `/workbooks/{name}/range/{addr}` | `{"values": [[cell, ...], ...]}` |
//! | PUT  | `/workbooks/{name}/range/{addr}` | `{"value": cell}` |
//! | POST | `/workbooks/{name}/calculate` | |
//! | GET  | `/workbooks/{name}/calculation` | `{"done": bool}` |
//! | GET  | `/workbooks/{name}/validation/{addr}` | `{"formula": str or null}` |

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::engine::{Attachment, CellValue, ComputeEngine, EngineConnector};
use super::layout::is_valid_address;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct OpenResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CalculationResponse {
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    formula: Option<String>,
}

fn endpoint(base: &Url, segments: &[&str]) -> EngineResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| EngineError::Protocol(format!("base URL cannot have paths: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn checked_address(address: &str) -> EngineResult<&str> {
    if is_valid_address(address) {
        Ok(address)
    } else {
        Err(EngineError::InvalidAddress(address.to_string()))
    }
}

/// Connector that attaches to (or opens) the workbook through the bridge
pub struct HttpBridgeConnector {
    client: Client,
    base_url: Url,
}

impl HttpBridgeConnector {
    pub fn new(base_url: &str, timeout: Duration) -> EngineResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| EngineError::Protocol(format!("bad bridge URL {}: {}", base_url, e)))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Names of the workbooks currently open in the spreadsheet application
    pub async fn open_workbooks(&self) -> EngineResult<Vec<String>> {
        let url = endpoint(&self.base_url, &["workbooks"])?;
        let names = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<String>>()
            .await?;
        Ok(names)
    }

    async fn open_workbook(&self, path: &Path) -> EngineResult<String> {
        let url = endpoint(&self.base_url, &["workbooks", "open"])?;
        let response = self
            .client
            .post(url)
            .json(&json!({ "path": path.display().to_string() }))
            .send()
            .await?
            .error_for_status()?
            .json::<OpenResponse>()
            .await?;
        Ok(response.name)
    }
}

#[async_trait]
impl EngineConnector for HttpBridgeConnector {
    fn name(&self) -> &str {
        "http-bridge"
    }

    async fn connect(
        &self,
        workbook: &Path,
    ) -> EngineResult<(Box<dyn ComputeEngine>, Attachment)> {
        let file_name = workbook
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| EngineError::WorkbookMissing(workbook.display().to_string()))?
            .to_string();

        let open = self.open_workbooks().await?;
        let (name, attachment) = if open.iter().any(|n| n == &file_name) {
            info!("Attached to open workbook {}", file_name);
            (file_name, Attachment::Reused)
        } else {
            let absolute = std::fs::canonicalize(workbook)
                .map_err(|_| EngineError::WorkbookMissing(workbook.display().to_string()))?;
            let name = self.open_workbook(&absolute).await?;
            info!("Opened workbook {}", name);
            (name, Attachment::Opened)
        };

        let engine = BridgeEngine {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            workbook: name,
        };
        Ok((Box::new(engine), attachment))
    }
}

/// Engine session backed by the bridge
pub struct BridgeEngine {
    client: Client,
    base_url: Url,
    workbook: String,
}

impl BridgeEngine {
    fn workbook_endpoint(&self, tail: &[&str]) -> EngineResult<Url> {
        let mut segments = vec!["workbooks", self.workbook.as_str()];
        segments.extend_from_slice(tail);
        endpoint(&self.base_url, &segments)
    }
}

#[async_trait]
impl ComputeEngine for BridgeEngine {
    fn workbook_name(&self) -> &str {
        &self.workbook
    }

    async fn write_cell(&self, address: &str, value: CellValue) -> EngineResult<()> {
        let url = self.workbook_endpoint(&["range", checked_address(address)?])?;
        self.client
            .put(url)
            .json(&json!({ "value": value.to_json() }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn read_range(&self, address: &str) -> EngineResult<Vec<Vec<CellValue>>> {
        let url = self.workbook_endpoint(&["range", checked_address(address)?])?;
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<RangeResponse>()
            .await?;
        Ok(response
            .values
            .into_iter()
            .map(|row| row.into_iter().map(CellValue::from).collect())
            .collect())
    }

    async fn calculate(&self) -> EngineResult<()> {
        let url = self.workbook_endpoint(&["calculate"])?;
        self.client.post(url).send().await?.error_for_status()?;
        Ok(())
    }

    async fn calculation_done(&self) -> EngineResult<bool> {
        let url = self.workbook_endpoint(&["calculation"])?;
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<CalculationResponse>()
            .await?;
        Ok(response.done)
    }

    async fn validation_formula(&self, address: &str) -> EngineResult<Option<String>> {
        let url = self.workbook_endpoint(&["validation", checked_address(address)?])?;
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<ValidationResponse>()
            .await?;
        Ok(response.formula)
    }

    async fn release(&self) -> EngineResult<()> {
        // The bridge is stateless per request; the workbook stays open for the user
        debug!("Released bridge session for {}", self.workbook);
        Ok(())
    }
}
