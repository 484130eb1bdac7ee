//! Compute backend adapter
//!
//! Owns the engine session (the backend connection) and hides whether data
//! comes from the live workbook or the synthetic generator. Connection is
//! attempted through an ordered list of connectors; when none succeeds the
//! adapter enters degraded mode and serves synthetic chains. `connect` reports
//! success either way, the difference only shows in `DataSource` on results.

use itertools::Itertools;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bridge::HttpBridgeConnector;
use super::engine::{Attachment, CellValue, ComputeEngine, EngineConnector};
use super::expiry::weekly_expiries;
use super::layout;
use super::synthetic::{index_profile, SyntheticChainGenerator};
use crate::common::{PollOutcome, ReadinessPoll};
use crate::config::BackendConfig;
use crate::error::EngineResult;
use crate::types::{
    BackendMode, Credential, DataSource, DropdownOptions, OptionChainRow, TradingInputs,
    DEFAULT_SYMBOLS,
};

/// Chain as read from the backend, before it is wrapped into a fetch result
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    pub underlying_price: Decimal,
    pub rows: Vec<OptionChainRow>,
    pub source: DataSource,
}

/// Outcome of one connector in the connection sequence
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectAttempt {
    Connected {
        connector: String,
        attachment: Attachment,
    },
    Failed {
        connector: String,
        reason: String,
    },
    /// Degraded mode, terminal entry of every sequence
    Degraded { reason: String },
}

pub struct ComputeBackendAdapter {
    workbook_path: PathBuf,
    connectors: Vec<Box<dyn EngineConnector>>,
    engine: Option<Box<dyn ComputeEngine>>,
    dropdowns: DropdownOptions,
    generator: SyntheticChainGenerator,
    recalc_poll: ReadinessPoll,
    last_attempts: Vec<ConnectAttempt>,
}

impl ComputeBackendAdapter {
    pub fn new(workbook_path: impl Into<PathBuf>, connectors: Vec<Box<dyn EngineConnector>>) -> Self {
        Self {
            workbook_path: workbook_path.into(),
            connectors,
            engine: None,
            dropdowns: default_dropdowns(),
            generator: SyntheticChainGenerator::new(),
            recalc_poll: ReadinessPoll::default(),
            last_attempts: Vec::new(),
        }
    }

    /// Adapter with the HTTP bridge connector when a bridge URL is configured
    pub fn from_config(config: &BackendConfig) -> Self {
        let mut connectors: Vec<Box<dyn EngineConnector>> = Vec::new();
        if let Some(url) = &config.bridge_url {
            match HttpBridgeConnector::new(url, Duration::from_secs(config.request_timeout_secs)) {
                Ok(connector) => connectors.push(Box::new(connector)),
                Err(e) => warn!("Spreadsheet bridge disabled: {}", e),
            }
        }
        Self::new(&config.workbook_path, connectors).with_recalc_poll(config.recalc_poll())
    }

    pub fn with_generator(mut self, generator: SyntheticChainGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_recalc_poll(mut self, poll: ReadinessPoll) -> Self {
        self.recalc_poll = poll;
        self
    }

    pub fn mode(&self) -> BackendMode {
        if self.engine.is_some() {
            BackendMode::Live
        } else {
            BackendMode::Degraded
        }
    }

    pub fn dropdown_options(&self) -> &DropdownOptions {
        &self.dropdowns
    }

    /// Attempts made by the most recent `connect`, in order
    pub fn last_attempts(&self) -> &[ConnectAttempt] {
        &self.last_attempts
    }

    /// Attach to the engine and hand it the credential.
    ///
    /// Always returns `true`: any failure puts the adapter in degraded mode.
    pub async fn connect(&mut self, credential: &Credential) -> bool {
        self.close().await;
        self.last_attempts.clear();

        if !self.workbook_path.exists() {
            let reason = format!("workbook not found: {}", self.workbook_path.display());
            warn!("{}, using synthetic data", reason);
            self.enter_degraded(reason);
            return true;
        }

        let mut connected = None;
        for connector in &self.connectors {
            match connector.connect(&self.workbook_path).await {
                Ok((engine, attachment)) => {
                    info!(
                        "Engine session via {} ({:?}) on {}",
                        connector.name(),
                        attachment,
                        engine.workbook_name()
                    );
                    self.last_attempts.push(ConnectAttempt::Connected {
                        connector: connector.name().to_string(),
                        attachment,
                    });
                    connected = Some(engine);
                    break;
                }
                Err(e) => {
                    warn!("Connector {} failed: {}", connector.name(), e);
                    self.last_attempts.push(ConnectAttempt::Failed {
                        connector: connector.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let Some(engine) = connected else {
            self.enter_degraded("no engine connector succeeded".to_string());
            return true;
        };

        if let Err(e) = enter_credentials(engine.as_ref(), credential).await {
            warn!("Could not enter credentials: {}", e);
        } else {
            info!(
                "Credentials entered for {} (token {})",
                credential.user_id(),
                credential.fingerprint()
            );
        }

        self.dropdowns = default_dropdowns();
        match engine.validation_formula(layout::SYMBOL_CELL).await {
            Ok(Some(formula)) => {
                if let Some(symbols) = parse_validation_list(&formula) {
                    debug!("Symbols from workbook: {:?}", symbols);
                    self.dropdowns.symbols = symbols;
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Symbol validation list unavailable: {}", e),
        }

        self.engine = Some(engine);
        info!("Compute backend ready (live)");
        true
    }

    fn enter_degraded(&mut self, reason: String) {
        self.engine = None;
        self.dropdowns = default_dropdowns();
        info!("Compute backend in degraded mode: {}", reason);
        self.last_attempts.push(ConnectAttempt::Degraded { reason });
    }

    /// Write the inputs and trigger recalculation. No-op when degraded.
    pub async fn set_inputs(&mut self, inputs: &TradingInputs) {
        let Some(engine) = self.engine.as_deref() else {
            debug!("Degraded mode, not writing inputs for {}", inputs.symbol);
            return;
        };

        match write_inputs(engine, inputs).await {
            Ok(()) => info!("Inputs set: {}, {}", inputs.symbol, inputs.option_expiry),
            Err(e) => warn!("Input setting failed: {}", e),
        }
    }

    /// Wait for the engine to finish recalculating, bounded by the poll timeout
    pub async fn wait_for_recalculation(&self) -> PollOutcome {
        let Some(engine) = self.engine.as_deref() else {
            return PollOutcome::Ready {
                attempts: 0,
                elapsed: Duration::ZERO,
            };
        };

        let outcome = self
            .recalc_poll
            .wait_until(|| async move {
                match engine.calculation_done().await {
                    Ok(done) => done,
                    Err(e) => {
                        // Reading will fall back if the engine is really gone
                        debug!("Calculation state unavailable: {}", e);
                        true
                    }
                }
            })
            .await;

        if !outcome.is_ready() {
            warn!("Recalculation still running after {:?}, reading anyway", self.recalc_poll.timeout);
        }
        outcome
    }

    /// Read the chain for `inputs`; never empty.
    pub async fn read_output(&mut self, inputs: &TradingInputs) -> RawOutput {
        let Some(engine) = self.engine.as_deref() else {
            return synthetic_output(&mut self.generator, inputs);
        };

        let range = layout::output_range(inputs.chain_length);
        let values = match engine.read_range(&range).await {
            Ok(values) => values,
            Err(e) => {
                warn!("Data extraction failed: {}, using synthetic data", e);
                return synthetic_output(&mut self.generator, inputs);
            }
        };

        let rows = normalize_rows(parse_rows(&values));
        if rows.is_empty() {
            warn!("Output region {} is empty, using synthetic data", range);
            return synthetic_output(&mut self.generator, inputs);
        }

        let underlying_price = match engine.read_cell(layout::UNDERLYING_PRICE_CELL).await {
            Ok(cell) => cell.as_decimal(),
            Err(e) => {
                debug!("Underlying price unavailable: {}", e);
                None
            }
        }
        .unwrap_or_else(|| index_profile(inputs.symbol.as_str()).base_price);

        RawOutput {
            underlying_price,
            rows,
            source: DataSource::Live,
        }
    }

    /// Release the engine session. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.release().await {
                warn!("Engine release failed: {}", e);
            }
            info!("Compute backend connection closed");
        }
    }
}

async fn enter_credentials(engine: &dyn ComputeEngine, credential: &Credential) -> EngineResult<()> {
    engine
        .write_cell(layout::USER_ID_CELL, credential.user_id().into())
        .await?;
    engine
        .write_cell(layout::ENC_TOKEN_CELL, credential.enc_token().into())
        .await
}

async fn write_inputs(engine: &dyn ComputeEngine, inputs: &TradingInputs) -> EngineResult<()> {
    engine
        .write_cell(layout::SYMBOL_CELL, inputs.symbol.as_str().into())
        .await?;
    engine
        .write_cell(layout::OPTION_EXPIRY_CELL, inputs.option_expiry.as_str().into())
        .await?;
    engine
        .write_cell(layout::FUTURE_EXPIRY_CELL, inputs.future_expiry.as_str().into())
        .await?;
    engine
        .write_cell(layout::CHAIN_LENGTH_CELL, inputs.chain_length.into())
        .await?;
    engine.calculate().await
}

fn synthetic_output(generator: &mut SyntheticChainGenerator, inputs: &TradingInputs) -> RawOutput {
    let chain = generator.generate(&inputs.symbol, inputs.chain_length);
    RawOutput {
        underlying_price: chain.underlying_price,
        rows: chain.rows,
        source: DataSource::Synthetic,
    }
}

fn default_dropdowns() -> DropdownOptions {
    let expiries = weekly_expiries();
    DropdownOptions {
        symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
        option_expiry: expiries.clone(),
        future_expiry: expiries,
    }
}

/// Parse an inline list validation formula such as `="NIFTY","BANKNIFTY"`.
///
/// Range references (`=$H$1:$H$4`) are not inline lists and yield `None`.
pub fn parse_validation_list(formula: &str) -> Option<Vec<String>> {
    let body = formula.trim().trim_start_matches('=');
    if body.contains('$') || body.contains('!') || layout::is_valid_address(body) {
        return None;
    }

    let items: Vec<String> = body
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Turn the raw output region into rows. Rows without a strike are dropped,
/// other blank cells read as zero.
fn parse_rows(values: &[Vec<CellValue>]) -> Vec<OptionChainRow> {
    values
        .iter()
        .filter_map(|row| {
            let strike = row.first().and_then(CellValue::as_decimal)?;
            let price = |i: usize| {
                row.get(i)
                    .and_then(CellValue::as_decimal)
                    .map(|d| d.round_dp(2))
                    .unwrap_or(Decimal::ZERO)
            };
            let count = |i: usize| row.get(i).and_then(CellValue::as_u64).unwrap_or(0);
            Some(OptionChainRow {
                strike,
                call_ltp: price(1),
                call_volume: count(2),
                call_oi: count(3),
                put_ltp: price(4),
                put_volume: count(5),
                put_oi: count(6),
            })
        })
        .collect()
}

/// Sort by strike and drop duplicates so strikes are strictly increasing
fn normalize_rows(rows: Vec<OptionChainRow>) -> Vec<OptionChainRow> {
    rows.into_iter()
        .sorted_by_key(|row| row.strike)
        .dedup_by(|a, b| a.strike == b.strike)
        .collect()
}
