//! Integration tests for the option chain pipeline
//!
//! These tests drive the orchestrator end to end against offline components
//! and an in-memory spreadsheet engine.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use option_chain_pipeline::backend::{
    Attachment, CellValue, ComputeBackendAdapter, ComputeEngine, ConnectAttempt, EngineConnector,
    SyntheticChainGenerator,
};
use option_chain_pipeline::common::ReadinessPoll;
use option_chain_pipeline::config::{Config, MarketSession};
use option_chain_pipeline::credentials::{CredentialAcquirer, CredentialCache, LoginSettings};
use option_chain_pipeline::error::{EngineError, EngineResult};
use option_chain_pipeline::{
    AcquisitionOrchestrator, BackendMode, Credential, CredentialOrigin, DataSource, PipelineError,
    ProcessLifecycleManager, TradingInputs, MAX_CHAIN_LENGTH,
};

// =============================================================================
// Test Utilities
// =============================================================================

/// Shared state of the in-memory workbook
#[derive(Default)]
struct Sheet {
    cells: HashMap<String, CellValue>,
    output: Vec<Vec<CellValue>>,
    underlying: Option<f64>,
    symbol_list: Option<String>,
    calculations: usize,
    released: usize,
    fail_reads: bool,
    fail_writes: bool,
}

struct FakeEngine {
    sheet: Arc<Mutex<Sheet>>,
}

#[async_trait]
impl ComputeEngine for FakeEngine {
    fn workbook_name(&self) -> &str {
        "SmartOptionChainExcel_Zerodha.xlsm"
    }

    async fn write_cell(&self, address: &str, value: CellValue) -> EngineResult<()> {
        let mut sheet = self.sheet.lock().unwrap();
        if sheet.fail_writes {
            return Err(EngineError::Protocol(format!("{} is locked", address)));
        }
        sheet.cells.insert(address.to_string(), value);
        Ok(())
    }

    async fn read_range(&self, address: &str) -> EngineResult<Vec<Vec<CellValue>>> {
        let sheet = self.sheet.lock().unwrap();
        if sheet.fail_reads {
            return Err(EngineError::Unreachable("bridge went away".into()));
        }
        if address.starts_with("A10:") {
            Ok(sheet.output.clone())
        } else if address == "F2" {
            let cell = sheet.underlying.map(CellValue::Number).unwrap_or(CellValue::Empty);
            Ok(vec![vec![cell]])
        } else {
            Ok(vec![vec![sheet.cells.get(address).cloned().unwrap_or(CellValue::Empty)]])
        }
    }

    async fn calculate(&self) -> EngineResult<()> {
        self.sheet.lock().unwrap().calculations += 1;
        Ok(())
    }

    async fn calculation_done(&self) -> EngineResult<bool> {
        Ok(true)
    }

    async fn validation_formula(&self, _address: &str) -> EngineResult<Option<String>> {
        Ok(self.sheet.lock().unwrap().symbol_list.clone())
    }

    async fn release(&self) -> EngineResult<()> {
        self.sheet.lock().unwrap().released += 1;
        Ok(())
    }
}

struct FakeConnector {
    sheet: Arc<Mutex<Sheet>>,
}

#[async_trait]
impl EngineConnector for FakeConnector {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn connect(&self, _workbook: &Path) -> EngineResult<(Box<dyn ComputeEngine>, Attachment)> {
        let engine = FakeEngine {
            sheet: self.sheet.clone(),
        };
        Ok((Box::new(engine), Attachment::Reused))
    }
}

struct DownConnector;

#[async_trait]
impl EngineConnector for DownConnector {
    fn name(&self) -> &str {
        "down"
    }

    async fn connect(&self, _workbook: &Path) -> EngineResult<(Box<dyn ComputeEngine>, Attachment)> {
        Err(EngineError::Unreachable("connection refused".into()))
    }
}

fn num(n: f64) -> CellValue {
    CellValue::Number(n)
}

fn output_row(strike: f64) -> Vec<CellValue> {
    vec![
        num(strike),
        num(120.456),
        num(1500.0),
        num(42000.0),
        num(80.1),
        num(900.0),
        num(38000.0),
    ]
}

fn offline_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.worker.exe_path = dir.path().join("SmartOptionChainExcel.exe");
    config.worker.kill_existing = false;
    config.credentials.cache_path = dir.path().join("token_cache.json");
    config.credentials.webdriver_url = None;
    config.backend.workbook_path = dir.path().join("SmartOptionChainExcel_Zerodha.xlsm");
    config.backend.bridge_url = None;
    config
}

fn cache_for(config: &Config) -> CredentialCache {
    CredentialCache::from_config(&config.credentials)
}

/// Orchestrator whose backend talks to the in-memory sheet
fn live_orchestrator(dir: &TempDir, sheet: Arc<Mutex<Sheet>>) -> AcquisitionOrchestrator {
    let config = offline_config(dir);
    std::fs::write(&config.backend.workbook_path, b"xlsm").unwrap();

    let connectors: Vec<Box<dyn EngineConnector>> =
        vec![Box::new(DownConnector), Box::new(FakeConnector { sheet })];
    let backend = ComputeBackendAdapter::new(&config.backend.workbook_path, connectors)
        .with_generator(SyntheticChainGenerator::with_seed(7))
        .with_recalc_poll(ReadinessPoll::new(
            Duration::from_millis(50),
            Duration::from_millis(5),
            Duration::from_millis(5),
        ));
    let acquirer = CredentialAcquirer::new(
        cache_for(&config),
        None,
        LoginSettings::from_config(&config.credentials),
    );

    AcquisitionOrchestrator::new(
        ProcessLifecycleManager::new(config.worker.clone()),
        acquirer,
        backend,
        MarketSession::default(),
    )
}

fn assert_strictly_increasing(strikes: &[Decimal]) {
    for pair in strikes.windows(2) {
        assert!(pair[0] < pair[1], "strikes not increasing: {:?}", strikes);
    }
}

// =============================================================================
// Initialization
// =============================================================================

#[tokio::test]
async fn test_full_fallback_chain_initializes() {
    let dir = TempDir::new().unwrap();
    let mut orch = AcquisitionOrchestrator::from_config(&offline_config(&dir)).unwrap();

    assert!(orch.initialize_system().await);
    assert!(orch.is_ready());

    let report = orch.init_report().unwrap();
    assert!(!report.process_started);
    assert_eq!(report.credential_origin, CredentialOrigin::Placeholder);
    assert_eq!(report.backend_mode, BackendMode::Degraded);

    orch.cleanup().await;
}

#[tokio::test]
async fn test_stale_cache_is_ignored() {
    let dir = TempDir::new().unwrap();
    let config = offline_config(&dir);
    cache_for(&config).save(&Credential::new(
        "nine-hours-old",
        "AB1234",
        Utc::now() - ChronoDuration::hours(9),
    ));

    let mut orch = AcquisitionOrchestrator::from_config(&config).unwrap();
    assert!(orch.initialize_system().await);
    assert_eq!(
        orch.init_report().unwrap().credential_origin,
        CredentialOrigin::Placeholder
    );
    orch.cleanup().await;
}

#[tokio::test]
async fn test_fresh_cache_credential_reaches_engine() {
    let dir = TempDir::new().unwrap();
    let sheet = Arc::new(Mutex::new(Sheet {
        symbol_list: Some("=NIFTY,BANKNIFTY".into()),
        ..Default::default()
    }));
    let config = offline_config(&dir);
    cache_for(&config).save(&Credential::new(
        "cached-token",
        "AB1234",
        Utc::now() - ChronoDuration::hours(2),
    ));

    let mut orch = live_orchestrator(&dir, sheet.clone());
    assert!(orch.initialize_system().await);

    let report = orch.init_report().unwrap();
    assert_eq!(report.credential_origin, CredentialOrigin::Cache);
    assert_eq!(report.backend_mode, BackendMode::Live);

    {
        let sheet = sheet.lock().unwrap();
        assert_eq!(sheet.cells.get("F587"), Some(&CellValue::Text("AB1234".into())));
        assert_eq!(sheet.cells.get("F615"), Some(&CellValue::Text("cached-token".into())));
    }
    assert_eq!(orch.dropdown_options().symbols, vec!["NIFTY", "BANKNIFTY"]);

    // The failing connector is tried first and recorded
    let attempts = orch.backend().last_attempts();
    assert!(matches!(attempts[0], ConnectAttempt::Failed { .. }));
    assert!(matches!(attempts[1], ConnectAttempt::Connected { .. }));

    orch.cleanup().await;
    orch.cleanup().await;
    assert_eq!(sheet.lock().unwrap().released, 1);
}

// =============================================================================
// Fetching
// =============================================================================

#[tokio::test]
async fn test_fetch_before_initialize_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut orch = AcquisitionOrchestrator::from_config(&offline_config(&dir)).unwrap();

    let result = orch
        .fetch_option_data(TradingInputs::new("NIFTY", "30Nov2023", "30Nov2023", 4))
        .await;
    assert!(matches!(result, Err(PipelineError::NotInitialized)));
    assert!(orch.last_result().is_none());
}

#[tokio::test]
async fn test_oversized_chain_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut orch = AcquisitionOrchestrator::from_config(&offline_config(&dir)).unwrap();
    assert!(orch.initialize_system().await);

    for length in [MAX_CHAIN_LENGTH + 1, u32::MAX] {
        let result = orch
            .fetch_option_data(TradingInputs::new("NIFTY", "30Nov2023", "30Nov2023", length))
            .await;
        assert!(matches!(result, Err(PipelineError::InvalidInputs(_))));
    }
    assert!(orch.last_result().is_none());

    let longest = orch
        .fetch_option_data(TradingInputs::new("MIDCPNIFTY", "30Nov2023", "30Nov2023", MAX_CHAIN_LENGTH))
        .await
        .unwrap();
    assert_eq!(longest.chain.len(), MAX_CHAIN_LENGTH as usize);
    assert!(longest.chain[0].strike > Decimal::ZERO);

    orch.cleanup().await;
}

#[tokio::test]
async fn test_degraded_nifty_scenario() {
    let dir = TempDir::new().unwrap();
    let mut orch = AcquisitionOrchestrator::from_config(&offline_config(&dir)).unwrap();
    assert!(orch.initialize_system().await);

    let result = orch
        .fetch_option_data(TradingInputs::new("NIFTY", "30Nov2023", "30Nov2023", 4))
        .await
        .unwrap();

    assert_eq!(result.data_source, DataSource::Synthetic);
    assert_eq!(result.underlying_price, dec!(19500));
    let strikes: Vec<Decimal> = result.chain.iter().map(|r| r.strike).collect();
    assert_eq!(strikes, vec![dec!(19400), dec!(19450), dec!(19500), dec!(19550)]);
    assert_eq!(result.inputs.symbol.as_str(), "NIFTY");

    orch.cleanup().await;
}

#[tokio::test]
async fn test_degraded_chains_hold_invariants() {
    let dir = TempDir::new().unwrap();
    let mut orch = AcquisitionOrchestrator::from_config(&offline_config(&dir)).unwrap();
    assert!(orch.initialize_system().await);

    for (symbol, length) in [("NIFTY", 1), ("BANKNIFTY", 7), ("FINNIFTY", 20), ("SENSEX", 41)] {
        let result = orch
            .fetch_option_data(TradingInputs::new(symbol, "07Dec2023", "28Dec2023", length))
            .await
            .unwrap();
        assert_eq!(result.chain.len(), length as usize);

        let strikes: Vec<Decimal> = result.chain.iter().map(|r| r.strike).collect();
        assert_strictly_increasing(&strikes);

        for row in &result.chain {
            for premium in [row.call_ltp, row.put_ltp] {
                assert!(premium >= dec!(0.05));
                assert_eq!(premium, premium.round_dp(2));
            }
            assert!(row.call_volume > 0 && row.put_oi > 0);
        }
    }
    orch.cleanup().await;
}

#[tokio::test]
async fn test_live_rows_with_blank_strikes_are_dropped() {
    let dir = TempDir::new().unwrap();
    let sheet = Arc::new(Mutex::new(Sheet {
        output: vec![
            output_row(19500.0),
            vec![CellValue::Empty; 7],
            output_row(19400.0),
            vec![CellValue::Text("  ".into()), num(1.0)],
        ],
        underlying: Some(19487.35),
        ..Default::default()
    }));

    let mut orch = live_orchestrator(&dir, sheet.clone());
    assert!(orch.initialize_system().await);

    let result = orch
        .fetch_option_data(TradingInputs::new("NIFTY", "30Nov2023", "30Nov2023", 4))
        .await
        .unwrap();

    assert_eq!(result.data_source, DataSource::Live);
    assert_eq!(result.underlying_price, dec!(19487.35));
    let strikes: Vec<Decimal> = result.chain.iter().map(|r| r.strike).collect();
    assert_eq!(strikes, vec![dec!(19400), dec!(19500)]);
    assert_eq!(result.chain[0].call_ltp, dec!(120.46));

    let sheet_state = sheet.lock().unwrap();
    assert_eq!(sheet_state.cells.get("B2"), Some(&CellValue::Text("NIFTY".into())));
    assert_eq!(sheet_state.cells.get("B6"), Some(&CellValue::Number(4.0)));
    assert_eq!(sheet_state.calculations, 1);
}

#[tokio::test]
async fn test_all_blank_region_falls_back_to_synthetic() {
    let dir = TempDir::new().unwrap();
    let sheet = Arc::new(Mutex::new(Sheet {
        output: vec![vec![CellValue::Empty; 7]; 5],
        ..Default::default()
    }));

    let mut orch = live_orchestrator(&dir, sheet);
    assert!(orch.initialize_system().await);

    let result = orch
        .fetch_option_data(TradingInputs::new("BANKNIFTY", "30Nov2023", "30Nov2023", 5))
        .await
        .unwrap();
    assert_eq!(result.data_source, DataSource::Synthetic);
    assert_eq!(result.chain.len(), 5);
    assert_eq!(result.chain[1].strike - result.chain[0].strike, dec!(100));
}

#[tokio::test]
async fn test_region_read_failure_falls_back_to_synthetic() {
    let dir = TempDir::new().unwrap();
    let sheet = Arc::new(Mutex::new(Sheet {
        output: vec![output_row(19500.0)],
        underlying: Some(19487.35),
        ..Default::default()
    }));

    let mut orch = live_orchestrator(&dir, sheet.clone());
    assert!(orch.initialize_system().await);
    assert_eq!(orch.init_report().unwrap().backend_mode, BackendMode::Live);
    sheet.lock().unwrap().fail_reads = true;

    let result = orch
        .fetch_option_data(TradingInputs::new("NIFTY", "30Nov2023", "30Nov2023", 4))
        .await
        .unwrap();
    assert_eq!(result.data_source, DataSource::Synthetic);
    assert_eq!(result.underlying_price, dec!(19500));
    let strikes: Vec<Decimal> = result.chain.iter().map(|r| r.strike).collect();
    assert_eq!(strikes, vec![dec!(19400), dec!(19450), dec!(19500), dec!(19550)]);
}

#[tokio::test]
async fn test_input_write_failure_is_absorbed() {
    let dir = TempDir::new().unwrap();
    let sheet = Arc::new(Mutex::new(Sheet {
        output: vec![output_row(19400.0), output_row(19500.0)],
        underlying: Some(19487.35),
        ..Default::default()
    }));

    let mut orch = live_orchestrator(&dir, sheet.clone());
    assert!(orch.initialize_system().await);
    sheet.lock().unwrap().fail_writes = true;

    let result = orch
        .fetch_option_data(TradingInputs::new("NIFTY", "30Nov2023", "30Nov2023", 2))
        .await
        .unwrap();

    // Prior sheet state is read back as-is
    assert_eq!(result.data_source, DataSource::Live);
    assert_eq!(result.chain.len(), 2);
    let sheet_state = sheet.lock().unwrap();
    assert!(sheet_state.cells.get("B2").is_none());
    assert!(sheet_state.cells.get("B6").is_none());
    assert_eq!(sheet_state.calculations, 0);
}

#[tokio::test]
async fn test_missing_underlying_price_uses_base_price() {
    let dir = TempDir::new().unwrap();
    let sheet = Arc::new(Mutex::new(Sheet {
        output: vec![output_row(44900.0), output_row(45000.0), output_row(45100.0)],
        underlying: None,
        ..Default::default()
    }));

    let mut orch = live_orchestrator(&dir, sheet);
    assert!(orch.initialize_system().await);

    let result = orch
        .fetch_option_data(TradingInputs::new("BANKNIFTY", "30Nov2023", "30Nov2023", 3))
        .await
        .unwrap();
    assert_eq!(result.data_source, DataSource::Live);
    assert_eq!(result.underlying_price, dec!(45000));
    assert_eq!(result.chain[0].strike, dec!(44900));
}

// =============================================================================
// Cleanup
// =============================================================================

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut orch = AcquisitionOrchestrator::from_config(&offline_config(&dir)).unwrap();
    assert!(orch.initialize_system().await);

    orch.cleanup().await;
    orch.cleanup().await;
    assert!(!orch.is_ready());
    assert!(!orch.status().system_initialized);

    // Can be brought back up after cleanup
    assert!(orch.initialize_system().await);
    orch.cleanup().await;
}

#[test]
fn test_cache_path_override_from_config() {
    let dir = TempDir::new().unwrap();
    let config = offline_config(&dir);
    let expected: PathBuf = dir.path().join("token_cache.json");
    assert_eq!(cache_for(&config).path(), expected.as_path());
}
