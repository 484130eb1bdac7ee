//! Acquisition orchestrator
//!
//! Sequences worker start, credential acquisition and backend connection,
//! then serves option-chain fetches. An orchestrator is an owned context
//! value; mutating operations take `&mut self`, so callers sharing one across
//! tasks serialize access themselves (e.g. behind a `tokio::sync::Mutex`).

use anyhow::Result;
use chrono::{Local, NaiveTime};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::backend::ComputeBackendAdapter;
use crate::config::{Config, MarketSession};
use crate::credentials::CredentialAcquirer;
use crate::error::{PipelineError, PipelineResult};
use crate::process::ProcessLifecycleManager;
use crate::types::{
    DropdownOptions, FetchResult, InitReport, MarketStatus, SystemStatus, TradingInputs,
};

pub struct AcquisitionOrchestrator {
    process: ProcessLifecycleManager,
    acquirer: CredentialAcquirer,
    backend: ComputeBackendAdapter,
    market: MarketSession,
    ready: bool,
    init_report: Option<InitReport>,
    last_result: Option<FetchResult>,
}

impl AcquisitionOrchestrator {
    pub fn new(
        process: ProcessLifecycleManager,
        acquirer: CredentialAcquirer,
        backend: ComputeBackendAdapter,
        market: MarketSession,
    ) -> Self {
        Self {
            process,
            acquirer,
            backend,
            market,
            ready: false,
            init_report: None,
            last_result: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let market = config.market.session()?;
        Ok(Self::assemble(config, market))
    }

    fn assemble(config: &Config, market: MarketSession) -> Self {
        Self::new(
            ProcessLifecycleManager::new(config.worker.clone()),
            CredentialAcquirer::from_config(&config.credentials),
            ComputeBackendAdapter::from_config(&config.backend),
            market,
        )
    }

    /// Bring the pipeline up. `false` only on an unexpected internal failure.
    pub async fn initialize_system(&mut self) -> bool {
        info!("Starting initialization");
        match self.run_initialization().await {
            Ok(report) => {
                info!(
                    "System initialized in {} ms (worker: {}, credential: {}, backend: {})",
                    report.elapsed_ms,
                    if report.process_started { "running" } else { "absent" },
                    report.credential_origin,
                    report.backend_mode
                );
                self.init_report = Some(report);
                self.ready = true;
                true
            }
            Err(e) => {
                error!("Initialization failed: {}", e);
                self.ready = false;
                false
            }
        }
    }

    async fn run_initialization(&mut self) -> PipelineResult<InitReport> {
        let start = Instant::now();
        self.ready = false;

        let process_started = self.process.start().await;
        if !process_started {
            warn!("Worker not started, continuing");
        }

        let (credential, origin) = self.acquirer.obtain().await;
        if credential.is_empty() {
            return Err(PipelineError::Internal(
                "credential acquisition produced an empty token".into(),
            ));
        }

        self.backend.connect(&credential).await;

        Ok(InitReport {
            process_started,
            credential_origin: origin,
            backend_mode: self.backend.mode(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Fetch one option chain and keep it as the latest result
    pub async fn fetch_option_data(&mut self, inputs: TradingInputs) -> PipelineResult<FetchResult> {
        if !self.ready {
            return Err(PipelineError::NotInitialized);
        }
        inputs.validate()?;

        let start = Instant::now();
        self.backend.set_inputs(&inputs).await;
        self.backend.wait_for_recalculation().await;
        let raw = self.backend.read_output(&inputs).await;

        let timestamp = Local::now();
        let result = FetchResult {
            timestamp,
            market_status: market_status(&self.market, timestamp.time()),
            inputs,
            underlying_price: raw.underlying_price,
            chain: raw.rows,
            data_source: raw.source,
        };

        info!(
            "Fetched {} rows for {} ({}) in {} ms",
            result.chain.len(),
            result.inputs.symbol,
            result.data_source,
            start.elapsed().as_millis()
        );
        self.last_result = Some(result.clone());
        Ok(result)
    }

    /// Stop the worker and drop the backend session. Idempotent.
    pub async fn cleanup(&mut self) {
        self.ready = false;
        self.process.stop().await;
        self.backend.close().await;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_market_hours(&self) -> bool {
        self.is_market_hours_at(Local::now().time())
    }

    pub fn is_market_hours_at(&self, time: NaiveTime) -> bool {
        self.market.contains(time)
    }

    pub fn dropdown_options(&self) -> DropdownOptions {
        if self.ready {
            self.backend.dropdown_options().clone()
        } else {
            DropdownOptions::pre_init()
        }
    }

    pub fn status(&mut self) -> SystemStatus {
        SystemStatus {
            system_initialized: self.ready,
            exe_running: self.process.is_running(),
            market_hours: self.is_market_hours(),
            backend_mode: self.ready.then(|| self.backend.mode()),
            last_fetch_at: self.last_result.as_ref().map(|r| r.timestamp),
        }
    }

    pub fn last_result(&self) -> Option<&FetchResult> {
        self.last_result.as_ref()
    }

    pub fn init_report(&self) -> Option<&InitReport> {
        self.init_report.as_ref()
    }

    pub fn backend(&self) -> &ComputeBackendAdapter {
        &self.backend
    }
}

pub fn market_status(session: &MarketSession, time: NaiveTime) -> MarketStatus {
    if session.contains(time) {
        MarketStatus::Active
    } else {
        MarketStatus::Closed
    }
}

type OrchestratorFactory = Box<dyn Fn() -> AcquisitionOrchestrator + Send + Sync>;

/// One orchestrator per dashboard session
pub struct SessionRegistry {
    sessions: HashMap<String, AcquisitionOrchestrator>,
    factory: OrchestratorFactory,
}

impl SessionRegistry {
    pub fn new(factory: impl Fn() -> AcquisitionOrchestrator + Send + Sync + 'static) -> Self {
        Self {
            sessions: HashMap::new(),
            factory: Box::new(factory),
        }
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let market = config.market.session()?;
        Ok(Self::new(move || AcquisitionOrchestrator::assemble(&config, market)))
    }

    pub fn get_or_create(&mut self, session_id: &str) -> &mut AcquisitionOrchestrator {
        let factory = &self.factory;
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!("New orchestrator for session {}", session_id);
                factory()
            })
    }

    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut AcquisitionOrchestrator> {
        self.sessions.get_mut(session_id)
    }

    /// Clean up and forget a session. `false` if it did not exist.
    pub async fn remove(&mut self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some(mut orchestrator) => {
                orchestrator.cleanup().await;
                true
            }
            None => false,
        }
    }

    pub async fn cleanup_all(&mut self) {
        for (_, mut orchestrator) in self.sessions.drain() {
            orchestrator.cleanup().await;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
