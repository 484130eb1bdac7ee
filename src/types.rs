//! Core data types shared across the acquisition pipeline

use chrono::{DateTime, Duration, Local, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PipelineError;

/// Token carried by the placeholder credential.
pub const PLACEHOLDER_TOKEN: &str = "demo_token_12345";

/// Index symbols offered when the compute engine provides no list of its own.
pub const DEFAULT_SYMBOLS: [&str; 4] = ["NIFTY", "BANKNIFTY", "FINNIFTY", "MIDCPNIFTY"];

/// Longest chain a fetch may request. Keeps every synthetic strike positive
/// and the engine output region bounded.
pub const MAX_CHAIN_LENGTH: u32 = 100;

/// Underlying symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time-boxed session credential for the broker.
///
/// Values are never mutated after creation; a refresh produces a new
/// credential that supersedes the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    enc_token: String,
    user_id: String,
    #[serde(rename = "timestamp")]
    issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        enc_token: impl Into<String>,
        user_id: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            enc_token: enc_token.into(),
            user_id: user_id.into(),
            issued_at,
        }
    }

    /// The clearly-marked demo credential used when nothing better is available
    pub fn placeholder(user_id: impl Into<String>) -> Self {
        Self::new(PLACEHOLDER_TOKEN, user_id, Utc::now())
    }

    pub fn enc_token(&self) -> &str {
        &self.enc_token
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn is_placeholder(&self) -> bool {
        self.enc_token == PLACEHOLDER_TOKEN
    }

    pub fn is_empty(&self) -> bool {
        self.enc_token.trim().is_empty()
    }

    /// Fresh while `now - issued_at < ttl`. A timestamp from the future is stale.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.issued_at);
        age >= Duration::zero() && age < ttl
    }

    /// Short SHA-256 fingerprint, safe to log in place of the token
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.enc_token.as_bytes());
        hex::encode(&digest[..6])
    }
}

/// Where the credential handed to the backend came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialOrigin {
    Cache,
    Live,
    Placeholder,
}

impl std::fmt::Display for CredentialOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialOrigin::Cache => write!(f, "cache"),
            CredentialOrigin::Live => write!(f, "live"),
            CredentialOrigin::Placeholder => write!(f, "placeholder"),
        }
    }
}

/// Parameters for one option-chain fetch.
///
/// Field names follow the `POST /fetch-data` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingInputs {
    pub symbol: Symbol,
    pub option_expiry: String,
    pub future_expiry: String,
    pub chain_length: u32,
}

impl TradingInputs {
    pub fn new(
        symbol: impl Into<String>,
        option_expiry: impl Into<String>,
        future_expiry: impl Into<String>,
        chain_length: u32,
    ) -> Self {
        Self {
            symbol: Symbol::new(symbol),
            option_expiry: option_expiry.into(),
            future_expiry: future_expiry.into(),
            chain_length,
        }
    }

    /// Boundary validation. The engine's dropdown lists are advisory and
    /// deliberately not consulted here.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.symbol.as_str().trim().is_empty() {
            return Err(PipelineError::InvalidInputs("symbol must not be empty".into()));
        }
        if self.option_expiry.trim().is_empty() {
            return Err(PipelineError::InvalidInputs(
                "option_expiry must not be empty".into(),
            ));
        }
        if self.future_expiry.trim().is_empty() {
            return Err(PipelineError::InvalidInputs(
                "future_expiry must not be empty".into(),
            ));
        }
        if self.chain_length == 0 {
            return Err(PipelineError::InvalidInputs(
                "chain_length must be a positive integer".into(),
            ));
        }
        if self.chain_length > MAX_CHAIN_LENGTH {
            return Err(PipelineError::InvalidInputs(format!(
                "chain_length must be at most {}",
                MAX_CHAIN_LENGTH
            )));
        }
        Ok(())
    }
}

/// One strike of an option chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionChainRow {
    #[serde(with = "rust_decimal::serde::float")]
    pub strike: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub call_ltp: Decimal,
    pub call_volume: u64,
    pub call_oi: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub put_ltp: Decimal,
    pub put_volume: u64,
    pub put_oi: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Synthetic,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Live => write!(f, "live"),
            DataSource::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Operating mode of the compute backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    Live,
    Degraded,
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendMode::Live => write!(f, "live"),
            BackendMode::Degraded => write!(f, "degraded"),
        }
    }
}

/// Result of one fetch. Each fetch produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub timestamp: DateTime<Local>,
    #[serde(flatten)]
    pub inputs: TradingInputs,
    #[serde(with = "rust_decimal::serde::float")]
    pub underlying_price: Decimal,
    #[serde(rename = "option_chain")]
    pub chain: Vec<OptionChainRow>,
    pub market_status: MarketStatus,
    pub data_source: DataSource,
}

/// Selectable parameter sets, advisory only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropdownOptions {
    pub symbols: Vec<String>,
    pub option_expiry: Vec<String>,
    pub future_expiry: Vec<String>,
}

impl DropdownOptions {
    /// Options served before the system has been initialized
    pub fn pre_init() -> Self {
        let expiries: Vec<String> = ["30Nov2023", "07Dec2023", "14Dec2023"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            option_expiry: expiries.clone(),
            future_expiry: expiries,
        }
    }
}

/// Outcome of a successful initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitReport {
    pub process_started: bool,
    pub credential_origin: CredentialOrigin,
    pub backend_mode: BackendMode,
    pub elapsed_ms: u64,
}

/// Status fields exposed by `GET /status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub system_initialized: bool,
    pub exe_running: bool,
    pub market_hours: bool,
    pub backend_mode: Option<BackendMode>,
    pub last_fetch_at: Option<DateTime<Local>>,
}
