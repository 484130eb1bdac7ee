//! Error types for the acquisition pipeline
//!
//! Only [`PipelineError`] crosses the orchestrator boundary. Browser and
//! engine errors are absorbed by their components and turned into fallbacks.

use thiserror::Error;

/// Errors surfaced to callers of the orchestrator
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("system not initialized")]
    NotInitialized,

    #[error("invalid inputs: {0}")]
    InvalidInputs(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Browser automation failures (WebDriver transport or protocol)
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser automation unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("webdriver error: {0}")]
    Protocol(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for BrowserError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Compute engine failures
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workbook not found: {0}")]
    WorkbookMissing(String),

    #[error("engine unreachable: {0}")]
    Unreachable(String),

    #[error("engine protocol error: {0}")]
    Protocol(String),

    #[error("invalid cell address: {0}")]
    InvalidAddress(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Unreachable(err.to_string())
        } else {
            Self::Protocol(err.to_string())
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
pub type BrowserResult<T> = Result<T, BrowserError>;
pub type EngineResult<T> = Result<T, EngineError>;
