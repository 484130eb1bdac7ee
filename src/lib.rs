//! Option Chain Pipeline
//!
//! Resilient acquisition of option-chain data from a spreadsheet compute
//! engine fed by a broker session credential. Every external dependency has
//! a fallback:
//!
//! - **Worker process**: started if present, ignored if not
//! - **Credential**: cache, then automated browser login, then a placeholder
//! - **Compute engine**: live workbook, else synthetic chains (degraded mode)
//!
//! Only caller mistakes (fetching before initialization, malformed inputs)
//! surface as errors.
//!
//! ## Example
//! ```no_run
//! use option_chain_pipeline::{AcquisitionOrchestrator, Config, TradingInputs};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_or_default("configs/pipeline.json")?;
//!     let mut orchestrator = AcquisitionOrchestrator::from_config(&config)?;
//!     orchestrator.initialize_system().await;
//!
//!     let inputs = TradingInputs::new("NIFTY", "30Nov2023", "30Nov2023", 20);
//!     let result = orchestrator.fetch_option_data(inputs).await?;
//!     println!("{} rows from {}", result.chain.len(), result.data_source);
//!
//!     orchestrator.cleanup().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod common;
pub mod config;
pub mod credentials;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod process;
pub mod types;

pub use backend::ComputeBackendAdapter;
pub use config::Config;
pub use credentials::{CredentialAcquirer, CredentialCache};
pub use error::PipelineError;
pub use orchestrator::{AcquisitionOrchestrator, SessionRegistry};
pub use process::ProcessLifecycleManager;
pub use types::*;
