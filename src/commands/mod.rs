//! Subcommand implementations

use anyhow::{Context, Result};
use option_chain_pipeline::Config;
use tokio::runtime::Runtime;
use tracing::info;

use crate::ChainArgs;
use option_chain_pipeline::TradingInputs;

pub mod diagnose;
pub mod fetch;
pub mod init;
pub mod watch;

fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")
}

fn load_config(config_path: &str) -> Result<Config> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    info!("Loaded configuration from: {}", config_path);
    Ok(config)
}

impl ChainArgs {
    fn inputs(&self) -> TradingInputs {
        TradingInputs::new(
            self.symbol.to_uppercase(),
            &self.option_expiry,
            &self.future_expiry,
            self.chain_length,
        )
    }
}
