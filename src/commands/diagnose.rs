//! Diagnose command implementation

use anyhow::Result;
use option_chain_pipeline::diagnostics::run_diagnostics;
use tracing::info;

use super::{build_runtime, load_config};

pub fn run(config_path: String) -> Result<()> {
    let config = load_config(&config_path)?;
    let runtime = build_runtime()?;

    let report = runtime.block_on(run_diagnostics(&config));
    println!("\n{}", report);

    if report.is_healthy() {
        info!("Diagnostics passed");
        Ok(())
    } else {
        anyhow::bail!("Diagnostics found failing checks")
    }
}
