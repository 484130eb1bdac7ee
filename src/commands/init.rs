//! Init command implementation

use anyhow::Result;
use option_chain_pipeline::AcquisitionOrchestrator;
use tracing::info;

use super::{build_runtime, load_config};

pub fn run(config_path: String) -> Result<()> {
    let config = load_config(&config_path)?;
    let runtime = build_runtime()?;

    runtime.block_on(async {
        let mut orchestrator = AcquisitionOrchestrator::from_config(&config)?;
        if !orchestrator.initialize_system().await {
            orchestrator.cleanup().await;
            anyhow::bail!("Initialization failed, see log for details");
        }

        if let Some(report) = orchestrator.init_report() {
            println!("\n{}", "=".repeat(60));
            println!("INITIALIZATION REPORT");
            println!("{}", "=".repeat(60));
            println!("  Worker process:     {}", if report.process_started { "running" } else { "not started" });
            println!("  Credential source:  {}", report.credential_origin);
            println!("  Compute backend:    {}", report.backend_mode);
            println!("  Elapsed:            {} ms", report.elapsed_ms);
        }

        let options = orchestrator.dropdown_options();
        println!("{}", "-".repeat(60));
        println!("  Symbols:            {}", options.symbols.join(", "));
        println!(
            "  Option expiries:    {} (first {})",
            options.option_expiry.len(),
            options.option_expiry.first().map(String::as_str).unwrap_or("-")
        );
        println!(
            "  Future expiries:    {} (first {})",
            options.future_expiry.len(),
            options.future_expiry.first().map(String::as_str).unwrap_or("-")
        );
        println!("  Market hours:       {}", orchestrator.is_market_hours());
        println!("{}\n", "=".repeat(60));

        orchestrator.cleanup().await;
        info!("Init check complete");
        Ok(())
    })
}
