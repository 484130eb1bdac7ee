//! Fetch command implementation

use anyhow::{Context, Result};
use option_chain_pipeline::export::{to_json_pretty, write_exports};
use option_chain_pipeline::{AcquisitionOrchestrator, FetchResult};
use tracing::info;

use super::{build_runtime, load_config};
use crate::ChainArgs;

pub fn run(config_path: String, chain: ChainArgs, json: bool) -> Result<()> {
    let config = load_config(&config_path)?;
    let inputs = chain.inputs();
    let runtime = build_runtime()?;

    runtime.block_on(async {
        let mut orchestrator = AcquisitionOrchestrator::from_config(&config)?;
        if !orchestrator.initialize_system().await {
            orchestrator.cleanup().await;
            anyhow::bail!("Initialization failed, see log for details");
        }

        let fetched = orchestrator.fetch_option_data(inputs).await;
        orchestrator.cleanup().await;
        let result = fetched.context("Fetch rejected")?;

        if json {
            println!("{}", to_json_pretty(&result)?);
        } else {
            print_chain(&result);
        }

        if let Some(dir) = &chain.export_dir {
            let paths = write_exports(dir, &result)?;
            info!("Exported {} and {}", paths.json.display(), paths.csv.display());
        }
        Ok(())
    })
}

pub(crate) fn print_chain(result: &FetchResult) {
    println!("\n{}", "=".repeat(78));
    println!(
        "{} | option {} | future {} | spot {} | {} | {:?}",
        result.inputs.symbol,
        result.inputs.option_expiry,
        result.inputs.future_expiry,
        result.underlying_price,
        result.data_source,
        result.market_status
    );
    println!("{}", "=".repeat(78));
    println!(
        "{:>10} {:>10} {:>10} {:>10} | {:>10} {:>10} {:>10}",
        "CALL OI", "CALL VOL", "CALL LTP", "STRIKE", "PUT LTP", "PUT VOL", "PUT OI"
    );
    println!("{}", "-".repeat(78));
    for row in &result.chain {
        println!(
            "{:>10} {:>10} {:>10.2} {:>10} | {:>10.2} {:>10} {:>10}",
            row.call_oi,
            row.call_volume,
            row.call_ltp,
            row.strike,
            row.put_ltp,
            row.put_volume,
            row.put_oi
        );
    }
    println!("{}", "-".repeat(78));
    println!(
        "{} strikes at {}\n",
        result.chain.len(),
        result.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
}
