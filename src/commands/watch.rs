//! Watch command implementation
//!
//! Initializes once, then fetches on a fixed interval until Ctrl+C. Ctrl+C
//! also interrupts a fetch or initialization in flight; the pipeline is
//! cleaned up on every exit path.

use anyhow::Result;
use option_chain_pipeline::export::write_exports;
use option_chain_pipeline::AcquisitionOrchestrator;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use super::fetch::print_chain;
use super::{build_runtime, load_config};
use crate::ChainArgs;

pub fn run(
    config_path: String,
    chain: ChainArgs,
    interval_secs: u64,
    ignore_market_hours: bool,
) -> Result<()> {
    anyhow::ensure!(interval_secs > 0, "--interval must be at least 1 second");
    let config = load_config(&config_path)?;
    let runtime = build_runtime()?;

    runtime.block_on(async {
        let mut orchestrator = AcquisitionOrchestrator::from_config(&config)?;
        let result = watch_loop(&mut orchestrator, &chain, interval_secs, ignore_market_hours).await;
        orchestrator.cleanup().await;
        info!("Watch session ended");
        result
    })
}

async fn watch_loop(
    orchestrator: &mut AcquisitionOrchestrator,
    chain: &ChainArgs,
    interval_secs: u64,
    ignore_market_hours: bool,
) -> Result<()> {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => {
                error!("Error setting up signal handler: {}", e);
            }
        }
    });

    let initialized = tokio::select! {
        ok = orchestrator.initialize_system() => Some(ok),
        Some(()) = shutdown_rx.recv() => None,
    };
    match initialized {
        None => return Ok(()),
        Some(false) => anyhow::bail!("Initialization failed, see log for details"),
        Some(true) => {}
    }

    let inputs = chain.inputs();
    let mut ticker = interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Watching {} every {}s (market hours {})",
        inputs.symbol,
        interval_secs,
        if ignore_market_hours { "ignored" } else { "only" }
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            Some(()) = shutdown_rx.recv() => break,
        }

        if !ignore_market_hours && !orchestrator.is_market_hours() {
            info!("Outside market hours, skipping fetch");
            continue;
        }

        let fetched = tokio::select! {
            result = orchestrator.fetch_option_data(inputs.clone()) => Some(result),
            Some(()) = shutdown_rx.recv() => None,
        };

        match fetched {
            None => {
                warn!("Fetch interrupted by shutdown");
                break;
            }
            Some(Ok(result)) => {
                print_chain(&result);
                if let Some(dir) = &chain.export_dir {
                    if let Err(e) = write_exports(dir, &result) {
                        warn!("Export failed: {:#}", e);
                    }
                }
            }
            Some(Err(e)) => error!("Fetch failed: {}", e),
        }
    }

    Ok(())
}
