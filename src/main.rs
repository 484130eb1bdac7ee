//! Option chain pipeline - main entry point
//!
//! This binary provides four subcommands:
//! - init: Bring the pipeline up once and report how it came up
//! - fetch: Fetch a single option chain
//! - watch: Fetch on an interval during market hours until Ctrl+C
//! - diagnose: Check files and endpoints the pipeline depends on

use anyhow::Result;
use clap::{Parser, Subcommand};
use option_chain_pipeline::MAX_CHAIN_LENGTH;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

const DEFAULT_CONFIG: &str = "configs/pipeline.json";

#[derive(Parser, Debug)]
#[command(name = "option-chain-pipeline")]
#[command(about = "Resilient option-chain acquisition with credential and compute fallbacks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ChainArgs {
    /// Underlying symbol
    #[arg(short, long, default_value = "NIFTY")]
    pub symbol: String,

    /// Option expiry (e.g. 30Nov2023)
    #[arg(long)]
    pub option_expiry: String,

    /// Future expiry (e.g. 30Nov2023)
    #[arg(long)]
    pub future_expiry: String,

    /// Number of strikes
    #[arg(
        short = 'n',
        long,
        default_value = "20",
        value_parser = clap::value_parser!(u32).range(1..=MAX_CHAIN_LENGTH as i64)
    )]
    pub chain_length: u32,

    /// Write JSON and CSV exports into this directory
    #[arg(long)]
    pub export_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the pipeline and print the init report
    Init {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },

    /// Fetch one option chain
    Fetch {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,

        #[command(flatten)]
        chain: ChainArgs,

        /// Print the result as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Fetch repeatedly until Ctrl+C
    Watch {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,

        #[command(flatten)]
        chain: ChainArgs,

        /// Seconds between fetches
        #[arg(long, default_value = "60")]
        interval: u64,

        /// Keep fetching outside market hours
        #[arg(long)]
        ignore_market_hours: bool,
    },

    /// Check required files and endpoints
    Diagnose {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);
    logging_subscriber(env_filter, file_appender, file_only).init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

/// Console plus file output, or file only when stdout carries JSON
fn logging_subscriber<W>(
    env_filter: EnvFilter,
    file_writer: W,
    file_only: bool,
) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    // Keep stdout clean for machine-readable output
    let console_layer = (!file_only).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Init { .. } => ("init", false),
        Commands::Fetch { json, .. } => ("fetch", *json),
        Commands::Watch { .. } => ("watch", false),
        Commands::Diagnose { .. } => ("diagnose", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Init { config } => commands::init::run(config),
        Commands::Fetch {
            config,
            chain,
            json,
        } => commands::fetch::run(config, chain, json),
        Commands::Watch {
            config,
            chain,
            interval,
            ignore_market_hours,
        } => commands::watch::run(config, chain, interval, ignore_market_hours),
        Commands::Diagnose { config } => commands::diagnose::run(config),
    }
}
