//! beaconcheck CLI - Main Entry Point
//!
//! Runs one analytics suite against the configured expectation source and
//! reports the verdicts.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

use beaconcheck_common::store::open_store;
use beaconcheck_common::{HarnessConfig, SuiteName};
use beaconcheck_e2e::{PlaywrightConfig, PlaywrightDriver, RunSummary, SuiteRunner};

mod output;

/// Suites selectable on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Suite {
    /// Batch capture; every case is compared against all beacons of the run
    Events,
    /// Per-case capture with a raw capture log
    Plain,
}

impl From<Suite> for SuiteName {
    fn from(suite: Suite) -> Self {
        match suite {
            Suite::Events => SuiteName::Events,
            Suite::Plain => SuiteName::Plain,
        }
    }
}

/// beaconcheck - analytics beacon verification
#[derive(Parser)]
#[command(name = "beaconcheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Suite to run
    #[arg(value_enum)]
    suite: Suite,

    /// Configuration file
    #[arg(short, long, default_value = "beaconcheck.toml", env = "BEACONCHECK_CONFIG")]
    config: PathBuf,

    /// Override the expectation source path
    #[arg(long)]
    source: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Output format
    #[arg(long, default_value = "table")]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match run(&cli).await {
        Ok(summary) => {
            output::print_summary(&summary, cli.format);
            if summary.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<RunSummary> {
    let mut config = HarnessConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(source) = &cli.source {
        config.source.path = source.clone();
    }
    if cli.headless {
        config.browser.headless = true;
    }
    debug!("Effective configuration: {:?}", config);

    let store = open_store(&config.source)
        .with_context(|| format!("opening {}", config.source.path.display()))?;
    let page = PlaywrightDriver::launch(PlaywrightConfig::from_harness(&config))
        .await
        .context("starting the browser")?;

    let suite = SuiteName::from(cli.suite);
    info!("beaconcheck v{} running '{}'", beaconcheck_common::VERSION, suite);
    let mut runner = SuiteRunner::new(suite, &config, store, Box::new(page))?;
    let summary = runner.run().await?;
    Ok(summary)
}
