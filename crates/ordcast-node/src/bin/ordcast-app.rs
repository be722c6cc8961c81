//! Ordcast application driver
//!
//! Submits a fixed number of payloads to one node at a steady rate.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ordcast_core::ProcessId;
use ordcast_node::{AppConfig, AppDriver, GroupConfig};

#[derive(Debug, Parser)]
#[command(name = "ordcast-app", version, about = "Feed payloads into one ordcast node")]
struct Cli {
    /// Group file mapping process index to endpoint
    #[arg(long, env = "ORDCAST_CONFIG")]
    config: PathBuf,

    /// Index of the node to drive
    #[arg(long, env = "ORDCAST_INDEX")]
    index: u64,

    /// Number of payloads to submit
    #[arg(long, env = "ORDCAST_APP_COUNT", default_value_t = 5)]
    count: usize,

    /// Milliseconds between submissions
    #[arg(long, env = "ORDCAST_APP_INTERVAL_MS", default_value_t = 100)]
    interval_ms: u64,

    /// Milliseconds to wait before the first submission
    #[arg(long, env = "ORDCAST_APP_START_DELAY_MS", default_value_t = 0)]
    start_delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ordcast_logging::init();
    let cli = Cli::parse();

    let group = GroupConfig::load(&cli.config)
        .with_context(|| format!("loading group file {}", cli.config.display()))?;
    let index = ProcessId(cli.index);
    let target = group.endpoint(index)?;

    let driver = AppDriver::new(
        AppConfig::new(index, target)
            .with_count(cli.count)
            .with_interval(Duration::from_millis(cli.interval_ms))
            .with_start_delay(Duration::from_millis(cli.start_delay_ms)),
    );
    driver
        .run()
        .await
        .with_context(|| format!("driving process {index} at {target}"))?;
    Ok(())
}
