//! Ordcast node binary
//!
//! Runs one member of a broadcast group until its inbox goes idle.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ordcast_core::{ClockRule, ProcessId};
use ordcast_node::{GroupConfig, Node, NodeConfig};

#[derive(Debug, Parser)]
#[command(name = "ordcast-node", version, about = "Run one member of an ordcast group")]
struct Cli {
    /// Group file mapping process index to endpoint
    #[arg(long, env = "ORDCAST_CONFIG")]
    config: PathBuf,

    /// This node's index in the group file
    #[arg(long, env = "ORDCAST_INDEX")]
    index: u64,

    /// Shut down after this many seconds without traffic
    #[arg(long, env = "ORDCAST_IDLE_TIMEOUT_SECS", default_value_t = 30)]
    idle_timeout_secs: u64,

    /// Give up on an unreachable peer after this many seconds
    #[arg(long, env = "ORDCAST_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    connect_timeout_secs: u64,

    /// Logical clock rule: lamport or increment
    #[arg(long, env = "ORDCAST_CLOCK_RULE", default_value_t = ClockRule::Lamport)]
    clock_rule: ClockRule,

    /// Write the delivery log here
    #[arg(long, env = "ORDCAST_DELIVERIES")]
    deliveries: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ordcast_logging::init();
    let cli = Cli::parse();

    let group = GroupConfig::load(&cli.config)
        .with_context(|| format!("loading group file {}", cli.config.display()))?;
    let mut config = NodeConfig::new(ProcessId(cli.index), group)?
        .with_idle_timeout(Duration::from_secs(cli.idle_timeout_secs))
        .with_connect_timeout(Duration::from_secs(cli.connect_timeout_secs))
        .with_clock_rule(cli.clock_rule);
    if let Some(path) = cli.deliveries {
        config = config.with_deliveries(path);
    }

    tracing::info!(index = cli.index, "Starting ordcast node");

    let node = Node::new(config).await?;
    let report = node
        .run()
        .await
        .with_context(|| format!("process {} stopped", cli.index))?;

    tracing::info!(
        index = %report.index,
        shutdown = ?report.shutdown,
        delivered = report.delivered.len(),
        "ordcast node exiting"
    );
    Ok(())
}
