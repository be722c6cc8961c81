//! Ordcast group harness
//!
//! Starts a node and an application driver for every member of a group file,
//! waits for all of them to exit, then checks that every node delivered the
//! same sequence. Exits non-zero on disagreement, on a failed child, or when
//! the group agreed on fewer messages than were submitted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use anyhow::Context;
use clap::Parser;
use ordcast_core::ProcessId;
use ordcast_node::{read_log, verify_run, GroupConfig};
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "ordcast-harness", version, about = "Run an ordcast group locally and check agreement")]
struct Cli {
    /// Group file mapping process index to endpoint
    #[arg(long, env = "ORDCAST_CONFIG")]
    config: PathBuf,

    /// Payloads each driver submits
    #[arg(long, env = "ORDCAST_APP_COUNT", default_value_t = 5)]
    count: usize,

    /// Milliseconds between submissions
    #[arg(long, env = "ORDCAST_APP_INTERVAL_MS", default_value_t = 100)]
    interval_ms: u64,

    /// Give the nodes this long to bind before drivers start
    #[arg(long, env = "ORDCAST_APP_START_DELAY_MS", default_value_t = 500)]
    start_delay_ms: u64,

    /// Idle timeout passed to each node
    #[arg(long, env = "ORDCAST_IDLE_TIMEOUT_SECS", default_value_t = 5)]
    idle_timeout_secs: u64,

    /// Directory for delivery logs
    #[arg(long, env = "ORDCAST_OUT_DIR", default_value = "ordcast-out")]
    out_dir: PathBuf,

    /// Directory holding the ordcast-node and ordcast-app binaries
    /// (defaults to this binary's directory)
    #[arg(long, env = "ORDCAST_BIN_DIR")]
    bin_dir: Option<PathBuf>,
}

fn sibling_dir() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("locating harness binary")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("harness binary has no parent directory")
}

fn spawn(program: &Path, args: &[String]) -> anyhow::Result<Child> {
    Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning {}", program.display()))
}

async fn wait_all(children: Vec<(String, Child)>) -> Vec<(String, ExitStatus)> {
    let mut failed = Vec::new();
    for (name, mut child) in children {
        match child.wait().await {
            Ok(status) if status.success() => info!(%name, "exited"),
            Ok(status) => {
                warn!(%name, %status, "exited with failure");
                failed.push((name, status));
            }
            Err(e) => error!(%name, error = %e, "wait failed"),
        }
    }
    failed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ordcast_logging::init();
    let cli = Cli::parse();

    let group = GroupConfig::load(&cli.config)
        .with_context(|| format!("loading group file {}", cli.config.display()))?;
    let bin_dir = match cli.bin_dir {
        Some(dir) => dir,
        None => sibling_dir()?,
    };
    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;

    let config_arg = cli.config.display().to_string();
    let log_path = |id: ProcessId| cli.out_dir.join(format!("{id}.log"));

    info!(members = group.len(), count = cli.count, "starting group");

    let mut nodes = Vec::new();
    let mut apps = Vec::new();
    for id in group.ids() {
        let node_args = vec![
            "--config".to_string(),
            config_arg.clone(),
            "--index".to_string(),
            id.to_string(),
            "--idle-timeout-secs".to_string(),
            cli.idle_timeout_secs.to_string(),
            "--deliveries".to_string(),
            log_path(id).display().to_string(),
        ];
        nodes.push((
            format!("node {id}"),
            spawn(&bin_dir.join("ordcast-node"), &node_args)?,
        ));

        let app_args = vec![
            "--config".to_string(),
            config_arg.clone(),
            "--index".to_string(),
            id.to_string(),
            "--count".to_string(),
            cli.count.to_string(),
            "--interval-ms".to_string(),
            cli.interval_ms.to_string(),
            "--start-delay-ms".to_string(),
            cli.start_delay_ms.to_string(),
        ];
        apps.push((
            format!("app {id}"),
            spawn(&bin_dir.join("ordcast-app"), &app_args)?,
        ));
    }

    let mut failed = wait_all(apps).await;
    failed.extend(wait_all(nodes).await);

    let mut logs = BTreeMap::new();
    for id in group.ids() {
        let path = log_path(id);
        let log = read_log(&path).with_context(|| format!("reading {}", path.display()))?;
        logs.insert(id, log);
    }

    let failed: Vec<String> = failed.into_iter().map(|(name, _)| name).collect();
    let agreement = verify_run(&logs, &failed, cli.count).context("group run failed")?;
    info!(
        processes = agreement.processes,
        delivered = agreement.delivered,
        "all processes agree"
    );
    println!(
        "{} processes agree on {} deliveries",
        agreement.processes, agreement.delivered
    );
    Ok(())
}
