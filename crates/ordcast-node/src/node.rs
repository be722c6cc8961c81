//! One group member bound to TCP.

use std::net::SocketAddr;

use ordcast_core::{
    BroadcastProcess, Message, MessageId, ProcessConfig, ProcessId, Shutdown, Timestamp,
};
use ordcast_transfer::{InboxConfig, TcpInbox, TcpTransport, TransportConfig};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::NodeConfig;
use crate::deliveries;
use crate::error::Result;

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub index: ProcessId,
    pub shutdown: Shutdown,
    /// Keys in delivery order
    pub delivered: Vec<MessageId>,
    /// Messages still awaiting acknowledgments
    pub pending: usize,
    pub clock: Timestamp,
}

/// A [`BroadcastProcess`] wired to a [`TcpInbox`] and [`TcpTransport`].
#[derive(Debug)]
pub struct Node {
    config: NodeConfig,
    process: BroadcastProcess<TcpTransport>,
    inbox: TcpInbox,
}

impl Node {
    /// Bind this node's endpoint and build its process.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let addr = config.group.endpoint(config.index)?;
        let inbox = TcpInbox::bind(
            addr,
            InboxConfig::default().with_idle_timeout(config.idle_timeout),
        )
        .await?;

        let transport = TcpTransport::new(
            TransportConfig::new(config.group.endpoints()?)
                .with_connect_timeout(config.connect_timeout),
        );
        let process = BroadcastProcess::new(
            ProcessConfig::new(config.index, config.group.party())
                .with_clock_rule(config.clock_rule),
            transport,
        )?;

        info!(index = %config.index, %addr, members = config.group.len(), "node ready");
        Ok(Self {
            config,
            process,
            inbox,
        })
    }

    /// Forward every delivered message to `tx`.
    #[must_use]
    pub fn with_delivery_tx(mut self, tx: mpsc::UnboundedSender<Message>) -> Self {
        self.process = self.process.with_delivery_tx(tx);
        self
    }

    pub fn index(&self) -> ProcessId {
        self.config.index
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inbox.local_addr()?)
    }

    /// Run until the inbox goes idle or a peer becomes unreachable.
    ///
    /// The delivery log is written either way, so a failed node still leaves
    /// a record of what it delivered.
    pub async fn run(mut self) -> Result<NodeReport> {
        let outcome = self.process.run(&mut self.inbox).await;
        let delivered = self.process.delivered_log().to_vec();

        if let Some(path) = &self.config.deliveries {
            deliveries::write_log(path, &delivered)?;
        }

        let shutdown = match outcome {
            Ok(shutdown) => shutdown,
            Err(e) => {
                error!(index = %self.config.index, error = %e, "node failed");
                return Err(e.into());
            }
        };

        let report = NodeReport {
            index: self.config.index,
            shutdown,
            delivered,
            pending: self.process.queue().len(),
            clock: self.process.clock(),
        };
        info!(
            index = %report.index,
            delivered = report.delivered.len(),
            pending = report.pending,
            clock = report.clock,
            "node finished"
        );
        Ok(report)
    }
}
