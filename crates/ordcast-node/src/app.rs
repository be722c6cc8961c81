//! Application driver: feeds timed payloads into one node.
//!
//! Payloads travel as `app:` submissions on a local connection. The node
//! wraps each one into a fresh broadcast, so the submission timestamp is
//! irrelevant and always sent as zero.

use std::net::SocketAddr;
use std::time::Duration;

use ordcast_core::{Message, ProcessId};
use ordcast_transfer::{TcpTransport, TransportConfig};
use tracing::{debug, info};

use crate::config::DEFAULT_CONNECT_TIMEOUT;
use crate::error::Result;

/// Driver settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Index of the node being driven
    pub index: ProcessId,
    /// That node's endpoint
    pub target: SocketAddr,
    /// Number of payloads to submit
    pub count: usize,
    /// Pause between submissions
    pub interval: Duration,
    /// Pause before the first submission
    pub start_delay: Duration,
    pub connect_timeout: Duration,
}

impl AppConfig {
    pub fn new(index: ProcessId, target: SocketAddr) -> Self {
        Self {
            index,
            target,
            count: 5,
            interval: Duration::from_millis(100),
            start_delay: Duration::ZERO,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }
}

/// Submits `count` payloads to one node at a fixed interval.
#[derive(Debug, Clone)]
pub struct AppDriver {
    config: AppConfig,
    transport: TcpTransport,
}

impl AppDriver {
    pub fn new(config: AppConfig) -> Self {
        let transport = TcpTransport::new(
            TransportConfig::new(Default::default()).with_connect_timeout(config.connect_timeout),
        );
        Self { config, transport }
    }

    /// Payload for submission `seq` from node `index`.
    pub fn payload(index: ProcessId, seq: usize) -> String {
        format!("msg-{seq}-from-{index}")
    }

    /// Submit every payload. Returns how many were sent.
    pub async fn run(&self) -> Result<usize> {
        let AppConfig {
            index,
            target,
            count,
            interval,
            start_delay,
            ..
        } = self.config;

        if !start_delay.is_zero() {
            tokio::time::sleep(start_delay).await;
        }

        for seq in 0..count {
            if seq > 0 {
                tokio::time::sleep(interval).await;
            }
            let payload = Self::payload(index, seq);
            let frame = Message::app_submission(index, 0, payload.as_str()).encode();
            self.transport.send_raw(target, &frame).await?;
            debug!(%index, %target, %payload, "submitted");
        }

        info!(%index, count, "application driver finished");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use ordcast_core::{Inbox, MessageKind};
    use ordcast_transfer::{InboxConfig, TcpInbox};

    use super::*;

    #[test]
    fn payloads_are_distinct_per_node() {
        assert_eq!(AppDriver::payload(ProcessId(2), 0), "msg-0-from-2");
        assert_ne!(
            AppDriver::payload(ProcessId(1), 3),
            AppDriver::payload(ProcessId(2), 3)
        );
    }

    #[tokio::test]
    async fn submits_app_frames_in_order() {
        let mut inbox = TcpInbox::bind(
            "127.0.0.1:0".parse().unwrap(),
            InboxConfig::default().with_idle_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
        let target = inbox.local_addr().unwrap();

        let driver = AppDriver::new(
            AppConfig::new(ProcessId(3), target)
                .with_count(3)
                .with_interval(Duration::from_millis(10)),
        );
        assert_eq!(driver.run().await.unwrap(), 3);

        for seq in 0..3 {
            let frame = inbox.receive_next().await.unwrap();
            let msg = Message::decode(&frame).unwrap();
            assert_eq!(msg.sender(), ProcessId(3));
            assert_eq!(
                msg.kind(),
                &MessageKind::AppSubmission {
                    payload: AppDriver::payload(ProcessId(3), seq)
                }
            );
        }
    }
}
