//! Outbound TCP transport.
//!
//! Each frame travels on its own short-lived connection: connect, write the
//! frame, shut down the write half. The receiver reads to EOF, so no length
//! prefix is needed.
//!
//! Connecting retries with exponential backoff until `connect_timeout`
//! elapses; peers are allowed to come up late.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use ordcast_core::{ProcessId, SendError, Transport};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Exponential backoff between connect attempts.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// Delay after the first failed attempt.
    pub initial: Duration,
    /// Upper bound for a single delay.
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(2),
        }
    }
}

impl BackoffConfig {
    /// Delay to use after `current`.
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Listening endpoint of every process in the group
    pub endpoints: BTreeMap<ProcessId, SocketAddr>,
    /// Give up on a peer after this long
    pub connect_timeout: Duration,
    /// Delay schedule between connect attempts
    pub backoff: BackoffConfig,
}

impl TransportConfig {
    pub fn new(endpoints: BTreeMap<ProcessId, SocketAddr>) -> Self {
        Self {
            endpoints,
            connect_timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the backoff schedule.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

/// TCP implementation of [`Transport`].
#[derive(Debug, Clone)]
pub struct TcpTransport {
    config: TransportConfig,
}

impl TcpTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Configured endpoint of `peer`.
    pub fn endpoint(&self, peer: ProcessId) -> Result<SocketAddr> {
        self.config
            .endpoints
            .get(&peer)
            .copied()
            .ok_or(Error::UnknownPeer(peer))
    }

    /// Send one frame to `peer`'s configured endpoint.
    pub async fn send_frame(&self, peer: ProcessId, frame: &[u8]) -> Result<()> {
        let addr = self.endpoint(peer)?;
        self.send_raw(addr, frame).await
    }

    /// Send one frame to an explicit address.
    pub async fn send_raw(&self, addr: SocketAddr, frame: &[u8]) -> Result<()> {
        let mut stream = self.connect(addr).await?;
        stream.write_all(frame).await?;
        stream.shutdown().await?;
        trace!(%addr, len = frame.len(), "frame sent");
        Ok(())
    }

    async fn connect(&self, addr: SocketAddr) -> Result<TcpStream> {
        let timeout = self.config.connect_timeout;
        let deadline = Instant::now() + timeout;
        let mut delay = self.config.backoff.initial;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match tokio::time::timeout_at(deadline, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => debug!(%addr, attempts, error = %e, "connect failed"),
                Err(_) => debug!(%addr, attempts, "connect attempt hit deadline"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::ConnectTimeout {
                    addr,
                    attempts,
                    timeout,
                });
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = self.config.backoff.next(delay);
        }
    }
}

impl Transport for TcpTransport {
    async fn send_to(&self, peer: ProcessId, frame: Bytes) -> std::result::Result<(), SendError> {
        self.send_frame(peer, &frame)
            .await
            .map_err(|e| SendError::new(peer, e.to_string()))
    }
}
