//! Inbound TCP listener.
//!
//! One accepted connection carries one frame, read until the sender shuts
//! down its write half. Frames that are empty, oversized, or stall are
//! dropped with a warning; the listener keeps going.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use ordcast_core::{Inbox, InboxError};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default upper bound on a single frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Listener configuration
#[derive(Debug, Clone)]
pub struct InboxConfig {
    /// Stop waiting after this long without a frame
    pub idle_timeout: Duration,
    /// Give up on a connection that has not finished its frame after this long
    pub read_timeout: Duration,
    /// Pending connection queue length
    pub backlog: i32,
    /// Largest accepted frame in bytes
    pub max_frame_len: usize,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(5),
            backlog: 128,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl InboxConfig {
    /// Set the idle timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// TCP implementation of [`Inbox`].
#[derive(Debug)]
pub struct TcpInbox {
    listener: TcpListener,
    config: InboxConfig,
}

impl TcpInbox {
    /// Bind to `addr` with the configured backlog.
    pub async fn bind(addr: SocketAddr, config: InboxConfig) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

        // Allow quick restarts on the same port
        socket.set_reuse_address(true)?;

        socket.bind(&addr.into())?;
        socket.listen(config.backlog)?;
        socket.set_nonblocking(true)?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)?;

        info!(
            "TCP inbox bound to {} (idle_timeout={:?}, backlog={})",
            addr, config.idle_timeout, config.backlog
        );

        Ok(Self { listener, config })
    }

    /// Get the local address this inbox is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &InboxConfig {
        &self.config
    }

    async fn read_frame(&self, stream: TcpStream) -> Result<Bytes> {
        let max = self.config.max_frame_len;
        let mut buf = Vec::new();
        // One byte past the limit is enough to detect an oversized frame.
        let mut limited = stream.take(max as u64 + 1);
        tokio::time::timeout(self.config.read_timeout, limited.read_to_end(&mut buf))
            .await
            .map_err(|_| Error::ReadTimeout(self.config.read_timeout))??;

        if buf.len() > max {
            return Err(Error::FrameTooLarge {
                len: buf.len(),
                max,
            });
        }
        Ok(Bytes::from(buf))
    }
}

impl Inbox for TcpInbox {
    async fn receive_next(&mut self) -> std::result::Result<Bytes, InboxError> {
        let idle = self.config.idle_timeout;
        let deadline = Instant::now() + idle;

        loop {
            let (stream, from) = match tokio::time::timeout_at(deadline, self.listener.accept()).await {
                Err(_) => return Err(InboxError::Timeout(idle)),
                Ok(Err(e)) => {
                    warn!("Accept error: {}", e);
                    continue;
                }
                Ok(Ok(accepted)) => accepted,
            };

            match self.read_frame(stream).await {
                Ok(frame) if frame.is_empty() => debug!(%from, "empty frame ignored"),
                Ok(frame) => return Ok(frame),
                Err(e) => warn!(%from, error = %e, "dropping inbound frame"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ordcast_core::{ProcessId, Transport};
    use tokio::io::AsyncWriteExt;
    use tokio_test::assert_ok;

    use super::*;
    use crate::transport::{TcpTransport, TransportConfig};

    fn loopback_config(idle: Duration) -> InboxConfig {
        InboxConfig::default().with_idle_timeout(idle)
    }

    #[tokio::test]
    async fn test_inbox_creation() {
        let inbox = assert_ok!(
            TcpInbox::bind("127.0.0.1:0".parse().unwrap(), InboxConfig::default()).await
        );
        let addr = inbox.local_addr().unwrap();
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_send_recv() {
        let mut inbox = TcpInbox::bind(
            "127.0.0.1:0".parse().unwrap(),
            loopback_config(Duration::from_secs(5)),
        )
        .await
        .unwrap();
        let addr = inbox.local_addr().unwrap();

        let transport =
            TcpTransport::new(TransportConfig::new(BTreeMap::from([(ProcessId(2), addr)])));
        assert_ok!(transport.send_to(ProcessId(2), Bytes::from_static(b"1-1-a-b")).await);
        assert_ok!(transport.send_to(ProcessId(2), Bytes::from_static(b"1-2-c")).await);

        assert_eq!(inbox.receive_next().await.unwrap(), Bytes::from_static(b"1-1-a-b"));
        assert_eq!(inbox.receive_next().await.unwrap(), Bytes::from_static(b"1-2-c"));
    }

    #[tokio::test]
    async fn idle_inbox_times_out() {
        let mut inbox = TcpInbox::bind(
            "127.0.0.1:0".parse().unwrap(),
            loopback_config(Duration::from_millis(100)),
        )
        .await
        .unwrap();
        assert!(matches!(
            inbox.receive_next().await,
            Err(InboxError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn oversized_and_empty_frames_are_skipped() {
        let config = InboxConfig {
            max_frame_len: 8,
            ..loopback_config(Duration::from_secs(5))
        };
        let mut inbox = TcpInbox::bind("127.0.0.1:0".parse().unwrap(), config)
            .await
            .unwrap();
        let addr = inbox.local_addr().unwrap();

        for frame in [&b"0123456789abcdef"[..], b"", b"1-1-ok"] {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(frame).await.unwrap();
            stream.shutdown().await.unwrap();
        }

        assert_eq!(inbox.receive_next().await.unwrap(), Bytes::from_static(b"1-1-ok"));
    }

    #[tokio::test]
    async fn sender_waits_for_late_listener() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let receiver = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let mut inbox = TcpInbox::bind(addr, loopback_config(Duration::from_secs(5)))
                .await
                .unwrap();
            inbox.receive_next().await.unwrap()
        });

        let transport = TcpTransport::new(
            TransportConfig::new(BTreeMap::from([(ProcessId(1), addr)]))
                .with_connect_timeout(Duration::from_secs(5)),
        );
        assert_ok!(transport.send_frame(ProcessId(1), b"2-1-late").await);
        assert_eq!(receiver.await.unwrap(), Bytes::from_static(b"2-1-late"));
    }
}
