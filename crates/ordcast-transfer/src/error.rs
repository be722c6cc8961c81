//! Error types for ordcast-transfer.

use std::net::SocketAddr;
use std::time::Duration;

use ordcast_core::ProcessId;
use thiserror::Error;

/// Result type for ordcast-transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while moving frames over TCP.
#[derive(Debug, Error)]
pub enum Error {
    /// No endpoint is configured for the peer.
    #[error("no endpoint configured for process {0}")]
    UnknownPeer(ProcessId),

    /// The peer did not accept a connection within the connect timeout.
    #[error("could not connect to {addr} after {attempts} attempts within {timeout:?}")]
    ConnectTimeout {
        addr: SocketAddr,
        attempts: u32,
        timeout: Duration,
    },

    /// An inbound frame exceeded the configured limit.
    #[error("frame of at least {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// The sender stalled mid-frame.
    #[error("timed out reading frame after {0:?}")]
    ReadTimeout(Duration),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
