//! Ordcast Transfer - TCP transport for the broadcast engine
//!
//! This crate provides:
//! - [`TcpTransport`]: per-message connections with connect-retry and
//!   exponential backoff, bounded by a connect timeout
//! - [`TcpInbox`]: a listener that yields one frame per accepted connection
//!   and reports an idle timeout when traffic stops
//!
//! # Design Philosophy
//!
//! The ordering engine has no use for persistent channels, so there are none.
//! A frame is written on a fresh connection and the write half is closed; the
//! receiver reads to EOF. A peer that stays unreachable past the connect
//! timeout is a fatal condition for the sender.
//!
//! # Example
//!
//! ```rust,ignore
//! use ordcast_transfer::{InboxConfig, TcpInbox, TcpTransport, TransportConfig};
//!
//! let mut inbox = TcpInbox::bind("127.0.0.1:5001".parse()?, InboxConfig::default()).await?;
//! let transport = TcpTransport::new(TransportConfig::new(endpoints));
//! process.run(&mut inbox).await?;
//! ```

pub mod error;
pub mod inbox;
pub mod transport;

// Re-export main types at crate root
pub use error::{Error, Result};
pub use inbox::{InboxConfig, TcpInbox, DEFAULT_MAX_FRAME_LEN};
pub use transport::{BackoffConfig, TcpTransport, TransportConfig};
