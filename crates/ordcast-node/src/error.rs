//! Error types for ordcast-node.

use std::path::PathBuf;

use ordcast_core::{MessageId, ProcessId};
use thiserror::Error;

/// Result type for ordcast-node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running a node.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The group file could not be read.
    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The group file is not valid JSON for a group.
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Structurally valid but unusable group.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// An endpoint string did not resolve to a socket address.
    #[error("invalid endpoint {endpoint:?} for process {id}: {reason}")]
    InvalidEndpoint {
        id: ProcessId,
        endpoint: String,
        reason: String,
    },

    /// The requested index has no entry in the group.
    #[error("process {0} is not in the group config")]
    UnknownIndex(ProcessId),

    /// A delivery log line could not be parsed.
    #[error("{path}:{line}: malformed delivery entry {entry:?}")]
    DeliveryLog {
        path: PathBuf,
        line: usize,
        entry: String,
    },

    /// Two processes delivered different sequences.
    #[error("process {left} and process {right} disagree at position {position}: {left_entry} vs {right_entry}")]
    Disagreement {
        left: ProcessId,
        right: ProcessId,
        position: usize,
        left_entry: String,
        right_entry: String,
    },

    /// A process delivered a message after a higher-ordered one.
    #[error("process {process} delivered {later} after {earlier}")]
    OutOfOrder {
        process: ProcessId,
        earlier: MessageId,
        later: MessageId,
    },

    /// One or more group members or drivers exited unsuccessfully.
    #[error("children failed: {}", .0.join(", "))]
    ChildrenFailed(Vec<String>),

    /// The group agreed, but on fewer messages than were submitted.
    #[error("expected {expected} deliveries per process, got {delivered}")]
    MissingDeliveries { expected: usize, delivered: usize },

    /// Error from the ordering engine
    #[error(transparent)]
    Core(#[from] ordcast_core::Error),

    /// Error from the TCP layer
    #[error(transparent)]
    Transfer(#[from] ordcast_transfer::Error),
}
