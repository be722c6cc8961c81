//! Ordcast Node - runnable broadcast group members
//!
//! Wires the ordering engine from `ordcast-core` to the TCP layer from
//! `ordcast-transfer` and adds what a deployment needs around it:
//!
//! - [`config`]: JSON group files and per-node settings
//! - [`node`]: one member bound to its endpoint, run until idle
//! - [`app`]: a driver that submits timed payloads to one member
//! - [`deliveries`]: delivery logs and the cross-member agreement check
//!
//! Three binaries sit on top: `ordcast-node`, `ordcast-app` and
//! `ordcast-harness`, the last of which starts a whole group locally and
//! verifies that every member delivered the same sequence.

pub mod app;
pub mod config;
pub mod deliveries;
pub mod error;
pub mod node;

pub use app::{AppConfig, AppDriver};
pub use config::{Endpoint, GroupConfig, NodeConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_TIMEOUT};
pub use deliveries::{read_log, verify_agreement, verify_run, write_log, Agreement};
pub use error::{Error, Result};
pub use node::{Node, NodeReport};
