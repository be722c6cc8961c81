//! Group and node configuration.
//!
//! A group file is a JSON object mapping process index to endpoint:
//!
//! ```json
//! { "1": 5001, "2": "127.0.0.1:5002", "3": "localhost:5003" }
//! ```
//!
//! A bare port binds on 127.0.0.1. Strings are resolved as `host:port`.

use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ordcast_core::{ClockRule, Party, ProcessId};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How long a node waits for traffic before shutting down.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a node keeps retrying an unreachable peer.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a process listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    /// Port on the loopback interface.
    Port(u16),
    /// `host:port`
    Addr(String),
}

impl Endpoint {
    /// Resolve to a socket address. Hostnames take their first address.
    pub fn resolve(&self, id: ProcessId) -> Result<SocketAddr> {
        let invalid = |reason: String| Error::InvalidEndpoint {
            id,
            endpoint: self.to_string(),
            reason,
        };

        let addr = match self {
            Self::Port(port) => SocketAddr::from((Ipv4Addr::LOCALHOST, *port)),
            Self::Addr(host_port) => host_port
                .to_socket_addrs()
                .map_err(|e| invalid(e.to_string()))?
                .next()
                .ok_or_else(|| invalid("resolved to no addresses".into()))?,
        };

        if addr.port() == 0 {
            return Err(invalid("port 0 cannot be dialled".into()));
        }
        Ok(addr)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Port(port) => write!(f, "{port}"),
            Self::Addr(host_port) => f.write_str(host_port),
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::Addr(addr.to_string())
    }
}

/// Fixed membership of a broadcast group and where each member listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupConfig {
    members: BTreeMap<ProcessId, Endpoint>,
}

impl GroupConfig {
    /// Build and validate a group.
    pub fn new(members: impl IntoIterator<Item = (ProcessId, Endpoint)>) -> Result<Self> {
        let group = Self {
            members: members.into_iter().collect(),
        };
        group.validate()?;
        Ok(group)
    }

    /// Read a group file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let group: Self = serde_json::from_str(json)?;
        group.validate()?;
        Ok(group)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the group to `path` as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(Error::InvalidConfig("group has no members".into()));
        }

        let mut seen: HashMap<SocketAddr, ProcessId> = HashMap::new();
        for (&id, endpoint) in &self.members {
            let addr = endpoint.resolve(id)?;
            if let Some(other) = seen.insert(addr, id) {
                return Err(Error::InvalidConfig(format!(
                    "processes {other} and {id} share endpoint {addr}"
                )));
            }
        }
        Ok(())
    }

    /// Member indices in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.members.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: ProcessId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn party(&self) -> Party {
        self.ids().collect()
    }

    /// Resolved endpoint of one member.
    pub fn endpoint(&self, id: ProcessId) -> Result<SocketAddr> {
        self.members
            .get(&id)
            .ok_or(Error::UnknownIndex(id))?
            .resolve(id)
    }

    /// Resolved endpoints of every member.
    pub fn endpoints(&self) -> Result<BTreeMap<ProcessId, SocketAddr>> {
        self.members
            .iter()
            .map(|(&id, endpoint)| Ok((id, endpoint.resolve(id)?)))
            .collect()
    }
}

/// Settings for one running node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's index in the group
    pub index: ProcessId,
    pub group: GroupConfig,
    /// Shut down after this long without inbound traffic
    pub idle_timeout: Duration,
    /// Give up on an unreachable peer after this long
    pub connect_timeout: Duration,
    pub clock_rule: ClockRule,
    /// Delivery log destination, one `{sender}-{timestamp}` per line
    pub deliveries: Option<PathBuf>,
}

impl NodeConfig {
    /// Node settings with defaults. Fails if `index` is not a group member.
    pub fn new(index: ProcessId, group: GroupConfig) -> Result<Self> {
        if !group.contains(index) {
            return Err(Error::UnknownIndex(index));
        }
        Ok(Self {
            index,
            group,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            clock_rule: ClockRule::default(),
            deliveries: None,
        })
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_clock_rule(mut self, clock_rule: ClockRule) -> Self {
        self.clock_rule = clock_rule;
        self
    }

    #[must_use]
    pub fn with_deliveries(mut self, path: impl Into<PathBuf>) -> Self {
        self.deliveries = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_ports_and_addresses() {
        let group =
            GroupConfig::from_json(r#"{ "1": 5001, "2": "127.0.0.1:5002", "3": 5003 }"#).unwrap();

        assert_eq!(group.len(), 3);
        assert_eq!(
            group.endpoint(ProcessId(1)).unwrap(),
            "127.0.0.1:5001".parse().unwrap()
        );
        assert_eq!(
            group.endpoint(ProcessId(2)).unwrap(),
            "127.0.0.1:5002".parse().unwrap()
        );
        assert_eq!(
            group.ids().collect::<Vec<_>>(),
            vec![ProcessId(1), ProcessId(2), ProcessId(3)]
        );
        assert!(group.party().is_member(ProcessId(3)));
    }

    #[test]
    fn rejects_unusable_groups() {
        assert!(matches!(
            GroupConfig::from_json("{}"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            GroupConfig::from_json(r#"{ "one": 5001 }"#),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            GroupConfig::from_json(r#"{ "1": 5001, "2": "127.0.0.1:5001" }"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            GroupConfig::from_json(r#"{ "1": "not an address" }"#),
            Err(Error::InvalidEndpoint { id: ProcessId(1), .. })
        ));
        assert!(matches!(
            GroupConfig::from_json(r#"{ "1": 0 }"#),
            Err(Error::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "1": 6101, "2": 6102 }}"#).unwrap();

        let group = GroupConfig::load(file.path()).unwrap();
        assert_eq!(group.len(), 2);

        let missing = GroupConfig::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(Error::ConfigRead { .. })));
    }

    #[test]
    fn saved_group_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("group.json");
        let group = GroupConfig::new([
            (ProcessId(1), Endpoint::Port(6201)),
            (ProcessId(2), Endpoint::from("127.0.0.1:6202".parse::<SocketAddr>().unwrap())),
        ])
        .unwrap();

        group.save(&path).unwrap();
        assert_eq!(GroupConfig::load(&path).unwrap(), group);
    }

    #[test]
    fn node_config_requires_membership() {
        let group = GroupConfig::from_json(r#"{ "1": 6301, "2": 6302 }"#).unwrap();

        assert!(matches!(
            NodeConfig::new(ProcessId(9), group.clone()),
            Err(Error::UnknownIndex(ProcessId(9)))
        ));

        let config = NodeConfig::new(ProcessId(2), group)
            .unwrap()
            .with_idle_timeout(Duration::from_secs(3))
            .with_clock_rule(ClockRule::Increment);
        assert_eq!(config.idle_timeout, Duration::from_secs(3));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.clock_rule, ClockRule::Increment);
        assert!(config.deliveries.is_none());
    }
}
