use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::LogContext;
use crate::error::ConfigurationError;

/// Number of hosts a deployment topology must describe.
pub const HOST_COUNT: usize = 2;

/// What a deployment node runs. Implied by its position in `cloud_hosts`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HostRole {
    /// Runs the broker and the consuming agent. Its public address is the
    /// bootstrap server.
    BrokerConsumer,
    /// Runs a broker and the sink storage. Public entry point for producers.
    BrokerSink,
}

impl HostRole {
    fn for_position(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::BrokerConsumer),
            1 => Some(Self::BrokerSink),
            _ => None,
        }
    }
}

/// One deployment node as written in the topology file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostEntry {
    /// Externally routable address.
    pub public: String,
    /// Address inside the private network. Agents never connect through it,
    /// so files may leave it out.
    #[serde(default)]
    pub private: String,
    /// Optional role hint. When present it must agree with the entry's position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<HostRole>,
}

impl HostEntry {
    pub fn new(public: impl Into<String>, private: impl Into<String>) -> Self {
        Self {
            public: public.into(),
            private: private.into(),
            role: None,
        }
    }
}

/// On-disk shape of the topology document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyFile {
    pub cloud_hosts: Vec<HostEntry>,
}

/// The resolved two-node deployment. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    bootstrap_server: String,
    consumer_host: HostEntry,
    sink_host: HostEntry,
}

impl Topology {
    /// Read and validate a topology file.
    ///
    /// `.toml` files are parsed as TOML, everything else as JSON.
    pub fn resolve(path: impl AsRef<Path>, ctx: &LogContext) -> Result<Self, ConfigurationError> {
        let _entered = ctx.span().enter();
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Resolving topology");
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigurationError::Unreadable {
                path: path.display().to_string(),
                source,
            })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let topology = if is_toml {
            Self::from_toml_str(&contents)?
        } else {
            Self::from_json_str(&contents)?
        };

        tracing::debug!(
            path = %path.display(),
            consumer_host = ?topology.consumer_host,
            sink_host = ?topology.sink_host,
            "Topology resolved"
        );
        Ok(topology)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigurationError> {
        let file: TopologyFile = serde_json::from_str(contents)
            .map_err(|e| ConfigurationError::Malformed(e.to_string()))?;
        Self::from_hosts(file.cloud_hosts)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigurationError> {
        let file: TopologyFile =
            toml::from_str(contents).map_err(|e| ConfigurationError::Malformed(e.to_string()))?;
        Self::from_hosts(file.cloud_hosts)
    }

    /// Build a topology from the ordered `[consumer-host, sink-host]` list.
    pub fn from_hosts(hosts: Vec<HostEntry>) -> Result<Self, ConfigurationError> {
        if hosts.len() != HOST_COUNT {
            return Err(ConfigurationError::HostCount {
                expected: HOST_COUNT,
                found: hosts.len(),
            });
        }

        for (index, host) in hosts.iter().enumerate() {
            if host.public.trim().is_empty() {
                return Err(ConfigurationError::MissingAddress { index });
            }
            if let (Some(declared), Some(expected)) = (host.role, HostRole::for_position(index)) {
                if declared != expected {
                    return Err(ConfigurationError::RoleMismatch {
                        index,
                        declared,
                        expected,
                    });
                }
            }
        }

        let mut hosts = hosts.into_iter();
        let (Some(consumer_host), Some(sink_host)) = (hosts.next(), hosts.next()) else {
            return Err(ConfigurationError::HostCount {
                expected: HOST_COUNT,
                found: 0,
            });
        };

        Ok(Self {
            bootstrap_server: consumer_host.public.clone(),
            consumer_host,
            sink_host,
        })
    }

    /// Broker endpoint agents connect to first.
    pub fn bootstrap_server(&self) -> &str {
        &self.bootstrap_server
    }

    pub fn consumer_host(&self) -> &HostEntry {
        &self.consumer_host
    }

    pub fn sink_host(&self) -> &HostEntry {
        &self.sink_host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_HOSTS: &str = r#"{
        "cloud_hosts": [
            {"public": "1.2.3.4", "private": "10.0.0.4"},
            {"public": "5.6.7.8", "private": "10.0.0.8"}
        ]
    }"#;

    #[test]
    fn bootstrap_is_first_public_address() {
        let topology = Topology::from_json_str(TWO_HOSTS).unwrap();
        assert_eq!(topology.bootstrap_server(), "1.2.3.4");
        assert_eq!(topology.consumer_host().private, "10.0.0.4");
        assert_eq!(
            topology.sink_host(),
            &HostEntry::new("5.6.7.8", "10.0.0.8")
        );
    }

    #[test]
    fn public_addresses_alone_are_enough() {
        let topology = Topology::from_json_str(
            r#"{"cloud_hosts": [{"public": "1.2.3.4"}, {"public": "5.6.7.8"}]}"#,
        )
        .unwrap();
        assert_eq!(topology.bootstrap_server(), "1.2.3.4");
        assert_eq!(topology.sink_host().public, "5.6.7.8");
        assert_eq!(topology.consumer_host().private, "");
    }

    #[test]
    fn empty_host_list_is_rejected() {
        let err = Topology::from_json_str(r#"{"cloud_hosts": []}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::HostCount { expected: 2, found: 0 }
        ));
    }

    #[test]
    fn single_host_is_rejected() {
        let err = Topology::from_json_str(
            r#"{"cloud_hosts": [{"public": "1.2.3.4", "private": "10.0.0.4"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::HostCount { expected: 2, found: 1 }
        ));
    }

    #[test]
    fn three_hosts_are_rejected() {
        let hosts = vec![
            HostEntry::new("a", "a"),
            HostEntry::new("b", "b"),
            HostEntry::new("c", "c"),
        ];
        let err = Topology::from_hosts(hosts).unwrap_err();
        assert!(matches!(err, ConfigurationError::HostCount { found: 3, .. }));
    }

    #[test]
    fn missing_cloud_hosts_field_is_malformed() {
        let err = Topology::from_json_str(r#"{"hosts": []}"#).unwrap_err();
        assert!(matches!(err, ConfigurationError::Malformed(_)));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = Topology::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigurationError::Malformed(_)));
    }

    #[test]
    fn blank_public_address_is_rejected() {
        let hosts = vec![HostEntry::new("  ", "10.0.0.1"), HostEntry::new("b", "b")];
        let err = Topology::from_hosts(hosts).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingAddress { index: 0 }));
    }

    #[test]
    fn contradicting_role_hint_is_rejected() {
        let json = r#"{
            "cloud_hosts": [
                {"public": "1.2.3.4", "private": "10.0.0.4", "role": "broker_sink"},
                {"public": "5.6.7.8", "private": "10.0.0.8"}
            ]
        }"#;
        let err = Topology::from_json_str(json).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::RoleMismatch {
                index: 0,
                declared: HostRole::BrokerSink,
                expected: HostRole::BrokerConsumer,
            }
        ));
    }

    #[test]
    fn matching_role_hints_are_accepted() {
        let json = r#"{
            "cloud_hosts": [
                {"public": "1.2.3.4", "private": "10.0.0.4", "role": "broker_consumer"},
                {"public": "5.6.7.8", "private": "10.0.0.8", "role": "broker_sink"}
            ]
        }"#;
        let topology = Topology::from_json_str(json).unwrap();
        assert_eq!(topology.sink_host().role, Some(HostRole::BrokerSink));
    }

    #[test]
    fn toml_topology() {
        let toml_str = r#"
[[cloud_hosts]]
public = "1.2.3.4"
private = "10.0.0.4"

[[cloud_hosts]]
public = "5.6.7.8"
private = "10.0.0.8"
"#;
        let topology = Topology::from_toml_str(toml_str).unwrap();
        assert_eq!(topology.bootstrap_server(), "1.2.3.4");
        assert_eq!(topology.sink_host().public, "5.6.7.8");
    }

    #[test]
    fn resolve_reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.json");
        std::fs::write(&path, TWO_HOSTS).unwrap();

        let topology = Topology::resolve(&path, &LogContext::driver()).unwrap();
        assert_eq!(topology.bootstrap_server(), "1.2.3.4");
    }

    #[test]
    fn resolve_picks_toml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.toml");
        std::fs::write(
            &path,
            "[[cloud_hosts]]\npublic = \"a\"\nprivate = \"a\"\n\n[[cloud_hosts]]\npublic = \"b\"\nprivate = \"b\"\n",
        )
        .unwrap();

        let topology = Topology::resolve(&path, &LogContext::driver()).unwrap();
        assert_eq!(topology.bootstrap_server(), "a");
    }

    #[test]
    fn resolve_missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = Topology::resolve(dir.path().join("nope.json"), &LogContext::driver()).unwrap_err();
        assert!(matches!(err, ConfigurationError::Unreadable { .. }));
    }
}
