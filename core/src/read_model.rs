//! Denormalized read-models and the column patches handlers produce.
//!
//! Read-models are partial, multi-source entities. A [`Host`] row accumulates
//! columns from the `host`, `cloud`, `cluster` and `sap_system` discoveries,
//! each written independently. A handler therefore never produces a full row:
//! it produces a patch naming exactly the columns it owns, and the store
//! resolves a primary-key conflict by updating only those columns.
//!
//! ```text
//! cloud event  ──► HostPatch::CloudProvider ──► UPDATE hosts SET cloud_provider
//! host event   ──► HostPatch::Identity      ──► UPDATE hosts SET name, ip_addresses, ...
//! ```
//!
//! Rows are created on the first relevant event and are never deleted by the
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Host read-model, keyed by agent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Primary key
    pub agent_id: String,
    /// Host name (`host`)
    pub name: String,
    /// Routable IPv4 addresses (`host`)
    pub ip_addresses: Vec<String>,
    /// Agent version (`host`)
    pub agent_version: String,
    /// Address the agent is bound to (`host`)
    pub bind_address: String,
    /// Cloud provider tag (`cloud`)
    pub cloud_provider: String,
    /// Cluster id (`cluster`)
    pub cluster_id: String,
    /// Cluster name (`cluster`)
    pub cluster_name: String,
    /// SAP system identifiers (`sap_system`)
    pub sids: Vec<String>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl Host {
    /// An empty row for `agent_id`, as created by the first insert.
    #[must_use]
    pub fn new(agent_id: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: String::new(),
            ip_addresses: Vec::new(),
            agent_version: String::new(),
            bind_address: String::new(),
            cloud_provider: String::new(),
            cluster_id: String::new(),
            cluster_name: String::new(),
            sids: Vec::new(),
            updated_at,
        }
    }
}

/// The columns of [`Host`] a single handler owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPatch {
    /// Written by the `host` discovery
    Identity {
        /// Host name
        name: String,
        /// Routable IPv4 addresses
        ip_addresses: Vec<String>,
        /// Agent version
        agent_version: String,
        /// Agent bind address
        bind_address: String,
    },
    /// Written by the `cloud` discovery
    CloudProvider {
        /// Provider tag, e.g. `azure`
        provider: String,
    },
    /// Written by the `cluster` discovery
    Cluster {
        /// Cluster id
        cluster_id: String,
        /// Cluster name
        cluster_name: String,
    },
    /// Written by the `sap_system` discovery
    SapSystems {
        /// SAP system identifiers
        sids: Vec<String>,
    },
}

impl HostPatch {
    /// Column names this patch updates on conflict.
    #[must_use]
    pub const fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Identity { .. } => &["name", "ip_addresses", "agent_version", "bind_address"],
            Self::CloudProvider { .. } => &["cloud_provider"],
            Self::Cluster { .. } => &["cluster_id", "cluster_name"],
            Self::SapSystems { .. } => &["sids"],
        }
    }

    /// Write the owned columns into `host`, leaving every other column untouched.
    pub fn apply_to(&self, host: &mut Host) {
        match self {
            Self::Identity {
                name,
                ip_addresses,
                agent_version,
                bind_address,
            } => {
                host.name.clone_from(name);
                host.ip_addresses.clone_from(ip_addresses);
                host.agent_version.clone_from(agent_version);
                host.bind_address.clone_from(bind_address);
            }
            Self::CloudProvider { provider } => host.cloud_provider.clone_from(provider),
            Self::Cluster {
                cluster_id,
                cluster_name,
            } => {
                host.cluster_id.clone_from(cluster_id);
                host.cluster_name.clone_from(cluster_name);
            }
            Self::SapSystems { sids } => host.sids.clone_from(sids),
        }
    }
}

/// Telemetry read-model, keyed by agent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Primary key
    pub agent_id: String,
    /// Host name (`host`)
    pub host_name: String,
    /// SLES version (`subscription`)
    pub sles_version: String,
    /// Logical CPU count (`host`)
    pub cpu_count: i32,
    /// CPU socket count (`host`)
    pub socket_count: i32,
    /// Total memory in MiB (`host`)
    pub total_memory_mb: i64,
    /// Cloud provider tag (`cloud`)
    pub cloud_provider: String,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl Telemetry {
    /// An empty row for `agent_id`.
    #[must_use]
    pub fn new(agent_id: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            host_name: String::new(),
            sles_version: String::new(),
            cpu_count: 0,
            socket_count: 0,
            total_memory_mb: 0,
            cloud_provider: String::new(),
            updated_at,
        }
    }
}

/// The columns of [`Telemetry`] a single handler owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryPatch {
    /// Written by the `host` discovery
    HostFacts {
        /// Host name
        host_name: String,
        /// Logical CPU count
        cpu_count: i32,
        /// CPU socket count
        socket_count: i32,
        /// Total memory in MiB
        total_memory_mb: i64,
    },
    /// Written by the `cloud` discovery
    CloudProvider {
        /// Provider tag
        provider: String,
    },
    /// Written by the `subscription` discovery
    OsVersion {
        /// SLES version of the first subscription record
        sles_version: String,
    },
}

impl TelemetryPatch {
    /// Column names this patch updates on conflict.
    #[must_use]
    pub const fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::HostFacts { .. } => &["host_name", "cpu_count", "socket_count", "total_memory_mb"],
            Self::CloudProvider { .. } => &["cloud_provider"],
            Self::OsVersion { .. } => &["sles_version"],
        }
    }

    /// Write the owned columns into `telemetry`.
    pub fn apply_to(&self, telemetry: &mut Telemetry) {
        match self {
            Self::HostFacts {
                host_name,
                cpu_count,
                socket_count,
                total_memory_mb,
            } => {
                telemetry.host_name.clone_from(host_name);
                telemetry.cpu_count = *cpu_count;
                telemetry.socket_count = *socket_count;
                telemetry.total_memory_mb = *total_memory_mb;
            }
            Self::CloudProvider { provider } => telemetry.cloud_provider.clone_from(provider),
            Self::OsVersion { sles_version } => telemetry.sles_version.clone_from(sles_version),
        }
    }
}

/// Cluster archetype derived from the cloned resource agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    /// HANA system replication, scale-up
    HanaScaleUp,
    /// HANA system replication, scale-out
    HanaScaleOut,
    /// Anything else
    Unknown,
}

impl ClusterType {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HanaScaleUp => "hana_scale_up",
            Self::HanaScaleOut => "hana_scale_out",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the cluster runs HANA system replication.
    #[must_use]
    pub const fn is_hana(&self) -> bool {
        matches!(self, Self::HanaScaleUp | Self::HanaScaleOut)
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterType {
    type Err = std::convert::Infallible;

    /// Unrecognised values read back from storage map to [`ClusterType::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "hana_scale_up" => Self::HanaScaleUp,
            "hana_scale_out" => Self::HanaScaleOut,
            _ => Self::Unknown,
        })
    }
}

/// Cluster data produced by the `cluster` handler; every column but the timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Cluster id (primary key)
    pub id: String,
    /// Cluster name
    pub name: String,
    /// Detected archetype
    pub cluster_type: ClusterType,
    /// SAP system identifiers managed by the cluster
    pub sids: Vec<String>,
    /// Number of configured resources
    pub resources_number: i32,
    /// Number of nodes
    pub hosts_number: i32,
    /// HANA detail, only for HANA clusters
    pub detail: Option<ClusterDetail>,
}

/// Cluster read-model, keyed by cluster id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Primary key
    pub id: String,
    /// Cluster name
    pub name: String,
    /// Detected archetype
    pub cluster_type: ClusterType,
    /// SAP system identifiers managed by the cluster
    pub sids: Vec<String>,
    /// Number of configured resources
    pub resources_number: i32,
    /// Number of nodes
    pub hosts_number: i32,
    /// HANA detail document
    pub detail: Option<ClusterDetail>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    /// Stamp a snapshot as a stored row.
    #[must_use]
    pub fn from_snapshot(snapshot: ClusterSnapshot, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: snapshot.id,
            name: snapshot.name,
            cluster_type: snapshot.cluster_type,
            sids: snapshot.sids,
            resources_number: snapshot.resources_number,
            hosts_number: snapshot.hosts_number,
            detail: snapshot.detail,
            updated_at,
        }
    }
}

/// HANA system replication detail of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDetail {
    /// `hana_<sid>_srmode` of the first node
    pub system_replication_mode: String,
    /// `hana_<sid>_op_mode` of the first node
    pub system_replication_operation_mode: String,
    /// `hana_<sid>_sync_state` of the secondary node
    pub secondary_sync_state: String,
    /// Health digit from the first node's roles attribute
    pub sr_health_state: String,
    /// When the CIB was last written, if parseable
    pub cib_last_written: Option<DateTime<Utc>>,
    /// Fencing agent type, `notconfigured` when absent
    pub stonith_type: String,
    /// Resources running on no node
    pub stopped_resources: Vec<ClusterNodeResource>,
    /// Per-node view
    pub nodes: Vec<ClusterNode>,
}

/// A cluster node as seen in the HANA detail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    /// Node name
    pub name: String,
    /// Node attributes reported by the cluster manager
    pub attributes: BTreeMap<String, String>,
    /// Resources placed on this node
    pub resources: Vec<ClusterNodeResource>,
    /// Virtual IPs managed on this node
    pub virtual_ips: Vec<String>,
}

/// A resource placed on a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNodeResource {
    /// Resource id
    pub id: String,
    /// Resource agent
    #[serde(rename = "type")]
    pub kind: String,
    /// Role, e.g. `Master`
    pub role: String,
    /// Runtime status, when one applies
    pub status: Option<ResourceStatus>,
    /// Failures recorded in the node history
    pub fail_count: u32,
}

/// Runtime status of a cluster resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Running
    Active,
    /// Blocked
    Blocked,
    /// Failed
    Failed,
    /// Failed, but failure ignored
    FailureIgnored,
    /// Orphaned
    Orphaned,
}

/// A read-model write produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadModelUpsert {
    /// Patch the host row of `agent_id`
    Host {
        /// Row key
        agent_id: String,
        /// Owned columns
        patch: HostPatch,
    },
    /// Patch the telemetry row of `agent_id`
    Telemetry {
        /// Row key
        agent_id: String,
        /// Owned columns
        patch: TelemetryPatch,
    },
    /// Insert or fully replace a cluster row
    Cluster(Box<ClusterSnapshot>),
}

impl ReadModelUpsert {
    /// Name of the table the upsert targets.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Host { .. } => "hosts",
            Self::Telemetry { .. } => "telemetry",
            Self::Cluster(_) => "clusters",
        }
    }

    /// Primary key of the targeted row.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Host { agent_id, .. } | Self::Telemetry { agent_id, .. } => agent_id,
            Self::Cluster(snapshot) => &snapshot.id,
        }
    }
}
