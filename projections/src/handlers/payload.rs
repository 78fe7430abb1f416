//! Strict payload schemas, one per discovery type.
//!
//! Every struct rejects unknown fields, so each one declares the complete
//! document the agent sends. Sections no handler reads are kept as raw JSON.
//! Missing fields fall back to their defaults where agents are known to omit
//! them; extra fields never pass.
//!
//! Cluster payloads mirror the pacemaker tooling they come from and use
//! `PascalCase` keys (`Crmmon`, `NodeAttributes`, ...). Every other payload is
//! `snake_case`.

use discovery_core::{DiscoveryEvent, DiscoveryType, ProjectionError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Decode the payload of `event` as `T`, logging the failure.
///
/// # Errors
///
/// Returns [`ProjectionError::Decode`] when the payload does not match `T`.
pub fn decode<T: DeserializeOwned>(event: &DiscoveryEvent, kind: DiscoveryType) -> Result<T> {
    T::deserialize(&event.payload).map_err(|e| {
        tracing::error!(
            agent_id = %event.agent_id,
            discovery_type = kind.as_str(),
            event_id = event.id,
            error = %e,
            "Can't decode discovery payload"
        );
        ProjectionError::decode(kind, e)
    })
}

/// `host` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostPayload {
    /// Host name
    pub host_name: String,
    /// Every address the agent found, unfiltered
    #[serde(default)]
    pub host_ip_addresses: Vec<String>,
    /// Agent version
    #[serde(default)]
    pub agent_version: String,
    /// Address the agent listens on
    #[serde(default)]
    pub agent_bind_address: String,
    /// Logical CPUs
    #[serde(default)]
    pub cpu_count: u32,
    /// CPU sockets
    #[serde(default)]
    pub socket_count: u32,
    /// Memory in MiB
    #[serde(default)]
    pub total_memory_mb: u64,
    /// OS release string
    #[serde(default)]
    pub os_version: String,
}

/// `cloud` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudPayload {
    /// Provider tag, e.g. `azure`
    pub provider: String,
    /// Provider specific instance metadata, not projected
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// One entry of a `sap_system` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SapSystemRecord {
    /// Installation id
    #[serde(rename = "Id", default)]
    pub id: String,
    /// SAP system identifier
    #[serde(rename = "SID")]
    pub sid: String,
    /// System type code
    #[serde(rename = "Type", default)]
    pub kind: i64,
    /// Profile parameters, not projected
    #[serde(rename = "Profile", default)]
    pub profile: Option<serde_json::Value>,
    /// Instances, not projected
    #[serde(rename = "Instances", default)]
    pub instances: Option<serde_json::Value>,
    /// Tenant databases, not projected
    #[serde(rename = "Databases", default)]
    pub databases: Option<serde_json::Value>,
}

/// `sap_system` payload.
pub type SapSystemsPayload = Vec<SapSystemRecord>;

/// One entry of a `subscription` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubscriptionRecord {
    /// Product identifier, e.g. `SLES_SAP`
    pub identifier: String,
    /// Product version, e.g. `15.3`
    pub version: String,
    /// Architecture
    pub arch: String,
    /// Registration status
    pub status: String,
    /// Registration code
    pub regcode: String,
    /// Subscription start
    pub starts_at: String,
    /// Subscription end
    pub expires_at: String,
    /// Subscription status
    pub subscription_status: String,
    /// Subscription type
    #[serde(rename = "type")]
    pub kind: String,
}

/// `subscription` payload.
pub type SubscriptionsPayload = Vec<SubscriptionRecord>;

/// `cluster` payload: a pacemaker topology snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct ClusterPayload {
    /// Cluster id
    pub id: String,
    /// Cluster name
    pub name: String,
    /// Whether the reporting node is the designated coordinator
    #[serde(rename = "DC")]
    pub dc: bool,
    /// Cloud provider the cluster runs on
    pub provider: String,
    /// SBD configuration, not projected
    #[serde(rename = "SBD")]
    pub sbd: Option<serde_json::Value>,
    /// Cluster information base
    pub cib: Cib,
    /// Runtime status as reported by `crm_mon`
    pub crmmon: Crmmon,
}

/// Cluster information base.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct Cib {
    /// Configuration section
    pub configuration: CibConfiguration,
}

/// Configuration section of the CIB.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CibConfiguration {
    /// Cluster properties, not projected
    pub crm_config: Option<serde_json::Value>,
    /// Configured nodes, not projected
    pub nodes: Option<serde_json::Value>,
    /// Configured resources
    pub resources: CibResources,
    /// Location constraints, not projected
    pub constraints: Option<serde_json::Value>,
}

/// Configured resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CibResources {
    /// Plain primitives
    pub primitives: Vec<CibPrimitive>,
    /// Groups of primitives
    pub groups: Vec<CibGroup>,
    /// Cloned primitives
    pub clones: Vec<CibClone>,
    /// Multi-state primitives
    pub masters: Vec<CibClone>,
}

/// A configured primitive resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CibPrimitive {
    /// Resource id
    pub id: String,
    /// Agent class, e.g. `ocf`
    pub class: String,
    /// Agent type, e.g. `SAPHanaTopology`
    #[serde(rename = "Type")]
    pub kind: String,
    /// Agent provider, e.g. `suse`
    pub provider: String,
    /// Instance attributes, in declaration order
    pub instance_attributes: Vec<CibAttribute>,
    /// Meta attributes
    pub meta_attributes: Vec<CibAttribute>,
    /// Operations, not projected
    pub operations: Option<serde_json::Value>,
}

/// A group of primitives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CibGroup {
    /// Group id
    pub id: String,
    /// Members
    pub primitives: Vec<CibPrimitive>,
}

/// A clone or multi-state wrapper around one primitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CibClone {
    /// Clone id
    pub id: String,
    /// Wrapped primitive
    pub primitive: CibPrimitive,
    /// Meta attributes
    pub meta_attributes: Vec<CibAttribute>,
}

/// A name/value attribute of the CIB.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CibAttribute {
    /// Attribute id
    pub id: String,
    /// Attribute name
    pub name: String,
    /// Attribute value
    pub value: String,
}

/// Runtime status as reported by `crm_mon`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct Crmmon {
    /// `crm_mon` version
    pub version: String,
    /// Counters and last change
    pub summary: CrmmonSummary,
    /// Online nodes, not projected
    pub nodes: Option<serde_json::Value>,
    /// Per-node attributes
    pub node_attributes: CrmmonNodeAttributes,
    /// Per-node resource history
    pub node_history: CrmmonNodeHistory,
    /// Plain resources
    pub resources: Vec<CrmmonResource>,
    /// Grouped resources
    pub groups: Vec<CrmmonGroup>,
    /// Cloned resources
    pub clones: Vec<CrmmonClone>,
}

/// Summary section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonSummary {
    /// Configured nodes
    pub nodes: CrmmonCount,
    /// Configured resources
    pub resources: CrmmonResourcesSummary,
    /// When the CIB was last written
    pub last_change: CrmmonLastChange,
    /// Cluster-wide options
    pub cluster_options: CrmmonClusterOptions,
}

/// Cluster-wide options of the summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonClusterOptions {
    /// Fencing enabled
    pub stonith_enabled: bool,
}

/// A bare counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonCount {
    /// Count
    pub number: i32,
}

/// Resource counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonResourcesSummary {
    /// Configured resources
    pub number: i32,
    /// Disabled resources
    pub disabled: i32,
    /// Blocked resources
    pub blocked: i32,
}

/// Last change timestamp, formatted like `Mon Jan  2 15:04:05 2006`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonLastChange {
    /// Raw timestamp
    pub time: String,
}

/// Node attribute section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonNodeAttributes {
    /// One entry per node
    pub nodes: Vec<CrmmonAttributeNode>,
}

/// Attributes of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonAttributeNode {
    /// Node name
    pub name: String,
    /// Attributes
    pub attributes: Vec<CrmmonNameValue>,
}

/// A node attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonNameValue {
    /// Attribute name
    pub name: String,
    /// Attribute value
    pub value: String,
}

/// Node history section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonNodeHistory {
    /// One entry per node
    pub nodes: Vec<CrmmonHistoryNode>,
}

/// Resource history of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonHistoryNode {
    /// Node name
    pub name: String,
    /// Per-resource history
    pub resource_history: Vec<CrmmonResourceHistory>,
}

/// History of one resource on one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonResourceHistory {
    /// Resource id
    pub name: String,
    /// Migration threshold
    pub migration_threshold: i32,
    /// Failures recorded on the node
    pub fail_count: u32,
}

/// A resource as seen at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonResource {
    /// Resource id
    pub id: String,
    /// Resource agent, e.g. `ocf::heartbeat:IPaddr2`
    pub agent: String,
    /// Role, e.g. `Started`
    pub role: String,
    /// Running
    pub active: bool,
    /// Orphaned
    pub orphaned: bool,
    /// Blocked
    pub blocked: bool,
    /// Managed by the cluster
    pub managed: bool,
    /// Failed
    pub failed: bool,
    /// Failed, failure ignored
    pub failure_ignored: bool,
    /// Number of nodes the resource runs on
    pub nodes_running_on: u32,
    /// Node the resource runs on
    pub node: Option<CrmmonResourceNode>,
}

/// Placement of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonResourceNode {
    /// Node name
    pub name: String,
    /// Node id
    pub id: String,
    /// Cached placement
    pub cached: bool,
}

/// A resource group at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonGroup {
    /// Group id
    pub id: String,
    /// Members
    pub resources: Vec<CrmmonResource>,
}

/// A clone set at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CrmmonClone {
    /// Clone id
    pub id: String,
    /// Multi-state clone
    pub multi_state: bool,
    /// Managed by the cluster
    pub managed: bool,
    /// Failed
    pub failed: bool,
    /// Failed, failure ignored
    pub failure_ignored: bool,
    /// Clone instances
    pub resources: Vec<CrmmonResource>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use discovery_testing::fixtures;
    use serde_json::json;

    #[test]
    fn host_payload_rejects_unknown_fields() {
        let err = serde_json::from_value::<HostPayload>(json!({
            "host_name": "h1",
            "unexpected": 1
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown field `unexpected`"));
    }

    #[test]
    fn host_payload_fills_optional_fields() {
        let payload: HostPayload = serde_json::from_value(json!({
            "host_name": "h1",
            "host_ip_addresses": ["10.0.0.5"],
            "agent_version": "1.2.3"
        }))
        .unwrap();
        assert_eq!(payload.host_name, "h1");
        assert_eq!(payload.cpu_count, 0);
        assert!(payload.agent_bind_address.is_empty());
    }

    #[test]
    fn cloud_payload_accepts_bare_provider() {
        let payload: CloudPayload = serde_json::from_value(json!({"provider": "azure"})).unwrap();
        assert_eq!(payload.provider, "azure");
        assert!(payload.metadata.is_none());
    }

    #[test]
    fn nested_cluster_fields_are_strict_too() {
        let err = serde_json::from_value::<ClusterPayload>(json!({
            "Id": "c1",
            "Crmmon": {"Summary": {"Nodes": {"Number": 2, "Online": 2}}}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown field `Online`"));
    }

    #[test]
    fn complete_agent_documents_decode() {
        let host: HostPayload = serde_json::from_value(fixtures::full_host_payload("h1")).unwrap();
        assert_eq!(host.socket_count, 2);
        assert_eq!(host.os_version, "15.3");

        let cloud: CloudPayload = serde_json::from_value(fixtures::azure_cloud_payload()).unwrap();
        assert!(cloud.metadata.is_some());

        let systems: SapSystemsPayload =
            serde_json::from_value(fixtures::full_sap_systems_payload("PRD")).unwrap();
        assert_eq!(systems[0].sid, "PRD");
        assert!(systems[0].instances.is_some());

        let subscriptions: SubscriptionsPayload =
            serde_json::from_value(fixtures::subscriptions_payload(&[("SLES_SAP", "15.3")]))
                .unwrap();
        assert_eq!(subscriptions[0].kind, "internal");

        let cluster: ClusterPayload =
            serde_json::from_value(fixtures::cluster_scale_up_payload("c1", "hana_cluster"))
                .unwrap();
        assert!(cluster.crmmon.summary.cluster_options.stonith_enabled);
        assert!(cluster.sbd.is_some());
        assert!(cluster.cib.configuration.constraints.is_some());
        assert!(cluster.crmmon.nodes.is_some());
    }

    #[test]
    fn sap_systems_payload_is_a_list() {
        let payload: SapSystemsPayload =
            serde_json::from_value(json!([{"SID": "PRD"}, {"SID": "QAS", "Type": 1}])).unwrap();
        assert_eq!(payload.len(), 2);
        assert_eq!(payload[1].kind, 1);
    }
}
