//! `clusters` projector: one row per pacemaker cluster.

use super::hana;
use super::payload::{self, ClusterPayload, CibPrimitive, CrmmonResource};
use crate::projector::Projector;
use chrono::{DateTime, NaiveDateTime, Utc};
use discovery_core::environment::Clock;
use discovery_core::{
    ClusterDetail, ClusterNode, ClusterNodeResource, ClusterSnapshot, ClusterType,
    DiscoveryEvent, DiscoveryType, ProjectionError, ReadModelStore, ReadModelUpsert,
    ResourceStatus, Result,
};
use std::sync::Arc;

/// Projector name.
pub const NAME: &str = "clusters";

const HANA_TOPOLOGY_AGENT: &str = "ocf::suse:SAPHanaTopology";
const HANA_SCALE_UP_AGENT: &str = "ocf::suse:SAPHana";
const HANA_SCALE_OUT_AGENT: &str = "ocf::suse:SAPHanaController";
const VIRTUAL_IP_AGENT: &str = "ocf::heartbeat:IPaddr2";
const STONITH_AGENT_PREFIX: &str = "stonith:";
const STONITH_NOT_CONFIGURED: &str = "notconfigured";
const LAST_CHANGE_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Build the `clusters` projector.
///
/// # Errors
///
/// Fails only on duplicate handler registration.
pub fn projector<S: ReadModelStore>(store: Arc<S>, clock: Arc<dyn Clock>) -> Result<Projector<S>> {
    Projector::new(NAME, store, clock).with_handler(DiscoveryType::Cluster, cluster_discovery)
}

/// `cluster` → full cluster row.
///
/// # Errors
///
/// Decode errors, and [`ProjectionError::Transform`] when the payload has no
/// cluster id.
pub fn cluster_discovery(event: &DiscoveryEvent) -> Result<Option<ReadModelUpsert>> {
    let cluster: ClusterPayload = payload::decode(event, DiscoveryType::Cluster)?;
    let snapshot = transform(&cluster).inspect_err(|e| {
        tracing::error!(
            agent_id = %event.agent_id,
            event_id = event.id,
            error = %e,
            "Can't transform cluster data"
        );
    })?;
    Ok(Some(ReadModelUpsert::Cluster(Box::new(snapshot))))
}

/// Turn a cluster payload into the stored snapshot.
///
/// # Errors
///
/// Returns [`ProjectionError::Transform`] when the cluster id is empty.
pub fn transform(cluster: &ClusterPayload) -> Result<ClusterSnapshot> {
    if cluster.id.is_empty() {
        return Err(ProjectionError::Transform("no cluster ID found".to_string()));
    }

    let cluster_type = detect_cluster_type(cluster);
    let detail = cluster_type.is_hana().then(|| hana_detail(cluster));

    Ok(ClusterSnapshot {
        id: cluster.id.clone(),
        name: cluster.name.clone(),
        cluster_type,
        sids: sids(cluster),
        resources_number: cluster.crmmon.summary.resources.number,
        hosts_number: cluster.crmmon.summary.nodes.number,
        detail,
    })
}

/// Classify the cluster from its cloned resource agents.
///
/// Checked in order: scale-up, scale-out, unknown.
#[must_use]
pub fn detect_cluster_type(cluster: &ClusterPayload) -> ClusterType {
    let agents = || {
        cluster
            .crmmon
            .clones
            .iter()
            .flat_map(|clone| &clone.resources)
            .map(|resource| resource.agent.as_str())
    };
    let has = |agent: &str| agents().any(|a| a == agent);

    let topology = has(HANA_TOPOLOGY_AGENT);
    if topology && has(HANA_SCALE_UP_AGENT) {
        ClusterType::HanaScaleUp
    } else if topology && has(HANA_SCALE_OUT_AGENT) {
        ClusterType::HanaScaleOut
    } else {
        ClusterType::Unknown
    }
}

/// SIDs from the `SID` instance attribute of cloned `SAPHanaTopology` primitives.
#[must_use]
pub fn sids(cluster: &ClusterPayload) -> Vec<String> {
    cluster
        .cib
        .configuration
        .resources
        .clones
        .iter()
        .filter(|clone| clone.primitive.kind == "SAPHanaTopology")
        .flat_map(|clone| &clone.primitive.instance_attributes)
        .filter(|attribute| attribute.name == "SID" && !attribute.value.is_empty())
        .map(|attribute| attribute.value.clone())
        .collect()
}

fn hana_detail(cluster: &ClusterPayload) -> ClusterDetail {
    let nodes = nodes(cluster);
    let sid = sids(cluster).into_iter().next().unwrap_or_default();

    let mut detail = ClusterDetail {
        cib_last_written: parse_last_change(&cluster.crmmon.summary.last_change.time),
        stonith_type: fencing_type(cluster),
        stopped_resources: stopped_resources(cluster),
        ..ClusterDetail::default()
    };

    if let Some(first) = nodes.first() {
        let owned = |name: &str| hana::attribute(first, &sid, name).unwrap_or_default().to_string();
        detail.system_replication_mode = owned("srmode");
        detail.system_replication_operation_mode = owned("op_mode");
        detail.sr_health_state = hana::roles(first, &sid)
            .map(|roles| roles.health)
            .unwrap_or_default();
        detail.secondary_sync_state = secondary_sync_state(&nodes, &sid);
    }

    detail.nodes = nodes;
    detail
}

fn secondary_sync_state(nodes: &[ClusterNode], sid: &str) -> String {
    nodes
        .iter()
        .filter(|node| {
            hana::roles(node, sid).is_some_and(|roles| roles.status == hana::HanaStatus::Secondary)
        })
        .find_map(|node| hana::attribute(node, sid, "sync_state"))
        .unwrap_or_default()
        .to_string()
}

fn nodes(cluster: &ClusterPayload) -> Vec<ClusterNode> {
    let crmmon = &cluster.crmmon;
    let resources: Vec<&CrmmonResource> = crmmon
        .resources
        .iter()
        .chain(crmmon.groups.iter().flat_map(|group| &group.resources))
        .chain(crmmon.clones.iter().flat_map(|clone| &clone.resources))
        .collect();

    let configured = &cluster.cib.configuration.resources;
    let primitives: Vec<&CibPrimitive> = configured
        .primitives
        .iter()
        .chain(configured.groups.iter().flat_map(|group| &group.primitives))
        .collect();

    crmmon
        .node_attributes
        .nodes
        .iter()
        .map(|attributes| {
            let mut node = ClusterNode {
                name: attributes.name.clone(),
                attributes: attributes
                    .attributes
                    .iter()
                    .map(|a| (a.name.clone(), a.value.clone()))
                    .collect(),
                ..ClusterNode::default()
            };

            for resource in resources
                .iter()
                .filter(|r| r.node.as_ref().is_some_and(|n| n.name == node.name))
            {
                if resource.agent == VIRTUAL_IP_AGENT {
                    if let Some(ip) = primitives
                        .iter()
                        .filter(|p| p.id == resource.id)
                        .find_map(|p| p.instance_attributes.first())
                    {
                        node.virtual_ips.push(ip.value.clone());
                    }
                }

                node.resources.push(ClusterNodeResource {
                    id: resource.id.clone(),
                    kind: resource.agent.clone(),
                    role: resource.role.clone(),
                    status: resource_status(resource),
                    fail_count: fail_count(cluster, &node.name, &resource.id),
                });
            }

            node
        })
        .collect()
}

fn resource_status(resource: &CrmmonResource) -> Option<ResourceStatus> {
    if resource.active {
        Some(ResourceStatus::Active)
    } else if resource.blocked {
        Some(ResourceStatus::Blocked)
    } else if resource.failed {
        Some(ResourceStatus::Failed)
    } else if resource.failure_ignored {
        Some(ResourceStatus::FailureIgnored)
    } else if resource.orphaned {
        Some(ResourceStatus::Orphaned)
    } else {
        None
    }
}

fn fail_count(cluster: &ClusterPayload, node: &str, resource: &str) -> u32 {
    cluster
        .crmmon
        .node_history
        .nodes
        .iter()
        .filter(|history| history.name == node)
        .flat_map(|history| &history.resource_history)
        .find(|entry| entry.name == resource)
        .map_or(0, |entry| entry.fail_count)
}

fn fencing_type(cluster: &ClusterPayload) -> String {
    cluster
        .crmmon
        .resources
        .iter()
        .find(|r| r.agent.starts_with(STONITH_AGENT_PREFIX))
        .and_then(|r| r.agent.split(':').nth(1))
        .unwrap_or(STONITH_NOT_CONFIGURED)
        .to_string()
}

fn stopped_resources(cluster: &ClusterPayload) -> Vec<ClusterNodeResource> {
    cluster
        .crmmon
        .resources
        .iter()
        .filter(|r| r.nodes_running_on == 0 && !r.active)
        .map(|r| ClusterNodeResource {
            id: r.id.clone(),
            ..ClusterNodeResource::default()
        })
        .collect()
}

/// Parse a `crm_mon` last change time such as `Fri Oct 18 11:48:54 2019`.
///
/// Unparseable values yield `None`.
#[must_use]
pub fn parse_last_change(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, LAST_CHANGE_FORMAT)
        .ok()
        .map(|time| time.and_utc())
}
