//! `hosts` projector: the host read-model, fed by four discovery types.

use super::payload::{self, CloudPayload, ClusterPayload, HostPayload, SapSystemsPayload};
use crate::projector::Projector;
use discovery_core::environment::Clock;
use discovery_core::{
    DiscoveryEvent, DiscoveryType, HostPatch, ReadModelStore, ReadModelUpsert, Result,
};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Projector name.
pub const NAME: &str = "hosts";

/// Build the `hosts` projector.
///
/// # Errors
///
/// Fails only on duplicate handler registration.
pub fn projector<S: ReadModelStore>(store: Arc<S>, clock: Arc<dyn Clock>) -> Result<Projector<S>> {
    Projector::new(NAME, store, clock)
        .with_handler(DiscoveryType::Host, host_discovery)?
        .with_handler(DiscoveryType::Cloud, cloud_discovery)?
        .with_handler(DiscoveryType::Cluster, cluster_discovery)?
        .with_handler(DiscoveryType::SapSystem, sap_system_discovery)
}

/// `host` → name, routable IPv4 addresses, agent version, bind address.
///
/// # Errors
///
/// Returns a decode error on schema mismatch.
pub fn host_discovery(event: &DiscoveryEvent) -> Result<Option<ReadModelUpsert>> {
    let host: HostPayload = payload::decode(event, DiscoveryType::Host)?;
    Ok(Some(ReadModelUpsert::Host {
        agent_id: event.agent_id.clone(),
        patch: HostPatch::Identity {
            name: host.host_name,
            ip_addresses: routable_ipv4(&host.host_ip_addresses),
            agent_version: host.agent_version,
            bind_address: host.agent_bind_address,
        },
    }))
}

/// `cloud` → cloud provider.
///
/// # Errors
///
/// Returns a decode error on schema mismatch.
pub fn cloud_discovery(event: &DiscoveryEvent) -> Result<Option<ReadModelUpsert>> {
    let cloud: CloudPayload = payload::decode(event, DiscoveryType::Cloud)?;
    Ok(Some(ReadModelUpsert::Host {
        agent_id: event.agent_id.clone(),
        patch: HostPatch::CloudProvider {
            provider: cloud.provider,
        },
    }))
}

/// `cluster` → cluster id and name.
///
/// # Errors
///
/// Returns a decode error on schema mismatch.
pub fn cluster_discovery(event: &DiscoveryEvent) -> Result<Option<ReadModelUpsert>> {
    let cluster: ClusterPayload = payload::decode(event, DiscoveryType::Cluster)?;
    Ok(Some(ReadModelUpsert::Host {
        agent_id: event.agent_id.clone(),
        patch: HostPatch::Cluster {
            cluster_id: cluster.id,
            cluster_name: cluster.name,
        },
    }))
}

/// `sap_system` → SIDs.
///
/// # Errors
///
/// Returns a decode error on schema mismatch.
pub fn sap_system_discovery(event: &DiscoveryEvent) -> Result<Option<ReadModelUpsert>> {
    let systems: SapSystemsPayload = payload::decode(event, DiscoveryType::SapSystem)?;
    Ok(Some(ReadModelUpsert::Host {
        agent_id: event.agent_id.clone(),
        patch: HostPatch::SapSystems {
            sids: systems.into_iter().map(|system| system.sid).collect(),
        },
    }))
}

/// Keep addresses that are IPv4 and reachable from outside the host.
///
/// Drops IPv6, loopback, unspecified, link-local, broadcast, multicast and
/// anything unparseable. Private ranges are kept.
#[must_use]
pub fn routable_ipv4(addresses: &[String]) -> Vec<String> {
    addresses
        .iter()
        .filter(|address| {
            address.parse::<Ipv4Addr>().is_ok_and(|ip| {
                !(ip.is_loopback()
                    || ip.is_unspecified()
                    || ip.is_link_local()
                    || ip.is_broadcast()
                    || ip.is_multicast())
            })
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use discovery_core::ProjectionError;
    use discovery_testing::{discovery_event, fixtures};
    use serde_json::json;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn only_routable_ipv4_addresses_survive() {
        let kept = routable_ipv4(&strings(&[
            "10.0.0.5",
            "127.0.0.1",
            "::1",
            "fe80::1",
            "169.254.1.1",
            "0.0.0.0",
            "255.255.255.255",
            "224.0.0.1",
            "192.168.1.10",
            "not-an-ip",
        ]));
        assert_eq!(kept, strings(&["10.0.0.5", "192.168.1.10"]));
    }

    #[test]
    fn host_event_becomes_identity_patch() {
        let event = discovery_event(
            2,
            "A",
            "host",
            fixtures::host_payload("h1", &["10.0.0.5", "127.0.0.1"], "1.2.3"),
        );

        let upsert = host_discovery(&event).unwrap().unwrap();

        assert_eq!(
            upsert,
            ReadModelUpsert::Host {
                agent_id: "A".to_string(),
                patch: HostPatch::Identity {
                    name: "h1".to_string(),
                    ip_addresses: strings(&["10.0.0.5"]),
                    agent_version: "1.2.3".to_string(),
                    bind_address: String::new(),
                },
            }
        );
    }

    #[test]
    fn cloud_event_with_extra_field_is_rejected() {
        let event = discovery_event(1, "A", "cloud", json!({"provider": "azure", "region": "x"}));
        let err = cloud_discovery(&event).unwrap_err();
        assert!(matches!(err, ProjectionError::Decode { .. }));
    }

    #[test]
    fn sap_systems_become_sids() {
        let event = discovery_event(4, "A", "sap_system", fixtures::sap_systems_payload(&["PRD", "HA1"]));
        let upsert = sap_system_discovery(&event).unwrap().unwrap();
        assert_eq!(
            upsert,
            ReadModelUpsert::Host {
                agent_id: "A".to_string(),
                patch: HostPatch::SapSystems {
                    sids: strings(&["PRD", "HA1"]),
                },
            }
        );
    }

    #[test]
    fn cluster_event_sets_cluster_columns() {
        let event = discovery_event(
            5,
            "A",
            "cluster",
            fixtures::cluster_scale_up_payload("c1", "hana_cluster"),
        );
        let upsert = cluster_discovery(&event).unwrap().unwrap();
        assert_eq!(
            upsert,
            ReadModelUpsert::Host {
                agent_id: "A".to_string(),
                patch: HostPatch::Cluster {
                    cluster_id: "c1".to_string(),
                    cluster_name: "hana_cluster".to_string(),
                },
            }
        );
    }
}
