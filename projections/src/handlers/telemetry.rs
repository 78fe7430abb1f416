//! `telemetry` projector: hardware and OS facts per agent.

use super::payload::{self, CloudPayload, HostPayload, SubscriptionsPayload};
use crate::projector::Projector;
use discovery_core::environment::Clock;
use discovery_core::{
    DiscoveryEvent, DiscoveryType, ProjectionError, ReadModelStore, ReadModelUpsert, Result,
    TelemetryPatch,
};
use std::sync::Arc;

/// Projector name.
pub const NAME: &str = "telemetry";

/// Build the `telemetry` projector.
///
/// # Errors
///
/// Fails only on duplicate handler registration.
pub fn projector<S: ReadModelStore>(store: Arc<S>, clock: Arc<dyn Clock>) -> Result<Projector<S>> {
    Projector::new(NAME, store, clock)
        .with_handler(DiscoveryType::Host, host_discovery)?
        .with_handler(DiscoveryType::Cloud, cloud_discovery)?
        .with_handler(DiscoveryType::Subscription, subscription_discovery)
}

/// `host` → host name, CPU and socket counts, memory.
///
/// # Errors
///
/// Decode errors, and [`ProjectionError::Transform`] when a count does not
/// fit the stored column.
pub fn host_discovery(event: &DiscoveryEvent) -> Result<Option<ReadModelUpsert>> {
    let host: HostPayload = payload::decode(event, DiscoveryType::Host)?;
    Ok(Some(ReadModelUpsert::Telemetry {
        agent_id: event.agent_id.clone(),
        patch: TelemetryPatch::HostFacts {
            host_name: host.host_name,
            cpu_count: column("cpu_count", host.cpu_count)?,
            socket_count: column("socket_count", host.socket_count)?,
            total_memory_mb: column("total_memory_mb", host.total_memory_mb)?,
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
    Ok(Some(ReadModelUpsert::Telemetry {
        agent_id: event.agent_id.clone(),
        patch: TelemetryPatch::CloudProvider {
            provider: cloud.provider,
        },
    }))
}

/// `subscription` → SLES version of the first record.
///
/// An empty subscription list writes nothing.
///
/// # Errors
///
/// Returns a decode error on schema mismatch.
pub fn subscription_discovery(event: &DiscoveryEvent) -> Result<Option<ReadModelUpsert>> {
    let subscriptions: SubscriptionsPayload = payload::decode(event, DiscoveryType::Subscription)?;
    Ok(subscriptions
        .into_iter()
        .next()
        .map(|first| ReadModelUpsert::Telemetry {
            agent_id: event.agent_id.clone(),
            patch: TelemetryPatch::OsVersion {
                sles_version: first.version,
            },
        }))
}

fn column<T, U>(name: &str, value: T) -> Result<U>
where
    T: Copy + std::fmt::Display,
    U: TryFrom<T>,
{
    U::try_from(value)
        .map_err(|_| ProjectionError::Transform(format!("{name} out of range: {value}")))
}
