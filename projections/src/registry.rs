//! The fixed, ordered set of projectors every event fans out to.

use crate::handlers::{clusters, hosts, telemetry};
use crate::projector::Projector;
use discovery_core::environment::Clock;
use discovery_core::{CursorPolicy, ProjectionError, ReadModelStore, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Immutable collection of projectors, built once at startup.
///
/// Workers run every event through every projector in registration order.
#[derive(Debug)]
pub struct ProjectorRegistry<S: ReadModelStore> {
    projectors: Vec<Projector<S>>,
}

impl<S: ReadModelStore> ProjectorRegistry<S> {
    /// Build a registry.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::DuplicateProjector`] if two projectors share a name.
    pub fn new(projectors: Vec<Projector<S>>) -> Result<Self> {
        let mut names = HashSet::new();
        for projector in &projectors {
            if !names.insert(projector.name()) {
                return Err(ProjectionError::DuplicateProjector(
                    projector.name().to_string(),
                ));
            }
        }
        Ok(Self { projectors })
    }

    /// Projectors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Projector<S>> {
        self.projectors.iter()
    }

    /// Projector names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.projectors.iter().map(Projector::name).collect()
    }

    /// Number of projectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.projectors.len()
    }

    /// Whether the registry has no projectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projectors.is_empty()
    }
}

impl<'a, S: ReadModelStore> IntoIterator for &'a ProjectorRegistry<S> {
    type Item = &'a Projector<S>;
    type IntoIter = std::slice::Iter<'a, Projector<S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.projectors.iter()
    }
}

/// The production registry: `hosts`, `clusters`, `telemetry`.
///
/// # Errors
///
/// Only fails if the built-in projectors are misconfigured.
pub fn standard_registry<S: ReadModelStore>(
    store: &Arc<S>,
    clock: &Arc<dyn Clock>,
    cursor_policy: CursorPolicy,
    timeout: Duration,
) -> Result<ProjectorRegistry<S>> {
    let configure = |projector: Projector<S>| {
        projector
            .with_cursor_policy(cursor_policy)
            .with_timeout(timeout)
    };

    ProjectorRegistry::new(vec![
        configure(hosts::projector(Arc::clone(store), Arc::clone(clock))?),
        configure(clusters::projector(Arc::clone(store), Arc::clone(clock))?),
        configure(telemetry::projector(Arc::clone(store), Arc::clone(clock))?),
    ])
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use discovery_core::DiscoveryType;
    use discovery_testing::{InMemoryReadModelStore, test_clock};

    fn parts() -> (Arc<InMemoryReadModelStore>, Arc<dyn Clock>) {
        (Arc::new(InMemoryReadModelStore::new()), Arc::new(test_clock()))
    }

    #[test]
    fn standard_registry_layout() {
        let (store, clock) = parts();
        let registry =
            standard_registry(&store, &clock, CursorPolicy::SkipStale, Duration::from_secs(5))
                .unwrap();

        assert_eq!(registry.names(), vec!["hosts", "clusters", "telemetry"]);

        let handled: Vec<Vec<DiscoveryType>> =
            registry.iter().map(Projector::discovery_types).collect();
        assert_eq!(
            handled,
            vec![
                vec![
                    DiscoveryType::Host,
                    DiscoveryType::Cloud,
                    DiscoveryType::Cluster,
                    DiscoveryType::SapSystem
                ],
                vec![DiscoveryType::Cluster],
                vec![
                    DiscoveryType::Host,
                    DiscoveryType::Cloud,
                    DiscoveryType::Subscription
                ],
            ]
        );
    }

    #[test]
    fn duplicate_projector_names_are_rejected() {
        let (store, clock) = parts();
        let err = ProjectorRegistry::new(vec![
            hosts::projector(Arc::clone(&store), Arc::clone(&clock)).unwrap(),
            hosts::projector(store, clock).unwrap(),
        ])
        .unwrap_err();

        assert!(matches!(err, ProjectionError::DuplicateProjector(ref name) if name == "hosts"));
    }
}
