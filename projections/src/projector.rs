//! The projector: a named set of handlers plus the transactional apply protocol.
//!
//! # Protocol
//!
//! For every event a projector is interested in:
//!
//! 1. open a transaction
//! 2. upsert the `(agent, discovery type)` cursor
//! 3. run the handler and write the read-model columns it produced
//! 4. commit, or roll back on any error
//!
//! The whole sequence runs under a deadline. When the deadline fires the
//! in-flight future is dropped, and with it the open transaction.
//!
//! # Example
//!
//! ```ignore
//! let projector = Projector::new("hosts", store, clock)
//!     .with_handler(DiscoveryType::Host, hosts::host_discovery)?
//!     .with_handler(DiscoveryType::Cloud, hosts::cloud_discovery)?;
//!
//! match projector.project(&event).await? {
//!     ProjectionOutcome::Applied => {}
//!     ProjectionOutcome::NotInterested => {}
//!     ProjectionOutcome::Stale { last_seen_event_id } => {}
//! }
//! ```

use discovery_core::environment::Clock;
use discovery_core::{
    CursorAdvance, CursorPolicy, DiscoveryEvent, DiscoveryType, ProjectionError,
    ProjectionOutcome, ReadModelStore, ReadModelTransaction, ReadModelUpsert, Result,
    SubscriptionCursor,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Deadline applied to one `project` call unless configured otherwise.
pub const DEFAULT_PROJECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pure transform from an event payload into a read-model write.
///
/// `Ok(None)` means the event is valid but carries nothing to write; the
/// cursor still advances.
pub type Handler = fn(&DiscoveryEvent) -> Result<Option<ReadModelUpsert>>;

/// A named group of handlers keyed by discovery type.
pub struct Projector<S: ReadModelStore> {
    name: String,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    cursor_policy: CursorPolicy,
    timeout: Duration,
    handlers: HashMap<DiscoveryType, Handler>,
}

impl<S: ReadModelStore> Projector<S> {
    /// Create a projector without handlers.
    #[must_use]
    pub fn new(name: impl Into<String>, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            store,
            clock,
            cursor_policy: CursorPolicy::default(),
            timeout: DEFAULT_PROJECT_TIMEOUT,
            handlers: HashMap::new(),
        }
    }

    /// Set how stale events are treated.
    #[must_use]
    pub const fn with_cursor_policy(mut self, policy: CursorPolicy) -> Self {
        self.cursor_policy = policy;
        self
    }

    /// Set the deadline of one `project` call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register `handler` for `discovery_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::DuplicateHandler`] if a handler is already
    /// registered for `discovery_type`. The existing handler is kept.
    pub fn add_handler(&mut self, discovery_type: DiscoveryType, handler: Handler) -> Result<()> {
        if self.handlers.contains_key(&discovery_type) {
            return Err(ProjectionError::DuplicateHandler {
                projector: self.name.clone(),
                discovery_type,
            });
        }
        self.handlers.insert(discovery_type, handler);
        Ok(())
    }

    /// Builder form of [`Projector::add_handler`].
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::DuplicateHandler`] on duplicate registration.
    pub fn with_handler(mut self, discovery_type: DiscoveryType, handler: Handler) -> Result<Self> {
        self.add_handler(discovery_type, handler)?;
        Ok(self)
    }

    /// Projector name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered discovery types, sorted.
    #[must_use]
    pub fn discovery_types(&self) -> Vec<DiscoveryType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Project one event.
    ///
    /// Returns [`ProjectionOutcome::NotInterested`] without touching storage
    /// when no handler is registered for the event's discovery type,
    /// including types outside [`DiscoveryType`].
    ///
    /// # Errors
    ///
    /// - [`ProjectionError::Decode`] / [`ProjectionError::Transform`] from the handler
    /// - [`ProjectionError::Storage`] from the store
    /// - [`ProjectionError::Timeout`] when the deadline fires
    ///
    /// In every error case neither the cursor nor the read-model changed.
    pub async fn project(&self, event: &DiscoveryEvent) -> Result<ProjectionOutcome> {
        let Some(handler) = event.kind().and_then(|kind| self.handlers.get(&kind).copied()) else {
            tracing::info!(
                projector = %self.name,
                agent_id = %event.agent_id,
                discovery_type = %event.discovery_type,
                event_id = event.id,
                "Projector not interested in discovery type"
            );
            return Ok(ProjectionOutcome::NotInterested);
        };

        match tokio::time::timeout(self.timeout, self.apply(handler, event)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ProjectionError::Timeout {
                projector: self.name.clone(),
                event_id: event.id,
                timeout: self.timeout,
            }),
        }
    }

    async fn apply(&self, handler: Handler, event: &DiscoveryEvent) -> Result<ProjectionOutcome> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let cursor = SubscriptionCursor::for_event(event, now);
        match tx.advance_cursor(&cursor, self.cursor_policy).await {
            Ok(CursorAdvance::Advanced) => {}
            Ok(CursorAdvance::Stale { last_seen_event_id }) => {
                tx.rollback().await?;
                tracing::debug!(
                    projector = %self.name,
                    agent_id = %event.agent_id,
                    discovery_type = %event.discovery_type,
                    event_id = event.id,
                    last_seen_event_id,
                    "Skipping stale event"
                );
                return Ok(ProjectionOutcome::Stale { last_seen_event_id });
            }
            Err(e) => return Err(self.abort(tx, e).await),
        }

        let upsert = match handler(event) {
            Ok(upsert) => upsert,
            Err(e) => return Err(self.abort(tx, e).await),
        };

        if let Some(upsert) = upsert {
            if let Err(e) = tx.apply(&upsert, now).await {
                return Err(self.abort(tx, e).await);
            }
        }

        tx.commit().await?;
        Ok(ProjectionOutcome::Applied)
    }

    /// Roll back `tx` and hand back the error that caused it.
    async fn abort(&self, tx: S::Transaction, cause: ProjectionError) -> ProjectionError {
        if let Err(e) = tx.rollback().await {
            tracing::warn!(
                projector = %self.name,
                error = %e,
                "Rollback failed, transaction discarded"
            );
        }
        cause
    }
}

impl<S: ReadModelStore> fmt::Debug for Projector<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projector")
            .field("name", &self.name)
            .field("cursor_policy", &self.cursor_policy)
            .field("timeout", &self.timeout)
            .field("discovery_types", &self.discovery_types())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use discovery_testing::{InMemoryReadModelStore, discovery_event, test_clock};
    use serde_json::json;

    fn noop(_: &DiscoveryEvent) -> Result<Option<ReadModelUpsert>> {
        Ok(None)
    }

    fn projector(store: &InMemoryReadModelStore) -> Projector<InMemoryReadModelStore> {
        Projector::new("test", Arc::new(store.clone()), Arc::new(test_clock()))
    }

    #[test]
    fn duplicate_handler_registration_fails() {
        let store = InMemoryReadModelStore::new();
        let mut projector = projector(&store);

        projector.add_handler(DiscoveryType::Host, noop).unwrap();
        let err = projector.add_handler(DiscoveryType::Host, noop).unwrap_err();

        assert!(matches!(
            err,
            ProjectionError::DuplicateHandler {
                discovery_type: DiscoveryType::Host,
                ..
            }
        ));
        assert_eq!(projector.discovery_types(), vec![DiscoveryType::Host]);
    }

    #[tokio::test]
    async fn handler_returning_nothing_still_advances_cursor() {
        let store = InMemoryReadModelStore::new();
        let projector = projector(&store)
            .with_handler(DiscoveryType::Subscription, noop)
            .unwrap();

        let event = discovery_event(3, "A", "subscription", json!([]));
        let outcome = projector.project(&event).await.unwrap();

        assert_eq!(outcome, ProjectionOutcome::Applied);
        let cursor = store.subscription("A", "subscription").await.unwrap();
        assert_eq!(cursor.last_seen_event_id, 3);
        assert!(store.snapshot().await.hosts.is_empty());
    }

    #[tokio::test]
    async fn not_interested_does_not_open_a_transaction() {
        let store = InMemoryReadModelStore::new();
        let projector = projector(&store)
            .with_handler(DiscoveryType::Host, noop)
            .unwrap();

        let event = discovery_event(1, "A", "cloud", json!({"provider": "azure"}));
        let outcome = projector.project(&event).await.unwrap();

        assert_eq!(outcome, ProjectionOutcome::NotInterested);
        assert_eq!(store.commit_count(), 0);
    }
}
