//! # Discovery Core
//!
//! Core types and storage traits for the discovery projection pipeline.
//!
//! Agents periodically report discovery facts (host inventory, cloud metadata,
//! cluster topology, SAP systems, OS subscriptions). Each fact is persisted
//! upstream as an immutable [`DiscoveryEvent`] and then projected into
//! denormalized read-models that external readers query.
//!
//! ## Core Concepts
//!
//! - **Event**: one discovery fact from one agent, identified by a
//!   store-assigned, strictly increasing id
//! - **Subscription**: per `(agent, discovery type)` cursor recording the last
//!   event applied
//! - **Read-model**: denormalized `Host`, `Cluster` and `Telemetry` rows
//! - **Store**: transactional backend that writes the cursor and the read-model
//!   atomically
//!
//! ## Data Flow
//!
//! ```text
//! ingestion → queue → worker → projector → handler → transaction(cursor + read-model)
//! ```
//!
//! This crate holds only the vocabulary shared by the pipeline crates. The
//! projector and handlers live in `discovery-projections`, the queue and worker
//! pool in `discovery-runtime`, and the storage backends in `discovery-postgres`
//! and `discovery-testing`.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod event;
pub mod projection;
pub mod read_model;
pub mod subscription;

pub use event::{DiscoveryEvent, DiscoveryType, UnknownDiscoveryType};
pub use projection::{
    ProjectionError, ProjectionOutcome, ReadModelStore, ReadModelTransaction, Result,
};
pub use read_model::{
    Cluster, ClusterDetail, ClusterNode, ClusterNodeResource, ClusterSnapshot, ClusterType, Host,
    HostPatch, ReadModelUpsert, ResourceStatus, Telemetry, TelemetryPatch,
};
pub use subscription::{CursorAdvance, CursorPolicy, Subscription, SubscriptionCursor};

/// Environment module - injected dependencies
///
/// All time-dependent code takes a [`Clock`](environment::Clock) so tests can
/// pin timestamps.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use discovery_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let now = clock.now();
    /// assert!(now <= chrono::Utc::now());
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock used in production.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
