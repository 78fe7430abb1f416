//! # Discovery Testing
//!
//! Testing utilities for the discovery projection pipeline.
//!
//! This crate provides:
//! - [`InMemoryReadModelStore`]: transactional in-memory backend
//! - [`FixedClock`]: deterministic time
//! - [`fixtures`]: realistic discovery payloads
//! - [`discovery_event`]: event builder pinned to the test clock
//!
//! ## Example
//!
//! ```ignore
//! use discovery_testing::{InMemoryReadModelStore, discovery_event, fixtures, test_clock};
//!
//! #[tokio::test]
//! async fn cloud_then_host() {
//!     let store = Arc::new(InMemoryReadModelStore::new());
//!     let projector = hosts::projector(Arc::clone(&store), Arc::new(test_clock()))?;
//!
//!     projector.project(&discovery_event(1, "A", "cloud", fixtures::cloud_payload("azure"))).await?;
//!
//!     let host = store.host("A").await.unwrap();
//!     assert_eq!(host.cloud_provider, "azure");
//! }
//! ```

#![recursion_limit = "256"]

use chrono::{DateTime, Utc};
use discovery_core::DiscoveryEvent;
use discovery_core::environment::Clock;

pub mod fixtures;
pub mod store;

pub use store::{InMemoryReadModelStore, InMemoryTransaction, Tables};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use discovery_testing::mocks::FixedClock;
    /// use discovery_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

/// Build an event stamped with the [`test_clock`] time.
#[must_use]
pub fn discovery_event(
    id: i64,
    agent_id: &str,
    discovery_type: &str,
    payload: serde_json::Value,
) -> DiscoveryEvent {
    DiscoveryEvent::new(id, agent_id, discovery_type, payload, test_clock().now())
}
