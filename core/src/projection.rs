//! Projection errors and the transactional storage seam.
//!
//! # Overview
//!
//! Projecting one event means writing two things in one transaction: the
//! subscription cursor of `(agent, discovery type)` and the read-model columns
//! the handler produced. Either both land or neither does.
//!
//! ```text
//! begin ─► advance_cursor ─┬─► Stale ─────────────► rollback
//!                          └─► Advanced ─► apply* ─► commit
//!                                  │          │
//!                                  └── Err ───┴────► rollback
//! ```
//!
//! Backends implement [`ReadModelStore`] and [`ReadModelTransaction`]. The
//! Postgres backend lives in `discovery-postgres`, an in-memory one for tests
//! in `discovery-testing`.
//!
//! ## Dropping a transaction
//!
//! A transaction dropped without [`ReadModelTransaction::commit`] must leave
//! no trace. The projector relies on this when a projection exceeds its
//! deadline and the in-flight future is cancelled.

use crate::event::DiscoveryType;
use crate::read_model::ReadModelUpsert;
use crate::subscription::{CursorAdvance, CursorPolicy, SubscriptionCursor};
use crate::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

/// Error type for projection operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// The payload does not match the strict schema of its discovery type
    #[error("Failed to decode {discovery_type} payload: {source}")]
    Decode {
        /// Discovery type whose schema was violated
        discovery_type: String,
        /// Underlying decoding error
        #[source]
        source: serde_json::Error,
    },

    /// The payload decoded but cannot be turned into a read-model write
    #[error("Transform error: {0}")]
    Transform(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// A handler was registered twice for the same discovery type
    #[error("Projector {projector} already has a handler for {discovery_type}")]
    DuplicateHandler {
        /// Projector name
        projector: String,
        /// Discovery type registered twice
        discovery_type: DiscoveryType,
    },

    /// Two projectors share a name
    #[error("Projector {0} registered twice")]
    DuplicateProjector(String),

    /// The projection did not finish before its deadline
    #[error("Projector {projector} timed out after {timeout:?} on event {event_id}")]
    Timeout {
        /// Projector name
        projector: String,
        /// Event being projected
        event_id: i64,
        /// Configured deadline
        timeout: Duration,
    },
}

impl ProjectionError {
    /// Build a [`ProjectionError::Decode`] for `discovery_type`.
    #[must_use]
    pub fn decode(discovery_type: DiscoveryType, source: serde_json::Error) -> Self {
        Self::Decode {
            discovery_type: discovery_type.as_str().to_string(),
            source,
        }
    }

    /// Short label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Transform(_) => "transform",
            Self::Storage(_) => "storage",
            Self::DuplicateHandler { .. } => "duplicate_handler",
            Self::DuplicateProjector(_) => "duplicate_projector",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// What happened when a projector saw an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// Cursor and read-model were committed
    Applied,
    /// The projector has no handler for the event's discovery type
    NotInterested,
    /// A newer event was already applied for this `(agent, type)`; nothing written
    Stale {
        /// Cursor value that superseded the event
        last_seen_event_id: i64,
    },
}

/// Transactional backend for cursors and read-models.
///
/// # Example
///
/// ```ignore
/// let mut tx = store.begin().await?;
/// match tx.advance_cursor(&cursor, CursorPolicy::SkipStale).await? {
///     CursorAdvance::Advanced => {
///         tx.apply(&upsert, now).await?;
///         tx.commit().await?;
///     }
///     CursorAdvance::Stale { .. } => tx.rollback().await?,
/// }
/// ```
pub trait ReadModelStore: Send + Sync + 'static {
    /// Transaction handle produced by [`ReadModelStore::begin`].
    type Transaction: ReadModelTransaction;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the backend cannot start one.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;
}

/// One open projection transaction.
pub trait ReadModelTransaction: Send {
    /// Upsert the subscription cursor.
    ///
    /// With [`CursorPolicy::SkipStale`] the write only happens when the stored
    /// cursor is not ahead of `cursor.event_id`; otherwise
    /// [`CursorAdvance::Stale`] is returned and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the write fails.
    fn advance_cursor(
        &mut self,
        cursor: &SubscriptionCursor,
        policy: CursorPolicy,
    ) -> impl Future<Output = Result<CursorAdvance>> + Send;

    /// Upsert read-model columns, stamping `updated_at` with `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the write fails.
    fn apply(
        &mut self,
        upsert: &ReadModelUpsert,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Make every write of this transaction visible.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the commit fails, in which case
    /// nothing was written.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    /// Discard every write of this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the backend reports a failure.
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}
