//! Subscription cursors.
//!
//! A subscription records, per `(agent_id, discovery_type)`, the id of the last
//! event whose projection committed. It is shared across projectors: when two
//! projectors both handle `host`, both write the same cursor row.

use crate::event::DiscoveryEvent;
use crate::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stored subscription row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Reporting agent
    pub agent_id: String,
    /// Discovery type tag
    pub discovery_type: String,
    /// Last applied event id
    pub last_seen_event_id: i64,
    /// When the cursor was last written
    pub updated_at: DateTime<Utc>,
}

/// The cursor write a projection performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionCursor {
    /// Reporting agent
    pub agent_id: String,
    /// Discovery type tag
    pub discovery_type: String,
    /// Event being applied
    pub event_id: i64,
    /// Write time
    pub seen_at: DateTime<Utc>,
}

impl SubscriptionCursor {
    /// The cursor `event` moves its subscription to.
    #[must_use]
    pub fn for_event(event: &DiscoveryEvent, seen_at: DateTime<Utc>) -> Self {
        Self {
            agent_id: event.agent_id.clone(),
            discovery_type: event.discovery_type.clone(),
            event_id: event.id,
            seen_at,
        }
    }
}

/// How the cursor upsert treats an event older than the stored cursor.
///
/// Events of the same `(agent, type)` can be dequeued by different workers
/// and committed out of id order.
///
/// | policy             | older event arrives after newer one           |
/// |--------------------|-----------------------------------------------|
/// | `SkipStale`        | nothing written, outcome is `Stale`           |
/// | `LastWriterWins`   | cursor and read-model rewound to older event  |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorPolicy {
    /// Only advance when the stored cursor is not ahead of the event
    #[default]
    SkipStale,
    /// Always overwrite the cursor
    LastWriterWins,
}

impl CursorPolicy {
    /// Configuration name of the policy.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SkipStale => "skip_stale",
            Self::LastWriterWins => "last_writer_wins",
        }
    }

    /// Whether a cursor currently at `stored` may move to `incoming`.
    ///
    /// Equal ids are accepted so that every projector sharing the cursor row
    /// can apply the same event.
    #[must_use]
    pub const fn permits(&self, stored: i64, incoming: i64) -> bool {
        match self {
            Self::SkipStale => stored <= incoming,
            Self::LastWriterWins => true,
        }
    }
}

impl fmt::Display for CursorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CursorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip_stale" | "skip-stale" => Ok(Self::SkipStale),
            "last_writer_wins" | "last-writer-wins" => Ok(Self::LastWriterWins),
            other => Err(format!(
                "invalid cursor policy '{other}', expected skip_stale or last_writer_wins"
            )),
        }
    }
}

/// Result of a cursor upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorAdvance {
    /// The cursor now points at the event
    Advanced,
    /// The stored cursor is ahead; nothing was written
    Stale {
        /// Stored cursor value
        last_seen_event_id: i64,
    },
}
