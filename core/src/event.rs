//! Discovery events reported by agents.
//!
//! A [`DiscoveryEvent`] is one fact from one agent. Events are created by the
//! ingestion boundary, which persists them first (assigning the id) and only
//! then hands them to the projection pipeline. The pipeline never mutates or
//! deletes them.
//!
//! # Wire shape
//!
//! ```json
//! {
//!   "id": 42,
//!   "agent_id": "779cdd70-e9e2-58ca-b18a-bf3eb3f71244",
//!   "discovery_type": "host",
//!   "payload": { "host_name": "vmhana01", "host_ip_addresses": ["10.0.0.5"] },
//!   "created_at": "2025-01-01T00:00:00Z"
//! }
//! ```
//!
//! `discovery_type` stays a plain string on the event: the set of types a
//! projector understands is closed ([`DiscoveryType`]), but agents may report
//! types nobody projects, and those must flow through as no-ops rather than
//! fail deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The discovery types the pipeline knows how to project.
///
/// # Example
///
/// ```
/// use discovery_core::DiscoveryType;
///
/// let kind: DiscoveryType = "sap_system".parse().unwrap();
/// assert_eq!(kind, DiscoveryType::SapSystem);
/// assert_eq!(kind.as_str(), "sap_system");
/// assert!("unknown_xyz".parse::<DiscoveryType>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryType {
    /// Host identity: name, addresses, agent version, hardware facts
    Host,
    /// Cloud provider metadata
    Cloud,
    /// Pacemaker cluster topology snapshot
    Cluster,
    /// SAP systems running on the host
    SapSystem,
    /// OS subscription records
    Subscription,
}

impl DiscoveryType {
    /// Every known discovery type, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Host,
        Self::Cloud,
        Self::Cluster,
        Self::SapSystem,
        Self::Subscription,
    ];

    /// Wire representation of this discovery type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Cloud => "cloud",
            Self::Cluster => "cluster",
            Self::SapSystem => "sap_system",
            Self::Subscription => "subscription",
        }
    }
}

impl fmt::Display for DiscoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known [`DiscoveryType`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown discovery type: {0}")]
pub struct UnknownDiscoveryType(pub String);

impl FromStr for DiscoveryType {
    type Err = UnknownDiscoveryType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownDiscoveryType(s.to_string()))
    }
}

/// One discovery fact reported by one agent.
///
/// `id` is assigned by the event store at insert time. It is strictly
/// increasing across the whole system and is used as a cursor value; it says
/// nothing about the order in which events of different agents are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    /// Store-assigned, strictly increasing identifier
    pub id: i64,
    /// Opaque identifier of the reporting agent
    pub agent_id: String,
    /// Raw discovery type tag as reported by the agent
    pub discovery_type: String,
    /// Type-specific payload, decoded only inside a handler
    pub payload: serde_json::Value,
    /// Ingestion timestamp (informational)
    pub created_at: DateTime<Utc>,
}

impl DiscoveryEvent {
    /// Create an event.
    #[must_use]
    pub fn new(
        id: i64,
        agent_id: impl Into<String>,
        discovery_type: impl Into<String>,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            agent_id: agent_id.into(),
            discovery_type: discovery_type.into(),
            payload,
            created_at,
        }
    }

    /// The known discovery type of this event, if any.
    ///
    /// Returns `None` for types no projector can handle.
    #[must_use]
    pub fn kind(&self) -> Option<DiscoveryType> {
        self.discovery_type.parse().ok()
    }
}
