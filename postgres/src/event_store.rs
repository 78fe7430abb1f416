//! Append-only discovery event table.
//!
//! The id of an event is assigned here, at insert time, before the event is
//! handed to the projection queue.

use crate::storage;
use chrono::{TimeDelta, Utc};
use discovery_core::{DiscoveryEvent, Result};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};

/// PostgreSQL-backed event store.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create an event store on an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist one discovery and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`discovery_core::ProjectionError::Storage`] if the insert fails.
    pub async fn append(
        &self,
        agent_id: &str,
        discovery_type: &str,
        payload: &serde_json::Value,
    ) -> Result<DiscoveryEvent> {
        let row = sqlx::query(
            r"
            INSERT INTO discovery_events (agent_id, discovery_type, payload)
            VALUES ($1, $2, $3)
            RETURNING id, agent_id, discovery_type, payload, created_at
            ",
        )
        .bind(agent_id)
        .bind(discovery_type)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| storage("append event", &e))?;

        let event = event_from_row(&row)?;

        tracing::debug!(
            event_id = event.id,
            agent_id = %event.agent_id,
            discovery_type = %event.discovery_type,
            "Discovery event stored"
        );
        metrics::counter!("event_store_events_appended_total").increment(1);

        Ok(event)
    }

    /// Up to `limit` events with an id greater than `after_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`discovery_core::ProjectionError::Storage`] if the query fails.
    pub async fn events_after(&self, after_id: i64, limit: u32) -> Result<Vec<DiscoveryEvent>> {
        let rows = sqlx::query(
            r"
            SELECT id, agent_id, discovery_type, payload, created_at
            FROM discovery_events
            WHERE id > $1
            ORDER BY id ASC
            LIMIT $2
            ",
        )
        .bind(after_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("load events", &e))?;

        rows.iter().map(event_from_row).collect()
    }

    /// Delete events created more than `age` ago. Returns how many were deleted.
    ///
    /// Subscription cursors may keep pointing at deleted ids.
    ///
    /// # Errors
    ///
    /// Returns [`discovery_core::ProjectionError::Storage`] if the delete fails.
    pub async fn prune_older_than(&self, age: TimeDelta) -> Result<u64> {
        let cutoff = Utc::now() - age;
        let deleted = sqlx::query("DELETE FROM discovery_events WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| storage("prune events", &e))?
            .rows_affected();

        tracing::info!(%cutoff, deleted, "Pruned discovery events");
        metrics::counter!("event_store_events_pruned_total").increment(deleted);

        Ok(deleted)
    }

    /// The event each subscription cursor points at, ordered by agent then
    /// discovery type.
    ///
    /// Cursors whose event has been pruned are left out.
    ///
    /// # Errors
    ///
    /// Returns [`discovery_core::ProjectionError::Storage`] if the query fails.
    pub async fn latest_projected(&self) -> Result<Vec<DiscoveryEvent>> {
        let rows = sqlx::query(
            r"
            SELECT e.id, e.agent_id, e.discovery_type, e.payload, e.created_at
            FROM discovery_events e
            JOIN subscriptions s
              ON s.agent_id = e.agent_id
             AND s.discovery_type = e.discovery_type
             AND s.last_seen_event_id = e.id
            ORDER BY e.agent_id, e.discovery_type
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("load latest projected events", &e))?;

        rows.iter().map(event_from_row).collect()
    }
}

fn event_from_row(row: &PgRow) -> Result<DiscoveryEvent> {
    let decode = |e: sqlx::Error| storage("decode event", &e);
    Ok(DiscoveryEvent {
        id: row.try_get("id").map_err(decode)?,
        agent_id: row.try_get("agent_id").map_err(decode)?,
        discovery_type: row.try_get("discovery_type").map_err(decode)?,
        payload: row.try_get("payload").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}
