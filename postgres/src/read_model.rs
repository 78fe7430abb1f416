//! Read-model and subscription tables.

use crate::storage;
use chrono::{DateTime, Utc};
use discovery_core::{
    Cluster, ClusterDetail, ClusterType, CursorAdvance, CursorPolicy, Host, HostPatch,
    ReadModelStore, ReadModelTransaction, ReadModelUpsert, Result, Subscription,
    SubscriptionCursor, Telemetry, TelemetryPatch,
};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};

/// Cursor upsert that refuses to move the cursor backwards.
///
/// `ON CONFLICT DO UPDATE ... WHERE` locks the existing row, so two concurrent
/// projections of the same `(agent, type)` serialize here.
const ADVANCE_CURSOR: &str = r"
    INSERT INTO subscriptions (agent_id, discovery_type, last_seen_event_id, updated_at)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (agent_id, discovery_type) DO UPDATE
    SET last_seen_event_id = EXCLUDED.last_seen_event_id,
        updated_at = EXCLUDED.updated_at
    WHERE subscriptions.last_seen_event_id <= EXCLUDED.last_seen_event_id
    RETURNING last_seen_event_id
";

const OVERWRITE_CURSOR: &str = r"
    INSERT INTO subscriptions (agent_id, discovery_type, last_seen_event_id, updated_at)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (agent_id, discovery_type) DO UPDATE
    SET last_seen_event_id = EXCLUDED.last_seen_event_id,
        updated_at = EXCLUDED.updated_at
    RETURNING last_seen_event_id
";

const UPSERT_CLUSTER: &str = r"
    INSERT INTO clusters (
        id, name, cluster_type, sids, resources_number, hosts_number, detail, updated_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (id) DO UPDATE
    SET name = EXCLUDED.name,
        cluster_type = EXCLUDED.cluster_type,
        sids = EXCLUDED.sids,
        resources_number = EXCLUDED.resources_number,
        hosts_number = EXCLUDED.hosts_number,
        detail = EXCLUDED.detail,
        updated_at = EXCLUDED.updated_at
";

/// Insert a row, or on key conflict update exactly `columns` and `updated_at`.
///
/// Placeholders are numbered key first, then `columns` in order, then
/// `updated_at`.
fn upsert_sql(table: &str, key: &str, columns: &[&str]) -> String {
    let mut names = Vec::with_capacity(columns.len() + 2);
    names.push(key);
    names.extend_from_slice(columns);
    names.push("updated_at");

    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("${i}")).collect();
    let updates: Vec<String> = names[1..]
        .iter()
        .map(|column| format!("{column} = EXCLUDED.{column}"))
        .collect();

    format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT ({key}) DO UPDATE SET {}",
        names.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    )
}

/// PostgreSQL-backed read-model store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresReadModelStore {
    pool: PgPool,
}

impl PostgresReadModelStore {
    /// Create a store on an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Host row of `agent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`discovery_core::ProjectionError::Storage`] if the query fails.
    pub async fn host(&self, agent_id: &str) -> Result<Option<Host>> {
        let row = sqlx::query(
            r"
            SELECT agent_id, name, ip_addresses, agent_version, bind_address,
                   cloud_provider, cluster_id, cluster_name, sids, updated_at
            FROM hosts
            WHERE agent_id = $1
            ",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("load host", &e))?;

        row.as_ref().map(host_from_row).transpose()
    }

    /// Telemetry row of `agent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`discovery_core::ProjectionError::Storage`] if the query fails.
    pub async fn telemetry(&self, agent_id: &str) -> Result<Option<Telemetry>> {
        let row = sqlx::query(
            r"
            SELECT agent_id, host_name, sles_version, cpu_count, socket_count,
                   total_memory_mb, cloud_provider, updated_at
            FROM telemetry
            WHERE agent_id = $1
            ",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("load telemetry", &e))?;

        row.as_ref().map(telemetry_from_row).transpose()
    }

    /// Cluster row with id `id`.
    ///
    /// # Errors
    ///
    /// Returns [`discovery_core::ProjectionError::Storage`] if the query fails.
    pub async fn cluster(&self, id: &str) -> Result<Option<Cluster>> {
        let row = sqlx::query(
            r"
            SELECT id, name, cluster_type, sids, resources_number, hosts_number,
                   detail, updated_at
            FROM clusters
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("load cluster", &e))?;

        row.as_ref().map(cluster_from_row).transpose()
    }

    /// Subscription cursor of `(agent_id, discovery_type)`.
    ///
    /// # Errors
    ///
    /// Returns [`discovery_core::ProjectionError::Storage`] if the query fails.
    pub async fn subscription(
        &self,
        agent_id: &str,
        discovery_type: &str,
    ) -> Result<Option<Subscription>> {
        let row = sqlx::query(
            r"
            SELECT agent_id, discovery_type, last_seen_event_id, updated_at
            FROM subscriptions
            WHERE agent_id = $1 AND discovery_type = $2
            ",
        )
        .bind(agent_id)
        .bind(discovery_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("load subscription", &e))?;

        row.as_ref()
            .map(|row| {
                Ok(Subscription {
                    agent_id: column(row, "agent_id")?,
                    discovery_type: column(row, "discovery_type")?,
                    last_seen_event_id: column(row, "last_seen_event_id")?,
                    updated_at: column(row, "updated_at")?,
                })
            })
            .transpose()
    }

    /// Empty every read-model table and every subscription cursor.
    ///
    /// Events are kept, so a replay rebuilds the read-models.
    ///
    /// # Errors
    ///
    /// Returns [`discovery_core::ProjectionError::Storage`] if the truncate fails.
    pub async fn reset(&self) -> Result<()> {
        sqlx::query("TRUNCATE hosts, clusters, telemetry, subscriptions")
            .execute(&self.pool)
            .await
            .map_err(|e| storage("reset read-models", &e))?;
        tracing::info!("Read-models and subscriptions reset");
        Ok(())
    }
}

impl ReadModelStore for PostgresReadModelStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage("begin transaction", &e))?;
        Ok(PostgresTransaction { tx })
    }
}

/// One projection transaction.
///
/// Dropping it without [`ReadModelTransaction::commit`] rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl ReadModelTransaction for PostgresTransaction {
    async fn advance_cursor(
        &mut self,
        cursor: &SubscriptionCursor,
        policy: CursorPolicy,
    ) -> Result<CursorAdvance> {
        let sql = match policy {
            CursorPolicy::SkipStale => ADVANCE_CURSOR,
            CursorPolicy::LastWriterWins => OVERWRITE_CURSOR,
        };

        let advanced: Option<(i64,)> = sqlx::query_as(sql)
            .bind(&cursor.agent_id)
            .bind(&cursor.discovery_type)
            .bind(cursor.event_id)
            .bind(cursor.seen_at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| storage("upsert subscription", &e))?;

        if advanced.is_some() {
            return Ok(CursorAdvance::Advanced);
        }

        let (last_seen_event_id,): (i64,) = sqlx::query_as(
            "SELECT last_seen_event_id FROM subscriptions WHERE agent_id = $1 AND discovery_type = $2",
        )
        .bind(&cursor.agent_id)
        .bind(&cursor.discovery_type)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| storage("load subscription", &e))?;

        Ok(CursorAdvance::Stale { last_seen_event_id })
    }

    async fn apply(&mut self, upsert: &ReadModelUpsert, now: DateTime<Utc>) -> Result<()> {
        match upsert {
            ReadModelUpsert::Host { agent_id, patch } => {
                let sql = upsert_sql("hosts", "agent_id", patch.columns());
                let query = sqlx::query(&sql).bind(agent_id);
                let query = match patch {
                    HostPatch::Identity {
                        name,
                        ip_addresses,
                        agent_version,
                        bind_address,
                    } => query
                        .bind(name)
                        .bind(ip_addresses.as_slice())
                        .bind(agent_version)
                        .bind(bind_address),
                    HostPatch::CloudProvider { provider } => query.bind(provider),
                    HostPatch::Cluster {
                        cluster_id,
                        cluster_name,
                    } => query.bind(cluster_id).bind(cluster_name),
                    HostPatch::SapSystems { sids } => query.bind(sids.as_slice()),
                };
                query
                    .bind(now)
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| storage("upsert host", &e))?;
            }
            ReadModelUpsert::Telemetry { agent_id, patch } => {
                let sql = upsert_sql("telemetry", "agent_id", patch.columns());
                let query = sqlx::query(&sql).bind(agent_id);
                let query = match patch {
                    TelemetryPatch::HostFacts {
                        host_name,
                        cpu_count,
                        socket_count,
                        total_memory_mb,
                    } => query
                        .bind(host_name)
                        .bind(*cpu_count)
                        .bind(*socket_count)
                        .bind(*total_memory_mb),
                    TelemetryPatch::CloudProvider { provider } => query.bind(provider),
                    TelemetryPatch::OsVersion { sles_version } => query.bind(sles_version),
                };
                query
                    .bind(now)
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| storage("upsert telemetry", &e))?;
            }
            ReadModelUpsert::Cluster(snapshot) => {
                sqlx::query(UPSERT_CLUSTER)
                    .bind(&snapshot.id)
                    .bind(&snapshot.name)
                    .bind(snapshot.cluster_type.as_str())
                    .bind(snapshot.sids.as_slice())
                    .bind(snapshot.resources_number)
                    .bind(snapshot.hosts_number)
                    .bind(snapshot.detail.as_ref().map(Json))
                    .bind(now)
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| storage("upsert cluster", &e))?;
            }
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| storage("commit transaction", &e))
    }

    async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| storage("roll back transaction", &e))
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| storage(&format!("decode column {name}"), &e))
}

fn host_from_row(row: &PgRow) -> Result<Host> {
    Ok(Host {
        agent_id: column(row, "agent_id")?,
        name: column(row, "name")?,
        ip_addresses: column(row, "ip_addresses")?,
        agent_version: column(row, "agent_version")?,
        bind_address: column(row, "bind_address")?,
        cloud_provider: column(row, "cloud_provider")?,
        cluster_id: column(row, "cluster_id")?,
        cluster_name: column(row, "cluster_name")?,
        sids: column(row, "sids")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn telemetry_from_row(row: &PgRow) -> Result<Telemetry> {
    Ok(Telemetry {
        agent_id: column(row, "agent_id")?,
        host_name: column(row, "host_name")?,
        sles_version: column(row, "sles_version")?,
        cpu_count: column(row, "cpu_count")?,
        socket_count: column(row, "socket_count")?,
        total_memory_mb: column(row, "total_memory_mb")?,
        cloud_provider: column(row, "cloud_provider")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn cluster_from_row(row: &PgRow) -> Result<Cluster> {
    let cluster_type: String = column(row, "cluster_type")?;
    let detail: Option<Json<ClusterDetail>> = column(row, "detail")?;

    Ok(Cluster {
        id: column(row, "id")?,
        name: column(row, "name")?,
        cluster_type: cluster_type.parse().unwrap_or(ClusterType::Unknown),
        sids: column(row, "sids")?,
        resources_number: column(row, "resources_number")?,
        hosts_number: column(row, "hosts_number")?,
        detail: detail.map(|Json(detail)| detail),
        updated_at: column(row, "updated_at")?,
    })
}
