//! In-memory read-model store with real transaction semantics.
//!
//! A transaction holds the table lock from `begin` until it is committed,
//! rolled back or dropped, and writes to a private copy of the tables. Commit
//! swaps the copy in; anything else throws it away. This makes atomicity
//! observable in tests without a database.
//!
//! Faults can be injected to exercise rollback paths:
//!
//! ```
//! use discovery_testing::InMemoryReadModelStore;
//!
//! let store = InMemoryReadModelStore::new();
//! store.fail_apply_on("hosts");
//! store.fail_commit(true);
//! store.clear_faults();
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use chrono::{DateTime, Utc};
use discovery_core::{
    Cluster, CursorAdvance, CursorPolicy, Host, ProjectionError, ReadModelStore,
    ReadModelTransaction, ReadModelUpsert, Result, Subscription, SubscriptionCursor, Telemetry,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Every table the pipeline writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tables {
    /// Cursors keyed by `(agent_id, discovery_type)`
    pub subscriptions: BTreeMap<(String, String), Subscription>,
    /// Host rows keyed by agent id
    pub hosts: BTreeMap<String, Host>,
    /// Telemetry rows keyed by agent id
    pub telemetry: BTreeMap<String, Telemetry>,
    /// Cluster rows keyed by cluster id
    pub clusters: BTreeMap<String, Cluster>,
}

#[derive(Debug, Clone, Default)]
struct Faults {
    fail_apply_on: Option<&'static str>,
    fail_commit: bool,
    apply_delay: Option<Duration>,
}

/// In-memory [`ReadModelStore`].
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReadModelStore {
    tables: Arc<AsyncMutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryReadModelStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `apply` fail for upserts targeting `table`.
    pub fn fail_apply_on(&self, table: &'static str) {
        self.faults.lock().unwrap().fail_apply_on = Some(table);
    }

    /// Make every commit fail.
    pub fn fail_commit(&self, fail: bool) {
        self.faults.lock().unwrap().fail_commit = fail;
    }

    /// Sleep this long inside every `apply`.
    pub fn delay_apply(&self, delay: Duration) {
        self.faults.lock().unwrap().apply_delay = Some(delay);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        *self.faults.lock().unwrap() = Faults::default();
    }

    /// Number of committed transactions.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Copy of every table.
    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }

    /// Host row of `agent_id`.
    pub async fn host(&self, agent_id: &str) -> Option<Host> {
        self.tables.lock().await.hosts.get(agent_id).cloned()
    }

    /// Telemetry row of `agent_id`.
    pub async fn telemetry(&self, agent_id: &str) -> Option<Telemetry> {
        self.tables.lock().await.telemetry.get(agent_id).cloned()
    }

    /// Cluster row `id`.
    pub async fn cluster(&self, id: &str) -> Option<Cluster> {
        self.tables.lock().await.clusters.get(id).cloned()
    }

    /// Cursor of `(agent_id, discovery_type)`.
    pub async fn subscription(&self, agent_id: &str, discovery_type: &str) -> Option<Subscription> {
        self.tables
            .lock()
            .await
            .subscriptions
            .get(&(agent_id.to_string(), discovery_type.to_string()))
            .cloned()
    }
}

impl ReadModelStore for InMemoryReadModelStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            working,
            faults: self.faults.lock().unwrap().clone(),
            commits: Arc::clone(&self.commits),
        })
    }
}

/// Open transaction of an [`InMemoryReadModelStore`].
#[derive(Debug)]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Faults,
    commits: Arc<AtomicUsize>,
}

impl ReadModelTransaction for InMemoryTransaction {
    async fn advance_cursor(
        &mut self,
        cursor: &SubscriptionCursor,
        policy: CursorPolicy,
    ) -> Result<CursorAdvance> {
        let key = (cursor.agent_id.clone(), cursor.discovery_type.clone());

        if let Some(stored) = self.working.subscriptions.get(&key) {
            if !policy.permits(stored.last_seen_event_id, cursor.event_id) {
                return Ok(CursorAdvance::Stale {
                    last_seen_event_id: stored.last_seen_event_id,
                });
            }
        }

        self.working.subscriptions.insert(
            key,
            Subscription {
                agent_id: cursor.agent_id.clone(),
                discovery_type: cursor.discovery_type.clone(),
                last_seen_event_id: cursor.event_id,
                updated_at: cursor.seen_at,
            },
        );
        Ok(CursorAdvance::Advanced)
    }

    async fn apply(&mut self, upsert: &ReadModelUpsert, now: DateTime<Utc>) -> Result<()> {
        if let Some(delay) = self.faults.apply_delay {
            tokio::time::sleep(delay).await;
        }
        if self.faults.fail_apply_on == Some(upsert.table()) {
            return Err(ProjectionError::Storage(format!(
                "injected failure on {}",
                upsert.table()
            )));
        }

        match upsert {
            ReadModelUpsert::Host { agent_id, patch } => {
                let row = self
                    .working
                    .hosts
                    .entry(agent_id.clone())
                    .or_insert_with(|| Host::new(agent_id.clone(), now));
                patch.apply_to(row);
                row.updated_at = now;
            }
            ReadModelUpsert::Telemetry { agent_id, patch } => {
                let row = self
                    .working
                    .telemetry
                    .entry(agent_id.clone())
                    .or_insert_with(|| Telemetry::new(agent_id.clone(), now));
                patch.apply_to(row);
                row.updated_at = now;
            }
            ReadModelUpsert::Cluster(snapshot) => {
                self.working.clusters.insert(
                    snapshot.id.clone(),
                    Cluster::from_snapshot((**snapshot).clone(), now),
                );
            }
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        if self.faults.fail_commit {
            return Err(ProjectionError::Storage("injected commit failure".to_string()));
        }
        let Self {
            mut guard,
            working,
            commits,
            ..
        } = self;
        *guard = working;
        commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
