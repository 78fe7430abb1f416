//! Fixed-size pool of workers draining the ingestion queue.
//!
//! Every worker takes one event at a time and runs it through every projector
//! of the registry, in registration order, before taking the next. Workers
//! hold no state of their own. A projection failure is logged and counted and
//! the worker moves on.
//!
//! The pool stops when either
//! - the queue is closed and drained ([`WorkerPool::join`] after dropping every sender), or
//! - [`WorkerPool::shutdown`] is called.
//!
//! Neither interrupts an event that is already being projected.

use crate::PipelineError;
use crate::metrics::PipelineMetrics;
use crate::queue::QueueReceiver;
use discovery_core::{DiscoveryEvent, ProjectionOutcome, ReadModelStore};
use discovery_projections::ProjectorRegistry;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Running workers.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] when `worker_count` is zero.
    pub fn start<S: ReadModelStore>(
        worker_count: usize,
        receiver: QueueReceiver,
        registry: Arc<ProjectorRegistry<S>>,
    ) -> Result<Self, PipelineError> {
        if worker_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker count must be greater than zero".to_string(),
            ));
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let workers = (0..worker_count)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    receiver.clone(),
                    Arc::clone(&registry),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        tracing::info!(
            workers = worker_count,
            projectors = ?registry.names(),
            "Worker pool started"
        );

        Ok(Self { workers, shutdown })
    }

    /// Number of workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Ask every worker to stop once its current event is done.
    ///
    /// Events still queued stay unprocessed.
    pub fn shutdown(&self) {
        tracing::info!("Worker pool shutdown requested");
        self.shutdown.send_replace(true);
    }

    /// Wait for every worker to finish.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WorkerPanicked`] if a worker panicked. The
    /// remaining workers are still awaited.
    pub async fn join(self) -> Result<(), PipelineError> {
        let Self { workers, shutdown } = self;

        let mut result = Ok(());
        for outcome in futures::future::join_all(workers).await {
            if let Err(e) = outcome {
                tracing::error!(error = %e, "Worker terminated abnormally");
                if result.is_ok() {
                    result = Err(PipelineError::WorkerPanicked(e.to_string()));
                }
            }
        }

        // Workers treat a dropped sender as a shutdown request.
        drop(shutdown);
        tracing::info!("Worker pool stopped");
        result
    }
}

async fn run_worker<S: ReadModelStore>(
    worker: usize,
    receiver: QueueReceiver,
    registry: Arc<ProjectorRegistry<S>>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(worker, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let event = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            event = receiver.dequeue() => match event {
                Some(event) => event,
                None => break,
            },
        };

        project(worker, &registry, &event).await;
    }

    tracing::debug!(worker, "Worker stopped");
}

/// Fan `event` out to every projector. Failures never stop the loop.
async fn project<S: ReadModelStore>(
    worker: usize,
    registry: &ProjectorRegistry<S>,
    event: &DiscoveryEvent,
) {
    for projector in registry {
        let started = Instant::now();
        match projector.project(event).await {
            Ok(ProjectionOutcome::Applied) => {
                PipelineMetrics::record_applied(
                    projector.name(),
                    &event.discovery_type,
                    started.elapsed(),
                );
            }
            Ok(ProjectionOutcome::NotInterested) => {
                PipelineMetrics::record_skipped(
                    projector.name(),
                    &event.discovery_type,
                    "not_interested",
                );
            }
            Ok(ProjectionOutcome::Stale { .. }) => {
                PipelineMetrics::record_skipped(projector.name(), &event.discovery_type, "stale");
            }
            Err(e) => {
                tracing::error!(
                    worker,
                    projector = %projector.name(),
                    agent_id = %event.agent_id,
                    discovery_type = %event.discovery_type,
                    event_id = event.id,
                    error = %e,
                    "Projection failed"
                );
                PipelineMetrics::record_failed(
                    projector.name(),
                    &event.discovery_type,
                    e.kind(),
                    started.elapsed(),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::queue;
    use discovery_core::CursorPolicy;
    use discovery_core::environment::Clock;
    use discovery_projections::standard_registry;
    use discovery_testing::{InMemoryReadModelStore, discovery_event, fixtures, test_clock};
    use serde_json::json;
    use std::time::Duration;

    fn registry(store: &Arc<InMemoryReadModelStore>) -> Arc<ProjectorRegistry<InMemoryReadModelStore>> {
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        Arc::new(
            standard_registry(store, &clock, CursorPolicy::SkipStale, Duration::from_secs(5))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn zero_workers_are_rejected() {
        let store = Arc::new(InMemoryReadModelStore::new());
        let (_tx, rx) = queue::bounded(1).unwrap();
        let err = WorkerPool::start(0, rx, registry(&store)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pool_drains_queue_and_stops_when_closed() {
        let store = Arc::new(InMemoryReadModelStore::new());
        let (tx, rx) = queue::bounded(8).unwrap();
        let pool = WorkerPool::start(2, rx, registry(&store)).unwrap();
        assert_eq!(pool.worker_count(), 2);

        tx.enqueue(discovery_event(1, "A", "cloud", fixtures::cloud_payload("azure")))
            .await
            .unwrap();
        tx.enqueue(discovery_event(
            2,
            "A",
            "host",
            fixtures::host_payload("h1", &["10.0.0.5"], "1.2.3"),
        ))
        .await
        .unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), pool.join())
            .await
            .unwrap()
            .unwrap();

        let host = store.host("A").await.unwrap();
        assert_eq!(host.cloud_provider, "azure");
        assert_eq!(host.name, "h1");
        assert_eq!(
            store.subscription("A", "host").await.unwrap().last_seen_event_id,
            2
        );
    }

    #[tokio::test]
    async fn shutdown_stops_idle_workers() {
        let store = Arc::new(InMemoryReadModelStore::new());
        let (_tx, rx) = queue::bounded(8).unwrap();
        let pool = WorkerPool::start(3, rx, registry(&store)).unwrap();

        pool.shutdown();

        tokio::time::timeout(Duration::from_secs(5), pool.join())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn failing_event_does_not_stop_the_worker() {
        let store = Arc::new(InMemoryReadModelStore::new());
        let (tx, rx) = queue::bounded(8).unwrap();
        let pool = WorkerPool::start(1, rx, registry(&store)).unwrap();

        tx.enqueue(discovery_event(1, "A", "cloud", json!({"provider": "aws", "bogus": 1})))
            .await
            .unwrap();
        tx.enqueue(discovery_event(2, "B", "cloud", fixtures::cloud_payload("gcp")))
            .await
            .unwrap();
        drop(tx);
        pool.join().await.unwrap();

        assert!(store.host("A").await.is_none());
        assert!(store.subscription("A", "cloud").await.is_none());
        assert_eq!(store.host("B").await.unwrap().cloud_provider, "gcp");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn older_event_dequeued_last_does_not_rewind_the_host() {
        for _ in 0..20 {
            let store = Arc::new(InMemoryReadModelStore::new());
            let (tx, rx) = queue::bounded(8).unwrap();
            let pool = WorkerPool::start(2, rx, registry(&store)).unwrap();

            tx.enqueue(discovery_event(
                6,
                "A",
                "host",
                fixtures::host_payload("new-name", &["10.0.0.6"], "2.0.0"),
            ))
            .await
            .unwrap();
            tx.enqueue(discovery_event(
                5,
                "A",
                "host",
                fixtures::host_payload("old-name", &["10.0.0.5"], "1.0.0"),
            ))
            .await
            .unwrap();
            drop(tx);

            tokio::time::timeout(Duration::from_secs(5), pool.join())
                .await
                .unwrap()
                .unwrap();

            let host = store.host("A").await.unwrap();
            assert_eq!(host.name, "new-name");
            assert_eq!(host.agent_version, "2.0.0");
            assert_eq!(store.telemetry("A").await.unwrap().host_name, "new-name");
            assert_eq!(
                store.subscription("A", "host").await.unwrap().last_seen_event_id,
                6
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_workers_project_every_agent() {
        let store = Arc::new(InMemoryReadModelStore::new());
        let (tx, rx) = queue::bounded(16).unwrap();
        let pool = WorkerPool::start(4, rx, registry(&store)).unwrap();

        for id in 1..=50 {
            let agent = format!("agent-{id}");
            tx.enqueue(discovery_event(id, &agent, "cloud", fixtures::cloud_payload("azure")))
                .await
                .unwrap();
        }
        drop(tx);

        tokio::time::timeout(Duration::from_secs(10), pool.join())
            .await
            .unwrap()
            .unwrap();

        let tables = store.snapshot().await;
        assert_eq!(tables.hosts.len(), 50);
        assert_eq!(tables.telemetry.len(), 50);
        assert_eq!(tables.subscriptions.len(), 50);
    }
}
