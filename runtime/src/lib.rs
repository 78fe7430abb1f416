//! # Discovery Runtime
//!
//! Runtime plumbing for the discovery projection pipeline.
//!
//! ## Core Components
//!
//! - **Queue**: bounded MPMC buffer between ingestion and projection
//! - **Worker Pool**: fixed set of workers fanning events out to the registry
//! - **Pipeline**: queue and pool wired together from a [`PipelineConfig`]
//! - **Metrics**: Prometheus counters, gauges and histograms
//!
//! ## Example
//!
//! ```ignore
//! use discovery_runtime::{Pipeline, PipelineConfig};
//! use discovery_projections::standard_registry;
//!
//! let config = PipelineConfig::from_env()?;
//! let registry = standard_registry(&store, &clock, config.cursor_policy, config.project_timeout())?;
//! let pipeline = Pipeline::start(&config, Arc::new(registry))?;
//!
//! pipeline.enqueue(event).await?;
//!
//! // Close the queue and wait until every queued event is projected
//! pipeline.drain().await?;
//! ```

use discovery_core::{DiscoveryEvent, ReadModelStore};
use discovery_projections::ProjectorRegistry;
use std::sync::Arc;
use thiserror::Error;

/// Pipeline configuration
pub mod config;

/// Prometheus metrics for observability
pub mod metrics;

/// Worker pool
pub mod pool;

/// Bounded ingestion queue
pub mod queue;

pub use config::PipelineConfig;
pub use pool::WorkerPool;
pub use queue::{QueueReceiver, QueueSender};

/// Errors raised by the pipeline runtime.
///
/// Projection failures are not here: workers log and count them per event.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A configuration value is unusable
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// Every consumer of the queue is gone
    #[error("Ingestion queue is closed")]
    QueueClosed,

    /// A worker task panicked or was cancelled
    #[error("Worker terminated abnormally: {0}")]
    WorkerPanicked(String),
}

/// Queue and worker pool running together.
#[derive(Debug)]
pub struct Pipeline {
    sender: QueueSender,
    pool: WorkerPool,
}

impl Pipeline {
    /// Create the queue and start the workers.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails validation.
    pub fn start<S: ReadModelStore>(
        config: &PipelineConfig,
        registry: Arc<ProjectorRegistry<S>>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let (sender, receiver) = queue::bounded(config.queue_capacity())?;
        let pool = WorkerPool::start(config.worker_count, receiver, registry)?;

        tracing::info!(
            workers = config.worker_count,
            queue_capacity = config.queue_capacity(),
            cursor_policy = %config.cursor_policy,
            "Pipeline started"
        );

        Ok(Self { sender, pool })
    }

    /// Enqueue one event, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::QueueClosed`] if every worker is gone.
    pub async fn enqueue(&self, event: DiscoveryEvent) -> Result<(), PipelineError> {
        self.sender.enqueue(event).await
    }

    /// Close the queue and wait until every queued event is projected.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WorkerPanicked`] if a worker panicked.
    pub async fn drain(self) -> Result<(), PipelineError> {
        let Self { sender, pool } = self;
        drop(sender);
        pool.join().await
    }

    /// Stop taking new events and wait for in-flight ones.
    ///
    /// Events still queued are not projected.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WorkerPanicked`] if a worker panicked.
    pub async fn shutdown(self) -> Result<(), PipelineError> {
        let Self { sender, pool } = self;
        pool.shutdown();
        drop(sender);
        pool.join().await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use discovery_core::environment::Clock;
    use discovery_projections::standard_registry;
    use discovery_testing::{InMemoryReadModelStore, discovery_event, fixtures, test_clock};

    fn start(store: &Arc<InMemoryReadModelStore>, config: &PipelineConfig) -> Pipeline {
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        let registry = standard_registry(
            store,
            &clock,
            config.cursor_policy,
            config.project_timeout(),
        )
        .unwrap();
        Pipeline::start(config, Arc::new(registry)).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concrete_scenario_through_the_pipeline() {
        let store = Arc::new(InMemoryReadModelStore::new());
        let config = PipelineConfig {
            worker_count: 2,
            ..PipelineConfig::default()
        };
        let pipeline = start(&store, &config);

        pipeline
            .enqueue(discovery_event(1, "A", "cloud", fixtures::cloud_payload("azure")))
            .await
            .unwrap();
        pipeline
            .enqueue(discovery_event(
                2,
                "A",
                "host",
                fixtures::host_payload("h1", &["10.0.0.5"], "1.2.3"),
            ))
            .await
            .unwrap();
        pipeline.drain().await.unwrap();

        let tables = store.snapshot().await;
        assert_eq!(tables.hosts.len(), 1);
        let host = &tables.hosts["A"];
        assert_eq!(host.cloud_provider, "azure");
        assert_eq!(host.name, "h1");
        assert_eq!(host.ip_addresses, vec!["10.0.0.5"]);
        assert_eq!(host.agent_version, "1.2.3");

        let cursors: Vec<_> = tables
            .subscriptions
            .values()
            .map(|s| (s.discovery_type.as_str(), s.last_seen_event_id))
            .collect();
        assert_eq!(cursors, vec![("cloud", 1), ("host", 2)]);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let store = Arc::new(InMemoryReadModelStore::new());
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        let registry = Arc::new(
            standard_registry(
                &store,
                &clock,
                discovery_core::CursorPolicy::SkipStale,
                std::time::Duration::from_secs(1),
            )
            .unwrap(),
        );
        let config = PipelineConfig {
            worker_count: 0,
            ..PipelineConfig::default()
        };

        assert!(matches!(
            Pipeline::start(&config, registry),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_returns_with_events_still_queued() {
        let store = Arc::new(InMemoryReadModelStore::new());
        let config = PipelineConfig {
            worker_count: 1,
            queue_capacity: Some(64),
            ..PipelineConfig::default()
        };
        let pipeline = start(&store, &config);

        for id in 1..=32 {
            pipeline
                .enqueue(discovery_event(id, "A", "cloud", fixtures::cloud_payload("azure")))
                .await
                .unwrap();
        }

        tokio::time::timeout(std::time::Duration::from_secs(5), pipeline.shutdown())
            .await
            .unwrap()
            .unwrap();
    }
}
