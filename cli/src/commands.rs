//! Subcommand implementations.

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use discovery_core::DiscoveryEvent;
use discovery_core::environment::{Clock, SystemClock};
use discovery_postgres::{PgPool, PostgresEventStore, PostgresReadModelStore};
use discovery_projections::standard_registry;
use discovery_runtime::{Pipeline, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Handles shared by every command.
pub struct Services {
    events: PostgresEventStore,
    store: Arc<PostgresReadModelStore>,
    pipeline: PipelineConfig,
}

impl Services {
    pub fn new(pool: PgPool, pipeline: PipelineConfig) -> Self {
        Self {
            events: PostgresEventStore::new(pool.clone()),
            store: Arc::new(PostgresReadModelStore::new(pool)),
            pipeline,
        }
    }

    fn start_pipeline(&self) -> Result<Pipeline> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = standard_registry(
            &self.store,
            &clock,
            self.pipeline.cursor_policy,
            self.pipeline.project_timeout(),
        )?;
        Ok(Pipeline::start(&self.pipeline, Arc::new(registry))?)
    }
}

/// One line of an ingest file, and one file of a dumped scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryRecord {
    /// Reporting agent
    pub agent_id: String,
    /// Discovery type tag
    pub discovery_type: String,
    /// Type-specific document
    pub payload: serde_json::Value,
}

impl From<DiscoveryEvent> for DiscoveryRecord {
    fn from(event: DiscoveryEvent) -> Self {
        Self {
            agent_id: event.agent_id,
            discovery_type: event.discovery_type,
            payload: event.payload,
        }
    }
}

/// Parse newline-delimited records, skipping blank lines.
pub fn parse_records(input: &str) -> Result<Vec<DiscoveryRecord>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid discovery record on line {}", index + 1))
        })
        .collect()
}

/// `<root>/<name>/<agent_id>/<discovery_type>`, refusing components that
/// would leave the scenario directory.
pub fn scenario_file(
    root: &Path,
    name: &str,
    agent_id: &str,
    discovery_type: &str,
) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    for part in [name, agent_id, discovery_type] {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => path.push(part),
            _ => bail!("'{part}' cannot be used as a scenario path component"),
        }
    }
    Ok(path)
}

pub async fn ingest(services: &Services, file: &Path) -> Result<()> {
    let input = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records = parse_records(&input)?;

    let pipeline = services.start_pipeline()?;
    let fed = async {
        for record in &records {
            let event = services
                .events
                .append(&record.agent_id, &record.discovery_type, &record.payload)
                .await?;
            pipeline.enqueue(event).await?;
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;
    finish(pipeline, fed).await?;

    info!(events = records.len(), file = %file.display(), "Ingest complete");
    Ok(())
}

pub async fn replay(services: &Services, after_id: i64, batch_size: u32) -> Result<()> {
    let pipeline = services.start_pipeline()?;

    let fed = async {
        let mut cursor = after_id;
        let mut replayed = 0_usize;
        loop {
            let batch = services.events.events_after(cursor, batch_size).await?;
            let Some(last) = batch.last() else {
                break;
            };
            cursor = last.id;
            replayed += batch.len();
            for event in batch {
                pipeline.enqueue(event).await?;
            }
        }
        Ok::<_, anyhow::Error>((replayed, cursor))
    }
    .await;
    let (replayed, last_id) = finish(pipeline, fed).await?;

    info!(events = replayed, after_id, last_id, "Replay complete");
    Ok(())
}

/// Drain `pipeline` whether or not feeding it succeeded.
///
/// Events enqueued before a failure are already persisted, so they are
/// projected before the failure is reported.
async fn finish<T>(pipeline: Pipeline, fed: Result<T>) -> Result<T> {
    let drained = pipeline.drain().await;
    match fed {
        Ok(value) => {
            drained?;
            Ok(value)
        }
        Err(e) => {
            if let Err(drain_error) = drained {
                warn!(error = %drain_error, "Pipeline did not drain cleanly");
            }
            Err(e)
        }
    }
}

pub async fn prune_events(services: &Services, older_than_days: u32) -> Result<()> {
    let deleted = services
        .events
        .prune_older_than(TimeDelta::days(i64::from(older_than_days)))
        .await?;
    info!(deleted, older_than_days, "Prune complete");
    Ok(())
}

pub async fn dump_scenario(services: &Services, name: &str, root: &Path) -> Result<()> {
    let events = services.events.latest_projected().await?;
    let count = events.len();

    for event in events {
        let file = scenario_file(root, name, &event.agent_id, &event.discovery_type)?;
        if let Some(dir) = file.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let body = serde_json::to_string(&DiscoveryRecord::from(event))?;
        tokio::fs::write(&file, body)
            .await
            .with_context(|| format!("Failed to write {}", file.display()))?;
    }

    info!(events = count, scenario = name, path = %root.display(), "Scenario dumped");
    Ok(())
}

pub async fn reset(services: &Services) -> Result<()> {
    services.store.reset().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use discovery_testing::{InMemoryReadModelStore, discovery_event, fixtures, test_clock};
    use serde_json::json;

    fn in_memory_pipeline(store: &Arc<InMemoryReadModelStore>) -> Pipeline {
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        let config = PipelineConfig {
            worker_count: 1,
            ..PipelineConfig::default()
        };
        let registry =
            standard_registry(store, &clock, config.cursor_policy, config.project_timeout())
                .unwrap();
        Pipeline::start(&config, Arc::new(registry)).unwrap()
    }

    #[tokio::test]
    async fn failure_while_feeding_still_projects_enqueued_events() {
        let store = Arc::new(InMemoryReadModelStore::new());
        let pipeline = in_memory_pipeline(&store);

        for id in 1..=10 {
            pipeline
                .enqueue(discovery_event(id, "A", "cloud", fixtures::cloud_payload("azure")))
                .await
                .unwrap();
        }
        let fed: Result<()> = Err(anyhow::anyhow!("event store unavailable"));

        let err = finish(pipeline, fed).await.unwrap_err();

        assert_eq!(err.to_string(), "event store unavailable");
        assert_eq!(
            store.subscription("A", "cloud").await.unwrap().last_seen_event_id,
            10
        );
    }

    #[tokio::test]
    async fn successful_feed_returns_its_value_after_draining() {
        let store = Arc::new(InMemoryReadModelStore::new());
        let pipeline = in_memory_pipeline(&store);

        pipeline
            .enqueue(discovery_event(1, "A", "cloud", fixtures::cloud_payload("gcp")))
            .await
            .unwrap();

        assert_eq!(finish(pipeline, Ok(7)).await.unwrap(), 7);
        assert_eq!(store.host("A").await.unwrap().cloud_provider, "gcp");
    }

    #[test]
    fn records_are_parsed_line_by_line() {
        let input = r#"
{"agent_id": "A", "discovery_type": "cloud", "payload": {"provider": "azure"}}

{"agent_id": "A", "discovery_type": "host", "payload": {"host_name": "h1"}}
"#;
        let records = parse_records(input).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].discovery_type, "cloud");
        assert_eq!(records[1].payload, json!({"host_name": "h1"}));
    }

    #[test]
    fn bad_line_is_reported_by_number() {
        let input = "{\"agent_id\": \"A\", \"discovery_type\": \"cloud\", \"payload\": {}}\nnot json\n";
        let err = parse_records(input).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn unknown_record_fields_are_rejected() {
        let input = r#"{"agent_id": "A", "discovery_type": "cloud", "payload": {}, "id": 4}"#;
        assert!(parse_records(input).is_err());
    }

    #[test]
    fn scenario_files_nest_by_agent_and_type() {
        let path = scenario_file(Path::new("out"), "healthy", "A", "cloud").unwrap();
        assert_eq!(path, Path::new("out").join("healthy").join("A").join("cloud"));
    }

    #[test]
    fn scenario_paths_cannot_escape() {
        assert!(scenario_file(Path::new("out"), "..", "A", "cloud").is_err());
        assert!(scenario_file(Path::new("out"), "s", "a/b", "cloud").is_err());
        assert!(scenario_file(Path::new("out"), "s", "A", "").is_err());
    }

    #[test]
    fn dumped_record_is_ingestable() {
        let record = DiscoveryRecord {
            agent_id: "A".to_string(),
            discovery_type: "cloud".to_string(),
            payload: json!({"provider": "azure"}),
        };
        let line = serde_json::to_string(&record).unwrap();
        assert_eq!(parse_records(&line).unwrap(), vec![record]);
    }
}
