//! Pipeline configuration.
//!
//! Loaded once at startup from environment variables with defaults. Nothing
//! here is reconfigurable while the pipeline runs.

use crate::PipelineError;
use discovery_core::CursorPolicy;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

/// Queue slots per worker when no explicit capacity is configured.
pub const DEFAULT_BACKLOG_FACTOR: usize = 1000;

/// Default deadline of one projection, in seconds.
pub const DEFAULT_PROJECT_TIMEOUT_SECS: u64 = 30;

/// Worker pool and queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of concurrent workers
    pub worker_count: usize,
    /// Queue slots per worker
    pub backlog_factor: usize,
    /// Explicit queue capacity, overrides `worker_count * backlog_factor`
    pub queue_capacity: Option<usize>,
    /// Deadline of one projection in seconds
    pub project_timeout_secs: u64,
    /// How events older than the stored cursor are treated
    pub cursor_policy: CursorPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            backlog_factor: DEFAULT_BACKLOG_FACTOR,
            queue_capacity: None,
            project_timeout_secs: DEFAULT_PROJECT_TIMEOUT_SECS,
            cursor_policy: CursorPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`PipelineConfig::from_lookup`].
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// unset variables.
    ///
    /// Reads `PROJECTOR_WORKERS`, `PROJECTOR_BACKLOG_FACTOR`,
    /// `PROJECTOR_QUEUE_CAPACITY`, `PROJECTOR_TIMEOUT_SECS` and
    /// `PROJECTOR_CURSOR_POLICY`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] when a variable is set but
    /// does not parse, or when the result fails [`PipelineConfig::validate`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            worker_count: parse(&lookup, "PROJECTOR_WORKERS")?.unwrap_or(defaults.worker_count),
            backlog_factor: parse(&lookup, "PROJECTOR_BACKLOG_FACTOR")?
                .unwrap_or(defaults.backlog_factor),
            queue_capacity: parse(&lookup, "PROJECTOR_QUEUE_CAPACITY")?,
            project_timeout_secs: parse(&lookup, "PROJECTOR_TIMEOUT_SECS")?
                .unwrap_or(defaults.project_timeout_secs),
            cursor_policy: parse(&lookup, "PROJECTOR_CURSOR_POLICY")?
                .unwrap_or(defaults.cursor_policy),
        };
        config.validate()?;
        Ok(config)
    }

    /// Effective queue capacity.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or_else(|| self.worker_count.saturating_mul(self.backlog_factor))
    }

    /// Deadline of one projection.
    #[must_use]
    pub const fn project_timeout(&self) -> Duration {
        Duration::from_secs(self.project_timeout_secs)
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for zero workers, a zero
    /// queue capacity or a zero timeout.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.worker_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker count must be greater than zero".to_string(),
            ));
        }
        if self.queue_capacity() == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue capacity must be greater than zero".to_string(),
            ));
        }
        if self.project_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "projection timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<F, T>(lookup: &F, key: &str) -> Result<Option<T>, PipelineError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| PipelineError::InvalidConfig(format!("{key}={raw}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();

        assert!(config.worker_count >= 1);
        assert_eq!(config.backlog_factor, 1000);
        assert_eq!(config.queue_capacity(), config.worker_count * 1000);
        assert_eq!(config.project_timeout(), Duration::from_secs(30));
        assert_eq!(config.cursor_policy, CursorPolicy::SkipStale);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("PROJECTOR_WORKERS", "4"),
            ("PROJECTOR_BACKLOG_FACTOR", "10"),
            ("PROJECTOR_TIMEOUT_SECS", "5"),
            ("PROJECTOR_CURSOR_POLICY", "last-writer-wins"),
        ]))
        .unwrap();

        assert_eq!(config.worker_count, 4);
        assert_eq!(config.queue_capacity(), 40);
        assert_eq!(config.project_timeout(), Duration::from_secs(5));
        assert_eq!(config.cursor_policy, CursorPolicy::LastWriterWins);
    }

    #[test]
    fn explicit_capacity_wins_over_backlog_factor() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("PROJECTOR_WORKERS", "4"),
            ("PROJECTOR_QUEUE_CAPACITY", "7"),
        ]))
        .unwrap();

        assert_eq!(config.queue_capacity(), 7);
    }

    #[test]
    fn unparsable_value_is_reported_with_its_key() {
        let err = PipelineConfig::from_lookup(lookup(&[("PROJECTOR_WORKERS", "many")]))
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidConfig(ref msg) if msg.contains("PROJECTOR_WORKERS")));
    }

    #[test]
    fn zero_workers_are_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("PROJECTOR_WORKERS", "0")])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = PipelineConfig {
            queue_capacity: Some(0),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_partial_documents() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"worker_count": 2, "cursor_policy": "last_writer_wins"}"#)
                .unwrap();

        assert_eq!(config.worker_count, 2);
        assert_eq!(config.backlog_factor, DEFAULT_BACKLOG_FACTOR);
        assert_eq!(config.cursor_policy, CursorPolicy::LastWriterWins);
    }
}
