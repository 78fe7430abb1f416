//! `PostgreSQL` storage for the discovery projection pipeline.
//!
//! This crate provides:
//!
//! - [`PostgresReadModelStore`]: the transactional backend projectors write to.
//!   Cursor and read-model writes of one projection share one transaction.
//! - [`PostgresEventStore`]: the append-only `discovery_events` table, used by
//!   the ingestion boundary and by maintenance commands (replay, prune, scenario
//!   export).
//! - [`migrate`]: embedded schema migrations.
//!
//! # Example
//!
//! ```ignore
//! use discovery_postgres::{PostgresReadModelStore, connect, migrate};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/discovery", 10, Duration::from_secs(30)).await?;
//!     migrate(&pool).await?;
//!     let store = PostgresReadModelStore::new(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use discovery_core::{ProjectionError, Result};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

mod event_store;
mod read_model;

pub use event_store::PostgresEventStore;
pub use read_model::{PostgresReadModelStore, PostgresTransaction};
pub use sqlx::PgPool;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`ProjectionError::Storage`] if the database is unreachable.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    connect_timeout: Duration,
) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(connect_timeout)
        .connect(database_url)
        .await
        .map_err(|e| ProjectionError::Storage(format!("Failed to connect: {e}")))
}

/// Create or upgrade the event, subscription and read-model tables.
///
/// # Errors
///
/// Returns [`ProjectionError::Storage`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| ProjectionError::Storage(format!("Migration failed: {e}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}

fn storage(action: &str, e: &sqlx::Error) -> ProjectionError {
    ProjectionError::Storage(format!("Failed to {action}: {e}"))
}
