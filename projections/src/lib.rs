//! Projectors for discovery events.
//!
//! # Overview
//!
//! This crate turns [`DiscoveryEvent`](discovery_core::DiscoveryEvent)s into
//! read-model writes:
//!
//! - **[`Projector`]**: named set of handlers plus the transactional apply protocol
//! - **[`Handler`]**: pure function from one event to one read-model upsert
//! - **[`ProjectorRegistry`]**: the fixed, ordered fan-out set
//! - **[`handlers`]**: the `hosts`, `clusters` and `telemetry` projectors
//!
//! ```text
//! event ─► registry ─┬─► hosts     ─► cursor + hosts row
//!                    ├─► clusters  ─► cursor + clusters row
//!                    └─► telemetry ─► cursor + telemetry row
//! ```
//!
//! # Example
//!
//! ```ignore
//! use discovery_projections::standard_registry;
//!
//! let registry = standard_registry(&store, &clock, CursorPolicy::SkipStale, timeout)?;
//! for projector in &registry {
//!     projector.project(&event).await?;
//! }
//! ```

pub mod handlers;
pub mod projector;
pub mod registry;

pub use projector::{DEFAULT_PROJECT_TIMEOUT, Handler, Projector};
pub use registry::{ProjectorRegistry, standard_registry};
