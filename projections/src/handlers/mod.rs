//! Concrete projectors and their handlers.
//!
//! | projector   | discovery types                         | read-model  |
//! |-------------|-----------------------------------------|-------------|
//! | `hosts`     | host, cloud, cluster, sap_system        | `hosts`     |
//! | `clusters`  | cluster                                 | `clusters`  |
//! | `telemetry` | host, cloud, subscription               | `telemetry` |
//!
//! Every handler is a plain [`Handler`](crate::Handler) function: strict
//! decode, then transform. Writing is left to the projector.

pub mod clusters;
pub mod hana;
pub mod hosts;
pub mod payload;
pub mod telemetry;
