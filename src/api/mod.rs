//! HTTP API Module
//!
//! Serves the topology registries, this gateway's status and snapshot
//! metadata, and crawler metrics.

mod metrics;
mod routes;

pub use metrics::{Metrics, RegistryCounts};
pub use routes::{run_api_server, ApiState};
