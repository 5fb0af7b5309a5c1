#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! MediBridge gateway – the request layer wrapped around the simplification pipeline.
//!
//! Owns the process-wide mutable state (request stats, audit trail) so the pipeline
//! itself stays free of shared state.

/// Gateway configuration document.
#[path = "../config.rs"]
pub mod config;

/// Aggregate request counters.
#[path = "../stats.rs"]
pub mod stats;

/// Append-only audit trail with fallback location.
#[path = "../audit.rs"]
pub mod audit;

/// Route table and request handlers.
#[path = "../routes.rs"]
pub mod routes;

pub use audit::{AuditRecord, AuditTrail};
pub use config::{AdminSettings, AuditSettings, GatewayConfig};
pub use routes::{ApiRequest, ApiResponse, Gateway, GatewayError, Method};
pub use stats::{RequestStats, StatsSnapshot};
