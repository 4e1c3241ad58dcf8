//! vSphere Exporter - Prometheus exporter for vSphere host performance counters
//!
//! Connects to vCenter, reads the performance counter catalogue once at
//! startup, and on every scrape translates the latest real-time sample of
//! each counter on each host into a labelled Prometheus gauge.
//!
//! # Architecture
//!
//! ```text
//! RemoteSession (Port) → VsphereCollector → ScrapeBuffer → Exposition → HTTP
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - vCenter VI/JSON session and an in-memory session
//! - [`config`] - Environment and config file resolution
//! - [`domain`] - Inventory value objects and the session port
//! - [`error`] - Error types
//! - [`metrics`] - Counter registry, collector and exposition
//! - [`server`] - HTTP exposition server

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod server;

// Re-export commonly used types
pub use config::VsphereConfig;
pub use domain::RemoteSession;
pub use error::{Error, Result};
pub use metrics::{CollisionPolicy, CounterRegistry, Exposition, VsphereCollector};
pub use server::Exporter;
