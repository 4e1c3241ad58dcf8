//! Metrics module
//!
//! Counter registry, collection cycle and Prometheus exposition.
//!
//! ```text
//! RemoteSession ──▶ CounterRegistry ──▶ VsphereCollector ──▶ MetricSink
//!  (catalogue)       (name mapping)      (scrape cycle)      (ScrapeBuffer)
//!                                                                 │
//!                                                                 ▼
//!                                                            Exposition
//! ```

mod collector;
mod exposition;
pub mod naming;
mod registry;
mod sink;

mod proptest;

pub use collector::{CollectorConfig, CollectorState, CycleReport, VsphereCollector};
pub use exposition::{Exposition, Rendered};
pub use registry::{BuildReport, CollisionPolicy, CounterRegistry, MetricDescriptor};
pub use sink::{MetricSink, Sample, ScrapeBuffer};
