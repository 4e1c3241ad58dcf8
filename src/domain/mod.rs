//! Domain layer
//!
//! Value objects describing the vCenter inventory and performance data, and
//! the port the collector uses to reach vCenter.

pub mod ports;

pub use ports::{
    CounterId, CounterInfo, EntityMetric, HostRef, ManagedObjectRef, MetricSeries,
    PerfQuerySpec, RemoteSession, ScopeHandle,
};
