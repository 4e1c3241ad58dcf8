//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! This module defines the abstraction the collector depends on to reach
//! vCenter. Infrastructure adapters implement [`RemoteSession`] to provide
//! concrete transports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │                    RemoteSession                     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │        VimJsonSession │ InMemorySession              │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;

use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// Remote-assigned performance counter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CounterId(pub i32);

impl std::fmt::Display for CounterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for CounterId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

/// One entry of the vCenter performance counter catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterInfo {
    /// Counter key
    pub id: CounterId,
    /// Group key, e.g. `cpu` or `virtualDisk`
    pub group: String,
    /// Name key, dot-delimited, e.g. `usage.average`
    pub name: String,
    /// Human readable summary
    pub summary: String,
    /// Rollup type (`average`, `maximum`, ...)
    pub rollup: Option<String>,
    /// Stats type (`rate`, `absolute`, `delta`)
    pub stats: Option<String>,
}

impl CounterInfo {
    pub fn new(
        id: impl Into<CounterId>,
        group: impl Into<String>,
        name: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            name: name.into(),
            summary: summary.into(),
            rollup: None,
            stats: None,
        }
    }
}

/// Reference to a managed object (`type` + `value` pair).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagedObjectRef {
    pub kind: String,
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    pub fn host(value: impl Into<String>) -> Self {
        Self::new("HostSystem", value)
    }
}

impl std::fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Resolved scrape scope (a datacenter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeHandle {
    /// Name the scope was resolved from (may be empty for the default)
    pub name: String,
    pub reference: ManagedObjectRef,
}

/// A host discovered inside the scrape scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRef {
    pub name: String,
    pub reference: ManagedObjectRef,
}

impl HostRef {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: ManagedObjectRef::host(id),
        }
    }
}

/// Parameters of a performance query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfQuerySpec {
    /// Maximum number of samples per series
    pub max_sample: i32,
    /// Sampling interval id as defined by vCenter
    pub interval_id: i32,
}

impl PerfQuerySpec {
    /// Real-time interval in seconds.
    pub const REALTIME_INTERVAL: i32 = 20;

    /// Latest real-time sample only.
    pub fn latest() -> Self {
        Self {
            max_sample: 1,
            interval_id: Self::REALTIME_INTERVAL,
        }
    }
}

impl Default for PerfQuerySpec {
    fn default() -> Self {
        Self::latest()
    }
}

/// One integer series returned by a performance query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSeries {
    pub counter_id: CounterId,
    /// Sub-entity discriminator, empty for entity-wide counters
    pub instance: String,
    pub values: Vec<i64>,
}

impl MetricSeries {
    pub fn new(counter_id: impl Into<CounterId>, instance: impl Into<String>, values: Vec<i64>) -> Self {
        Self {
            counter_id: counter_id.into(),
            instance: instance.into(),
            values,
        }
    }

    /// Most recent value in the series.
    pub fn latest(&self) -> Option<i64> {
        self.values.last().copied()
    }
}

/// Performance data for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetric {
    pub entity: ManagedObjectRef,
    pub series: Vec<MetricSeries>,
}

// =============================================================================
// Remote Session Port
// =============================================================================

/// Port for talking to vCenter.
///
/// Implementations are authenticated at construction time; every method here
/// assumes a live session.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Fetch the full performance counter catalogue.
    async fn list_performance_counters(&self) -> Result<Vec<CounterInfo>>;

    /// Resolve a datacenter by name. An empty name selects the default.
    async fn resolve_scope(&self, name: &str) -> Result<ScopeHandle>;

    /// List every host below the scope, in inventory order.
    async fn list_hosts(&self, scope: &ScopeHandle) -> Result<Vec<HostRef>>;

    /// Query the performance manager for one host.
    async fn query_performance(
        &self,
        host: &HostRef,
        spec: &PerfQuerySpec,
    ) -> Result<Vec<EntityMetric>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_query_spec_latest() {
        let spec = PerfQuerySpec::latest();
        assert_eq!(spec.max_sample, 1);
        assert_eq!(spec.interval_id, 20);
        assert_eq!(PerfQuerySpec::default(), spec);
    }

    #[test]
    fn test_metric_series_latest() {
        let series = MetricSeries::new(2, "vmnic0", vec![10, 20, 30]);
        assert_eq!(series.latest(), Some(30));

        let empty = MetricSeries::new(2, "", vec![]);
        assert_eq!(empty.latest(), None);
    }

    #[test]
    fn test_host_ref_kind() {
        let host = HostRef::new("esx01.lab", "host-12");
        assert_eq!(host.reference.kind, "HostSystem");
        assert_eq!(host.reference.to_string(), "HostSystem:host-12");
    }

    #[test]
    fn test_counter_id_display() {
        assert_eq!(CounterId(42).to_string(), "42");
        assert_eq!(CounterId::from(7), CounterId(7));
    }
}
