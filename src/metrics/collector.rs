//! vSphere Collector
//!
//! Runs one scrape cycle against vCenter: enumerate the hosts in the
//! configured datacenter, fetch the latest real-time sample of every counter
//! for each host, and translate the series into labelled gauges through the
//! [`CounterRegistry`].
//!
//! The registry and the resolved datacenter are initialised once behind
//! one-shot barriers; concurrent first scrapes wait on a single build.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::registry::{CollisionPolicy, CounterRegistry};
use super::sink::{MetricSink, Sample};
use crate::domain::{PerfQuerySpec, RemoteSession, ScopeHandle};
use crate::error::Result;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the collector
#[derive(Debug, Clone, Default)]
pub struct CollectorConfig {
    /// Datacenter to scrape, empty for the default datacenter
    pub datacenter: String,

    /// How to treat counters that normalise to the same metric name
    pub collision_policy: CollisionPolicy,

    /// Performance query issued for every host
    pub query: PerfQuerySpec,
}

// =============================================================================
// State & Reports
// =============================================================================

/// Lifecycle of a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// Counter registry not built yet
    Uninitialized,
    /// Counter registry built
    Ready,
}

/// Summary of one successful collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Hosts enumerated in scope
    pub hosts: usize,
    /// Series returned by vCenter
    pub series: usize,
    /// Samples handed to the sink
    pub samples: usize,
    /// Series dropped (unknown counter or no value)
    pub dropped: usize,
}

// =============================================================================
// Collector
// =============================================================================

/// Translates vCenter performance data into Prometheus gauges.
pub struct VsphereCollector {
    session: Arc<dyn RemoteSession>,
    config: CollectorConfig,
    registry: OnceCell<CounterRegistry>,
    scope: OnceCell<ScopeHandle>,
}

impl VsphereCollector {
    pub fn new(session: Arc<dyn RemoteSession>, config: CollectorConfig) -> Self {
        Self {
            session,
            config,
            registry: OnceCell::new(),
            scope: OnceCell::new(),
        }
    }

    pub fn state(&self) -> CollectorState {
        if self.registry.initialized() {
            CollectorState::Ready
        } else {
            CollectorState::Uninitialized
        }
    }

    /// Build the counter registry and resolve the datacenter.
    ///
    /// Call at startup: any error here means the exporter cannot serve.
    pub async fn initialize(&self) -> Result<&CounterRegistry> {
        let registry = self.registry().await?;
        let scope = self.scope().await?;
        info!(
            datacenter = %scope.reference,
            counters = registry.len(),
            "Collector ready"
        );
        Ok(registry)
    }

    /// The counter registry, fetching the catalogue on first use.
    pub async fn registry(&self) -> Result<&CounterRegistry> {
        self.registry
            .get_or_try_init(|| async {
                let catalogue = self.session.list_performance_counters().await?;
                Ok(CounterRegistry::build(
                    &catalogue,
                    self.config.collision_policy,
                ))
            })
            .await
    }

    async fn scope(&self) -> Result<&ScopeHandle> {
        self.scope
            .get_or_try_init(|| self.session.resolve_scope(&self.config.datacenter))
            .await
    }

    /// Announce every descriptor to the sink, in counter key order.
    ///
    /// Returns the number of descriptors described.
    pub async fn describe<S>(&self, sink: &mut S) -> Result<usize>
    where
        S: MetricSink + ?Sized,
    {
        let registry = self.registry().await?;
        for descriptor in registry.iter() {
            sink.describe(descriptor)?;
        }
        Ok(registry.len())
    }

    /// Run one collection cycle.
    ///
    /// Host enumeration or any per-host query failure aborts the cycle with
    /// an error; samples already handed to the sink must then be discarded.
    #[instrument(skip(self, sink))]
    pub async fn collect<S>(&self, sink: &mut S) -> Result<CycleReport>
    where
        S: MetricSink + ?Sized,
    {
        let registry = self.registry().await?;
        let scope = self.scope().await?;

        let hosts = self.session.list_hosts(scope).await.inspect_err(|e| {
            warn!(datacenter = %scope.reference, "Host enumeration failed: {}", e);
        })?;

        let mut report = CycleReport {
            hosts: hosts.len(),
            ..Default::default()
        };

        for host in &hosts {
            let records = self
                .session
                .query_performance(host, &self.config.query)
                .await
                .inspect_err(|e| {
                    warn!(host = %host.name, "Performance query failed: {}", e);
                })?;

            for record in &records {
                for series in &record.series {
                    report.series += 1;

                    let Some(descriptor) = registry.get(series.counter_id) else {
                        debug!(
                            host = %host.name,
                            counter_id = %series.counter_id,
                            "Dropping sample for unknown counter"
                        );
                        report.dropped += 1;
                        continue;
                    };

                    let Some(value) = series.latest() else {
                        debug!(
                            host = %host.name,
                            counter_id = %series.counter_id,
                            "Dropping empty series"
                        );
                        report.dropped += 1;
                        continue;
                    };

                    sink.emit(Sample {
                        descriptor,
                        host: &host.name,
                        instance: &series.instance,
                        entity: &record.entity.kind,
                        value: value as f64,
                    })?;
                    report.samples += 1;
                }
            }
        }

        debug!(
            hosts = report.hosts,
            samples = report.samples,
            dropped = report.dropped,
            "Collection cycle complete"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for VsphereCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsphereCollector")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
