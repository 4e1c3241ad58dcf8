//! Counter Registry
//!
//! Translates the vCenter performance counter catalogue into the set of
//! Prometheus descriptors published by the exporter, and serves lookups by
//! counter key during every collection cycle. Built once, read-only after.

use std::collections::{BTreeMap, HashMap};

use prometheus::core::Desc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::naming::{self, LABELS};
use crate::domain::{CounterId, CounterInfo};
use crate::error::Result;

// =============================================================================
// Collision Policy
// =============================================================================

/// What to do when two counters normalise to the same metric name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The counter seen later replaces the earlier one
    #[default]
    Overwrite,
    /// Keep both, publishing the later one as `{name}_{counter_id}`; the
    /// suffix is repeated until the name is free
    SuffixCounterId,
}

// =============================================================================
// Metric Descriptor
// =============================================================================

/// Published descriptor for one vCenter counter.
#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    counter_id: CounterId,
    desc: Desc,
}

impl MetricDescriptor {
    /// Build a descriptor with the fixed `host, instance, entity` label schema.
    pub fn new(counter_id: CounterId, name: String, help: String) -> Result<Self> {
        let desc = Desc::new(
            name,
            help,
            LABELS.iter().map(|l| l.to_string()).collect(),
            HashMap::new(),
        )?;
        Ok(Self { counter_id, desc })
    }

    pub fn counter_id(&self) -> CounterId {
        self.counter_id
    }

    pub fn name(&self) -> &str {
        &self.desc.fq_name
    }

    pub fn help(&self) -> &str {
        &self.desc.help
    }

    pub fn labels(&self) -> &[String] {
        &self.desc.variable_labels
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }
}

// =============================================================================
// Build Report
// =============================================================================

/// Outcome of a registry build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Catalogue entries seen
    pub counters: usize,
    /// Descriptors published
    pub registered: usize,
    /// Entries whose name clashed with an earlier counter
    pub collisions: usize,
    /// Entries skipped because no legal name could be derived
    pub rejected: usize,
}

// =============================================================================
// Counter Registry
// =============================================================================

/// Immutable `counter key -> descriptor` map.
#[derive(Debug, Clone, Default)]
pub struct CounterRegistry {
    descriptors: BTreeMap<CounterId, MetricDescriptor>,
    report: BuildReport,
}

impl CounterRegistry {
    /// Build the registry from the full counter catalogue.
    pub fn build(catalogue: &[CounterInfo], policy: CollisionPolicy) -> Self {
        let mut descriptors: BTreeMap<CounterId, MetricDescriptor> = BTreeMap::new();
        let mut by_name: HashMap<String, CounterId> = HashMap::new();
        let mut report = BuildReport {
            counters: catalogue.len(),
            ..Default::default()
        };

        for info in catalogue {
            let mut name = match naming::metric_name(&info.group, &info.name) {
                Ok(name) => name,
                Err(e) => {
                    warn!(counter_id = %info.id, group = %info.group, name = %info.name, "Skipping counter: {}", e);
                    report.rejected += 1;
                    continue;
                }
            };

            let clashes_with = by_name.get(&name).copied().filter(|prev| *prev != info.id);
            if clashes_with.is_some() {
                report.collisions += 1;
                if policy == CollisionPolicy::SuffixCounterId {
                    name = format!("{}_{}", name, info.id);
                    // The suffixed name may already belong to another counter
                    while by_name.get(&name).is_some_and(|owner| *owner != info.id) {
                        name = format!("{}_{}", name, info.id);
                    }
                }
            }

            let help = if info.summary.trim().is_empty() {
                info.name.clone()
            } else {
                info.summary.clone()
            };

            let descriptor = match MetricDescriptor::new(info.id, name.clone(), help) {
                Ok(d) => d,
                Err(e) => {
                    warn!(counter_id = %info.id, metric = %name, "Skipping counter: {}", e);
                    report.rejected += 1;
                    continue;
                }
            };

            if let Some(prev) = clashes_with {
                match policy {
                    CollisionPolicy::Overwrite => {
                        warn!(
                            metric = %name,
                            previous = %prev,
                            counter_id = %info.id,
                            "Metric name collision, later counter replaces earlier one"
                        );
                        descriptors.remove(&prev);
                    }
                    CollisionPolicy::SuffixCounterId => {
                        warn!(
                            metric = %name,
                            previous = %prev,
                            counter_id = %info.id,
                            "Metric name collision, publishing later counter with id suffix"
                        );
                    }
                }
            }

            if let Some(replaced) = descriptors.insert(info.id, descriptor) {
                if by_name.get(replaced.name()) == Some(&info.id) {
                    by_name.remove(replaced.name());
                }
            }
            by_name.insert(name, info.id);

            debug!(
                counter_id = %info.id,
                rollup = info.rollup.as_deref().unwrap_or(""),
                stats = info.stats.as_deref().unwrap_or(""),
                "Registered counter"
            );
        }

        report.registered = descriptors.len();
        info!(
            counters = report.counters,
            registered = report.registered,
            collisions = report.collisions,
            rejected = report.rejected,
            "Counter registry built"
        );

        Self {
            descriptors,
            report,
        }
    }

    /// Descriptor for a counter key, if the catalogue contained it.
    pub fn get(&self, counter_id: CounterId) -> Option<&MetricDescriptor> {
        self.descriptors.get(&counter_id)
    }

    /// Descriptors in ascending counter key order.
    pub fn iter(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }
}
