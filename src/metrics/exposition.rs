//! Exposition
//!
//! Owns the process-wide `prometheus::Registry`. The vSphere descriptor set is
//! claimed here once at startup, so a second registration (or a clash with
//! the exporter's own metrics) fails before the listener starts. Each scrape
//! is rendered by concatenating the scrape buffer with the exporter's own
//! metrics.

use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

use super::collector::CycleReport;
use super::registry::CounterRegistry;
use super::sink::ScrapeBuffer;
use crate::error::{Error, Result};

/// Registry entry reserving the vSphere metric names.
///
/// Samples are produced per scrape by [`ScrapeBuffer`], so this collector
/// contributes descriptors only.
struct DescriptorSet {
    descs: Vec<Desc>,
}

impl Collector for DescriptorSet {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        Vec::new()
    }
}

/// Rendered scrape body.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Process-wide metrics registry and exporter self-metrics.
pub struct Exposition {
    registry: Registry,
    claimed: Mutex<bool>,
    scrapes: IntCounter,
    scrape_errors: IntCounter,
    samples_dropped: IntCounter,
    last_duration: Gauge,
    last_timestamp: Gauge,
    counters: IntGauge,
}

impl Exposition {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let scrapes = IntCounter::new(
            "vsphere_exporter_scrapes_total",
            "Total number of vSphere scrape cycles",
        )?;
        let scrape_errors = IntCounter::new(
            "vsphere_exporter_scrape_errors_total",
            "Total number of vSphere scrape cycles that failed",
        )?;
        let samples_dropped = IntCounter::new(
            "vsphere_exporter_samples_dropped_total",
            "Samples dropped because their counter is not in the catalogue",
        )?;
        let last_duration = Gauge::new(
            "vsphere_exporter_last_scrape_duration_seconds",
            "Duration of the last vSphere scrape cycle",
        )?;
        let last_timestamp = Gauge::new(
            "vsphere_exporter_last_scrape_timestamp_seconds",
            "Unix time the last vSphere scrape cycle finished",
        )?;
        let counters = IntGauge::new(
            "vsphere_exporter_counters",
            "Number of vSphere performance counters published",
        )?;

        registry.register(Box::new(scrapes.clone()))?;
        registry.register(Box::new(scrape_errors.clone()))?;
        registry.register(Box::new(samples_dropped.clone()))?;
        registry.register(Box::new(last_duration.clone()))?;
        registry.register(Box::new(last_timestamp.clone()))?;
        registry.register(Box::new(counters.clone()))?;

        Ok(Self {
            registry,
            claimed: Mutex::new(false),
            scrapes,
            scrape_errors,
            samples_dropped,
            last_duration,
            last_timestamp,
            counters,
        })
    }

    /// Reserve every descriptor of `counters` in the process registry.
    ///
    /// May be called once; a second call fails with a registration conflict.
    pub fn claim(&self, counters: &CounterRegistry) -> Result<()> {
        let mut claimed = self.claimed.lock();
        if *claimed {
            return Err(Error::Registration(prometheus::Error::AlreadyReg));
        }

        if !counters.is_empty() {
            let descs = counters.iter().map(|d| d.desc().clone()).collect();
            self.registry.register(Box::new(DescriptorSet { descs }))?;
        }

        self.counters.set(counters.len() as i64);
        *claimed = true;
        Ok(())
    }

    pub fn record_success(&self, report: &CycleReport, elapsed: Duration) {
        self.scrapes.inc();
        self.samples_dropped.inc_by(report.dropped as u64);
        self.finish(elapsed);
    }

    pub fn record_failure(&self, elapsed: Duration) {
        self.scrapes.inc();
        self.scrape_errors.inc();
        self.finish(elapsed);
    }

    fn finish(&self, elapsed: Duration) {
        self.last_duration.set(elapsed.as_secs_f64());
        self.last_timestamp.set(Utc::now().timestamp() as f64);
    }

    /// Encode the scrape buffer followed by the exporter's own metrics.
    pub fn render(&self, buffer: &ScrapeBuffer) -> Result<Rendered> {
        let mut families = buffer.gather();
        families.extend(self.registry.gather());

        let encoder = TextEncoder::new();
        let mut body = Vec::new();
        encoder
            .encode(&families, &mut body)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;

        Ok(Rendered {
            content_type: encoder.format_type().to_string(),
            body,
        })
    }
}

impl std::fmt::Debug for Exposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exposition")
            .field("claimed", &*self.claimed.lock())
            .finish()
    }
}
