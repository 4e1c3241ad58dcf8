//! Metric Sink
//!
//! The collector hands descriptors and labelled gauge samples to a
//! [`MetricSink`]. [`ScrapeBuffer`] is the sink used for one HTTP scrape: it
//! materialises every sample as a `prometheus` gauge so the result can be
//! gathered and encoded once the cycle has completed.

use std::collections::HashMap;

use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts, Registry};

use super::naming::LABELS;
use super::registry::MetricDescriptor;
use crate::error::Result;

/// One labelled gauge value produced during a collection cycle.
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    pub descriptor: &'a MetricDescriptor,
    pub host: &'a str,
    pub instance: &'a str,
    pub entity: &'a str,
    pub value: f64,
}

/// Receiver for descriptors and samples.
pub trait MetricSink: Send {
    /// Announce a descriptor. Must be idempotent.
    fn describe(&mut self, descriptor: &MetricDescriptor) -> Result<()>;

    /// Record one sample.
    fn emit(&mut self, sample: Sample<'_>) -> Result<()>;
}

// =============================================================================
// Scrape Buffer
// =============================================================================

/// Per-scrape sink backed by a private `prometheus::Registry`.
pub struct ScrapeBuffer {
    registry: Registry,
    families: HashMap<String, GaugeVec>,
    described: Vec<String>,
}

impl ScrapeBuffer {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            families: HashMap::new(),
            described: Vec::new(),
        }
    }

    fn family(&mut self, descriptor: &MetricDescriptor) -> Result<&GaugeVec> {
        let name = descriptor.name();
        if !self.families.contains_key(name) {
            let gauge = GaugeVec::new(Opts::new(name, descriptor.help()), &LABELS)?;
            self.registry.register(Box::new(gauge.clone()))?;
            self.families.insert(name.to_string(), gauge);
        }
        Ok(&self.families[name])
    }

    /// Metric names in the order they were first described.
    pub fn described(&self) -> &[String] {
        &self.described
    }

    /// Gather the buffered samples. Families without samples are omitted.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

impl Default for ScrapeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScrapeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeBuffer")
            .field("families", &self.families.len())
            .field("described", &self.described.len())
            .finish()
    }
}

impl MetricSink for ScrapeBuffer {
    fn describe(&mut self, descriptor: &MetricDescriptor) -> Result<()> {
        if !self.families.contains_key(descriptor.name()) {
            self.family(descriptor)?;
            self.described.push(descriptor.name().to_string());
        }
        Ok(())
    }

    fn emit(&mut self, sample: Sample<'_>) -> Result<()> {
        self.describe(sample.descriptor)?;
        self.family(sample.descriptor)?
            .with_label_values(&[sample.host, sample.instance, sample.entity])
            .set(sample.value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CounterId;
    use prometheus::{Encoder, TextEncoder};

    fn descriptor(id: i32, name: &str, help: &str) -> MetricDescriptor {
        MetricDescriptor::new(CounterId(id), name.to_string(), help.to_string()).unwrap()
    }

    fn encode(buffer: &ScrapeBuffer) -> String {
        let mut out = Vec::new();
        TextEncoder::new().encode(&buffer.gather(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn sample_lines(text: &str) -> usize {
        text.lines().filter(|l| !l.starts_with('#')).count()
    }

    #[test]
    fn test_describe_is_idempotent() {
        let cpu = descriptor(1, "vsphere_cpu_usage_average", "CPU usage");
        let mut buffer = ScrapeBuffer::new();

        buffer.describe(&cpu).unwrap();
        buffer.describe(&cpu).unwrap();

        assert_eq!(buffer.described(), ["vsphere_cpu_usage_average"]);
    }

    #[test]
    fn test_described_family_without_samples_is_not_gathered() {
        let cpu = descriptor(1, "vsphere_cpu_usage_average", "CPU usage");
        let mut buffer = ScrapeBuffer::new();
        buffer.describe(&cpu).unwrap();

        assert!(buffer.gather().is_empty());
    }

    #[test]
    fn test_emit_encodes_gauge_with_labels() {
        let cpu = descriptor(1, "vsphere_cpu_usage_average", "CPU usage");
        let mut buffer = ScrapeBuffer::new();

        buffer
            .emit(Sample {
                descriptor: &cpu,
                host: "esx01",
                instance: "",
                entity: "HostSystem",
                value: 1234.0,
            })
            .unwrap();

        let text = encode(&buffer);
        assert!(text.contains("# HELP vsphere_cpu_usage_average CPU usage"));
        assert!(text.contains("# TYPE vsphere_cpu_usage_average gauge"));
        assert!(text.contains(
            r#"vsphere_cpu_usage_average{entity="HostSystem",host="esx01",instance=""} 1234"#
        ));
        assert_eq!(sample_lines(&text), 1);
    }

    #[test]
    fn test_distinct_instances_are_kept() {
        let rx = descriptor(3, "vsphere_net_packets_rx_summation", "Packets received");
        let mut buffer = ScrapeBuffer::new();

        for (instance, value) in [("vmnic0", 10.0), ("vmnic1", 20.0)] {
            buffer
                .emit(Sample {
                    descriptor: &rx,
                    host: "esx01",
                    instance,
                    entity: "HostSystem",
                    value,
                })
                .unwrap();
        }

        let text = encode(&buffer);
        assert!(text.contains(r#"instance="vmnic0""#));
        assert!(text.contains(r#"instance="vmnic1""#));
        assert_eq!(sample_lines(&text), 2);
    }
}
