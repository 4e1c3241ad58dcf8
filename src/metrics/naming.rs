//! Metric name derivation
//!
//! vCenter counters are identified by a camelCase group key and a dotted
//! camelCase name key (`cpu` / `usage.average`, `net` / `packetsRx.summation`).
//! These helpers turn them into Prometheus identifiers such as
//! `vsphere_cpu_usage_average`.

use crate::error::{Error, Result};

/// Namespace prefix for every published vSphere metric.
pub const NAMESPACE: &str = "vsphere";

/// Variable labels carried by every published vSphere metric.
pub const LABELS: [&str; 3] = ["host", "instance", "entity"];

/// Convert a mixed-case identifier to lower_snake_case.
///
/// Acronyms stay together: `HTTPServer` becomes `http_server`, `CPU` becomes
/// `cpu`.
pub fn camel_to_snake(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next_is_lower)
                {
                    out.push('_');
                }
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Replace anything outside `[A-Za-z0-9_]` with `_`.
fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Normalised group segment, e.g. `virtualDisk` -> `virtual_disk`.
pub fn group_segment(group: &str) -> String {
    sanitize(&camel_to_snake(group))
}

/// Normalised name segment: each `.`-delimited part converted on its own,
/// then joined with `_`.
pub fn name_segment(name: &str) -> String {
    name.split('.')
        .map(|part| sanitize(&camel_to_snake(part)))
        .collect::<Vec<_>>()
        .join("_")
}

/// True if `name` is a legal metric identifier made of letters, digits and
/// underscores, not starting with a digit.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Derive `{NAMESPACE}_{group}_{name}` for a counter.
///
/// Fails when either key normalises to nothing but separators.
pub fn metric_name(group: &str, name: &str) -> Result<String> {
    let group = group_segment(group);
    let name = name_segment(name);

    if group.trim_matches('_').is_empty() || name.trim_matches('_').is_empty() {
        return Err(Error::InvalidMetricName(format!(
            "{}_{}_{}",
            NAMESPACE, group, name
        )));
    }

    let full = format!("{}_{}_{}", NAMESPACE, group, name);
    if !is_valid_metric_name(&full) {
        return Err(Error::InvalidMetricName(full));
    }

    Ok(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("CPU"), "cpu");
        assert_eq!(camel_to_snake("cpu"), "cpu");
        assert_eq!(camel_to_snake("numberReadAveraged"), "number_read_averaged");
        assert_eq!(camel_to_snake("sysUpTime"), "sys_up_time");
        assert_eq!(camel_to_snake("HTTPServer"), "http_server");
        assert_eq!(camel_to_snake("virtualDisk"), "virtual_disk");
        assert_eq!(camel_to_snake("read5Min"), "read5_min");
        assert_eq!(camel_to_snake(""), "");
    }

    #[test]
    fn test_name_segment_converts_each_part() {
        assert_eq!(name_segment("usage.average"), "usage_average");
        assert_eq!(
            name_segment("packetsRx.summation"),
            "packets_rx_summation"
        );
        assert_eq!(
            name_segment("totalReadLatency.average"),
            "total_read_latency_average"
        );
    }

    #[test]
    fn test_metric_name() {
        assert_eq!(
            metric_name("CPU", "usage.average").unwrap(),
            "vsphere_cpu_usage_average"
        );
        assert_eq!(
            metric_name("virtualDisk", "numberReadAveraged.average").unwrap(),
            "vsphere_virtual_disk_number_read_averaged_average"
        );
    }

    #[test]
    fn test_metric_name_sanitizes_illegal_characters() {
        assert_eq!(
            metric_name("net", "bytes-rx.average").unwrap(),
            "vsphere_net_bytes_rx_average"
        );
        assert_eq!(
            metric_name("power gpu", "usage").unwrap(),
            "vsphere_power_gpu_usage"
        );
    }

    #[test]
    fn test_metric_name_rejects_empty_segments() {
        assert_matches!(metric_name("", "usage"), Err(Error::InvalidMetricName(_)));
        assert_matches!(metric_name("cpu", "."), Err(Error::InvalidMetricName(_)));
        assert_matches!(metric_name("cpu", ""), Err(Error::InvalidMetricName(_)));
    }

    #[test]
    fn test_is_valid_metric_name() {
        assert!(is_valid_metric_name("vsphere_cpu_usage"));
        assert!(is_valid_metric_name("_private"));
        assert!(!is_valid_metric_name("1cpu"));
        assert!(!is_valid_metric_name("cpu-usage"));
        assert!(!is_valid_metric_name(""));
    }
}
