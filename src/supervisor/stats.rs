//! Translation of raw two-period engine samples into percentage stats.
//!
//! Mirrors the docker CLI convention: CPU load is derived from the delta of
//! two cumulative counters, so no daemon-side rate tracker is needed.

use serde::{Serialize, Serializer};

use crate::runtime::StatsSample;

/// Memory usage of a container, or a marker that the engine did not report
/// the fields needed to compute it. Serializes as the percentage or `"N/A"`,
/// never a substitute zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemoryUsage {
    /// Usage as a percentage of the limit.
    Percent(f64),
    /// Usage or limit missing from the sample.
    Unavailable,
}

impl Serialize for MemoryUsage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MemoryUsage::Percent(percent) => serializer.serialize_f64(*percent),
            MemoryUsage::Unavailable => serializer.serialize_str("N/A"),
        }
    }
}

/// Normalized point-in-time statistics for one container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContainerStats {
    /// CPU load over the last accounting period, percent.
    pub cpu: f64,
    /// Memory usage relative to the limit, when reported.
    pub memory: MemoryUsage,
}

/// Translate one raw sample into percentage stats.
pub fn translate(sample: &StatsSample) -> ContainerStats {
    let cpu_delta = sample.cpu_total.saturating_sub(sample.precpu_total) as f64;
    let system_delta = match (sample.system_cpu, sample.presystem_cpu) {
        (Some(current), Some(previous)) => current as f64 - previous as f64,
        _ => 0.0,
    };

    let cpu = if system_delta > 0.0 {
        (cpu_delta / system_delta) * 100.0
    } else {
        0.0
    };

    let memory = match (sample.memory_usage, sample.memory_limit) {
        (Some(usage), Some(limit)) if limit > 0 => {
            MemoryUsage::Percent(100.0 * usage as f64 / limit as f64)
        }
        _ => MemoryUsage::Unavailable,
    };

    ContainerStats { cpu, memory }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample() -> StatsSample {
        StatsSample {
            name: "/extension-sidecar".to_string(),
            cpu_total: 150,
            precpu_total: 100,
            system_cpu: Some(1200),
            presystem_cpu: Some(1000),
            memory_usage: Some(256),
            memory_limit: Some(1024),
        }
    }

    #[test]
    fn cpu_percent_from_two_period_deltas() {
        let stats = translate(&sample());
        assert_eq!(stats.cpu, 25.0);
        assert_eq!(stats.memory, MemoryUsage::Percent(25.0));
    }

    #[test]
    fn cpu_is_zero_without_system_progress() {
        let mut s = sample();
        s.presystem_cpu = Some(1200); // system_delta == 0
        assert_eq!(translate(&s).cpu, 0.0);

        s.presystem_cpu = Some(1300); // system_delta < 0
        assert_eq!(translate(&s).cpu, 0.0);

        s.system_cpu = None; // counter missing entirely
        assert_eq!(translate(&s).cpu, 0.0);
    }

    #[test]
    fn missing_memory_fields_yield_the_sentinel() {
        let mut s = sample();
        s.memory_limit = None;
        assert_eq!(translate(&s).memory, MemoryUsage::Unavailable);

        s.memory_limit = Some(1024);
        s.memory_usage = None;
        assert_eq!(translate(&s).memory, MemoryUsage::Unavailable);
    }

    #[test]
    fn sentinel_serializes_as_na_not_zero() {
        let json = serde_json::to_string(&ContainerStats {
            cpu: 0.0,
            memory: MemoryUsage::Unavailable,
        })
        .unwrap();
        assert_eq!(json, r#"{"cpu":0.0,"memory":"N/A"}"#);
    }
}
