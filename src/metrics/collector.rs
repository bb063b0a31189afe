// src/metrics/collector.rs
use crate::health::{GroupingMode, HealthStatus, Snapshot};
use anyhow::Result;
use arc_swap::ArcSwap;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

pub const BACKEND_STATE_METRIC: &str = "varnish_backend_state";
const BACKEND_STATE_HELP: &str = "varnish backend states";

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<BackendStateCollector>,
}

impl MetricsRegistry {
    pub fn new(grouping: &GroupingMode) -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(BackendStateCollector::new(grouping.is_enabled())?);
        registry.register(Box::new(SharedCollector(collector.clone())))?;

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<BackendStateCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeriesKey {
    pub state: HealthStatus,
    pub director: Option<String>,
}

pub type PublishedSeries = BTreeMap<SeriesKey, u64>;

/// Holds the exported backend state gauges.
///
/// The poller publishes whole snapshots and scrapes render from a single
/// loaded version, so a scrape never mixes counts from two poll cycles.
pub struct BackendStateCollector {
    template: GaugeVec,
    grouped: bool,
    published: ArcSwap<PublishedSeries>,
}

impl BackendStateCollector {
    pub fn new(grouped: bool) -> Result<Self> {
        let template = GaugeVec::new(Self::opts(), Self::label_names(grouped))?;
        Ok(Self {
            template,
            grouped,
            published: ArcSwap::from_pointee(PublishedSeries::new()),
        })
    }

    fn opts() -> Opts {
        Opts::new(BACKEND_STATE_METRIC, BACKEND_STATE_HELP)
    }

    fn label_names(grouped: bool) -> &'static [&'static str] {
        if grouped {
            &["state", "director"]
        } else {
            &["state"]
        }
    }

    /// Writes one poll cycle's counts.
    ///
    /// With `reset` the previous series are discarded first, so directors
    /// that vanished from the listing stop being exported. Without it they
    /// keep their last published value.
    pub fn publish(&self, snapshot: &Snapshot, reset: bool) {
        let series = snapshot.series();
        self.published.rcu(|current| {
            let mut next = if reset {
                PublishedSeries::new()
            } else {
                (**current).clone()
            };
            for (state, director, count) in &series {
                next.insert(
                    SeriesKey {
                        state: *state,
                        director: director.map(str::to_string),
                    },
                    *count,
                );
            }
            next
        });
    }

    pub fn current(&self) -> Arc<PublishedSeries> {
        self.published.load_full()
    }

    pub fn value(&self, state: HealthStatus, director: Option<&str>) -> Option<u64> {
        let key = SeriesKey {
            state,
            director: director.map(str::to_string),
        };
        self.published.load().get(&key).copied()
    }

    fn render(&self) -> Result<GaugeVec> {
        let gauges = GaugeVec::new(Self::opts(), Self::label_names(self.grouped))?;
        let published = self.published.load();
        for (key, count) in published.iter() {
            let gauge = match (&key.director, self.grouped) {
                (Some(director), true) => {
                    gauges.get_metric_with_label_values(&[key.state.as_str(), director])
                }
                (None, false) => gauges.get_metric_with_label_values(&[key.state.as_str()]),
                _ => continue,
            };
            gauge?.set(*count as f64);
        }
        Ok(gauges)
    }
}

impl Collector for BackendStateCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.template.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match self.render() {
            Ok(gauges) => gauges.collect(),
            Err(e) => {
                error!("Failed to render backend state gauges: {}", e);
                Vec::new()
            }
        }
    }
}

/// Lets the registry own a handle while the poller keeps its own.
struct SharedCollector(Arc<BackendStateCollector>);

impl Collector for SharedCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.0.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.0.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::StateCounts;

    fn grouped(entries: &[(&str, u64, u64)]) -> Snapshot {
        Snapshot::Grouped(
            entries
                .iter()
                .map(|(label, healthy, sick)| {
                    (
                        label.to_string(),
                        StateCounts {
                            healthy: *healthy,
                            sick: *sick,
                        },
                    )
                })
                .collect(),
        )
    }

    fn registry(grouped: bool) -> MetricsRegistry {
        let mode = if grouped {
            GroupingMode::Enabled(crate::health::GroupExtractor::new("(.*)").unwrap())
        } else {
            GroupingMode::Disabled
        };
        MetricsRegistry::new(&mode).unwrap()
    }

    #[test]
    fn test_nothing_exported_before_first_publish() {
        let registry = registry(false);
        let text = String::from_utf8(registry.gather().unwrap()).unwrap();
        assert!(!text.contains("varnish_backend_state{"));
    }

    #[test]
    fn test_ungrouped_exposition() {
        let registry = registry(false);
        registry
            .collector()
            .publish(&Snapshot::Ungrouped(StateCounts { healthy: 3, sick: 1 }), false);

        let text = String::from_utf8(registry.gather().unwrap()).unwrap();
        assert!(text.contains("# HELP varnish_backend_state varnish backend states"));
        assert!(text.contains("# TYPE varnish_backend_state gauge"));
        assert!(text.contains("varnish_backend_state{state=\"healthy\"} 3"));
        assert!(text.contains("varnish_backend_state{state=\"sick\"} 1"));
    }

    #[test]
    fn test_grouped_exposition() {
        let registry = registry(true);
        registry.collector().publish(&grouped(&[("fe", 1, 1)]), false);

        let text = String::from_utf8(registry.gather().unwrap()).unwrap();
        let samples: Vec<&str> = text
            .lines()
            .filter(|line| line.starts_with("varnish_backend_state{"))
            .collect();
        assert_eq!(samples.len(), 2);
        for state in ["healthy", "sick"] {
            assert!(samples.iter().any(|line| {
                line.contains("director=\"fe\"")
                    && line.contains(&format!("state=\"{}\"", state))
                    && line.ends_with(" 1")
            }));
        }
    }

    #[test]
    fn test_without_reset_stale_directors_persist() {
        let collector = BackendStateCollector::new(true).unwrap();
        collector.publish(&grouped(&[("fe", 2, 0), ("be", 1, 1)]), false);
        collector.publish(&grouped(&[("fe", 1, 1)]), false);

        assert_eq!(collector.value(HealthStatus::Healthy, Some("fe")), Some(1));
        assert_eq!(collector.value(HealthStatus::Sick, Some("fe")), Some(1));
        assert_eq!(collector.value(HealthStatus::Healthy, Some("be")), Some(1));
        assert_eq!(collector.value(HealthStatus::Sick, Some("be")), Some(1));
    }

    #[test]
    fn test_reset_drops_stale_directors() {
        let collector = BackendStateCollector::new(true).unwrap();
        collector.publish(&grouped(&[("fe", 2, 0), ("be", 1, 1)]), true);
        collector.publish(&grouped(&[("fe", 1, 1)]), true);

        assert_eq!(collector.current().len(), 2);
        assert_eq!(collector.value(HealthStatus::Healthy, Some("fe")), Some(1));
        assert_eq!(collector.value(HealthStatus::Healthy, Some("be")), None);
        assert_eq!(collector.value(HealthStatus::Sick, Some("be")), None);
    }

    #[test]
    fn test_zero_counts_overwrite_previous_values() {
        let collector = BackendStateCollector::new(true).unwrap();
        collector.publish(&grouped(&[("fe", 0, 3)]), false);
        collector.publish(&grouped(&[("fe", 3, 0)]), false);

        assert_eq!(collector.value(HealthStatus::Sick, Some("fe")), Some(0));
        assert_eq!(collector.value(HealthStatus::Healthy, Some("fe")), Some(3));
    }
}
