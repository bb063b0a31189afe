// src/metrics/mod.rs
mod collector;

pub use collector::{
    BackendStateCollector, MetricsRegistry, PublishedSeries, SeriesKey, BACKEND_STATE_METRIC,
};
