//! Observability: latency histograms and `metrics` crate counters/gauges.

pub mod histogram;
pub mod metrics;

pub use histogram::{HistogramSummary, LatencyHistogram};
pub use metrics::EngineMetrics;
