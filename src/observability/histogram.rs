//! Latency histogram with logarithmic buckets, carried forward from this
//! codebase's `performance::latency::histogram` module. Covers 1μs to 10s
//! with ~10% relative error and near-zero overhead in the hot path, which is
//! what the Router's per-call `Predict` timeout and aggregate routing
//! deadline both need to stay observable without perturbing them.

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug)]
pub struct LatencyHistogram {
    inner: Mutex<HistogramInner>,
}

#[derive(Debug)]
struct HistogramInner {
    buckets: Vec<u64>,
    bucket_bounds_us: &'static [u64],
    count: u64,
    sum_us: u64,
    min_us: u64,
    max_us: u64,
}

static BUCKET_BOUNDS: &[u64] = &[
    1, 2, 5, 10, 20, 50, 100, 200, 500, 1_000, 2_000, 5_000, 10_000, 20_000, 50_000, 100_000,
    200_000, 500_000, 1_000_000, 2_000_000, 5_000_000, 10_000_000, u64::MAX,
];

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HistogramInner {
                buckets: vec![0u64; BUCKET_BOUNDS.len()],
                bucket_bounds_us: BUCKET_BOUNDS,
                count: 0,
                sum_us: 0,
                min_us: u64::MAX,
                max_us: 0,
            }),
        }
    }

    #[inline]
    pub fn record(&self, latency_us: u64) {
        let mut inner = self.inner.lock();
        inner.count += 1;
        inner.sum_us = inner.sum_us.saturating_add(latency_us);
        inner.min_us = inner.min_us.min(latency_us);
        inner.max_us = inner.max_us.max(latency_us);

        let idx = inner
            .bucket_bounds_us
            .partition_point(|&bound| bound < latency_us);
        let bucket_idx = idx.min(inner.buckets.len() - 1);
        inner.buckets[bucket_idx] += 1;
    }

    #[inline]
    pub fn record_duration(&self, duration: std::time::Duration) {
        self.record(duration.as_micros() as u64);
    }

    pub fn percentile(&self, p: f64) -> u64 {
        let inner = self.inner.lock();
        self.percentile_inner(&inner, p)
    }

    fn percentile_inner(&self, inner: &HistogramInner, p: f64) -> u64 {
        if inner.count == 0 {
            return 0;
        }
        let target = ((p / 100.0) * inner.count as f64).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, &bucket_count) in inner.buckets.iter().enumerate() {
            cumulative += bucket_count;
            if cumulative >= target {
                return inner.bucket_bounds_us[i];
            }
        }
        inner.max_us
    }

    #[inline]
    pub fn p50(&self) -> u64 {
        self.percentile(50.0)
    }

    #[inline]
    pub fn p99(&self) -> u64 {
        self.percentile(99.0)
    }

    pub fn mean(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.count == 0 {
            0.0
        } else {
            inner.sum_us as f64 / inner.count as f64
        }
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().count
    }

    pub fn summary(&self, name: &str) -> HistogramSummary {
        let inner = self.inner.lock();
        HistogramSummary {
            name: name.to_string(),
            count: inner.count,
            mean_us: if inner.count == 0 {
                0.0
            } else {
                inner.sum_us as f64 / inner.count as f64
            },
            p50_us: self.percentile_inner(&inner, 50.0),
            p99_us: self.percentile_inner(&inner, 99.0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramSummary {
    pub name: String,
    pub count: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p99_us: u64,
}
