//! Segment performance + capability projection, cached per
//! `(currency_id, payment_method_id)` with a configurable TTL and
//! single-flight coalescing on a cache miss, so a burst of concurrent
//! `get_candidates` calls for the same segment triggers exactly one
//! historical-store read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::candidate::historical::HistoricalOutcomeStore;
use crate::config::CandidateStorePolicy;
use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub currency_id: u32,
    pub payment_method_id: u32,
}

/// Per-psp projection restricted to one segment's rows.
#[derive(Debug, Clone)]
pub struct SegmentProjection {
    pub auth_rate: f64,
    pub mean_fee_bps: f64,
    pub fixed_fee: f64,
    pub supports_3ds: bool,
    pub supports_tokenization: bool,
    pub row_count: u64,
}

struct SegmentView {
    projections: HashMap<String, SegmentProjection>,
    computed_at: Instant,
}

/// TTL + single-flight cache over per-segment projections.
pub struct SegmentCache {
    policy_window_days: i64,
    success_status_codes: Vec<i32>,
    ttl: Duration,
    refresh_timeout: Duration,
    views: parking_lot::RwLock<HashMap<SegmentKey, Arc<SegmentView>>>,
    /// One async mutex per in-flight segment key, so concurrent misses for
    /// the same key coalesce into a single historical-store read instead of
    /// a thundering herd.
    in_flight: parking_lot::Mutex<HashMap<SegmentKey, Arc<AsyncMutex<()>>>>,
}

impl SegmentCache {
    pub fn new(policy: &CandidateStorePolicy) -> Self {
        Self {
            policy_window_days: policy.window_days,
            success_status_codes: policy.success_status_codes.clone(),
            ttl: policy.segment_cache_ttl(),
            refresh_timeout: Duration::from_secs(1),
            views: parking_lot::RwLock::new(HashMap::new()),
            in_flight: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Fetch the cached projection for `key`, recomputing from `store` on a
    /// cold or expired cache entry in a single coordinated pass, so a burst
    /// of concurrent misses for the same segment key coalesces into one
    /// historical-store read instead of a thundering herd.
    pub async fn get(
        &self,
        key: SegmentKey,
        store: &dyn HistoricalOutcomeStore,
    ) -> Result<HashMap<String, SegmentProjection>, EngineError> {
        if let Some(view) = self.fresh_view(key) {
            return Ok(view.projections.clone());
        }

        let lock = {
            let mut in_flight = self.in_flight.lock();
            in_flight
                .entry(key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        // Re-check: another task may have refreshed the segment while we
        // waited for the single-flight lock.
        if let Some(view) = self.fresh_view(key) {
            return Ok(view.projections.clone());
        }

        debug!(
            currency_id = key.currency_id,
            payment_method_id = key.payment_method_id,
            "segment cache miss, recomputing"
        );

        let since = Utc::now() - chrono::Duration::days(self.policy_window_days);
        let rows = tokio::time::timeout(
            self.refresh_timeout,
            store.query_segment(key.currency_id, key.payment_method_id, since),
        )
        .await
        .map_err(|_| EngineError::CandidateUnavailable {
            segment: format!("{}/{}", key.currency_id, key.payment_method_id),
            reason: "segment refresh timed out".to_string(),
        })??;

        let projections = aggregate(&rows, &self.success_status_codes);
        let view = Arc::new(SegmentView {
            projections: projections.clone(),
            computed_at: Instant::now(),
        });
        self.views.write().insert(key, view);

        // Drop the in-flight entry so future misses get a fresh lock handle;
        // otherwise the registry grows unboundedly across segment churn.
        self.in_flight.lock().remove(&key);

        Ok(projections)
    }

    fn fresh_view(&self, key: SegmentKey) -> Option<Arc<SegmentView>> {
        let views = self.views.read();
        views
            .get(&key)
            .filter(|v| v.computed_at.elapsed() < self.ttl)
            .cloned()
    }
}

fn aggregate(
    rows: &[crate::candidate::historical::OutcomeRow],
    success_status_codes: &[i32],
) -> HashMap<String, SegmentProjection> {
    struct Accum {
        total: u64,
        successes: u64,
        fee_bps_sum: f64,
        fixed_fee_sum: f64,
        saw_3ds: bool,
        saw_tokenized: bool,
    }

    let mut accum: HashMap<String, Accum> = HashMap::new();
    for row in rows {
        let entry = accum.entry(row.psp_name.clone()).or_insert(Accum {
            total: 0,
            successes: 0,
            fee_bps_sum: 0.0,
            fixed_fee_sum: 0.0,
            saw_3ds: false,
            saw_tokenized: false,
        });
        entry.total += 1;
        if success_status_codes.contains(&row.status_code) {
            entry.successes += 1;
        }
        entry.fee_bps_sum += row.fee_bps;
        entry.fixed_fee_sum += row.fixed_fee;
        entry.saw_3ds |= row.three_ds;
        entry.saw_tokenized |= row.tokenized;
    }

    accum
        .into_iter()
        .map(|(psp, a)| {
            let auth_rate = if a.total > 0 {
                a.successes as f64 / a.total as f64
            } else {
                0.0
            };
            (
                psp,
                SegmentProjection {
                    auth_rate,
                    mean_fee_bps: if a.total > 0 {
                        a.fee_bps_sum / a.total as f64
                    } else {
                        0.0
                    },
                    fixed_fee: if a.total > 0 {
                        a.fixed_fee_sum / a.total as f64
                    } else {
                        0.0
                    },
                    supports_3ds: a.saw_3ds,
                    supports_tokenization: a.saw_tokenized,
                    row_count: a.total,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::historical::{sample_row, InMemoryHistoricalStore};
    use crate::config::CandidateStorePolicy;

    #[tokio::test]
    async fn coalesces_concurrent_misses_into_one_read() {
        let store = InMemoryHistoricalStore::with_rows(vec![
            sample_row("alpha", 5, 840, 1, false),
            sample_row("alpha", 5, 840, 1, false),
        ]);
        let cache = SegmentCache::new(&CandidateStorePolicy::default());
        let key = SegmentKey {
            currency_id: 840,
            payment_method_id: 1,
        };

        let p = cache.get(key, &store).await.unwrap();
        assert_eq!(p["alpha"].row_count, 2);
        assert_eq!(p["alpha"].auth_rate, 1.0);

        // Second call within the TTL must hit cache, not recompute.
        let p2 = cache.get(key, &store).await.unwrap();
        assert_eq!(p2["alpha"].row_count, 2);
    }

    #[tokio::test]
    async fn propagates_store_failure_as_candidate_unavailable() {
        let store = InMemoryHistoricalStore::new();
        store.set_failure(Some("warehouse down".to_string()));
        let cache = SegmentCache::new(&CandidateStorePolicy::default());
        let key = SegmentKey {
            currency_id: 840,
            payment_method_id: 1,
        };

        let err = cache.get(key, &store).await.unwrap_err();
        assert!(matches!(err, EngineError::CandidateUnavailable { .. }));
    }
}
