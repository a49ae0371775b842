//! Candidate Store — the only shared mutable state in the engine.
//! Owns the authoritative Candidate map, refreshed from the
//! historical outcome store and continuously updated by feedback.
//!
//! Two data sources feed a returned `Candidate` snapshot:
//! - the live, feedback-driven rolling state (`total_count`/`total_successes`,
//!   the recent/window auth rate that drives `health`, and the smoothed
//!   processing time) — mutated only by `apply_feedback`;
//! - the segment-scoped capability projection (`supports_3ds`,
//!   `supports_tokenization`, segment `mean_fee_bps`/`fixed_fee`, and the
//!   segment auth rate used purely for ordering and the minimum-volume
//!   eligibility gate) — recomputed per `(currency_id, payment_method_id)` by
//!   `SegmentCache` on every `get_candidates` call.
//!
//! See `DESIGN.md` for why these two are kept separate rather than folding
//! segment stats into the global rolling state.

pub mod feedback;
pub mod historical;
pub mod ingestor;
pub mod segment;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::CandidateStorePolicy;
use crate::errors::EngineError;
use crate::observability::EngineMetrics;
use crate::types::{Candidate, Feedback, Health, Transaction};

use feedback::{DedupRing, Ewma};
use historical::HistoricalOutcomeStore;
use segment::{SegmentCache, SegmentKey};

#[derive(Debug, Clone)]
struct FeedbackEvent {
    authorized: bool,
    processed_at: DateTime<Utc>,
}

struct CandidateRecord {
    supported: bool,
    total_count: u64,
    total_successes: u64,
    window_events: VecDeque<FeedbackEvent>,
    processing_time: Ewma,
    dedup_ring: DedupRing,
    last_updated: DateTime<Utc>,
}

impl CandidateRecord {
    fn new(policy: &CandidateStorePolicy) -> Self {
        Self {
            supported: true,
            total_count: 0,
            total_successes: 0,
            window_events: VecDeque::new(),
            processing_time: Ewma::new(policy.processing_time_alpha),
            dedup_ring: DedupRing::new(policy.dedup_ring_capacity),
            last_updated: Utc::now(),
        }
    }

    fn prune(&mut self, window_days: i64, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::days(window_days);
        while let Some(front) = self.window_events.front() {
            if front.processed_at < cutoff {
                self.window_events.pop_front();
            } else {
                break;
            }
        }
    }

    fn auth_rate_over(&self, window_days: i64, now: DateTime<Utc>) -> f64 {
        let cutoff = now - chrono::Duration::days(window_days);
        let mut total = 0u64;
        let mut successes = 0u64;
        for e in self.window_events.iter().rev() {
            if e.processed_at < cutoff {
                break;
            }
            total += 1;
            if e.authorized {
                successes += 1;
            }
        }
        if total == 0 {
            0.0
        } else {
            successes as f64 / total as f64
        }
    }
}

pub struct CandidateStore {
    policy: CandidateStorePolicy,
    health_green_cutoff: f64,
    health_yellow_cutoff: f64,
    recent_window_days: i64,
    window_days: i64,
    historical: std::sync::Arc<dyn HistoricalOutcomeStore>,
    segment_cache: SegmentCache,
    records: RwLock<HashMap<String, CandidateRecord>>,
    last_retrain: RwLock<Option<DateTime<Utc>>>,
    feedback_since_retrain: AtomicU64,
    retrain_interval: std::time::Duration,
    retrain_feedback_trigger: u64,
    metrics: EngineMetrics,
}

impl CandidateStore {
    pub fn new(
        policy: CandidateStorePolicy,
        health: &crate::config::HealthThresholds,
        retrain: &crate::config::RetrainPolicy,
        historical: std::sync::Arc<dyn HistoricalOutcomeStore>,
    ) -> Self {
        Self {
            segment_cache: SegmentCache::new(&policy)
                .with_refresh_timeout(std::time::Duration::from_secs(1)),
            health_green_cutoff: health.green_cutoff,
            health_yellow_cutoff: health.yellow_cutoff,
            recent_window_days: policy.recent_window_days,
            window_days: policy.window_days,
            records: RwLock::new(HashMap::new()),
            last_retrain: RwLock::new(None),
            feedback_since_retrain: AtomicU64::new(0),
            retrain_interval: retrain.interval(),
            retrain_feedback_trigger: retrain.feedback_count_trigger,
            metrics: EngineMetrics,
            policy,
            historical,
        }
    }

    /// Segment filtering algorithm, applied in a fixed order: segment
    /// performance -> capability projection -> eligibility gates -> ordering.
    pub async fn get_candidates(&self, txn: &Transaction) -> Result<Vec<Candidate>, EngineError> {
        let key = SegmentKey {
            currency_id: txn.currency_id,
            payment_method_id: txn.payment_method_id,
        };
        let projections = self.segment_cache.get(key, self.historical.as_ref()).await?;
        let now = Utc::now();

        let mut out = Vec::with_capacity(projections.len());
        let records = self.records.read();
        for (psp_name, proj) in &projections {
            if proj.row_count < self.policy.minimum_volume_threshold {
                continue;
            }

            let supported = records.get(psp_name).map(|r| r.supported).unwrap_or(true);
            if !supported {
                continue;
            }

            let (auth_rate_recent, total_count, total_successes, avg_processing_time_ms, last_updated) =
                match records.get(psp_name) {
                    Some(r) => (
                        r.auth_rate_over(self.recent_window_days, now),
                        r.total_count,
                        r.total_successes,
                        r.processing_time.current(),
                        r.last_updated,
                    ),
                    None => (proj.auth_rate, 0, 0, 0.0, now),
                };

            let health = Health::from_auth_rate(
                auth_rate_recent,
                self.health_green_cutoff,
                self.health_yellow_cutoff,
            );

            out.push(Candidate {
                psp_name: psp_name.clone(),
                supported,
                health,
                auth_rate_window: proj.auth_rate,
                auth_rate_recent,
                mean_fee_bps: proj.mean_fee_bps,
                fixed_fee: proj.fixed_fee,
                supports_3ds: proj.supports_3ds,
                supports_tokenization: proj.supports_tokenization,
                avg_processing_time_ms,
                total_count,
                total_successes,
                last_updated,
            });
        }
        drop(records);

        // Order by segment authRate descending; ties broken by lower mean fee.
        out.sort_by(|a, b| {
            b.auth_rate_window
                .partial_cmp(&a.auth_rate_window)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.mean_fee_bps
                        .partial_cmp(&b.mean_fee_bps)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        Ok(out)
    }

    /// Observability snapshot of every candidate the store has ever seen
    /// feedback for, regardless of segment or volume. Also the periodic
    /// sweep point that refreshes the `psp_router_candidate_health` gauge
    /// per psp, since this is the only place global health is recomputed
    /// for every known candidate at once.
    pub fn get_all_candidates(&self) -> Vec<Candidate> {
        let now = Utc::now();
        let records = self.records.read();
        records
            .iter()
            .map(|(psp_name, r)| {
                let auth_rate_recent = r.auth_rate_over(self.recent_window_days, now);
                let auth_rate_window = r.auth_rate_over(self.window_days, now);
                let health = Health::from_auth_rate(
                    auth_rate_recent,
                    self.health_green_cutoff,
                    self.health_yellow_cutoff,
                );
                self.metrics.set_candidate_health_gauge(psp_name, health.as_gauge_value());
                Candidate {
                    psp_name: psp_name.clone(),
                    supported: r.supported,
                    health,
                    auth_rate_window,
                    auth_rate_recent,
                    mean_fee_bps: 0.0,
                    fixed_fee: 0.0,
                    supports_3ds: false,
                    supports_tokenization: false,
                    avg_processing_time_ms: r.processing_time.current(),
                    total_count: r.total_count,
                    total_successes: r.total_successes,
                    last_updated: r.last_updated,
                }
            })
            .collect()
    }

    /// Feedback application. Idempotent on `feedback.decision_id`; returns
    /// `true` if this call actually mutated state, `false` if it was a
    /// duplicate delivery.
    pub fn apply_feedback(&self, feedback: Feedback) -> bool {
        let mut records = self.records.write();
        let record = records
            .entry(feedback.psp_name.clone())
            .or_insert_with(|| {
                debug!(psp = %feedback.psp_name, "registering unseen psp from feedback");
                CandidateRecord::new(&self.policy)
            });

        if record.dedup_ring.contains(&feedback.decision_id) {
            self.metrics.record_feedback_applied(true);
            return false;
        }

        record.total_count += 1;
        if feedback.authorized {
            record.total_successes += 1;
        }
        record.window_events.push_back(FeedbackEvent {
            authorized: feedback.authorized,
            processed_at: feedback.processed_at,
        });
        record.prune(self.window_days, feedback.processed_at);
        record.processing_time.observe(feedback.processing_time_ms);
        record.dedup_ring.record(feedback.decision_id);
        record.last_updated = feedback.processed_at;

        drop(records);
        self.feedback_since_retrain.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_feedback_applied(false);
        true
    }

    /// Retraining trigger.
    pub fn should_retrain(&self) -> bool {
        let last = *self.last_retrain.read();
        match last {
            None => true,
            Some(last) => {
                let elapsed = Utc::now().signed_duration_since(last);
                let interval_exceeded = elapsed
                    .to_std()
                    .map(|d| d > self.retrain_interval)
                    .unwrap_or(true);
                let count_exceeded = self.feedback_since_retrain.load(Ordering::Relaxed)
                    >= self.retrain_feedback_trigger;
                interval_exceeded || count_exceeded
            }
        }
    }

    pub async fn retrain(&self, retrainer: &dyn crate::retrain::Retrainer) -> Result<(), EngineError> {
        info!("retrain triggered");
        retrainer.retrain().await?;
        *self.last_retrain.write() = Some(Utc::now());
        self.feedback_since_retrain.store(0, Ordering::Relaxed);
        self.metrics.record_retrain();
        Ok(())
    }

    pub fn mark_unsupported(&self, psp_name: &str) {
        let mut records = self.records.write();
        let record = records
            .entry(psp_name.to_string())
            .or_insert_with(|| CandidateRecord::new(&self.policy));
        record.supported = false;
        warn!(psp = psp_name, "psp marked unsupported");
    }
}
