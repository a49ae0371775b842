//! Feedback Ingestor — the bounded front door the surrounding system calls
//! with each transaction outcome. Decoupling admission from application lets
//! `submit` stay non-blocking under burst load while the Candidate Store's
//! single-writer-per-key discipline (see `super::mod`) absorbs updates at
//! its own pace.
//!
//! Backpressure policy per the routing deadline model: feedback ingestion is
//! bounded by a configurable queue depth; on overflow the oldest pending
//! (non-terminal, i.e. not yet applied) feedback is evicted and a counter is
//! incremented. Decisions are never dropped — only this queue is.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use crate::candidate::CandidateStore;
use crate::observability::EngineMetrics;
use crate::types::Feedback;

pub struct FeedbackIngestor {
    store: Arc<CandidateStore>,
    queue: Mutex<VecDeque<Feedback>>,
    capacity: usize,
    notify: Notify,
    metrics: EngineMetrics,
}

impl FeedbackIngestor {
    pub fn new(store: Arc<CandidateStore>, capacity: usize) -> Self {
        Self {
            store,
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            notify: Notify::new(),
            metrics: EngineMetrics,
        }
    }

    /// Admits `feedback` for asynchronous application. Never blocks: if the
    /// queue is already at capacity, the oldest pending item is dropped
    /// first to make room, and the overflow counter is incremented.
    pub fn submit(&self, feedback: Feedback) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.metrics.record_feedback_dropped_overflow();
            warn!(capacity = self.capacity, "feedback queue overflow, dropping oldest pending item");
        }
        queue.push_back(feedback);
        drop(queue);
        self.notify.notify_one();
    }

    /// Number of feedback items admitted but not yet applied.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Applies every currently-queued feedback item to the Candidate Store,
    /// in FIFO admission order, and returns the count applied. Intended for
    /// callers (tests, the demo binary) that want synchronous draining
    /// rather than the background `run` loop.
    pub fn drain_once(&self) -> usize {
        let mut applied = 0;
        while let Some(feedback) = self.pop() {
            self.store.apply_feedback(feedback);
            applied += 1;
        }
        applied
    }

    /// Runs until `shutdown` fires, applying queued feedback to the
    /// Candidate Store as it arrives. Meant to be spawned once at startup
    /// by the hosting process alongside the Router and the retrain
    /// scheduler; this engine does not spawn it itself.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            self.drain_once();
            tokio::select! {
                _ = self.notify.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.drain_once();
                        return;
                    }
                }
            }
        }
    }

    fn pop(&self) -> Option<Feedback> {
        self.queue.lock().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::historical::InMemoryHistoricalStore;
    use crate::config::{CandidateStorePolicy, HealthThresholds, RetrainPolicy};
    use chrono::Utc;

    fn sample_feedback(decision_id: &str, psp_name: &str) -> Feedback {
        Feedback {
            decision_id: decision_id.to_string(),
            psp_name: psp_name.to_string(),
            authorized: true,
            amount: 100.0,
            fee_amount: 2.0,
            processing_time_ms: 50.0,
            risk_score: 10,
            processed_at: Utc::now(),
            error_code: None,
            error_message: None,
        }
    }

    fn ingestor_with_capacity(capacity: usize) -> FeedbackIngestor {
        let store = Arc::new(CandidateStore::new(
            CandidateStorePolicy::default(),
            &HealthThresholds::default(),
            &RetrainPolicy::default(),
            Arc::new(InMemoryHistoricalStore::new()),
        ));
        FeedbackIngestor::new(store, capacity)
    }

    #[test]
    fn submit_within_capacity_does_not_drop() {
        let ingestor = ingestor_with_capacity(10);
        ingestor.submit(sample_feedback("d1", "alpha"));
        ingestor.submit(sample_feedback("d2", "alpha"));
        assert_eq!(ingestor.pending(), 2);
    }

    #[test]
    fn overflow_drops_oldest_pending_item() {
        let ingestor = ingestor_with_capacity(2);
        ingestor.submit(sample_feedback("d1", "alpha"));
        ingestor.submit(sample_feedback("d2", "alpha"));
        ingestor.submit(sample_feedback("d3", "alpha"));
        assert_eq!(ingestor.pending(), 2);

        let applied = ingestor.drain_once();
        assert_eq!(applied, 2);
        let candidates = ingestor.store.get_all_candidates();
        let alpha = candidates.iter().find(|c| c.psp_name == "alpha").unwrap();
        // d1 was evicted before ever being applied.
        assert_eq!(alpha.total_count, 2);
    }

    #[test]
    fn drain_once_applies_every_queued_item_exactly_once() {
        let ingestor = ingestor_with_capacity(10);
        ingestor.submit(sample_feedback("d1", "alpha"));
        ingestor.submit(sample_feedback("d2", "alpha"));
        assert_eq!(ingestor.drain_once(), 2);
        assert_eq!(ingestor.pending(), 0);
        assert_eq!(ingestor.drain_once(), 0);
    }
}
