//! Feedback-application primitives: the per-candidate decision-id dedup ring
//! and the exponential smoothing used for rolling processing time.

use std::collections::VecDeque;

/// Fixed-capacity ring of recently-seen decision ids, scoped to one
/// candidate. Evicts the oldest id once `capacity` is reached — a strict FIFO
/// is sufficient here because re-delivery of the *same* decision id is what
/// must be caught, not arbitrary-age membership.
#[derive(Debug, Clone)]
pub struct DedupRing {
    capacity: usize,
    seen: VecDeque<String>,
}

impl DedupRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn contains(&self, decision_id: &str) -> bool {
        self.seen.iter().any(|id| id == decision_id)
    }

    /// Records `decision_id`, evicting the oldest entry if at capacity.
    /// No-op (but still not an error) if already present, since
    /// `apply_feedback` checks `contains` before ever calling this.
    pub fn record(&mut self, decision_id: String) {
        if self.seen.len() >= self.capacity {
            self.seen.pop_front();
        }
        self.seen.push_back(decision_id);
    }
}

/// Exponentially-smoothed scalar, used for rolling average processing time.
/// Default α = 0.1.
#[derive(Debug, Clone, Copy)]
pub struct Ewma {
    alpha: f64,
    value: Option<f64>,
}

impl Ewma {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    pub fn observe(&mut self, sample: f64) -> f64 {
        let next = match self.value {
            None => sample,
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn current(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_ring_evicts_oldest_past_capacity() {
        let mut ring = DedupRing::new(2);
        ring.record("a".to_string());
        ring.record("b".to_string());
        assert!(ring.contains("a"));
        ring.record("c".to_string());
        assert!(!ring.contains("a"));
        assert!(ring.contains("b"));
        assert!(ring.contains("c"));
    }

    #[test]
    fn ewma_first_sample_is_the_value() {
        let mut e = Ewma::new(0.1);
        assert_eq!(e.observe(200.0), 200.0);
        let second = e.observe(100.0);
        assert!((second - 190.0).abs() < 1e-9);
    }
}
