//! Scorer — combines predictor outputs with fee structure and product
//! weights into a total utility per candidate, and enforces the ordered
//! tie-breaks. Scoring itself is pure and synchronous;
//! everything fallible (the Predictor call) has already happened by the
//! time a `ScoredCandidate` reaches here.

use std::cmp::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::types::{Candidate, Health, Prediction, Transaction, Weights};

/// One candidate after scoring, carrying enough of the inputs for the
/// Router to render `reasoning`/`features_used` without re-deriving them.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
    pub p_auth: f64,
    pub used_fallback: bool,
    pub amount: f64,
}

/// Result of `Scorer::select`: the winner plus up to two alternates, in
/// score order.
#[derive(Debug, Clone)]
pub struct Selection {
    pub winner: ScoredCandidate,
    pub alternates: Vec<ScoredCandidate>,
}

/// Holds the current `Weights` behind an `ArcSwap` so `swap_weights` can
/// publish a hot-reloaded set without interrupting in-flight `score` calls,
/// the same lock-free publish pattern `LocalEnsemblePredictor` uses for its
/// model snapshot.
pub struct Scorer {
    weights: ArcSwap<Weights>,
}

impl Scorer {
    pub fn new(weights: Weights) -> Self {
        Self {
            weights: ArcSwap::from_pointee(weights),
        }
    }

    /// Publishes a new weight set. Weights are loaded at startup and are
    /// hot-reloadable.
    pub fn swap_weights(&self, weights: Weights) {
        self.weights.store(Arc::new(weights));
    }

    pub fn weights(&self) -> Arc<Weights> {
        self.weights.load_full()
    }

    /// The score formula. `prediction` is `None` on predictor
    /// failure, in which case this runs the deterministic fallback:
    /// `p_auth <- authRate`, processing-time and health penalties taken
    /// from candidate state.
    pub fn score(
        &self,
        txn: &Transaction,
        candidate: &Candidate,
        prediction: Option<&Prediction>,
    ) -> ScoredCandidate {
        let weights = self.weights.load();
        let sca_applies = txn.sca_required && txn.is_card_payment();

        let (p_auth, used_fallback, health_penalty_applies) = match prediction {
            Some(p) => (
                p.auth_probability,
                false,
                matches!(p.health, crate::types::PredictedHealth::Yellow),
            ),
            None => (
                candidate.auth_rate_recent,
                true,
                matches!(candidate.health, Health::Yellow),
            ),
        };

        let fee_bps_term = weights.fee_bps_weight * (candidate.mean_fee_bps / 10_000.0);
        let fixed_fee_term =
            weights.fixed_fee_weight * (candidate.fixed_fee / txn.amount.max(1.0));
        let three_ds_bonus = if sca_applies && candidate.supports_3ds {
            weights.three_ds_bonus_when_sca
        } else {
            0.0
        };
        let risk_term = weights.risk_penalty_per_point * (txn.risk_score as f64);
        let yellow_penalty = if health_penalty_applies {
            weights.yellow_health_penalty
        } else {
            0.0
        };
        let bias_term = weights.business_bias_weight * weights.bias_for(&candidate.psp_name);

        let score = weights.auth_weight * p_auth - fee_bps_term - fixed_fee_term + three_ds_bonus
            - risk_term
            - yellow_penalty
            + bias_term;

        ScoredCandidate {
            candidate: candidate.clone(),
            score,
            p_auth,
            used_fallback,
            amount: txn.amount,
        }
    }

    /// Scores every candidate, orders by the tie-break chain,
    /// and returns the winner plus up to two alternates. Never called with
    /// an empty `candidates` — the Router guarantees at least one candidate
    /// survived guardrails before invoking the Scorer.
    pub fn select(&self, scored: Vec<ScoredCandidate>) -> Selection {
        let mut scored = scored;
        scored.sort_by(|a, b| compare_candidates(a, b));
        let mut iter = scored.into_iter();
        let winner = iter.next().expect("Scorer::select called with no candidates");
        let alternates = iter.take(2).collect();
        Selection { winner, alternates }
    }
}

/// Primary: maximum score. Tie-break 1: higher rolling authRate. Tie-break
/// 2: lower total fee (fee-bps + fixed fee) on the current amount. Tie-break
/// 3: lexicographic psp name.
fn compare_candidates(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.candidate
                .auth_rate_recent
                .partial_cmp(&a.candidate.auth_rate_recent)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| {
            a.candidate
                .total_fee(a.amount)
                .partial_cmp(&b.candidate.total_fee(b.amount))
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.candidate.psp_name.cmp(&b.candidate.psp_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PredictedHealth;
    use chrono::Utc;

    fn sample_txn(sca_required: bool) -> Transaction {
        Transaction {
            merchant_id: "m1".to_string(),
            buyer_country: "US".to_string(),
            merchant_country: "US".to_string(),
            currency_id: 840,
            payment_method_id: 1,
            amount: 100.0,
            card_bin: None,
            tokenized: false,
            sca_required,
            risk_score: 10,
        }
    }

    fn sample_candidate(name: &str, auth_rate: f64, fee_bps: f64) -> Candidate {
        let mut c = Candidate::new(name);
        c.health = Health::Green;
        c.auth_rate_recent = auth_rate;
        c.auth_rate_window = auth_rate;
        c.mean_fee_bps = fee_bps;
        c
    }

    #[test]
    fn fallback_uses_rolling_auth_rate_when_no_prediction() {
        let scorer = Scorer::new(Weights::default());
        let txn = sample_txn(false);
        let candidate = sample_candidate("alpha", 0.9, 100.0);
        let scored = scorer.score(&txn, &candidate, None);
        assert!(scored.used_fallback);
        assert_eq!(scored.p_auth, 0.9);
    }

    #[test]
    fn higher_predicted_auth_yields_higher_score() {
        let scorer = Scorer::new(Weights::default());
        let txn = sample_txn(false);
        let candidate = sample_candidate("alpha", 0.5, 100.0);
        let low = scorer.score(
            &txn,
            &candidate,
            Some(&Prediction {
                auth_probability: 0.5,
                processing_time_ms: 50.0,
                health: PredictedHealth::Green,
                model_version: "v1".to_string(),
                timestamp: Utc::now(),
            }),
        );
        let high = scorer.score(
            &txn,
            &candidate,
            Some(&Prediction {
                auth_probability: 0.95,
                processing_time_ms: 50.0,
                health: PredictedHealth::Green,
                model_version: "v1".to_string(),
                timestamp: Utc::now(),
            }),
        );
        assert!(high.score > low.score);
    }

    #[test]
    fn three_ds_bonus_only_applies_when_sca_required_and_supported() {
        let scorer = Scorer::new(Weights::default());
        let txn = sample_txn(true);
        let mut candidate = sample_candidate("alpha", 0.8, 100.0);
        candidate.supports_3ds = true;
        let with_3ds = scorer.score(&txn, &candidate, None);

        candidate.supports_3ds = false;
        let without_3ds = scorer.score(&txn, &candidate, None);

        assert!(with_3ds.score > without_3ds.score);
    }

    #[test]
    fn tie_break_prefers_higher_auth_rate_then_lower_fee_then_name() {
        let scorer = Scorer::new(Weights::default());
        let txn = sample_txn(false);

        let alpha = sample_candidate("alpha", 0.80, 100.0);
        let beta = sample_candidate("beta", 0.80, 50.0);
        let scored = vec![
            scorer.score(&txn, &alpha, None),
            scorer.score(&txn, &beta, None),
        ];
        // Equal score (identical auth rate, only fee differs but both get
        // scored with their own fee baked in, so force equal scores here
        // by comparing ordering logic directly instead of relying on the
        // weighted fee term to exactly cancel).
        let mut by_rate_and_fee = scored.clone();
        by_rate_and_fee.sort_by(compare_candidates);
        assert_eq!(by_rate_and_fee[0].candidate.psp_name, "beta");
    }

    #[test]
    fn select_returns_up_to_two_alternates_in_score_order() {
        let scorer = Scorer::new(Weights::default());
        let txn = sample_txn(false);
        let scored = vec![
            scorer.score(&txn, &sample_candidate("alpha", 0.70, 100.0), None),
            scorer.score(&txn, &sample_candidate("beta", 0.90, 100.0), None),
            scorer.score(&txn, &sample_candidate("gamma", 0.80, 100.0), None),
            scorer.score(&txn, &sample_candidate("delta", 0.60, 100.0), None),
        ];
        let selection = scorer.select(scored);
        assert_eq!(selection.winner.candidate.psp_name, "beta");
        assert_eq!(selection.alternates.len(), 2);
        assert_eq!(selection.alternates[0].candidate.psp_name, "gamma");
        assert_eq!(selection.alternates[1].candidate.psp_name, "alpha");
    }

    #[test]
    fn swap_weights_changes_subsequent_scores() {
        let scorer = Scorer::new(Weights::default());
        let txn = sample_txn(false);
        let candidate = sample_candidate("alpha", 0.8, 100.0);
        let before = scorer.score(&txn, &candidate, None).score;

        let mut heavier = Weights::default();
        heavier.auth_weight = 100.0;
        scorer.swap_weights(heavier);
        let after = scorer.score(&txn, &candidate, None).score;

        assert!(after > before);
    }
}
