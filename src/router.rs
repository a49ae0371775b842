//! Router — orchestrates guardrails, prediction, scoring, and decision
//! shaping; enforces failure policy.
//!
//! The Router holds no mutable per-request state between calls: concurrent
//! `Decide` calls do not interact. Everything it touches —
//! the Candidate Store, the Predictor, the Scorer — is handed in as a
//! shared, already-synchronized reference.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::candidate::CandidateStore;
use crate::config::{DecisionDefaults, Timeouts};
use crate::errors::EngineError;
use crate::observability::{EngineMetrics, HistogramSummary, LatencyHistogram};
use crate::predictor::Predictor;
use crate::scorer::{Scorer, ScoredCandidate};
use crate::types::{Candidate, Constraints, Decision, GuardrailTag, Transaction, DECISION_SCHEMA_VERSION};

pub struct Router {
    candidate_store: Arc<CandidateStore>,
    predictor: Arc<dyn Predictor>,
    scorer: Arc<Scorer>,
    timeouts: Timeouts,
    decision_defaults: DecisionDefaults,
    metrics: EngineMetrics,
    decide_latency: LatencyHistogram,
    predict_latency: Arc<LatencyHistogram>,
}

impl Router {
    pub fn new(
        candidate_store: Arc<CandidateStore>,
        predictor: Arc<dyn Predictor>,
        scorer: Arc<Scorer>,
        timeouts: Timeouts,
        decision_defaults: DecisionDefaults,
    ) -> Self {
        Self {
            candidate_store,
            predictor,
            scorer,
            timeouts,
            decision_defaults,
            metrics: EngineMetrics,
            decide_latency: LatencyHistogram::new(),
            predict_latency: Arc::new(LatencyHistogram::new()),
        }
    }

    /// Latency distribution of `decide` calls, including time spent on
    /// guardrails, prediction, and scoring.
    pub fn decide_latency_summary(&self) -> HistogramSummary {
        self.decide_latency.summary("psp_router_decide")
    }

    /// Latency distribution of individual `Predictor::predict` calls.
    pub fn predict_latency_summary(&self) -> HistogramSummary {
        self.predict_latency.summary("psp_router_predict")
    }

    /// Always returns a Decision unless no candidate
    /// survives guardrails, in which case fails with `NoEligibleCandidate`.
    /// Candidate Store failures are surfaced as-is; predictor failures are
    /// recovered locally and never escape this call.
    pub async fn decide(&self, txn: &Transaction) -> Result<Decision, EngineError> {
        txn.validate()?;
        let started = Instant::now();

        let decide_future = self.decide_inner(txn);
        let decision = match timeout(self.timeouts.routing_deadline(), decide_future).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::DeadlineExceeded {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    budget_ms: self.timeouts.routing_deadline_ms,
                })
            }
        };

        let elapsed = started.elapsed();
        self.metrics.record_decision(
            decision.guardrail,
            decision.reasoning.contains("deterministic fallback"),
            elapsed.as_secs_f64() * 1000.0,
        );
        self.decide_latency.record_duration(elapsed);
        Ok(decision)
    }

    async fn decide_inner(&self, txn: &Transaction) -> Result<Decision, EngineError> {
        let candidates = self.candidate_store.get_candidates(txn).await.map_err(|e| {
            if let EngineError::CandidateUnavailable { segment, reason } = &e {
                self.metrics.record_candidate_unavailable();
                error!(segment = %segment, reason = %reason, "candidate store unavailable, surfacing to caller");
            }
            e
        })?;

        let (survivors, guardrail) = apply_guardrails(txn, candidates);
        if survivors.is_empty() {
            self.metrics.record_no_eligible_candidate();
            return Err(EngineError::NoEligibleCandidate);
        }

        let scored = self.score_all(txn, survivors).await;
        let selection = self.scorer.select(scored);

        Ok(self.shape_decision(txn, guardrail, selection))
    }

    /// Runs `Predictor::predict` for every surviving candidate concurrently,
    /// each under its own per-call timeout, and falls back deterministically
    /// for any candidate whose prediction failed or timed out. Each task
    /// owns a clone of everything it touches so it can be spawned onto a
    /// `JoinSet` rather than borrowed across an await point.
    async fn score_all(&self, txn: &Transaction, candidates: Vec<Candidate>) -> Vec<ScoredCandidate> {
        let predictor_timeout = self.timeouts.predictor_timeout();
        let mut set = tokio::task::JoinSet::new();

        for candidate in candidates {
            let predictor = Arc::clone(&self.predictor);
            let scorer = Arc::clone(&self.scorer);
            let metrics = self.metrics;
            let predict_latency = Arc::clone(&self.predict_latency);
            let txn = txn.clone();

            set.spawn(async move {
                let predict_started = Instant::now();
                let prediction = match timeout(predictor_timeout, predictor.predict(&txn, &candidate)).await
                {
                    Ok(Ok(prediction)) => {
                        metrics.record_predictor_call(
                            true,
                            predict_started.elapsed().as_secs_f64() * 1000.0,
                        );
                        Some(prediction)
                    }
                    Ok(Err(e)) => {
                        warn!(psp = %candidate.psp_name, error = %e, "predictor unavailable, using deterministic fallback");
                        metrics.record_predictor_call(
                            false,
                            predict_started.elapsed().as_secs_f64() * 1000.0,
                        );
                        None
                    }
                    Err(_) => {
                        warn!(psp = %candidate.psp_name, "predictor timed out, using deterministic fallback");
                        metrics.record_predictor_call(
                            false,
                            predict_started.elapsed().as_secs_f64() * 1000.0,
                        );
                        None
                    }
                };
                predict_latency.record_duration(predict_started.elapsed());
                scorer.score(&txn, &candidate, prediction.as_ref())
            });
        }

        let mut out = Vec::new();
        while let Some(result) = set.join_next().await {
            if let Ok(scored) = result {
                out.push(scored);
            }
        }
        out
    }

    fn shape_decision(
        &self,
        txn: &Transaction,
        guardrail: GuardrailTag,
        selection: crate::scorer::Selection,
    ) -> Decision {
        let must_use_3ds = txn.sca_required && txn.is_card_payment();
        let reasoning = render_reasoning(txn, &selection.winner, guardrail);
        let features_used = render_features_used(txn, &selection.winner);

        Decision {
            schema_version: DECISION_SCHEMA_VERSION.to_string(),
            decision_id: Uuid::new_v4().to_string(),
            candidate: selection.winner.candidate.psp_name.clone(),
            alternates: selection
                .alternates
                .iter()
                .map(|a| a.candidate.psp_name.clone())
                .collect(),
            reasoning,
            guardrail,
            constraints: Constraints {
                must_use_3ds,
                retry_window_ms: self.decision_defaults.retry_window_ms,
                max_retries: self.decision_defaults.max_retries,
            },
            features_used,
        }
    }

    /// Invoked by an external scheduler; this engine never schedules
    /// retraining itself.
    pub fn should_retrain(&self) -> bool {
        self.candidate_store.should_retrain()
    }

    pub async fn retrain(&self, retrainer: &dyn crate::retrain::Retrainer) -> Result<(), EngineError> {
        self.candidate_store.retrain(retrainer).await
    }

    /// Snapshot of the full candidate set, for observability.
    pub fn list_candidates(&self) -> Vec<Candidate> {
        self.candidate_store.get_all_candidates()
    }

    pub fn model_status(&self) -> (String, String) {
        (
            self.predictor.state().as_model_status().to_string(),
            self.predictor.model_version(),
        )
    }
}

/// Guardrails, applied in order. Returns the surviving
/// candidates and the tag of the first guardrail stage that rejected at
/// least one candidate (`none` if every candidate survived every check).
/// The caller fails with `NoEligibleCandidate` only if the final surviving
/// set is empty, regardless of which stage emptied it.
fn apply_guardrails(txn: &Transaction, candidates: Vec<Candidate>) -> (Vec<Candidate>, GuardrailTag) {
    let mut guardrail = GuardrailTag::None;

    let before = candidates.len();
    let after_capability: Vec<Candidate> = candidates.into_iter().filter(|c| c.supported).collect();
    if after_capability.len() < before {
        guardrail = GuardrailTag::Capability;
    }
    if after_capability.is_empty() {
        return (after_capability, guardrail);
    }

    let before = after_capability.len();
    let after_health: Vec<Candidate> = after_capability
        .into_iter()
        .filter(|c| c.health != crate::types::Health::Red)
        .collect();
    if after_health.len() < before && guardrail == GuardrailTag::None {
        guardrail = GuardrailTag::Health;
    }
    if after_health.is_empty() {
        return (after_health, guardrail);
    }

    let sca_applies = txn.sca_required && txn.is_card_payment();
    let before = after_health.len();
    let after_compliance: Vec<Candidate> = if sca_applies {
        after_health
            .into_iter()
            .filter(|c| c.supports_3ds)
            .collect()
    } else {
        after_health
    };
    if after_compliance.len() < before && guardrail == GuardrailTag::None {
        guardrail = GuardrailTag::Compliance;
    }

    (after_compliance, guardrail)
}

fn render_reasoning(txn: &Transaction, winner: &ScoredCandidate, guardrail: GuardrailTag) -> String {
    let mut reasons = Vec::new();
    if winner.used_fallback {
        reasons.push("deterministic fallback".to_string());
    }
    reasons.push(format!("highest predicted auth ({:.2})", winner.p_auth));
    if txn.sca_required && txn.is_card_payment() {
        reasons.push("3DS requirement honored".to_string());
    }
    if guardrail != GuardrailTag::None {
        reasons.push(format!("guardrail={}", guardrail.as_str()));
    }
    format!("chosen for {}", reasons.join(", "))
}

/// Ordered feature tags that materially influenced the score, drawn from a
/// fixed vocabulary: `sca_required=...`, `auth_rate=...`, `fee_bps=...`.
fn render_features_used(txn: &Transaction, winner: &ScoredCandidate) -> Vec<String> {
    vec![
        format!("sca_required={}", txn.sca_required),
        format!("auth_rate={:.2}", winner.candidate.auth_rate_recent),
        format!("fee_bps={:.0}", winner.candidate.mean_fee_bps),
        format!("p_auth={:.2}", winner.p_auth),
    ]
}
