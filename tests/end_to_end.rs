//! End-to-end scenarios exercising `Router::decide` against a real
//! `CandidateStore` and a controllable `Predictor`, covering the concrete
//! scenarios and invariants this engine is required to satisfy.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use psp_router::candidate::historical::{sample_row, InMemoryHistoricalStore};
use psp_router::candidate::CandidateStore;
use psp_router::config::{CandidateStorePolicy, DecisionDefaults, HealthThresholds, RetrainPolicy, Timeouts};
use psp_router::errors::EngineError;
use psp_router::predictor::{null_predictor::NullPredictor, Predictor, PredictorState};
use psp_router::types::{Feedback, PredictedHealth, Prediction, Transaction, Weights};
use psp_router::{Router, Scorer};

/// Returns a pre-configured `Prediction` per psp name, and fails for any
/// psp not in the map — used so each scenario can pin exact `auth_probability`
/// values without depending on feedback-driven rolling rates.
struct FixedPredictor {
    predictions: HashMap<String, f64>,
}

impl FixedPredictor {
    fn new(predictions: &[(&str, f64)]) -> Self {
        Self {
            predictions: predictions.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }
}

#[async_trait]
impl Predictor for FixedPredictor {
    async fn predict(
        &self,
        _txn: &Transaction,
        candidate: &psp_router::Candidate,
    ) -> Result<Prediction, EngineError> {
        match self.predictions.get(&candidate.psp_name) {
            Some(p) => Ok(Prediction {
                auth_probability: *p,
                processing_time_ms: 80.0,
                health: if *p >= 0.80 {
                    PredictedHealth::Green
                } else {
                    PredictedHealth::Yellow
                },
                model_version: "fixed-test".to_string(),
                timestamp: Utc::now(),
            }),
            None => Err(EngineError::PredictorUnavailable("no fixture".to_string())),
        }
    }

    fn state(&self) -> PredictorState {
        PredictorState::Ready
    }

    fn model_version(&self) -> String {
        "fixed-test".to_string()
    }
}

fn card_transaction(sca_required: bool, amount: f64, risk_score: u8) -> Transaction {
    Transaction {
        merchant_id: "merchant-1".to_string(),
        buyer_country: "US".to_string(),
        merchant_country: "US".to_string(),
        currency_id: 840,
        payment_method_id: 1,
        amount,
        card_bin: None,
        tokenized: false,
        sca_required,
        risk_score,
    }
}

/// Seeds `rows` historical rows for `psp_name`, `successes` of which
/// carry a success status code, all tagged with `three_ds`.
fn seed_segment_rows(
    store: &InMemoryHistoricalStore,
    psp_name: &str,
    rows: u32,
    successes: u32,
    three_ds: bool,
) {
    for i in 0..rows {
        let status = if i < successes { 5 } else { 2 };
        store.push_row(sample_row(psp_name, status, 840, 1, three_ds));
    }
}

/// Applies `count` feedback events to `store` for `psp_name`, `successes`
/// of which are authorized, so `auth_rate_recent` lands at `successes/count`.
fn seed_feedback(store: &CandidateStore, psp_name: &str, count: u32, successes: u32) {
    for i in 0..count {
        store.apply_feedback(Feedback {
            decision_id: format!("{psp_name}-seed-{i}"),
            psp_name: psp_name.to_string(),
            authorized: i < successes,
            amount: 100.0,
            fee_amount: 2.0,
            processing_time_ms: 90.0,
            risk_score: 10,
            processed_at: Utc::now(),
            error_code: None,
            error_message: None,
        });
    }
}

fn default_store(historical: Arc<InMemoryHistoricalStore>) -> Arc<CandidateStore> {
    Arc::new(CandidateStore::new(
        CandidateStorePolicy::default(),
        &HealthThresholds::default(),
        &RetrainPolicy::default(),
        historical,
    ))
}

fn router_with(
    candidate_store: Arc<CandidateStore>,
    predictor: Arc<dyn Predictor>,
) -> Router {
    Router::new(
        candidate_store,
        predictor,
        Arc::new(Scorer::new(Weights::default())),
        Timeouts::default(),
        DecisionDefaults::default(),
    )
}

#[tokio::test]
async fn scenario_1_higher_auth_rate_wins_over_small_fee_delta() {
    let historical = Arc::new(InMemoryHistoricalStore::new());
    seed_segment_rows(&historical, "psp-a", 100, 95, true);
    seed_segment_rows(&historical, "psp-b", 100, 95, true);
    let store = default_store(historical);
    seed_feedback(&store, "psp-a", 100, 89);
    seed_feedback(&store, "psp-b", 100, 87);

    let predictor: Arc<dyn Predictor> =
        Arc::new(FixedPredictor::new(&[("psp-a", 0.89), ("psp-b", 0.87)]));
    let router = router_with(store, predictor);

    let txn = card_transaction(false, 150.0, 15);
    let decision = router.decide(&txn).await.unwrap();

    assert_eq!(decision.candidate, "psp-a");
    assert_eq!(decision.guardrail.as_str(), "none");
    assert!(!decision.constraints.must_use_3ds);
    assert_eq!(decision.alternates, vec!["psp-b".to_string()]);
}

#[tokio::test]
async fn scenario_2_sca_card_drops_non_3ds_candidate() {
    let historical = Arc::new(InMemoryHistoricalStore::new());
    seed_segment_rows(&historical, "psp-a", 50, 45, true);
    seed_segment_rows(&historical, "psp-b", 50, 46, false);
    let store = default_store(historical);
    seed_feedback(&store, "psp-a", 50, 44);
    seed_feedback(&store, "psp-b", 50, 46);

    let predictor: Arc<dyn Predictor> =
        Arc::new(FixedPredictor::new(&[("psp-a", 0.87), ("psp-b", 0.92)]));
    let router = router_with(store, predictor);

    let txn = card_transaction(true, 500.0, 20);
    let decision = router.decide(&txn).await.unwrap();

    assert_eq!(decision.candidate, "psp-a");
    assert_eq!(decision.guardrail.as_str(), "compliance");
    assert!(decision.constraints.must_use_3ds);
    assert!(!decision.alternates.contains(&"psp-b".to_string()));
}

#[tokio::test]
async fn scenario_3_predictor_down_uses_deterministic_fallback() {
    let historical = Arc::new(InMemoryHistoricalStore::new());
    seed_segment_rows(&historical, "psp-a", 30, 28, true);
    seed_segment_rows(&historical, "psp-b", 30, 28, true);
    let store = default_store(historical);
    seed_feedback(&store, "psp-a", 100, 85);
    seed_feedback(&store, "psp-b", 100, 80);

    let predictor: Arc<dyn Predictor> = Arc::new(NullPredictor);
    let router = router_with(store, predictor);

    let txn = card_transaction(false, 100.0, 10);
    let decision = router.decide(&txn).await.unwrap();

    assert_eq!(decision.candidate, "psp-a");
    assert!(decision.reasoning.contains("deterministic fallback"));
}

#[tokio::test]
async fn scenario_4_all_red_candidates_fail_with_no_eligible_candidate() {
    let historical = Arc::new(InMemoryHistoricalStore::new());
    seed_segment_rows(&historical, "psp-a", 30, 5, true);
    let store = default_store(historical);
    seed_feedback(&store, "psp-a", 100, 10);

    let predictor: Arc<dyn Predictor> = Arc::new(NullPredictor);
    let router = router_with(store, predictor);

    let txn = card_transaction(false, 100.0, 10);
    let result = router.decide(&txn).await;

    assert!(matches!(result, Err(EngineError::NoEligibleCandidate)));
}

#[tokio::test]
async fn scenario_5_duplicate_feedback_decision_id_is_a_no_op() {
    let historical = Arc::new(InMemoryHistoricalStore::new());
    let store = default_store(historical);

    let feedback = Feedback {
        decision_id: "dup-1".to_string(),
        psp_name: "psp-a".to_string(),
        authorized: true,
        amount: 100.0,
        fee_amount: 2.0,
        processing_time_ms: 90.0,
        risk_score: 10,
        processed_at: Utc::now(),
        error_code: None,
        error_message: None,
    };
    let mut opposite = feedback.clone();
    opposite.authorized = false;

    assert!(store.apply_feedback(feedback));
    assert!(!store.apply_feedback(opposite));

    let candidates = store.get_all_candidates();
    let psp_a = candidates.iter().find(|c| c.psp_name == "psp-a").unwrap();
    assert_eq!(psp_a.total_count, 1);
    assert_eq!(psp_a.total_successes, 1);
}

#[tokio::test]
async fn scenario_6_concurrent_decide_and_feedback_preserve_invariants() {
    let historical = Arc::new(InMemoryHistoricalStore::new());
    seed_segment_rows(&historical, "psp-a", 50, 45, true);
    seed_segment_rows(&historical, "psp-b", 50, 40, true);
    let store = default_store(historical);
    seed_feedback(&store, "psp-a", 50, 45);
    seed_feedback(&store, "psp-b", 50, 40);

    let predictor: Arc<dyn Predictor> =
        Arc::new(FixedPredictor::new(&[("psp-a", 0.9), ("psp-b", 0.8)]));
    let router = Arc::new(router_with(Arc::clone(&store), predictor));

    let mut decide_tasks = tokio::task::JoinSet::new();
    for i in 0..200u32 {
        let router = Arc::clone(&router);
        decide_tasks.spawn(async move {
            let txn = card_transaction(false, 75.0 + i as f64, (i % 50) as u8);
            router.decide(&txn).await
        });
    }

    let mut feedback_tasks = tokio::task::JoinSet::new();
    for i in 0..100u32 {
        let store = Arc::clone(&store);
        feedback_tasks.spawn(async move {
            store.apply_feedback(Feedback {
                decision_id: format!("concurrent-{i}"),
                psp_name: if i % 2 == 0 { "psp-a".to_string() } else { "psp-b".to_string() },
                authorized: i % 3 != 0,
                amount: 100.0,
                fee_amount: 2.0,
                processing_time_ms: 100.0,
                risk_score: 5,
                processed_at: Utc::now(),
                error_code: None,
                error_message: None,
            })
        });
    }

    let mut decided = 0;
    while let Some(result) = decide_tasks.join_next().await {
        if result.unwrap().is_ok() {
            decided += 1;
        }
    }
    while feedback_tasks.join_next().await.is_some() {}

    assert!(decided > 0);
    for candidate in store.get_all_candidates() {
        assert!(candidate.upholds_rate_invariant());
    }
}

#[tokio::test]
async fn alternates_are_disjoint_from_the_winner_and_preserve_score_order() {
    let historical = Arc::new(InMemoryHistoricalStore::new());
    for psp in ["psp-a", "psp-b", "psp-c", "psp-d"] {
        seed_segment_rows(&historical, psp, 20, 18, true);
    }
    let store = default_store(historical);
    seed_feedback(&store, "psp-a", 100, 70);
    seed_feedback(&store, "psp-b", 100, 92);
    seed_feedback(&store, "psp-c", 100, 85);
    seed_feedback(&store, "psp-d", 100, 80);

    let predictor: Arc<dyn Predictor> = Arc::new(FixedPredictor::new(&[
        ("psp-a", 0.70),
        ("psp-b", 0.92),
        ("psp-c", 0.85),
        ("psp-d", 0.80),
    ]));
    let router = router_with(store, predictor);

    let txn = card_transaction(false, 100.0, 5);
    let decision = router.decide(&txn).await.unwrap();

    assert_eq!(decision.candidate, "psp-b");
    assert!(!decision.alternates.contains(&decision.candidate));
    assert_eq!(decision.alternates, vec!["psp-c".to_string(), "psp-a".to_string()]);
}

#[tokio::test]
async fn minimum_volume_threshold_is_inclusive_at_the_boundary() {
    let historical = Arc::new(InMemoryHistoricalStore::new());
    seed_segment_rows(&historical, "at-threshold", 10, 9, true);
    seed_segment_rows(&historical, "below-threshold", 9, 8, true);
    let store = default_store(historical);
    seed_feedback(&store, "at-threshold", 20, 18);
    seed_feedback(&store, "below-threshold", 20, 18);

    let predictor: Arc<dyn Predictor> = Arc::new(NullPredictor);
    let router = router_with(store, predictor);

    let txn = card_transaction(false, 100.0, 10);
    let decision = router.decide(&txn).await.unwrap();

    assert_eq!(decision.candidate, "at-threshold");
    assert!(!decision.alternates.contains(&"below-threshold".to_string()));
}

#[tokio::test]
async fn candidate_store_failure_is_surfaced_as_candidate_unavailable() {
    let historical = Arc::new(InMemoryHistoricalStore::new());
    historical.set_failure(Some("warehouse down".to_string()));
    let store = default_store(historical);

    let predictor: Arc<dyn Predictor> = Arc::new(NullPredictor);
    let router = router_with(store, predictor);

    let txn = card_transaction(false, 100.0, 10);
    let result = router.decide(&txn).await;

    assert!(matches!(result, Err(EngineError::CandidateUnavailable { .. })));
}

#[tokio::test]
async fn decide_latency_is_recorded_per_call() {
    let historical = Arc::new(InMemoryHistoricalStore::new());
    seed_segment_rows(&historical, "psp-a", 30, 27, true);
    let store = default_store(historical);
    seed_feedback(&store, "psp-a", 30, 27);

    let predictor: Arc<dyn Predictor> = Arc::new(FixedPredictor::new(&[("psp-a", 0.9)]));
    let router = router_with(store, predictor);

    assert_eq!(router.decide_latency_summary().count, 0);
    assert_eq!(router.predict_latency_summary().count, 0);

    let txn = card_transaction(false, 100.0, 10);
    router.decide(&txn).await.unwrap();
    router.decide(&txn).await.unwrap();

    assert_eq!(router.decide_latency_summary().count, 2);
    assert_eq!(router.predict_latency_summary().count, 2);
}

#[tokio::test]
async fn decide_is_deterministic_given_fixed_predictor_and_state() {
    let historical = Arc::new(InMemoryHistoricalStore::new());
    seed_segment_rows(&historical, "psp-a", 30, 27, true);
    let store = default_store(historical);
    seed_feedback(&store, "psp-a", 30, 27);

    let predictor: Arc<dyn Predictor> = Arc::new(FixedPredictor::new(&[("psp-a", 0.9)]));
    let router = router_with(store, predictor);

    let txn = card_transaction(false, 100.0, 10);
    let first = router.decide(&txn).await.unwrap();
    let second = router.decide(&txn).await.unwrap();

    assert_eq!(first.candidate, second.candidate);
    assert_eq!(first.reasoning, second.reasoning);
    assert_eq!(first.guardrail.as_str(), second.guardrail.as_str());
    assert_eq!(first.features_used, second.features_used);
}
