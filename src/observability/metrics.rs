//! Engine-wide metrics. Registers `metrics` crate counters/gauges so any
//! `metrics-exporter-prometheus` recorder installed by the hosting process
//! picks them up automatically. The engine never binds a listening socket —
//! exporting the `/metrics` endpoint is the HTTP surface's job.

use metrics::{counter, gauge, histogram};

use crate::types::GuardrailTag;

/// Thin facade over the `metrics` crate macros, named after the engine's
/// operations and failure kinds so call sites read naturally.
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineMetrics;

impl EngineMetrics {
    pub fn record_decision(&self, guardrail: GuardrailTag, used_fallback: bool, elapsed_ms: f64) {
        counter!("psp_router_decisions_total", "guardrail" => guardrail.as_str()).increment(1);
        if used_fallback {
            counter!("psp_router_fallback_total").increment(1);
        }
        histogram!("psp_router_decide_duration_ms").record(elapsed_ms);
    }

    pub fn record_no_eligible_candidate(&self) {
        counter!("psp_router_no_eligible_candidate_total").increment(1);
    }

    pub fn record_candidate_unavailable(&self) {
        counter!("psp_router_candidate_unavailable_total").increment(1);
    }

    pub fn record_predictor_call(&self, succeeded: bool, elapsed_ms: f64) {
        let outcome = if succeeded { "ok" } else { "unavailable" };
        counter!("psp_router_predictor_calls_total", "outcome" => outcome).increment(1);
        histogram!("psp_router_predict_duration_ms").record(elapsed_ms);
    }

    pub fn record_feedback_applied(&self, duplicate: bool) {
        let outcome = if duplicate { "duplicate" } else { "applied" };
        counter!("psp_router_feedback_total", "outcome" => outcome).increment(1);
    }

    pub fn record_feedback_dropped_overflow(&self) {
        counter!("psp_router_feedback_dropped_total").increment(1);
    }

    pub fn record_retrain(&self) {
        counter!("psp_router_retrain_total").increment(1);
    }

    pub fn set_candidate_health_gauge(&self, psp_name: &str, health_value: f64) {
        gauge!("psp_router_candidate_health", "psp" => psp_name.to_string()).set(health_value);
    }
}
