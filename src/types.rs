//! Core data model shared across every component: `Transaction`, `Candidate`,
//! `Feedback`, `Decision`, `Prediction`, and `Weights`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Health band projected from a Candidate's recent authorization rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Green,
    Yellow,
    Red,
}

impl Health {
    /// Deterministic projection: `>= green_cutoff` => Green,
    /// `>= yellow_cutoff` => Yellow, else Red. Cutoffs are inclusive on their
    /// lower bound, so a rate exactly at a cutoff maps to the higher band.
    pub fn from_auth_rate(auth_rate: f64, green_cutoff: f64, yellow_cutoff: f64) -> Self {
        if auth_rate >= green_cutoff {
            Health::Green
        } else if auth_rate >= yellow_cutoff {
            Health::Yellow
        } else {
            Health::Red
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Health::Green => "green",
            Health::Yellow => "yellow",
            Health::Red => "red",
        }
    }

    /// Numeric projection for the `psp_router_candidate_health` gauge:
    /// `2.0` green, `1.0` yellow, `0.0` red.
    pub fn as_gauge_value(&self) -> f64 {
        match self {
            Health::Green => 2.0,
            Health::Yellow => 1.0,
            Health::Red => 0.0,
        }
    }
}

/// A payment transaction as handed to the Router. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub merchant_id: String,
    pub buyer_country: String,
    pub merchant_country: String,
    pub currency_id: u32,
    pub payment_method_id: u32,
    pub amount: f64,
    pub card_bin: Option<String>,
    pub tokenized: bool,
    pub sca_required: bool,
    pub risk_score: u8,
}

impl Transaction {
    /// Boundary validation: amount > 0, currency id > 0,
    /// payment-method id > 0, risk score in [0, 100].
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.amount > 0.0) {
            return Err(EngineError::InvalidArgument(
                "amount must be > 0".to_string(),
            ));
        }
        if self.currency_id == 0 {
            return Err(EngineError::InvalidArgument(
                "currency_id must be > 0".to_string(),
            ));
        }
        if self.payment_method_id == 0 {
            return Err(EngineError::InvalidArgument(
                "payment_method_id must be > 0".to_string(),
            ));
        }
        // risk_score is a u8 so it is trivially <= 255; the lower bound
        // still needs an explicit check.
        if self.risk_score > 100 {
            return Err(EngineError::InvalidArgument(
                "risk_score must be in [0, 100]".to_string(),
            ));
        }
        Ok(())
    }

    /// Card-network payment methods are the ones SCA/3DS applies to. The
    /// payment-method id space is owned by an external collaborator (the
    /// product catalog); this engine treats ids below `CARD_PAYMENT_METHOD_CEILING`
    /// as card-rail methods, matching the convention already used by the
    /// historical-outcome fixtures in this crate's tests.
    pub fn is_card_payment(&self) -> bool {
        self.payment_method_id < CARD_PAYMENT_METHOD_CEILING
    }
}

/// Payment-method ids below this value are card-rail methods (credit, debit,
/// card-on-file). Ids at or above it are non-card rails (bank transfer,
/// wallets, …) to which SCA/3DS guardrails do not apply.
pub const CARD_PAYMENT_METHOD_CEILING: u32 = 100;

/// Rolling performance snapshot for one PSP, scoped to a segment
/// (currency id, payment-method id) when produced by `CandidateStore::get_candidates`,
/// or global when produced by `CandidateStore::get_all_candidates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub psp_name: String,
    pub supported: bool,
    pub health: Health,
    pub auth_rate_window: f64,
    pub auth_rate_recent: f64,
    pub mean_fee_bps: f64,
    pub fixed_fee: f64,
    pub supports_3ds: bool,
    pub supports_tokenization: bool,
    pub avg_processing_time_ms: f64,
    pub total_count: u64,
    pub total_successes: u64,
    pub last_updated: DateTime<Utc>,
}

impl Candidate {
    pub fn new(psp_name: impl Into<String>) -> Self {
        Self {
            psp_name: psp_name.into(),
            supported: true,
            health: Health::Red,
            auth_rate_window: 0.0,
            auth_rate_recent: 0.0,
            mean_fee_bps: 0.0,
            fixed_fee: 0.0,
            supports_3ds: false,
            supports_tokenization: false,
            avg_processing_time_ms: 0.0,
            total_count: 0,
            total_successes: 0,
            last_updated: Utc::now(),
        }
    }

    /// Total fee in absolute currency units for a given transaction amount.
    pub fn total_fee(&self, amount: f64) -> f64 {
        amount * (self.mean_fee_bps / 10_000.0) + self.fixed_fee
    }

    /// Rolling-rate invariant check, used by property tests.
    pub fn upholds_rate_invariant(&self) -> bool {
        if self.total_count == 0 {
            return true;
        }
        self.total_successes <= self.total_count
            && (0.0..=1.0).contains(&self.auth_rate_window)
            && (0.0..=1.0).contains(&self.auth_rate_recent)
    }
}

/// A post-transaction outcome delivered to `CandidateStore::apply_feedback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub decision_id: String,
    pub psp_name: String,
    pub authorized: bool,
    pub amount: f64,
    pub fee_amount: f64,
    pub processing_time_ms: f64,
    pub risk_score: u8,
    pub processed_at: DateTime<Utc>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Guardrail outcome tag attached to every Decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailTag {
    None,
    Capability,
    Health,
    Compliance,
}

impl GuardrailTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailTag::None => "none",
            GuardrailTag::Capability => "capability",
            GuardrailTag::Health => "health",
            GuardrailTag::Compliance => "compliance",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraints {
    pub must_use_3ds: bool,
    pub retry_window_ms: u64,
    pub max_retries: u32,
}

/// The Decision JSON shape, field names fixed for downstream compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub schema_version: String,
    pub decision_id: String,
    pub candidate: String,
    pub alternates: Vec<String>,
    pub reasoning: String,
    pub guardrail: GuardrailTag,
    pub constraints: Constraints,
    pub features_used: Vec<String>,
}

pub const DECISION_SCHEMA_VERSION: &str = "1.0";

/// Predicted health classification returned by the Predictor's third head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictedHealth {
    Green,
    Yellow,
    Red,
}

/// Output of `Predictor::predict` for one (transaction, candidate) pair.
/// Never stored; consumed once by the Scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub auth_probability: f64,
    pub processing_time_ms: f64,
    pub health: PredictedHealth,
    pub model_version: String,
    pub timestamp: DateTime<Utc>,
}

/// Product-tunable utility weights. Hot-reloadable via `Scorer::swap_weights`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Weights {
    pub auth_weight: f64,
    pub fee_bps_weight: f64,
    pub fixed_fee_weight: f64,
    pub three_ds_bonus_when_sca: f64,
    pub risk_penalty_per_point: f64,
    pub yellow_health_penalty: f64,
    pub business_bias_weight: f64,
    /// Per-psp bias value, defaulted to zero for any psp absent from the map.
    pub business_bias: HashMap<String, f64>,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            auth_weight: 10.0,
            fee_bps_weight: 1.0,
            fixed_fee_weight: 1.0,
            three_ds_bonus_when_sca: 0.5,
            risk_penalty_per_point: 0.01,
            yellow_health_penalty: 0.3,
            business_bias_weight: 1.0,
            business_bias: HashMap::new(),
        }
    }
}

impl Weights {
    pub fn bias_for(&self, psp_name: &str) -> f64 {
        self.business_bias.get(psp_name).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_boundary_exact_cutoff_maps_to_higher_band() {
        assert_eq!(Health::from_auth_rate(0.80, 0.80, 0.60), Health::Green);
        assert_eq!(Health::from_auth_rate(0.60, 0.80, 0.60), Health::Yellow);
        assert_eq!(Health::from_auth_rate(0.59, 0.80, 0.60), Health::Red);
    }

    #[test]
    fn transaction_validation_rejects_non_positive_amount() {
        let mut txn = sample_transaction();
        txn.amount = 0.0;
        assert!(txn.validate().is_err());
    }

    #[test]
    fn transaction_validation_rejects_out_of_range_risk() {
        let mut txn = sample_transaction();
        txn.risk_score = 255;
        assert!(txn.validate().is_err());
    }

    fn sample_transaction() -> Transaction {
        Transaction {
            merchant_id: "m1".to_string(),
            buyer_country: "US".to_string(),
            merchant_country: "US".to_string(),
            currency_id: 840,
            payment_method_id: 1,
            amount: 100.0,
            card_bin: None,
            tokenized: false,
            sca_required: false,
            risk_score: 10,
        }
    }
}
