//! Always-unavailable Predictor, used where no model is configured at all
//! (cold start, or a deployment that intentionally runs on the deterministic
//! fallback path only). "No predictor configured" and "predictor failed"
//! are treated identically: both yield `PredictorUnavailable` and fall
//! through to the Scorer's deterministic fallback.

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::types::{Candidate, Prediction, Transaction};

use super::{Predictor, PredictorState};

#[derive(Debug, Default)]
pub struct NullPredictor;

#[async_trait]
impl Predictor for NullPredictor {
    async fn predict(
        &self,
        _txn: &Transaction,
        _candidate: &Candidate,
    ) -> Result<Prediction, EngineError> {
        Err(EngineError::PredictorUnavailable(
            "no predictor configured".to_string(),
        ))
    }

    fn state(&self) -> PredictorState {
        PredictorState::NotLoaded
    }

    fn model_version(&self) -> String {
        "none".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_reports_unavailable() {
        let predictor = NullPredictor;
        let result = predictor
            .predict(
                &crate::types::Transaction {
                    merchant_id: "m1".to_string(),
                    buyer_country: "US".to_string(),
                    merchant_country: "US".to_string(),
                    currency_id: 840,
                    payment_method_id: 1,
                    amount: 10.0,
                    card_bin: None,
                    tokenized: false,
                    sca_required: false,
                    risk_score: 5,
                },
                &Candidate::new("alpha"),
            )
            .await;
        assert!(matches!(result, Err(EngineError::PredictorUnavailable(_))));
        assert!(!predictor.is_ready());
    }
}
