//! Remote-model Predictor: a call out to a hosted model service. The other
//! valid Predictor implementation alongside the in-process ensemble; the
//! Router must not be able to tell the two apart behind the trait.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::warn;

use crate::errors::EngineError;
use crate::types::{Candidate, PredictedHealth, Prediction, Transaction};

use super::features::{self, FeatureVector};
use super::{Predictor, PredictorState};

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    psp_name: &'a str,
    features: &'a FeatureVector,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    auth_probability: f64,
    processing_time_ms: f64,
    health: RemoteHealth,
    model_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RemoteHealth {
    Green,
    Yellow,
    Red,
}

impl From<RemoteHealth> for PredictedHealth {
    fn from(value: RemoteHealth) -> Self {
        match value {
            RemoteHealth::Green => PredictedHealth::Green,
            RemoteHealth::Yellow => PredictedHealth::Yellow,
            RemoteHealth::Red => PredictedHealth::Red,
        }
    }
}

const STATE_NOT_LOADED: u8 = 0;
const STATE_READY: u8 = 2;
const STATE_FAILED: u8 = 4;

/// Calls a hosted model endpoint over HTTP. The request/response timeout is
/// the Router's responsibility (`tokio::time::timeout` wraps every
/// `predict` call); this client carries only a connect timeout so a
/// half-open TCP handshake can't itself outlive the routing deadline.
pub struct RemoteModelPredictor {
    client: Client,
    endpoint: String,
    state: AtomicU8,
}

impl RemoteModelPredictor {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(250))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
            state: AtomicU8::new(STATE_READY),
        }
    }

    pub fn mark_failed(&self) {
        self.state.store(STATE_FAILED, Ordering::SeqCst);
    }

    fn load_state(&self) -> PredictorState {
        match self.state.load(Ordering::SeqCst) {
            STATE_NOT_LOADED => PredictorState::NotLoaded,
            STATE_READY => PredictorState::Ready,
            _ => PredictorState::Failed,
        }
    }
}

#[async_trait]
impl Predictor for RemoteModelPredictor {
    async fn predict(
        &self,
        txn: &Transaction,
        candidate: &Candidate,
    ) -> Result<Prediction, EngineError> {
        let state = self.load_state();
        if !state.can_serve() {
            return Err(EngineError::PredictorUnavailable(format!(
                "remote model in state {:?}",
                state
            )));
        }

        let features = features::build(txn, candidate, Utc::now());
        let request = PredictRequest {
            psp_name: &candidate.psp_name,
            features: &features,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "remote model call failed");
                EngineError::PredictorUnavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(EngineError::PredictorUnavailable(format!(
                "remote model returned status {}",
                response.status()
            )));
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| EngineError::PredictorUnavailable(e.to_string()))?;

        Ok(Prediction {
            auth_probability: body.auth_probability.clamp(0.0, 1.0),
            processing_time_ms: body.processing_time_ms.max(0.0),
            health: body.health.into(),
            model_version: body.model_version,
            timestamp: Utc::now(),
        })
    }

    fn state(&self) -> PredictorState {
        self.load_state()
    }

    fn model_version(&self) -> String {
        "remote".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Health;

    fn sample_txn() -> Transaction {
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

    #[tokio::test]
    async fn failed_state_is_unavailable_without_a_network_call() {
        let predictor = RemoteModelPredictor::new("http://127.0.0.1:9/predict");
        predictor.mark_failed();
        let mut candidate = Candidate::new("alpha");
        candidate.health = Health::Green;
        let result = predictor.predict(&sample_txn(), &candidate).await;
        assert!(matches!(result, Err(EngineError::PredictorUnavailable(_))));
    }
}
