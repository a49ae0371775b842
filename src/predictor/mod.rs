//! Predictor — given a transaction and a candidate, returns predicted
//! authorization probability, predicted processing time, and a health
//! classification, or signals unavailability.
//!
//! Whether the Predictor behind this trait is a remote large-model call, a
//! bundle of local gradient-boosted trees, or a multi-armed bandit is an
//! implementation choice; the Router only ever sees the
//! `Predictor` trait and must treat every implementation as fallible and
//! bounded-latency.

pub mod bandit;
pub mod features;
pub mod local_ensemble;
pub mod null_predictor;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::types::{Candidate, Prediction, Transaction};

pub use bandit::BanditPredictor;
pub use local_ensemble::LocalEnsemblePredictor;
pub use null_predictor::NullPredictor;
pub use remote::RemoteModelPredictor;

/// Readiness state machine: `NotLoaded -> Loading -> Ready ->
/// Reloading -> Ready | Failed`. Only `Ready` and `Reloading` (serving the
/// previous snapshot) answer `predict`; `Failed` and `NotLoaded` answer
/// `PredictorUnavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorState {
    NotLoaded,
    Loading,
    Ready,
    Reloading,
    Failed,
}

impl PredictorState {
    pub fn can_serve(&self) -> bool {
        matches!(self, PredictorState::Ready | PredictorState::Reloading)
    }

    /// `ModelStatus()` surface, collapsed to the three externally-visible
    /// states.
    pub fn as_model_status(&self) -> &'static str {
        match self {
            PredictorState::Ready | PredictorState::Reloading => "ready",
            PredictorState::NotLoaded | PredictorState::Loading => "not_loaded",
            PredictorState::Failed => "failed",
        }
    }
}

#[async_trait]
pub trait Predictor: Send + Sync {
    /// Fails with `EngineError::PredictorUnavailable` on timeout, on any
    /// model-head failure, or when not `Ready`/`Reloading`. Never returns a
    /// partial result: if any head fails, the whole call fails.
    async fn predict(
        &self,
        txn: &Transaction,
        candidate: &Candidate,
    ) -> Result<Prediction, EngineError>;

    /// Non-blocking liveness probe.
    fn is_ready(&self) -> bool {
        self.state().can_serve()
    }

    fn state(&self) -> PredictorState;

    fn model_version(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_can_serve_follows_readiness_state_machine() {
        assert!(!PredictorState::NotLoaded.can_serve());
        assert!(!PredictorState::Loading.can_serve());
        assert!(PredictorState::Ready.can_serve());
        assert!(PredictorState::Reloading.can_serve());
        assert!(!PredictorState::Failed.can_serve());
    }

    #[test]
    fn model_status_collapses_to_three_values() {
        assert_eq!(PredictorState::Ready.as_model_status(), "ready");
        assert_eq!(PredictorState::Reloading.as_model_status(), "ready");
        assert_eq!(PredictorState::NotLoaded.as_model_status(), "not_loaded");
        assert_eq!(PredictorState::Loading.as_model_status(), "not_loaded");
        assert_eq!(PredictorState::Failed.as_model_status(), "failed");
    }
}
