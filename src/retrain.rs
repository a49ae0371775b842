//! Retraining trigger and the narrow boundary to the (out-of-scope)
//! predictive model training pipeline. `ShouldRetrain` and `Retrain` are
//! exposed so an external scheduler may invoke them — this engine never
//! schedules retraining itself.

use async_trait::async_trait;

use crate::errors::EngineError;

/// The training pipeline is an external collaborator. This trait is the
/// entire surface the Candidate Store needs from it: "go retrain, using
/// whatever accumulated feedback and historical data you have."
#[async_trait]
pub trait Retrainer: Send + Sync {
    async fn retrain(&self) -> Result<(), EngineError>;
}

/// Retrainer used by tests and the demo binary: it always succeeds and does
/// nothing, so `CandidateStore::retrain` only exercises the trigger
/// bookkeeping (timestamp reset, feedback counter reset).
#[derive(Debug, Default)]
pub struct NoopRetrainer;

#[async_trait]
impl Retrainer for NoopRetrainer {
    async fn retrain(&self) -> Result<(), EngineError> {
        Ok(())
    }
}
