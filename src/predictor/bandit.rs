//! Epsilon-greedy multi-armed bandit Predictor: an alternative Predictor
//! implementation that returns `p_auth` derived from per-arm Beta
//! posteriors, plus an exploration probability honored by the Scorer;
//! still subject to the same timeout and fallback rules as any other
//! Predictor backend. Exploration draws use `rand_chacha` rather than the
//! default small-state PRNG, since exploration needs an unbiased source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::errors::EngineError;
use crate::types::{Candidate, PredictedHealth, Prediction, Transaction};

use super::{Predictor, PredictorState};

/// Beta-distribution posterior for one arm (one PSP), updated as
/// `alpha += 1` on an authorized outcome and `beta += 1` otherwise. Starts
/// at the uninformative `Beta(1, 1)` prior.
#[derive(Debug, Clone, Copy)]
struct ArmPosterior {
    alpha: f64,
    beta: f64,
}

impl ArmPosterior {
    fn new() -> Self {
        Self { alpha: 1.0, beta: 1.0 }
    }

    fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    fn observe(&mut self, authorized: bool) {
        if authorized {
            self.alpha += 1.0;
        } else {
            self.beta += 1.0;
        }
    }
}

const STATE_READY: u8 = 2;
const STATE_FAILED: u8 = 4;

/// Epsilon-greedy bandit: with probability `epsilon` returns an exploratory
/// draw around the arm's posterior mean instead of the mean itself, so the
/// Scorer occasionally ranks an under-sampled PSP highly enough to gather
/// more data on it.
pub struct BanditPredictor {
    epsilon: f64,
    arms: Mutex<HashMap<String, ArmPosterior>>,
    rng: Mutex<ChaCha20Rng>,
    state: AtomicU8,
}

impl BanditPredictor {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            arms: Mutex::new(HashMap::new()),
            rng: Mutex::new(ChaCha20Rng::from_entropy()),
            state: AtomicU8::new(STATE_READY),
        }
    }

    #[cfg(test)]
    fn with_seed(epsilon: f64, seed: u64) -> Self {
        Self {
            epsilon,
            arms: Mutex::new(HashMap::new()),
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
            state: AtomicU8::new(STATE_READY),
        }
    }

    /// Folds one realized outcome into the named arm's posterior. Called
    /// from the same feedback path that drives `CandidateStore::apply_feedback`
    /// so the bandit's beliefs track reality at the same cadence.
    pub fn observe(&self, psp_name: &str, authorized: bool) {
        let mut arms = self.arms.lock();
        arms.entry(psp_name.to_string())
            .or_insert_with(ArmPosterior::new)
            .observe(authorized);
    }

    fn load_state(&self) -> PredictorState {
        match self.state.load(Ordering::SeqCst) {
            STATE_READY => PredictorState::Ready,
            _ => PredictorState::Failed,
        }
    }
}

#[async_trait]
impl Predictor for BanditPredictor {
    async fn predict(
        &self,
        _txn: &Transaction,
        candidate: &Candidate,
    ) -> Result<Prediction, EngineError> {
        let state = self.load_state();
        if !state.can_serve() {
            return Err(EngineError::PredictorUnavailable(
                "bandit predictor failed".to_string(),
            ));
        }

        let posterior = {
            let mut arms = self.arms.lock();
            *arms
                .entry(candidate.psp_name.clone())
                .or_insert_with(ArmPosterior::new)
        };

        let explore = {
            let mut rng = self.rng.lock();
            rng.gen_bool(self.epsilon)
        };

        let auth_probability = if explore {
            let mut rng = self.rng.lock();
            rng.gen_range(0.0..1.0)
        } else {
            posterior.mean()
        };

        let health = if auth_probability >= 0.80 {
            PredictedHealth::Green
        } else if auth_probability >= 0.60 {
            PredictedHealth::Yellow
        } else {
            PredictedHealth::Red
        };

        Ok(Prediction {
            auth_probability,
            processing_time_ms: candidate.avg_processing_time_ms,
            health,
            model_version: "bandit-epsilon-greedy".to_string(),
            timestamp: Utc::now(),
        })
    }

    fn state(&self) -> PredictorState {
        self.load_state()
    }

    fn model_version(&self) -> String {
        "bandit-epsilon-greedy".to_string()
    }
}
