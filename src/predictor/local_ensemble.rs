//! In-process ensemble Predictor: a small ensemble of gradient-boosted
//! trees or a logistic blend, run entirely in-process. One valid Predictor
//! implementation among several.
//!
//! The model snapshot is served from an `ArcSwap` so a background reload can
//! publish a new snapshot without blocking in-flight `predict` calls —
//! the same lock-free read / Arc-swap-on-write pattern the book-ticker feed
//! uses for its `latest` snapshot.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::Utc;
use statrs::statistics::Statistics;
use tracing::{error, info};

use crate::errors::EngineError;
use crate::types::{Candidate, PredictedHealth, Prediction, Transaction};

use super::features::{self, FeatureVector};
use super::{Predictor, PredictorState};

/// A single linear model head: `sigmoid(bias + sum(weight_i * feature_i))`.
/// Stand-in for a trained gradient-boosted ensemble; the shape (a feature
/// vector in, a scalar head out) is what the Predictor trait actually needs,
/// not the specific model family.
#[derive(Debug, Clone)]
pub struct LinearHead {
    pub bias: f64,
    pub weights: Vec<f64>,
}

impl LinearHead {
    fn score(&self, features: &[f64]) -> f64 {
        let dot: f64 = self
            .weights
            .iter()
            .zip(features.iter())
            .map(|(w, f)| w * f)
            .sum();
        self.bias + dot
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// The published model snapshot: one head per prediction target, plus a
/// version tag surfaced to `ModelStatus()`.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub version: String,
    pub auth_head: LinearHead,
    pub processing_time_head: LinearHead,
    pub health_thresholds: (f64, f64),
}

impl ModelSnapshot {
    /// A deterministic placeholder snapshot, weighted so that the auth head
    /// leans on `recent_success_rate_7d` and `risk_score`, matching the
    /// features that most directly bear on authorization likelihood.
    pub fn placeholder() -> Self {
        let feature_count = 16;
        let mut auth_weights = vec![0.0; feature_count];
        auth_weights[11] = 2.0; // recent_success_rate_7d
        auth_weights[5] = -0.01; // risk_score
        auth_weights[7] = 0.3; // has_3ds

        let mut time_weights = vec![0.0; feature_count];
        time_weights[12] = 1.0; // recent_processing_time_7d
        time_weights[0] = 0.001; // amount

        Self {
            version: "placeholder-v0".to_string(),
            auth_head: LinearHead {
                bias: 0.5,
                weights: auth_weights,
            },
            processing_time_head: LinearHead {
                bias: 50.0,
                weights: time_weights,
            },
            health_thresholds: (0.80, 0.60),
        }
    }
}

fn vectorize(f: &FeatureVector) -> Vec<f64> {
    vec![
        f.amount,
        f.amount_log10,
        f.payment_method_id,
        f.currency_id,
        f.country_id,
        f.risk_score,
        f.is_tokenized,
        f.has_3ds,
        f.psp_id,
        f.hour_of_day,
        f.day_of_week,
        f.recent_success_rate_7d,
        f.recent_processing_time_7d,
        f.recent_volume_7d,
        f.risk_adjusted_amount,
        f.time_of_day_category,
    ]
}

/// In-process ensemble Predictor, hot-reloadable via `reload`.
pub struct LocalEnsemblePredictor {
    snapshot: ArcSwap<ModelSnapshot>,
    state: AtomicU8,
}

const STATE_NOT_LOADED: u8 = 0;
const STATE_READY: u8 = 2;
const STATE_RELOADING: u8 = 3;
const STATE_FAILED: u8 = 4;

impl LocalEnsemblePredictor {
    pub fn new(initial: ModelSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(initial),
            state: AtomicU8::new(STATE_READY),
        }
    }

    pub fn not_loaded() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(ModelSnapshot::placeholder()),
            state: AtomicU8::new(STATE_NOT_LOADED),
        }
    }

    /// Publishes a new model snapshot without blocking in-flight `predict`
    /// calls. A reload failure leaves the previous snapshot in place and
    /// moves the state to `Failed` only if there was never a usable
    /// snapshot to begin with.
    pub fn reload(&self, candidate: ModelSnapshot) {
        self.state.store(STATE_RELOADING, Ordering::SeqCst);
        let started = Instant::now();
        self.snapshot.store(Arc::new(candidate));
        self.state.store(STATE_READY, Ordering::SeqCst);
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "model snapshot reloaded");
    }

    pub fn mark_failed(&self, reason: &str) {
        error!(reason, "predictor marked failed");
        self.state.store(STATE_FAILED, Ordering::SeqCst);
    }

    fn load_state(&self) -> PredictorState {
        match self.state.load(Ordering::SeqCst) {
            STATE_NOT_LOADED => PredictorState::NotLoaded,
            STATE_READY => PredictorState::Ready,
            STATE_RELOADING => PredictorState::Reloading,
            _ => PredictorState::Failed,
        }
    }
}

#[async_trait]
impl Predictor for LocalEnsemblePredictor {
    async fn predict(
        &self,
        txn: &Transaction,
        candidate: &Candidate,
    ) -> Result<Prediction, EngineError> {
        let state = self.load_state();
        if !state.can_serve() {
            return Err(EngineError::PredictorUnavailable(format!(
                "local ensemble in state {:?}",
                state
            )));
        }

        let snapshot = self.snapshot.load();
        let features = features::build(txn, candidate, Utc::now());
        let vector = vectorize(&features);

        let auth_probability = sigmoid(snapshot.auth_head.score(&vector)).clamp(0.0, 1.0);
        let processing_time_ms = snapshot.processing_time_head.score(&vector).max(0.0);

        let (green, yellow) = snapshot.health_thresholds;
        let health = if auth_probability >= green {
            PredictedHealth::Green
        } else if auth_probability >= yellow {
            PredictedHealth::Yellow
        } else {
            PredictedHealth::Red
        };

        Ok(Prediction {
            auth_probability,
            processing_time_ms,
            health,
            model_version: snapshot.version.clone(),
            timestamp: Utc::now(),
        })
    }

    fn state(&self) -> PredictorState {
        self.load_state()
    }

    fn model_version(&self) -> String {
        self.snapshot.load().version.clone()
    }
}

/// Descriptive variance of recent processing-time samples, used by callers
/// validating a candidate's stability before trusting its `processing_time_ms`
/// head against live traffic.
pub fn processing_time_variance(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    samples.to_vec().variance()
}
