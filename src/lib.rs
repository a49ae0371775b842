//! PSP Router — an intelligent payment-service-provider routing engine.
//!
//! Four components, each with a narrow public contract: the [`candidate`]
//! store (the only shared mutable state), the [`predictor`] trait and its
//! concrete backends, the [`scorer`], and the [`router`] that orchestrates
//! guardrails, prediction, and scoring into an explainable [`types::Decision`].

pub mod candidate;
pub mod config;
pub mod errors;
pub mod observability;
pub mod predictor;
pub mod retrain;
pub mod router;
pub mod scorer;
pub mod types;

pub use candidate::ingestor::FeedbackIngestor;
pub use candidate::CandidateStore;
pub use config::EngineConfig;
pub use errors::{EngineError, EngineResult};
pub use predictor::{BanditPredictor, LocalEnsemblePredictor, NullPredictor, Predictor, RemoteModelPredictor};
pub use retrain::{NoopRetrainer, Retrainer};
pub use router::Router;
pub use scorer::Scorer;
pub use types::{Candidate, Decision, Feedback, Transaction, Weights};
