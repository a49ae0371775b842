//! Engine error taxonomy.
//!
//! One variant per distinct failure kind a caller needs to branch on.
//! `PredictorUnavailable` is constructed internally by the
//! `Predictor`/`Router` layer and is always recovered via the deterministic
//! fallback before it would otherwise cross a public boundary (see
//! `Router::decide`) — it is still a variant here so the fallback path and
//! its tests can name it precisely.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no eligible candidate survived guardrails")]
    NoEligibleCandidate,

    #[error("historical outcome store unavailable for segment {segment}: {reason}")]
    CandidateUnavailable { segment: String, reason: String },

    #[error("predictor unavailable: {0}")]
    PredictorUnavailable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded after {elapsed_ms}ms (budget {budget_ms}ms)")]
    DeadlineExceeded { elapsed_ms: u64, budget_ms: u64 },

    #[error("internal error [{correlation_id}]: {message}")]
    Internal {
        correlation_id: String,
        message: String,
    },
}

impl EngineError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            message: message.into(),
        }
    }

    /// True for error kinds the Router is allowed to surface to its caller.
    /// `PredictorUnavailable` is deliberately excluded: it must be recovered
    /// locally by the fallback path and never escape `Decide`.
    pub fn is_surfaceable(&self) -> bool {
        !matches!(self, EngineError::PredictorUnavailable(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
