//! The historical outcome store is an external collaborator: a read-only
//! rowset the Candidate Store aggregates per segment. This
//! module only defines the narrow trait boundary plus an in-memory
//! implementation used by tests and the demo binary — a real deployment
//! backs `HistoricalOutcomeStore` with whatever warehouse or OLTP replica
//! holds settled transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::errors::EngineError;

/// One settled-transaction row as read from the historical outcome store.
#[derive(Debug, Clone)]
pub struct OutcomeRow {
    pub psp_name: String,
    pub status_code: i32,
    pub currency_id: u32,
    pub payment_method_id: u32,
    pub fee_bps: f64,
    pub fixed_fee: f64,
    pub three_ds: bool,
    pub tokenized: bool,
    pub created_at: DateTime<Utc>,
}

/// Read-only, time-bounded, segmented aggregation query surface.
#[async_trait]
pub trait HistoricalOutcomeStore: Send + Sync {
    /// Rows for `(currency_id, payment_method_id)` created at or after `since`.
    /// Fails with `EngineError::CandidateUnavailable` on any read failure —
    /// the Candidate Store surfaces this as-is.
    async fn query_segment(
        &self,
        currency_id: u32,
        payment_method_id: u32,
        since: DateTime<Utc>,
    ) -> Result<Vec<OutcomeRow>, EngineError>;
}

/// Fixture-backed implementation for tests and the demo binary.
#[derive(Debug, Default)]
pub struct InMemoryHistoricalStore {
    rows: RwLock<Vec<OutcomeRow>>,
    /// When set, every `query_segment` call fails with this reason,
    /// simulating a cold-segment read failure (`EngineError::CandidateUnavailable`).
    fail_with: RwLock<Option<String>>,
}

impl InMemoryHistoricalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<OutcomeRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
            fail_with: RwLock::new(None),
        }
    }

    pub fn push_row(&self, row: OutcomeRow) {
        self.rows.write().push(row);
    }

    pub fn set_failure(&self, reason: Option<String>) {
        *self.fail_with.write() = reason;
    }
}

#[async_trait]
impl HistoricalOutcomeStore for InMemoryHistoricalStore {
    async fn query_segment(
        &self,
        currency_id: u32,
        payment_method_id: u32,
        since: DateTime<Utc>,
    ) -> Result<Vec<OutcomeRow>, EngineError> {
        if let Some(reason) = self.fail_with.read().clone() {
            return Err(EngineError::CandidateUnavailable {
                segment: format!("{currency_id}/{payment_method_id}"),
                reason,
            });
        }

        let rows = self
            .rows
            .read()
            .iter()
            .filter(|r| {
                r.currency_id == currency_id
                    && r.payment_method_id == payment_method_id
                    && r.created_at >= since
            })
            .cloned()
            .collect();
        Ok(rows)
    }
}

/// Convenience constructor for a settled-transaction row with sensible
/// placeholder fee values. Used to seed `InMemoryHistoricalStore` in unit
/// tests and in the demo binary.
pub fn sample_row(
    psp_name: &str,
    status_code: i32,
    currency_id: u32,
    payment_method_id: u32,
    three_ds: bool,
) -> OutcomeRow {
    OutcomeRow {
        psp_name: psp_name.to_string(),
        status_code,
        currency_id,
        payment_method_id,
        fee_bps: 200.0,
        fixed_fee: 0.10,
        three_ds,
        tokenized: false,
        created_at: Utc::now(),
    }
}
