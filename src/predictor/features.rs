//! Deterministic feature vector assembly for one (transaction, candidate)
//! pair. Every field is derived from transaction and candidate state alone;
//! there is no external I/O inside a single `Predict` call.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;

use crate::types::{Candidate, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDayCategory {
    Night,
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDayCategory {
    fn from_hour(hour: u32) -> Self {
        match hour {
            0..=5 => TimeOfDayCategory::Night,
            6..=11 => TimeOfDayCategory::Morning,
            12..=17 => TimeOfDayCategory::Afternoon,
            _ => TimeOfDayCategory::Evening,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            TimeOfDayCategory::Night => 0.0,
            TimeOfDayCategory::Morning => 1.0,
            TimeOfDayCategory::Afternoon => 2.0,
            TimeOfDayCategory::Evening => 3.0,
        }
    }
}

/// Numeric, normalized feature vector handed to a model head.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureVector {
    pub amount: f64,
    pub amount_log10: f64,
    pub payment_method_id: f64,
    pub currency_id: f64,
    pub country_id: f64,
    pub risk_score: f64,
    pub is_tokenized: f64,
    pub has_3ds: f64,
    pub psp_id: f64,
    pub hour_of_day: f64,
    pub day_of_week: f64,
    pub recent_success_rate_7d: f64,
    pub recent_processing_time_7d: f64,
    pub recent_volume_7d: f64,
    pub risk_adjusted_amount: f64,
    pub time_of_day_category: f64,
}

/// Stable numeric id for a country code, used only as a model feature (not
/// for any business-logic branching). A simple FNV-1a-style fold keeps this
/// dependency-free and fully deterministic.
fn country_numeric_id(country: &str) -> f64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in country.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % 1_000_000) as f64
}

fn psp_numeric_id(psp_name: &str) -> f64 {
    country_numeric_id(psp_name)
}

pub fn build(txn: &Transaction, candidate: &Candidate, now: DateTime<Utc>) -> FeatureVector {
    let hour = now.hour();
    let risk_factor = 1.0 + (txn.risk_score as f64 / 100.0);

    FeatureVector {
        amount: txn.amount,
        amount_log10: (txn.amount.max(1.0)).log10(),
        payment_method_id: txn.payment_method_id as f64,
        currency_id: txn.currency_id as f64,
        country_id: country_numeric_id(&txn.buyer_country),
        risk_score: txn.risk_score as f64,
        is_tokenized: if txn.tokenized { 1.0 } else { 0.0 },
        has_3ds: if candidate.supports_3ds { 1.0 } else { 0.0 },
        psp_id: psp_numeric_id(&candidate.psp_name),
        hour_of_day: hour as f64,
        day_of_week: now.weekday().num_days_from_monday() as f64,
        recent_success_rate_7d: candidate.auth_rate_recent,
        recent_processing_time_7d: candidate.avg_processing_time_ms,
        recent_volume_7d: candidate.total_count as f64,
        risk_adjusted_amount: txn.amount * risk_factor,
        time_of_day_category: TimeOfDayCategory::from_hour(hour).as_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Health;

    #[test]
    fn build_is_deterministic_for_fixed_inputs() {
        let txn = Transaction {
            merchant_id: "m1".to_string(),
            buyer_country: "US".to_string(),
            merchant_country: "US".to_string(),
            currency_id: 840,
            payment_method_id: 1,
            amount: 150.0,
            card_bin: None,
            tokenized: false,
            sca_required: false,
            risk_score: 15,
        };
        let mut candidate = Candidate::new("alpha");
        candidate.health = Health::Green;
        candidate.auth_rate_recent = 0.89;

        let now = Utc::now();
        let f1 = build(&txn, &candidate, now);
        let f2 = build(&txn, &candidate, now);
        assert_eq!(f1.amount, f2.amount);
        assert_eq!(f1.psp_id, f2.psp_id);
        assert!((f1.amount_log10 - 150f64.log10()).abs() < 1e-9);
    }
}
