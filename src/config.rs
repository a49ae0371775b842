//! Engine configuration: every weight, threshold, window, and timeout the
//! routing engine needs, each with a documented default. No hidden
//! defaults.
//!
//! Loaded the same two-layer way the rest of this codebase loads config: a
//! TOML file for the checked-in baseline, `dotenv` + a thin env-var overlay
//! for per-deployment overrides.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Weights;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Recent auth rate at/above this is `green`. Default 0.80.
    pub green_cutoff: f64,
    /// Recent auth rate at/above this (and below `green_cutoff`) is `yellow`. Default 0.60.
    pub yellow_cutoff: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            green_cutoff: 0.80,
            yellow_cutoff: 0.60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    /// Per-candidate `Predict` call timeout. Default 100ms.
    pub predictor_timeout_ms: u64,
    /// Aggregate `Decide` deadline across all candidates. Default 250ms.
    pub routing_deadline_ms: u64,
    /// Candidate-store segment refresh timeout. Default 1s.
    pub segment_refresh_timeout_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            predictor_timeout_ms: 100,
            routing_deadline_ms: 250,
            segment_refresh_timeout_ms: 1_000,
        }
    }
}

impl Timeouts {
    pub fn predictor_timeout(&self) -> Duration {
        Duration::from_millis(self.predictor_timeout_ms)
    }

    pub fn routing_deadline(&self) -> Duration {
        Duration::from_millis(self.routing_deadline_ms)
    }

    pub fn segment_refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.segment_refresh_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainPolicy {
    /// Minimum wall-clock interval between retrains. Default 24h.
    pub interval_secs: u64,
    /// Accumulated feedback count since the last retrain that forces one. Default 10_000.
    pub feedback_count_trigger: u64,
}

impl Default for RetrainPolicy {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
            feedback_count_trigger: 10_000,
        }
    }
}

impl RetrainPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateStorePolicy {
    /// Candidates with fewer than this many segment rows are excluded from
    /// routing. Default 10; see `DESIGN.md` for the operational discussion.
    pub minimum_volume_threshold: u64,
    /// Rolling window for `auth_rate_window`. Default 30 days.
    pub window_days: i64,
    /// Rolling window for `auth_rate_recent`. Default 7 days.
    pub recent_window_days: i64,
    /// Exponential smoothing factor for processing time. Default 0.1.
    pub processing_time_alpha: f64,
    /// Per-candidate dedup ring capacity for feedback decision ids. Default 1000.
    pub dedup_ring_capacity: usize,
    /// Segment cache TTL. Default 30s.
    pub segment_cache_ttl_secs: u64,
    /// Status codes from the historical outcome store treated as success.
    /// Default `{5, 7, 9}`; see `DESIGN.md` for the operational discussion.
    pub success_status_codes: Vec<i32>,
    /// Bounded feedback ingestion queue depth. Default 10_000.
    pub feedback_queue_capacity: usize,
}

impl Default for CandidateStorePolicy {
    fn default() -> Self {
        Self {
            minimum_volume_threshold: 10,
            window_days: 30,
            recent_window_days: 7,
            processing_time_alpha: 0.1,
            dedup_ring_capacity: 1000,
            segment_cache_ttl_secs: 30,
            success_status_codes: vec![5, 7, 9],
            feedback_queue_capacity: 10_000,
        }
    }
}

impl CandidateStorePolicy {
    pub fn segment_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.segment_cache_ttl_secs)
    }

    pub fn is_success(&self, status_code: i32) -> bool {
        self.success_status_codes.contains(&status_code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionDefaults {
    pub retry_window_ms: u64,
    pub max_retries: u32,
}

impl Default for DecisionDefaults {
    fn default() -> Self {
        Self {
            retry_window_ms: 8_000,
            max_retries: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub weights: Weights,
    #[serde(default)]
    pub health: HealthThresholds,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub retrain: RetrainPolicy,
    #[serde(default)]
    pub candidate_store: CandidateStorePolicy,
    #[serde(default)]
    pub decision_defaults: DecisionDefaults,
}

impl EngineConfig {
    /// Load a baseline from `path` (TOML) and apply environment overrides.
    /// `dotenv().ok()` is called first so a local `.env` file populates the
    /// process environment the same way the rest of this codebase's binaries
    /// bootstrap configuration.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| anyhow::anyhow!("reading config file {p}: {e}"))?;
                toml::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("parsing config file {p}: {e}"))?
            }
            None => EngineConfig::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("PSP_ROUTER_MIN_VOLUME_THRESHOLD") {
            if let Ok(parsed) = v.parse() {
                self.candidate_store.minimum_volume_threshold = parsed;
            }
        }
        if let Ok(v) = env::var("PSP_ROUTER_PREDICTOR_TIMEOUT_MS") {
            if let Ok(parsed) = v.parse() {
                self.timeouts.predictor_timeout_ms = parsed;
            }
        }
        if let Ok(v) = env::var("PSP_ROUTER_ROUTING_DEADLINE_MS") {
            if let Ok(parsed) = v.parse() {
                self.timeouts.routing_deadline_ms = parsed;
            }
        }
        if let Ok(v) = env::var("PSP_ROUTER_RETRAIN_INTERVAL_SECS") {
            if let Ok(parsed) = v.parse() {
                self.retrain.interval_secs = parsed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.health.green_cutoff, 0.80);
        assert_eq!(cfg.health.yellow_cutoff, 0.60);
        assert_eq!(cfg.timeouts.predictor_timeout_ms, 100);
        assert_eq!(cfg.timeouts.routing_deadline_ms, 250);
        assert_eq!(cfg.candidate_store.minimum_volume_threshold, 10);
        assert_eq!(cfg.candidate_store.success_status_codes, vec![5, 7, 9]);
    }

    #[test]
    fn env_override_applies_over_default() {
        env::set_var("PSP_ROUTER_MIN_VOLUME_THRESHOLD", "25");
        let mut cfg = EngineConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.candidate_store.minimum_volume_threshold, 25);
        env::remove_var("PSP_ROUTER_MIN_VOLUME_THRESHOLD");
    }

    #[test]
    fn load_reads_toml_baseline_from_disk() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [health]
            green_cutoff = 0.75
            yellow_cutoff = 0.5

            [candidate_store]
            minimum_volume_threshold = 50
            window_days = 30
            recent_window_days = 7
            processing_time_alpha = 0.1
            dedup_ring_capacity = 1000
            segment_cache_ttl_secs = 30
            success_status_codes = [5, 7, 9]
            feedback_queue_capacity = 10000
            "#
        )
        .unwrap();

        let cfg = EngineConfig::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(cfg.health.green_cutoff, 0.75);
        assert_eq!(cfg.candidate_store.minimum_volume_threshold, 50);
    }
}
