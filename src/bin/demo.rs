//! PSP Router demo binary.
//!
//! Simulates a stream of `Decide` / `Feedback` calls against an in-memory
//! historical store and a local-ensemble predictor, logging each decision.
//! A CLI entry point for manual exploration, not the engine's actual
//! transport surface — a real deployment wires `Router::decide` behind
//! whatever RPC framework the host service already uses.
//!
//! Usage:
//!   psp-router-demo --config config.toml --transactions 50 --log-level info

use std::sync::Arc;

use clap::Parser;
use psp_router::candidate::historical::{sample_row, InMemoryHistoricalStore};
use psp_router::candidate::CandidateStore;
use psp_router::predictor::local_ensemble::ModelSnapshot;
use psp_router::predictor::LocalEnsemblePredictor;
use psp_router::types::{Feedback, Transaction};
use psp_router::{EngineConfig, FeedbackIngestor, NoopRetrainer, Router, Scorer};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "psp-router-demo")]
#[command(about = "Simulates routing decisions against a seeded historical store")]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Number of simulated transactions to route.
    #[arg(short, long, default_value = "20")]
    transactions: u32,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn seed_historical_store() -> InMemoryHistoricalStore {
    let store = InMemoryHistoricalStore::new();
    for i in 0..20 {
        store.push_row(sample_row("alpha-psp", 5, 840, 1, i % 2 == 0));
        store.push_row(sample_row("beta-psp", if i % 5 == 0 { 1 } else { 5 }, 840, 1, true));
        store.push_row(sample_row("gamma-psp", 9, 840, 1, false));
    }
    store
}

fn sample_transaction(i: u32) -> Transaction {
    Transaction {
        merchant_id: format!("merchant-{i}"),
        buyer_country: "US".to_string(),
        merchant_country: "US".to_string(),
        currency_id: 840,
        payment_method_id: 1,
        amount: 50.0 + (i as f64) * 3.7,
        card_bin: None,
        tokenized: i % 3 == 0,
        sca_required: i % 4 == 0,
        risk_score: (i % 60) as u8,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("starting psp-router-demo");
    let config = EngineConfig::load(args.config.as_deref())?;

    let historical = Arc::new(seed_historical_store());
    let candidate_store = Arc::new(CandidateStore::new(
        config.candidate_store.clone(),
        &config.health,
        &config.retrain,
        historical,
    ));
    let predictor: Arc<dyn psp_router::Predictor> =
        Arc::new(LocalEnsemblePredictor::new(ModelSnapshot::placeholder()));
    let scorer = Arc::new(Scorer::new(config.weights.clone()));

    let router = Router::new(
        Arc::clone(&candidate_store),
        predictor,
        scorer,
        config.timeouts.clone(),
        config.decision_defaults.clone(),
    );
    let ingestor = FeedbackIngestor::new(
        Arc::clone(&candidate_store),
        config.candidate_store.feedback_queue_capacity,
    );

    for i in 0..args.transactions {
        let txn = sample_transaction(i);
        match router.decide(&txn).await {
            Ok(decision) => {
                info!(
                    decision_id = %decision.decision_id,
                    candidate = %decision.candidate,
                    guardrail = decision.guardrail.as_str(),
                    reasoning = %decision.reasoning,
                    "decision produced"
                );

                let feedback = Feedback {
                    decision_id: decision.decision_id.clone(),
                    psp_name: decision.candidate.clone(),
                    authorized: i % 5 != 0,
                    amount: txn.amount,
                    fee_amount: txn.amount * 0.02,
                    processing_time_ms: 120.0 + (i as f64),
                    risk_score: txn.risk_score,
                    processed_at: chrono::Utc::now(),
                    error_code: None,
                    error_message: None,
                };
                ingestor.submit(feedback);
            }
            Err(e) => warn!(error = %e, "decide failed"),
        }

        ingestor.drain_once();
        if candidate_store.should_retrain() {
            candidate_store.retrain(&NoopRetrainer).await?;
        }
    }

    let candidates = router.list_candidates();
    info!(count = candidates.len(), "final candidate snapshot");
    for c in candidates {
        info!(
            psp = %c.psp_name,
            health = c.health.as_str(),
            auth_rate_recent = c.auth_rate_recent,
            total_count = c.total_count,
            "candidate state"
        );
    }

    let (status, version) = router.model_status();
    info!(status = %status, model_version = %version, "predictor status");

    let decide_latency = router.decide_latency_summary();
    let predict_latency = router.predict_latency_summary();
    info!(
        p50_us = decide_latency.p50_us,
        p99_us = decide_latency.p99_us,
        "decide latency"
    );
    info!(
        p50_us = predict_latency.p50_us,
        p99_us = predict_latency.p99_us,
        "predict latency"
    );

    Ok(())
}
