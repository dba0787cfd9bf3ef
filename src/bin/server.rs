//! Quantserve Server - Headless inference-serving engine
//!
//! Runs the orchestration core without a transport layer: builds the
//! engine context, rehydrates the model registry, kicks off an initial
//! retrain, and logs periodic predictions for the configured symbols.
//! Metrics are pushed as Prometheus text to stdout.
//!
//! # Usage
//! ```sh
//! SYMBOLS=AAPL,MSFT cargo run --bin server -- --metrics-interval 60
//! ```

use anyhow::Result;
use clap::Parser;
use quantserve::application::engine::InferenceEngine;
use quantserve::config::Config;
use quantserve::infrastructure::cache::InMemoryFeatureCache;
use quantserve::infrastructure::mock::MockDataProvider;
use quantserve::infrastructure::model_store::JsonModelStore;
use quantserve::infrastructure::trainer::{HistoricalTrainer, TrainerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "quantserve-server", about = "Headless model-serving engine")]
struct Args {
    /// Seconds between metric dumps (0 disables)
    #[arg(long, default_value_t = 60)]
    metrics_interval: u64,

    /// Seconds between demo prediction sweeps
    #[arg(long, default_value_t = 10)]
    predict_interval: u64,

    /// Skip the initial retrain and serve the rehydrated/baseline models
    #[arg(long, default_value_t = false)]
    no_initial_retrain: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let args = Args::parse();
    info!("Quantserve Server {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: Symbols={:?}, Deadline={:?}",
        config.symbols, config.prediction_deadline
    );

    // The mock provider stands in for a market data integration; the
    // engine only sees the DataProvider capability.
    let provider = Arc::new(MockDataProvider::new());
    let cache = Arc::new(InMemoryFeatureCache::new(config.feature_cache_ttl));
    let store = Arc::new(JsonModelStore::new(&config.model_store_path));
    let trainer = Arc::new(HistoricalTrainer::new(
        provider.clone(),
        TrainerConfig {
            window: config.training_window,
            timeframe: config.default_timeframe,
            epochs: config.training_epochs,
            ..Default::default()
        },
    ));

    let engine = InferenceEngine::build(config.clone(), provider, cache, store, trainer).await?;
    let health = engine.health().await;
    info!(
        "Engine ready: {} v{} serving {} model(s)",
        health.service, health.version, health.models_loaded
    );

    if !args.no_initial_retrain {
        match engine.trigger_retrain(None).await {
            Ok(job_id) => info!(%job_id, "Initial retrain triggered"),
            Err(e) => warn!(error = %e, "Initial retrain not started"),
        }
    }

    if config.observability_enabled && args.metrics_interval > 0 {
        let engine = engine.clone();
        let interval = Duration::from_secs(args.metrics_interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match engine.metrics().export() {
                    Ok(rendered) => println!("{}", rendered),
                    Err(e) => warn!(error = %e, "Metric export failed"),
                }
            }
        });
        info!("Metrics reporter started (interval: {}s)", args.metrics_interval);
    }

    let sweep_engine = engine.clone();
    let symbols = config.symbols.clone();
    let sweep = tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(args.predict_interval.max(1)));
        loop {
            ticker.tick().await;
            for symbol in &symbols {
                match sweep_engine.predict(symbol, None, None).await {
                    Ok(result) => info!(
                        symbol = %result.symbol,
                        action = %result.action,
                        confidence = result.confidence,
                        version = result.model_version,
                        "Prediction"
                    ),
                    Err(e) => warn!(symbol = %symbol, error = %e, "Prediction failed"),
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    sweep.abort();
    engine.shutdown().await;
    Ok(())
}
