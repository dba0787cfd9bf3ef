use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::types::Timeframe;

/// Runtime configuration, loaded from environment variables (with
/// `.env` support via dotenvy in the binary).
#[derive(Debug, Clone)]
pub struct Config {
    /// Symbols served at startup; one model id per symbol
    pub symbols: Vec<String>,
    /// Default timeframe when a request does not carry one
    pub default_timeframe: Timeframe,
    /// Total deadline for a single predict call
    pub prediction_deadline: Duration,
    /// Bars requested from the data provider per feature computation
    pub data_fetch_limit: usize,
    /// Raw score above this maps to Buy
    pub buy_threshold: f64,
    /// Raw score below this maps to Sell
    pub sell_threshold: f64,
    /// Max in-flight per-symbol lookups during strategy fan-out
    pub max_concurrent_lookups: usize,
    /// Per-subscription delivery queue capacity (drop-oldest beyond this)
    pub subscription_queue_capacity: usize,
    /// Interval between pushed predictions per subscription
    pub subscription_interval: Duration,
    /// Bars of history fetched per model fit
    pub training_window: usize,
    /// Gradient descent epochs per model fit
    pub training_epochs: usize,
    /// Path of the JSON model state file
    pub model_store_path: String,
    /// TTL for materialized feature cache entries
    pub feature_cache_ttl: Duration,
    pub observability_enabled: bool,
}

fn env_parse<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid {}: {} ({})", key, raw, e))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let symbols_str = env::var("SYMBOLS").unwrap_or_else(|_| "AAPL,GOOGL,MSFT,TSLA".to_string());
        let symbols: Vec<String> = symbols_str
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        anyhow::ensure!(!symbols.is_empty(), "SYMBOLS must name at least one symbol");

        let default_timeframe = env::var("DEFAULT_TIMEFRAME")
            .unwrap_or_else(|_| "1d".to_string())
            .parse::<Timeframe>()
            .context("Invalid DEFAULT_TIMEFRAME")?;

        let prediction_deadline_ms: u64 = env_parse("PREDICTION_DEADLINE_MS", "5000")?;
        let subscription_interval_ms: u64 = env_parse("SUBSCRIPTION_INTERVAL_MS", "1000")?;
        let feature_cache_ttl_secs: u64 = env_parse("FEATURE_CACHE_TTL_SECONDS", "60")?;

        let buy_threshold: f64 = env_parse("BUY_THRESHOLD", "0.55")?;
        let sell_threshold: f64 = env_parse("SELL_THRESHOLD", "0.45")?;
        anyhow::ensure!(
            sell_threshold < buy_threshold,
            "SELL_THRESHOLD must be below BUY_THRESHOLD"
        );

        Ok(Self {
            symbols,
            default_timeframe,
            prediction_deadline: Duration::from_millis(prediction_deadline_ms),
            data_fetch_limit: env_parse("DATA_FETCH_LIMIT", "100")?,
            buy_threshold,
            sell_threshold,
            max_concurrent_lookups: env_parse("MAX_CONCURRENT_LOOKUPS", "4")?,
            subscription_queue_capacity: env_parse("SUBSCRIPTION_QUEUE_CAPACITY", "16")?,
            subscription_interval: Duration::from_millis(subscription_interval_ms),
            training_window: env_parse("TRAINING_WINDOW", "500")?,
            training_epochs: env_parse("TRAINING_EPOCHS", "200")?,
            model_store_path: env::var("MODEL_STORE_PATH")
                .unwrap_or_else(|_| "data/models.json".to_string()),
            feature_cache_ttl: Duration::from_secs(feature_cache_ttl_secs),
            observability_enabled: env_parse("OBSERVABILITY_ENABLED", "true")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec!["AAPL".to_string()],
            default_timeframe: Timeframe::OneDay,
            prediction_deadline: Duration::from_secs(5),
            data_fetch_limit: 100,
            buy_threshold: 0.55,
            sell_threshold: 0.45,
            max_concurrent_lookups: 4,
            subscription_queue_capacity: 16,
            subscription_interval: Duration::from_millis(1000),
            training_window: 500,
            training_epochs: 200,
            model_store_path: "data/models.json".to_string(),
            feature_cache_ttl: Duration::from_secs(60),
            observability_enabled: true,
        }
    }
}
