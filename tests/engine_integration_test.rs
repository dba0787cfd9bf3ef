use quantserve::application::engine::InferenceEngine;
use quantserve::config::Config;
use quantserve::domain::errors::PredictionError;
use quantserve::domain::jobs::JobState;
use quantserve::domain::ports::DataProvider;
use quantserve::domain::types::{Action, Candle, FeatureSet, Timeframe};
use quantserve::infrastructure::cache::InMemoryFeatureCache;
use quantserve::infrastructure::mock::MockDataProvider;
use quantserve::infrastructure::model_store::{JsonModelStore, NullModelStore};
use quantserve::infrastructure::trainer::{HistoricalTrainer, TrainerConfig};

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

async fn build_engine(config: Config) -> Arc<InferenceEngine> {
    let provider = Arc::new(MockDataProvider::new());
    InferenceEngine::build(
        config.clone(),
        provider.clone(),
        Arc::new(InMemoryFeatureCache::new(config.feature_cache_ttl)),
        Arc::new(NullModelStore),
        Arc::new(HistoricalTrainer::new(provider, TrainerConfig::default())),
    )
    .await
    .unwrap()
}

/// End-to-end predict: a registered symbol yields a canonical result
#[tokio::test]
async fn test_predict_shape_for_registered_symbol() {
    let engine = build_engine(Config::default()).await;

    let result = engine.predict("AAPL", None, None).await.unwrap();
    assert_eq!(result.symbol, "AAPL");
    assert!(matches!(
        result.action,
        Action::Buy | Action::Sell | Action::Hold
    ));
    assert!((0.0..=1.0).contains(&result.confidence));
    assert!(result.model_version >= 1);
    assert!(!result.reasoning.is_empty());
}

#[tokio::test]
async fn test_predict_unknown_symbol_is_model_unavailable() {
    let engine = build_engine(Config::default()).await;
    let err = engine.predict("???", None, None).await.unwrap_err();
    assert!(matches!(err, PredictionError::ModelUnavailable { .. }));
}

/// A data provider that always fails, to exercise the upstream error path
struct FailingProvider;

#[async_trait]
impl DataProvider for FailingProvider {
    async fn fetch_series(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _limit: usize,
    ) -> Result<Vec<Candle>> {
        bail!("exchange connection refused")
    }

    async fn fetch_indicators(&self, _symbol: &str, _timeframe: Timeframe) -> Result<FeatureSet> {
        bail!("exchange connection refused")
    }
}

#[tokio::test]
async fn test_provider_failure_surfaces_as_upstream_error() {
    let provider = Arc::new(FailingProvider);
    let config = Config::default();
    let engine = InferenceEngine::build(
        config.clone(),
        provider.clone(),
        Arc::new(InMemoryFeatureCache::new(config.feature_cache_ttl)),
        Arc::new(NullModelStore),
        Arc::new(HistoricalTrainer::new(provider, TrainerConfig::default())),
    )
    .await
    .unwrap();

    let err = engine.predict("AAPL", None, None).await.unwrap_err();
    match err {
        PredictionError::UpstreamData { symbol, reason } => {
            assert_eq!(symbol, "AAPL");
            assert!(reason.contains("connection refused"));
        }
        other => panic!("expected UpstreamData, got {:?}", other),
    }
}

/// A provider that hangs past any reasonable deadline
struct SlowProvider;

#[async_trait]
impl DataProvider for SlowProvider {
    async fn fetch_series(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _limit: usize,
    ) -> Result<Vec<Candle>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        bail!("unreachable")
    }

    async fn fetch_indicators(&self, _symbol: &str, _timeframe: Timeframe) -> Result<FeatureSet> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        bail!("unreachable")
    }
}

#[tokio::test]
async fn test_slow_provider_hits_prediction_deadline() {
    let provider = Arc::new(SlowProvider);
    let config = Config {
        prediction_deadline: Duration::from_millis(50),
        ..Default::default()
    };
    let engine = InferenceEngine::build(
        config.clone(),
        provider.clone(),
        Arc::new(InMemoryFeatureCache::new(config.feature_cache_ttl)),
        Arc::new(NullModelStore),
        Arc::new(HistoricalTrainer::new(provider, TrainerConfig::default())),
    )
    .await
    .unwrap();

    let err = engine.predict("AAPL", None, None).await.unwrap_err();
    assert!(matches!(err, PredictionError::Timeout { deadline_ms: 50 }));
}

#[tokio::test]
async fn test_health_and_status_reflect_registry() {
    let config = Config {
        symbols: vec!["AAPL".to_string(), "MSFT".to_string()],
        ..Default::default()
    };
    let engine = build_engine(config).await;

    let health = engine.health().await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.service, "quantserve");
    assert_eq!(health.models_loaded, 2);

    let status = engine.status().await;
    assert_eq!(status.models.get("AAPL").unwrap(), "ready");
    assert_eq!(status.models.get("MSFT").unwrap(), "ready");
    assert!(status.performance_metrics.contains_key("uptime_seconds"));
}

#[tokio::test]
async fn test_market_data_and_indicator_passthrough() {
    let engine = build_engine(Config::default()).await;

    let candles = engine
        .market_data("AAPL", Some(Timeframe::OneHour), 50)
        .await
        .unwrap();
    assert_eq!(candles.len(), 50);

    let features = engine
        .indicators("AAPL", Some(Timeframe::OneHour))
        .await
        .unwrap();
    assert!(features.last_price.is_some());
    assert_eq!(features.timeframe, Some(Timeframe::OneHour));
}

/// End-to-end retrain through the engine: the job succeeds, the serving
/// version advances, and the fitted scorer reports an accuracy
#[tokio::test]
async fn test_engine_retrain_advances_model_version() {
    let engine = build_engine(Config {
        symbols: vec!["AAPL".to_string()],
        training_epochs: 30,
        ..Default::default()
    })
    .await;
    let before = engine.predict("AAPL", None, None).await.unwrap();

    let job_id = engine
        .trigger_retrain(Some(vec!["AAPL".to_string()]))
        .await
        .unwrap();
    let mut job = engine.retrain_job(job_id).await.unwrap();
    for _ in 0..300 {
        if job.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        job = engine.retrain_job(job_id).await.unwrap();
    }
    assert_eq!(job.state, JobState::Succeeded);

    let after = engine.predict("AAPL", None, None).await.unwrap();
    assert!(after.model_version > before.model_version);

    let status = engine.status().await;
    assert!(status.performance_metrics.contains_key("aapl_accuracy"));
}

/// Models persisted by one engine instance are what the next one serves
#[tokio::test]
async fn test_registry_rehydrates_from_store_across_restart() {
    let path = std::env::temp_dir().join(format!("quantserve-{}.json", uuid::Uuid::new_v4()));
    let config = Config {
        symbols: vec!["AAPL".to_string()],
        training_epochs: 30,
        model_store_path: path.display().to_string(),
        ..Default::default()
    };

    let version_after_retrain = {
        let provider = Arc::new(MockDataProvider::new());
        let engine = InferenceEngine::build(
            config.clone(),
            provider.clone(),
            Arc::new(InMemoryFeatureCache::new(config.feature_cache_ttl)),
            Arc::new(JsonModelStore::new(&path)),
            Arc::new(HistoricalTrainer::new(provider, TrainerConfig::default())),
        )
        .await
        .unwrap();

        let job_id = engine.trigger_retrain(None).await.unwrap();
        for _ in 0..300 {
            if engine.retrain_job(job_id).await.unwrap().is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        engine.predict("AAPL", None, None).await.unwrap().model_version
    };

    // "Restart": a fresh engine over the same store
    let provider = Arc::new(MockDataProvider::new());
    let engine = InferenceEngine::build(
        config.clone(),
        provider.clone(),
        Arc::new(InMemoryFeatureCache::new(config.feature_cache_ttl)),
        Arc::new(JsonModelStore::new(&path)),
        Arc::new(HistoricalTrainer::new(provider, TrainerConfig::default())),
    )
    .await
    .unwrap();

    let result = engine.predict("AAPL", None, None).await.unwrap();
    assert_eq!(result.model_version, version_after_retrain);

    tokio::fs::remove_file(&path).await.ok();
}
