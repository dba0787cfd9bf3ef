use crate::config::Config;
use crate::domain::errors::{PredictionError, RetrainError, RiskError, StrategyError, SubscriptionError};
use crate::domain::jobs::RetrainJob;
use crate::domain::model::{ModelHandle, ModelStatus, PersistedModel};
use crate::domain::ports::{DataProvider, FeatureCache, ModelStateStore, ModelTrainer};
use crate::domain::types::{
    Candle, FeatureSet, HealthReport, PredictionRequest, PredictionResult, RiskReport,
    StatusReport, StrategyResult, Timeframe,
};
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::scorers::{MomentumScorer, build_scorer};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::broker::{BrokerConfig, SubscriptionBroker, SubscriptionHandle};
use super::coordinator::{CoordinatorConfig, InferenceCoordinator};
use super::registry::ModelRegistry;
use super::retraining::RetrainingSupervisor;
use super::risk_assessor::{RiskAssessor, RiskAssessorConfig};
use super::strategy_evaluator::{StrategyEvaluator, StrategyParams};

/// Explicit service context: every collaborator is constructed once at
/// startup and reached through this object, never through globals. The
/// transport layer holds one `Arc<InferenceEngine>` and calls the
/// boundary operations below.
pub struct InferenceEngine {
    config: Config,
    registry: Arc<ModelRegistry>,
    coordinator: Arc<InferenceCoordinator>,
    evaluator: StrategyEvaluator,
    risk_assessor: RiskAssessor,
    supervisor: Arc<RetrainingSupervisor>,
    broker: Arc<SubscriptionBroker>,
    provider: Arc<dyn DataProvider>,
    store: Arc<dyn ModelStateStore>,
    metrics: Metrics,
    started_at: DateTime<Utc>,
}

impl InferenceEngine {
    /// Builds the full context: rehydrates persisted models, registers a
    /// baseline model for any configured symbol without one, and wires
    /// the coordinator, evaluator, supervisor and broker together.
    pub async fn build(
        config: Config,
        provider: Arc<dyn DataProvider>,
        cache: Arc<dyn FeatureCache>,
        store: Arc<dyn ModelStateStore>,
        trainer: Arc<dyn ModelTrainer>,
    ) -> Result<Arc<Self>> {
        let metrics = Metrics::new().context("registering metrics")?;
        let registry = Arc::new(ModelRegistry::new());

        let persisted = store.load().await.context("rehydrating model state")?;
        let mut initial: Vec<ModelHandle> = persisted
            .iter()
            .filter(|m| m.status == ModelStatus::Ready)
            .map(|m| ModelHandle {
                id: m.id.clone(),
                version: m.version,
                status: ModelStatus::Ready,
                scorer: build_scorer(&m.spec),
                last_updated: m.last_updated,
                accuracy: m.accuracy,
            })
            .collect();

        for m in &persisted {
            registry.observe_version(m.version);
        }

        // Configured symbols with no persisted model start on the baseline
        for symbol in &config.symbols {
            let id = symbol.to_uppercase();
            if initial.iter().any(|h| h.id == id) {
                continue;
            }
            initial.push(ModelHandle::ready(
                id,
                registry.next_version(),
                Arc::new(MomentumScorer::default()),
            ));
        }
        let loaded = initial.len();
        registry.publish(initial).await;
        metrics.models_ready.set(loaded as f64);
        info!(models = loaded, "Registry initialized");

        let coordinator = Arc::new(InferenceCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&provider),
            cache,
            metrics.clone(),
            CoordinatorConfig {
                deadline: config.prediction_deadline,
                fetch_limit: config.data_fetch_limit,
                buy_threshold: config.buy_threshold,
                sell_threshold: config.sell_threshold,
            },
        ));

        let evaluator =
            StrategyEvaluator::new(Arc::clone(&coordinator), config.max_concurrent_lookups);
        let risk_assessor =
            RiskAssessor::new(Arc::clone(&provider), RiskAssessorConfig::default());
        let supervisor = Arc::new(RetrainingSupervisor::new(
            Arc::clone(&registry),
            trainer,
            Arc::clone(&store),
            metrics.clone(),
        ));
        let broker = Arc::new(SubscriptionBroker::new(
            Arc::clone(&coordinator),
            metrics.clone(),
            BrokerConfig {
                queue_capacity: config.subscription_queue_capacity,
                poll_interval: config.subscription_interval,
            },
        ));

        let engine = Arc::new(Self {
            config,
            registry,
            coordinator,
            evaluator,
            risk_assessor,
            supervisor,
            broker,
            provider,
            store,
            metrics,
            started_at: Utc::now(),
        });
        engine.persist_models().await;
        Ok(engine)
    }

    pub async fn predict(
        &self,
        symbol: &str,
        timeframe: Option<Timeframe>,
        features: Option<FeatureSet>,
    ) -> Result<PredictionResult, PredictionError> {
        let mut request = PredictionRequest::new(
            symbol,
            timeframe.unwrap_or(self.config.default_timeframe),
        );
        if let Some(features) = features {
            request = request.with_features(features);
        }
        self.coordinator.predict(request).await
    }

    pub async fn evaluate_strategy(
        &self,
        symbols: &[String],
        strategy_type: &str,
        params: Option<StrategyParams>,
    ) -> Result<StrategyResult, StrategyError> {
        self.evaluator
            .evaluate(symbols, strategy_type, self.config.default_timeframe, params)
            .await
    }

    pub async fn assess_risk(
        &self,
        symbols: &[String],
        portfolio_value: f64,
    ) -> Result<RiskReport, RiskError> {
        self.risk_assessor
            .assess_portfolio(symbols, portfolio_value)
            .await
    }

    /// Per-model status plus performance metrics, for the status endpoint
    pub async fn status(&self) -> StatusReport {
        let snapshot = self.registry.snapshot().await;
        let mut models = HashMap::new();
        let mut performance_metrics = HashMap::new();
        let mut last_updated = self.started_at;
        for (id, handle) in snapshot.iter() {
            models.insert(id.clone(), handle.status.to_string());
            if let Some(accuracy) = handle.accuracy {
                performance_metrics.insert(format!("{}_accuracy", id.to_lowercase()), accuracy);
            }
            if handle.last_updated > last_updated {
                last_updated = handle.last_updated;
            }
        }
        performance_metrics.insert(
            "uptime_seconds".to_string(),
            (Utc::now() - self.started_at).num_seconds() as f64,
        );
        StatusReport {
            models,
            last_updated,
            performance_metrics,
        }
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            service: "quantserve".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            models_loaded: self.registry.len().await,
        }
    }

    /// Fire-and-forget retrain; poll `retrain_job` for progress
    pub async fn trigger_retrain(
        &self,
        symbols: Option<Vec<String>>,
    ) -> Result<Uuid, RetrainError> {
        self.supervisor.trigger(symbols).await
    }

    pub async fn retrain_job(&self, job_id: Uuid) -> Result<RetrainJob, RetrainError> {
        self.supervisor
            .job(job_id)
            .await
            .ok_or(RetrainError::UnknownJob(job_id))
    }

    pub async fn retrain_jobs(&self) -> Vec<RetrainJob> {
        self.supervisor.jobs().await
    }

    pub async fn cancel_retrain(&self, job_id: Uuid) -> Result<(), RetrainError> {
        self.supervisor.cancel(job_id).await
    }

    pub async fn subscribe(
        &self,
        symbols: Vec<String>,
        timeframe: Option<Timeframe>,
    ) -> SubscriptionHandle {
        self.broker
            .subscribe(
                symbols,
                timeframe.unwrap_or(self.config.default_timeframe),
            )
            .await
    }

    /// Relays a raw inbound listener message to the broker
    pub async fn handle_subscription_message(
        &self,
        subscription_id: Uuid,
        raw: &str,
    ) -> Result<(), SubscriptionError> {
        self.broker.handle_message(subscription_id, raw).await
    }

    pub async fn close_subscription(&self, subscription_id: Uuid) -> Result<(), SubscriptionError> {
        self.broker.close(subscription_id).await
    }

    /// Raw market data passthrough
    pub async fn market_data(
        &self,
        symbol: &str,
        timeframe: Option<Timeframe>,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        self.provider
            .fetch_series(
                symbol,
                timeframe.unwrap_or(self.config.default_timeframe),
                limit.min(self.config.data_fetch_limit * 10).max(1),
            )
            .await
    }

    /// Technical indicator passthrough
    pub async fn indicators(
        &self,
        symbol: &str,
        timeframe: Option<Timeframe>,
    ) -> Result<FeatureSet> {
        self.provider
            .fetch_indicators(symbol, timeframe.unwrap_or(self.config.default_timeframe))
            .await
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub async fn shutdown(&self) {
        self.broker.close_all().await;
        self.persist_models().await;
        info!("Engine shut down");
    }

    async fn persist_models(&self) {
        let snapshot = self.registry.snapshot().await;
        let persisted: Vec<PersistedModel> = snapshot
            .iter()
            .map(|(_, handle)| PersistedModel {
                id: handle.id.clone(),
                version: handle.version,
                status: handle.status,
                last_updated: handle.last_updated,
                accuracy: handle.accuracy,
                spec: handle.scorer.spec(),
            })
            .collect();
        if let Err(e) = self.store.save(&persisted).await {
            error!(error = %e, "Failed to persist model state");
        }
    }
}
