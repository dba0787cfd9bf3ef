use crate::domain::errors::PredictionError;
use crate::domain::model::ModelHandle;
use crate::domain::ports::{DataProvider, FeatureCache};
use crate::domain::types::{Action, FeatureSet, PredictionRequest, PredictionResult, Timeframe};
use crate::infrastructure::observability::metrics::Metrics;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::registry::ModelRegistry;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Total deadline for one predict call, data fetch included
    pub deadline: Duration,
    /// Bars requested when features must be computed from a series
    pub fetch_limit: usize,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(5),
            fetch_limit: 100,
            buy_threshold: 0.55,
            sell_threshold: 0.45,
        }
    }
}

/// Executes a prediction request against the registry: resolves the
/// model, supplies features, invokes the scorer, and normalizes output.
/// Stateless across requests; the registry snapshot is the only shared
/// read.
pub struct InferenceCoordinator {
    registry: Arc<ModelRegistry>,
    provider: Arc<dyn DataProvider>,
    cache: Arc<dyn FeatureCache>,
    metrics: Metrics,
    config: CoordinatorConfig,
}

impl InferenceCoordinator {
    pub fn new(
        registry: Arc<ModelRegistry>,
        provider: Arc<dyn DataProvider>,
        cache: Arc<dyn FeatureCache>,
        metrics: Metrics,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            provider,
            cache,
            metrics,
            config,
        }
    }

    /// Model ids are keyed by symbol in this deployment
    fn resolve_model_id(symbol: &str) -> String {
        symbol.trim().to_uppercase()
    }

    pub async fn predict(
        &self,
        request: PredictionRequest,
    ) -> Result<PredictionResult, PredictionError> {
        let started = std::time::Instant::now();
        let deadline = self.config.deadline;
        let result = match timeout(deadline, self.predict_inner(&request)).await {
            Ok(result) => result,
            Err(_) => Err(PredictionError::Timeout {
                deadline_ms: deadline.as_millis() as u64,
            }),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(PredictionError::ModelUnavailable { .. }) => "model_unavailable",
            Err(PredictionError::ModelOutputInvalid { .. }) => "model_output_invalid",
            Err(PredictionError::UpstreamData { .. }) => "upstream_data",
            Err(PredictionError::Timeout { .. }) => "timeout",
        };
        self.metrics.predictions_total.with_label_values(&[outcome]).inc();
        self.metrics
            .prediction_latency_seconds
            .with_label_values(&[outcome])
            .observe(started.elapsed().as_secs_f64());

        result
    }

    async fn predict_inner(
        &self,
        request: &PredictionRequest,
    ) -> Result<PredictionResult, PredictionError> {
        let model_id = Self::resolve_model_id(&request.symbol);

        // One snapshot per request: publishes that land after this point
        // are invisible to this request by design of the registry.
        let snapshot = self.registry.snapshot().await;
        let handle = snapshot
            .get(&model_id)
            .cloned()
            .ok_or(PredictionError::ModelUnavailable {
                model_id: model_id.clone(),
            })?;

        let features = match &request.features {
            Some(features) => features.clone(),
            None => {
                self.obtain_features(&model_id, request.timeframe)
                    .await?
            }
        };

        let raw = handle
            .scorer
            .score(&features)
            .map_err(|reason| PredictionError::ModelOutputInvalid {
                model_id: model_id.clone(),
                version: handle.version,
                reason,
            })?;

        if !raw.is_finite() {
            return Err(PredictionError::ModelOutputInvalid {
                model_id,
                version: handle.version,
                reason: format!("non-finite score: {}", raw),
            });
        }

        debug!(symbol = %model_id, raw, version = handle.version, "Scored request");
        Ok(self.normalize(&model_id, raw, &features, handle.as_ref()))
    }

    async fn obtain_features(
        &self,
        model_id: &str,
        timeframe: Timeframe,
    ) -> Result<FeatureSet, PredictionError> {
        let key = format!("features:{}:{}", model_id, timeframe);
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let features = self
            .provider
            .fetch_indicators(model_id, timeframe)
            .await
            .map_err(|e| {
                warn!(symbol = %model_id, error = %e, "Data provider failed");
                PredictionError::UpstreamData {
                    symbol: model_id.to_string(),
                    reason: e.to_string(),
                }
            })?;

        self.cache.put(key, features.clone()).await;
        Ok(features)
    }

    /// Turns a raw [0,1] score into the canonical result shape. Price
    /// targets are ATR-derived when the features carry enough context.
    fn normalize(
        &self,
        model_id: &str,
        raw: f64,
        features: &FeatureSet,
        handle: &ModelHandle,
    ) -> PredictionResult {
        let raw = raw.clamp(0.0, 1.0);
        let action = if raw >= self.config.buy_threshold {
            Action::Buy
        } else if raw <= self.config.sell_threshold {
            Action::Sell
        } else {
            Action::Hold
        };
        let confidence = ((raw - 0.5).abs() * 2.0).clamp(0.0, 1.0);

        let (target_price, stop_loss) = match (action, features.last_price, features.atr) {
            (Action::Buy, Some(price), Some(atr)) if atr.is_finite() && atr > 0.0 => {
                (Some(price + 2.0 * atr), Some(price - atr))
            }
            (Action::Sell, Some(price), Some(atr)) if atr.is_finite() && atr > 0.0 => {
                (Some(price - 2.0 * atr), Some(price + atr))
            }
            _ => (None, None),
        };

        let reasoning = format!(
            "{} scored {:.3} (rsi={}, macd_hist={}, trend={})",
            handle.scorer.name(),
            raw,
            features
                .rsi
                .map(|v| format!("{:.1}", v))
                .unwrap_or_else(|| "n/a".to_string()),
            features
                .macd_hist
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "n/a".to_string()),
            features
                .sma_trend()
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "n/a".to_string()),
        );

        PredictionResult {
            symbol: model_id.to_string(),
            action,
            confidence,
            target_price,
            stop_loss,
            reasoning,
            timestamp: Utc::now(),
            model_version: handle.version,
        }
    }
}
