use crate::domain::jobs::CancelToken;
use crate::domain::model::ModelHandle;
use crate::domain::ports::{DataProvider, ModelTrainer};
use crate::domain::types::Timeframe;
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::features::feature_series;
use super::scorers::{LinearScorer, sigmoid};

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Bars of history fetched per fit
    pub window: usize,
    /// Timeframe the fit runs on
    pub timeframe: Timeframe,
    pub epochs: usize,
    pub learning_rate: f64,
    /// Leading bars discarded while indicators warm up
    pub warmup_bars: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            window: 500,
            timeframe: Timeframe::OneDay,
            epochs: 200,
            learning_rate: 0.1,
            warmup_bars: 50,
        }
    }
}

/// Fits a logistic scorer on historical bars: features at bar t, label
/// "next close went up". Checks the cancellation token between the data
/// fetch and every training epoch, so a cancelled job stops promptly and
/// nothing it produced reaches the registry.
pub struct HistoricalTrainer {
    provider: Arc<dyn DataProvider>,
    config: TrainerConfig,
}

impl HistoricalTrainer {
    pub fn new(provider: Arc<dyn DataProvider>, config: TrainerConfig) -> Self {
        Self { provider, config }
    }
}

#[async_trait]
impl ModelTrainer for HistoricalTrainer {
    async fn train(
        &self,
        model_id: &str,
        version: u64,
        cancel: &CancelToken,
    ) -> Result<ModelHandle> {
        let candles = self
            .provider
            .fetch_series(model_id, self.config.timeframe, self.config.window)
            .await?;
        if cancel.is_cancelled() {
            bail!("cancelled");
        }

        let series = feature_series(&candles, self.config.timeframe);
        let warmup = self.config.warmup_bars.min(series.len());
        let mut rows: Vec<(Vec<f64>, f64)> = Vec::new();
        for t in warmup..series.len().saturating_sub(1) {
            let x = series[t].as_vector();
            let label = if candles[t + 1].close > candles[t].close {
                1.0
            } else {
                0.0
            };
            rows.push((x, label));
        }
        if rows.len() < 30 {
            bail!(
                "insufficient history for {}: {} usable bars",
                model_id,
                rows.len()
            );
        }

        let dims = rows[0].0.len();
        let mut weights = vec![0.0_f64; dims];
        let mut bias = 0.0_f64;
        let lr = self.config.learning_rate;
        let n = rows.len() as f64;

        for epoch in 0..self.config.epochs {
            if cancel.is_cancelled() {
                bail!("cancelled");
            }
            let mut grad_w = vec![0.0_f64; dims];
            let mut grad_b = 0.0_f64;
            for (x, label) in &rows {
                let z = bias + x.iter().zip(&weights).map(|(a, w)| a * w).sum::<f64>();
                let err = sigmoid(z) - label;
                for (g, a) in grad_w.iter_mut().zip(x) {
                    *g += err * a;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= lr * g / n;
            }
            bias -= lr * grad_b / n;

            // Keep the worker cooperative during long fits
            if epoch % 16 == 0 {
                tokio::task::yield_now().await;
            }
        }

        let correct = rows
            .iter()
            .filter(|(x, label)| {
                let z = bias + x.iter().zip(&weights).map(|(a, w)| a * w).sum::<f64>();
                (sigmoid(z) >= 0.5) == (*label >= 0.5)
            })
            .count();
        let accuracy = correct as f64 / n;

        info!(
            model_id,
            version,
            samples = rows.len(),
            accuracy,
            "Fitted logistic scorer"
        );
        Ok(
            ModelHandle::ready(model_id, version, Arc::new(LinearScorer { weights, bias }))
                .with_accuracy(accuracy),
        )
    }
}
