use crate::domain::jobs::CancelToken;
use crate::domain::model::{ModelHandle, PersistedModel, ScorerSpec};
use crate::domain::types::{Candle, FeatureSet, Recommendation, Timeframe};
use anyhow::Result;
use async_trait::async_trait;

// Need async_trait for async functions in traits
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Ordered (oldest first) series of at most `limit` bars
    async fn fetch_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    /// Current technical indicator set for a symbol
    async fn fetch_indicators(&self, symbol: &str, timeframe: Timeframe) -> Result<FeatureSet>;
}

/// Opaque scoring capability. Implementations are immutable once built;
/// a retrain constructs a new scorer rather than mutating one in place.
pub trait ModelScorer: Send + Sync {
    /// Raw score in [0, 1]; > 0.5 leans Buy, < 0.5 leans Sell.
    /// The coordinator rejects non-finite values.
    fn score(&self, features: &FeatureSet) -> Result<f64, String>;

    fn name(&self) -> &str;

    /// Serializable description, enough to rebuild this scorer at startup
    fn spec(&self) -> ScorerSpec;
}

/// Produces a freshly trained model handle for one model id. Runs on the
/// retraining execution context, never on the request path.
#[async_trait]
pub trait ModelTrainer: Send + Sync {
    async fn train(&self, model_id: &str, version: u64, cancel: &CancelToken)
    -> Result<ModelHandle>;
}

/// Opaque key-value materialization layer for computed features
#[async_trait]
pub trait FeatureCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<FeatureSet>;
    async fn put(&self, key: String, features: FeatureSet);
}

/// Persistence for model identity/version/status so the registry can be
/// rehydrated after a restart. Storage format is the implementation's
/// concern.
#[async_trait]
pub trait ModelStateStore: Send + Sync {
    async fn load(&self) -> Result<Vec<PersistedModel>>;
    async fn save(&self, models: &[PersistedModel]) -> Result<()>;
}

/// Aggregate numbers a combination policy produces from per-symbol entries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyAggregate {
    pub risk_score: f64,
    pub expected_return: f64,
}

/// Pluggable combination policy for the strategy evaluator. Strategy
/// types select a policy; the evaluator's control flow never changes.
pub trait AggregationPolicy: Send + Sync {
    fn name(&self) -> &str;
    fn combine(&self, recommendations: &[Recommendation]) -> StrategyAggregate;
}
