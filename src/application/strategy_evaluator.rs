use crate::domain::errors::StrategyError;
use crate::domain::ports::{AggregationPolicy, StrategyAggregate};
use crate::domain::types::{
    Action, PredictionRequest, Recommendation, StrategyResult, Timeframe,
};
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::coordinator::InferenceCoordinator;

/// Caller-supplied tuning for one evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Position weight per symbol; missing symbols get an equal share
    #[serde(default)]
    pub weights: HashMap<String, f64>,
}

/// Combines per-symbol predictions into a portfolio-level recommendation
/// set. Per-symbol failures degrade that entry only; the whole call fails
/// only when every symbol fails.
pub struct StrategyEvaluator {
    coordinator: Arc<InferenceCoordinator>,
    policies: HashMap<String, Arc<dyn AggregationPolicy>>,
    default_policy: Arc<dyn AggregationPolicy>,
    /// Bound on in-flight per-symbol lookups during fan-out
    max_concurrent: usize,
}

impl StrategyEvaluator {
    pub fn new(coordinator: Arc<InferenceCoordinator>, max_concurrent: usize) -> Self {
        let default_policy: Arc<dyn AggregationPolicy> = Arc::new(WeightedAveragePolicy);
        let mut policies: HashMap<String, Arc<dyn AggregationPolicy>> = HashMap::new();
        policies.insert("balanced".to_string(), default_policy.clone());
        policies.insert("conservative".to_string(), Arc::new(ConservativePolicy));
        Self {
            coordinator,
            policies,
            default_policy,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Registers a combination policy under a strategy type name
    pub fn register_policy(&mut self, name: impl Into<String>, policy: Arc<dyn AggregationPolicy>) {
        self.policies.insert(name.into(), policy);
    }

    pub async fn evaluate(
        &self,
        symbols: &[String],
        strategy_type: &str,
        timeframe: Timeframe,
        params: Option<StrategyParams>,
    ) -> Result<StrategyResult, StrategyError> {
        if symbols.is_empty() {
            return Err(StrategyError::Unavailable { attempted: 0 });
        }
        let params = params.unwrap_or_default();
        let equal_weight = 1.0 / symbols.len() as f64;

        // Ordered, bounded fan-out: `buffered` preserves input order while
        // capping in-flight lookups.
        let outcomes: Vec<Recommendation> = futures::stream::iter(symbols.iter().map(|symbol| {
            let symbol = symbol.clone();
            let weight = params
                .weights
                .get(&symbol.to_uppercase())
                .copied()
                .unwrap_or(equal_weight);
            async move {
                match self
                    .coordinator
                    .predict(PredictionRequest::new(symbol.clone(), timeframe))
                    .await
                {
                    Ok(result) => Recommendation::Signal {
                        symbol: result.symbol,
                        action: result.action,
                        confidence: result.confidence,
                        weight,
                        model_version: result.model_version,
                    },
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "Symbol prediction degraded");
                        Recommendation::Degraded {
                            symbol: symbol.to_uppercase(),
                            reason: e.to_string(),
                        }
                    }
                }
            }
        }))
        .buffered(self.max_concurrent)
        .collect()
        .await;

        if outcomes.iter().all(|r| r.is_degraded()) {
            return Err(StrategyError::Unavailable {
                attempted: symbols.len(),
            });
        }

        let policy = self
            .policies
            .get(strategy_type)
            .unwrap_or(&self.default_policy);
        let aggregate = policy.combine(&outcomes);
        debug!(
            strategy_type,
            policy = policy.name(),
            risk = aggregate.risk_score,
            expected_return = aggregate.expected_return,
            "Strategy aggregated"
        );

        Ok(StrategyResult {
            strategy_id: Uuid::new_v4(),
            strategy_type: strategy_type.to_string(),
            recommendations: outcomes,
            risk_score: aggregate.risk_score.clamp(0.0, 1.0),
            expected_return: aggregate.expected_return,
            timestamp: Utc::now(),
        })
    }
}

/// Expected move per entry, signed by action, used by the stock policies
fn signed_return(action: Action, confidence: f64) -> f64 {
    match action {
        Action::Buy => confidence,
        Action::Sell => -confidence,
        Action::Hold => 0.0,
    }
}

/// Weighted average by position weight; degraded entries count as
/// maximum-uncertainty positions.
pub struct WeightedAveragePolicy;

impl AggregationPolicy for WeightedAveragePolicy {
    fn name(&self) -> &str {
        "weighted_average"
    }

    fn combine(&self, recommendations: &[Recommendation]) -> StrategyAggregate {
        let mut total_weight = 0.0;
        let mut risk = 0.0;
        let mut expected = 0.0;
        for rec in recommendations {
            match rec {
                Recommendation::Signal {
                    action,
                    confidence,
                    weight,
                    ..
                } => {
                    total_weight += weight;
                    risk += weight * (1.0 - confidence);
                    expected += weight * signed_return(*action, *confidence) * 0.05;
                }
                Recommendation::Degraded { .. } => {
                    // No signal: full uncertainty at an equal-share weight
                    let weight = 1.0 / recommendations.len() as f64;
                    total_weight += weight;
                    risk += weight;
                }
            }
        }
        if total_weight <= 0.0 {
            return StrategyAggregate {
                risk_score: 1.0,
                expected_return: 0.0,
            };
        }
        StrategyAggregate {
            risk_score: risk / total_weight,
            expected_return: expected / total_weight,
        }
    }
}

/// Like the weighted average but haircuts returns and inflates risk,
/// for capital-preservation strategy types.
pub struct ConservativePolicy;

impl AggregationPolicy for ConservativePolicy {
    fn name(&self) -> &str {
        "conservative"
    }

    fn combine(&self, recommendations: &[Recommendation]) -> StrategyAggregate {
        let base = WeightedAveragePolicy.combine(recommendations);
        StrategyAggregate {
            risk_score: (base.risk_score * 1.25).min(1.0),
            expected_return: base.expected_return * 0.5,
        }
    }
}
