use crate::domain::model::ScorerSpec;
use crate::domain::ports::ModelScorer;
use crate::domain::types::FeatureSet;
use std::sync::Arc;

/// Rebuilds a scorer from its persisted description
pub fn build_scorer(spec: &ScorerSpec) -> Arc<dyn ModelScorer> {
    match spec {
        ScorerSpec::Momentum { buy_rsi, sell_rsi } => Arc::new(MomentumScorer {
            buy_rsi: *buy_rsi,
            sell_rsi: *sell_rsi,
        }),
        ScorerSpec::Linear { weights, bias } => Arc::new(LinearScorer {
            weights: weights.clone(),
            bias: *bias,
        }),
    }
}

/// Rule-based technical baseline. Serves as the initial model for a
/// symbol before any fit has completed.
pub struct MomentumScorer {
    /// RSI at or below this is oversold (bullish)
    pub buy_rsi: f64,
    /// RSI at or above this is overbought (bearish)
    pub sell_rsi: f64,
}

impl Default for MomentumScorer {
    fn default() -> Self {
        Self {
            buy_rsi: 30.0,
            sell_rsi: 70.0,
        }
    }
}

impl ModelScorer for MomentumScorer {
    fn score(&self, features: &FeatureSet) -> Result<f64, String> {
        let mut score: f64 = 0.5;
        if let Some(rsi) = features.rsi {
            if rsi <= self.buy_rsi {
                score += 0.20;
            } else if rsi >= self.sell_rsi {
                score -= 0.20;
            }
        }
        if let Some(hist) = features.macd_hist {
            score += if hist > 0.0 { 0.15 } else { -0.15 };
        }
        if let Some(trend) = features.sma_trend() {
            score += if trend > 0.0 { 0.10 } else { -0.10 };
        }
        if let Some(momentum) = features.momentum {
            score += momentum.clamp(-0.05, 0.05);
        }
        Ok(score.clamp(0.0, 1.0))
    }

    fn name(&self) -> &str {
        "momentum-baseline"
    }

    fn spec(&self) -> ScorerSpec {
        ScorerSpec::Momentum {
            buy_rsi: self.buy_rsi,
            sell_rsi: self.sell_rsi,
        }
    }
}

/// Logistic model over the fixed feature vector, produced by the trainer
pub struct LinearScorer {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl ModelScorer for LinearScorer {
    fn score(&self, features: &FeatureSet) -> Result<f64, String> {
        let x = features.as_vector();
        if x.len() != self.weights.len() {
            return Err(format!(
                "feature vector length {} does not match weight length {}",
                x.len(),
                self.weights.len()
            ));
        }
        let z: f64 = self.bias + x.iter().zip(&self.weights).map(|(a, w)| a * w).sum::<f64>();
        Ok(sigmoid(z))
    }

    fn name(&self) -> &str {
        "linear-logistic"
    }

    fn spec(&self) -> ScorerSpec {
        ScorerSpec::Linear {
            weights: self.weights.clone(),
            bias: self.bias,
        }
    }
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
