use crate::domain::errors::RiskError;
use crate::domain::ports::DataProvider;
use crate::domain::types::{RiskLevel, RiskReport, Timeframe};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Annualization factor for daily log returns
const TRADING_DAYS: f64 = 252.0;

#[derive(Debug, Clone)]
pub struct RiskAssessorConfig {
    /// Bars used per symbol for the volatility estimate
    pub lookback_bars: usize,
    /// Annualized volatility that maps to risk_score 1.0
    pub max_volatility: f64,
}

impl Default for RiskAssessorConfig {
    fn default() -> Self {
        Self {
            lookback_bars: 30,
            max_volatility: 0.80,
        }
    }
}

/// Scores portfolio-level exposure from market data and position sizing.
/// Holds no mutable state: identical market data yields an identical
/// report, so concurrent invocation is trivially safe.
pub struct RiskAssessor {
    provider: Arc<dyn DataProvider>,
    config: RiskAssessorConfig,
}

impl RiskAssessor {
    pub fn new(provider: Arc<dyn DataProvider>, config: RiskAssessorConfig) -> Self {
        Self { provider, config }
    }

    pub async fn assess_portfolio(
        &self,
        symbols: &[String],
        portfolio_value: f64,
    ) -> Result<RiskReport, RiskError> {
        if symbols.is_empty() {
            return Err(RiskError::InvalidPortfolio {
                reason: "no symbols given".to_string(),
            });
        }
        if portfolio_value <= 0.0 || !portfolio_value.is_finite() {
            return Err(RiskError::InvalidPortfolio {
                reason: format!("portfolio value must be positive, got {}", portfolio_value),
            });
        }

        // Equal position sizing across the given symbols
        let position_weight = 1.0 / symbols.len() as f64;
        let mut weighted_vol = 0.0;
        for symbol in symbols {
            let candles = self
                .provider
                .fetch_series(symbol, Timeframe::OneDay, self.config.lookback_bars)
                .await
                .map_err(|e| RiskError::UpstreamData {
                    symbol: symbol.clone(),
                    reason: e.to_string(),
                })?;
            let vol = annualized_volatility(candles.iter().map(|c| c.close));
            debug!(symbol = %symbol, volatility = vol, "Symbol volatility");
            weighted_vol += position_weight * vol;
        }

        let vol_component = (weighted_vol / self.config.max_volatility).clamp(0.0, 1.0);
        // Few positions concentrate exposure regardless of volatility
        let concentration = concentration_penalty(symbols.len());
        let risk_score = (0.75 * vol_component + 0.25 * concentration).clamp(0.0, 1.0);

        let risk_level = if risk_score < 0.35 {
            RiskLevel::Low
        } else if risk_score < 0.70 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        };

        let mut recommendations = Vec::new();
        if symbols.len() < 5 {
            recommendations.push(format!(
                "Portfolio holds only {} symbol(s); consider diversifying across sectors",
                symbols.len()
            ));
        }
        if vol_component > 0.6 {
            recommendations.push(
                "Average position volatility is elevated; consider reducing position sizes"
                    .to_string(),
            );
        }
        let per_position = portfolio_value * position_weight;
        recommendations.push(format!(
            "Equal-weight sizing allocates ${:.2} per position",
            per_position
        ));
        if risk_level == RiskLevel::High {
            recommendations
                .push("Overall risk is high; hedging or trimming exposure is advised".to_string());
        }

        Ok(RiskReport {
            risk_score,
            risk_level,
            recommendations,
            timestamp: Utc::now(),
        })
    }
}

fn concentration_penalty(positions: usize) -> f64 {
    // 1 position -> 1.0, 10+ positions -> 0.0
    (1.0 - (positions as f64 - 1.0) / 9.0).clamp(0.0, 1.0)
}

/// Annualized standard deviation of log returns over the series
fn annualized_volatility(closes: impl Iterator<Item = f64>) -> f64 {
    let closes: Vec<f64> = closes.filter(|c| *c > 0.0).collect();
    if closes.len() < 3 {
        return 0.0;
    }
    let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    variance.sqrt() * TRADING_DAYS.sqrt()
}
