use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents different timeframe intervals for market data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    FiveMin,
    FifteenMin,
    OneHour,
    FourHour,
    OneDay,
}

impl Timeframe {
    /// Returns the duration of this timeframe in minutes
    pub fn to_minutes(&self) -> usize {
        match self {
            Timeframe::OneMin => 1,
            Timeframe::FiveMin => 5,
            Timeframe::FifteenMin => 15,
            Timeframe::OneHour => 60,
            Timeframe::FourHour => 240,
            Timeframe::OneDay => 1440,
        }
    }

    pub fn to_seconds(&self) -> i64 {
        (self.to_minutes() * 60) as i64
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" | "1min" => Ok(Timeframe::OneMin),
            "5m" | "5min" => Ok(Timeframe::FiveMin),
            "15m" | "15min" => Ok(Timeframe::FifteenMin),
            "1h" | "1hour" => Ok(Timeframe::OneHour),
            "4h" | "4hour" => Ok(Timeframe::FourHour),
            "1d" | "1day" => Ok(Timeframe::OneDay),
            _ => Err(anyhow!("Invalid timeframe: {}", s)),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::OneMin => "1m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHour => "4h",
            Timeframe::OneDay => "1d",
        };
        write!(f, "{}", s)
    }
}

/// A single OHLCV bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

/// Technical features derived from a candle series. All fields optional:
/// a short series may not warm up every indicator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    pub last_price: Option<f64>,
    pub rsi: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub atr: Option<f64>,
    pub momentum: Option<f64>,
    pub realized_volatility: Option<f64>,
    pub timeframe: Option<Timeframe>,
}

impl FeatureSet {
    /// Fixed-order numeric view of the features, for scorers that consume
    /// a weight vector. Missing values are neutral-filled so the vector
    /// length is stable across symbols.
    pub fn as_vector(&self) -> Vec<f64> {
        vec![
            self.rsi.map(|v| v / 100.0).unwrap_or(0.5),
            self.macd_hist.unwrap_or(0.0),
            self.momentum.unwrap_or(0.0),
            self.realized_volatility.unwrap_or(0.0),
            self.bb_position().unwrap_or(0.5),
            self.sma_trend().unwrap_or(0.0),
        ]
    }

    /// Position of the last price inside the Bollinger band, 0 at the
    /// lower band and 1 at the upper band.
    pub fn bb_position(&self) -> Option<f64> {
        let price = self.last_price?;
        let upper = self.bb_upper?;
        let lower = self.bb_lower?;
        if upper <= lower {
            return None;
        }
        Some(((price - lower) / (upper - lower)).clamp(0.0, 1.0))
    }

    /// Relative distance of fast SMA over slow SMA
    pub fn sma_trend(&self) -> Option<f64> {
        let fast = self.sma_20?;
        let slow = self.sma_50?;
        if slow == 0.0 {
            return None;
        }
        Some((fast - slow) / slow)
    }
}

/// Recommended trading action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "buy"),
            Action::Sell => write!(f, "sell"),
            Action::Hold => write!(f, "hold"),
        }
    }
}

/// A single prediction request as received from the transport layer
#[derive(Debug, Clone)]
pub struct PredictionRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Caller-supplied features bypass the data provider entirely
    pub features: Option<FeatureSet>,
    pub arrived_at: DateTime<Utc>,
}

impl PredictionRequest {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            features: None,
            arrived_at: Utc::now(),
        }
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = Some(features);
        self
    }
}

/// Immutable outcome of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub symbol: String,
    pub action: Action,
    pub confidence: f64,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
    pub model_version: u64,
}

/// Per-symbol entry in a strategy result. A symbol whose prediction
/// failed is reported as Degraded rather than failing the whole strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Recommendation {
    Signal {
        symbol: String,
        action: Action,
        confidence: f64,
        weight: f64,
        model_version: u64,
    },
    Degraded {
        symbol: String,
        reason: String,
    },
}

impl Recommendation {
    pub fn symbol(&self) -> &str {
        match self {
            Recommendation::Signal { symbol, .. } => symbol,
            Recommendation::Degraded { symbol, .. } => symbol,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Recommendation::Degraded { .. })
    }
}

/// Portfolio-level outcome of a strategy evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    pub strategy_id: uuid::Uuid,
    pub strategy_type: String,
    pub recommendations: Vec<Recommendation>,
    pub risk_score: f64,
    pub expected_return: f64,
    pub timestamp: DateTime<Utc>,
}

/// Coarse portfolio risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of model states for the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub models: std::collections::HashMap<String, String>,
    pub last_updated: DateTime<Utc>,
    pub performance_metrics: std::collections::HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub service: String,
    pub version: String,
    pub models_loaded: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_parse_roundtrip() {
        for tf in ["1m", "5m", "15m", "1h", "4h", "1d"] {
            let parsed: Timeframe = tf.parse().unwrap();
            assert_eq!(parsed.to_string(), tf);
        }
        assert!("2w".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_bb_position_clamps() {
        let fs = FeatureSet {
            last_price: Some(120.0),
            bb_upper: Some(110.0),
            bb_lower: Some(90.0),
            ..Default::default()
        };
        assert_eq!(fs.bb_position(), Some(1.0));
    }

    #[test]
    fn test_feature_vector_stable_length() {
        let empty = FeatureSet::default();
        let full = FeatureSet {
            last_price: Some(100.0),
            rsi: Some(55.0),
            macd_hist: Some(0.2),
            sma_20: Some(101.0),
            sma_50: Some(99.0),
            bb_upper: Some(105.0),
            bb_lower: Some(95.0),
            momentum: Some(0.01),
            realized_volatility: Some(0.02),
            ..Default::default()
        };
        assert_eq!(empty.as_vector().len(), full.as_vector().len());
    }
}
