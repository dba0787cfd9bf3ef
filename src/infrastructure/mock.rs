use crate::domain::ports::DataProvider;
use crate::domain::types::{Candle, FeatureSet, Timeframe};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::features::compute_features;

/// Deterministic synthetic market data. The price path for a symbol is
/// seeded from the symbol name, so repeated fetches see the same series
/// and tests can rely on stable features.
pub struct MockDataProvider {
    base_price: f64,
    daily_vol: f64,
}

impl MockDataProvider {
    pub fn new() -> Self {
        Self {
            base_price: 100.0,
            daily_vol: 0.02,
        }
    }

    fn seed_for(symbol: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        symbol.hash(&mut hasher);
        hasher.finish()
    }
}

impl Default for MockDataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataProvider for MockDataProvider {
    async fn fetch_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        if limit == 0 {
            return Err(anyhow!("limit must be positive"));
        }
        let symbol = symbol.trim().to_uppercase();
        let mut rng = StdRng::seed_from_u64(Self::seed_for(&symbol));
        // Symbols hash to different but stable starting prices
        let mut price = self.base_price * (1.0 + rng.random_range(0.0..4.0));
        let step_vol = self.daily_vol * (timeframe.to_minutes() as f64 / 1440.0).sqrt();

        let end = Utc::now();
        let mut candles = Vec::with_capacity(limit);
        for i in 0..limit {
            let drift = rng.random_range(-step_vol..step_vol);
            let open = price;
            let close = (open * (1.0 + drift)).max(0.01);
            let high = open.max(close) * (1.0 + rng.random_range(0.0..step_vol / 2.0));
            let low = open.min(close) * (1.0 - rng.random_range(0.0..step_vol / 2.0));
            let volume = rng.random_range(10_000.0..1_000_000.0);
            candles.push(Candle {
                symbol: symbol.clone(),
                open,
                high,
                low,
                close,
                volume,
                timestamp: end - Duration::seconds(timeframe.to_seconds() * (limit - i) as i64),
            });
            price = close;
        }
        Ok(candles)
    }

    async fn fetch_indicators(&self, symbol: &str, timeframe: Timeframe) -> Result<FeatureSet> {
        let candles = self.fetch_series(symbol, timeframe, 200).await?;
        compute_features(&candles, timeframe)
            .ok_or_else(|| anyhow!("series too short to compute indicators for {}", symbol))
    }
}
