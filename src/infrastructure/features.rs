use crate::domain::types::{Candle, FeatureSet, Timeframe};
use ta::Next;
use ta::indicators::{
    AverageTrueRange, BollingerBands, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
    SimpleMovingAverage,
};

const MOMENTUM_LOOKBACK: usize = 10;
const VOLATILITY_WINDOW: usize = 20;

/// Streams a candle series through the standard indicator set and keeps
/// the final values. Returns None when the series is too short to say
/// anything at all.
pub fn compute_features(candles: &[Candle], timeframe: Timeframe) -> Option<FeatureSet> {
    feature_series(candles, timeframe).pop()
}

/// Per-bar feature sets over the whole series, one entry per candle
/// (in order). Used by the trainer to build its dataset and by
/// `compute_features` for the live view.
pub fn feature_series(candles: &[Candle], timeframe: Timeframe) -> Vec<FeatureSet> {
    if candles.len() < 2 {
        return Vec::new();
    }

    // Indicator periods are the conventional defaults; callers that want
    // different ones plug in their own scorer instead.
    let (Ok(mut rsi), Ok(mut macd), Ok(mut sma_20), Ok(mut sma_50), Ok(mut bb), Ok(mut atr)) = (
        RelativeStrengthIndex::new(14),
        MovingAverageConvergenceDivergence::new(12, 26, 9),
        SimpleMovingAverage::new(20),
        SimpleMovingAverage::new(50),
        BollingerBands::new(20, 2.0),
        AverageTrueRange::new(14),
    ) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(candles.len());
    for (i, candle) in candles.iter().enumerate() {
        let price = candle.close;
        let macd_out = macd.next(price);
        let bb_out = bb.next(price);
        out.push(FeatureSet {
            last_price: Some(price),
            rsi: Some(rsi.next(price)),
            macd_line: Some(macd_out.macd),
            macd_signal: Some(macd_out.signal),
            macd_hist: Some(macd_out.histogram),
            sma_20: Some(sma_20.next(price)),
            sma_50: Some(sma_50.next(price)),
            bb_upper: Some(bb_out.upper),
            bb_middle: Some(bb_out.average),
            bb_lower: Some(bb_out.lower),
            atr: Some(atr.next(price)),
            momentum: momentum_at(candles, i),
            realized_volatility: realized_volatility(&candles[i.saturating_sub(VOLATILITY_WINDOW)..=i]),
            timeframe: Some(timeframe),
        });
    }
    out
}

fn momentum_at(candles: &[Candle], index: usize) -> Option<f64> {
    if index < MOMENTUM_LOOKBACK {
        return None;
    }
    let past = candles[index - MOMENTUM_LOOKBACK].close;
    if past <= 0.0 {
        return None;
    }
    Some(candles[index].close / past - 1.0)
}

/// Per-bar standard deviation of log returns (not annualized)
fn realized_volatility(candles: &[Candle]) -> Option<f64> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).filter(|c| *c > 0.0).collect();
    if closes.len() < 3 {
        return None;
    }
    let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    Some(variance.sqrt())
}
