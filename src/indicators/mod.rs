//! Indicator Engine - Technical indicators over the candle close series
//!
//! Computes series aligned index-for-index with the candles they were
//! derived from:
//! - SMA(20): arithmetic mean of the trailing 20 closes
//! - EMA(12) / EMA(26): seeded with the first close, k = 2 / (period + 1)
//! - RSI(14): simple average of the trailing 14 close-to-close gains/losses
//!
//! Entries without enough history are `None`, never a placeholder value.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::types::Candle;

pub const SMA_PERIOD: usize = 20;
pub const EMA_FAST_PERIOD: usize = 12;
pub const EMA_SLOW_PERIOD: usize = 26;
pub const RSI_PERIOD: usize = 14;

/// Indicator values aligned with a candle series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSeries {
    pub sma20: Vec<Option<f64>>,
    pub ema12: Vec<Option<f64>>,
    pub ema26: Vec<Option<f64>>,
    pub rsi14: Vec<Option<f64>>,
}

/// Most recent value of each indicator
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub sma20: Option<f64>,
    pub ema12: Option<f64>,
    pub ema26: Option<f64>,
    pub rsi14: Option<f64>,
}

impl IndicatorSeries {
    pub fn from_closes(closes: &[f64]) -> Self {
        Self {
            sma20: sma(closes, SMA_PERIOD),
            ema12: ema(closes, EMA_FAST_PERIOD),
            ema26: ema(closes, EMA_SLOW_PERIOD),
            rsi14: rsi(closes, RSI_PERIOD),
        }
    }

    pub fn from_candles(candles: &[Candle]) -> Self {
        Self::from_closes(&closes(candles))
    }

    pub fn len(&self) -> usize {
        self.sma20.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sma20.is_empty()
    }

    /// Values at the newest candle
    pub fn latest(&self) -> IndicatorSnapshot {
        let last = |series: &[Option<f64>]| series.last().copied().flatten();
        IndicatorSnapshot {
            sma20: last(&self.sma20),
            ema12: last(&self.ema12),
            ema26: last(&self.ema26),
            rsi14: last(&self.rsi14),
        }
    }
}

/// Close prices as f64
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .map(|c| c.close.to_f64().unwrap_or_default())
        .collect()
}

/// Simple moving average; `None` for indices below `period - 1`
pub fn sma(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return out;
    }
    for (offset, window) in closes.windows(period).enumerate() {
        out[offset + period - 1] = Some(window.iter().sum::<f64>() / period as f64);
    }
    out
}

/// Exponential moving average seeded with the first close.
///
/// The recursion runs from index 0 so values match a seeded EMA, but
/// entries below `period - 1` are reported as `None`.
pub fn ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(closes.len());
    if period == 0 {
        out.resize(closes.len(), None);
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut value = 0.0;
    for (i, close) in closes.iter().enumerate() {
        value = if i == 0 {
            *close
        } else {
            close * k + value * (1.0 - k)
        };
        out.push(if i + 1 >= period { Some(value) } else { None });
    }
    out
}

/// Relative strength index over the trailing `period` close-to-close deltas.
///
/// Zero average loss yields 100, constant prices included.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    for i in period..closes.len() {
        // deltas[j - 1] is closes[j] - closes[j - 1]
        let window = &deltas[i - period..i];
        let gains: f64 = window.iter().filter(|d| **d > 0.0).sum();
        let losses: f64 = window.iter().filter(|d| **d < 0.0).map(|d| d.abs()).sum();
        let avg_gain = gains / period as f64;
        let avg_loss = losses / period as f64;

        let value = if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };
        out[i] = Some(value.clamp(0.0, 100.0));
    }
    out
}
