//! Price Series Aggregator - Retained samples, candles and indicators per instrument

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

use crate::error::{AnalyticsError, Result};
use crate::indicators::IndicatorSeries;
use crate::types::{Candle, InstrumentId, PriceSample, Timeframe};

use super::candles::CandleBuilder;

/// Aggregator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// How long raw samples are kept, relative to the newest sample (ms)
    pub retention_ms: i64,
    /// Number of candles returned to readers
    pub max_candles: usize,
    /// Initial bucketing interval
    pub timeframe: Timeframe,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            retention_ms: 24 * 60 * 60 * 1000, // 24h
            max_candles: 100,
            timeframe: Timeframe::Min5,
        }
    }
}

/// Retained window and candles for a single instrument
#[derive(Debug, Clone)]
struct InstrumentSeries {
    /// Samples in ascending timestamp order
    samples: VecDeque<PriceSample>,
    candles: CandleBuilder,
}

impl InstrumentSeries {
    fn new(timeframe: Timeframe) -> Self {
        Self {
            samples: VecDeque::new(),
            candles: CandleBuilder::new(timeframe),
        }
    }

    fn newest_ts(&self) -> Option<i64> {
        self.samples.back().map(|s| s.ts)
    }
}

/// Buckets price samples into candles and derives indicators
pub struct PriceSeriesAggregator {
    config: SeriesConfig,
    series: HashMap<InstrumentId, InstrumentSeries>,
}

impl PriceSeriesAggregator {
    pub fn new(config: SeriesConfig) -> Self {
        Self {
            config,
            series: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Record a sample; returns the candle it completed, if any.
    ///
    /// Non-positive prices are rejected without touching state. Samples that
    /// are already older than the retention window are dropped.
    pub fn record_sample(
        &mut self,
        instrument: &InstrumentId,
        sample: PriceSample,
    ) -> Result<Option<Candle>> {
        if sample.price <= Decimal::ZERO {
            warn!(%instrument, price = %sample.price, "Rejected non-positive price sample");
            return Err(AnalyticsError::InvalidSample {
                price: sample.price,
            });
        }

        let timeframe = self.config.timeframe;
        let retention_ms = self.config.retention_ms;
        let series = self
            .series
            .entry(instrument.clone())
            .or_insert_with(|| InstrumentSeries::new(timeframe));

        let completed = match series.newest_ts() {
            Some(newest) if sample.ts < newest => {
                if newest - sample.ts >= retention_ms {
                    debug!(%instrument, ts = sample.ts, "Dropped sample outside retention window");
                    return Ok(None);
                }
                // Out-of-order: keep samples sorted and rebuild the candles
                let idx = series.samples.partition_point(|s| s.ts <= sample.ts);
                series.samples.insert(idx, sample);
                series.candles.rebuild(&series.samples);
                None
            }
            _ => {
                series.samples.push_back(sample);
                series.candles.push(&sample)
            }
        };

        // Enforce the retention horizon against the newest sample
        let newest = series.newest_ts().unwrap_or(sample.ts);
        let mut evicted = 0usize;
        while series
            .samples
            .front()
            .map_or(false, |s| newest - s.ts >= retention_ms)
        {
            series.samples.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            series.candles.evict_before(&series.samples);
        }

        debug!(
            %instrument,
            ts = sample.ts,
            price = %sample.price,
            retained = series.samples.len(),
            evicted,
            "Sample recorded"
        );

        Ok(completed)
    }

    /// Switch the bucketing interval and re-aggregate every instrument
    pub fn set_timeframe(&mut self, timeframe: Timeframe) {
        if timeframe == self.config.timeframe {
            return;
        }
        info!(from = %self.config.timeframe, to = %timeframe, "Switching candle timeframe");
        self.config.timeframe = timeframe;
        for series in self.series.values_mut() {
            series.candles.set_timeframe(timeframe, &series.samples);
        }
    }

    /// Parse and apply a timeframe label such as "15m"
    pub fn set_timeframe_str(&mut self, label: &str) -> Result<()> {
        let timeframe: Timeframe = label.parse()?;
        self.set_timeframe(timeframe);
        Ok(())
    }

    pub fn timeframe(&self) -> Timeframe {
        self.config.timeframe
    }

    /// Last `max_candles` candles, chronologically ascending
    pub fn candles(&self, instrument: &InstrumentId) -> Vec<Candle> {
        self.series
            .get(instrument)
            .map(|s| s.candles.last_n(self.config.max_candles))
            .unwrap_or_default()
    }

    /// Indicators aligned with `candles(instrument)`
    pub fn indicators(&self, instrument: &InstrumentId) -> IndicatorSeries {
        IndicatorSeries::from_candles(&self.candles(instrument))
    }

    /// Percentage change from the first to the last candle close
    /// Change from the first to the last close, 0 when it cannot be represented
    pub fn price_change_pct(&self, instrument: &InstrumentId) -> Decimal {
        let candles = self.candles(instrument);
        match (candles.first(), candles.last()) {
            (Some(first), Some(last)) if candles.len() >= 2 && !first.close.is_zero() => {
                last.close
                    .checked_sub(first.close)
                    .and_then(|delta| delta.checked_div(first.close))
                    .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                    .unwrap_or(Decimal::ZERO)
            }
            _ => Decimal::ZERO,
        }
    }

    pub fn high_24h(&self, instrument: &InstrumentId) -> Decimal {
        let candles = self.candles(instrument);
        if candles.len() < 2 {
            return Decimal::ZERO;
        }
        candles
            .iter()
            .map(|c| c.high)
            .max()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn low_24h(&self, instrument: &InstrumentId) -> Decimal {
        let candles = self.candles(instrument);
        if candles.len() < 2 {
            return Decimal::ZERO;
        }
        candles
            .iter()
            .map(|c| c.low)
            .min()
            .unwrap_or(Decimal::ZERO)
    }

    /// Most recent retained price
    pub fn latest_price(&self, instrument: &InstrumentId) -> Option<Decimal> {
        self.series
            .get(instrument)
            .and_then(|s| s.samples.back())
            .map(|s| s.price)
    }

    /// Last `n` raw samples, oldest first
    pub fn recent_samples(&self, instrument: &InstrumentId, n: usize) -> Vec<PriceSample> {
        self.series
            .get(instrument)
            .map(|s| {
                let skip = s.samples.len().saturating_sub(n);
                s.samples.iter().skip(skip).copied().collect()
            })
            .unwrap_or_default()
    }

    pub fn sample_count(&self, instrument: &InstrumentId) -> usize {
        self.series
            .get(instrument)
            .map_or(0, |s| s.samples.len())
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        let mut ids: Vec<InstrumentId> = self.series.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }
}

impl Default for PriceSeriesAggregator {
    fn default() -> Self {
        Self::new(SeriesConfig::default())
    }
}
