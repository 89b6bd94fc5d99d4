//! Candle Builder - Buckets price samples into fixed-interval OHLCV candles
//!
//! Candles are derived from raw samples only. Appending a sample in the
//! newest interval updates the open candle in place; anything else (a new
//! timeframe, an out-of-order sample) goes through a full rebuild from the
//! retained samples so no candle is ever derived from another candle.

use rust_decimal::Decimal;
use std::collections::VecDeque;

use crate::types::{Candle, PriceSample, Timeframe};

/// Candle builder for a single instrument
#[derive(Debug, Clone)]
pub struct CandleBuilder {
    timeframe: Timeframe,
    /// Candles in ascending open_time order; the last one is still open
    candles: VecDeque<Candle>,
}

fn open_candle(timeframe: Timeframe, sample: &PriceSample) -> Candle {
    Candle {
        open_time: timeframe.interval_start(sample.ts),
        close_time: sample.ts,
        timeframe,
        open: sample.price,
        high: sample.price,
        low: sample.price,
        close: sample.price,
        volume: sample.volume.max(Decimal::ZERO),
        samples: 1,
    }
}

fn fold_sample(candle: &mut Candle, sample: &PriceSample) {
    candle.high = candle.high.max(sample.price);
    candle.low = candle.low.min(sample.price);
    candle.close = sample.price;
    candle.volume = candle
        .volume
        .checked_add(sample.volume.max(Decimal::ZERO))
        .unwrap_or(Decimal::MAX);
    candle.samples += 1;
    candle.close_time = sample.ts;
}

impl CandleBuilder {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            candles: VecDeque::new(),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Fold a sample that is not older than any sample seen so far.
    ///
    /// Returns the candle that was completed by this sample, if the sample
    /// opened a new interval.
    pub fn push(&mut self, sample: &PriceSample) -> Option<Candle> {
        let start = self.timeframe.interval_start(sample.ts);

        match self.candles.back_mut() {
            Some(current) if current.open_time == start => {
                fold_sample(current, sample);
                None
            }
            Some(current) => {
                debug_assert!(current.open_time < start, "push requires ordered samples");
                let completed = current.clone();
                self.candles.push_back(open_candle(self.timeframe, sample));
                Some(completed)
            }
            None => {
                self.candles.push_back(open_candle(self.timeframe, sample));
                None
            }
        }
    }

    /// Discard all candles and re-aggregate from ordered samples
    pub fn rebuild<'a>(&mut self, samples: impl IntoIterator<Item = &'a PriceSample>) {
        self.candles.clear();
        for sample in samples {
            self.push(sample);
        }
    }

    /// Switch interval and re-aggregate from the raw samples
    pub fn set_timeframe<'a>(
        &mut self,
        timeframe: Timeframe,
        samples: impl IntoIterator<Item = &'a PriceSample>,
    ) {
        self.timeframe = timeframe;
        self.rebuild(samples);
    }

    /// Resynchronize the oldest candles after samples left the retention
    /// window. `samples` is the remaining ordered sample set.
    pub fn evict_before(&mut self, samples: &VecDeque<PriceSample>) {
        let Some(oldest) = samples.front() else {
            self.candles.clear();
            return;
        };
        let timeframe = self.timeframe;
        let first_start = timeframe.interval_start(oldest.ts);

        while self
            .candles
            .front()
            .map_or(false, |c| c.open_time < first_start)
        {
            self.candles.pop_front();
        }

        // The first surviving bucket may have lost some of its samples
        if let Some(front) = self.candles.front_mut() {
            let mut bucket = samples
                .iter()
                .take_while(|s| timeframe.interval_start(s.ts) == first_start);
            if let Some(first) = bucket.next() {
                let mut candle = open_candle(timeframe, first);
                for sample in bucket {
                    fold_sample(&mut candle, sample);
                }
                *front = candle;
            }
        }
    }

    /// Last `n` candles (the open one included), chronologically ascending
    pub fn last_n(&self, n: usize) -> Vec<Candle> {
        let skip = self.candles.len().saturating_sub(n);
        self.candles.iter().skip(skip).cloned().collect()
    }

    /// Get current open candle
    pub fn current(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(ts: i64, price: Decimal) -> PriceSample {
        PriceSample::new(ts, price)
    }

    #[test]
    fn test_candle_building() {
        let mut builder = CandleBuilder::new(Timeframe::Min15);
        // 1700000050000 = 2023-11-14 22:14:10 UTC (within 22:00-22:15 period)
        let base_ts = 1_700_000_050_000i64;

        builder.push(&sample(base_ts, dec!(50000)));
        builder.push(&sample(base_ts + 10_000, dec!(50100)));
        builder.push(&sample(base_ts + 20_000, dec!(49900)));

        let current = builder.current().unwrap();
        assert_eq!(current.open, dec!(50000));
        assert_eq!(current.high, dec!(50100));
        assert_eq!(current.low, dec!(49900));
        assert_eq!(current.close, dec!(49900));
        assert_eq!(current.samples, 3);
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_candle_completion() {
        let mut builder = CandleBuilder::new(Timeframe::Hour1);
        let base_ts = 1_700_000_000_000i64;

        builder.push(&sample(base_ts, dec!(3000)));
        let completed = builder.push(&sample(base_ts + 3_600_000, dec!(3100)));

        let candle = completed.expect("new interval completes the previous candle");
        assert_eq!(candle.open, dec!(3000));
        assert_eq!(candle.close, dec!(3000));
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_set_timeframe_reaggregates_from_samples() {
        let base_ts = Timeframe::Hour1.interval_start(1_700_000_000_000);
        let samples: Vec<PriceSample> = (0..12)
            .map(|i| sample(base_ts + i * 5 * 60_000, Decimal::from(100 + i)))
            .collect();

        let mut builder = CandleBuilder::new(Timeframe::Min5);
        builder.rebuild(&samples);
        assert_eq!(builder.len(), 12);

        builder.set_timeframe(Timeframe::Hour1, &samples);
        assert_eq!(builder.len(), 1);
        let hourly = builder.current().unwrap();
        assert_eq!(hourly.open, dec!(100));
        assert_eq!(hourly.close, dec!(111));
        assert_eq!(hourly.high, dec!(111));
        assert_eq!(hourly.low, dec!(100));
    }

    #[test]
    fn test_evict_recomputes_partial_bucket() {
        let base_ts = Timeframe::Min5.interval_start(1_700_000_000_000);
        let mut samples: VecDeque<PriceSample> = VecDeque::new();
        samples.push_back(sample(base_ts, dec!(10)));
        samples.push_back(sample(base_ts + 60_000, dec!(12)));
        samples.push_back(sample(base_ts + 300_000, dec!(11)));

        let mut builder = CandleBuilder::new(Timeframe::Min5);
        builder.rebuild(&samples);
        assert_eq!(builder.last_n(10)[0].high, dec!(12));

        samples.pop_front();
        builder.evict_before(&samples);
        let candles = builder.last_n(10);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, dec!(12));

        samples.pop_front();
        builder.evict_before(&samples);
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_last_n_is_chronological() {
        let mut builder = CandleBuilder::new(Timeframe::Min1);
        for i in 0..5 {
            builder.push(&sample(i * 60_000, Decimal::from(i + 1)));
        }
        let last = builder.last_n(3);
        assert_eq!(last.len(), 3);
        assert!(last.windows(2).all(|w| w[0].open_time < w[1].open_time));
        assert_eq!(last[2].close, dec!(5));
    }
}
