//! Series module - Price sample aggregation
//!
//! Keeps a bounded window of raw price samples per instrument and derives
//! fixed-interval OHLCV candles and technical indicators from it.

mod aggregator;
mod candles;

pub use aggregator::{PriceSeriesAggregator, SeriesConfig};
pub use candles::CandleBuilder;
