//! dexmetrics Library
//!
//! Quantitative analytics for DEX trading: candle series with technical
//! indicators, slippage recommendations and an average-cost portfolio ledger.

pub mod alerts;
pub mod cache;
pub mod config;
pub mod error;
pub mod indicators;
pub mod orders;
pub mod pool;
pub mod portfolio;
pub mod risk;
pub mod series;
pub mod session;
pub mod types;

pub use error::{AnalyticsError, Result};
pub use session::{AnalyticsSession, SessionConfig};
