//! Error types for the analytics core
//!
//! Every fallible operation returns [`AnalyticsError`]; a rejected input never
//! leaves partial state behind.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::InstrumentId;

/// Validation failures raised at the core's call boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsError {
    /// Price sample with a non-positive price
    #[error("Invalid sample: price must be positive, got {price}")]
    InvalidSample { price: Decimal },

    /// Malformed trade: non-positive amount or price, negative fee, empty or
    /// duplicate id, or a notional outside the decimal range
    #[error("Invalid trade: {0}")]
    InvalidTrade(String),

    /// Unrecognized candle interval
    #[error("Invalid timeframe '{0}' (expected one of 1m, 5m, 15m, 1h, 4h, 1d)")]
    InvalidTimeframe(String),

    /// Sell larger than the base amount held at that point of the replay
    #[error("Insufficient position in {instrument}: selling {requested} with {available} held")]
    InsufficientPosition {
        instrument: InstrumentId,
        requested: Decimal,
        available: Decimal,
    },

    /// Alert id not present in the alert book
    #[error("Unknown alert: {0}")]
    UnknownAlert(String),

    /// Order id not present in the order book
    #[error("Unknown order: {0}")]
    UnknownOrder(String),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
