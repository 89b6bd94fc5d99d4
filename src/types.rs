//! Core types used throughout dexmetrics
//!
//! Defines the plain data exchanged with the core: price samples, candles,
//! trade records and the timeframe/side enums.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnalyticsError;

/// Identifier of a traded instrument (e.g. a pool pair such as "flow-usdc")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for InstrumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supported candle intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::Min5
    }
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::Min1,
        Timeframe::Min5,
        Timeframe::Min15,
        Timeframe::Hour1,
        Timeframe::Hour4,
        Timeframe::Day1,
    ];

    /// Get duration in seconds
    pub fn duration_secs(&self) -> i64 {
        match self {
            Timeframe::Min1 => 60,
            Timeframe::Min5 => 5 * 60,
            Timeframe::Min15 => 15 * 60,
            Timeframe::Hour1 => 60 * 60,
            Timeframe::Hour4 => 4 * 60 * 60,
            Timeframe::Day1 => 24 * 60 * 60,
        }
    }

    /// Get duration in milliseconds
    pub fn duration_ms(&self) -> i64 {
        self.duration_secs() * 1000
    }

    /// Start of the interval containing `ts` (Unix ms)
    pub fn interval_start(&self, ts: i64) -> i64 {
        let len = self.duration_ms();
        ts.div_euclid(len) * len
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min5 => "5m",
            Timeframe::Min15 => "15m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
        }
    }
}

impl FromStr for Timeframe {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" | "1min" => Ok(Timeframe::Min1),
            "5m" | "5min" => Ok(Timeframe::Min5),
            "15m" | "15min" => Ok(Timeframe::Min15),
            "1h" | "1hour" => Ok(Timeframe::Hour1),
            "4h" | "4hour" => Ok(Timeframe::Hour4),
            "1d" | "1day" => Ok(Timeframe::Day1),
            _ => Err(AnalyticsError::InvalidTimeframe(s.to_string())),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Trade direction from the base asset's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl FromStr for Side {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(AnalyticsError::InvalidTrade(format!("unknown side '{other}'"))),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Observed price at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Timestamp in milliseconds
    pub ts: i64,
    /// Observed price
    pub price: Decimal,
    /// Traded volume attributed to this observation (zero for pure quotes)
    #[serde(default)]
    pub volume: Decimal,
}

impl PriceSample {
    pub fn new(ts: i64, price: Decimal) -> Self {
        Self {
            ts,
            price,
            volume: Decimal::ZERO,
        }
    }

    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = volume;
        self
    }
}

/// Candlestick data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time (start of interval, Unix ms)
    pub open_time: i64,
    /// Timestamp of the last sample folded into this candle
    pub close_time: i64,
    pub timeframe: Timeframe,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Volume in base currency
    pub volume: Decimal,
    /// Number of samples aggregated
    pub samples: u64,
}

/// Executed trade as confirmed by the ledger submission layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Trade ID
    pub id: String,
    pub instrument: InstrumentId,
    pub side: Side,
    /// Base amount, strictly positive
    pub amount: Decimal,
    /// Quote per base, strictly positive
    pub price: Decimal,
    /// Execution timestamp in milliseconds
    pub ts: i64,
    /// Fee paid in quote currency
    #[serde(default)]
    pub fee: Decimal,
    /// On-chain transaction reference, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
}

impl TradeRecord {
    /// Build a trade with a freshly generated id and no fee
    pub fn new(
        instrument: impl Into<InstrumentId>,
        side: Side,
        amount: Decimal,
        price: Decimal,
        ts: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instrument: instrument.into(),
            side,
            amount,
            price,
            ts,
            fee: Decimal::ZERO,
            external_ref: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_fee(mut self, fee: Decimal) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    /// Quote value of the trade (amount * price), saturating at `Decimal::MAX`
    pub fn notional(&self) -> Decimal {
        self.amount
            .checked_mul(self.price)
            .unwrap_or(Decimal::MAX)
    }
}
