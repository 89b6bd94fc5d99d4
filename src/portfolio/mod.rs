//! Portfolio module - Cost-basis accounting over confirmed trades
//!
//! Positions use average-cost accounting: buys blend into the average
//! cost, sells realize `proceeds - amount * avg_cost`. Everything is a pure
//! function of the recorded trades, so replaying the same trades into a
//! fresh ledger reproduces positions and statistics exactly.

mod ledger;
mod position;
mod stats;

pub use ledger::Ledger;
pub use position::{replay, ClosedTrade, Position, PositionView, Replay};
pub use stats::PortfolioStats;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::TradeRecord;

/// Trade annotated for history views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeView {
    #[serde(flatten)]
    pub trade: TradeRecord,
    /// amount * price
    pub notional_value: Decimal,
    /// Realized P&L for sells
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<Decimal>,
}

/// Exported ledger state; where it is stored is up to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub trades: Vec<TradeRecord>,
    pub positions: Vec<PositionView>,
    pub stats: PortfolioStats,
    pub exported_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
