//! Portfolio statistics across all instruments

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::TradeRecord;

use super::position::{percent_of, saturating_add, ClosedTrade, PositionView};

/// Aggregate account statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioStats {
    /// Market value of all open base holdings
    pub total_value: Decimal,
    pub total_realized_pnl: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    /// Total P&L relative to the open cost basis
    pub total_pnl_pct: Decimal,
    pub total_fees: Decimal,
    pub trade_count: usize,
    /// Sells (trades that realize P&L)
    pub closing_trades: usize,
    pub winning_trades: usize,
    /// Fraction of closing trades with positive realized P&L, in [0, 1]
    pub win_rate: Decimal,
    /// Mean notional value per trade
    pub avg_trade_size: Decimal,
    /// Largest single trade by notional value
    pub best_trade: Decimal,
    /// Smallest single trade by notional value
    pub worst_trade: Decimal,
}

impl PortfolioStats {
    pub fn compute<'a>(
        positions: &[PositionView],
        trades: &[TradeRecord],
        closed: impl IntoIterator<Item = &'a ClosedTrade>,
    ) -> Self {
        let mut stats = PortfolioStats::default();

        let mut open_cost_basis = Decimal::ZERO;
        for view in positions {
            stats.total_value = saturating_add(stats.total_value, view.market_value);
            stats.total_realized_pnl =
                saturating_add(stats.total_realized_pnl, view.position.realized_pnl);
            stats.total_unrealized_pnl =
                saturating_add(stats.total_unrealized_pnl, view.unrealized_pnl);
            open_cost_basis = saturating_add(open_cost_basis, view.cost_basis);
        }
        stats.total_pnl = saturating_add(stats.total_realized_pnl, stats.total_unrealized_pnl);
        if open_cost_basis > Decimal::ZERO {
            stats.total_pnl_pct = percent_of(stats.total_pnl, open_cost_basis);
        }

        stats.trade_count = trades.len();
        stats.total_fees = trades
            .iter()
            .fold(Decimal::ZERO, |total, t| saturating_add(total, t.fee));
        let notionals: Vec<Decimal> = trades.iter().map(TradeRecord::notional).collect();
        if !notionals.is_empty() {
            let total = notionals
                .iter()
                .fold(Decimal::ZERO, |total, n| saturating_add(total, *n));
            stats.avg_trade_size = total / Decimal::from(notionals.len());
            stats.best_trade = notionals.iter().copied().max().unwrap_or_default();
            stats.worst_trade = notionals.iter().copied().min().unwrap_or_default();
        }

        for close in closed {
            stats.closing_trades += 1;
            if close.is_win() {
                stats.winning_trades += 1;
            }
        }
        if stats.closing_trades > 0 {
            stats.win_rate =
                Decimal::from(stats.winning_trades) / Decimal::from(stats.closing_trades);
        }

        stats
    }
}
