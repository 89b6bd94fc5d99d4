//! Average-cost position fold
//!
//! A position is never stored independently: it is the result of replaying
//! an instrument's trades in timestamp order. The fold is pure, so equal
//! trade lists always produce equal positions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::types::{InstrumentId, Side, TradeRecord};

/// Holdings derived from an instrument's trades
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: InstrumentId,
    /// Base asset held
    pub base_amount: Decimal,
    /// Amount-weighted average purchase price of the base held
    pub base_avg_cost: Decimal,
    /// Net quote flow (negative after buys, positive after sells)
    pub quote_amount: Decimal,
    /// Amount-weighted average price at which quote was received (sells)
    pub quote_avg_cost: Decimal,
    /// Total base sold so far
    pub sold_amount: Decimal,
    /// P&L locked in by sells, against the average cost at the time
    pub realized_pnl: Decimal,
}

/// Realized outcome of a single sell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade_id: String,
    pub amount: Decimal,
    pub avg_cost: Decimal,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub ts: i64,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.realized_pnl > Decimal::ZERO
    }
}

/// Result of replaying an instrument's trades
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    pub position: Position,
    /// One entry per sell, in replay order
    pub closed: Vec<ClosedTrade>,
    /// Price of the chronologically last trade
    pub last_trade_price: Option<Decimal>,
}

impl Position {
    pub fn empty(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            base_amount: Decimal::ZERO,
            base_avg_cost: Decimal::ZERO,
            quote_amount: Decimal::ZERO,
            quote_avg_cost: Decimal::ZERO,
            sold_amount: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    /// Cost basis of the open base holding, saturating at `Decimal::MAX`
    pub fn cost_basis(&self) -> Decimal {
        self.base_amount
            .checked_mul(self.base_avg_cost)
            .unwrap_or(Decimal::MAX)
    }

    pub fn is_flat(&self) -> bool {
        self.base_amount.is_zero()
    }

    /// Fold one trade; sells larger than the holding are rejected.
    ///
    /// Arithmetic that leaves the decimal range rejects the trade and leaves
    /// the position untouched.
    pub fn apply(&mut self, trade: &TradeRecord) -> Result<Option<ClosedTrade>> {
        let overflow = || {
            AnalyticsError::InvalidTrade(format!(
                "trade {} overflows the {} position",
                trade.id, self.instrument
            ))
        };
        let notional = trade.amount.checked_mul(trade.price).ok_or_else(overflow)?;
        match trade.side {
            Side::Buy => {
                let new_base = self.base_amount.checked_add(trade.amount).ok_or_else(overflow)?;
                let base_avg_cost = self
                    .base_avg_cost
                    .checked_mul(self.base_amount)
                    .and_then(|held| held.checked_add(notional))
                    .and_then(|cost| cost.checked_div(new_base))
                    .ok_or_else(overflow)?;
                let quote_amount = self.quote_amount.checked_sub(notional).ok_or_else(overflow)?;

                self.base_avg_cost = base_avg_cost;
                self.base_amount = new_base;
                self.quote_amount = quote_amount;
                Ok(None)
            }
            Side::Sell => {
                if trade.amount > self.base_amount {
                    return Err(AnalyticsError::InsufficientPosition {
                        instrument: self.instrument.clone(),
                        requested: trade.amount,
                        available: self.base_amount,
                    });
                }

                let avg_cost = self.base_avg_cost;
                let realized = trade
                    .amount
                    .checked_mul(avg_cost)
                    .and_then(|cost| notional.checked_sub(cost))
                    .ok_or_else(overflow)?;
                let realized_pnl = self.realized_pnl.checked_add(realized).ok_or_else(overflow)?;
                let quote_amount = self.quote_amount.checked_add(notional).ok_or_else(overflow)?;
                let sold = self.sold_amount.checked_add(trade.amount).ok_or_else(overflow)?;
                let quote_avg_cost = self
                    .quote_avg_cost
                    .checked_mul(self.sold_amount)
                    .and_then(|received| received.checked_add(notional))
                    .and_then(|received| received.checked_div(sold))
                    .ok_or_else(overflow)?;

                self.realized_pnl = realized_pnl;
                self.base_amount -= trade.amount;
                self.quote_amount = quote_amount;
                self.quote_avg_cost = quote_avg_cost;
                self.sold_amount = sold;

                if self.base_amount.is_zero() {
                    self.base_avg_cost = Decimal::ZERO;
                }

                Ok(Some(ClosedTrade {
                    trade_id: trade.id.clone(),
                    amount: trade.amount,
                    avg_cost,
                    exit_price: trade.price,
                    realized_pnl: realized,
                    ts: trade.ts,
                }))
            }
        }
    }
}

/// Replay trades for one instrument in ascending timestamp order.
///
/// Ties keep the order in which the trades were given.
pub fn replay<'a>(
    instrument: &InstrumentId,
    trades: impl IntoIterator<Item = &'a TradeRecord>,
) -> Result<Replay> {
    let mut ordered: Vec<&TradeRecord> = trades
        .into_iter()
        .filter(|t| &t.instrument == instrument)
        .collect();
    ordered.sort_by_key(|t| t.ts);

    let mut position = Position::empty(instrument.clone());
    let mut closed = Vec::new();
    for trade in &ordered {
        if let Some(close) = position.apply(trade)? {
            closed.push(close);
        }
    }

    Ok(Replay {
        position,
        closed,
        last_trade_price: ordered.last().map(|t| t.price),
    })
}

/// Position valued at a mark price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionView {
    #[serde(flatten)]
    pub position: Position,
    pub mark_price: Decimal,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    /// Total P&L relative to the open cost basis, 0 when nothing is open
    pub pnl_pct: Decimal,
}

impl PositionView {
    /// Values saturate at the decimal range; a percentage that cannot be
    /// represented reads as 0.
    pub fn new(position: Position, mark_price: Decimal) -> Self {
        let market_value = position
            .base_amount
            .checked_mul(mark_price)
            .unwrap_or(Decimal::MAX);
        let cost_basis = position.cost_basis();
        let unrealized_pnl = saturating_sub(market_value, cost_basis);
        let total_pnl = saturating_add(position.realized_pnl, unrealized_pnl);
        let pnl_pct = if cost_basis > Decimal::ZERO {
            percent_of(total_pnl, cost_basis)
        } else {
            Decimal::ZERO
        };
        Self {
            position,
            mark_price,
            market_value,
            cost_basis,
            unrealized_pnl,
            total_pnl,
            pnl_pct,
        }
    }
}

pub(crate) fn saturating_add(a: Decimal, b: Decimal) -> Decimal {
    a.checked_add(b)
        .unwrap_or(if b.is_sign_negative() { Decimal::MIN } else { Decimal::MAX })
}

pub(crate) fn saturating_sub(a: Decimal, b: Decimal) -> Decimal {
    a.checked_sub(b)
        .unwrap_or(if b.is_sign_negative() { Decimal::MAX } else { Decimal::MIN })
}

/// `part / whole * 100`, or 0 when the ratio leaves the decimal range
pub(crate) fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(side: Side, amount: Decimal, price: Decimal, ts: i64) -> TradeRecord {
        TradeRecord::new("flow-usdc", side, amount, price, ts).with_id(format!("t{ts}"))
    }

    fn id() -> InstrumentId {
        InstrumentId::new("flow-usdc")
    }

    #[test]
    fn test_buy_then_partial_sell() {
        let trades = vec![
            trade(Side::Buy, dec!(10), dec!(2.00), 1),
            trade(Side::Sell, dec!(4), dec!(3.00), 2),
        ];
        let replay = replay(&id(), &trades).unwrap();
        let pos = &replay.position;
        assert_eq!(pos.base_amount, dec!(6));
        assert_eq!(pos.base_avg_cost, dec!(2.00));
        assert_eq!(pos.realized_pnl, dec!(4.00));
        assert_eq!(pos.quote_amount, dec!(-8));
        assert_eq!(pos.quote_avg_cost, dec!(3));
        assert_eq!(replay.closed.len(), 1);
        assert!(replay.closed[0].is_win());
    }

    #[test]
    fn test_average_cost_blends_buys() {
        let trades = vec![
            trade(Side::Buy, dec!(10), dec!(1), 1),
            trade(Side::Buy, dec!(10), dec!(3), 2),
        ];
        let pos = replay(&id(), &trades).unwrap().position;
        assert_eq!(pos.base_amount, dec!(20));
        assert_eq!(pos.base_avg_cost, dec!(2));
        assert_eq!(pos.quote_amount, dec!(-40));
    }

    #[test]
    fn test_replay_orders_by_timestamp() {
        let trades = vec![
            trade(Side::Sell, dec!(5), dec!(4), 20),
            trade(Side::Buy, dec!(5), dec!(2), 10),
        ];
        let replay = replay(&id(), &trades).unwrap();
        assert!(replay.position.is_flat());
        assert_eq!(replay.position.realized_pnl, dec!(10));
        assert_eq!(replay.position.base_avg_cost, Decimal::ZERO);
        assert_eq!(replay.last_trade_price, Some(dec!(4)));
    }

    #[test]
    fn test_oversell_is_rejected() {
        let trades = vec![
            trade(Side::Buy, dec!(1), dec!(2), 1),
            trade(Side::Sell, dec!(2), dec!(2), 2),
        ];
        let err = replay(&id(), &trades).unwrap_err();
        assert_eq!(
            err,
            AnalyticsError::InsufficientPosition {
                instrument: id(),
                requested: dec!(2),
                available: dec!(1),
            }
        );
    }

    #[test]
    fn test_losing_close() {
        let trades = vec![
            trade(Side::Buy, dec!(2), dec!(5), 1),
            trade(Side::Sell, dec!(1), dec!(4), 2),
        ];
        let replay = replay(&id(), &trades).unwrap();
        assert_eq!(replay.closed[0].realized_pnl, dec!(-1));
        assert!(!replay.closed[0].is_win());
    }

    #[test]
    fn test_view_unrealized_and_pct() {
        let trades = vec![
            trade(Side::Buy, dec!(10), dec!(2.00), 1),
            trade(Side::Sell, dec!(4), dec!(3.00), 2),
        ];
        let pos = replay(&id(), &trades).unwrap().position;
        let view = PositionView::new(pos, dec!(2.50));
        assert_eq!(view.market_value, dec!(15));
        assert_eq!(view.cost_basis, dec!(12));
        assert_eq!(view.unrealized_pnl, dec!(3));
        assert_eq!(view.total_pnl, dec!(7));
        // 7 / 12 * 100
        assert_eq!(view.pnl_pct, dec!(7) / dec!(12) * dec!(100));

        let flat = PositionView::new(Position::empty(id()), dec!(2));
        assert_eq!(flat.pnl_pct, Decimal::ZERO);
    }

    #[test]
    fn test_overflowing_buy_is_rejected_without_side_effects() {
        let huge = dec!(100000000000000000000);
        let mut pos = Position::empty(id());
        let err = pos.apply(&trade(Side::Buy, huge, huge, 1)).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidTrade(_)));
        assert_eq!(pos, Position::empty(id()));

        // Each buy fits, but the second pushes the quote outflow past the range
        let big = dec!(100000000000000);
        pos.apply(&trade(Side::Buy, big, big, 2)).unwrap();
        let before = pos.clone();
        let err = pos
            .apply(&trade(Side::Buy, Decimal::MAX / big, big, 3))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidTrade(_)));
        assert_eq!(pos, before);
    }

    #[test]
    fn test_view_saturates_extreme_marks() {
        let trades = vec![trade(Side::Buy, dec!(1000), dec!(0.0001), 1)];
        let pos = replay(&id(), &trades).unwrap().position;
        let view = PositionView::new(pos, Decimal::MAX);
        assert_eq!(view.market_value, Decimal::MAX);
        assert_eq!(view.cost_basis, dec!(0.1));
        assert_eq!(view.pnl_pct, Decimal::ZERO);
    }

    #[test]
    fn test_other_instruments_are_ignored() {
        let trades = vec![
            trade(Side::Buy, dec!(1), dec!(2), 1),
            TradeRecord::new("eth-usdc", Side::Sell, dec!(9), dec!(9), 2),
        ];
        let pos = replay(&id(), &trades).unwrap().position;
        assert_eq!(pos.base_amount, dec!(1));
    }
}
