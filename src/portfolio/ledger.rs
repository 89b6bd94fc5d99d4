//! Portfolio Ledger - Trade log with derived average-cost positions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::{AnalyticsError, Result};
use crate::types::{InstrumentId, TradeRecord};

use super::position::{replay, PositionView, Replay};
use super::stats::PortfolioStats;
use super::{PortfolioSnapshot, TradeView};

/// Append-only trade ledger.
///
/// Trades are the only stored state; positions are cached replays that are
/// recomputed for an instrument whenever one of its trades is recorded.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    /// Trades in the order they were recorded
    trades: Vec<TradeRecord>,
    /// Cached replay per instrument
    replays: HashMap<InstrumentId, Replay>,
    /// Latest observed market price per instrument
    marks: HashMap<InstrumentId, Decimal>,
}

fn validate(trade: &TradeRecord) -> Result<()> {
    if trade.amount <= Decimal::ZERO {
        return Err(AnalyticsError::InvalidTrade(format!(
            "amount must be positive, got {}",
            trade.amount
        )));
    }
    if trade.price <= Decimal::ZERO {
        return Err(AnalyticsError::InvalidTrade(format!(
            "price must be positive, got {}",
            trade.price
        )));
    }
    if trade.fee < Decimal::ZERO {
        return Err(AnalyticsError::InvalidTrade(format!(
            "fee must not be negative, got {}",
            trade.fee
        )));
    }
    if trade.id.trim().is_empty() {
        return Err(AnalyticsError::InvalidTrade("trade id is empty".to_string()));
    }
    if trade.amount.checked_mul(trade.price).is_none() {
        return Err(AnalyticsError::InvalidTrade(format!(
            "notional of {} x {} is out of range",
            trade.amount, trade.price
        )));
    }
    Ok(())
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a confirmed trade and recompute its instrument's position.
    ///
    /// The trade is not recorded if it is malformed, reuses an id, or would
    /// make any sell of the instrument exceed the holding at that point.
    pub fn record_trade(&mut self, trade: TradeRecord) -> Result<PositionView> {
        if let Err(e) = validate(&trade) {
            warn!(id = %trade.id, instrument = %trade.instrument, error = %e, "Rejected trade");
            return Err(e);
        }
        if self.trades.iter().any(|t| t.id == trade.id) {
            warn!(id = %trade.id, "Rejected duplicate trade id");
            return Err(AnalyticsError::InvalidTrade(format!(
                "duplicate trade id {}",
                trade.id
            )));
        }

        let instrument = trade.instrument.clone();
        let candidate = replay(
            &instrument,
            self.trades.iter().chain(std::iter::once(&trade)),
        )
        .map_err(|e| {
            warn!(id = %trade.id, %instrument, error = %e, "Rejected trade");
            e
        })?;

        debug!(
            id = %trade.id,
            %instrument,
            side = %trade.side,
            amount = %trade.amount,
            price = %trade.price,
            base = %candidate.position.base_amount,
            realized = %candidate.position.realized_pnl,
            "Trade recorded"
        );

        let position = candidate.position.clone();
        self.trades.push(trade);
        self.replays.insert(instrument.clone(), candidate);
        let mark = self.current_price(&instrument).unwrap_or_default();
        Ok(PositionView::new(position, mark))
    }

    /// Update the mark price used for unrealized P&L
    pub fn mark_price(&mut self, instrument: &InstrumentId, price: Decimal) -> Result<()> {
        if price <= Decimal::ZERO {
            return Err(AnalyticsError::InvalidSample { price });
        }
        self.marks.insert(instrument.clone(), price);
        Ok(())
    }

    /// Mark price, falling back to the price of the last trade
    pub fn current_price(&self, instrument: &InstrumentId) -> Option<Decimal> {
        self.marks
            .get(instrument)
            .copied()
            .or_else(|| self.replays.get(instrument)?.last_trade_price)
    }

    fn view(&self, instrument: &InstrumentId) -> Option<PositionView> {
        let replay = self.replays.get(instrument)?;
        let mark = self.current_price(instrument).unwrap_or_default();
        Some(PositionView::new(replay.position.clone(), mark))
    }

    /// Position valued at the current mark price
    pub fn position(&self, instrument: &InstrumentId) -> Option<PositionView> {
        self.view(instrument)
    }

    /// Position valued at an explicit price
    pub fn position_at(&self, instrument: &InstrumentId, price: Decimal) -> Option<PositionView> {
        let replay = self.replays.get(instrument)?;
        Some(PositionView::new(replay.position.clone(), price))
    }

    /// All positions, ordered by instrument
    pub fn positions(&self) -> Vec<PositionView> {
        let mut ids: Vec<&InstrumentId> = self.replays.keys().collect();
        ids.sort();
        ids.into_iter().filter_map(|id| self.view(id)).collect()
    }

    pub fn stats(&self) -> PortfolioStats {
        let positions = self.positions();
        let mut ids: Vec<&InstrumentId> = self.replays.keys().collect();
        ids.sort();
        let closed = ids
            .into_iter()
            .filter_map(|id| self.replays.get(id))
            .flat_map(|r| r.closed.iter());
        PortfolioStats::compute(&positions, &self.trades, closed)
    }

    /// Trades annotated with notional value, newest first
    pub fn trade_history(&self, limit: Option<usize>) -> Vec<TradeView> {
        let realized: HashMap<&str, Decimal> = self
            .replays
            .values()
            .flat_map(|r| r.closed.iter())
            .map(|c| (c.trade_id.as_str(), c.realized_pnl))
            .collect();

        // Reverse first so equal timestamps list the later-recorded trade first
        let mut ordered: Vec<&TradeRecord> = self.trades.iter().rev().collect();
        ordered.sort_by(|a, b| b.ts.cmp(&a.ts));

        ordered
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|t| TradeView {
                trade: t.clone(),
                notional_value: t.notional(),
                realized_pnl: realized.get(t.id.as_str()).copied(),
            })
            .collect()
    }

    /// Trades of one instrument in recording order
    pub fn trades_for(&self, instrument: &InstrumentId) -> Vec<TradeRecord> {
        self.trades
            .iter()
            .filter(|t| &t.instrument == instrument)
            .cloned()
            .collect()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Drop all trades, positions and marks
    pub fn clear(&mut self) {
        info!(trades = self.trades.len(), "Ledger cleared");
        self.trades.clear();
        self.replays.clear();
        self.marks.clear();
    }

    /// Serializable view of the current state
    pub fn export_snapshot(&self) -> PortfolioSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, exported_at: DateTime<Utc>) -> PortfolioSnapshot {
        PortfolioSnapshot {
            trades: self.trades.clone(),
            positions: self.positions(),
            stats: self.stats(),
            exported_at,
        }
    }

    /// Rebuild a ledger from an exported snapshot.
    ///
    /// Trades are re-validated; on error the current state is left untouched.
    pub fn restore(&mut self, snapshot: &PortfolioSnapshot) -> Result<()> {
        let mut fresh = Ledger::new();
        for trade in &snapshot.trades {
            fresh.record_trade(trade.clone())?;
        }
        for view in &snapshot.positions {
            if view.mark_price > Decimal::ZERO {
                fresh.marks.insert(view.position.instrument.clone(), view.mark_price);
            }
        }
        info!(
            trades = fresh.trades.len(),
            exported_at = %snapshot.exported_at,
            "Ledger restored from snapshot"
        );
        *self = fresh;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use rust_decimal_macros::dec;

    fn id() -> InstrumentId {
        InstrumentId::new("flow-usdc")
    }

    fn trade(id: &str, side: Side, amount: Decimal, price: Decimal, ts: i64) -> TradeRecord {
        TradeRecord::new("flow-usdc", side, amount, price, ts).with_id(id)
    }

    #[test]
    fn test_record_and_position() {
        let mut ledger = Ledger::new();
        ledger
            .record_trade(trade("a", Side::Buy, dec!(10), dec!(2.00), 1))
            .unwrap();
        let view = ledger
            .record_trade(trade("b", Side::Sell, dec!(4), dec!(3.00), 2))
            .unwrap();

        assert_eq!(view.position.base_amount, dec!(6));
        assert_eq!(view.position.base_avg_cost, dec!(2.00));
        assert_eq!(view.position.realized_pnl, dec!(4.00));
        // No mark yet: valued at the last trade price
        assert_eq!(view.mark_price, dec!(3.00));
        assert_eq!(view.unrealized_pnl, dec!(6));

        ledger.mark_price(&id(), dec!(2.5)).unwrap();
        let view = ledger.position(&id()).unwrap();
        assert_eq!(view.unrealized_pnl, dec!(3));
        assert_eq!(view.total_pnl, dec!(7));
    }

    #[test]
    fn test_invalid_trades_are_not_recorded() {
        let mut ledger = Ledger::new();
        assert!(matches!(
            ledger.record_trade(trade("a", Side::Buy, dec!(0), dec!(2), 1)),
            Err(AnalyticsError::InvalidTrade(_))
        ));
        assert!(matches!(
            ledger.record_trade(trade("b", Side::Buy, dec!(1), dec!(-2), 1)),
            Err(AnalyticsError::InvalidTrade(_))
        ));
        assert!(matches!(
            ledger.record_trade(trade("c", Side::Buy, dec!(1), dec!(2), 1).with_fee(dec!(-1))),
            Err(AnalyticsError::InvalidTrade(_))
        ));
        assert!(matches!(
            ledger.record_trade(trade("d", Side::Sell, dec!(1), dec!(2), 1)),
            Err(AnalyticsError::InsufficientPosition { .. })
        ));
        assert_eq!(ledger.trade_count(), 0);
        assert!(ledger.position(&id()).is_none());
    }

    #[test]
    fn test_out_of_order_insert_cannot_break_history() {
        let mut ledger = Ledger::new();
        ledger
            .record_trade(trade("a", Side::Buy, dec!(5), dec!(1), 10))
            .unwrap();
        ledger
            .record_trade(trade("b", Side::Sell, dec!(5), dec!(2), 20))
            .unwrap();
        // A sell back-dated before the buy would oversell at ts=5
        let err = ledger
            .record_trade(trade("c", Side::Sell, dec!(1), dec!(2), 5))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InsufficientPosition { .. }));
        assert_eq!(ledger.trade_count(), 2);
    }

    #[test]
    fn test_out_of_range_trades_are_rejected() {
        let mut ledger = Ledger::new();
        let huge = dec!(100000000000000000000);
        let err = ledger
            .record_trade(trade("a", Side::Buy, huge, huge, 1))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidTrade(_)));
        assert_eq!(ledger.trade_count(), 0);
        assert!(ledger.position(&id()).is_none());

        // Valid on its own, but the running quote outflow leaves the range
        let big = dec!(100000000000000);
        ledger
            .record_trade(trade("b", Side::Buy, big, big, 2))
            .unwrap();
        let err = ledger
            .record_trade(trade("c", Side::Buy, Decimal::MAX / big, big, 3))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidTrade(_)));
        assert_eq!(ledger.trade_count(), 1);
        assert_eq!(ledger.position(&id()).unwrap().position.base_amount, big);
        let stats = ledger.stats();
        assert_eq!(stats.trade_count, 1);
        assert_eq!(stats.best_trade, big * big);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut ledger = Ledger::new();
        ledger
            .record_trade(trade("a", Side::Buy, dec!(1), dec!(1), 1))
            .unwrap();
        assert!(ledger
            .record_trade(trade("a", Side::Buy, dec!(1), dec!(1), 2))
            .is_err());
    }

    #[test]
    fn test_trade_history_newest_first() {
        let mut ledger = Ledger::new();
        ledger
            .record_trade(trade("a", Side::Buy, dec!(2), dec!(1), 1))
            .unwrap();
        ledger
            .record_trade(trade("b", Side::Buy, dec!(1), dec!(3), 3))
            .unwrap();
        ledger
            .record_trade(trade("c", Side::Sell, dec!(1), dec!(5), 2))
            .unwrap();

        let history = ledger.trade_history(None);
        let ids: Vec<&str> = history.iter().map(|t| t.trade.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(history[0].notional_value, dec!(3));
        assert_eq!(history[1].realized_pnl, Some(dec!(4)));
        assert_eq!(history[0].realized_pnl, None);

        assert_eq!(ledger.trade_history(Some(2)).len(), 2);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut ledger = Ledger::new();
        ledger
            .record_trade(trade("a", Side::Buy, dec!(1), dec!(1), 1))
            .unwrap();
        ledger.mark_price(&id(), dec!(2)).unwrap();
        ledger.clear();
        assert_eq!(ledger.trade_count(), 0);
        assert!(ledger.positions().is_empty());
        assert_eq!(ledger.current_price(&id()), None);
        assert_eq!(ledger.stats(), PortfolioStats::default());
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut ledger = Ledger::new();
        ledger
            .record_trade(trade("a", Side::Buy, dec!(10), dec!(2), 1))
            .unwrap();
        ledger
            .record_trade(trade("b", Side::Sell, dec!(3), dec!(2.5), 2))
            .unwrap();
        ledger.mark_price(&id(), dec!(2.2)).unwrap();

        let snapshot = ledger.export_snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: PortfolioSnapshot = serde_json::from_str(&json).unwrap();

        let mut restored = Ledger::new();
        restored.restore(&parsed).unwrap();
        assert_eq!(restored.positions(), ledger.positions());
        assert_eq!(restored.stats(), ledger.stats());
    }
}
