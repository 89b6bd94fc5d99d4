//! Limit orders - Pending order tracking, fill detection and book depth
//!
//! Orders fill against observed prices only. A fill is reported to the
//! caller and is never recorded in the ledger here; the ledger only takes
//! confirmed trades.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AnalyticsError, Result};
use crate::types::{InstrumentId, Side};

/// Price levels returned per side by [`OrderBook::depth`]
pub const BOOK_DEPTH_LEVELS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub id: String,
    pub instrument: InstrumentId,
    pub side: Side,
    pub amount: Decimal,
    /// Limit price
    pub price: Decimal,
    pub status: OrderStatus,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_amount: Option<Decimal>,
    /// Observed price at which the order filled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_price: Option<Decimal>,
}

impl LimitOrder {
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Buy fills at or below the limit, sell at or above
    pub fn crosses(&self, price: Decimal) -> bool {
        match self.side {
            Side::Buy => price <= self.price,
            Side::Sell => price >= self.price,
        }
    }

    fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }
}

/// Aggregated pending volume at one price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub amount: Decimal,
    /// Sum of amount * price at this level
    pub total: Decimal,
    pub orders: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDepth {
    /// Highest price first
    pub bids: Vec<DepthLevel>,
    /// Lowest price first
    pub asks: Vec<DepthLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub pending: usize,
    pub filled: usize,
    pub cancelled: usize,
    pub expired: usize,
    /// Total filled base amount
    pub total_volume: Decimal,
    /// Total filled amount * fill price
    pub total_value: Decimal,
}

/// Order list for one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    orders: Vec<LimitOrder>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a pending limit order and return its id
    pub fn create(
        &mut self,
        instrument: &InstrumentId,
        side: Side,
        amount: Decimal,
        price: Decimal,
        now: i64,
        expires_at: Option<i64>,
    ) -> Result<String> {
        if amount <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(AnalyticsError::InvalidTrade(format!(
                "limit order needs positive amount and price, got {amount} @ {price}"
            )));
        }
        let order = LimitOrder {
            id: format!("order_{}", Uuid::new_v4().simple()),
            instrument: instrument.clone(),
            side,
            amount,
            price,
            status: OrderStatus::Pending,
            created_at: now,
            expires_at,
            filled_at: None,
            cancelled_at: None,
            filled_amount: None,
            average_price: None,
        };
        debug!(id = %order.id, %instrument, %side, %amount, %price, "Limit order placed");
        let id = order.id.clone();
        self.orders.push(order);
        Ok(id)
    }

    /// Cancel a pending order. Returns false if it was no longer pending.
    pub fn cancel(&mut self, id: &str, now: i64) -> Result<bool> {
        let order = self
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| AnalyticsError::UnknownOrder(id.to_string()))?;
        if !order.is_pending() {
            return Ok(false);
        }
        order.status = OrderStatus::Cancelled;
        order.cancelled_at = Some(now);
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<&LimitOrder> {
        self.orders.iter().find(|o| o.id == id)
    }

    pub fn orders(&self) -> &[LimitOrder] {
        &self.orders
    }

    pub fn orders_for(&self, instrument: &InstrumentId) -> Vec<&LimitOrder> {
        self.orders
            .iter()
            .filter(|o| &o.instrument == instrument)
            .collect()
    }

    pub fn with_status(&self, status: OrderStatus) -> Vec<&LimitOrder> {
        self.orders.iter().filter(|o| o.status == status).collect()
    }

    /// Expire stale orders, then fill pending orders of `instrument` that
    /// cross `price`. Returns the orders filled by this call.
    pub fn check_fills(
        &mut self,
        instrument: &InstrumentId,
        price: Decimal,
        now: i64,
    ) -> Vec<LimitOrder> {
        if price <= Decimal::ZERO {
            return Vec::new();
        }

        let mut filled = Vec::new();
        for order in self
            .orders
            .iter_mut()
            .filter(|o| &o.instrument == instrument && o.is_pending())
        {
            if order.is_expired_at(now) {
                order.status = OrderStatus::Expired;
                debug!(id = %order.id, "Limit order expired");
                continue;
            }
            if order.crosses(price) {
                order.status = OrderStatus::Filled;
                order.filled_at = Some(now);
                order.filled_amount = Some(order.amount);
                order.average_price = Some(price);
                info!(
                    id = %order.id,
                    %instrument,
                    side = %order.side,
                    limit = %order.price,
                    %price,
                    "Limit order filled"
                );
                filled.push(order.clone());
            }
        }
        filled
    }

    /// Pending orders grouped per price level
    pub fn depth(&self, instrument: &InstrumentId) -> BookDepth {
        let mut bids: BTreeMap<Decimal, DepthLevel> = BTreeMap::new();
        let mut asks: BTreeMap<Decimal, DepthLevel> = BTreeMap::new();

        for order in self
            .orders
            .iter()
            .filter(|o| &o.instrument == instrument && o.is_pending())
        {
            let side = match order.side {
                Side::Buy => &mut bids,
                Side::Sell => &mut asks,
            };
            let level = side.entry(order.price).or_insert_with(|| DepthLevel {
                price: order.price,
                amount: Decimal::ZERO,
                total: Decimal::ZERO,
                orders: 0,
            });
            level.amount += order.amount;
            level.total += order.amount * order.price;
            level.orders += 1;
        }

        BookDepth {
            bids: bids.into_values().rev().take(BOOK_DEPTH_LEVELS).collect(),
            asks: asks.into_values().take(BOOK_DEPTH_LEVELS).collect(),
        }
    }

    pub fn stats(&self) -> OrderStats {
        let mut stats = OrderStats::default();
        for order in &self.orders {
            match order.status {
                OrderStatus::Pending => stats.pending += 1,
                OrderStatus::Cancelled => stats.cancelled += 1,
                OrderStatus::Expired => stats.expired += 1,
                OrderStatus::Filled => {
                    stats.filled += 1;
                    let amount = order.filled_amount.unwrap_or_default();
                    stats.total_volume += amount;
                    stats.total_value += amount * order.average_price.unwrap_or_default();
                }
            }
        }
        stats
    }

    pub fn clear(&mut self) {
        self.orders.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn id() -> InstrumentId {
        InstrumentId::new("flow-usdc")
    }

    #[test]
    fn test_fill_rules() {
        let mut book = OrderBook::new();
        let buy = book
            .create(&id(), Side::Buy, dec!(10), dec!(0.95), 0, None)
            .unwrap();
        let sell = book
            .create(&id(), Side::Sell, dec!(5), dec!(1.10), 0, None)
            .unwrap();

        assert!(book.check_fills(&id(), dec!(1.00), 1).is_empty());

        let filled = book.check_fills(&id(), dec!(0.94), 2);
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].id, buy);
        assert_eq!(filled[0].average_price, Some(dec!(0.94)));
        assert_eq!(filled[0].filled_amount, Some(dec!(10)));

        let filled = book.check_fills(&id(), dec!(1.10), 3);
        assert_eq!(filled[0].id, sell);

        let stats = book.stats();
        assert_eq!(stats.filled, 2);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.total_volume, dec!(15));
        assert_eq!(stats.total_value, dec!(9.40) + dec!(5.50));
    }

    #[test]
    fn test_expiry_wins_over_fill() {
        let mut book = OrderBook::new();
        let o = book
            .create(&id(), Side::Buy, dec!(1), dec!(2), 0, Some(100))
            .unwrap();
        assert!(book.check_fills(&id(), dec!(1), 101).is_empty());
        assert_eq!(book.get(&o).unwrap().status, OrderStatus::Expired);
        assert_eq!(book.stats().expired, 1);
    }

    #[test]
    fn test_cancel_only_pending() {
        let mut book = OrderBook::new();
        let o = book
            .create(&id(), Side::Sell, dec!(1), dec!(2), 0, None)
            .unwrap();
        assert!(book.cancel(&o, 5).unwrap());
        assert!(!book.cancel(&o, 6).unwrap());
        assert_eq!(book.get(&o).unwrap().cancelled_at, Some(5));
        assert!(book.check_fills(&id(), dec!(3), 7).is_empty());
        assert!(matches!(
            book.cancel("nope", 8),
            Err(AnalyticsError::UnknownOrder(_))
        ));
    }

    #[test]
    fn test_depth_grouping_and_ordering() {
        let mut book = OrderBook::new();
        book.create(&id(), Side::Buy, dec!(1), dec!(0.90), 0, None).unwrap();
        book.create(&id(), Side::Buy, dec!(2), dec!(0.95), 0, None).unwrap();
        book.create(&id(), Side::Buy, dec!(3), dec!(0.95), 0, None).unwrap();
        book.create(&id(), Side::Sell, dec!(1), dec!(1.20), 0, None).unwrap();
        book.create(&id(), Side::Sell, dec!(1), dec!(1.05), 0, None).unwrap();
        for i in 0..15 {
            book.create(&id(), Side::Sell, dec!(1), dec!(2) + Decimal::from(i), 0, None)
                .unwrap();
        }

        let depth = book.depth(&id());
        assert_eq!(depth.bids.len(), 2);
        assert_eq!(depth.bids[0].price, dec!(0.95));
        assert_eq!(depth.bids[0].amount, dec!(5));
        assert_eq!(depth.bids[0].orders, 2);
        assert_eq!(depth.bids[0].total, dec!(4.75));
        assert_eq!(depth.asks.len(), BOOK_DEPTH_LEVELS);
        assert_eq!(depth.asks[0].price, dec!(1.05));
        assert_eq!(depth.asks[1].price, dec!(1.20));
    }

    #[test]
    fn test_invalid_order_rejected() {
        let mut book = OrderBook::new();
        assert!(book.create(&id(), Side::Buy, dec!(0), dec!(1), 0, None).is_err());
        assert!(book.create(&id(), Side::Buy, dec!(1), dec!(-1), 0, None).is_err());
        assert!(book.orders().is_empty());
    }
}
