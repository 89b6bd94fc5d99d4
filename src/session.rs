//! Analytics session
//!
//! One owned instance per account. Price samples and confirmed trades enter
//! through `record_sample` and `record_trade`; everything else is a read
//! accessor or a change to the session's own alert/order/quote books.
//!
//! Each component sits behind its own `RwLock`, so readers of one instrument
//! or component never observe a half-applied update.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::alerts::{AlertBook, AlertCondition, PriceAlert};
use crate::cache::{MarketQuote, QuoteCache, QuoteCacheConfig};
use crate::error::Result;
use crate::indicators::{IndicatorSeries, IndicatorSnapshot};
use crate::orders::{BookDepth, LimitOrder, OrderBook, OrderStats};
use crate::pool::{ConstantProductPool, SwapDirection};
use crate::portfolio::{Ledger, PortfolioSnapshot, PortfolioStats, PositionView, TradeView};
use crate::risk::{SlippageConfig, SlippageConfigUpdate, SlippageEstimator, SlippageRecommendation};
use crate::series::{PriceSeriesAggregator, SeriesConfig};
use crate::types::{Candle, InstrumentId, PriceSample, Side, Timeframe, TradeRecord};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub series: SeriesConfig,
    pub slippage: SlippageConfig,
    pub quote_cache: QuoteCacheConfig,
}

/// Per-instrument market view for dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub instrument: InstrumentId,
    pub timeframe: Timeframe,
    pub latest_price: Option<Decimal>,
    pub price_change_pct: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub candles: usize,
    pub volatility_pct: f64,
    pub indicators: IndicatorSnapshot,
}

/// Alerts and order fills produced by one evaluation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Triggers {
    pub alerts: Vec<PriceAlert>,
    pub fills: Vec<LimitOrder>,
}

impl Triggers {
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty() && self.fills.is_empty()
    }
}

pub struct AnalyticsSession {
    slippage_config: RwLock<SlippageConfig>,
    series: RwLock<PriceSeriesAggregator>,
    estimators: RwLock<HashMap<InstrumentId, SlippageEstimator>>,
    ledger: RwLock<Ledger>,
    alerts: RwLock<AlertBook>,
    orders: RwLock<OrderBook>,
    quotes: RwLock<QuoteCache>,
}

impl AnalyticsSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            slippage_config: RwLock::new(config.slippage),
            series: RwLock::new(PriceSeriesAggregator::new(config.series)),
            estimators: RwLock::new(HashMap::new()),
            ledger: RwLock::new(Ledger::new()),
            alerts: RwLock::new(AlertBook::new()),
            orders: RwLock::new(OrderBook::new()),
            quotes: RwLock::new(QuoteCache::new(config.quote_cache)),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Price samples
    // ─────────────────────────────────────────────────────────────

    /// Feed a price sample to the candle series, the instrument's volatility
    /// window and the ledger's mark price. Returns the candle it completed.
    pub fn record_sample(
        &self,
        instrument: &InstrumentId,
        sample: PriceSample,
    ) -> Result<Option<Candle>> {
        let completed = write(&self.series).record_sample(instrument, sample)?;

        let config = self.slippage_config();
        write(&self.estimators)
            .entry(instrument.clone())
            .or_insert_with(|| SlippageEstimator::new(config))
            .record_sample(sample)?;

        let latest = read(&self.series).latest_price(instrument);
        if let Some(price) = latest {
            write(&self.ledger).mark_price(instrument, price)?;
        }

        Ok(completed)
    }

    /// Check alerts and pending limit orders against the latest price
    pub fn evaluate(&self, instrument: &InstrumentId, now: i64) -> Triggers {
        let Some(price) = self.latest_price(instrument) else {
            return Triggers::default();
        };
        let triggers = Triggers {
            alerts: write(&self.alerts).check(instrument, price, now),
            fills: write(&self.orders).check_fills(instrument, price, now),
        };
        if !triggers.is_empty() {
            debug!(
                %instrument,
                %price,
                alerts = triggers.alerts.len(),
                fills = triggers.fills.len(),
                "Evaluation produced triggers"
            );
        }
        triggers
    }

    pub fn set_timeframe(&self, timeframe: Timeframe) {
        write(&self.series).set_timeframe(timeframe);
    }

    pub fn set_timeframe_str(&self, label: &str) -> Result<()> {
        write(&self.series).set_timeframe_str(label)
    }

    pub fn timeframe(&self) -> Timeframe {
        read(&self.series).timeframe()
    }

    pub fn candles(&self, instrument: &InstrumentId) -> Vec<Candle> {
        read(&self.series).candles(instrument)
    }

    pub fn indicators(&self, instrument: &InstrumentId) -> IndicatorSeries {
        read(&self.series).indicators(instrument)
    }

    pub fn price_change_pct(&self, instrument: &InstrumentId) -> Decimal {
        read(&self.series).price_change_pct(instrument)
    }

    pub fn high_24h(&self, instrument: &InstrumentId) -> Decimal {
        read(&self.series).high_24h(instrument)
    }

    pub fn low_24h(&self, instrument: &InstrumentId) -> Decimal {
        read(&self.series).low_24h(instrument)
    }

    pub fn latest_price(&self, instrument: &InstrumentId) -> Option<Decimal> {
        read(&self.series).latest_price(instrument)
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        read(&self.series).instruments()
    }

    pub fn market_summary(&self, instrument: &InstrumentId) -> MarketSummary {
        let (timeframe, latest_price, change, high, low, candles, indicators) = {
            let series = read(&self.series);
            let candles = series.candles(instrument);
            (
                series.timeframe(),
                series.latest_price(instrument),
                series.price_change_pct(instrument),
                series.high_24h(instrument),
                series.low_24h(instrument),
                candles.len(),
                IndicatorSeries::from_candles(&candles).latest(),
            )
        };
        let volatility_pct = read(&self.estimators)
            .get(instrument)
            .map_or(0.0, SlippageEstimator::volatility_pct);

        MarketSummary {
            instrument: instrument.clone(),
            timeframe,
            latest_price,
            price_change_pct: change,
            high_24h: high,
            low_24h: low,
            candles,
            volatility_pct,
            indicators,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Slippage
    // ─────────────────────────────────────────────────────────────

    pub fn estimate_slippage(
        &self,
        instrument: &InstrumentId,
        trade_amount: Decimal,
        pool_reserve: Decimal,
    ) -> SlippageRecommendation {
        if let Some(estimator) = read(&self.estimators).get(instrument) {
            return estimator.estimate(trade_amount, pool_reserve);
        }
        SlippageEstimator::new(self.slippage_config()).estimate(trade_amount, pool_reserve)
    }

    pub fn estimate_slippage_for_pool(
        &self,
        instrument: &InstrumentId,
        amount_in: Decimal,
        pool: &ConstantProductPool,
        direction: SwapDirection,
    ) -> SlippageRecommendation {
        let (reserve_in, _) = pool.reserves(direction);
        self.estimate_slippage(instrument, amount_in, reserve_in)
    }

    pub fn slippage_config(&self) -> SlippageConfig {
        read(&self.slippage_config).clone()
    }

    /// Apply a partial config override to the session and every estimator
    pub fn update_slippage_config(&self, update: &SlippageConfigUpdate) {
        write(&self.slippage_config).apply(update);
        for estimator in write(&self.estimators).values_mut() {
            estimator.update_config(update);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Portfolio
    // ─────────────────────────────────────────────────────────────

    /// Record a confirmed trade
    pub fn record_trade(&self, trade: TradeRecord) -> Result<PositionView> {
        write(&self.ledger).record_trade(trade)
    }

    pub fn position(&self, instrument: &InstrumentId) -> Option<PositionView> {
        read(&self.ledger).position(instrument)
    }

    pub fn positions(&self) -> Vec<PositionView> {
        read(&self.ledger).positions()
    }

    pub fn portfolio_stats(&self) -> PortfolioStats {
        read(&self.ledger).stats()
    }

    pub fn trade_history(&self, limit: Option<usize>) -> Vec<TradeView> {
        read(&self.ledger).trade_history(limit)
    }

    pub fn export_snapshot(&self) -> PortfolioSnapshot {
        let snapshot = read(&self.ledger).export_snapshot();
        info!(
            trades = snapshot.trades.len(),
            positions = snapshot.positions.len(),
            "Portfolio snapshot exported"
        );
        snapshot
    }

    pub fn restore_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<()> {
        write(&self.ledger).restore(snapshot)
    }

    // ─────────────────────────────────────────────────────────────
    // Alerts
    // ─────────────────────────────────────────────────────────────

    pub fn create_alert(
        &self,
        instrument: &InstrumentId,
        condition: AlertCondition,
        target_price: Decimal,
        message: impl Into<String>,
        now: i64,
    ) -> Result<String> {
        write(&self.alerts).create(instrument, condition, target_price, message, now)
    }

    pub fn toggle_alert(&self, id: &str) -> Result<bool> {
        write(&self.alerts).toggle(id)
    }

    pub fn delete_alert(&self, id: &str) -> Result<PriceAlert> {
        write(&self.alerts).delete(id)
    }

    pub fn reset_alert(&self, id: &str) -> Result<()> {
        write(&self.alerts).reset(id)
    }

    pub fn clear_triggered_alerts(&self) -> usize {
        write(&self.alerts).clear_triggered()
    }

    pub fn alerts(&self) -> Vec<PriceAlert> {
        read(&self.alerts).alerts().to_vec()
    }

    /// (active, triggered)
    pub fn alert_counts(&self) -> (usize, usize) {
        let alerts = read(&self.alerts);
        (alerts.active_count(), alerts.triggered_count())
    }

    // ─────────────────────────────────────────────────────────────
    // Limit orders
    // ─────────────────────────────────────────────────────────────

    pub fn place_order(
        &self,
        instrument: &InstrumentId,
        side: Side,
        amount: Decimal,
        price: Decimal,
        now: i64,
        expires_at: Option<i64>,
    ) -> Result<String> {
        write(&self.orders).create(instrument, side, amount, price, now, expires_at)
    }

    pub fn cancel_order(&self, id: &str, now: i64) -> Result<bool> {
        write(&self.orders).cancel(id, now)
    }

    pub fn orders(&self) -> Vec<LimitOrder> {
        read(&self.orders).orders().to_vec()
    }

    pub fn order_book(&self, instrument: &InstrumentId) -> BookDepth {
        read(&self.orders).depth(instrument)
    }

    pub fn order_stats(&self) -> OrderStats {
        read(&self.orders).stats()
    }

    // ─────────────────────────────────────────────────────────────
    // Quote cache
    // ─────────────────────────────────────────────────────────────

    pub fn cache_quote(&self, quote: MarketQuote) {
        let key = quote.symbol.clone();
        let at = quote.updated_at;
        write(&self.quotes).insert_at(key, quote, at);
    }

    pub fn cached_quote(&self, symbol: &str, now: i64) -> Option<MarketQuote> {
        read(&self.quotes).get_at(&symbol.to_string(), now)
    }

    pub fn purge_quotes(&self, now: i64) -> usize {
        write(&self.quotes).purge_expired(now)
    }

    /// Reset every component of the session
    pub fn clear(&self) {
        write(&self.series).clear();
        write(&self.estimators).clear();
        write(&self.ledger).clear();
        write(&self.alerts).clear();
        write(&self.orders).clear();
        write(&self.quotes).clear();
        info!("Session cleared");
    }
}

impl Default for AnalyticsSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
