//! Replay recorded prices and trades through an analytics session
//!
//! Usage: cargo run --bin replay
//!
//! Paths and tunables come from `AppConfig` (see `DEXMETRICS__REPLAY__*`).
//! Prices CSV columns: `instrument,timestamp_ms,price[,volume]`.
//! Trades CSV columns: `id,instrument,side,amount,price,timestamp_ms[,fee,external_ref]`.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use csv::ReaderBuilder;
use dexmetrics::config::AppConfig;
use dexmetrics::session::AnalyticsSession;
use dexmetrics::types::{InstrumentId, PriceSample, Side, TradeRecord};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct PriceRow {
    instrument: String,
    timestamp_ms: i64,
    price: Decimal,
    #[serde(default)]
    volume: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct TradeRow {
    #[serde(default)]
    id: Option<String>,
    instrument: String,
    side: Side,
    amount: Decimal,
    price: Decimal,
    timestamp_ms: i64,
    #[serde(default)]
    fee: Option<Decimal>,
    #[serde(default)]
    external_ref: Option<String>,
}

impl TradeRow {
    fn into_record(self) -> TradeRecord {
        let mut trade = TradeRecord::new(
            self.instrument,
            self.side,
            self.amount,
            self.price,
            self.timestamp_ms,
        )
        .with_fee(self.fee.unwrap_or_default());
        if let Some(id) = self.id.filter(|id| !id.is_empty()) {
            trade = trade.with_id(id);
        }
        if let Some(external_ref) = self.external_ref.filter(|r| !r.is_empty()) {
            trade = trade.with_external_ref(external_ref);
        }
        trade
    }
}

enum Event {
    Price(PriceRow),
    Trade(TradeRow),
}

impl Event {
    /// Prices sort before trades at the same timestamp
    fn sort_key(&self) -> (i64, u8) {
        match self {
            Event::Price(p) => (p.timestamp_ms, 0),
            Event::Trade(t) => (t.timestamp_ms, 1),
        }
    }
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &str) -> Result<Vec<T>> {
    if !Path::new(path).exists() {
        warn!(path, "Input file not found, skipping");
        return Ok(Vec::new());
    }
    let file = fs::File::open(path).with_context(|| format!("Failed to open {path}"))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: T = result.with_context(|| format!("Failed to deserialize row in {path}"))?;
        rows.push(row);
    }
    Ok(rows)
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn format_ts(ts: i64) -> String {
    Utc.timestamp_millis_opt(ts)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(config.replay.log_json);
    info!(config = %config, "Starting replay");

    let prices: Vec<PriceRow> = read_rows(&config.replay.prices_csv)?;
    let trades: Vec<TradeRow> = read_rows(&config.replay.trades_csv)?;
    info!(prices = prices.len(), trades = trades.len(), "Inputs loaded");

    let mut events: Vec<Event> = prices
        .into_iter()
        .map(Event::Price)
        .chain(trades.into_iter().map(Event::Trade))
        .collect();
    events.sort_by_key(Event::sort_key);

    let session = AnalyticsSession::new(config.session_config());
    let mut rejected_samples = 0usize;
    let mut rejected_trades = 0usize;

    for event in events {
        match event {
            Event::Price(row) => {
                let instrument = InstrumentId::new(row.instrument);
                let mut sample = PriceSample::new(row.timestamp_ms, row.price);
                if let Some(volume) = row.volume {
                    sample = sample.with_volume(volume);
                }
                if session.record_sample(&instrument, sample).is_err() {
                    rejected_samples += 1;
                    continue;
                }
                let triggers = session.evaluate(&instrument, row.timestamp_ms);
                for alert in &triggers.alerts {
                    info!(id = %alert.id, message = %alert.message, "Alert");
                }
                for order in &triggers.fills {
                    info!(id = %order.id, side = %order.side, price = ?order.average_price, "Order filled");
                }
            }
            Event::Trade(row) => {
                let ts = row.timestamp_ms;
                if let Err(e) = session.record_trade(row.into_record()) {
                    warn!(at = %format_ts(ts), error = %e, "Trade skipped");
                    rejected_trades += 1;
                }
            }
        }
    }

    let sample_amount = Decimal::try_from(config.replay.sample_trade_amount).unwrap_or_default();
    let sample_reserve = Decimal::try_from(config.replay.sample_pool_reserve).unwrap_or_default();

    info!("=== MARKETS ({}) ===", session.timeframe());
    for instrument in session.instruments() {
        let summary = session.market_summary(&instrument);
        let slippage = session.estimate_slippage(&instrument, sample_amount, sample_reserve);
        info!(
            %instrument,
            last = ?summary.latest_price,
            change_pct = %summary.price_change_pct.round_dp(2),
            high = %summary.high_24h,
            low = %summary.low_24h,
            candles = summary.candles,
            rsi = ?summary.indicators.rsi14,
            volatility_pct = %format!("{:.3}", summary.volatility_pct),
            slippage_pct = %format!("{:.2}", slippage.recommended_pct),
            reasons = ?slippage.reason_labels(),
            "Market"
        );
    }

    info!("=== PORTFOLIO ===");
    for view in session.positions() {
        info!(
            instrument = %view.position.instrument,
            base = %view.position.base_amount,
            avg_cost = %view.position.base_avg_cost.round_dp(6),
            mark = %view.mark_price,
            realized = %view.position.realized_pnl.round_dp(4),
            unrealized = %view.unrealized_pnl.round_dp(4),
            "Position"
        );
    }
    let stats = session.portfolio_stats();
    info!(
        trades = stats.trade_count,
        value = %stats.total_value.round_dp(2),
        pnl = %stats.total_pnl.round_dp(4),
        pnl_pct = %stats.total_pnl_pct.round_dp(2),
        fees = %stats.total_fees,
        win_rate = %stats.win_rate.round_dp(4),
        rejected_samples,
        rejected_trades,
        "Totals"
    );

    let snapshot = session.export_snapshot();
    let path = Path::new(&config.replay.snapshot_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = snapshot
        .to_json_pretty()
        .context("Failed to serialize snapshot")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Snapshot written");

    Ok(())
}
