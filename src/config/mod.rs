//! Configuration management for the replay tool
//!
//! Loads built-in defaults, optional `config/default` and `config/local`
//! files, then `DEXMETRICS__*` environment variables (`.env` via dotenvy).
//! The library types never read the environment themselves.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::cache::QuoteCacheConfig;
use crate::risk::SlippageConfig;
use crate::series::SeriesConfig;
use crate::session::SessionConfig;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub replay: ReplayConfig,
    pub series: SeriesConfig,
    pub slippage: SlippageConfig,
    pub quote_cache: QuoteCacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    /// CSV with `instrument,timestamp_ms,price[,volume]`
    pub prices_csv: String,
    /// CSV with confirmed trades
    pub trades_csv: String,
    /// Where the portfolio snapshot JSON is written
    pub snapshot_path: String,
    /// Emit JSON logs instead of plain text
    pub log_json: bool,
    /// Trade size for the slippage line of the summary
    pub sample_trade_amount: f64,
    /// Pool reserve for the slippage line of the summary
    pub sample_pool_reserve: f64,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Replay defaults
            .set_default("replay.prices_csv", "./data/prices.csv")?
            .set_default("replay.trades_csv", "./data/trades.csv")?
            .set_default("replay.snapshot_path", "./data/portfolio_snapshot.json")?
            .set_default("replay.log_json", false)?
            .set_default("replay.sample_trade_amount", 100.0)?
            .set_default("replay.sample_pool_reserve", 10_000.0)?
            // Series defaults
            .set_default("series.retention_ms", 86_400_000i64)?
            .set_default("series.max_candles", 100)?
            .set_default("series.timeframe", "5m")?
            // Slippage defaults
            .set_default("slippage.enabled", true)?
            .set_default("slippage.base_slippage", 0.3)?
            .set_default("slippage.max_slippage", 5.0)?
            .set_default("slippage.volatility_multiplier", 2.0)?
            .set_default("slippage.size_multiplier", 1.5)?
            .set_default("slippage.volatility_window_ms", 600_000i64)?
            // Quote cache defaults
            .set_default("quote_cache.ttl_ms", 30_000i64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (DEXMETRICS__*)
            .add_source(Environment::with_prefix("DEXMETRICS").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;

        Ok(app_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.series.retention_ms <= 0 {
            bail!("series.retention_ms must be positive");
        }
        if self.series.max_candles == 0 {
            bail!("series.max_candles must be at least 1");
        }
        let s = &self.slippage;
        if s.base_slippage < 0.0 || s.max_slippage < 0.0 {
            bail!("slippage percentages must not be negative");
        }
        if s.volatility_window_ms <= 0 {
            bail!("slippage.volatility_window_ms must be positive");
        }
        if self.quote_cache.ttl_ms < 0 {
            bail!("quote_cache.ttl_ms must not be negative");
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            series: self.series.clone(),
            slippage: self.slippage.clone(),
            quote_cache: self.quote_cache,
        }
    }

    /// One-line summary for logging
    pub fn digest(&self) -> String {
        format!(
            "timeframe={} retention_ms={} max_candles={} slippage=[base={:.2} max={:.2} enabled={}] quote_ttl_ms={}",
            self.series.timeframe,
            self.series.retention_ms,
            self.series.max_candles,
            self.slippage.base_slippage,
            self.slippage.max_slippage,
            self.slippage.enabled,
            self.quote_cache.ttl_ms
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
