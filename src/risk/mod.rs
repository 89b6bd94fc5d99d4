//! Slippage Risk Estimator - Volatility and size aware slippage tolerance
//!
//! Implements:
//! - Short-window volatility from the price sample stream (10 minutes)
//! - Trade size impact relative to pool liquidity
//! - Bounded slippage recommendation with human-readable reasons

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{AnalyticsError, Result};
use crate::pool::{ConstantProductPool, SwapDirection};
use crate::types::PriceSample;

/// Volatility above this percentage adds a volatility premium
pub const HIGH_VOLATILITY_PCT: f64 = 1.0;
/// Trades above this share of the pool (percent) add a size premium
pub const LARGE_TRADE_PCT: f64 = 1.0;
/// Recommendations above this percentage are flagged high risk
pub const HIGH_RISK_SLIPPAGE_PCT: f64 = 2.0;

/// Slippage configuration (all values in percent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlippageConfig {
    /// When false, the base slippage is returned unconditionally
    pub enabled: bool,
    /// Base slippage for small trades in calm markets
    pub base_slippage: f64,
    /// Upper bound of any recommendation
    pub max_slippage: f64,
    /// Weight applied to volatility once it exceeds the threshold
    pub volatility_multiplier: f64,
    /// Weight applied to size impact once it exceeds the threshold
    pub size_multiplier: f64,
    /// Sample window for volatility (ms)
    pub volatility_window_ms: i64,
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_slippage: 0.3,                    // 0.3%
            max_slippage: 5.0,                     // 5%
            volatility_multiplier: 2.0,            // 2x volatility
            size_multiplier: 1.5,                  // 1.5x size impact
            volatility_window_ms: 10 * 60 * 1000,  // 10 minutes
        }
    }
}

/// Partial override of a [`SlippageConfig`]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SlippageConfigUpdate {
    pub enabled: Option<bool>,
    pub base_slippage: Option<f64>,
    pub max_slippage: Option<f64>,
    pub volatility_multiplier: Option<f64>,
    pub size_multiplier: Option<f64>,
}

impl SlippageConfig {
    pub fn apply(&mut self, update: &SlippageConfigUpdate) {
        if let Some(v) = update.enabled {
            self.enabled = v;
        }
        if let Some(v) = update.base_slippage {
            self.base_slippage = v;
        }
        if let Some(v) = update.max_slippage {
            self.max_slippage = v;
        }
        if let Some(v) = update.volatility_multiplier {
            self.volatility_multiplier = v;
        }
        if let Some(v) = update.size_multiplier {
            self.size_multiplier = v;
        }
    }
}

/// Why a recommendation deviates (or not) from the base slippage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlippageReason {
    HighVolatility,
    LargeTradeSize,
    NormalMarketConditions,
    AutoSlippageDisabled,
}

impl fmt::Display for SlippageReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlippageReason::HighVolatility => write!(f, "high volatility"),
            SlippageReason::LargeTradeSize => write!(f, "large trade size"),
            SlippageReason::NormalMarketConditions => write!(f, "normal market conditions"),
            SlippageReason::AutoSlippageDisabled => write!(f, "auto slippage disabled"),
        }
    }
}

/// Slippage recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlippageRecommendation {
    pub recommended_pct: f64,
    pub reasons: Vec<SlippageReason>,
    pub volatility_pct: f64,
    pub size_impact_pct: f64,
    pub is_high_risk: bool,
}

impl SlippageRecommendation {
    /// Reasons rendered for display
    pub fn reason_labels(&self) -> Vec<String> {
        self.reasons.iter().map(ToString::to_string).collect()
    }
}

/// Clamp a slippage percentage to `[0, max_slippage]`; non-finite values saturate
fn clamp_pct(value: f64, config: &SlippageConfig) -> f64 {
    let ceiling = config.max_slippage.max(0.0);
    if value.is_finite() {
        value.max(0.0).min(ceiling)
    } else {
        ceiling
    }
}

/// Combine volatility and size impact into a bounded recommendation
pub fn recommend(
    volatility_pct: f64,
    size_impact_pct: f64,
    config: &SlippageConfig,
) -> SlippageRecommendation {
    let bound = |v: f64| clamp_pct(v, config);

    if !config.enabled {
        let recommended_pct = bound(config.base_slippage);
        return SlippageRecommendation {
            recommended_pct,
            reasons: vec![SlippageReason::AutoSlippageDisabled],
            volatility_pct,
            size_impact_pct,
            is_high_risk: recommended_pct > HIGH_RISK_SLIPPAGE_PCT,
        };
    }

    let mut slippage = config.base_slippage;
    let mut reasons = Vec::new();

    if volatility_pct > HIGH_VOLATILITY_PCT {
        slippage += volatility_pct * config.volatility_multiplier;
        reasons.push(SlippageReason::HighVolatility);
    }
    if size_impact_pct > LARGE_TRADE_PCT {
        slippage += size_impact_pct * config.size_multiplier;
        reasons.push(SlippageReason::LargeTradeSize);
    }
    if reasons.is_empty() {
        reasons.push(SlippageReason::NormalMarketConditions);
    }

    let recommended_pct = bound(slippage);
    SlippageRecommendation {
        recommended_pct,
        reasons,
        volatility_pct,
        size_impact_pct,
        is_high_risk: recommended_pct > HIGH_RISK_SLIPPAGE_PCT,
    }
}

/// Trade amount as a percentage of the pool reserve; 0 for non-positive inputs.
///
/// Ratios outside the decimal range are computed in f64 instead.
pub fn size_impact_pct(trade_amount: Decimal, pool_reserve: Decimal) -> f64 {
    if trade_amount <= Decimal::ZERO || pool_reserve <= Decimal::ZERO {
        return 0.0;
    }
    let exact = trade_amount
        .checked_div(pool_reserve)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|pct| pct.to_f64());
    match exact {
        Some(pct) => pct,
        None => {
            let amount = trade_amount.to_f64().unwrap_or(f64::MAX);
            let reserve = pool_reserve.to_f64().unwrap_or(f64::MIN_POSITIVE);
            amount / reserve * 100.0
        }
    }
}

/// Population standard deviation of consecutive absolute percentage changes
pub fn volatility_pct<'a>(samples: impl IntoIterator<Item = &'a PriceSample>) -> f64 {
    let prices: Vec<f64> = samples
        .into_iter()
        .filter_map(|s| s.price.to_f64())
        .collect();
    if prices.len() < 2 {
        return 0.0;
    }

    let changes: Vec<f64> = prices
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| ((w[1] - w[0]) / w[0]).abs())
        .collect();
    if changes.is_empty() {
        return 0.0;
    }

    let n = changes.len() as f64;
    let mean = changes.iter().sum::<f64>() / n;
    let variance = changes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() * 100.0
}

/// Slippage estimator for a single instrument
#[derive(Debug, Clone)]
pub struct SlippageEstimator {
    config: SlippageConfig,
    /// Samples within the volatility window, ascending timestamps
    samples: VecDeque<PriceSample>,
}

impl SlippageEstimator {
    pub fn new(config: SlippageConfig) -> Self {
        Self {
            config,
            samples: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &SlippageConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SlippageConfig) {
        self.config = config;
        self.evict();
    }

    pub fn update_config(&mut self, update: &SlippageConfigUpdate) {
        self.config.apply(update);
        info!(config = ?self.config, "Slippage config updated");
    }

    /// Record a price observation for the volatility window
    pub fn record_sample(&mut self, sample: PriceSample) -> Result<()> {
        if sample.price <= Decimal::ZERO {
            warn!(price = %sample.price, "Rejected non-positive price sample");
            return Err(AnalyticsError::InvalidSample {
                price: sample.price,
            });
        }

        match self.samples.back() {
            Some(newest) if sample.ts < newest.ts => {
                if newest.ts - sample.ts >= self.config.volatility_window_ms {
                    return Ok(());
                }
                let idx = self.samples.partition_point(|s| s.ts <= sample.ts);
                self.samples.insert(idx, sample);
            }
            _ => self.samples.push_back(sample),
        }
        self.evict();
        Ok(())
    }

    fn evict(&mut self) {
        let Some(newest) = self.samples.back().map(|s| s.ts) else {
            return;
        };
        let window = self.config.volatility_window_ms;
        while self
            .samples
            .front()
            .map_or(false, |s| newest - s.ts >= window)
        {
            self.samples.pop_front();
        }
    }

    /// Current short-window volatility in percent
    pub fn volatility_pct(&self) -> f64 {
        volatility_pct(&self.samples)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Recommend a slippage tolerance for a trade against a pool reserve.
    ///
    /// An empty trade gets the base slippage; volatility is still reported.
    pub fn estimate(&self, trade_amount: Decimal, pool_reserve: Decimal) -> SlippageRecommendation {
        let mut recommendation = recommend(
            self.volatility_pct(),
            size_impact_pct(trade_amount, pool_reserve),
            &self.config,
        );
        if self.config.enabled && trade_amount <= Decimal::ZERO {
            recommendation.recommended_pct = clamp_pct(self.config.base_slippage, &self.config);
            recommendation.is_high_risk =
                recommendation.recommended_pct > HIGH_RISK_SLIPPAGE_PCT;
        }
        debug!(
            trade_amount = %trade_amount,
            pool_reserve = %pool_reserve,
            volatility_pct = recommendation.volatility_pct,
            size_impact_pct = recommendation.size_impact_pct,
            recommended_pct = recommendation.recommended_pct,
            "Slippage estimated"
        );
        recommendation
    }

    /// Estimate against the input-side reserve of a pool
    pub fn estimate_for_pool(
        &self,
        amount_in: Decimal,
        pool: &ConstantProductPool,
        direction: SwapDirection,
    ) -> SlippageRecommendation {
        let (reserve_in, _) = pool.reserves(direction);
        self.estimate(amount_in, reserve_in)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for SlippageEstimator {
    fn default() -> Self {
        Self::new(SlippageConfig::default())
    }
}
