//! Constant-product pool math
//!
//! Single implementation of the x*y=k swap arithmetic used for quotes,
//! price impact and liquidity provisioning. Degenerate inputs (empty
//! reserves, zero amounts) produce zero rather than a division fault.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default swap fee: 0.3%
pub const DEFAULT_FEE_BPS: u32 = 30;

const BPS_DENOMINATOR: u32 = 10_000;

/// Which reserve the trader pays into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapDirection {
    AtoB,
    BtoA,
}

/// Reserves of a two-asset constant-product pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantProductPool {
    pub reserve_a: Decimal,
    pub reserve_b: Decimal,
    pub fee_bps: u32,
}

/// Priced swap with its protection bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    /// Lowest acceptable output for the requested slippage tolerance
    pub min_amount_out: Decimal,
    /// Output per unit of input actually obtained
    pub execution_price: Decimal,
    pub price_impact_pct: Decimal,
}

impl ConstantProductPool {
    pub fn new(reserve_a: Decimal, reserve_b: Decimal) -> Self {
        Self {
            reserve_a,
            reserve_b,
            fee_bps: DEFAULT_FEE_BPS,
        }
    }

    pub fn with_fee_bps(mut self, fee_bps: u32) -> Self {
        self.fee_bps = fee_bps.min(BPS_DENOMINATOR);
        self
    }

    /// (reserve_in, reserve_out) for a direction
    pub fn reserves(&self, direction: SwapDirection) -> (Decimal, Decimal) {
        match direction {
            SwapDirection::AtoB => (self.reserve_a, self.reserve_b),
            SwapDirection::BtoA => (self.reserve_b, self.reserve_a),
        }
    }

    fn is_empty(&self) -> bool {
        self.reserve_a <= Decimal::ZERO || self.reserve_b <= Decimal::ZERO
    }

    /// Marginal price: output units per unit of input
    pub fn spot_price(&self, direction: SwapDirection) -> Decimal {
        if self.is_empty() {
            return Decimal::ZERO;
        }
        let (reserve_in, reserve_out) = self.reserves(direction);
        reserve_out / reserve_in
    }

    /// Output for `amount_in` after the input fee
    pub fn amount_out(&self, amount_in: Decimal, direction: SwapDirection) -> Decimal {
        if self.is_empty() || amount_in <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let (reserve_in, reserve_out) = self.reserves(direction);
        let fee_factor =
            Decimal::from(BPS_DENOMINATOR - self.fee_bps) / Decimal::from(BPS_DENOMINATOR);
        let in_with_fee = amount_in * fee_factor;
        reserve_out * in_with_fee / (reserve_in + in_with_fee)
    }

    /// Deviation of the execution price from the spot price, in percent
    pub fn price_impact_pct(&self, amount_in: Decimal, direction: SwapDirection) -> Decimal {
        let spot = self.spot_price(direction);
        if spot.is_zero() || amount_in <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let execution = self.amount_out(amount_in, direction) / amount_in;
        ((execution - spot) / spot).abs() * Decimal::ONE_HUNDRED
    }

    /// Amount of B matching `amount_a` at the current reserve ratio
    pub fn paired_amount_b(&self, amount_a: Decimal) -> Decimal {
        if self.is_empty() || amount_a <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        amount_a * self.reserve_b / self.reserve_a
    }

    /// Full quote including the minimum received for `slippage_pct`
    pub fn quote(
        &self,
        amount_in: Decimal,
        direction: SwapDirection,
        slippage_pct: Decimal,
    ) -> SwapQuote {
        let amount_out = self.amount_out(amount_in, direction);
        let execution_price = if amount_in > Decimal::ZERO {
            amount_out / amount_in
        } else {
            Decimal::ZERO
        };
        SwapQuote {
            amount_in,
            amount_out,
            min_amount_out: min_amount_out(amount_out, slippage_pct),
            execution_price,
            price_impact_pct: self.price_impact_pct(amount_in, direction),
        }
    }
}

/// Minimum acceptable output for a slippage tolerance in percent
pub fn min_amount_out(expected: Decimal, slippage_pct: Decimal) -> Decimal {
    let tolerance = slippage_pct.max(Decimal::ZERO).min(Decimal::ONE_HUNDRED);
    (expected * (Decimal::ONE - tolerance / Decimal::ONE_HUNDRED)).max(Decimal::ZERO)
}
