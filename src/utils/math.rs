//! Mathematical utilities for AMM quotes
//!
//! Constant-product math is done in `u128` integers the way the pool
//! program does it; slippage and UI conversions use `rust_decimal`.

use rust_decimal::prelude::*;

/// Convert a UI amount (e.g. `0.5` SOL) to base units.
pub fn ui_to_raw(amount: f64, decimals: u8) -> Option<u64> {
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }
    let amount = Decimal::from_f64(amount)?;
    let scale = Decimal::from(10u64.checked_pow(decimals as u32)?);
    amount.checked_mul(scale)?.trunc().to_u64()
}

fn ceil_div(numerator: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    Some(numerator.div_ceil(denominator))
}

/// Output of a constant-product swap after the pool's swap fee.
///
/// The fee is rounded up, the output down, matching the on-chain program.
pub fn amount_out(
    amount_in: u64,
    reserve_in: u64,
    reserve_out: u64,
    fee_numerator: u64,
    fee_denominator: u64,
) -> Option<u64> {
    if reserve_in == 0 || reserve_out == 0 {
        return None;
    }
    let fee = ceil_div(amount_in as u128 * fee_numerator as u128, fee_denominator as u128)?;
    let amount_in_after_fee = (amount_in as u128).checked_sub(fee)?;
    let denominator = reserve_in as u128 + amount_in_after_fee;
    let out = reserve_out as u128 * amount_in_after_fee / denominator;
    u64::try_from(out).ok()
}

/// Amount of the other side needed to deposit `amount` of the fixed side at
/// the pool ratio, rounded up.
pub fn another_amount(amount: u64, fixed_reserve: u64, other_reserve: u64) -> Option<u64> {
    let other = ceil_div(amount as u128 * other_reserve as u128, fixed_reserve as u128)?;
    u64::try_from(other).ok()
}

/// Lowest acceptable output for `slippage_pct` percent.
pub fn min_amount_with_slippage(amount: u64, slippage_pct: f64) -> u64 {
    let factor = Decimal::ONE - pct_to_decimal(slippage_pct);
    (Decimal::from(amount) * factor.max(Decimal::ZERO))
        .floor()
        .to_u64()
        .unwrap_or(0)
}

/// Highest acceptable input for `slippage_pct` percent.
pub fn max_amount_with_slippage(amount: u64, slippage_pct: f64) -> u64 {
    let factor = Decimal::ONE + pct_to_decimal(slippage_pct);
    (Decimal::from(amount) * factor)
        .ceil()
        .to_u64()
        .unwrap_or(u64::MAX)
}

/// `pct` percent of `amount`, exact at 100.
pub fn percentage_of(amount: u64, pct: u8) -> u64 {
    if pct >= 100 {
        return amount;
    }
    (amount as u128 * pct as u128 / 100) as u64
}

fn pct_to_decimal(pct: f64) -> Decimal {
    Decimal::from_f64(pct).unwrap_or(Decimal::ZERO).round_dp(6) / Decimal::ONE_HUNDRED
}
