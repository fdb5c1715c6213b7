//! Checked fixed-point helpers shared by the ledger, reward engine and book.
//!
//! Every multiplication happens before the division and is checked, so an
//! intermediate product that does not fit in 256 bits is an error instead of
//! a silently wrapped value.

use crate::types::U256;
use thiserror::Error;

/// Denominator for basis-point arithmetic (1 bp = 0.01%).
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Scale of the reward-per-share accumulators (1e18).
pub const REWARD_SCALE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Arithmetic failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,
    #[error("division by zero")]
    DivisionByZero,
}

/// `a * b / denominator`, truncated toward zero.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    Ok(product / denominator)
}

/// `amount * bps / 10000`, truncated.
pub fn bps_of(amount: U256, bps: u32) -> Result<U256, MathError> {
    mul_div(amount, U256::from(bps), U256::from(BPS_DENOMINATOR))
}

/// `amount` reduced by `bps` basis points, e.g. a slippage-adjusted minimum.
pub fn less_bps(amount: U256, bps: u32) -> Result<U256, MathError> {
    let keep = BPS_DENOMINATOR.saturating_sub(bps);
    bps_of(amount, keep)
}

/// `part * 10000 / whole`; zero when `whole` is zero.
pub fn share_in_bps(part: U256, whole: U256) -> Result<U256, MathError> {
    if whole.is_zero() {
        return Ok(U256::ZERO);
    }
    mul_div(part, U256::from(BPS_DENOMINATOR), whole)
}

pub fn checked_add(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_truncates() {
        assert_eq!(
            mul_div(U256::from(10), U256::from(10), U256::from(3)),
            Ok(U256::from(33))
        );
        assert_eq!(
            mul_div(U256::from(1), U256::from(1), U256::ZERO),
            Err(MathError::DivisionByZero)
        );
    }

    #[test]
    fn test_bps_boundaries() {
        let amount = U256::from(12_345);
        assert_eq!(bps_of(amount, 0), Ok(U256::ZERO));
        assert_eq!(bps_of(amount, BPS_DENOMINATOR), Ok(amount));
        assert_eq!(bps_of(amount, 1), Ok(U256::from(1)));
    }

    #[test]
    fn test_bps_near_width_limit() {
        // MAX * 1 still fits before the division, MAX * 2 does not.
        assert_eq!(bps_of(U256::MAX, 1), Ok(U256::MAX / U256::from(10_000)));
        assert_eq!(bps_of(U256::MAX, 2), Err(MathError::Overflow));
        assert_eq!(bps_of(U256::MAX, 0), Ok(U256::ZERO));
    }

    #[test]
    fn test_less_bps() {
        assert_eq!(less_bps(U256::from(1000), 50), Ok(U256::from(995)));
        assert_eq!(less_bps(U256::from(1000), 20_000), Ok(U256::ZERO));
    }

    #[test]
    fn test_share_in_bps() {
        assert_eq!(
            share_in_bps(U256::from(400), U256::from(1000)),
            Ok(U256::from(4000))
        );
        assert_eq!(share_in_bps(U256::from(1), U256::ZERO), Ok(U256::ZERO));
    }

    #[test]
    fn test_reward_scale() {
        assert_eq!(REWARD_SCALE, U256::from(10u64.pow(18)));
    }
}
