//! Venue configuration parameters.

use crate::math::{bps_of, MathError};
use crate::types::{Address, Amount, U256};

/// Configuration for the venue.
#[derive(Debug, Clone)]
pub struct OtcConfig {
    /// Taker fee charged per fill in basis points (1 bp = 0.01%).
    /// For example, 30 = 0.30% fee. Fees are injected into pool rewards.
    pub fee_bps: u32,

    /// Smallest order amount (token units) accepted by the book.
    pub min_order_amount: Amount,

    /// Largest order amount (token units) accepted by the book.
    pub max_order_amount: Amount,

    /// Floor under `total_contributed` for a pool side that still has shares.
    /// A withdrawal may empty a side entirely, but not leave dust behind.
    pub minimum_liquidity: Amount,

    /// Whether to allow self-trading (same address on both sides).
    pub allow_self_trade: bool,

    /// Address reported as the emitter of event logs.
    pub venue_address: Address,
}

impl Default for OtcConfig {
    fn default() -> Self {
        Self {
            fee_bps: 30,                       // 0.30% default fee
            min_order_amount: U256::from(1),   // Minimum 1 unit
            max_order_amount: U256::MAX,
            minimum_liquidity: U256::from(1_000),
            allow_self_trade: false,
            venue_address: Address::ZERO,
        }
    }
}

impl OtcConfig {
    /// Create a new configuration with custom fee.
    pub fn with_fee_bps(mut self, fee_bps: u32) -> Self {
        self.fee_bps = fee_bps;
        self
    }

    /// Create a new configuration with a custom order amount band.
    pub fn with_order_band(mut self, min: Amount, max: Amount) -> Self {
        self.min_order_amount = min;
        self.max_order_amount = max;
        self
    }

    /// Create a new configuration with a custom minimum liquidity floor.
    pub fn with_minimum_liquidity(mut self, floor: Amount) -> Self {
        self.minimum_liquidity = floor;
        self
    }

    /// Create a new configuration allowing self-trading.
    pub fn with_self_trade(mut self, allow: bool) -> Self {
        self.allow_self_trade = allow;
        self
    }

    /// Create a new configuration with a custom log emitter address.
    pub fn with_venue_address(mut self, address: Address) -> Self {
        self.venue_address = address;
        self
    }

    /// Calculate the taker fee for a given amount.
    pub fn calculate_fee(&self, amount: Amount) -> Result<Amount, MathError> {
        // fee = amount * fee_bps / 10000
        bps_of(amount, self.fee_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_calculation() {
        let config = OtcConfig::default(); // 30 bps = 0.30%

        // 10000 * 30 / 10000 = 30
        assert_eq!(config.calculate_fee(U256::from(10_000)), Ok(U256::from(30)));
        // Truncated to zero for tiny fills.
        assert_eq!(config.calculate_fee(U256::from(300)), Ok(U256::ZERO));
    }

    #[test]
    fn test_custom_config() {
        let config = OtcConfig::default()
            .with_fee_bps(100)
            .with_order_band(U256::from(10), U256::from(1_000))
            .with_minimum_liquidity(U256::ZERO);

        assert_eq!(config.calculate_fee(U256::from(10_000)), Ok(U256::from(100)));
        assert_eq!(config.min_order_amount, U256::from(10));
        assert_eq!(config.max_order_amount, U256::from(1_000));
        assert!(config.minimum_liquidity.is_zero());
    }
}
