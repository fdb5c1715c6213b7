//! Core type definitions for the venue.
//!
//! Re-exports from alloy-primitives for Ethereum-compatible types.

use alloy::primitives::U512;
use std::cmp::Ordering;
use std::fmt;

pub use alloy::primitives::{Address, U256};

/// Unique identifier for a token (contract address).
/// For ETH, use `Address::ZERO`.
pub type TokenId = Address;

/// ETH token identifier (zero address).
pub const ETH_TOKEN: TokenId = Address::ZERO;

/// Amount of an asset in its smallest unit (wei for ETH).
pub type Amount = U256;

/// Unix timestamp in seconds. `0` is used as "never" for order expirations.
pub type Timestamp = u64;

/// Which asset a liquidity provider contributes to a token pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LiquiditySide {
    /// Provides ETH and earns rewards in ETH (same) and the token (other).
    Eth,
    /// Provides the pool token and earns rewards in the token (same) and ETH (other).
    Token,
}

impl LiquiditySide {
    /// Build a side from the `isEth` flag used on the ABI surface.
    pub fn from_is_eth(is_eth: bool) -> Self {
        if is_eth {
            LiquiditySide::Eth
        } else {
            LiquiditySide::Token
        }
    }

    pub fn is_eth(&self) -> bool {
        matches!(self, LiquiditySide::Eth)
    }

    /// The other side of the same pool.
    pub fn opposite(&self) -> Self {
        match self {
            LiquiditySide::Eth => LiquiditySide::Token,
            LiquiditySide::Token => LiquiditySide::Eth,
        }
    }

    /// The asset this side holds as principal, for a pool on `token`.
    pub fn asset(&self, token: TokenId) -> TokenId {
        match self {
            LiquiditySide::Eth => ETH_TOKEN,
            LiquiditySide::Token => token,
        }
    }
}

impl fmt::Display for LiquiditySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiquiditySide::Eth => write!(f, "eth"),
            LiquiditySide::Token => write!(f, "token"),
        }
    }
}

/// Reward stream of a pool side, relative to the side's own principal asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardAsset {
    /// Denominated in the side's principal asset.
    Same,
    /// Denominated in the asset of the opposite side.
    Other,
}

/// Price represented as a rational number (numerator/denominator) for precision.
/// Price is expressed as: how much ETH per 1 unit of the traded token.
///
/// Equality and ordering compare the ratio, so `2/1 == 4/2`.
#[derive(Debug, Clone, Copy)]
pub struct Price {
    /// Numerator of the price ratio.
    pub numerator: U256,
    /// Denominator of the price ratio (must be non-zero).
    pub denominator: U256,
}

impl Price {
    /// Create a new price. Panics if denominator is zero.
    pub fn new(numerator: U256, denominator: U256) -> Self {
        assert!(!denominator.is_zero(), "price denominator cannot be zero");
        Self {
            numerator,
            denominator,
        }
    }

    /// Create a price, rejecting zero numerators and denominators.
    pub fn checked(numerator: U256, denominator: U256) -> Option<Self> {
        if numerator.is_zero() || denominator.is_zero() {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
        })
    }

    /// Create a price from u128 values for convenience.
    pub fn from_u128(numerator: u128, denominator: u128) -> Self {
        Self::new(U256::from(numerator), U256::from(denominator))
    }

    /// Create a price from a simple integer ratio (price = value, i.e., value/1).
    pub fn from_integer(value: U256) -> Self {
        Self {
            numerator: value,
            denominator: U256::from(1),
        }
    }

    /// ETH owed for `token_amount` at this price, truncated.
    /// Returns (token_amount * numerator) / denominator.
    pub fn quote_amount(&self, token_amount: Amount) -> Option<Amount> {
        token_amount
            .checked_mul(self.numerator)?
            .checked_div(self.denominator)
    }

    /// Tokens purchasable with `eth_amount` at this price, truncated.
    /// Returns (eth_amount * denominator) / numerator.
    pub fn base_amount(&self, eth_amount: Amount) -> Option<Amount> {
        eth_amount
            .checked_mul(self.denominator)?
            .checked_div(self.numerator)
    }

    /// Compare two prices by their ratio values.
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        // a/b vs c/d as a*d vs c*b, widened so the products cannot overflow.
        let lhs: U512 = self.numerator.widening_mul(other.denominator);
        let rhs: U512 = other.numerator.widening_mul(self.denominator);
        lhs.cmp(&rhs)
    }
}

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_value(other) == Ordering::Equal
    }
}

impl Eq for Price {}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_value(other)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == U256::from(1) {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}
