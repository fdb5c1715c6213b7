//! Interfaces to liquidity outside the venue.

use crate::types::{Address, Amount, TokenId};
use thiserror::Error;

/// External DEX used when neither the book nor the pool can fill an order.
pub trait FallbackExecutor: Send + Sync {
    /// Trade `amount` of the input asset (ETH for buys, the token for sells)
    /// and return the output amount, which must be at least `min_amount_out`.
    fn execute_trade(
        &self,
        token: TokenId,
        amount: Amount,
        min_amount_out: Amount,
        is_buy: bool,
    ) -> Result<Amount, FallbackError>;
}

/// Executor for deployments without external liquidity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl FallbackExecutor for NoFallback {
    fn execute_trade(
        &self,
        _token: TokenId,
        _amount: Amount,
        _min_amount_out: Amount,
        _is_buy: bool,
    ) -> Result<Amount, FallbackError> {
        Err(FallbackError::Unavailable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackError {
    #[error("no fallback executor available")]
    Unavailable,
    #[error("fallback trade failed: {0}")]
    Failed(String),
}

/// Reserve lookup on the public AMM pair linked to a pool.
pub trait PairReserves {
    /// `(reserve0, reserve1)` of `pair`, or `None` if it cannot be read.
    fn reserves(&self, pair: Address) -> Option<(Amount, Amount)>;
}

impl<F> PairReserves for F
where
    F: Fn(Address) -> Option<(Amount, Amount)>,
{
    fn reserves(&self, pair: Address) -> Option<(Amount, Amount)> {
        self(pair)
    }
}
