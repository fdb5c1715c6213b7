//! Over-the-counter venue for trading ETH against ERC-20 style tokens.
//!
//! This library provides:
//! - Dual-sided liquidity pools per token with proportional LP shares
//! - Lazy reward-per-share distribution of taker fees, in two assets
//! - A price-time priority order book with partial fills and lazy expiry
//! - Pool-backed execution and an external fallback for order shortfalls
//! - An ABI calldata surface and EVM log encoding of venue events

pub mod abi;
pub mod bridge;
pub mod config;
pub mod events;
pub mod external;
pub mod ledger;
pub mod math;
pub mod order;
pub mod orderbook;
pub mod position;
pub mod registry;
pub mod rewards;
pub mod types;
pub mod venue;

pub use bridge::{ExecutionReport, FallbackFill, FeeInjection, FillOutcome, PoolFill};
pub use config::OtcConfig;
pub use events::OtcEvent;
pub use external::{FallbackError, FallbackExecutor, NoFallback, PairReserves};
pub use ledger::{
    DepositReceipt, Ledger, LedgerError, PoolQuote, PoolSide, TokenPool, WithdrawReceipt,
};
pub use math::{MathError, BPS_DENOMINATOR, REWARD_SCALE};
pub use order::{Order, OrderId, OrderRequest, OrderSide, OrderStatus, Routing};
pub use orderbook::{BookFill, OrderBook, OrderError};
pub use position::{PositionKey, PositionStatus, ProviderPosition};
pub use registry::{InMemoryRegistry, Registry, RegistryError};
pub use rewards::{RewardPair, RewardStream};
pub use types::{
    Address, Amount, LiquiditySide, Price, RewardAsset, Timestamp, TokenId, ETH_TOKEN, U256,
};
pub use venue::{CancelOutcome, Venue, VenueError, VenueState};
