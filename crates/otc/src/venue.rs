//! Public surface of the venue.
//!
//! Every state-changing operation takes the write lock for its whole
//! duration, so operations are totally ordered. Events are buffered per
//! operation and published to the journal only on success.

use crate::bridge::{Bridge, ExecutionReport, FeeInjection, FillOutcome};
use crate::config::OtcConfig;
use crate::events::OtcEvent;
use crate::external::{FallbackError, FallbackExecutor, NoFallback, PairReserves};
use crate::ledger::{DepositReceipt, Ledger, LedgerError, PoolQuote, TokenPool, WithdrawReceipt};
use crate::math::MathError;
use crate::order::{Order, OrderId, OrderRequest, OrderSide, OrderStatus};
use crate::orderbook::{OrderBook, OrderError};
use crate::position::{PositionKey, ProviderPosition};
use crate::registry::{InMemoryRegistry, Registry};
use crate::rewards::RewardPair;
use crate::types::{Address, Amount, LiquiditySide, Price, RewardAsset, Timestamp, TokenId, U256};
use alloy::primitives::Log;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};
use std::thread::{self, ThreadId};
use thiserror::Error;
use tracing::{info, warn};

/// Pool ledger and order book, guarded together.
#[derive(Debug, Clone)]
pub struct VenueState {
    pub ledger: Ledger,
    pub book: OrderBook,
}

/// Outcome of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(OrderId),
    /// The order was already past its expiration and is now `Expired`.
    Expired(OrderId),
}

/// The OTC venue: dual-sided pools, an order book and the bridge between them.
pub struct Venue<R = InMemoryRegistry, F = NoFallback> {
    config: OtcConfig,
    registry: R,
    fallback: F,
    state: RwLock<VenueState>,
    /// Thread currently running a state-changing operation.
    holder: Mutex<Option<ThreadId>>,
    journal: Mutex<Vec<OtcEvent>>,
}

/// Write access for one operation. Clears the re-entrancy marker on drop.
struct Session<'a> {
    state: RwLockWriteGuard<'a, VenueState>,
    holder: &'a Mutex<Option<ThreadId>>,
}

impl Deref for Session<'_> {
    type Target = VenueState;

    fn deref(&self) -> &VenueState {
        &self.state
    }
}

impl DerefMut for Session<'_> {
    fn deref_mut(&mut self) -> &mut VenueState {
        &mut self.state
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        *self.holder.lock() = None;
    }
}

impl<R: Registry, F: FallbackExecutor> Venue<R, F> {
    pub fn new(config: OtcConfig, registry: R, fallback: F) -> Self {
        let ledger = Ledger::new(config.minimum_liquidity);
        Self {
            config,
            registry,
            fallback,
            state: RwLock::new(VenueState {
                ledger,
                book: OrderBook::new(),
            }),
            holder: Mutex::new(None),
            journal: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &OtcConfig {
        &self.config
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    fn check_reentry(&self, operation: &'static str) -> Result<(), VenueError> {
        if *self.holder.lock() == Some(thread::current().id()) {
            warn!(operation, "re-entrant call rejected");
            return Err(VenueError::Reentrancy);
        }
        Ok(())
    }

    fn write(&self, operation: &'static str) -> Result<Session<'_>, VenueError> {
        self.check_reentry(operation)?;
        let state = self.state.write();
        *self.holder.lock() = Some(thread::current().id());
        Ok(Session {
            state,
            holder: &self.holder,
        })
    }

    fn read(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, VenueState>, VenueError> {
        self.check_reentry(operation)?;
        Ok(self.state.read())
    }

    fn ensure_not_blocked(&self, token: TokenId) -> Result<(), VenueError> {
        if self.registry.is_token_blocked(token) {
            return Err(VenueError::TokenBlocked(token));
        }
        Ok(())
    }

    fn ensure_authorized(&self, caller: Address) -> Result<(), VenueError> {
        if self.registry.is_privileged(caller) {
            Ok(())
        } else {
            Err(VenueError::Unauthorized(caller))
        }
    }

    fn publish(&self, events: Vec<OtcEvent>) {
        self.journal.lock().extend(events);
    }

    /// Take all events published so far.
    pub fn drain_events(&self) -> Vec<OtcEvent> {
        std::mem::take(&mut *self.journal.lock())
    }

    /// Take all published events as EVM logs.
    pub fn drain_logs(&self) -> Vec<Log> {
        let emitter = self.config.venue_address;
        self.drain_events()
            .iter()
            .map(|event| event.to_log(emitter))
            .collect()
    }

    // --- Pools ---

    /// Open a pool for `token`. Anyone may create a pool for an unblocked token.
    pub fn create_pool(
        &self,
        caller: Address,
        token: TokenId,
        external_pair: Option<Address>,
    ) -> Result<(), VenueError> {
        self.ensure_not_blocked(token)?;
        let mut session = self.write("create_pool")?;
        session.ledger.create_pool(token, external_pair)?;
        info!(%caller, %token, "pool opened");
        Ok(())
    }

    /// Set the bid/ask at which the pool backs order shortfalls.
    pub fn set_pool_quote(
        &self,
        caller: Address,
        token: TokenId,
        bid: Price,
        ask: Price,
    ) -> Result<(), VenueError> {
        let mut session = self.write("set_pool_quote")?;
        session
            .ledger
            .set_quote(&self.registry, caller, token, PoolQuote { bid, ask })?;
        Ok(())
    }

    pub fn add_liquidity(
        &self,
        caller: Address,
        token: TokenId,
        side: LiquiditySide,
        amount: Amount,
        min_value_out: Amount,
    ) -> Result<DepositReceipt, VenueError> {
        self.ensure_not_blocked(token)?;
        let mut session = self.write("add_liquidity")?;
        let receipt = session
            .ledger
            .deposit(token, side, caller, amount, min_value_out)?;

        let mut events = vec![OtcEvent::LiquidityDeposited {
            provider: caller,
            token,
            side,
            amount,
            shares: receipt.shares_minted,
        }];
        events.extend(balance_event(&session.ledger, token, side));
        self.publish(events);
        Ok(receipt)
    }

    /// Withdraw `shares_bps` of the caller's shares with all pending rewards.
    pub fn remove_liquidity(
        &self,
        caller: Address,
        token: TokenId,
        side: LiquiditySide,
        shares_bps: u32,
    ) -> Result<WithdrawReceipt, VenueError> {
        let mut session = self.write("remove_liquidity")?;
        let receipt = session.ledger.withdraw(token, side, caller, shares_bps)?;

        let mut events = vec![OtcEvent::LiquidityWithdrawn {
            provider: caller,
            token,
            side,
            amount: receipt.amount_out,
            shares: receipt.shares_burned,
        }];
        if !receipt.rewards.is_zero() {
            events.push(OtcEvent::RewardClaimed {
                provider: caller,
                token,
                side,
                same: receipt.rewards.same,
                other: receipt.rewards.other,
            });
        }
        events.extend(balance_event(&session.ledger, token, side));
        self.publish(events);
        Ok(receipt)
    }

    /// Pay out the caller's pending rewards. Nothing pending pays zero.
    pub fn claim_rewards(
        &self,
        caller: Address,
        token: TokenId,
        side: LiquiditySide,
    ) -> Result<RewardPair, VenueError> {
        let mut session = self.write("claim_rewards")?;
        let paid = session.ledger.claim(token, side, caller)?;
        if !paid.is_zero() {
            self.publish(vec![OtcEvent::RewardClaimed {
                provider: caller,
                token,
                side,
                same: paid.same,
                other: paid.other,
            }]);
        }
        Ok(paid)
    }

    /// Inject reward revenue collected outside the book (authorized callers only).
    pub fn deposit_reward(
        &self,
        caller: Address,
        token: TokenId,
        side: LiquiditySide,
        amount: Amount,
        asset: RewardAsset,
    ) -> Result<(), VenueError> {
        self.ensure_authorized(caller)?;
        let mut session = self.write("deposit_reward")?;
        session.ledger.inject_fee(token, side, amount, asset)?;
        self.publish(vec![OtcEvent::RewardDeposited {
            token,
            side,
            asset,
            amount,
        }]);
        Ok(())
    }

    /// Reconcile an observed custody balance (authorized callers only).
    pub fn sync_balance(
        &self,
        caller: Address,
        token: TokenId,
        side: LiquiditySide,
        observed: Amount,
    ) -> Result<Amount, VenueError> {
        self.ensure_authorized(caller)?;
        let mut session = self.write("sync_balance")?;
        let excess = session.ledger.sync_balance(token, side, observed)?;
        if !excess.is_zero() {
            let mut events = vec![OtcEvent::RewardDeposited {
                token,
                side,
                asset: RewardAsset::Same,
                amount: excess,
            }];
            events.extend(balance_event(&session.ledger, token, side));
            self.publish(events);
        }
        Ok(excess)
    }

    /// Lend pool custody to the order book (orderbook or authorized callers).
    pub fn transfer_to_orderbook(
        &self,
        caller: Address,
        token: TokenId,
        side: LiquiditySide,
        amount: Amount,
    ) -> Result<(), VenueError> {
        let mut session = self.write("transfer_to_orderbook")?;
        session
            .ledger
            .transfer_to_bridge(&self.registry, caller, token, side, amount)?;
        let mut events = vec![OtcEvent::TransferredToOrderbook {
            token,
            side,
            amount,
        }];
        events.extend(balance_event(&session.ledger, token, side));
        self.publish(events);
        Ok(())
    }

    /// Return custody from the order book (orderbook or authorized callers).
    pub fn receive_from_orderbook(
        &self,
        caller: Address,
        token: TokenId,
        side: LiquiditySide,
        amount: Amount,
    ) -> Result<(), VenueError> {
        let mut session = self.write("receive_from_orderbook")?;
        session
            .ledger
            .receive_from_bridge(&self.registry, caller, token, side, amount)?;
        let mut events = vec![OtcEvent::ReceivedFromOrderbook {
            token,
            side,
            amount,
        }];
        events.extend(balance_event(&session.ledger, token, side));
        self.publish(events);
        Ok(())
    }

    // --- Orders ---

    /// Place an order and execute it according to its routing.
    pub fn place_order(
        &self,
        caller: Address,
        request: OrderRequest,
        now: Timestamp,
    ) -> Result<ExecutionReport, VenueError> {
        self.ensure_not_blocked(request.token)?;
        let mut session = self.write("place_order")?;
        let state = &mut *session;
        let report = Bridge::new(
            &mut state.ledger,
            &mut state.book,
            &self.registry,
            &self.fallback,
            &self.config,
        )
        .execute_order(caller, request.clone(), now)?;

        let events = self.execution_events(state, caller, &request, &report);
        self.publish(events);
        info!(
            order = %report.order_id,
            %caller,
            token = %request.token,
            status = ?report.status,
            filled = %report.filled,
            "order placed"
        );
        Ok(report)
    }

    fn execution_events(
        &self,
        state: &VenueState,
        caller: Address,
        request: &OrderRequest,
        report: &ExecutionReport,
    ) -> Vec<OtcEvent> {
        let token = request.token;
        let mut events = vec![OtcEvent::OrderPlaced {
            order_id: report.order_id,
            owner: caller,
            token,
            is_buy: request.side.is_buy(),
            amount: request.amount,
            price: request.price,
            expiration: request.expiration,
        }];

        events.extend(
            report
                .expired
                .iter()
                .map(|id| OtcEvent::OrderExpired { order_id: *id }),
        );

        for fill in &report.book_fills {
            let remaining = state
                .book
                .order(fill.maker_order_id)
                .map(Order::remaining)
                .unwrap_or(U256::ZERO);
            events.push(fill_event(
                fill.maker_order_id,
                caller,
                fill.amount,
                fill.eth_amount,
                remaining,
                fill.maker_status,
            ));
        }

        if let Some(pool_fill) = &report.pool_fill {
            // The selling side's inventory goes out; the proceeds come in as
            // the opposite asset, credited to the same providers.
            let (out_side, in_side, out_amount, in_amount) = match request.side {
                OrderSide::Buy => (
                    LiquiditySide::Token,
                    LiquiditySide::Eth,
                    pool_fill.amount,
                    pool_fill.eth_amount,
                ),
                OrderSide::Sell => (
                    LiquiditySide::Eth,
                    LiquiditySide::Token,
                    pool_fill.eth_amount,
                    pool_fill.amount,
                ),
            };
            events.push(OtcEvent::TransferredToOrderbook {
                token,
                side: out_side,
                amount: out_amount,
            });
            events.push(OtcEvent::ReceivedFromOrderbook {
                token,
                side: in_side,
                amount: in_amount,
            });
            events.extend(balance_event(&state.ledger, token, out_side));
        }

        if let Some(fee) = report.fee {
            events.push(reward_event(token, fee));
        }

        if !report.filled.is_zero() {
            // A single book counterparty is named; mixed sources report the venue.
            let counterparty = match (&report.book_fills[..], &report.pool_fill, &report.fallback_fill) {
                ([only], None, None) => only.maker,
                _ => self.config.venue_address,
            };
            events.push(fill_event(
                report.order_id,
                counterparty,
                report.filled,
                report.eth_amount,
                request.amount.saturating_sub(report.filled),
                report.status,
            ));
        }
        events
    }

    /// Cancel one of the caller's orders. An order past its expiration
    /// expires instead.
    pub fn cancel_order(
        &self,
        caller: Address,
        order_id: OrderId,
        now: Timestamp,
    ) -> Result<CancelOutcome, VenueError> {
        let mut session = self.write("cancel_order")?;
        let expired = session.book.prepare_cancel(order_id, caller, now)?;
        let (outcome, event) = if expired {
            session.book.expire(order_id);
            (
                CancelOutcome::Expired(order_id),
                OtcEvent::OrderExpired { order_id },
            )
        } else {
            session.book.cancel(order_id);
            (
                CancelOutcome::Cancelled(order_id),
                OtcEvent::OrderCancelled {
                    order_id,
                    owner: caller,
                },
            )
        };
        self.publish(vec![event]);
        info!(order = %order_id, %caller, ?outcome, "cancel processed");
        Ok(outcome)
    }

    /// Fill `amount` of a resting order at its posted price.
    pub fn fill_order(
        &self,
        caller: Address,
        order_id: OrderId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<FillOutcome, VenueError> {
        let mut session = self.write("fill_order")?;
        let token = session
            .book
            .order(order_id)
            .map(|o| o.token)
            .ok_or(OrderError::OrderNotFound(order_id))?;
        self.ensure_not_blocked(token)?;

        let state = &mut *session;
        let outcome = Bridge::new(
            &mut state.ledger,
            &mut state.book,
            &self.registry,
            &self.fallback,
            &self.config,
        )
        .fill_order(caller, order_id, amount, now)?;

        let events = match &outcome {
            FillOutcome::Expired(id) => vec![OtcEvent::OrderExpired { order_id: *id }],
            FillOutcome::Filled {
                order_id,
                amount,
                eth_amount,
                remaining,
                status,
                fee,
            } => {
                let mut events = vec![fill_event(
                    *order_id,
                    caller,
                    *amount,
                    *eth_amount,
                    *remaining,
                    *status,
                )];
                events.extend(fee.map(|fee| reward_event(token, fee)));
                events
            }
        };
        self.publish(events);
        info!(order = %order_id, %caller, %amount, "fill processed");
        Ok(outcome)
    }

    /// Transition an order past its expiration to `Expired`. Anyone may call.
    pub fn expire_order(&self, order_id: OrderId, now: Timestamp) -> Result<(), VenueError> {
        let mut session = self.write("expire_order")?;
        session.book.prepare_expire(order_id, now)?;
        session.book.expire(order_id);
        self.publish(vec![OtcEvent::OrderExpired { order_id }]);
        Ok(())
    }

    // --- Queries ---

    pub fn pool_info(&self, token: TokenId) -> Result<TokenPool, VenueError> {
        let state = self.read("pool_info")?;
        state
            .ledger
            .pool(token)
            .cloned()
            .ok_or(VenueError::Ledger(LedgerError::PoolNotFound(token)))
    }

    /// Provider's share of its pool side in basis points.
    pub fn user_share_bps(
        &self,
        token: TokenId,
        side: LiquiditySide,
        user: Address,
    ) -> Result<U256, VenueError> {
        let state = self.read("user_share_bps")?;
        Ok(state
            .ledger
            .user_share_bps(&PositionKey::new(token, side, user))?)
    }

    pub fn user_lp_shares(
        &self,
        token: TokenId,
        side: LiquiditySide,
        user: Address,
    ) -> Result<U256, VenueError> {
        let state = self.read("user_lp_shares")?;
        Ok(state
            .ledger
            .user_lp_shares(&PositionKey::new(token, side, user)))
    }

    pub fn position(
        &self,
        token: TokenId,
        side: LiquiditySide,
        owner: Address,
    ) -> Result<Option<ProviderPosition>, VenueError> {
        let state = self.read("position")?;
        Ok(state
            .ledger
            .position(&PositionKey::new(token, side, owner))
            .cloned())
    }

    pub fn pending_rewards(
        &self,
        token: TokenId,
        side: LiquiditySide,
        owner: Address,
    ) -> Result<RewardPair, VenueError> {
        let state = self.read("pending_rewards")?;
        Ok(state.ledger.pending_rewards(token, side, owner)?)
    }

    /// Reserves of the external AMM pair linked to the pool.
    pub fn reserves(
        &self,
        token: TokenId,
        source: &impl PairReserves,
    ) -> Result<(Amount, Amount), VenueError> {
        let pair = {
            let state = self.read("reserves")?;
            state
                .ledger
                .pool(token)
                .ok_or(LedgerError::PoolNotFound(token))?
                .external_pair
                .ok_or(VenueError::NoExternalPair(token))?
        };
        source
            .reserves(pair)
            .ok_or(VenueError::ReservesUnavailable(pair))
    }

    pub fn order(&self, order_id: OrderId) -> Result<Option<Order>, VenueError> {
        let state = self.read("order")?;
        Ok(state.book.order(order_id).cloned())
    }

    /// Highest bid (`is_buy`) or lowest ask among live orders.
    pub fn best_price(
        &self,
        token: TokenId,
        is_buy: bool,
        now: Timestamp,
    ) -> Result<Option<Price>, VenueError> {
        let state = self.read("best_price")?;
        Ok(state
            .book
            .best_price(token, OrderSide::from_is_buy(is_buy), now))
    }

    /// Aggregated levels of one side, best first, at most `max_levels`.
    pub fn depth(
        &self,
        token: TokenId,
        is_buy: bool,
        max_levels: usize,
        now: Timestamp,
    ) -> Result<Vec<(Price, Amount)>, VenueError> {
        let state = self.read("depth")?;
        Ok(state
            .book
            .depth(token, OrderSide::from_is_buy(is_buy), max_levels, now)
            .collect())
    }

    /// Copy of the whole state, for inspection.
    pub fn snapshot(&self) -> Result<VenueState, VenueError> {
        let state = self.read("snapshot")?;
        Ok(state.clone())
    }
}

fn balance_event(ledger: &Ledger, token: TokenId, side: LiquiditySide) -> Option<OtcEvent> {
    let pool_side = ledger.pool(token)?.side(side);
    Some(OtcEvent::PoolBalanceUpdated {
        token,
        side,
        total_contributed: pool_side.total_contributed,
        total_shares: pool_side.total_shares,
        accounted_balance: pool_side.accounted_balance,
    })
}

fn reward_event(token: TokenId, fee: FeeInjection) -> OtcEvent {
    OtcEvent::RewardDeposited {
        token,
        side: fee.side,
        asset: fee.asset,
        amount: fee.amount,
    }
}

fn fill_event(
    order_id: OrderId,
    counterparty: Address,
    amount: Amount,
    eth_amount: Amount,
    remaining: Amount,
    status: OrderStatus,
) -> OtcEvent {
    if status == OrderStatus::Filled {
        OtcEvent::OrderFilled {
            order_id,
            counterparty,
            amount,
            eth_amount,
        }
    } else {
        OtcEvent::OrderPartiallyFilled {
            order_id,
            counterparty,
            amount,
            eth_amount,
            remaining,
        }
    }
}

/// Errors surfaced by venue operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VenueError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Fallback(#[from] FallbackError),
    #[error(transparent)]
    Math(#[from] MathError),
    #[error("caller {0} is not authorized")]
    Unauthorized(Address),
    #[error("token {0} is blocked")]
    TokenBlocked(TokenId),
    #[error("re-entrant call into the venue")]
    Reentrancy,
    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Amount, available: Amount },
    #[error("slippage exceeded: expected at least {expected}, got {actual}")]
    SlippageExceeded { expected: Amount, actual: Amount },
    #[error("pool for {0} has no external pair")]
    NoExternalPair(TokenId),
    #[error("reserves of pair {0} unavailable")]
    ReservesUnavailable(Address),
    #[error("invalid calldata: {0}")]
    InvalidCalldata(String),
}
