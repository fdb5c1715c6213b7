//! Price-time priority order book, one pair of sides per token.
//!
//! Mutations happen in two phases: a read-only planning step that
//! produces a [`MatchPlan`] or [`FillCheck`], and an apply step that cannot
//! fail. The bridge plans against the book and the ledger first and applies
//! to both only when every step succeeded.

use crate::config::OtcConfig;
use crate::math::MathError;
use crate::order::{Order, OrderId, OrderRequest, OrderSide, OrderStatus};
use crate::types::{Address, Amount, Price, Timestamp, TokenId, U256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;

/// Price key for BTreeMap ordering.
/// For bids the comparison is reversed so the highest price comes first.
/// For asks we use normal ordering so the lowest price comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PriceKey {
    price: Price,
    is_bid: bool,
}

impl PriceKey {
    fn for_order(order: &Order) -> Self {
        Self {
            price: order.price,
            is_bid: order.side == OrderSide::Buy,
        }
    }
}

impl PartialOrd for PriceKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriceKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        if self.is_bid {
            other.price.cmp(&self.price)
        } else {
            self.price.cmp(&other.price)
        }
    }
}

type Levels = BTreeMap<PriceKey, VecDeque<OrderId>>;

/// Resting orders of one token. Levels hold ids in arrival order.
#[derive(Debug, Default, Clone)]
struct TokenBook {
    bids: Levels,
    asks: Levels,
}

impl TokenBook {
    fn levels(&self, side: OrderSide) -> &Levels {
        match side {
            OrderSide::Buy => &self.bids,
            OrderSide::Sell => &self.asks,
        }
    }

    fn levels_mut(&mut self, side: OrderSide) -> &mut Levels {
        match side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        }
    }
}

/// A planned fill of one resting order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookFill {
    pub maker_order_id: OrderId,
    pub maker: Address,
    /// Token amount traded.
    pub amount: Amount,
    /// ETH amount traded, at the maker's price.
    pub eth_amount: Amount,
    pub price: Price,
    /// Maker status once the fill is applied.
    pub maker_status: OrderStatus,
}

/// Result of matching an incoming order against the book.
#[derive(Debug, Clone, Default)]
pub struct MatchPlan {
    pub fills: Vec<BookFill>,
    /// Resting orders found past their expiration while matching.
    pub expired: Vec<OrderId>,
}

impl MatchPlan {
    pub fn filled(&self) -> Amount {
        self.fills
            .iter()
            .fold(U256::ZERO, |acc, f| acc.saturating_add(f.amount))
    }

    pub fn eth_amount(&self) -> Amount {
        self.fills
            .iter()
            .fold(U256::ZERO, |acc, f| acc.saturating_add(f.eth_amount))
    }
}

/// Outcome of checking a direct fill against a resting order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillCheck {
    /// The order is past its expiration and must transition to `Expired`.
    Expired,
    Ready {
        order: Order,
        eth_amount: Amount,
        status_after: OrderStatus,
    },
}

/// Order book across all tokens.
#[derive(Debug, Clone)]
pub struct OrderBook {
    books: HashMap<TokenId, TokenBook>,
    /// Every order ever recorded, terminal ones included.
    orders: HashMap<OrderId, Order>,
    next_order_id: u64,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            books: HashMap::new(),
            orders: HashMap::new(),
            next_order_id: 1,
        }
    }

    /// Id the next recorded order will get.
    pub fn peek_next_id(&self) -> OrderId {
        OrderId(self.next_order_id)
    }

    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Check a new order's parameters.
    pub fn validate(
        &self,
        request: &OrderRequest,
        now: Timestamp,
        config: &OtcConfig,
    ) -> Result<(), OrderError> {
        if request.amount.is_zero()
            || request.amount < config.min_order_amount
            || request.amount > config.max_order_amount
        {
            return Err(OrderError::InvalidAmount(request.amount));
        }
        if request.price.numerator.is_zero() || request.price.denominator.is_zero() {
            return Err(OrderError::InvalidPrice);
        }
        if request.expiration != 0 && request.expiration <= now {
            return Err(OrderError::ExpirationInPast {
                expiration: request.expiration,
                now,
            });
        }
        if request.min_fill_amount > request.amount {
            return Err(OrderError::InvalidMinFill {
                min_fill: request.min_fill_amount,
                amount: request.amount,
            });
        }
        if !request.slippage_in_range() {
            return Err(OrderError::InvalidSlippage(request.max_slippage_bps));
        }
        Ok(())
    }

    /// Plan matching `taker` against crossing resting orders.
    ///
    /// Makers fill at their own price. Self-trades are skipped unless
    /// allowed, and a maker is never left with a non-zero residual below its
    /// minimum fill: the fill is shrunk to keep exactly that minimum, or the
    /// maker is skipped.
    pub fn plan_match(
        &self,
        taker: &Order,
        now: Timestamp,
        allow_self_trade: bool,
    ) -> Result<MatchPlan, OrderError> {
        let mut plan = MatchPlan::default();
        let Some(book) = self.books.get(&taker.token) else {
            return Ok(plan);
        };
        let mut remaining = taker.remaining();

        'levels: for (price_key, ids) in book.levels(taker.side.opposite()) {
            if !taker.crosses(price_key.price) {
                break;
            }
            for id in ids {
                if remaining.is_zero() {
                    break 'levels;
                }
                let Some(maker) = self.orders.get(id) else {
                    continue;
                };
                if !maker.is_active() {
                    continue;
                }
                if maker.is_expired(now) {
                    plan.expired.push(maker.id);
                    continue;
                }
                if !allow_self_trade && maker.owner == taker.owner {
                    continue;
                }

                let maker_remaining = maker.remaining();
                let mut fill = remaining.min(maker_remaining);
                let residual = maker_remaining - fill;
                if !residual.is_zero() && residual < maker.min_fill_amount {
                    match maker_remaining.checked_sub(maker.min_fill_amount) {
                        Some(reduced) if !reduced.is_zero() => fill = reduced,
                        _ => continue,
                    }
                }

                let eth_amount = maker
                    .price
                    .quote_amount(fill)
                    .ok_or(OrderError::Math(MathError::Overflow))?;
                plan.fills.push(BookFill {
                    maker_order_id: maker.id,
                    maker: maker.owner,
                    amount: fill,
                    eth_amount,
                    price: maker.price,
                    maker_status: maker.status_after(fill),
                });
                remaining -= fill;
            }
        }

        Ok(plan)
    }

    /// Apply a plan produced by [`Self::plan_match`] on this same state.
    pub fn apply_match(&mut self, plan: &MatchPlan) {
        for fill in &plan.fills {
            if let Some(maker) = self.orders.get_mut(&fill.maker_order_id) {
                maker.apply_fill(fill.amount);
            }
            if fill.maker_status == OrderStatus::Filled {
                self.unlink(fill.maker_order_id);
            }
        }
        for id in &plan.expired {
            self.expire(*id);
        }
    }

    /// Record a new order. Active orders with a remainder join their level
    /// when `rest` is set.
    pub fn record(&mut self, order: Order, rest: bool) -> OrderId {
        let id = order.id;
        debug_assert_eq!(id, self.peek_next_id());
        self.next_order_id += 1;

        if rest && order.is_active() && !order.remaining().is_zero() {
            self.books
                .entry(order.token)
                .or_default()
                .levels_mut(order.side)
                .entry(PriceKey::for_order(&order))
                .or_default()
                .push_back(id);
        }
        self.orders.insert(id, order);
        id
    }

    /// Check a direct fill of `amount` against a resting order by `filler`.
    pub fn prepare_fill(
        &self,
        order_id: OrderId,
        amount: Amount,
        filler: Address,
        now: Timestamp,
        allow_self_trade: bool,
    ) -> Result<FillCheck, OrderError> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(OrderError::OrderNotFound(order_id))?;
        if !order.is_active() {
            return Err(OrderError::OrderNotOpen(order_id, order.status));
        }
        if order.is_expired(now) {
            return Ok(FillCheck::Expired);
        }
        if amount.is_zero() {
            return Err(OrderError::InvalidAmount(amount));
        }
        if !allow_self_trade && order.owner == filler {
            return Err(OrderError::SelfTrade(order_id));
        }
        let remaining = order.remaining();
        let residual = remaining
            .checked_sub(amount)
            .ok_or(OrderError::FillExceedsRemaining {
                requested: amount,
                remaining,
            })?;
        if !residual.is_zero() && residual < order.min_fill_amount {
            return Err(OrderError::BelowMinFill {
                residual,
                min_fill: order.min_fill_amount,
            });
        }
        let eth_amount = order
            .price
            .quote_amount(amount)
            .ok_or(OrderError::Math(MathError::Overflow))?;
        Ok(FillCheck::Ready {
            order: order.clone(),
            eth_amount,
            status_after: order.status_after(amount),
        })
    }

    /// Apply a fill checked by [`Self::prepare_fill`].
    pub fn apply_fill(&mut self, order_id: OrderId, amount: Amount) -> Option<&Order> {
        let order = self.orders.get_mut(&order_id)?;
        order.apply_fill(amount);
        if order.status == OrderStatus::Filled {
            self.unlink(order_id);
        }
        self.orders.get(&order_id)
    }

    /// Check that `caller` may cancel the order. Returns `true` when the
    /// order is past its expiration and must expire instead.
    pub fn prepare_cancel(
        &self,
        order_id: OrderId,
        caller: Address,
        now: Timestamp,
    ) -> Result<bool, OrderError> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(OrderError::OrderNotFound(order_id))?;
        if order.owner != caller {
            return Err(OrderError::NotOrderOwner {
                order_id,
                caller,
            });
        }
        if !order.is_active() {
            return Err(OrderError::OrderNotOpen(order_id, order.status));
        }
        Ok(order.is_expired(now))
    }

    /// Cancel an order by ID. The unfilled remainder leaves the book.
    pub fn cancel(&mut self, order_id: OrderId) -> Option<&Order> {
        self.unlink(order_id);
        let order = self.orders.get_mut(&order_id)?;
        order.cancel();
        Some(order)
    }

    /// Check that an order can be expired now.
    pub fn prepare_expire(&self, order_id: OrderId, now: Timestamp) -> Result<(), OrderError> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(OrderError::OrderNotFound(order_id))?;
        if !order.is_active() {
            return Err(OrderError::OrderNotOpen(order_id, order.status));
        }
        if !order.is_expired(now) {
            return Err(OrderError::NotExpired(order_id));
        }
        Ok(())
    }

    pub fn expire(&mut self, order_id: OrderId) -> Option<&Order> {
        self.unlink(order_id);
        let order = self.orders.get_mut(&order_id)?;
        order.expire();
        Some(order)
    }

    /// Remove an order from its price level, dropping the level when empty.
    fn unlink(&mut self, order_id: OrderId) {
        let Some(order) = self.orders.get(&order_id) else {
            return;
        };
        let key = PriceKey::for_order(order);
        let Some(book) = self.books.get_mut(&order.token) else {
            return;
        };
        let levels = book.levels_mut(order.side);
        if let Some(ids) = levels.get_mut(&key) {
            ids.retain(|id| *id != order_id);
            if ids.is_empty() {
                levels.remove(&key);
            }
        }
    }

    /// Highest bid (`Buy`) or lowest ask (`Sell`) among live orders.
    pub fn best_price(&self, token: TokenId, side: OrderSide, now: Timestamp) -> Option<Price> {
        self.depth(token, side, usize::MAX, now)
            .next()
            .map(|(price, _)| price)
    }

    /// Aggregate live amount per price level, best level first, capped at
    /// `max_levels`. Restartable: each call starts from the top of the book.
    pub fn depth(
        &self,
        token: TokenId,
        side: OrderSide,
        max_levels: usize,
        now: Timestamp,
    ) -> impl Iterator<Item = (Price, Amount)> + '_ {
        self.books
            .get(&token)
            .into_iter()
            .flat_map(move |book| book.levels(side).iter())
            .filter_map(move |(key, ids)| {
                let total = ids
                    .iter()
                    .filter_map(|id| self.orders.get(id))
                    .filter(|o| o.is_live(now))
                    .fold(U256::ZERO, |acc, o| acc.saturating_add(o.remaining()));
                (!total.is_zero()).then_some((key.price, total))
            })
            .take(max_levels)
    }

    /// Orders currently linked into a price level of `token`.
    pub fn resting_count(&self, token: TokenId) -> usize {
        self.books
            .get(&token)
            .map(|b| {
                b.bids.values().map(VecDeque::len).sum::<usize>()
                    + b.asks.values().map(VecDeque::len).sum::<usize>()
            })
            .unwrap_or(0)
    }
}

/// Errors that can occur when working with orders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order amount {0} is zero or outside the accepted band")]
    InvalidAmount(Amount),
    #[error("invalid price")]
    InvalidPrice,
    #[error("expiration {expiration} is not after {now}")]
    ExpirationInPast { expiration: Timestamp, now: Timestamp },
    #[error("minimum fill {min_fill} exceeds order amount {amount}")]
    InvalidMinFill { min_fill: Amount, amount: Amount },
    #[error("slippage tolerance {0} bps above 10000")]
    InvalidSlippage(u32),
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    #[error("{caller} does not own order {order_id}")]
    NotOrderOwner { order_id: OrderId, caller: Address },
    #[error("order {0} is {1:?}")]
    OrderNotOpen(OrderId, OrderStatus),
    #[error("order {0} has not expired")]
    NotExpired(OrderId),
    #[error("fill of {requested} exceeds remaining {remaining}")]
    FillExceedsRemaining { requested: Amount, remaining: Amount },
    #[error("fill leaves {residual}, below the minimum fill of {min_fill}")]
    BelowMinFill { residual: Amount, min_fill: Amount },
    #[error("self-trade against order {0}")]
    SelfTrade(OrderId),
    #[error(transparent)]
    Math(#[from] MathError),
}
