//! Matching and settlement across the order book and the liquidity pool.
//!
//! The bridge borrows the ledger and the book for one operation. It plans
//! every step first (book matches, pool custody moves on a staged pool,
//! taker fees, the fallback trade) and applies the plan to the book and the
//! ledger only after all steps succeeded. Nothing in the apply phase can
//! fail.

use crate::config::OtcConfig;
use crate::external::FallbackExecutor;
use crate::ledger::{Ledger, StagedPool};
use crate::math::{checked_add, less_bps, MathError};
use crate::order::{Order, OrderId, OrderRequest, OrderSide, OrderStatus, Routing};
use crate::orderbook::{BookFill, FillCheck, OrderBook};
use crate::registry::Registry;
use crate::types::{Address, Amount, LiquiditySide, Price, RewardAsset, Timestamp, U256};
use crate::venue::VenueError;
use tracing::debug;

/// Part of an order filled by the pool at its quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolFill {
    /// Tokens exchanged.
    pub amount: Amount,
    /// ETH exchanged.
    pub eth_amount: Amount,
    pub price: Price,
}

/// Part of an order sent to the fallback executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackFill {
    /// Order amount covered, in tokens.
    pub amount: Amount,
    /// Input given to the executor (ETH for buys, tokens for sells).
    pub amount_in: Amount,
    /// Output returned by the executor.
    pub amount_out: Amount,
}

/// Taker fee handed to a pool side's reward stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeInjection {
    pub side: LiquiditySide,
    pub asset: RewardAsset,
    pub amount: Amount,
}

/// What happened to an incoming order.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub order_id: OrderId,
    pub status: OrderStatus,
    /// Total token amount filled from all sources.
    pub filled: Amount,
    /// ETH value of everything filled.
    pub eth_amount: Amount,
    pub book_fills: Vec<BookFill>,
    pub pool_fill: Option<PoolFill>,
    pub fallback_fill: Option<FallbackFill>,
    pub fee: Option<FeeInjection>,
    /// Resting orders expired while matching.
    pub expired: Vec<OrderId>,
    /// The remainder joined the book.
    pub rested: bool,
}

/// Outcome of a direct fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    Filled {
        order_id: OrderId,
        amount: Amount,
        eth_amount: Amount,
        remaining: Amount,
        status: OrderStatus,
        fee: Option<FeeInjection>,
    },
    /// The order was past its expiration and is now `Expired`.
    Expired(OrderId),
}

/// Borrowed view over the venue state for one matching operation.
pub struct Bridge<'a, R: Registry + ?Sized, F: FallbackExecutor + ?Sized> {
    ledger: &'a mut Ledger,
    book: &'a mut OrderBook,
    registry: &'a R,
    fallback: &'a F,
    config: &'a OtcConfig,
}

impl<'a, R: Registry + ?Sized, F: FallbackExecutor + ?Sized> Bridge<'a, R, F> {
    pub fn new(
        ledger: &'a mut Ledger,
        book: &'a mut OrderBook,
        registry: &'a R,
        fallback: &'a F,
        config: &'a OtcConfig,
    ) -> Self {
        Self {
            ledger,
            book,
            registry,
            fallback,
            config,
        }
    }

    /// Place and execute an order according to its routing.
    pub fn execute_order(
        &mut self,
        owner: Address,
        request: OrderRequest,
        now: Timestamp,
    ) -> Result<ExecutionReport, VenueError> {
        self.book.validate(&request, now, self.config)?;
        let mut staged = self.ledger.stage(request.token)?;

        let mut taker = Order::new(self.book.peek_next_id(), owner, &request, now);
        let plan = self
            .book
            .plan_match(&taker, now, self.config.allow_self_trade)?;

        let mut remaining = taker.remaining().saturating_sub(plan.filled());
        let mut eth_amount = plan.eth_amount();
        let mut fee_amount = U256::ZERO;
        for fill in &plan.fills {
            let fee = self.taker_fee(request.side, fill.amount, fill.eth_amount)?;
            fee_amount = checked_add(fee_amount, fee)?;
        }
        debug!(order = %taker.id, fills = plan.fills.len(), %remaining, "book matched");

        let mut pool_fill = None;
        if request.routing.uses_pool() && !remaining.is_zero() {
            if let Some(fill) = plan_pool_fill(&mut staged, &taker, remaining)? {
                fee_amount = checked_add(
                    fee_amount,
                    self.taker_fee(request.side, fill.amount, fill.eth_amount)?,
                )?;
                eth_amount = checked_add(eth_amount, fill.eth_amount)?;
                remaining -= fill.amount;
                debug!(order = %taker.id, amount = %fill.amount, price = %fill.price, "pool fill planned");
                pool_fill = Some(fill);
            }
        }

        let fee = if fee_amount.is_zero() {
            None
        } else {
            let injection = FeeInjection {
                side: fee_side(request.side),
                asset: RewardAsset::Other,
                amount: fee_amount,
            };
            staged.inject_fee(injection.side, injection.amount, injection.asset)?;
            Some(injection)
        };

        let mut fallback_fill = None;
        if request.routing == Routing::Immediate && !remaining.is_zero() {
            let fill = self.run_fallback(&taker, remaining)?;
            let fallback_eth = match request.side {
                OrderSide::Buy => fill.amount_in,
                OrderSide::Sell => fill.amount_out,
            };
            eth_amount = checked_add(eth_amount, fallback_eth)?;
            remaining = U256::ZERO;
            fallback_fill = Some(fill);
        }

        // Everything below is infallible.
        self.book.apply_match(&plan);
        taker.apply_fill(taker.remaining().saturating_sub(remaining));
        let rested = request.routing.rests() && !remaining.is_zero();
        let report = ExecutionReport {
            order_id: taker.id,
            status: taker.status,
            filled: taker.filled_amount,
            eth_amount,
            book_fills: plan.fills,
            pool_fill,
            fallback_fill,
            fee,
            expired: plan.expired,
            rested,
        };
        self.book.record(taker, rested);
        self.ledger.commit(staged);
        Ok(report)
    }

    /// Fill `amount` of a resting order at its posted price.
    pub fn fill_order(
        &mut self,
        filler: Address,
        order_id: OrderId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<FillOutcome, VenueError> {
        let check = self.book.prepare_fill(
            order_id,
            amount,
            filler,
            now,
            self.config.allow_self_trade,
        )?;
        let (order, eth_amount, status) = match check {
            FillCheck::Expired => {
                self.book.expire(order_id);
                return Ok(FillOutcome::Expired(order_id));
            }
            FillCheck::Ready {
                order,
                eth_amount,
                status_after,
            } => (order, eth_amount, status_after),
        };

        // The filler takes the opposite side of the resting order.
        let taker_side = order.side.opposite();
        let fee_amount = self.taker_fee(taker_side, amount, eth_amount)?;
        let staged = if fee_amount.is_zero() {
            None
        } else {
            let injection = FeeInjection {
                side: fee_side(taker_side),
                asset: RewardAsset::Other,
                amount: fee_amount,
            };
            let mut staged = self.ledger.stage(order.token)?;
            staged.inject_fee(injection.side, injection.amount, injection.asset)?;
            Some((staged, injection))
        };

        self.book.apply_fill(order_id, amount);
        let fee = staged.map(|(staged, injection)| {
            self.ledger.commit(staged);
            injection
        });

        Ok(FillOutcome::Filled {
            order_id,
            amount,
            eth_amount,
            remaining: order.remaining().saturating_sub(amount),
            status,
            fee,
        })
    }

    /// Taker fee of one fill: ETH for buys, tokens for sells.
    fn taker_fee(
        &self,
        taker_side: OrderSide,
        amount: Amount,
        eth_amount: Amount,
    ) -> Result<Amount, MathError> {
        match taker_side {
            OrderSide::Buy => self.config.calculate_fee(eth_amount),
            OrderSide::Sell => self.config.calculate_fee(amount),
        }
    }

    /// Send the unfilled remainder to the fallback executor.
    fn run_fallback(&self, taker: &Order, remaining: Amount) -> Result<FallbackFill, VenueError> {
        if self.registry.fallback_executor().is_zero() {
            return Err(VenueError::InsufficientLiquidity {
                requested: taker.amount,
                available: taker.amount.saturating_sub(remaining),
            });
        }

        let limit_eth = taker
            .price
            .quote_amount(remaining)
            .ok_or(MathError::Overflow)?;
        let (amount_in, expected_out) = match taker.side {
            OrderSide::Buy => (limit_eth, remaining),
            OrderSide::Sell => (remaining, limit_eth),
        };
        let min_out = less_bps(expected_out, taker.max_slippage_bps)?;

        let amount_out = self.fallback.execute_trade(
            taker.token,
            amount_in,
            min_out,
            taker.side.is_buy(),
        )?;
        if amount_out < min_out {
            return Err(VenueError::SlippageExceeded {
                expected: min_out,
                actual: amount_out,
            });
        }

        debug!(order = %taker.id, %amount_in, %amount_out, "fallback trade executed");
        Ok(FallbackFill {
            amount: remaining,
            amount_in,
            amount_out,
        })
    }
}

/// Pool side whose providers earn the taker fee: token providers for buys
/// (fee in ETH), ETH providers for sells (fee in tokens).
fn fee_side(taker_side: OrderSide) -> LiquiditySide {
    match taker_side {
        OrderSide::Buy => LiquiditySide::Token,
        OrderSide::Sell => LiquiditySide::Eth,
    }
}

/// Fill up to `wanted` tokens against the pool's quote on a staged pool.
///
/// A buy sells token-side inventory at the ask and credits the ETH paid to
/// the token providers. A sell is the mirror image at the bid, drawing on
/// the ETH side. Returns `None` when the pool has no quote, the quote does
/// not cross, or no sellable inventory is left.
fn plan_pool_fill(
    staged: &mut StagedPool,
    taker: &Order,
    wanted: Amount,
) -> Result<Option<PoolFill>, VenueError> {
    let Some(quote) = staged.quote else {
        return Ok(None);
    };

    let (price, amount) = match taker.side {
        OrderSide::Buy => (quote.ask, wanted.min(staged.token_side.sellable(staged.floor))),
        OrderSide::Sell => {
            let affordable = quote
                .bid
                .base_amount(staged.eth.sellable(staged.floor))
                .ok_or(MathError::Overflow)?;
            (quote.bid, wanted.min(affordable))
        }
    };
    if !taker.crosses(price) || amount.is_zero() {
        return Ok(None);
    }
    let eth_amount = price.quote_amount(amount).ok_or(MathError::Overflow)?;
    if eth_amount.is_zero() {
        return Ok(None);
    }

    match taker.side {
        OrderSide::Buy => staged.sell_inventory(LiquiditySide::Token, amount, eth_amount)?,
        OrderSide::Sell => staged.sell_inventory(LiquiditySide::Eth, eth_amount, amount)?,
    }

    Ok(Some(PoolFill {
        amount,
        eth_amount,
        price,
    }))
}
