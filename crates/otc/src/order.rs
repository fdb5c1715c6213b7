//! Order types and lifecycle.

use crate::math::BPS_DENOMINATOR;
use crate::types::{Address, Amount, Price, Timestamp, TokenId, U256};
use std::fmt;

/// Unique identifier for an order. Assigned in strictly increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub u64);

impl OrderId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u256(&self) -> U256 {
        U256::from(self.0)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Side of the order (buy or sell), always quoted as tokens against ETH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderSide {
    /// Buy tokens, pay ETH.
    Buy,
    /// Sell tokens, receive ETH.
    Sell,
}

impl OrderSide {
    pub fn from_is_buy(is_buy: bool) -> Self {
        if is_buy {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, OrderSide::Buy)
    }

    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// Status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Order is open and can be matched.
    Open,
    /// Order has been partially filled.
    PartiallyFilled,
    /// Order has been completely filled.
    Filled,
    /// Order has been cancelled.
    Cancelled,
    /// Order was observed past its expiration.
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }
}

/// Which liquidity sources may fill an incoming order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Routing {
    /// Match the book; rest the remainder.
    #[default]
    Resting,
    /// Match the book, then the pool at its quote; rest the remainder.
    PoolBacked,
    /// Book, pool, then the fallback executor. Fill-or-kill.
    Immediate,
}

impl Routing {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Routing::Resting),
            1 => Some(Routing::PoolBacked),
            2 => Some(Routing::Immediate),
            _ => None,
        }
    }

    pub fn uses_pool(&self) -> bool {
        matches!(self, Routing::PoolBacked | Routing::Immediate)
    }

    pub fn rests(&self) -> bool {
        !matches!(self, Routing::Immediate)
    }
}

/// Parameters of a new order.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub token: TokenId,
    pub side: OrderSide,
    pub price: Price,
    pub amount: Amount,
    /// Smallest residual the order may be left with by a partial fill.
    pub min_fill_amount: Amount,
    /// Tolerance for fallback execution below the limit price.
    pub max_slippage_bps: u32,
    /// Absolute timestamp, `0` for never.
    pub expiration: Timestamp,
    pub routing: Routing,
}

impl OrderRequest {
    pub fn new(token: TokenId, side: OrderSide, price: Price, amount: Amount) -> Self {
        Self {
            token,
            side,
            price,
            amount,
            min_fill_amount: U256::ZERO,
            max_slippage_bps: 0,
            expiration: 0,
            routing: Routing::Resting,
        }
    }

    pub fn buy(token: TokenId, price: Price, amount: Amount) -> Self {
        Self::new(token, OrderSide::Buy, price, amount)
    }

    pub fn sell(token: TokenId, price: Price, amount: Amount) -> Self {
        Self::new(token, OrderSide::Sell, price, amount)
    }

    pub fn with_min_fill(mut self, min_fill_amount: Amount) -> Self {
        self.min_fill_amount = min_fill_amount;
        self
    }

    pub fn with_max_slippage_bps(mut self, bps: u32) -> Self {
        self.max_slippage_bps = bps;
        self
    }

    pub fn with_expiration(mut self, expiration: Timestamp) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }

    pub(crate) fn slippage_in_range(&self) -> bool {
        self.max_slippage_bps <= BPS_DENOMINATOR
    }
}

/// An order in the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub owner: Address,
    pub token: TokenId,
    pub side: OrderSide,
    /// ETH per token.
    pub price: Price,
    /// Original token amount.
    pub amount: Amount,
    pub filled_amount: Amount,
    pub min_fill_amount: Amount,
    pub max_slippage_bps: u32,
    pub expiration: Timestamp,
    pub status: OrderStatus,
    pub placed_at: Timestamp,
    pub routing: Routing,
}

impl Order {
    pub fn new(id: OrderId, owner: Address, request: &OrderRequest, now: Timestamp) -> Self {
        Self {
            id,
            owner,
            token: request.token,
            side: request.side,
            price: request.price,
            amount: request.amount,
            filled_amount: U256::ZERO,
            min_fill_amount: request.min_fill_amount,
            max_slippage_bps: request.max_slippage_bps,
            expiration: request.expiration,
            status: OrderStatus::Open,
            placed_at: now,
            routing: request.routing,
        }
    }

    pub fn remaining(&self) -> Amount {
        self.amount.saturating_sub(self.filled_amount)
    }

    /// Check if the order is still active (can be matched).
    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiration != 0 && now >= self.expiration
    }

    /// Active and not past its expiration.
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.is_active() && !self.is_expired(now)
    }

    /// Check whether a counter-order at `price` crosses this order.
    pub fn crosses(&self, price: Price) -> bool {
        match self.side {
            OrderSide::Buy => self.price >= price,
            OrderSide::Sell => self.price <= price,
        }
    }

    /// Status the order would have after filling `amount` more.
    pub fn status_after(&self, amount: Amount) -> OrderStatus {
        if self.remaining() <= amount {
            OrderStatus::Filled
        } else if self.filled_amount.is_zero() && amount.is_zero() {
            OrderStatus::Open
        } else {
            OrderStatus::PartiallyFilled
        }
    }

    /// Record a fill. Amounts above the remainder are clamped.
    pub fn apply_fill(&mut self, amount: Amount) {
        let fill = amount.min(self.remaining());
        self.status = self.status_after(fill);
        self.filled_amount += fill;
    }

    pub fn cancel(&mut self) {
        self.status = OrderStatus::Cancelled;
    }

    pub fn expire(&mut self) {
        self.status = OrderStatus::Expired;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_address() -> Address {
        Address::repeat_byte(0x01)
    }

    fn order(side: OrderSide, price: u128, amount: u64) -> Order {
        let request = OrderRequest::new(
            Address::repeat_byte(0x10),
            side,
            Price::from_u128(price, 1),
            U256::from(amount),
        );
        Order::new(OrderId(1), test_address(), &request, 100)
    }

    #[test]
    fn test_order_creation() {
        let order = order(OrderSide::Buy, 100, 1000);
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.remaining(), U256::from(1000));
        assert!(order.is_active());
        assert_eq!(order.placed_at, 100);
    }

    #[test]
    fn test_order_fill() {
        let mut order = order(OrderSide::Buy, 100, 1000);

        order.apply_fill(U256::from(400));
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining(), U256::from(600));
        assert_eq!(order.filled_amount, U256::from(400));

        order.apply_fill(U256::from(600));
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.remaining(), U256::ZERO);
        assert!(!order.is_active());
    }

    #[test]
    fn test_overfill_is_clamped() {
        let mut order = order(OrderSide::Sell, 2, 10);
        order.apply_fill(U256::from(25));
        assert_eq!(order.filled_amount, U256::from(10));
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn test_crossing() {
        let buy = order(OrderSide::Buy, 100, 1000);
        assert!(buy.crosses(Price::from_u128(95, 1))); // 100 >= 95
        assert!(!buy.crosses(Price::from_u128(105, 1))); // 100 < 105

        let sell = order(OrderSide::Sell, 100, 1000);
        assert!(sell.crosses(Price::from_u128(105, 1)));
        assert!(!sell.crosses(Price::from_u128(95, 1)));
    }

    #[test]
    fn test_expiry() {
        let mut order = order(OrderSide::Buy, 1, 1);
        assert!(!order.is_expired(u64::MAX));

        order.expiration = 200;
        assert!(order.is_live(199));
        assert!(order.is_expired(200));
        assert!(!order.is_live(200));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::Open.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
    }

    #[test]
    fn test_routing_codes() {
        assert_eq!(Routing::from_u8(0), Some(Routing::Resting));
        assert_eq!(Routing::from_u8(2), Some(Routing::Immediate));
        assert_eq!(Routing::from_u8(3), None);
        assert!(Routing::PoolBacked.uses_pool());
        assert!(!Routing::Immediate.rests());
    }
}
