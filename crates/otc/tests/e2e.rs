//! End-to-end tests for the OTC venue.

use otc::{
    abi::IOtcVenue, Address, CancelOutcome, FallbackError, FallbackExecutor, FillOutcome,
    InMemoryRegistry, LiquiditySide, NoFallback, OrderId, OrderRequest, OrderStatus, OtcConfig,
    OtcEvent, Price, RewardAsset, Routing, TokenId, Venue, VenueError, U256,
};
use alloy::sol_types::{SolCall, SolValue};

// Token addresses for testing
fn usdc() -> Address {
    Address::repeat_byte(0x01)
}

fn link() -> Address {
    Address::repeat_byte(0x04)
}

// Trader addresses
fn alice() -> Address {
    Address::repeat_byte(0xAA)
}

fn bob() -> Address {
    Address::repeat_byte(0xBB)
}

fn charlie() -> Address {
    Address::repeat_byte(0xCC)
}

// Registry roles
fn admin() -> Address {
    Address::repeat_byte(0x0A)
}

fn operator() -> Address {
    Address::repeat_byte(0x0B)
}

fn venue_address() -> Address {
    Address::repeat_byte(0xEE)
}

fn price(p: u128) -> Price {
    Price::from_u128(p, 1)
}

/// Venue with a USDC pool and an authorized quote operator.
fn setup_venue(config: OtcConfig) -> Venue {
    let registry = InMemoryRegistry::new(admin()).with_authorized(operator());
    let venue = Venue::new(config.with_venue_address(venue_address()), registry, NoFallback);
    venue.create_pool(alice(), usdc(), None).unwrap();
    venue.drain_events();
    venue
}

fn default_venue() -> Venue {
    setup_venue(OtcConfig::default().with_fee_bps(0).with_minimum_liquidity(U256::ZERO))
}

// ============================================================================
// Test Cases
// ============================================================================

#[test]
fn test_liquidity_round_trip() {
    let venue = setup_venue(OtcConfig::default());

    let receipt = venue
        .add_liquidity(alice(), usdc(), LiquiditySide::Eth, U256::from(1000), U256::ZERO)
        .unwrap();
    assert_eq!(receipt.shares_minted, U256::from(1000));
    assert!(receipt.bootstrap);

    let receipt = venue
        .remove_liquidity(alice(), usdc(), LiquiditySide::Eth, 10_000)
        .unwrap();
    assert_eq!(receipt.amount_out, U256::from(1000));

    let pool = venue.pool_info(usdc()).unwrap();
    assert!(pool.eth.total_shares.is_zero());
    assert!(pool.eth.total_contributed.is_zero());

    let events = venue.drain_events();
    assert!(matches!(events[0], OtcEvent::LiquidityDeposited { .. }));
    assert!(matches!(events[1], OtcEvent::PoolBalanceUpdated { .. }));
    assert!(matches!(events[2], OtcEvent::LiquidityWithdrawn { .. }));
}

#[test]
fn test_book_scenario_buy_500_sell_300() {
    let venue = default_venue();

    let buy = venue
        .place_order(alice(), OrderRequest::buy(usdc(), price(2), U256::from(500)), 1)
        .unwrap();
    let sell = venue
        .place_order(bob(), OrderRequest::sell(usdc(), price(2), U256::from(300)), 2)
        .unwrap();

    assert_eq!(sell.status, OrderStatus::Filled);
    let buy_order = venue.order(buy.order_id).unwrap().unwrap();
    assert_eq!(buy_order.status, OrderStatus::PartiallyFilled);
    assert_eq!(buy_order.filled_amount, U256::from(300));

    let events = venue.drain_events();
    assert!(events.contains(&OtcEvent::OrderPartiallyFilled {
        order_id: buy.order_id,
        counterparty: bob(),
        amount: U256::from(300),
        eth_amount: U256::from(600),
        remaining: U256::from(200),
    }));
    assert!(events.contains(&OtcEvent::OrderFilled {
        order_id: sell.order_id,
        counterparty: alice(),
        amount: U256::from(300),
        eth_amount: U256::from(600),
    }));

    assert_eq!(venue.best_price(usdc(), true, 3).unwrap(), Some(price(2)));
    assert_eq!(venue.best_price(usdc(), false, 3).unwrap(), None);
}

#[test]
fn test_fees_reward_opposite_side_providers() {
    let venue = setup_venue(OtcConfig::default().with_fee_bps(100).with_minimum_liquidity(U256::ZERO));

    // Token providers earn the ETH fee paid by buyers.
    venue
        .add_liquidity(alice(), usdc(), LiquiditySide::Token, U256::from(600), U256::ZERO)
        .unwrap();
    venue
        .add_liquidity(bob(), usdc(), LiquiditySide::Token, U256::from(400), U256::ZERO)
        .unwrap();

    venue
        .place_order(charlie(), OrderRequest::sell(usdc(), price(10), U256::from(1000)), 0)
        .unwrap();
    let report = venue
        .place_order(operator(), OrderRequest::buy(usdc(), price(10), U256::from(1000)), 0)
        .unwrap();
    assert_eq!(report.eth_amount, U256::from(10_000));

    // 1% of 10_000 ETH = 100, split 60/40.
    let pending = venue.pending_rewards(usdc(), LiquiditySide::Token, bob()).unwrap();
    assert_eq!(pending.other, U256::from(40));
    assert!(pending.same.is_zero());

    let paid = venue.claim_rewards(bob(), usdc(), LiquiditySide::Token).unwrap();
    assert_eq!(paid.other, U256::from(40));
    let again = venue.claim_rewards(bob(), usdc(), LiquiditySide::Token).unwrap();
    assert!(again.is_zero());

    let receipt = venue
        .remove_liquidity(alice(), usdc(), LiquiditySide::Token, 10_000)
        .unwrap();
    assert_eq!(receipt.rewards.other, U256::from(60));
}

#[test]
fn test_pool_backed_order_market_makes() {
    let venue = setup_venue(OtcConfig::default().with_fee_bps(0).with_minimum_liquidity(U256::ZERO));
    venue
        .add_liquidity(alice(), usdc(), LiquiditySide::Token, U256::from(1000), U256::ZERO)
        .unwrap();
    venue
        .add_liquidity(bob(), usdc(), LiquiditySide::Eth, U256::from(5000), U256::ZERO)
        .unwrap();
    venue
        .set_pool_quote(operator(), usdc(), price(2), price(3))
        .unwrap();
    venue.drain_events();

    // A resting ask at 3 fills first; the pool covers the rest.
    venue
        .place_order(charlie(), OrderRequest::sell(usdc(), price(3), U256::from(100)), 0)
        .unwrap();
    let report = venue
        .place_order(
            operator(),
            OrderRequest::buy(usdc(), price(3), U256::from(300)).with_routing(Routing::PoolBacked),
            0,
        )
        .unwrap();

    assert_eq!(report.status, OrderStatus::Filled);
    assert_eq!(report.book_fills.len(), 1);
    assert_eq!(report.pool_fill.as_ref().unwrap().amount, U256::from(200));
    assert_eq!(report.eth_amount, U256::from(900));

    // The token side sold 200 of its inventory; its providers own the 600 ETH.
    let pool = venue.pool_info(usdc()).unwrap();
    assert_eq!(pool.token_side.accounted_balance, U256::from(800));
    assert_eq!(pool.token_side.total_contributed, U256::from(800));
    assert_eq!(pool.token_side.other_asset.pot, U256::from(600));
    assert_eq!(pool.eth.accounted_balance, U256::from(5000));

    let events = venue.drain_events();
    assert!(events.contains(&OtcEvent::TransferredToOrderbook {
        token: usdc(),
        side: LiquiditySide::Token,
        amount: U256::from(200),
    }));
    assert!(events.contains(&OtcEvent::ReceivedFromOrderbook {
        token: usdc(),
        side: LiquiditySide::Eth,
        amount: U256::from(600),
    }));

    let receipt = venue
        .remove_liquidity(alice(), usdc(), LiquiditySide::Token, 10_000)
        .unwrap();
    assert_eq!(receipt.amount_out, U256::from(800));
    assert_eq!(receipt.rewards.other, U256::from(600));

    let receipt = venue
        .remove_liquidity(bob(), usdc(), LiquiditySide::Eth, 10_000)
        .unwrap();
    assert_eq!(receipt.amount_out, U256::from(5000));
    assert!(receipt.rewards.is_zero());
}

#[test]
fn test_pool_sale_leaves_nothing_stranded() {
    let venue = setup_venue(OtcConfig::default().with_fee_bps(100).with_minimum_liquidity(U256::ZERO));
    venue
        .add_liquidity(bob(), usdc(), LiquiditySide::Eth, U256::from(10_000), U256::ZERO)
        .unwrap();
    venue
        .add_liquidity(alice(), usdc(), LiquiditySide::Token, U256::from(1000), U256::ZERO)
        .unwrap();
    venue
        .set_pool_quote(operator(), usdc(), price(2), price(3))
        .unwrap();

    let report = venue
        .place_order(
            charlie(),
            OrderRequest::buy(usdc(), price(3), U256::from(400)).with_routing(Routing::PoolBacked),
            0,
        )
        .unwrap();
    assert_eq!(report.pool_fill.unwrap().eth_amount, U256::from(1200));

    for side in [LiquiditySide::Eth, LiquiditySide::Token] {
        let pool_side = venue.pool_info(usdc()).unwrap().side(side).clone();
        assert!(pool_side.total_contributed <= pool_side.accounted_balance);
    }

    // Token providers get the unsold tokens, the sale proceeds and the fee.
    let receipt = venue
        .remove_liquidity(alice(), usdc(), LiquiditySide::Token, 10_000)
        .unwrap();
    assert_eq!(receipt.amount_out, U256::from(600));
    assert_eq!(receipt.rewards.other, U256::from(1212));

    let receipt = venue
        .remove_liquidity(bob(), usdc(), LiquiditySide::Eth, 10_000)
        .unwrap();
    assert_eq!(receipt.amount_out, U256::from(10_000));

    // 10_000 + 1200 + 12 ETH came in and the same left again.
    let pool = venue.pool_info(usdc()).unwrap();
    for side in [&pool.eth, &pool.token_side] {
        assert!(side.total_shares.is_zero());
        assert!(side.total_contributed.is_zero());
        assert!(side.accounted_balance.is_zero());
        assert!(side.same_asset.pot.is_zero());
        assert!(side.other_asset.pot.is_zero());
    }
    assert_eq!(
        venue
            .sync_balance(operator(), usdc(), LiquiditySide::Eth, U256::ZERO)
            .unwrap(),
        U256::ZERO
    );
}

#[test]
fn test_zero_address_is_not_privileged() {
    let venue = default_venue();
    venue
        .add_liquidity(alice(), usdc(), LiquiditySide::Eth, U256::from(100), U256::ZERO)
        .unwrap();

    assert_eq!(
        venue
            .deposit_reward(Address::ZERO, usdc(), LiquiditySide::Eth, U256::from(1), RewardAsset::Same)
            .unwrap_err(),
        VenueError::Unauthorized(Address::ZERO)
    );
    assert_eq!(
        venue
            .transfer_to_orderbook(Address::ZERO, usdc(), LiquiditySide::Eth, U256::from(1))
            .unwrap_err(),
        VenueError::Ledger(otc::LedgerError::Unauthorized(Address::ZERO))
    );
}

#[test]
fn test_quote_requires_operator() {
    let venue = default_venue();
    assert!(matches!(
        venue.set_pool_quote(alice(), usdc(), price(2), price(3)),
        Err(VenueError::Ledger(otc::LedgerError::Unauthorized(_)))
    ));
    assert!(matches!(
        venue.set_pool_quote(operator(), usdc(), price(3), price(2)),
        Err(VenueError::Ledger(otc::LedgerError::InvalidQuote))
    ));
}

#[test]
fn test_min_fill_boundary() {
    let venue = default_venue();
    let report = venue
        .place_order(
            alice(),
            OrderRequest::sell(usdc(), price(1), U256::from(100)).with_min_fill(U256::from(50)),
            0,
        )
        .unwrap();

    let err = venue
        .fill_order(bob(), report.order_id, U256::from(60), 0)
        .unwrap_err();
    assert!(matches!(err, VenueError::Order(otc::OrderError::BelowMinFill { .. })));

    let outcome = venue
        .fill_order(bob(), report.order_id, U256::from(100), 0)
        .unwrap();
    assert!(matches!(
        outcome,
        FillOutcome::Filled {
            status: OrderStatus::Filled,
            ..
        }
    ));
}

#[test]
fn test_cancel_order() {
    let venue = default_venue();
    let report = venue
        .place_order(alice(), OrderRequest::buy(usdc(), price(5), U256::from(10)), 0)
        .unwrap();

    assert!(matches!(
        venue.cancel_order(bob(), report.order_id, 0),
        Err(VenueError::Order(otc::OrderError::NotOrderOwner { .. }))
    ));
    assert_eq!(
        venue.cancel_order(alice(), report.order_id, 0).unwrap(),
        CancelOutcome::Cancelled(report.order_id)
    );
    assert!(matches!(
        venue.cancel_order(alice(), report.order_id, 0),
        Err(VenueError::Order(otc::OrderError::OrderNotOpen(_, OrderStatus::Cancelled)))
    ));
    assert_eq!(venue.best_price(usdc(), true, 0).unwrap(), None);
}

#[test]
fn test_expired_fill_transitions_order() {
    let venue = default_venue();
    let report = venue
        .place_order(
            alice(),
            OrderRequest::sell(usdc(), price(1), U256::from(10)).with_expiration(100),
            0,
        )
        .unwrap();
    venue.drain_events();

    let outcome = venue
        .fill_order(bob(), report.order_id, U256::from(10), 150)
        .unwrap();
    assert_eq!(outcome, FillOutcome::Expired(report.order_id));
    assert_eq!(
        venue.drain_events(),
        vec![OtcEvent::OrderExpired {
            order_id: report.order_id
        }]
    );

    assert!(matches!(
        venue.fill_order(bob(), report.order_id, U256::from(10), 150),
        Err(VenueError::Order(otc::OrderError::OrderNotOpen(_, OrderStatus::Expired)))
    ));
}

#[test]
fn test_depth_levels() {
    let venue = default_venue();
    for (p, amount) in [(10u128, 5u64), (11, 3), (12, 4), (11, 2)] {
        venue
            .place_order(alice(), OrderRequest::sell(usdc(), price(p), U256::from(amount)), 0)
            .unwrap();
    }

    let depth = venue.depth(usdc(), false, 2, 0).unwrap();
    assert_eq!(
        depth,
        vec![(price(10), U256::from(5)), (price(11), U256::from(5))]
    );
    // Restartable: a second query starts from the top again.
    assert_eq!(venue.depth(usdc(), false, 2, 0).unwrap(), depth);
}

#[test]
fn test_unknown_pool_and_blocked_token() {
    let venue = default_venue();
    assert!(matches!(
        venue.place_order(alice(), OrderRequest::buy(link(), price(1), U256::from(1)), 0),
        Err(VenueError::Ledger(otc::LedgerError::PoolNotFound(_)))
    ));

    venue.registry().set_token_blocked(admin(), link(), true).unwrap();
    assert_eq!(
        venue.create_pool(alice(), link(), None).unwrap_err(),
        VenueError::TokenBlocked(link())
    );
}

#[test]
fn test_reserves_pass_through() {
    let venue = default_venue();
    let pair = Address::repeat_byte(0x50);
    venue.create_pool(alice(), link(), Some(pair)).unwrap();

    let reserves = |p: Address| (p == pair).then_some((U256::from(7), U256::from(9)));
    assert_eq!(
        venue.reserves(link(), &reserves).unwrap(),
        (U256::from(7), U256::from(9))
    );
    assert_eq!(
        venue.reserves(usdc(), &reserves).unwrap_err(),
        VenueError::NoExternalPair(usdc())
    );
}

#[test]
fn test_sync_balance_rewards_same_side() {
    let venue = default_venue();
    venue
        .add_liquidity(alice(), usdc(), LiquiditySide::Eth, U256::from(1000), U256::ZERO)
        .unwrap();

    let excess = venue
        .sync_balance(operator(), usdc(), LiquiditySide::Eth, U256::from(1025))
        .unwrap();
    assert_eq!(excess, U256::from(25));

    let pending = venue.pending_rewards(usdc(), LiquiditySide::Eth, alice()).unwrap();
    assert_eq!(pending.same, U256::from(25));
}

#[test]
fn test_deposit_reward_event() {
    let venue = default_venue();
    venue
        .add_liquidity(alice(), usdc(), LiquiditySide::Token, U256::from(10), U256::ZERO)
        .unwrap();
    venue.drain_events();

    venue
        .deposit_reward(operator(), usdc(), LiquiditySide::Token, U256::from(5), RewardAsset::Other)
        .unwrap();
    assert_eq!(
        venue.drain_events(),
        vec![OtcEvent::RewardDeposited {
            token: usdc(),
            side: LiquiditySide::Token,
            asset: RewardAsset::Other,
            amount: U256::from(5),
        }]
    );
}

#[test]
fn test_logs_use_venue_address() {
    let venue = default_venue();
    venue
        .place_order(alice(), OrderRequest::buy(usdc(), price(2), U256::from(1)), 0)
        .unwrap();

    let logs = venue.drain_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].address, venue_address());
    assert!(venue.drain_logs().is_empty());
}

#[test]
fn test_calldata_round_trip() {
    let venue = default_venue();
    let calldata = IOtcVenue::addLiquidityCall {
        token: usdc(),
        isEth: false,
        amount: U256::from(250),
        minValueOut: U256::from(250),
    }
    .abi_encode();
    let out = venue.handle_call(bob(), &calldata, 0).unwrap();
    assert_eq!(U256::abi_decode(&out).unwrap(), U256::from(250));

    let calldata = IOtcVenue::removeLiquidityCall {
        token: usdc(),
        isEth: false,
        sharesBps: U256::from(5_000),
    }
    .abi_encode();
    let out = venue.handle_call(bob(), &calldata, 0).unwrap();
    let (amount_out, same, other) = <(U256, U256, U256)>::abi_decode(&out).unwrap();
    assert_eq!(amount_out, U256::from(125));
    assert!(same.is_zero() && other.is_zero());
}

/// Executor that fills at a fixed rate of output per input.
struct FixedRate {
    numerator: u64,
    denominator: u64,
}

impl FallbackExecutor for FixedRate {
    fn execute_trade(
        &self,
        _token: TokenId,
        amount: U256,
        _min_amount_out: U256,
        _is_buy: bool,
    ) -> Result<U256, FallbackError> {
        Ok(amount * U256::from(self.numerator) / U256::from(self.denominator))
    }
}

#[test]
fn test_immediate_order_reaches_fallback() {
    let registry = InMemoryRegistry::new(admin()).with_fallback_executor(Address::repeat_byte(0xFE));
    let venue = Venue::new(
        OtcConfig::default().with_fee_bps(0),
        registry,
        FixedRate {
            numerator: 1,
            denominator: 2,
        },
    );
    venue.create_pool(alice(), usdc(), None).unwrap();

    // Buying 100 at a limit of 2 spends 200 ETH; the executor returns 100.
    let report = venue
        .place_order(
            alice(),
            OrderRequest::buy(usdc(), price(2), U256::from(100)).with_routing(Routing::Immediate),
            0,
        )
        .unwrap();
    assert_eq!(report.status, OrderStatus::Filled);
    let fill = report.fallback_fill.unwrap();
    assert_eq!(fill.amount_in, U256::from(200));
    assert_eq!(fill.amount_out, U256::from(100));
    assert!(venue.order(report.order_id).unwrap().is_some());
    assert_eq!(venue.best_price(usdc(), true, 0).unwrap(), None);

    // Selling 100 at 2 expects 200 ETH but only gets 50.
    let err = venue
        .place_order(
            bob(),
            OrderRequest::sell(usdc(), price(2), U256::from(100))
                .with_routing(Routing::Immediate)
                .with_max_slippage_bps(100),
            0,
        )
        .unwrap_err();
    assert_eq!(
        err,
        VenueError::SlippageExceeded {
            expected: U256::from(198),
            actual: U256::from(50),
        }
    );
    assert_eq!(venue.order(OrderId(2)).unwrap(), None);
}
