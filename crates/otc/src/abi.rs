//! Calldata entry point for the venue.

use crate::external::FallbackExecutor;
use crate::order::{OrderId, OrderRequest, OrderSide, Routing};
use crate::registry::Registry;
use crate::types::{Address, LiquiditySide, Price, Timestamp, U256};
use crate::venue::{Venue, VenueError};
use alloy::hex;
use alloy::primitives::Bytes;
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};
use tracing::debug;

sol! {
    interface IOtcVenue {
        function addLiquidity(address token, bool isEth, uint256 amount, uint256 minValueOut) returns (uint256 shares);
        function removeLiquidity(address token, bool isEth, uint256 sharesBps) returns (uint256 amountOut, uint256 sameReward, uint256 otherReward);
        function claimRewards(address token, bool isEth) returns (uint256 sameAmount, uint256 otherAmount);
        function placeOrder(address token, uint256 amount, uint256 priceNum, uint256 priceDenom, uint64 expiration, uint256 minFillAmount, uint16 maxSlippageBps, bool isBuy, uint8 routing) returns (uint256 orderId);
        function cancelOrder(uint256 orderId);
        function fillOrder(uint256 orderId, uint256 amount);
        function getBestPrice(address token, bool isBuy) returns (bool found, uint256 priceNum, uint256 priceDenom);
        function getUserSharePercentage(address token, bool isEth, address user) returns (uint256 bps);
    }
}

pub mod selectors {
    use super::IOtcVenue;
    use alloy::sol_types::SolCall;

    pub const ADD_LIQUIDITY: [u8; 4] = IOtcVenue::addLiquidityCall::SELECTOR;
    pub const REMOVE_LIQUIDITY: [u8; 4] = IOtcVenue::removeLiquidityCall::SELECTOR;
    pub const CLAIM_REWARDS: [u8; 4] = IOtcVenue::claimRewardsCall::SELECTOR;
    pub const PLACE_ORDER: [u8; 4] = IOtcVenue::placeOrderCall::SELECTOR;
    pub const CANCEL_ORDER: [u8; 4] = IOtcVenue::cancelOrderCall::SELECTOR;
    pub const FILL_ORDER: [u8; 4] = IOtcVenue::fillOrderCall::SELECTOR;
    pub const GET_BEST_PRICE: [u8; 4] = IOtcVenue::getBestPriceCall::SELECTOR;
    pub const GET_USER_SHARE_PERCENTAGE: [u8; 4] = IOtcVenue::getUserSharePercentageCall::SELECTOR;
}

fn decode<C: SolCall>(data: &[u8], name: &str) -> Result<C, VenueError> {
    C::abi_decode_raw(data)
        .map_err(|e| VenueError::InvalidCalldata(format!("failed to decode {name}: {e}")))
}

fn order_id(raw: U256) -> Result<OrderId, VenueError> {
    u64::try_from(raw)
        .map(OrderId)
        .map_err(|_| VenueError::InvalidCalldata(format!("order id {raw} out of range")))
}

impl<R: Registry, F: FallbackExecutor> Venue<R, F> {
    /// Dispatch ABI-encoded calldata from `caller` and return the
    /// ABI-encoded result.
    pub fn handle_call(
        &self,
        caller: Address,
        calldata: &[u8],
        now: Timestamp,
    ) -> Result<Bytes, VenueError> {
        if calldata.len() < 4 {
            return Err(VenueError::InvalidCalldata(
                "calldata too short for function selector".to_string(),
            ));
        }

        let (selector, data) = calldata.split_at(4);
        let encoded = match selector {
            s if s == selectors::ADD_LIQUIDITY.as_slice() => {
                let call: IOtcVenue::addLiquidityCall = decode(data, "addLiquidity")?;
                let receipt = self.add_liquidity(
                    caller,
                    call.token,
                    LiquiditySide::from_is_eth(call.isEth),
                    call.amount,
                    call.minValueOut,
                )?;
                receipt.shares_minted.abi_encode()
            }
            s if s == selectors::REMOVE_LIQUIDITY.as_slice() => {
                let call: IOtcVenue::removeLiquidityCall = decode(data, "removeLiquidity")?;
                let bps = u32::try_from(call.sharesBps).map_err(|_| {
                    VenueError::InvalidCalldata(format!("share fraction {} out of range", call.sharesBps))
                })?;
                let receipt = self.remove_liquidity(
                    caller,
                    call.token,
                    LiquiditySide::from_is_eth(call.isEth),
                    bps,
                )?;
                (receipt.amount_out, receipt.rewards.same, receipt.rewards.other).abi_encode()
            }
            s if s == selectors::CLAIM_REWARDS.as_slice() => {
                let call: IOtcVenue::claimRewardsCall = decode(data, "claimRewards")?;
                let paid =
                    self.claim_rewards(caller, call.token, LiquiditySide::from_is_eth(call.isEth))?;
                (paid.same, paid.other).abi_encode()
            }
            s if s == selectors::PLACE_ORDER.as_slice() => {
                let call: IOtcVenue::placeOrderCall = decode(data, "placeOrder")?;
                let price = Price::checked(call.priceNum, call.priceDenom).ok_or_else(|| {
                    VenueError::InvalidCalldata(format!(
                        "invalid price {}/{}",
                        call.priceNum, call.priceDenom
                    ))
                })?;
                let routing = Routing::from_u8(call.routing).ok_or_else(|| {
                    VenueError::InvalidCalldata(format!("unknown routing {}", call.routing))
                })?;
                let request = OrderRequest::new(
                    call.token,
                    OrderSide::from_is_buy(call.isBuy),
                    price,
                    call.amount,
                )
                .with_min_fill(call.minFillAmount)
                .with_max_slippage_bps(u32::from(call.maxSlippageBps))
                .with_expiration(call.expiration)
                .with_routing(routing);
                let report = self.place_order(caller, request, now)?;
                report.order_id.as_u256().abi_encode()
            }
            s if s == selectors::CANCEL_ORDER.as_slice() => {
                let call: IOtcVenue::cancelOrderCall = decode(data, "cancelOrder")?;
                self.cancel_order(caller, order_id(call.orderId)?, now)?;
                Vec::new()
            }
            s if s == selectors::FILL_ORDER.as_slice() => {
                let call: IOtcVenue::fillOrderCall = decode(data, "fillOrder")?;
                self.fill_order(caller, order_id(call.orderId)?, call.amount, now)?;
                Vec::new()
            }
            s if s == selectors::GET_BEST_PRICE.as_slice() => {
                let call: IOtcVenue::getBestPriceCall = decode(data, "getBestPrice")?;
                match self.best_price(call.token, call.isBuy, now)? {
                    Some(price) => (true, price.numerator, price.denominator).abi_encode(),
                    None => (false, U256::ZERO, U256::ZERO).abi_encode(),
                }
            }
            s if s == selectors::GET_USER_SHARE_PERCENTAGE.as_slice() => {
                let call: IOtcVenue::getUserSharePercentageCall =
                    decode(data, "getUserSharePercentage")?;
                self.user_share_bps(call.token, LiquiditySide::from_is_eth(call.isEth), call.user)?
                    .abi_encode()
            }
            _ => {
                return Err(VenueError::InvalidCalldata(format!(
                    "unknown function selector: 0x{}",
                    hex::encode(selector)
                )))
            }
        };

        debug!(selector = %hex::encode(selector), %caller, "call handled");
        Ok(encoded.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OtcConfig;
    use crate::external::NoFallback;
    use crate::registry::InMemoryRegistry;

    fn token() -> Address {
        Address::repeat_byte(0x01)
    }

    fn venue() -> Venue {
        let venue = Venue::new(
            OtcConfig::default().with_minimum_liquidity(U256::ZERO),
            InMemoryRegistry::new(Address::repeat_byte(0x0A)),
            NoFallback,
        );
        venue.create_pool(Address::ZERO, token(), None).unwrap();
        venue
    }

    #[test]
    fn test_add_liquidity_and_share_query() {
        let venue = venue();
        let alice = Address::repeat_byte(0xAA);

        let calldata = IOtcVenue::addLiquidityCall {
            token: token(),
            isEth: true,
            amount: U256::from(1000),
            minValueOut: U256::ZERO,
        }
        .abi_encode();
        let out = venue.handle_call(alice, &calldata, 0).unwrap();
        assert_eq!(U256::abi_decode(&out).unwrap(), U256::from(1000));

        let calldata = IOtcVenue::getUserSharePercentageCall {
            token: token(),
            isEth: true,
            user: alice,
        }
        .abi_encode();
        let out = venue.handle_call(alice, &calldata, 0).unwrap();
        assert_eq!(U256::abi_decode(&out).unwrap(), U256::from(10_000));
    }

    #[test]
    fn test_place_order_and_best_price() {
        let venue = venue();
        let calldata = IOtcVenue::placeOrderCall {
            token: token(),
            amount: U256::from(500),
            priceNum: U256::from(2),
            priceDenom: U256::from(1),
            expiration: 0,
            minFillAmount: U256::ZERO,
            maxSlippageBps: 0,
            isBuy: true,
            routing: 0,
        }
        .abi_encode();
        let out = venue
            .handle_call(Address::repeat_byte(0xAA), &calldata, 0)
            .unwrap();
        assert_eq!(U256::abi_decode(&out).unwrap(), U256::from(1));

        let calldata = IOtcVenue::getBestPriceCall {
            token: token(),
            isBuy: true,
        }
        .abi_encode();
        let out = venue.handle_call(Address::ZERO, &calldata, 0).unwrap();
        let (found, num, denom) = <(bool, U256, U256)>::abi_decode(&out).unwrap();
        assert!(found);
        assert_eq!((num, denom), (U256::from(2), U256::from(1)));
    }

    #[test]
    fn test_bad_calldata() {
        let venue = venue();
        assert!(matches!(
            venue.handle_call(Address::ZERO, &[0x01, 0x02], 0),
            Err(VenueError::InvalidCalldata(_))
        ));
        assert!(matches!(
            venue.handle_call(Address::ZERO, &[0xde, 0xad, 0xbe, 0xef], 0),
            Err(VenueError::InvalidCalldata(_))
        ));

        let mut truncated = IOtcVenue::claimRewardsCall {
            token: token(),
            isEth: false,
        }
        .abi_encode();
        truncated.truncate(20);
        assert!(matches!(
            venue.handle_call(Address::ZERO, &truncated, 0),
            Err(VenueError::InvalidCalldata(_))
        ));
    }
}
