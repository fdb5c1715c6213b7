//! Observable venue events and their EVM log encoding.

use crate::order::OrderId;
use crate::types::{Address, Amount, LiquiditySide, Price, RewardAsset, Timestamp, TokenId, U256};
use alloy::primitives::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;

sol! {
    interface IOtcEvents {
        event LiquidityDeposited(address indexed provider, address indexed token, bool isEth, uint256 amount, uint256 shares);
        event LiquidityWithdrawn(address indexed provider, address indexed token, bool isEth, uint256 amount, uint256 shares);
        event RewardDeposited(address indexed token, bool isEth, bool sameAsset, uint256 amount);
        event RewardClaimed(address indexed provider, address indexed token, bool isEth, uint256 sameAmount, uint256 otherAmount);
        event PoolBalanceUpdated(address indexed token, bool isEth, uint256 totalContributed, uint256 totalShares, uint256 accountedBalance);
        event ETHTransferredToOrderbook(address indexed token, uint256 amount);
        event TokenTransferredToOrderbook(address indexed token, uint256 amount);
        event ETHReceivedFromOrderbook(address indexed token, uint256 amount);
        event TokenReceivedFromOrderbook(address indexed token, uint256 amount);
        event OrderPlaced(uint256 indexed orderId, address indexed owner, address indexed token, bool isBuy, uint256 amount, uint256 priceNum, uint256 priceDenom, uint64 expiration);
        event OrderCancelled(uint256 indexed orderId, address indexed owner);
        event OrderFilled(uint256 indexed orderId, address indexed counterparty, uint256 amount, uint256 ethAmount);
        event OrderPartiallyFilled(uint256 indexed orderId, address indexed counterparty, uint256 amount, uint256 ethAmount, uint256 remaining);
        event OrderExpired(uint256 indexed orderId);
    }
}

/// Event recorded by a successful venue operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtcEvent {
    LiquidityDeposited {
        provider: Address,
        token: TokenId,
        side: LiquiditySide,
        amount: Amount,
        shares: U256,
    },
    LiquidityWithdrawn {
        provider: Address,
        token: TokenId,
        side: LiquiditySide,
        amount: Amount,
        shares: U256,
    },
    RewardDeposited {
        token: TokenId,
        side: LiquiditySide,
        asset: RewardAsset,
        amount: Amount,
    },
    RewardClaimed {
        provider: Address,
        token: TokenId,
        side: LiquiditySide,
        same: Amount,
        other: Amount,
    },
    PoolBalanceUpdated {
        token: TokenId,
        side: LiquiditySide,
        total_contributed: Amount,
        total_shares: U256,
        accounted_balance: Amount,
    },
    /// Pool custody moved to the matching bridge. `side` names the asset.
    TransferredToOrderbook {
        token: TokenId,
        side: LiquiditySide,
        amount: Amount,
    },
    /// Custody received from the matching bridge. `side` names the asset.
    ReceivedFromOrderbook {
        token: TokenId,
        side: LiquiditySide,
        amount: Amount,
    },
    OrderPlaced {
        order_id: OrderId,
        owner: Address,
        token: TokenId,
        is_buy: bool,
        amount: Amount,
        price: Price,
        expiration: Timestamp,
    },
    OrderCancelled {
        order_id: OrderId,
        owner: Address,
    },
    OrderFilled {
        order_id: OrderId,
        counterparty: Address,
        amount: Amount,
        eth_amount: Amount,
    },
    OrderPartiallyFilled {
        order_id: OrderId,
        counterparty: Address,
        amount: Amount,
        eth_amount: Amount,
        remaining: Amount,
    },
    OrderExpired {
        order_id: OrderId,
    },
}

impl OtcEvent {
    /// Event name as it appears in the log signature.
    pub fn name(&self) -> &'static str {
        match self {
            OtcEvent::LiquidityDeposited { .. } => "LiquidityDeposited",
            OtcEvent::LiquidityWithdrawn { .. } => "LiquidityWithdrawn",
            OtcEvent::RewardDeposited { .. } => "RewardDeposited",
            OtcEvent::RewardClaimed { .. } => "RewardClaimed",
            OtcEvent::PoolBalanceUpdated { .. } => "PoolBalanceUpdated",
            OtcEvent::TransferredToOrderbook { side, .. } => match side {
                LiquiditySide::Eth => "ETHTransferredToOrderbook",
                LiquiditySide::Token => "TokenTransferredToOrderbook",
            },
            OtcEvent::ReceivedFromOrderbook { side, .. } => match side {
                LiquiditySide::Eth => "ETHReceivedFromOrderbook",
                LiquiditySide::Token => "TokenReceivedFromOrderbook",
            },
            OtcEvent::OrderPlaced { .. } => "OrderPlaced",
            OtcEvent::OrderCancelled { .. } => "OrderCancelled",
            OtcEvent::OrderFilled { .. } => "OrderFilled",
            OtcEvent::OrderPartiallyFilled { .. } => "OrderPartiallyFilled",
            OtcEvent::OrderExpired { .. } => "OrderExpired",
        }
    }

    /// Encode as an EVM log emitted by `emitter`.
    pub fn to_log(&self, emitter: Address) -> Log {
        use IOtcEvents as E;

        let data = match self.clone() {
            OtcEvent::LiquidityDeposited { provider, token, side, amount, shares } => {
                E::LiquidityDeposited { provider, token, isEth: side.is_eth(), amount, shares }
                    .encode_log_data()
            }
            OtcEvent::LiquidityWithdrawn { provider, token, side, amount, shares } => {
                E::LiquidityWithdrawn { provider, token, isEth: side.is_eth(), amount, shares }
                    .encode_log_data()
            }
            OtcEvent::RewardDeposited { token, side, asset, amount } => E::RewardDeposited {
                token,
                isEth: side.is_eth(),
                sameAsset: asset == RewardAsset::Same,
                amount,
            }
            .encode_log_data(),
            OtcEvent::RewardClaimed { provider, token, side, same, other } => E::RewardClaimed {
                provider,
                token,
                isEth: side.is_eth(),
                sameAmount: same,
                otherAmount: other,
            }
            .encode_log_data(),
            OtcEvent::PoolBalanceUpdated {
                token,
                side,
                total_contributed,
                total_shares,
                accounted_balance,
            } => E::PoolBalanceUpdated {
                token,
                isEth: side.is_eth(),
                totalContributed: total_contributed,
                totalShares: total_shares,
                accountedBalance: accounted_balance,
            }
            .encode_log_data(),
            OtcEvent::TransferredToOrderbook { token, side, amount } => match side {
                LiquiditySide::Eth => E::ETHTransferredToOrderbook { token, amount }.encode_log_data(),
                LiquiditySide::Token => {
                    E::TokenTransferredToOrderbook { token, amount }.encode_log_data()
                }
            },
            OtcEvent::ReceivedFromOrderbook { token, side, amount } => match side {
                LiquiditySide::Eth => E::ETHReceivedFromOrderbook { token, amount }.encode_log_data(),
                LiquiditySide::Token => {
                    E::TokenReceivedFromOrderbook { token, amount }.encode_log_data()
                }
            },
            OtcEvent::OrderPlaced { order_id, owner, token, is_buy, amount, price, expiration } => {
                E::OrderPlaced {
                    orderId: order_id.as_u256(),
                    owner,
                    token,
                    isBuy: is_buy,
                    amount,
                    priceNum: price.numerator,
                    priceDenom: price.denominator,
                    expiration,
                }
                .encode_log_data()
            }
            OtcEvent::OrderCancelled { order_id, owner } => {
                E::OrderCancelled { orderId: order_id.as_u256(), owner }.encode_log_data()
            }
            OtcEvent::OrderFilled { order_id, counterparty, amount, eth_amount } => E::OrderFilled {
                orderId: order_id.as_u256(),
                counterparty,
                amount,
                ethAmount: eth_amount,
            }
            .encode_log_data(),
            OtcEvent::OrderPartiallyFilled {
                order_id,
                counterparty,
                amount,
                eth_amount,
                remaining,
            } => E::OrderPartiallyFilled {
                orderId: order_id.as_u256(),
                counterparty,
                amount,
                ethAmount: eth_amount,
                remaining,
            }
            .encode_log_data(),
            OtcEvent::OrderExpired { order_id } => {
                E::OrderExpired { orderId: order_id.as_u256() }.encode_log_data()
            }
        };

        Log { address: emitter, data }
    }
}
