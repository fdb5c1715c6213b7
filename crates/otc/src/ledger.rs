//! Dual-sided liquidity ledger.
//!
//! Each token has one pool with an ETH side and a token side. A side mints
//! LP shares against its own principal and keeps two reward streams (see
//! [`crate::rewards`]).
//!
//! Every operation works on copies of the touched side and position and
//! writes them back only once all checks and arithmetic have succeeded, so a
//! failed call leaves the ledger untouched.

use crate::math::{checked_add, mul_div, share_in_bps, MathError, BPS_DENOMINATOR};
use crate::position::{PositionKey, PositionStatus, PositionStore, ProviderPosition};
use crate::registry::Registry;
use crate::rewards::RewardPair;
use crate::types::{Address, Amount, LiquiditySide, Price, RewardAsset, TokenId, ETH_TOKEN, U256};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

/// State of one side of a token pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSide {
    /// Sum of active providers' principal.
    pub total_contributed: Amount,
    /// Sum of minted LP shares.
    pub total_shares: U256,
    /// Principal the pool believes it holds, excluding reward pots.
    pub accounted_balance: Amount,
    /// Principal on loan to the matching bridge.
    pub lent: Amount,
    /// Rewards paid in this side's own asset.
    pub same_asset: crate::rewards::RewardStream,
    /// Rewards paid in the opposite side's asset.
    pub other_asset: crate::rewards::RewardStream,
}

impl PoolSide {
    /// Shares minted for a deposit of `amount`.
    fn shares_for_deposit(&self, amount: Amount) -> Result<U256, LedgerError> {
        if self.total_shares.is_zero() {
            if !self.total_contributed.is_zero() {
                return Err(LedgerError::InconsistentPoolState(
                    "contributed principal without shares",
                ));
            }
            return Ok(amount);
        }
        if self.total_contributed.is_zero() {
            return Err(LedgerError::InconsistentPoolState(
                "shares without contributed principal",
            ));
        }
        // Truncation favors existing holders.
        Ok(mul_div(amount, self.total_shares, self.total_contributed)?)
    }

    /// Principal the pool may sell to takers: held in custody and above the
    /// reserve that stays behind while shares exist.
    pub fn sellable(&self, floor: Amount) -> Amount {
        let reserve = floor.max(U256::from(1));
        self.accounted_balance
            .min(self.total_contributed.saturating_sub(reserve))
    }

    /// Principal redeemable for `shares`.
    fn amount_for_shares(&self, shares: U256) -> Result<Amount, LedgerError> {
        Ok(mul_div(shares, self.total_contributed, self.total_shares)?)
    }

    /// Custody expected for this side's asset given the opposite side's
    /// other-asset pot, which is paid in this side's asset.
    fn expected_custody(&self, opposite: &PoolSide) -> Result<Amount, MathError> {
        let held = checked_add(self.accounted_balance, self.same_asset.pot)?;
        checked_add(held, opposite.other_asset.pot)
    }
}

/// Operator bid/ask at which the pool fills order shortfalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolQuote {
    /// Price at which the pool buys tokens from sellers.
    pub bid: Price,
    /// Price at which the pool sells tokens to buyers.
    pub ask: Price,
}

/// Both sides of a token's pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPool {
    pub token: TokenId,
    pub eth: PoolSide,
    pub token_side: PoolSide,
    /// Public AMM pair used for reserve queries only.
    pub external_pair: Option<Address>,
    pub quote: Option<PoolQuote>,
}

impl TokenPool {
    fn new(token: TokenId, external_pair: Option<Address>) -> Self {
        Self {
            token,
            eth: PoolSide::default(),
            token_side: PoolSide::default(),
            external_pair,
            quote: None,
        }
    }

    pub fn side(&self, side: LiquiditySide) -> &PoolSide {
        match side {
            LiquiditySide::Eth => &self.eth,
            LiquiditySide::Token => &self.token_side,
        }
    }

    pub fn side_mut(&mut self, side: LiquiditySide) -> &mut PoolSide {
        match side {
            LiquiditySide::Eth => &mut self.eth,
            LiquiditySide::Token => &mut self.token_side,
        }
    }
}

/// Outcome of a deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReceipt {
    pub shares_minted: U256,
    /// First shares of this side (minted 1:1).
    pub bootstrap: bool,
    /// The position existed before and had been closed.
    pub reopened: bool,
}

/// Outcome of a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawReceipt {
    pub shares_burned: U256,
    /// Principal paid out.
    pub amount_out: Amount,
    /// Pending rewards flushed with the withdrawal.
    pub rewards: RewardPair,
    /// The position holds no shares anymore.
    pub closed: bool,
}

/// Copy of a token pool's sides used by the bridge to plan several
/// movements and commit them at once.
#[derive(Debug, Clone)]
pub struct StagedPool {
    pub token: TokenId,
    pub eth: PoolSide,
    pub token_side: PoolSide,
    pub quote: Option<PoolQuote>,
    /// Minimum liquidity floor of the ledger the pool was staged from.
    pub floor: Amount,
}

impl StagedPool {
    pub fn side(&self, side: LiquiditySide) -> &PoolSide {
        match side {
            LiquiditySide::Eth => &self.eth,
            LiquiditySide::Token => &self.token_side,
        }
    }

    pub fn side_mut(&mut self, side: LiquiditySide) -> &mut PoolSide {
        match side {
            LiquiditySide::Eth => &mut self.eth,
            LiquiditySide::Token => &mut self.token_side,
        }
    }

    /// Lend principal custody to the bridge. Shares and the share-price
    /// basis are untouched; the loan is tracked until it is returned.
    pub fn transfer_to_bridge(&mut self, side: LiquiditySide, amount: Amount) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        let pool_side = self.side_mut(side);
        pool_side.accounted_balance = pool_side.accounted_balance.checked_sub(amount).ok_or(
            LedgerError::InsufficientLiquidity {
                requested: amount,
                available: pool_side.accounted_balance,
            },
        )?;
        pool_side.lent = checked_add(pool_side.lent, amount)?;
        Ok(())
    }

    /// Take lent custody back from the bridge.
    pub fn receive_from_bridge(&mut self, side: LiquiditySide, amount: Amount) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        let pool_side = self.side_mut(side);
        pool_side.lent = pool_side.lent.checked_sub(amount).ok_or(
            LedgerError::ReturnExceedsLoan {
                returned: amount,
                outstanding: pool_side.lent,
            },
        )?;
        pool_side.accounted_balance = checked_add(pool_side.accounted_balance, amount)?;
        Ok(())
    }

    /// Sell `amount` of a side's principal to a taker for `proceeds` of the
    /// opposite asset.
    ///
    /// The sold principal leaves both `total_contributed` and
    /// `accounted_balance`, lowering the value of a share in this side's
    /// asset. The proceeds belong to the same providers and are paid out pro
    /// rata through the side's other-asset stream.
    pub fn sell_inventory(
        &mut self,
        side: LiquiditySide,
        amount: Amount,
        proceeds: Amount,
    ) -> Result<(), LedgerError> {
        if amount.is_zero() || proceeds.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        let floor = self.floor;
        let pool_side = self.side_mut(side);
        let available = pool_side.sellable(floor);
        if amount > available {
            return Err(LedgerError::InsufficientLiquidity {
                requested: amount,
                available,
            });
        }
        pool_side.total_contributed -= amount;
        pool_side.accounted_balance -= amount;
        pool_side.inject_reward(proceeds, RewardAsset::Other)
    }

    pub fn inject_fee(
        &mut self,
        side: LiquiditySide,
        amount: Amount,
        asset: RewardAsset,
    ) -> Result<(), LedgerError> {
        self.side_mut(side).inject_reward(amount, asset)
    }
}

/// Per-token liquidity ledger with its position store.
#[derive(Debug, Clone)]
pub struct Ledger {
    pub(crate) pools: HashMap<TokenId, TokenPool>,
    pub(crate) positions: PositionStore,
    minimum_liquidity: Amount,
}

impl Ledger {
    /// Create a ledger with the given minimum liquidity floor.
    pub fn new(minimum_liquidity: Amount) -> Self {
        Self {
            pools: HashMap::new(),
            positions: PositionStore::new(),
            minimum_liquidity,
        }
    }

    /// Open a pool for `token`.
    pub fn create_pool(
        &mut self,
        token: TokenId,
        external_pair: Option<Address>,
    ) -> Result<&TokenPool, LedgerError> {
        if token == ETH_TOKEN {
            return Err(LedgerError::InvalidToken(token));
        }
        if self.pools.contains_key(&token) {
            return Err(LedgerError::PoolAlreadyExists(token));
        }
        info!(%token, ?external_pair, "pool created");
        Ok(self
            .pools
            .entry(token)
            .or_insert_with(|| TokenPool::new(token, external_pair)))
    }

    pub fn pool(&self, token: TokenId) -> Option<&TokenPool> {
        self.pools.get(&token)
    }

    pub(crate) fn pool_mut(&mut self, token: TokenId) -> Result<&mut TokenPool, LedgerError> {
        self.pools
            .get_mut(&token)
            .ok_or(LedgerError::PoolNotFound(token))
    }

    pub fn pools(&self) -> impl Iterator<Item = &TokenPool> + '_ {
        self.pools.values()
    }

    pub fn position(&self, key: &PositionKey) -> Option<&ProviderPosition> {
        self.positions.get(key)
    }

    pub fn positions(&self) -> &PositionStore {
        &self.positions
    }

    /// LP shares held by a provider.
    pub fn user_lp_shares(&self, key: &PositionKey) -> U256 {
        self.positions
            .get(key)
            .map(|p| p.shares)
            .unwrap_or(U256::ZERO)
    }

    /// Provider's share of its pool side in basis points.
    pub fn user_share_bps(&self, key: &PositionKey) -> Result<U256, LedgerError> {
        let pool = self.pool(key.token).ok_or(LedgerError::PoolNotFound(key.token))?;
        Ok(share_in_bps(
            self.user_lp_shares(key),
            pool.side(key.side).total_shares,
        )?)
    }

    /// Set the bid/ask at which the pool backs order shortfalls.
    pub fn set_quote(
        &mut self,
        registry: &(impl Registry + ?Sized),
        caller: Address,
        token: TokenId,
        quote: PoolQuote,
    ) -> Result<(), LedgerError> {
        authorize(registry, caller)?;
        if quote.bid > quote.ask {
            return Err(LedgerError::InvalidQuote);
        }
        self.pool_mut(token)?.quote = Some(quote);
        info!(%token, bid = %quote.bid, ask = %quote.ask, "pool quote updated");
        Ok(())
    }

    /// Deposit principal into one side of a pool.
    ///
    /// `min_value_out` is the least principal the minted shares must redeem
    /// for right after the deposit.
    pub fn deposit(
        &mut self,
        token: TokenId,
        side: LiquiditySide,
        owner: Address,
        amount: Amount,
        min_value_out: Amount,
    ) -> Result<DepositReceipt, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        let key = PositionKey::new(token, side, owner);
        let existing = self.positions.get(&key).cloned();
        let pool = self
            .pools
            .get_mut(&token)
            .ok_or(LedgerError::PoolNotFound(token))?;

        let mut staged = pool.side(side).clone();
        let bootstrap = staged.total_shares.is_zero();
        let shares_minted = staged.shares_for_deposit(amount)?;
        if shares_minted.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }

        let new_contributed = checked_add(staged.total_contributed, amount)?;
        let new_shares = checked_add(staged.total_shares, shares_minted)?;
        let redeemable = mul_div(shares_minted, new_contributed, new_shares)?;
        if redeemable < min_value_out {
            return Err(LedgerError::SlippageExceeded {
                expected: min_value_out,
                actual: redeemable,
            });
        }

        let reopened = existing.as_ref().is_some_and(|p| !p.is_active());
        let mut position = existing.unwrap_or_default();
        staged.settle(&mut position)?;

        staged.total_contributed = new_contributed;
        staged.total_shares = new_shares;
        staged.accounted_balance = checked_add(staged.accounted_balance, amount)?;

        position.shares = checked_add(position.shares, shares_minted)?;
        position.principal = checked_add(position.principal, amount)?;
        position.status = PositionStatus::Active;
        staged.checkpoint(&mut position)?;

        if bootstrap {
            // Rewards injected while the side was empty go to its first shares.
            staged.same_asset.distribute(new_shares)?;
            staged.other_asset.distribute(new_shares)?;
        }

        *pool.side_mut(side) = staged;
        self.positions.put(key, position);

        info!(%token, %side, %owner, %amount, shares = %shares_minted, "liquidity deposited");
        Ok(DepositReceipt {
            shares_minted,
            bootstrap,
            reopened,
        })
    }

    /// Withdraw `shares_bps` (parts per ten thousand) of the owner's shares.
    pub fn withdraw(
        &mut self,
        token: TokenId,
        side: LiquiditySide,
        owner: Address,
        shares_bps: u32,
    ) -> Result<WithdrawReceipt, LedgerError> {
        if shares_bps == 0 || shares_bps > BPS_DENOMINATOR {
            return Err(LedgerError::InvalidBps(shares_bps));
        }
        let key = PositionKey::new(token, side, owner);
        let mut position = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::PositionNotFound)?;
        let floor = self.minimum_liquidity;
        let pool = self
            .pools
            .get_mut(&token)
            .ok_or(LedgerError::PoolNotFound(token))?;

        let mut staged = pool.side(side).clone();
        staged.settle(&mut position)?;

        let shares_burned = mul_div(
            position.shares,
            U256::from(shares_bps),
            U256::from(BPS_DENOMINATOR),
        )?;
        if shares_burned.is_zero() {
            return Err(LedgerError::InsufficientShares {
                requested: shares_burned,
                held: position.shares,
            });
        }
        if shares_burned > position.shares || shares_burned > staged.total_shares {
            return Err(LedgerError::InsufficientShares {
                requested: shares_burned,
                held: position.shares,
            });
        }

        let amount_out = staged.amount_for_shares(shares_burned)?;
        let remaining_shares = staged.total_shares - shares_burned;
        let remaining_contributed = staged
            .total_contributed
            .checked_sub(amount_out)
            .ok_or(LedgerError::InconsistentPoolState("payout above contributed"))?;
        if !remaining_shares.is_zero() && remaining_contributed < floor {
            return Err(LedgerError::MinimumLiquidityBreach {
                remaining: remaining_contributed,
                floor,
            });
        }
        staged.accounted_balance = staged.accounted_balance.checked_sub(amount_out).ok_or(
            LedgerError::InsufficientLiquidity {
                requested: amount_out,
                available: staged.accounted_balance,
            },
        )?;
        staged.total_shares = remaining_shares;
        staged.total_contributed = remaining_contributed;

        position.shares -= shares_burned;
        // Sold inventory lowers the payout below the contributed principal.
        position.principal = position.principal.saturating_sub(amount_out);
        let rewards = staged.pay_out_pending(&mut position)?;
        staged.checkpoint(&mut position)?;

        let closed = position.shares.is_zero();
        if closed {
            position.principal = U256::ZERO;
            position.status = PositionStatus::Closed;
        }

        *pool.side_mut(side) = staged;
        self.positions.put(key, position);

        info!(
            %token, %side, %owner,
            shares = %shares_burned, amount = %amount_out,
            reward_same = %rewards.same, reward_other = %rewards.other,
            "liquidity withdrawn"
        );
        Ok(WithdrawReceipt {
            shares_burned,
            amount_out,
            rewards,
            closed,
        })
    }

    /// Copy a pool's sides for multi-step planning.
    pub(crate) fn stage(&self, token: TokenId) -> Result<StagedPool, LedgerError> {
        let pool = self.pool(token).ok_or(LedgerError::PoolNotFound(token))?;
        Ok(StagedPool {
            token,
            eth: pool.eth.clone(),
            token_side: pool.token_side.clone(),
            quote: pool.quote,
            floor: self.minimum_liquidity,
        })
    }

    /// Write back a staged pool. Pools are never removed, so the entry exists
    /// for any staged copy taken from this ledger.
    pub(crate) fn commit(&mut self, staged: StagedPool) {
        if let Some(pool) = self.pools.get_mut(&staged.token) {
            pool.eth = staged.eth;
            pool.token_side = staged.token_side;
        }
    }

    /// Move principal custody to the matching bridge (authorized callers only).
    pub fn transfer_to_bridge(
        &mut self,
        registry: &(impl Registry + ?Sized),
        caller: Address,
        token: TokenId,
        side: LiquiditySide,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        authorize(registry, caller)?;
        let mut staged = self.stage(token)?;
        staged.transfer_to_bridge(side, amount)?;
        self.commit(staged);
        debug!(%token, %side, %amount, "custody transferred to bridge");
        Ok(())
    }

    /// Take custody back from the matching bridge (authorized callers only).
    pub fn receive_from_bridge(
        &mut self,
        registry: &(impl Registry + ?Sized),
        caller: Address,
        token: TokenId,
        side: LiquiditySide,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        authorize(registry, caller)?;
        let mut staged = self.stage(token)?;
        staged.receive_from_bridge(side, amount)?;
        self.commit(staged);
        debug!(%token, %side, %amount, "custody received from bridge");
        Ok(())
    }

    /// Reconcile an observed custody balance for one side's asset.
    ///
    /// Anything above principal plus reward pots arrived by direct transfer
    /// and is handed to the side's providers as same-asset reward. Returns
    /// the absorbed excess.
    pub fn sync_balance(
        &mut self,
        token: TokenId,
        side: LiquiditySide,
        observed: Amount,
    ) -> Result<Amount, LedgerError> {
        let mut staged = self.stage(token)?;
        let expected = staged
            .side(side)
            .expected_custody(staged.side(side.opposite()))?;
        let excess = observed
            .checked_sub(expected)
            .ok_or(LedgerError::InconsistentPoolState("custody below accounted balance"))?;
        if excess.is_zero() {
            return Ok(excess);
        }
        staged.inject_fee(side, excess, RewardAsset::Same)?;
        self.commit(staged);
        info!(%token, %side, %excess, "external transfer absorbed as reward");
        Ok(excess)
    }
}

/// The registry's orderbook and any authorized contract may move custody.
fn authorize(registry: &(impl Registry + ?Sized), caller: Address) -> Result<(), LedgerError> {
    if registry.is_privileged(caller) {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized(caller))
    }
}

/// Errors raised by the ledger and reward engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("invalid amount")]
    InvalidAmount,
    #[error("share fraction must be within 1..=10000 bps, got {0}")]
    InvalidBps(u32),
    #[error("token {0} cannot back a pool")]
    InvalidToken(TokenId),
    #[error("pool for {0} already exists")]
    PoolAlreadyExists(TokenId),
    #[error("no pool for {0}")]
    PoolNotFound(TokenId),
    #[error("no liquidity position for this owner")]
    PositionNotFound,
    #[error("pool quote bid above ask")]
    InvalidQuote,
    #[error("slippage exceeded: expected at least {expected}, got {actual}")]
    SlippageExceeded { expected: Amount, actual: Amount },
    #[error("insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: U256, held: U256 },
    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Amount, available: Amount },
    #[error("bridge returned {returned} but only {outstanding} is on loan")]
    ReturnExceedsLoan { returned: Amount, outstanding: Amount },
    #[error("withdrawal leaves {remaining} below the minimum liquidity of {floor}")]
    MinimumLiquidityBreach { remaining: Amount, floor: Amount },
    #[error("inconsistent pool state: {0}")]
    InconsistentPoolState(&'static str),
    #[error("caller {0} is not authorized")]
    Unauthorized(Address),
    #[error(transparent)]
    Math(#[from] MathError),
}
