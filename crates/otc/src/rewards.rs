//! Lazy reward distribution.
//!
//! Each pool side carries two accumulators: one for rewards paid in the
//! side's own asset and one for rewards paid in the opposite side's asset.
//! Fees bump `per_share`; positions realize their part on settlement, which
//! must run before any change to a position's share count.
//!
//! Debts and remainders are kept in scaled units so truncation never hands
//! out more than was injected: the dust of an injection stays in
//! `undistributed` and the dust of a settlement stays in the position's
//! `carry`.

use crate::ledger::{Ledger, LedgerError, PoolSide};
use crate::math::{checked_add, MathError, REWARD_SCALE};
use crate::position::{PositionKey, ProviderPosition};
use crate::types::{Address, Amount, LiquiditySide, RewardAsset, TokenId, U256};
use tracing::debug;

/// A value per reward stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewardPair {
    pub same: U256,
    pub other: U256,
}

impl RewardPair {
    pub fn new(same: U256, other: U256) -> Self {
        Self { same, other }
    }

    pub fn get(&self, asset: RewardAsset) -> U256 {
        match asset {
            RewardAsset::Same => self.same,
            RewardAsset::Other => self.other,
        }
    }

    pub fn get_mut(&mut self, asset: RewardAsset) -> &mut U256 {
        match asset {
            RewardAsset::Same => &mut self.same,
            RewardAsset::Other => &mut self.other,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.same.is_zero() && self.other.is_zero()
    }
}

const ASSETS: [RewardAsset; 2] = [RewardAsset::Same, RewardAsset::Other];

/// Reward-per-share accumulator with its custody pot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardStream {
    /// Accumulated reward per share, scaled by `REWARD_SCALE`. Never decreases.
    pub per_share: U256,
    /// Injected and not yet paid out, in asset units.
    pub pot: Amount,
    /// Scaled reward not yet folded into `per_share`.
    pub undistributed: U256,
    pub total_injected: Amount,
    pub total_paid: Amount,
}

impl RewardStream {
    /// Add `amount` to the pot and re-base the accumulator over `total_shares`.
    pub fn inject(&mut self, amount: Amount, total_shares: U256) -> Result<(), MathError> {
        self.pot = checked_add(self.pot, amount)?;
        self.total_injected = checked_add(self.total_injected, amount)?;
        let scaled = amount.checked_mul(REWARD_SCALE).ok_or(MathError::Overflow)?;
        self.undistributed = checked_add(self.undistributed, scaled)?;
        self.distribute(total_shares)
    }

    /// Fold whatever `undistributed` divides evenly into `per_share`.
    /// No-op while there are no shares; the first depositor inherits it.
    pub fn distribute(&mut self, total_shares: U256) -> Result<(), MathError> {
        if total_shares.is_zero() || self.undistributed.is_zero() {
            return Ok(());
        }
        let delta = self.undistributed / total_shares;
        if delta.is_zero() {
            return Ok(());
        }
        self.per_share = checked_add(self.per_share, delta)?;
        // delta * total_shares <= undistributed by construction.
        self.undistributed -= delta * total_shares;
        Ok(())
    }

    fn pay_out(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.pot = self
            .pot
            .checked_sub(amount)
            .ok_or(LedgerError::InconsistentPoolState("reward payout exceeds pot"))?;
        self.total_paid = checked_add(self.total_paid, amount)?;
        Ok(())
    }
}

impl PoolSide {
    pub fn stream(&self, asset: RewardAsset) -> &RewardStream {
        match asset {
            RewardAsset::Same => &self.same_asset,
            RewardAsset::Other => &self.other_asset,
        }
    }

    pub fn stream_mut(&mut self, asset: RewardAsset) -> &mut RewardStream {
        match asset {
            RewardAsset::Same => &mut self.same_asset,
            RewardAsset::Other => &mut self.other_asset,
        }
    }

    /// Inject a fee into one of this side's reward streams.
    pub fn inject_reward(&mut self, amount: Amount, asset: RewardAsset) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        let total_shares = self.total_shares;
        self.stream_mut(asset).inject(amount, total_shares)?;
        Ok(())
    }

    /// Realize everything accrued since the last settlement into `pending`.
    /// Returns the newly realized amounts.
    pub fn settle(&self, position: &mut ProviderPosition) -> Result<RewardPair, LedgerError> {
        let mut realized = RewardPair::default();
        for asset in ASSETS {
            let accumulated = position
                .shares
                .checked_mul(self.stream(asset).per_share)
                .ok_or(MathError::Overflow)?;
            let accrued = accumulated
                .checked_sub(position.reward_debt.get(asset))
                .ok_or(LedgerError::InconsistentPoolState("reward debt above accumulator"))?;
            let total = checked_add(accrued, position.carry.get(asset))?;

            let units = total / REWARD_SCALE;
            *position.carry.get_mut(asset) = total % REWARD_SCALE;
            *position.pending.get_mut(asset) = checked_add(position.pending.get(asset), units)?;
            *position.reward_debt.get_mut(asset) = accumulated;
            *realized.get_mut(asset) = units;
        }
        Ok(realized)
    }

    /// Reset the reward debt after the position's share count changed.
    pub fn checkpoint(&self, position: &mut ProviderPosition) -> Result<(), LedgerError> {
        for asset in ASSETS {
            *position.reward_debt.get_mut(asset) = position
                .shares
                .checked_mul(self.stream(asset).per_share)
                .ok_or(MathError::Overflow)?;
        }
        Ok(())
    }

    /// Move a settled position's pending rewards out of the pots.
    pub fn pay_out_pending(
        &mut self,
        position: &mut ProviderPosition,
    ) -> Result<RewardPair, LedgerError> {
        let paid = position.pending;
        for asset in ASSETS {
            self.stream_mut(asset).pay_out(paid.get(asset))?;
        }
        position.pending = RewardPair::default();
        Ok(paid)
    }
}

impl Ledger {
    /// Inject fee revenue into a pool side's reward stream.
    pub fn inject_fee(
        &mut self,
        token: TokenId,
        side: LiquiditySide,
        amount: Amount,
        asset: RewardAsset,
    ) -> Result<(), LedgerError> {
        let pool = self.pool_mut(token)?;
        let mut staged = pool.side(side).clone();
        staged.inject_reward(amount, asset)?;
        *pool.side_mut(side) = staged;

        debug!(%token, %side, ?asset, %amount, "fee injected");
        Ok(())
    }

    /// Settle and pay out both reward streams of a position.
    ///
    /// Claiming again with nothing new accrued pays zero.
    pub fn claim(
        &mut self,
        token: TokenId,
        side: LiquiditySide,
        owner: Address,
    ) -> Result<RewardPair, LedgerError> {
        let key = PositionKey::new(token, side, owner);
        let mut position = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::PositionNotFound)?;
        let pool = self
            .pools
            .get_mut(&token)
            .ok_or(LedgerError::PoolNotFound(token))?;

        let mut staged = pool.side(side).clone();
        staged.settle(&mut position)?;
        let paid = staged.pay_out_pending(&mut position)?;

        *pool.side_mut(side) = staged;
        self.positions.put(key, position);

        debug!(%token, %side, %owner, same = %paid.same, other = %paid.other, "rewards claimed");
        Ok(paid)
    }

    /// What `claim` would pay right now, without mutating anything.
    pub fn pending_rewards(
        &self,
        token: TokenId,
        side: LiquiditySide,
        owner: Address,
    ) -> Result<RewardPair, LedgerError> {
        let key = PositionKey::new(token, side, owner);
        let mut position = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::PositionNotFound)?;
        let pool = self.pool(token).ok_or(LedgerError::PoolNotFound(token))?;
        pool.side(side).settle(&mut position)?;
        Ok(position.pending)
    }
}
