//! Liquidity provider positions.

use crate::rewards::RewardPair;
use crate::types::{Address, Amount, LiquiditySide, TokenId, U256};
use std::collections::HashMap;

/// Key of a provider position: one per (token, side, owner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub token: TokenId,
    pub side: LiquiditySide,
    pub owner: Address,
}

impl PositionKey {
    pub fn new(token: TokenId, side: LiquiditySide, owner: Address) -> Self {
        Self { token, side, owner }
    }
}

/// Lifecycle of a position entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionStatus {
    /// Holds shares.
    #[default]
    Active,
    /// Fully withdrawn. Kept so a later deposit is seen as a reopen.
    Closed,
}

/// A provider's stake in one pool side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderPosition {
    /// Principal contributed and not yet withdrawn.
    pub principal: Amount,
    /// LP shares held.
    pub shares: U256,
    /// `per_share * shares` at the last settlement, in scaled units.
    pub reward_debt: RewardPair,
    /// Realized, unclaimed reward in asset units.
    pub pending: RewardPair,
    /// Scaled sub-unit remainder left over from settlement.
    pub carry: RewardPair,
    pub status: PositionStatus,
}

impl ProviderPosition {
    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }
}

/// Table of positions with explicit entries.
///
/// Entries are never removed: a closed position stays distinguishable from
/// one that never existed.
#[derive(Debug, Clone, Default)]
pub struct PositionStore {
    positions: HashMap<PositionKey, ProviderPosition>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PositionKey) -> Option<&ProviderPosition> {
        self.positions.get(key)
    }

    pub fn contains(&self, key: &PositionKey) -> bool {
        self.positions.contains_key(key)
    }

    /// Write back a position computed on a copy.
    pub fn put(&mut self, key: PositionKey, position: ProviderPosition) {
        self.positions.insert(key, position);
    }

    /// All positions of one pool side.
    pub fn iter_side(
        &self,
        token: TokenId,
        side: LiquiditySide,
    ) -> impl Iterator<Item = (&PositionKey, &ProviderPosition)> + '_ {
        self.positions
            .iter()
            .filter(move |(key, _)| key.token == token && key.side == side)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_keeps_closed_entries() {
        let token = Address::repeat_byte(0x01);
        let owner = Address::repeat_byte(0xAA);
        let key = PositionKey::new(token, LiquiditySide::Eth, owner);

        let mut store = PositionStore::new();
        assert!(!store.contains(&key));

        let closed = ProviderPosition {
            status: PositionStatus::Closed,
            ..Default::default()
        };
        store.put(key, closed);

        assert!(store.contains(&key));
        assert!(!store.get(&key).unwrap().is_active());
    }

    #[test]
    fn test_iter_side_filters() {
        let token = Address::repeat_byte(0x01);
        let mut store = PositionStore::new();
        store.put(
            PositionKey::new(token, LiquiditySide::Eth, Address::repeat_byte(0xAA)),
            ProviderPosition::default(),
        );
        store.put(
            PositionKey::new(token, LiquiditySide::Token, Address::repeat_byte(0xAA)),
            ProviderPosition::default(),
        );
        store.put(
            PositionKey::new(Address::repeat_byte(0x02), LiquiditySide::Eth, Address::repeat_byte(0xAA)),
            ProviderPosition::default(),
        );

        assert_eq!(store.iter_side(token, LiquiditySide::Eth).count(), 1);
        assert_eq!(store.len(), 3);
    }
}
