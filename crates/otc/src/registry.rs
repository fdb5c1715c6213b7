//! Contract registry: authorization lookups and blocked tokens.
//!
//! The venue only reads the registry. [`InMemoryRegistry`] is the
//! administrator-managed implementation used by embedders and tests.

use crate::types::{Address, TokenId};
use parking_lot::RwLock;
use std::collections::HashSet;
use thiserror::Error;

/// Read-only view of the registry consulted by privileged operations.
pub trait Registry: Send + Sync {
    /// Whether `address` may call the ledger's custody primitives.
    fn is_contract_authorized(&self, address: Address) -> bool;

    /// Address acting as the order book.
    fn orderbook(&self) -> Address;

    /// Address of the external-DEX fallback executor, zero when unset.
    fn fallback_executor(&self) -> Address;

    fn is_token_blocked(&self, token: TokenId) -> bool;

    /// The configured order book or an authorized contract. An unset
    /// (zero) order book authorizes nobody.
    fn is_privileged(&self, caller: Address) -> bool {
        let orderbook = self.orderbook();
        (!orderbook.is_zero() && caller == orderbook) || self.is_contract_authorized(caller)
    }
}

#[derive(Debug, Default)]
struct Entries {
    orderbook: Address,
    fallback_executor: Address,
    authorized: HashSet<Address>,
    blocked: HashSet<TokenId>,
}

/// Registry held in memory, with setters restricted to its administrator.
#[derive(Debug)]
pub struct InMemoryRegistry {
    admin: Address,
    entries: RwLock<Entries>,
}

impl InMemoryRegistry {
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn with_orderbook(self, orderbook: Address) -> Self {
        self.entries.write().orderbook = orderbook;
        self
    }

    pub fn with_fallback_executor(self, executor: Address) -> Self {
        self.entries.write().fallback_executor = executor;
        self
    }

    pub fn with_authorized(self, contract: Address) -> Self {
        self.entries.write().authorized.insert(contract);
        self
    }

    fn only_admin(&self, caller: Address) -> Result<(), RegistryError> {
        if caller == self.admin {
            Ok(())
        } else {
            Err(RegistryError::NotAdmin(caller))
        }
    }

    pub fn set_orderbook(&self, caller: Address, orderbook: Address) -> Result<(), RegistryError> {
        self.only_admin(caller)?;
        self.entries.write().orderbook = orderbook;
        Ok(())
    }

    pub fn set_fallback_executor(
        &self,
        caller: Address,
        executor: Address,
    ) -> Result<(), RegistryError> {
        self.only_admin(caller)?;
        self.entries.write().fallback_executor = executor;
        Ok(())
    }

    pub fn set_contract_authorized(
        &self,
        caller: Address,
        contract: Address,
        authorized: bool,
    ) -> Result<(), RegistryError> {
        self.only_admin(caller)?;
        let mut entries = self.entries.write();
        if authorized {
            entries.authorized.insert(contract);
        } else {
            entries.authorized.remove(&contract);
        }
        Ok(())
    }

    pub fn set_token_blocked(
        &self,
        caller: Address,
        token: TokenId,
        blocked: bool,
    ) -> Result<(), RegistryError> {
        self.only_admin(caller)?;
        let mut entries = self.entries.write();
        if blocked {
            entries.blocked.insert(token);
        } else {
            entries.blocked.remove(&token);
        }
        Ok(())
    }
}

impl Registry for InMemoryRegistry {
    fn is_contract_authorized(&self, address: Address) -> bool {
        self.entries.read().authorized.contains(&address)
    }

    fn orderbook(&self) -> Address {
        self.entries.read().orderbook
    }

    fn fallback_executor(&self) -> Address {
        self.entries.read().fallback_executor
    }

    fn is_token_blocked(&self, token: TokenId) -> bool {
        self.entries.read().blocked.contains(&token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{0} is not the registry administrator")]
    NotAdmin(Address),
}
