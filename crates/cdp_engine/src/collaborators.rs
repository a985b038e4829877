//! Interfaces consumed from outside the engine, with in-memory implementations
//!
//! The engine only needs a price, a stablecoin ledger that can mint and burn,
//! and an index of positions ordered by nominal collateral ratio.

use crate::error::{EngineError, EngineResult};
use crate::math::DECIMAL_PRECISION;
use crate::state::AccountId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub trait PriceFeed {
    /// Collateral price in stablecoin, 18-decimal fixed point
    fn price(&self) -> u128;
}

pub trait StablecoinLedger {
    fn mint(&mut self, to: AccountId, amount: u128);

    /// Fails with `InsufficientBalance` without changing any balance
    fn burn(&mut self, from: AccountId, amount: u128) -> EngineResult<()>;

    fn balance_of(&self, account: &AccountId) -> u128;

    fn total_supply(&self) -> u128;
}

/// Positions ordered by nominal collateral ratio, lowest first
pub trait SortedIndex {
    /// Insert or reposition `id`. `hint` is a neighbour guess an index may use
    /// to speed up the search.
    fn insert(&mut self, id: AccountId, nicr: u128, hint: Option<AccountId>);

    fn remove(&mut self, id: &AccountId);

    fn contains(&self, id: &AccountId) -> bool;

    /// Position with the lowest nominal ratio
    fn lowest(&self) -> Option<AccountId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Price set by hand (tests, simulations, the keeper's price path)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedPriceFeed {
    price: u128,
}

impl FixedPriceFeed {
    pub fn new(price: u128) -> Self {
        Self { price }
    }

    pub fn set_price(&mut self, price: u128) {
        self.price = price;
    }
}

impl Default for FixedPriceFeed {
    fn default() -> Self {
        Self::new(200 * DECIMAL_PRECISION)
    }
}

impl PriceFeed for FixedPriceFeed {
    fn price(&self) -> u128 {
        self.price
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InMemoryStablecoin {
    balances: BTreeMap<AccountId, u128>,
    total_supply: u128,
}

impl InMemoryStablecoin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StablecoinLedger for InMemoryStablecoin {
    fn mint(&mut self, to: AccountId, amount: u128) {
        if amount == 0 {
            return;
        }
        let balance = self.balances.entry(to).or_insert(0);
        *balance = balance.saturating_add(amount);
        self.total_supply = self.total_supply.saturating_add(amount);
    }

    fn burn(&mut self, from: AccountId, amount: u128) -> EngineResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.balance_of(&from);
        if available < amount {
            return Err(EngineError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        let remaining = available - amount;
        if remaining == 0 {
            self.balances.remove(&from);
        } else {
            self.balances.insert(from, remaining);
        }
        self.total_supply = self.total_supply.saturating_sub(amount);
        Ok(())
    }

    fn balance_of(&self, account: &AccountId) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> u128 {
        self.total_supply
    }
}

/// Ordered set keyed by (NICR, id) with a reverse map for removal
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NicrIndex {
    ordered: BTreeSet<(u128, AccountId)>,
    keys: HashMap<AccountId, u128>,
}

impl NicrIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nicr_of(&self, id: &AccountId) -> Option<u128> {
        self.keys.get(id).copied()
    }

    /// Ids from lowest to highest nominal ratio
    pub fn ascending(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.ordered.iter().map(|(_, id)| *id)
    }
}

impl SortedIndex for NicrIndex {
    fn insert(&mut self, id: AccountId, nicr: u128, _hint: Option<AccountId>) {
        if let Some(old) = self.keys.insert(id, nicr) {
            self.ordered.remove(&(old, id));
        }
        self.ordered.insert((nicr, id));
    }

    fn remove(&mut self, id: &AccountId) {
        if let Some(old) = self.keys.remove(id) {
            self.ordered.remove(&(old, *id));
        }
    }

    fn contains(&self, id: &AccountId) -> bool {
        self.keys.contains_key(id)
    }

    fn lowest(&self) -> Option<AccountId> {
        self.ordered.iter().next().map(|(_, id)| *id)
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}
