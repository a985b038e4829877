//! Balance holders for collateral and debt outside the stability pool
//!
//! - Active pool: collateral and debt of active positions, rewards applied
//! - Default pool: redistributed amounts no position has applied yet
//! - Surplus pool: collateral owed back to owners after capped liquidations
//!
//! Every unit of collateral entering or leaving the system is tallied in
//! [`CollateralFlows`], so conservation can be checked exactly.

use crate::error::{EngineError, EngineResult};
use crate::redistribution::PendingRewards;
use crate::state::AccountId;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolBalance {
    pub collateral: u128,
    pub debt: u128,
}

impl PoolBalance {
    pub(crate) fn increase(&mut self, collateral: u128, debt: u128) {
        self.collateral = self.collateral.saturating_add(collateral);
        self.debt = self.debt.saturating_add(debt);
    }

    pub(crate) fn decrease(&mut self, collateral: u128, debt: u128) {
        self.collateral = self.collateral.saturating_sub(collateral);
        self.debt = self.debt.saturating_sub(debt);
    }
}

/// Per-owner claimable collateral
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollSurplusPool {
    total: u128,
    balances: BTreeMap<AccountId, u128>,
}

impl CollSurplusPool {
    pub fn total(&self) -> u128 {
        self.total
    }

    pub fn surplus_of(&self, owner: &AccountId) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    pub(crate) fn account_surplus(&mut self, owner: AccountId, amount: u128) {
        if amount == 0 {
            return;
        }
        let entry = self.balances.entry(owner).or_insert(0);
        *entry = entry.saturating_add(amount);
        self.total = self.total.saturating_add(amount);
    }

    pub(crate) fn claim(&mut self, owner: &AccountId) -> EngineResult<u128> {
        match self.balances.remove(owner) {
            Some(amount) if amount > 0 => {
                self.total = self.total.saturating_sub(amount);
                Ok(amount)
            }
            _ => Err(EngineError::NoSurplus(*owner)),
        }
    }
}

/// Collateral that entered (deposits) and left (withdrawals, gas
/// compensation, gain payouts, surplus claims) the system
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CollateralFlows {
    pub entered: u128,
    pub left: u128,
}

impl CollateralFlows {
    pub(crate) fn record_in(&mut self, amount: u128) {
        self.entered = self.entered.saturating_add(amount);
    }

    pub(crate) fn record_out(&mut self, amount: u128) {
        self.left = self.left.saturating_add(amount);
    }

    /// Collateral that should still be held somewhere in the system
    pub fn expected_holdings(&self) -> u128 {
        self.entered.saturating_sub(self.left)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pools {
    pub(crate) active: PoolBalance,
    pub(crate) default: PoolBalance,
    pub(crate) surplus: CollSurplusPool,
    pub(crate) flows: CollateralFlows,
}

impl Pools {
    pub fn active(&self) -> PoolBalance {
        self.active
    }

    pub fn default_pool(&self) -> PoolBalance {
        self.default
    }

    pub fn surplus(&self) -> &CollSurplusPool {
        &self.surplus
    }

    pub fn flows(&self) -> CollateralFlows {
        self.flows
    }

    /// A touched position's pending rewards move from Default to Active
    pub(crate) fn apply_pending(&mut self, pending: PendingRewards) {
        if pending.is_zero() {
            return;
        }
        self.default.decrease(pending.collateral, pending.debt);
        self.active.increase(pending.collateral, pending.debt);
    }

    /// Uncovered liquidation amounts move from Active to Default
    pub(crate) fn move_to_default(&mut self, collateral: u128, debt: u128) {
        self.active.decrease(collateral, debt);
        self.default.increase(collateral, debt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surplus_claim_once() {
        let mut surplus = CollSurplusPool::default();
        let owner = AccountId::new_unique();
        surplus.account_surplus(owner, 5);
        surplus.account_surplus(owner, 7);
        assert_eq!(surplus.surplus_of(&owner), 12);
        assert_eq!(surplus.total(), 12);

        assert_eq!(surplus.claim(&owner), Ok(12));
        assert_eq!(surplus.total(), 0);
        assert_eq!(surplus.claim(&owner), Err(EngineError::NoSurplus(owner)));
    }

    #[test]
    fn test_pending_moves_between_pools() {
        let mut pools = Pools::default();
        pools.active.increase(100, 1_000);
        pools.move_to_default(10, 100);
        assert_eq!(pools.active(), PoolBalance { collateral: 90, debt: 900 });
        assert_eq!(pools.default_pool(), PoolBalance { collateral: 10, debt: 100 });

        pools.apply_pending(PendingRewards { collateral: 4, debt: 40 });
        assert_eq!(pools.active(), PoolBalance { collateral: 94, debt: 940 });
        assert_eq!(pools.default_pool(), PoolBalance { collateral: 6, debt: 60 });
    }

    #[test]
    fn test_flows_expected_holdings() {
        let mut flows = CollateralFlows::default();
        flows.record_in(50);
        flows.record_out(20);
        assert_eq!(flows.expected_holdings(), 30);
    }
}
