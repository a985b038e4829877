//! Stake correction
//!
//! A position's stake is its weight in the redistribution accumulator. Raw
//! collateral would over-weight positions that gained collateral through past
//! redistributions, so new stakes are normalized against the
//! stakes/collateral ratio frozen at the last liquidation:
//!
//!   stake = collateral * totalStakesSnapshot / totalCollateralSnapshot
//!
//! Before any liquidation the snapshot is empty and stake == collateral.

use crate::ledger::Touched;
use crate::math::mul_div;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StakeCorrection {
    total_stakes: u128,
    total_stakes_snapshot: u128,
    total_collateral_snapshot: u128,
}

impl StakeCorrection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of the stakes of all active positions
    pub fn total_stakes(&self) -> u128 {
        self.total_stakes
    }

    pub fn total_stakes_snapshot(&self) -> u128 {
        self.total_stakes_snapshot
    }

    pub fn total_collateral_snapshot(&self) -> u128 {
        self.total_collateral_snapshot
    }

    pub fn compute_new_stake(&self, collateral: u128) -> u128 {
        if self.total_stakes_snapshot == 0 || self.total_collateral_snapshot == 0 {
            collateral
        } else {
            mul_div(collateral, self.total_stakes_snapshot, self.total_collateral_snapshot)
        }
    }

    /// Recompute a touched position's stake from its current collateral
    pub(crate) fn update_stake(&mut self, position: &mut Touched<'_>) -> u128 {
        let new_stake = self.compute_new_stake(position.collateral());
        let old_stake = position.stake();
        self.total_stakes = self.total_stakes.saturating_sub(old_stake).saturating_add(new_stake);
        position.set_stake(new_stake);
        new_stake
    }

    /// Drop a position's stake from the total (liquidation / close)
    pub(crate) fn remove_stake(&mut self, position: &mut Touched<'_>) {
        self.total_stakes = self.total_stakes.saturating_sub(position.stake());
        position.set_stake(0);
    }

    /// Freeze the ratio used by future stake computations.
    ///
    /// `total_collateral` is the system collateral after the liquidation's
    /// gas compensation and surplus have left the active pool.
    pub(crate) fn update_snapshots(&mut self, total_collateral: u128) {
        self.total_stakes_snapshot = self.total_stakes;
        self.total_collateral_snapshot = total_collateral;
        log::debug!(
            "system snapshots updated: total_stakes={} total_collateral={}",
            self.total_stakes_snapshot,
            self.total_collateral_snapshot
        );
    }
}
