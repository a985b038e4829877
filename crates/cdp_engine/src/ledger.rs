//! Position ledger
//!
//! Position fields are private. Reads go through getters that report the
//! *recorded* values (pending redistribution excluded). The only way to obtain
//! a mutable handle is [`PositionLedger::touch`], which applies pending
//! redistribution rewards first, so no entry point can compute on stale
//! collateral or debt.

use crate::error::{EngineError, EngineResult};
use crate::redistribution::{PendingRewards, RedistributionAccumulator};
use crate::state::{AccountId, RewardSnapshot, Status};
use std::collections::BTreeMap;

/// Per-owner collateral/debt record
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Position {
    collateral: u128,
    debt: u128,
    stake: u128,
    status: Status,
    reward_snapshot: RewardSnapshot,
}

impl Position {
    pub fn collateral(&self) -> u128 {
        self.collateral
    }

    pub fn debt(&self) -> u128 {
        self.debt
    }

    pub fn stake(&self) -> u128 {
        self.stake
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn reward_snapshot(&self) -> RewardSnapshot {
        self.reward_snapshot
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }
}

/// Mutable view of a position whose pending rewards have been applied
#[derive(Debug)]
pub struct Touched<'a> {
    id: AccountId,
    position: &'a mut Position,
}

impl<'a> Touched<'a> {
    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn collateral(&self) -> u128 {
        self.position.collateral
    }

    pub fn debt(&self) -> u128 {
        self.position.debt
    }

    pub fn stake(&self) -> u128 {
        self.position.stake
    }

    pub(crate) fn set_collateral(&mut self, collateral: u128) {
        self.position.collateral = collateral;
    }

    pub(crate) fn set_debt(&mut self, debt: u128) {
        self.position.debt = debt;
    }

    pub(crate) fn set_stake(&mut self, stake: u128) {
        self.position.stake = stake;
    }
}

/// All position records, keyed by owner
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PositionLedger {
    positions: BTreeMap<AccountId, Position>,
    active_count: usize,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &AccountId) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn status(&self, id: &AccountId) -> Status {
        self.positions.get(id).map(|p| p.status).unwrap_or_default()
    }

    pub fn is_active(&self, id: &AccountId) -> bool {
        self.status(id) == Status::Active
    }

    /// Number of active positions
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Active positions in key order
    pub fn iter_active(&self) -> impl Iterator<Item = (&AccountId, &Position)> {
        self.positions.iter().filter(|(_, p)| p.is_active())
    }

    /// Active position or `PositionNotActive`
    pub fn active(&self, id: &AccountId) -> EngineResult<&Position> {
        match self.positions.get(id) {
            Some(p) if p.is_active() => Ok(p),
            _ => Err(EngineError::PositionNotActive(*id)),
        }
    }

    /// Create (or reuse the key of) a position with a fresh record
    pub(crate) fn open(
        &mut self,
        id: AccountId,
        collateral: u128,
        debt: u128,
        snapshot: RewardSnapshot,
    ) -> EngineResult<Touched<'_>> {
        if self.is_active(&id) {
            return Err(EngineError::PositionAlreadyActive(id));
        }
        let record = Position {
            collateral,
            debt,
            stake: 0,
            status: Status::Active,
            reward_snapshot: snapshot,
        };
        self.active_count += 1;
        let position = self.positions.entry(id).or_default();
        *position = record;
        Ok(Touched { id, position })
    }

    /// Apply pending redistribution rewards and hand out a mutable view
    pub(crate) fn touch(
        &mut self,
        id: &AccountId,
        rewards: &RedistributionAccumulator,
    ) -> EngineResult<(Touched<'_>, PendingRewards)> {
        let position = match self.positions.get_mut(id) {
            Some(p) if p.is_active() => p,
            _ => return Err(EngineError::PositionNotActive(*id)),
        };
        let pending = rewards.pending_rewards(position);
        position.collateral = position.collateral.saturating_add(pending.collateral);
        position.debt = position.debt.saturating_add(pending.debt);
        position.reward_snapshot = rewards.snapshot();
        Ok((Touched { id: *id, position }, pending))
    }

    /// Close a position, zeroing its fields. Returns the record as it was.
    pub(crate) fn close(&mut self, id: &AccountId, status: Status) -> EngineResult<Position> {
        let position = match self.positions.get_mut(id) {
            Some(p) if p.is_active() => p,
            _ => return Err(EngineError::PositionNotActive(*id)),
        };
        let before = position.clone();
        *position = Position {
            status,
            ..Position::default()
        };
        self.active_count = self.active_count.saturating_sub(1);
        Ok(before)
    }
}
