//! CDP system: owns every ledger and accumulator and orchestrates liquidations
//!
//! Each public operation first validates against read-only projections
//! (pending rewards included) and only then writes. A failed operation leaves
//! the system exactly as it found it.

use crate::collaborators::{FixedPriceFeed, InMemoryStablecoin, NicrIndex, PriceFeed, SortedIndex, StablecoinLedger};
use crate::error::{EngineError, EngineResult};
use crate::ledger::PositionLedger;
use crate::liquidation::{
    compute_liquidation_values, BatchLiquidation, LiquidationMode, LiquidationRecord, LiquidationValues,
    MAX_BATCH_LIQUIDATIONS,
};
use crate::math::{compute_cr, compute_nominal_cr, min_u128};
use crate::pools::Pools;
use crate::redistribution::RedistributionAccumulator;
use crate::stability_pool::{DepositReceipt, StabilityPool};
use crate::stake::StakeCorrection;
use crate::state::{AccountId, Params, Status, GAS_POOL_ACCOUNT, STABILITY_POOL_ACCOUNT};
use serde::Serialize;

/// A position's recorded values plus its pending redistribution share
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EntirePosition {
    pub debt: u128,
    pub collateral: u128,
    pub pending_debt: u128,
    pub pending_collateral: u128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CdpSystem<F = FixedPriceFeed, T = InMemoryStablecoin, I = NicrIndex> {
    pub(crate) params: Params,
    pub(crate) ledger: PositionLedger,
    pub(crate) rewards: RedistributionAccumulator,
    pub(crate) stakes: StakeCorrection,
    pub(crate) stability_pool: StabilityPool,
    pub(crate) pools: Pools,
    pub(crate) paused: bool,
    pub(crate) price_feed: F,
    pub(crate) stablecoin: T,
    pub(crate) index: I,
}

impl CdpSystem {
    /// System with in-memory collaborators and a $200 starting price
    pub fn new(params: Params) -> EngineResult<Self> {
        Self::with_collaborators(params, FixedPriceFeed::default(), InMemoryStablecoin::new(), NicrIndex::new())
    }
}

impl<F: PriceFeed, T: StablecoinLedger, I: SortedIndex> CdpSystem<F, T, I> {
    pub fn with_collaborators(params: Params, price_feed: F, stablecoin: T, index: I) -> EngineResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            ledger: PositionLedger::new(),
            rewards: RedistributionAccumulator::new(),
            stakes: StakeCorrection::new(),
            stability_pool: StabilityPool::new(),
            pools: Pools::default(),
            paused: false,
            price_feed,
            stablecoin,
            index,
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn rewards(&self) -> &RedistributionAccumulator {
        &self.rewards
    }

    pub fn stakes(&self) -> &StakeCorrection {
        &self.stakes
    }

    pub fn stability_pool(&self) -> &StabilityPool {
        &self.stability_pool
    }

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    pub fn stablecoin(&self) -> &T {
        &self.stablecoin
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn price_feed(&self) -> &F {
        &self.price_feed
    }

    pub fn price_feed_mut(&mut self) -> &mut F {
        &mut self.price_feed
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Paused: no liquidations, openings, debt increases or pool deposits.
    /// Exits (repay, close, pool withdrawal) stay available.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            log::info!("system {}", if paused { "paused" } else { "unpaused" });
        }
        self.paused = paused;
    }

    pub fn price(&self) -> u128 {
        self.price_feed.price()
    }

    // ----- projections -----

    pub fn total_system_collateral(&self) -> u128 {
        self.pools.active.collateral.saturating_add(self.pools.default.collateral)
    }

    pub fn total_system_debt(&self) -> u128 {
        self.pools.active.debt.saturating_add(self.pools.default.debt)
    }

    pub fn tcr(&self, price: u128) -> u128 {
        compute_cr(self.total_system_collateral(), self.total_system_debt(), price)
    }

    pub fn is_recovery_mode(&self, price: u128) -> bool {
        self.tcr(price) < self.params.critical_collateral_ratio
    }

    pub fn liquidation_mode(&self, price: u128) -> LiquidationMode {
        let tcr = self.tcr(price);
        if tcr < self.params.critical_collateral_ratio {
            LiquidationMode::Recovery { tcr }
        } else {
            LiquidationMode::Normal
        }
    }

    /// TCR if the given amounts entered and left the system
    pub(crate) fn tcr_after(&self, price: u128, coll_in: u128, coll_out: u128, debt_in: u128, debt_out: u128) -> u128 {
        let collateral = self
            .total_system_collateral()
            .saturating_add(coll_in)
            .saturating_sub(coll_out);
        let debt = self.total_system_debt().saturating_add(debt_in).saturating_sub(debt_out);
        compute_cr(collateral, debt, price)
    }

    pub fn entire_debt_and_collateral(&self, id: &AccountId) -> EngineResult<EntirePosition> {
        let position = self.ledger.active(id)?;
        let pending = self.rewards.pending_rewards(position);
        Ok(EntirePosition {
            debt: position.debt().saturating_add(pending.debt),
            collateral: position.collateral().saturating_add(pending.collateral),
            pending_debt: pending.debt,
            pending_collateral: pending.collateral,
        })
    }

    pub fn current_icr(&self, id: &AccountId, price: u128) -> EngineResult<u128> {
        let entire = self.entire_debt_and_collateral(id)?;
        Ok(compute_cr(entire.collateral, entire.debt, price))
    }

    pub fn nominal_icr(&self, id: &AccountId) -> EngineResult<u128> {
        let entire = self.entire_debt_and_collateral(id)?;
        Ok(compute_nominal_cr(entire.collateral, entire.debt))
    }

    pub fn pending_collateral_reward(&self, id: &AccountId) -> u128 {
        self.ledger
            .get(id)
            .map(|p| self.rewards.pending_collateral(p))
            .unwrap_or(0)
    }

    pub fn pending_debt_reward(&self, id: &AccountId) -> u128 {
        self.ledger.get(id).map(|p| self.rewards.pending_debt(p)).unwrap_or(0)
    }

    pub fn compounded_deposit(&self, depositor: &AccountId) -> u128 {
        self.stability_pool.compounded_deposit(depositor)
    }

    pub fn depositor_collateral_gain(&self, depositor: &AccountId) -> u128 {
        self.stability_pool.depositor_collateral_gain(depositor)
    }

    fn has_undercollateralized_positions(&self, price: u128) -> bool {
        match self.index.lowest() {
            Some(lowest) => self
                .current_icr(&lowest, price)
                .map(|icr| icr < self.params.minimum_collateral_ratio)
                .unwrap_or(false),
            None => false,
        }
    }

    pub(crate) fn require_balance(&self, account: &AccountId, required: u128) -> EngineResult<()> {
        let available = self.stablecoin.balance_of(account);
        if available < required {
            return Err(EngineError::InsufficientBalance { required, available });
        }
        Ok(())
    }

    // ----- stability pool -----

    pub fn provide_to_pool(&mut self, depositor: AccountId, amount: u128) -> EngineResult<DepositReceipt> {
        if self.paused {
            return Err(EngineError::Paused);
        }
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        self.require_balance(&depositor, amount)?;

        self.stablecoin.burn(depositor, amount)?;
        self.stablecoin.mint(STABILITY_POOL_ACCOUNT, amount);
        let receipt = self.stability_pool.provide(depositor, amount)?;
        self.pools.flows.record_out(receipt.collateral_gain);
        Ok(receipt)
    }

    /// Withdraw up to `amount` (capped at the compounded deposit) and the
    /// whole collateral gain. A zero amount claims only the gain.
    pub fn withdraw_from_pool(&mut self, depositor: AccountId, amount: u128) -> EngineResult<DepositReceipt> {
        if self.stability_pool.deposit(&depositor).is_none() {
            return Err(EngineError::NoDeposit(depositor));
        }
        let price = self.price();
        if amount > 0 && self.has_undercollateralized_positions(price) {
            return Err(EngineError::UndercollateralizedPositionsExist);
        }
        let to_withdraw = min_u128(amount, self.stability_pool.compounded_deposit(&depositor));
        self.require_balance(&STABILITY_POOL_ACCOUNT, to_withdraw)?;

        let receipt = self.stability_pool.withdraw(depositor, amount)?;
        self.stablecoin.burn(STABILITY_POOL_ACCOUNT, receipt.amount)?;
        self.stablecoin.mint(depositor, receipt.amount);
        self.pools.flows.record_out(receipt.collateral_gain);
        Ok(receipt)
    }

    /// Move the depositor's whole collateral gain into their own position.
    ///
    /// Outside recovery mode the result must clear MCR and keep the TCR above
    /// CCR, as for any other collateral top-up.
    pub fn withdraw_collateral_gain_to_position(&mut self, depositor: AccountId) -> EngineResult<DepositReceipt> {
        let entire = self.entire_debt_and_collateral(&depositor)?;
        let expected_gain = min_u128(
            self.stability_pool.depositor_collateral_gain(&depositor),
            self.stability_pool.total_collateral(),
        );
        let price = self.price();
        if expected_gain > 0 && !self.is_recovery_mode(price) {
            let mcr = self.params.minimum_collateral_ratio;
            let new_icr = compute_cr(entire.collateral.saturating_add(expected_gain), entire.debt, price);
            if new_icr < mcr {
                return Err(EngineError::CollateralRatioTooLow { icr: new_icr, required: mcr });
            }
            self.require_tcr_above_critical(price, expected_gain, 0, 0, 0)?;
        }

        let receipt = self.stability_pool.take_collateral_gain(depositor)?;
        let gain = receipt.collateral_gain;

        let (collateral, debt) = {
            let (mut position, pending) = self.ledger.touch(&depositor, &self.rewards)?;
            self.pools.apply_pending(pending);
            position.set_collateral(position.collateral().saturating_add(gain));
            self.stakes.update_stake(&mut position);
            (position.collateral(), position.debt())
        };
        self.index.insert(depositor, compute_nominal_cr(collateral, debt), None);
        self.pools.active.increase(gain, 0);

        log::debug!("moved {} collateral gain into position {}", gain, depositor);
        Ok(receipt)
    }

    // ----- liquidation -----

    /// Liquidate one position at the feed price, in the mode the current TCR implies
    pub fn liquidate(&mut self, id: &AccountId, liquidator: AccountId) -> EngineResult<LiquidationRecord> {
        let price = self.price();
        let mode = self.liquidation_mode(price);
        self.liquidate_with_mode(id, liquidator, mode, price)
    }

    /// Validate everything a liquidation needs without writing anything
    fn plan_liquidation(&self, id: &AccountId, mode: LiquidationMode, price: u128) -> EngineResult<(LiquidationValues, u128)> {
        if self.paused {
            return Err(EngineError::Paused);
        }
        let position = self.ledger.active(id)?;
        if self.ledger.active_count() <= 1 {
            return Err(EngineError::LastPosition);
        }

        let entire = self.entire_debt_and_collateral(id)?;
        let icr = compute_cr(entire.collateral, entire.debt, price);
        let values = compute_liquidation_values(
            mode,
            &self.params,
            entire.debt,
            entire.collateral,
            price,
            self.stability_pool.total_deposits(),
        )
        .ok_or(EngineError::NotLiquidatable { icr })?;

        if values.redistributes() && self.stakes.total_stakes().saturating_sub(position.stake()) == 0 {
            return Err(EngineError::NoStakeToRedistribute);
        }
        self.require_balance(&STABILITY_POOL_ACCOUNT, values.debt_to_offset)?;
        self.require_balance(&GAS_POOL_ACCOUNT, values.stablecoin_gas_compensation)?;
        Ok((values, icr))
    }

    /// Price and mode always come from `liquidate`, never from a caller
    fn liquidate_with_mode(
        &mut self,
        id: &AccountId,
        liquidator: AccountId,
        mode: LiquidationMode,
        price: u128,
    ) -> EngineResult<LiquidationRecord> {
        let (values, icr) = self.plan_liquidation(id, mode, price)?;

        {
            let (mut position, pending) = self.ledger.touch(id, &self.rewards)?;
            self.pools.apply_pending(pending);
            self.stakes.remove_stake(&mut position);
        }

        let offset = self
            .stability_pool
            .offset(values.debt_to_offset, values.collateral_to_send_to_pool);
        self.pools.active.decrease(values.collateral_to_send_to_pool, offset);
        self.stablecoin.burn(STABILITY_POOL_ACCOUNT, offset)?;

        if values.redistributes() {
            self.rewards.redistribute(
                values.collateral_to_redistribute,
                values.debt_to_redistribute,
                self.stakes.total_stakes(),
            )?;
            self.pools
                .move_to_default(values.collateral_to_redistribute, values.debt_to_redistribute);
        }

        self.ledger.close(id, Status::ClosedByLiquidation)?;
        self.index.remove(id);

        if values.collateral_surplus > 0 {
            self.pools.surplus.account_surplus(*id, values.collateral_surplus);
            self.pools.active.decrease(values.collateral_surplus, 0);
        }
        self.pools.active.decrease(values.collateral_gas_compensation, 0);
        self.pools.flows.record_out(values.collateral_gas_compensation);

        let total_collateral = self.total_system_collateral();
        self.stakes.update_snapshots(total_collateral);

        self.stablecoin.burn(GAS_POOL_ACCOUNT, values.stablecoin_gas_compensation)?;
        self.stablecoin.mint(liquidator, values.stablecoin_gas_compensation);

        log::info!(
            "liquidated {} at ICR {}: debt {} (offset {}, redistributed {}), collateral {}",
            id,
            icr,
            values.entire_debt,
            offset,
            values.debt_to_redistribute,
            values.entire_collateral
        );

        Ok(LiquidationRecord {
            position: *id,
            liquidator,
            mode,
            price,
            icr,
            collateral_liquidated: values.entire_collateral - values.collateral_surplus,
            debt_liquidated: values.entire_debt,
            values,
        })
    }

    /// Liquidate every eligible key in order, re-deriving the mode before each
    /// one. Ineligible keys are skipped; if none qualifies nothing changes.
    pub fn liquidate_batch(&mut self, keys: &[AccountId], liquidator: AccountId) -> EngineResult<BatchLiquidation> {
        if self.paused {
            return Err(EngineError::Paused);
        }
        if keys.len() > MAX_BATCH_LIQUIDATIONS {
            return Err(EngineError::BatchTooLarge {
                requested: keys.len(),
                max: MAX_BATCH_LIQUIDATIONS,
            });
        }

        let mut batch = BatchLiquidation::default();
        for key in keys {
            match self.liquidate(key, liquidator) {
                Ok(record) => {
                    batch.totals.add(&record.values);
                    if batch.records.try_push(record).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("skipping {} in batch: {}", key, e);
                    batch.skipped.push((*key, e));
                }
            }
        }

        if batch.records.is_empty() {
            return Err(EngineError::NothingToLiquidate);
        }
        Ok(batch)
    }

    /// Liquidate up to `n` positions starting from the lowest nominal ratio,
    /// stopping at the first one that does not qualify
    pub fn liquidate_lowest(&mut self, n: usize, liquidator: AccountId) -> EngineResult<BatchLiquidation> {
        if self.paused {
            return Err(EngineError::Paused);
        }
        let mut batch = BatchLiquidation::default();
        for _ in 0..n.min(MAX_BATCH_LIQUIDATIONS) {
            if self.ledger.active_count() <= 1 {
                break;
            }
            let Some(lowest) = self.index.lowest() else {
                break;
            };
            match self.liquidate(&lowest, liquidator) {
                Ok(record) => {
                    batch.totals.add(&record.values);
                    if batch.records.try_push(record).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::debug!("stopping at {}: {}", lowest, e);
                    break;
                }
            }
        }

        if batch.records.is_empty() {
            return Err(EngineError::NothingToLiquidate);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::DECIMAL_PRECISION;

    const ONE: u128 = DECIMAL_PRECISION;

    fn system() -> CdpSystem {
        CdpSystem::new(Params::default()).unwrap()
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = Params {
            collateral_gas_divisor: 0,
            ..Params::default()
        };
        assert!(matches!(CdpSystem::new(params), Err(EngineError::InvalidParams(_))));
    }

    #[test]
    fn test_empty_system_projections() {
        let sys = system();
        assert_eq!(sys.tcr(sys.price()), u128::MAX);
        assert!(!sys.is_recovery_mode(sys.price()));
        assert_eq!(sys.liquidation_mode(sys.price()), LiquidationMode::Normal);
        let id = AccountId::new_unique();
        assert_eq!(sys.pending_collateral_reward(&id), 0);
        assert!(matches!(sys.current_icr(&id, ONE), Err(EngineError::PositionNotActive(_))));
    }

    #[test]
    fn test_liquidate_unknown_position() {
        let mut sys = system();
        let id = AccountId::new_unique();
        assert_eq!(
            sys.liquidate(&id, AccountId::new_unique()),
            Err(EngineError::PositionNotActive(id))
        );
    }

    #[test]
    fn test_paused_blocks_liquidation() {
        let mut sys = system();
        sys.set_paused(true);
        assert_eq!(
            sys.liquidate(&AccountId::new_unique(), AccountId::new_unique()),
            Err(EngineError::Paused)
        );
        assert_eq!(sys.liquidate_lowest(3, AccountId::new_unique()), Err(EngineError::Paused));
    }

    #[test]
    fn test_batch_size_limit() {
        let mut sys = system();
        let keys: Vec<AccountId> = (0..MAX_BATCH_LIQUIDATIONS + 1).map(|_| AccountId::new_unique()).collect();
        assert_eq!(
            sys.liquidate_batch(&keys, AccountId::new_unique()),
            Err(EngineError::BatchTooLarge {
                requested: MAX_BATCH_LIQUIDATIONS + 1,
                max: MAX_BATCH_LIQUIDATIONS
            })
        );
    }

    #[test]
    fn test_healthy_position_survives_until_feed_moves() {
        let mut sys = system();
        let [a, b] = [AccountId::new_unique(), AccountId::new_unique()];
        sys.open_position(a, 100 * ONE, 1_000 * ONE).unwrap();
        sys.open_position(b, 100 * ONE, 1_000 * ONE).unwrap();

        // 100 * $200 / 1,020 = 1960%
        let before = sys.clone();
        assert!(matches!(
            sys.liquidate(&b, AccountId::new_unique()),
            Err(EngineError::NotLiquidatable { .. })
        ));
        assert_eq!(sys, before);

        // 100 * $11 / 1,020 = 107.8%
        sys.price_feed_mut().set_price(11 * ONE);
        let record = sys.liquidate(&b, AccountId::new_unique()).unwrap();
        assert_eq!(record.price, 11 * ONE);
        assert_eq!(record.icr, 1_078_431_372_549_019_607);
    }

    #[test]
    fn test_withdraw_without_deposit() {
        let mut sys = system();
        let a = AccountId::new_unique();
        assert_eq!(sys.withdraw_from_pool(a, ONE), Err(EngineError::NoDeposit(a)));
    }
}
