//! Liquidation arithmetic
//!
//! Pure functions deciding how a position's entire debt and collateral split
//! between the stability pool offset, redistribution, gas compensation and
//! the owner's surplus. The orchestrator in `system` validates a plan built
//! from these values before writing anything.

use crate::math::{compute_cr, min_u128, mul_div, ONE_HUNDRED_PCT};
use crate::state::{AccountId, Params};
use serde::Serialize;

/// Upper bound on positions handled by one batch call
pub const MAX_BATCH_LIQUIDATIONS: usize = 64;

/// System-wide liquidation regime, derived from the total collateral ratio
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LiquidationMode {
    Normal,
    /// TCR below the critical ratio; `tcr` is the ratio at liquidation time
    Recovery { tcr: u128 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LiquidationValues {
    pub entire_debt: u128,
    pub entire_collateral: u128,
    pub collateral_gas_compensation: u128,
    pub stablecoin_gas_compensation: u128,
    pub debt_to_offset: u128,
    pub collateral_to_send_to_pool: u128,
    pub debt_to_redistribute: u128,
    pub collateral_to_redistribute: u128,
    pub collateral_surplus: u128,
}

impl LiquidationValues {
    pub fn redistributes(&self) -> bool {
        self.debt_to_redistribute > 0 || self.collateral_to_redistribute > 0
    }
}

/// Split of a debt/collateral pair between the pool and redistribution
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OffsetSplit {
    pub debt_to_offset: u128,
    pub collateral_to_send_to_pool: u128,
    pub debt_to_redistribute: u128,
    pub collateral_to_redistribute: u128,
}

pub fn collateral_gas_compensation(collateral: u128, params: &Params) -> u128 {
    if params.collateral_gas_divisor == 0 {
        return 0;
    }
    collateral / u128::from(params.collateral_gas_divisor)
}

/// Offset as much debt as the pool holds, with matching collateral; the rest
/// is redistributed.
pub fn offset_and_redistribution_vals(debt: u128, collateral: u128, pool_deposits: u128) -> OffsetSplit {
    if pool_deposits == 0 || debt == 0 {
        return OffsetSplit {
            debt_to_redistribute: debt,
            collateral_to_redistribute: collateral,
            ..OffsetSplit::default()
        };
    }
    let debt_to_offset = min_u128(debt, pool_deposits);
    let collateral_to_send_to_pool = mul_div(collateral, debt_to_offset, debt);
    OffsetSplit {
        debt_to_offset,
        collateral_to_send_to_pool,
        debt_to_redistribute: debt - debt_to_offset,
        collateral_to_redistribute: collateral - collateral_to_send_to_pool,
    }
}

fn normal_values(params: &Params, debt: u128, collateral: u128, pool_deposits: u128) -> LiquidationValues {
    let gas = collateral_gas_compensation(collateral, params);
    let split = offset_and_redistribution_vals(debt, collateral - gas, pool_deposits);
    LiquidationValues {
        entire_debt: debt,
        entire_collateral: collateral,
        collateral_gas_compensation: gas,
        stablecoin_gas_compensation: params.gas_compensation,
        debt_to_offset: split.debt_to_offset,
        collateral_to_send_to_pool: split.collateral_to_send_to_pool,
        debt_to_redistribute: split.debt_to_redistribute,
        collateral_to_redistribute: split.collateral_to_redistribute,
        collateral_surplus: 0,
    }
}

fn redistribution_only_values(params: &Params, debt: u128, collateral: u128) -> LiquidationValues {
    let gas = collateral_gas_compensation(collateral, params);
    LiquidationValues {
        entire_debt: debt,
        entire_collateral: collateral,
        collateral_gas_compensation: gas,
        stablecoin_gas_compensation: params.gas_compensation,
        debt_to_redistribute: debt,
        collateral_to_redistribute: collateral - gas,
        ..LiquidationValues::default()
    }
}

/// Only `debt * MCR / price` worth of collateral is liquidated; the owner keeps
/// the rest as claimable surplus.
fn capped_offset_values(params: &Params, debt: u128, collateral: u128, price: u128) -> LiquidationValues {
    let capped = min_u128(mul_div(debt, params.minimum_collateral_ratio, price), collateral);
    let gas = collateral_gas_compensation(capped, params);
    LiquidationValues {
        entire_debt: debt,
        entire_collateral: collateral,
        collateral_gas_compensation: gas,
        stablecoin_gas_compensation: params.gas_compensation,
        debt_to_offset: debt,
        collateral_to_send_to_pool: capped - gas,
        collateral_surplus: collateral - capped,
        ..LiquidationValues::default()
    }
}

/// Liquidation values for a position, or `None` when the mode does not allow
/// liquidating it.
pub fn compute_liquidation_values(
    mode: LiquidationMode,
    params: &Params,
    debt: u128,
    collateral: u128,
    price: u128,
    pool_deposits: u128,
) -> Option<LiquidationValues> {
    let icr = compute_cr(collateral, debt, price);
    let mcr = params.minimum_collateral_ratio;
    match mode {
        LiquidationMode::Normal if icr < mcr => Some(normal_values(params, debt, collateral, pool_deposits)),
        LiquidationMode::Normal => None,
        LiquidationMode::Recovery { .. } if icr <= ONE_HUNDRED_PCT => {
            Some(redistribution_only_values(params, debt, collateral))
        }
        LiquidationMode::Recovery { .. } if icr < mcr => Some(normal_values(params, debt, collateral, pool_deposits)),
        LiquidationMode::Recovery { tcr } if icr < tcr && debt <= pool_deposits => {
            Some(capped_offset_values(params, debt, collateral, price))
        }
        LiquidationMode::Recovery { .. } => None,
    }
}

/// Outcome of one liquidation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LiquidationRecord {
    pub position: AccountId,
    pub liquidator: AccountId,
    pub mode: LiquidationMode,
    pub price: u128,
    pub icr: u128,
    /// Collateral taken from the position (entire collateral minus surplus)
    pub collateral_liquidated: u128,
    pub debt_liquidated: u128,
    pub values: LiquidationValues,
}

impl LiquidationRecord {
    pub fn gas_compensation(&self) -> (u128, u128) {
        (
            self.values.collateral_gas_compensation,
            self.values.stablecoin_gas_compensation,
        )
    }
}

/// Sums over a batch of liquidations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LiquidationTotals {
    pub collateral_in_sequence: u128,
    pub debt_in_sequence: u128,
    pub collateral_gas_compensation: u128,
    pub stablecoin_gas_compensation: u128,
    pub debt_to_offset: u128,
    pub collateral_to_send_to_pool: u128,
    pub debt_to_redistribute: u128,
    pub collateral_to_redistribute: u128,
    pub collateral_surplus: u128,
}

impl LiquidationTotals {
    pub fn add(&mut self, values: &LiquidationValues) {
        self.collateral_in_sequence = self.collateral_in_sequence.saturating_add(values.entire_collateral);
        self.debt_in_sequence = self.debt_in_sequence.saturating_add(values.entire_debt);
        self.collateral_gas_compensation = self
            .collateral_gas_compensation
            .saturating_add(values.collateral_gas_compensation);
        self.stablecoin_gas_compensation = self
            .stablecoin_gas_compensation
            .saturating_add(values.stablecoin_gas_compensation);
        self.debt_to_offset = self.debt_to_offset.saturating_add(values.debt_to_offset);
        self.collateral_to_send_to_pool = self
            .collateral_to_send_to_pool
            .saturating_add(values.collateral_to_send_to_pool);
        self.debt_to_redistribute = self.debt_to_redistribute.saturating_add(values.debt_to_redistribute);
        self.collateral_to_redistribute = self
            .collateral_to_redistribute
            .saturating_add(values.collateral_to_redistribute);
        self.collateral_surplus = self.collateral_surplus.saturating_add(values.collateral_surplus);
    }
}

/// Records and totals of a batch, plus the keys that were skipped
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchLiquidation {
    pub records: arrayvec::ArrayVec<LiquidationRecord, MAX_BATCH_LIQUIDATIONS>,
    pub totals: LiquidationTotals,
    pub skipped: Vec<(AccountId, crate::error::EngineError)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::DECIMAL_PRECISION;

    const ONE: u128 = DECIMAL_PRECISION;

    fn conserves_collateral(v: &LiquidationValues) -> bool {
        v.collateral_gas_compensation
            + v.collateral_to_send_to_pool
            + v.collateral_to_redistribute
            + v.collateral_surplus
            == v.entire_collateral
    }

    #[test]
    fn test_normal_mode_full_offset() {
        let params = Params::default();
        // 100 coll at $100 against 10,000 debt: ICR 100%
        let v = compute_liquidation_values(
            LiquidationMode::Normal,
            &params,
            10_000 * ONE,
            100 * ONE,
            100 * ONE,
            30_000 * ONE,
        )
        .unwrap();
        assert_eq!(v.collateral_gas_compensation, ONE / 2);
        assert_eq!(v.debt_to_offset, 10_000 * ONE);
        assert_eq!(v.collateral_to_send_to_pool, 995 * ONE / 10);
        assert!(!v.redistributes());
        assert!(conserves_collateral(&v));
    }

    #[test]
    fn test_normal_mode_partial_offset() {
        let params = Params::default();
        let v = compute_liquidation_values(LiquidationMode::Normal, &params, 2_000 * ONE, 20 * ONE, 100 * ONE, 500 * ONE)
            .unwrap();
        assert_eq!(v.debt_to_offset, 500 * ONE);
        assert_eq!(v.collateral_to_send_to_pool, 4_975 * ONE / 1_000);
        assert_eq!(v.debt_to_redistribute, 1_500 * ONE);
        assert_eq!(v.collateral_to_redistribute, 14_925 * ONE / 1_000);
        assert!(conserves_collateral(&v));
    }

    #[test]
    fn test_normal_mode_healthy_not_eligible() {
        let params = Params::default();
        // ICR exactly 110%
        let v = compute_liquidation_values(LiquidationMode::Normal, &params, 1_000 * ONE, 11 * ONE, 100 * ONE, 0);
        assert!(v.is_none());
    }

    #[test]
    fn test_empty_pool_redistributes_everything() {
        let params = Params::default();
        let v = compute_liquidation_values(LiquidationMode::Normal, &params, 2_000 * ONE, 20 * ONE, 100 * ONE, 0)
            .unwrap();
        assert_eq!(v.debt_to_offset, 0);
        assert_eq!(v.debt_to_redistribute, 2_000 * ONE);
        assert_eq!(v.collateral_to_redistribute, 199 * ONE / 10);
    }

    #[test]
    fn test_recovery_below_100_pct_skips_pool() {
        let params = Params::default();
        let mode = LiquidationMode::Recovery { tcr: 12 * ONE / 10 };
        let v = compute_liquidation_values(mode, &params, 2_000 * ONE, 19 * ONE, 100 * ONE, 100_000 * ONE).unwrap();
        assert_eq!(v.debt_to_offset, 0);
        assert_eq!(v.debt_to_redistribute, 2_000 * ONE);
        assert!(conserves_collateral(&v));
    }

    #[test]
    fn test_recovery_capped_offset_leaves_surplus() {
        let params = Params::default();
        let mode = LiquidationMode::Recovery { tcr: 16 * ONE / 10 };
        // ICR 150%: above MCR, below TCR
        let v = compute_liquidation_values(mode, &params, 2_000 * ONE, 30 * ONE, 100 * ONE, 5_000 * ONE).unwrap();
        assert_eq!(v.debt_to_offset, 2_000 * ONE);
        assert_eq!(v.collateral_gas_compensation, 11 * ONE / 100);
        assert_eq!(v.collateral_to_send_to_pool, 2_189 * ONE / 100);
        assert_eq!(v.collateral_surplus, 8 * ONE);
        assert!(!v.redistributes());
        assert!(conserves_collateral(&v));
    }

    #[test]
    fn test_recovery_capped_needs_pool_cover() {
        let params = Params::default();
        let mode = LiquidationMode::Recovery { tcr: 16 * ONE / 10 };
        assert!(compute_liquidation_values(mode, &params, 2_000 * ONE, 30 * ONE, 100 * ONE, 1_999 * ONE).is_none());
    }

    #[test]
    fn test_recovery_above_tcr_not_eligible() {
        let params = Params::default();
        let mode = LiquidationMode::Recovery { tcr: 14 * ONE / 10 };
        assert!(compute_liquidation_values(mode, &params, 2_000 * ONE, 30 * ONE, 100 * ONE, 5_000 * ONE).is_none());
    }

    #[test]
    fn test_totals_accumulate() {
        let params = Params::default();
        let v = compute_liquidation_values(LiquidationMode::Normal, &params, 2_000 * ONE, 20 * ONE, 100 * ONE, 500 * ONE)
            .unwrap();
        let mut totals = LiquidationTotals::default();
        totals.add(&v);
        totals.add(&v);
        assert_eq!(totals.debt_in_sequence, 4_000 * ONE);
        assert_eq!(totals.stablecoin_gas_compensation, 2 * params.gas_compensation);
    }
}
