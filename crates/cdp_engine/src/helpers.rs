//! Invariant checking helpers

use crate::collaborators::{PriceFeed, SortedIndex, StablecoinLedger};
use crate::ledger::PositionLedger;
use crate::math::{add_u128, DECIMAL_PRECISION};
use crate::redistribution::RedistributionAccumulator;
use crate::stability_pool::StabilityPool;
use crate::stake::StakeCorrection;
use crate::state::{GAS_POOL_ACCOUNT, STABILITY_POOL_ACCOUNT};
use crate::system::CdpSystem;
use serde::Serialize;

/// Pool-level collateral equals everything that entered minus everything that left
pub fn collateral_conserved<F, T, I>(sys: &CdpSystem<F, T, I>) -> bool
where
    F: PriceFeed,
    T: StablecoinLedger,
    I: SortedIndex,
{
    let pools = sys.pools();
    let held = add_u128(
        add_u128(pools.active().collateral, pools.default_pool().collateral),
        add_u128(sys.stability_pool().total_collateral(), pools.surplus().total()),
    );
    held == pools.flows().expected_holdings()
}

/// Every stablecoin in circulation is backed by position debt
pub fn supply_matches_debt<F, T, I>(sys: &CdpSystem<F, T, I>) -> bool
where
    F: PriceFeed,
    T: StablecoinLedger,
    I: SortedIndex,
{
    sys.stablecoin().total_supply() == sys.total_system_debt()
}

/// The reserved accounts hold exactly the deposits and the gas compensation
pub fn reserved_balances_ok<F, T, I>(sys: &CdpSystem<F, T, I>) -> bool
where
    F: PriceFeed,
    T: StablecoinLedger,
    I: SortedIndex,
{
    let coin = sys.stablecoin();
    let gas_expected = sys
        .params()
        .gas_compensation
        .saturating_mul(sys.ledger().active_count() as u128);
    coin.balance_of(&STABILITY_POOL_ACCOUNT) == sys.stability_pool().total_deposits()
        && coin.balance_of(&GAS_POOL_ACCOUNT) == gas_expected
}

/// Largest shortfall of positions against the pools, per asset, left by
/// truncating pending rewards (1e-9 of a unit)
pub const POOL_DUST_TOLERANCE: u128 = 1_000_000_000;

/// Active positions, pending rewards included, add up to the active and
/// default pools. Positions may fall short by truncation dust, never exceed.
pub fn positions_match_pools<F, T, I>(sys: &CdpSystem<F, T, I>) -> bool
where
    F: PriceFeed,
    T: StablecoinLedger,
    I: SortedIndex,
{
    let rewards = sys.rewards();
    let (owed_collateral, owed_debt) = sys.ledger().iter_active().fold((0u128, 0u128), |(c, d), (_, p)| {
        let pending = rewards.pending_rewards(p);
        (
            add_u128(c, add_u128(p.collateral(), pending.collateral)),
            add_u128(d, add_u128(p.debt(), pending.debt)),
        )
    });
    let within = |held: u128, owed: u128| owed <= held && held - owed <= POOL_DUST_TOLERANCE;
    within(sys.total_system_collateral(), owed_collateral) && within(sys.total_system_debt(), owed_debt)
}

pub fn product_in_range(pool: &StabilityPool) -> bool {
    pool.p() > 0 && pool.p() <= DECIMAL_PRECISION
}

/// No position's reward snapshot is ahead of the global accumulator
pub fn snapshots_not_ahead(ledger: &PositionLedger, rewards: &RedistributionAccumulator) -> bool {
    ledger.iter_active().all(|(_, p)| {
        let snap = p.reward_snapshot();
        snap.collateral <= rewards.l_collateral() && snap.debt <= rewards.l_debt()
    })
}

pub fn total_stakes_consistent(ledger: &PositionLedger, stakes: &StakeCorrection) -> bool {
    let sum = ledger
        .iter_active()
        .fold(0u128, |acc, (_, p)| add_u128(acc, p.stake()));
    sum == stakes.total_stakes()
}

/// Every active position is in the sorted index and nothing else is
pub fn index_matches_ledger<I: SortedIndex>(ledger: &PositionLedger, index: &I) -> bool {
    index.len() == ledger.active_count() && ledger.iter_active().all(|(id, _)| index.contains(id))
}

/// Outcome of every check, for logging
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct InvariantReport {
    pub collateral_conserved: bool,
    pub supply_matches_debt: bool,
    pub reserved_balances_ok: bool,
    pub product_in_range: bool,
    pub snapshots_not_ahead: bool,
    pub total_stakes_consistent: bool,
    pub index_matches_ledger: bool,
    pub positions_match_pools: bool,
}

impl InvariantReport {
    pub fn all_ok(&self) -> bool {
        self.collateral_conserved
            && self.supply_matches_debt
            && self.reserved_balances_ok
            && self.product_in_range
            && self.snapshots_not_ahead
            && self.total_stakes_consistent
            && self.index_matches_ledger
            && self.positions_match_pools
    }
}

pub fn check_invariants<F, T, I>(sys: &CdpSystem<F, T, I>) -> InvariantReport
where
    F: PriceFeed,
    T: StablecoinLedger,
    I: SortedIndex,
{
    InvariantReport {
        collateral_conserved: collateral_conserved(sys),
        supply_matches_debt: supply_matches_debt(sys),
        reserved_balances_ok: reserved_balances_ok(sys),
        product_in_range: product_in_range(sys.stability_pool()),
        snapshots_not_ahead: snapshots_not_ahead(sys.ledger(), sys.rewards()),
        total_stakes_consistent: total_stakes_consistent(sys.ledger(), sys.stakes()),
        index_matches_ledger: index_matches_ledger(sys.ledger(), sys.index()),
        positions_match_pools: positions_match_pools(sys),
    }
}
