//! Stability pool compounding engine
//!
//! Depositors' stablecoin is consumed by liquidations in exchange for the
//! liquidated collateral. Rather than rewriting every balance, the pool keeps:
//! - `P`: running product, each deposit's share shrinks by the same factor
//! - `S[epoch][scale]`: running sum of collateral gain per unit, weighted by P
//! - `scale`: bumped (and P multiplied by 1e9) whenever P would drop below 1e9
//! - `epoch`: bumped (and P reset to 1.0) whenever a liquidation empties the pool
//!
//! A depositor's compounded deposit and collateral gain are derived from its
//! snapshot of those values, so every liquidation costs O(1).

use crate::error::{EngineError, EngineResult};
use crate::math::{min_u128, mul_div, u256_to_u128, DECIMAL_PRECISION, SCALE_FACTOR};
use crate::state::AccountId;
use primitive_types::U256;
use serde::Serialize;
use std::collections::BTreeMap;

/// Engine state captured when a deposit was last touched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepositSnapshot {
    pub p: u128,
    pub s: U256,
    pub scale: u64,
    pub epoch: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deposit {
    pub initial_value: u128,
    pub snapshot: DepositSnapshot,
}

/// What a deposit-touching operation realized for the depositor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DepositReceipt {
    /// Compounded deposit before the operation
    pub compounded_deposit: u128,
    /// Collateral gain paid out
    pub collateral_gain: u128,
    /// Stablecoin moved into (provide) or out of (withdraw) the pool
    pub amount: u128,
    /// Deposit recorded after the operation
    pub new_deposit: u128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StabilityPool {
    p: u128,
    current_scale: u64,
    current_epoch: u64,
    epoch_to_scale_to_sum: BTreeMap<(u64, u64), U256>,
    total_deposits: u128,
    total_collateral: u128,
    last_collateral_error_offset: u128,
    last_debt_loss_error_offset: u128,
    deposits: BTreeMap<AccountId, Deposit>,
}

impl Default for StabilityPool {
    fn default() -> Self {
        Self {
            p: DECIMAL_PRECISION,
            current_scale: 0,
            current_epoch: 0,
            epoch_to_scale_to_sum: BTreeMap::new(),
            total_deposits: 0,
            total_collateral: 0,
            last_collateral_error_offset: 0,
            last_debt_loss_error_offset: 0,
            deposits: BTreeMap::new(),
        }
    }
}

impl StabilityPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn p(&self) -> u128 {
        self.p
    }

    pub fn current_scale(&self) -> u64 {
        self.current_scale
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    /// Stablecoin currently held for depositors
    pub fn total_deposits(&self) -> u128 {
        self.total_deposits
    }

    /// Collateral held for depositors as unpaid gains
    pub fn total_collateral(&self) -> u128 {
        self.total_collateral
    }

    pub fn sum_at(&self, epoch: u64, scale: u64) -> U256 {
        self.epoch_to_scale_to_sum
            .get(&(epoch, scale))
            .copied()
            .unwrap_or_default()
    }

    pub fn deposit(&self, depositor: &AccountId) -> Option<&Deposit> {
        self.deposits.get(depositor)
    }

    pub fn depositors(&self) -> impl Iterator<Item = (&AccountId, &Deposit)> {
        self.deposits.iter()
    }

    pub fn compounded_deposit(&self, depositor: &AccountId) -> u128 {
        match self.deposits.get(depositor) {
            Some(deposit) => self.compounded_from_snapshot(deposit),
            None => 0,
        }
    }

    fn compounded_from_snapshot(&self, deposit: &Deposit) -> u128 {
        let snapshot = &deposit.snapshot;
        if deposit.initial_value == 0 || snapshot.p == 0 {
            return 0;
        }
        // Emptied at least once since the last touch
        if snapshot.epoch < self.current_epoch {
            return 0;
        }

        let compounded = match self.current_scale.saturating_sub(snapshot.scale) {
            0 => mul_div(deposit.initial_value, self.p, snapshot.p),
            1 => mul_div(deposit.initial_value, self.p, snapshot.p) / SCALE_FACTOR,
            _ => 0,
        };

        // Below one billionth of the original the remainder is rounding noise
        if compounded < deposit.initial_value / 1_000_000_000 {
            return 0;
        }
        compounded
    }

    pub fn depositor_collateral_gain(&self, depositor: &AccountId) -> u128 {
        match self.deposits.get(depositor) {
            Some(deposit) => self.gain_from_snapshot(deposit),
            None => 0,
        }
    }

    fn gain_from_snapshot(&self, deposit: &Deposit) -> u128 {
        let snapshot = &deposit.snapshot;
        if deposit.initial_value == 0 || snapshot.p == 0 {
            return 0;
        }
        // Gains accrued after a scale change were recorded against a P
        // rescaled by SCALE_FACTOR, so the next slot is scaled back down.
        let first = self
            .sum_at(snapshot.epoch, snapshot.scale)
            .saturating_sub(snapshot.s);
        let second = self.sum_at(snapshot.epoch, snapshot.scale + 1) / U256::from(SCALE_FACTOR);

        let gain = U256::from(deposit.initial_value) * first.saturating_add(second)
            / U256::from(snapshot.p)
            / U256::from(DECIMAL_PRECISION);
        u256_to_u128(gain)
    }

    fn current_snapshot(&self) -> DepositSnapshot {
        DepositSnapshot {
            p: self.p,
            s: self.sum_at(self.current_epoch, self.current_scale),
            scale: self.current_scale,
            epoch: self.current_epoch,
        }
    }

    fn update_deposit_and_snapshot(&mut self, depositor: AccountId, new_value: u128) {
        if new_value == 0 {
            self.deposits.remove(&depositor);
            return;
        }
        let snapshot = self.current_snapshot();
        self.deposits.insert(
            depositor,
            Deposit {
                initial_value: new_value,
                snapshot,
            },
        );
    }

    fn pay_out_collateral(&mut self, gain: u128) -> u128 {
        let paid = min_u128(gain, self.total_collateral);
        self.total_collateral -= paid;
        paid
    }

    /// Realize the depositor's compounded deposit and gain, then add `amount`
    pub(crate) fn provide(&mut self, depositor: AccountId, amount: u128) -> EngineResult<DepositReceipt> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        let compounded = self.compounded_deposit(&depositor);
        let gain = self.depositor_collateral_gain(&depositor);

        self.total_deposits = self.total_deposits.saturating_add(amount);
        let new_deposit = compounded.saturating_add(amount);
        self.update_deposit_and_snapshot(depositor, new_deposit);
        let paid = self.pay_out_collateral(gain);

        log::debug!(
            "deposit {} provided {} (compounded {}, gain {}, total {})",
            depositor,
            amount,
            compounded,
            paid,
            self.total_deposits
        );
        Ok(DepositReceipt {
            compounded_deposit: compounded,
            collateral_gain: paid,
            amount,
            new_deposit,
        })
    }

    /// Realize the depositor's compounded deposit and gain, then take out up to
    /// `amount` (capped at the compounded deposit). A zero amount only claims
    /// the gain.
    pub(crate) fn withdraw(&mut self, depositor: AccountId, amount: u128) -> EngineResult<DepositReceipt> {
        let deposit = match self.deposits.get(&depositor) {
            Some(d) if d.initial_value > 0 => *d,
            _ => return Err(EngineError::NoDeposit(depositor)),
        };
        let compounded = self.compounded_from_snapshot(&deposit);
        let gain = self.gain_from_snapshot(&deposit);

        let to_withdraw = min_u128(amount, compounded);
        self.total_deposits = self.total_deposits.saturating_sub(to_withdraw);
        let new_deposit = compounded - to_withdraw;
        self.update_deposit_and_snapshot(depositor, new_deposit);
        let paid = self.pay_out_collateral(gain);

        log::debug!(
            "deposit {} withdrew {} (compounded {}, gain {}, total {})",
            depositor,
            to_withdraw,
            compounded,
            paid,
            self.total_deposits
        );
        Ok(DepositReceipt {
            compounded_deposit: compounded,
            collateral_gain: paid,
            amount: to_withdraw,
            new_deposit,
        })
    }

    /// Pay out the whole collateral gain, keeping the compounded deposit
    pub(crate) fn take_collateral_gain(&mut self, depositor: AccountId) -> EngineResult<DepositReceipt> {
        let deposit = match self.deposits.get(&depositor) {
            Some(d) if d.initial_value > 0 => *d,
            _ => return Err(EngineError::NoDeposit(depositor)),
        };
        let gain = self.gain_from_snapshot(&deposit);
        if gain == 0 {
            return Err(EngineError::NoCollateralGain(depositor));
        }
        let compounded = self.compounded_from_snapshot(&deposit);
        self.update_deposit_and_snapshot(depositor, compounded);
        let paid = self.pay_out_collateral(gain);

        Ok(DepositReceipt {
            compounded_deposit: compounded,
            collateral_gain: paid,
            amount: 0,
            new_deposit: compounded,
        })
    }

    /// Cancel `debt` against pooled deposits in exchange for `collateral`.
    ///
    /// Debt beyond the pool's total is not absorbed; the caller sends the
    /// matching collateral to redistribution. Returns the debt actually offset.
    pub(crate) fn offset(&mut self, debt: u128, collateral: u128) -> u128 {
        let total = self.total_deposits;
        if total == 0 || debt == 0 {
            return 0;
        }
        let debt = min_u128(debt, total);

        let (gain_per_unit, loss_per_unit) = self.compute_rewards_per_unit_staked(collateral, debt, total);
        self.update_reward_sum_and_product(gain_per_unit, loss_per_unit);

        self.total_deposits = total - debt;
        self.total_collateral = self.total_collateral.saturating_add(collateral);
        log::debug!(
            "offset {} debt for {} collateral, deposits left {}",
            debt,
            collateral,
            self.total_deposits
        );
        debt
    }

    /// Per-unit collateral gain and debt loss, carrying the division
    /// remainders of the previous offset. The loss is rounded up so that
    /// compounded deposits never sum to more than the pool holds.
    fn compute_rewards_per_unit_staked(&mut self, collateral: u128, debt: u128, total: u128) -> (U256, u128) {
        let total_wide = U256::from(total);
        let precision = U256::from(DECIMAL_PRECISION);

        let coll_numerator = U256::from(collateral) * precision + U256::from(self.last_collateral_error_offset);

        let loss_per_unit = if debt == total {
            self.last_debt_loss_error_offset = 0;
            DECIMAL_PRECISION
        } else {
            let loss_numerator =
                (U256::from(debt) * precision).saturating_sub(U256::from(self.last_debt_loss_error_offset));
            let loss = loss_numerator / total_wide + U256::one();
            self.last_debt_loss_error_offset = u256_to_u128((loss * total_wide).saturating_sub(loss_numerator));
            min_u128(u256_to_u128(loss), DECIMAL_PRECISION)
        };

        let (gain_per_unit, coll_error) = coll_numerator.div_mod(total_wide);
        self.last_collateral_error_offset = coll_error.low_u128();

        (gain_per_unit, loss_per_unit)
    }

    fn update_reward_sum_and_product(&mut self, gain_per_unit: U256, loss_per_unit: u128) {
        let current_p = self.p;
        let new_product_factor = DECIMAL_PRECISION - loss_per_unit;

        // S first, against the P that was in force during this liquidation
        let key = (self.current_epoch, self.current_scale);
        let new_s = self.sum_at(key.0, key.1).saturating_add(gain_per_unit * U256::from(current_p));
        self.epoch_to_scale_to_sum.insert(key, new_s);
        log::debug!("S[{}][{}] updated to {}", key.0, key.1, new_s);

        if new_product_factor == 0 {
            self.current_epoch += 1;
            self.current_scale = 0;
            self.p = DECIMAL_PRECISION;
            log::info!("stability pool emptied, epoch advanced to {}", self.current_epoch);
        } else if mul_div(current_p, new_product_factor, DECIMAL_PRECISION) < SCALE_FACTOR {
            let wide = U256::from(current_p) * U256::from(new_product_factor) * U256::from(SCALE_FACTOR)
                / U256::from(DECIMAL_PRECISION);
            self.p = u256_to_u128(wide);
            self.current_scale += 1;
            log::debug!("P rescaled to {}, scale advanced to {}", self.p, self.current_scale);
        } else {
            self.p = mul_div(current_p, new_product_factor, DECIMAL_PRECISION);
        }
    }
}
