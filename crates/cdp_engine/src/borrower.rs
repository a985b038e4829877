//! Borrower operations: open, adjust and close positions, claim surplus
//!
//! Every operation touches the position (applying pending redistribution)
//! before writing, and is validated on projected values first.

use crate::collaborators::{PriceFeed, SortedIndex, StablecoinLedger};
use crate::error::{EngineError, EngineResult};
use crate::math::{compute_cr, compute_nominal_cr};
use crate::state::{AccountId, Status, GAS_POOL_ACCOUNT};
use crate::system::CdpSystem;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollateralChange {
    #[default]
    None,
    Add(u128),
    Withdraw(u128),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DebtChange {
    #[default]
    None,
    Borrow(u128),
    Repay(u128),
}

/// One collateral change and one debt change, applied together
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Adjustment {
    pub collateral: CollateralChange,
    pub debt: DebtChange,
}

impl Adjustment {
    fn collateral_in_out(&self) -> (u128, u128) {
        match self.collateral {
            CollateralChange::None => (0, 0),
            CollateralChange::Add(amount) => (amount, 0),
            CollateralChange::Withdraw(amount) => (0, amount),
        }
    }

    fn debt_in_out(&self) -> (u128, u128) {
        match self.debt {
            DebtChange::None => (0, 0),
            DebtChange::Borrow(amount) => (amount, 0),
            DebtChange::Repay(amount) => (0, amount),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.collateral_in_out() == (0, 0) && self.debt_in_out() == (0, 0)
    }
}

impl<F: PriceFeed, T: StablecoinLedger, I: SortedIndex> CdpSystem<F, T, I> {
    /// Open a position borrowing `borrow_amount`; returns the composite debt
    /// (borrow plus gas compensation).
    pub fn open_position(&mut self, owner: AccountId, collateral: u128, borrow_amount: u128) -> EngineResult<u128> {
        if self.paused {
            return Err(EngineError::Paused);
        }
        if self.ledger.is_active(&owner) {
            return Err(EngineError::PositionAlreadyActive(owner));
        }
        if collateral == 0 {
            return Err(EngineError::ZeroAmount);
        }
        if borrow_amount < self.params.min_net_debt {
            return Err(EngineError::NetDebtBelowMinimum {
                net_debt: borrow_amount,
                minimum: self.params.min_net_debt,
            });
        }

        let gas_compensation = self.params.gas_compensation;
        let debt = borrow_amount.saturating_add(gas_compensation);
        let price = self.price();
        let icr = compute_cr(collateral, debt, price);

        if self.is_recovery_mode(price) {
            let ccr = self.params.critical_collateral_ratio;
            if icr < ccr {
                return Err(EngineError::CollateralRatioTooLow { icr, required: ccr });
            }
        } else {
            let mcr = self.params.minimum_collateral_ratio;
            if icr < mcr {
                return Err(EngineError::CollateralRatioTooLow { icr, required: mcr });
            }
            self.require_tcr_above_critical(price, collateral, 0, debt, 0)?;
        }

        let snapshot = self.rewards.snapshot();
        {
            let mut position = self.ledger.open(owner, collateral, debt, snapshot)?;
            self.stakes.update_stake(&mut position);
        }
        self.index.insert(owner, compute_nominal_cr(collateral, debt), None);
        self.pools.active.increase(collateral, debt);
        self.pools.flows.record_in(collateral);

        self.stablecoin.mint(owner, borrow_amount);
        self.stablecoin.mint(GAS_POOL_ACCOUNT, gas_compensation);

        log::info!("opened position {}: collateral {} debt {} (ICR {})", owner, collateral, debt, icr);
        Ok(debt)
    }

    pub(crate) fn require_tcr_above_critical(
        &self,
        price: u128,
        coll_in: u128,
        coll_out: u128,
        debt_in: u128,
        debt_out: u128,
    ) -> EngineResult<()> {
        let tcr = self.tcr_after(price, coll_in, coll_out, debt_in, debt_out);
        let ccr = self.params.critical_collateral_ratio;
        if tcr < ccr {
            return Err(EngineError::TcrBelowCritical { tcr, ccr });
        }
        Ok(())
    }

    pub fn adjust_position(&mut self, owner: AccountId, adjustment: Adjustment) -> EngineResult<()> {
        let entire = self.entire_debt_and_collateral(&owner)?;
        if adjustment.is_empty() {
            return Err(EngineError::EmptyAdjustment);
        }
        let (coll_in, coll_out) = adjustment.collateral_in_out();
        let (debt_in, debt_out) = adjustment.debt_in_out();
        if self.paused && debt_in > 0 {
            return Err(EngineError::Paused);
        }

        let price = self.price();
        let recovery = self.is_recovery_mode(price);
        if recovery && coll_out > 0 {
            return Err(EngineError::CollateralWithdrawalInRecoveryMode);
        }
        if coll_out > entire.collateral {
            return Err(EngineError::InsufficientCollateral {
                requested: coll_out,
                available: entire.collateral,
            });
        }
        let gas_compensation = self.params.gas_compensation;
        if debt_out > 0 {
            let repayable = entire.debt.saturating_sub(gas_compensation);
            if debt_out > repayable {
                return Err(EngineError::RepaymentExceedsDebt {
                    requested: debt_out,
                    repayable,
                });
            }
            self.require_balance(&owner, debt_out)?;
        }

        let new_collateral = entire.collateral.saturating_add(coll_in) - coll_out;
        let new_debt = entire.debt.saturating_add(debt_in) - debt_out;
        let old_icr = compute_cr(entire.collateral, entire.debt, price);
        let new_icr = compute_cr(new_collateral, new_debt, price);

        if recovery {
            if debt_in > 0 {
                let ccr = self.params.critical_collateral_ratio;
                if new_icr < ccr {
                    return Err(EngineError::CollateralRatioTooLow { icr: new_icr, required: ccr });
                }
                if new_icr < old_icr {
                    return Err(EngineError::IcrDecreaseInRecoveryMode);
                }
            }
        } else {
            let mcr = self.params.minimum_collateral_ratio;
            if new_icr < mcr {
                return Err(EngineError::CollateralRatioTooLow { icr: new_icr, required: mcr });
            }
            self.require_tcr_above_critical(price, coll_in, coll_out, debt_in, debt_out)?;
        }
        if debt_out > 0 {
            let net_debt = new_debt.saturating_sub(gas_compensation);
            if net_debt < self.params.min_net_debt {
                return Err(EngineError::NetDebtBelowMinimum {
                    net_debt,
                    minimum: self.params.min_net_debt,
                });
            }
        }

        self.stablecoin.burn(owner, debt_out)?;
        {
            let (mut position, pending) = self.ledger.touch(&owner, &self.rewards)?;
            self.pools.apply_pending(pending);
            position.set_collateral(new_collateral);
            position.set_debt(new_debt);
            self.stakes.update_stake(&mut position);
        }
        self.index.insert(owner, compute_nominal_cr(new_collateral, new_debt), None);
        self.pools.active.increase(coll_in, debt_in);
        self.pools.active.decrease(coll_out, debt_out);
        self.pools.flows.record_in(coll_in);
        self.pools.flows.record_out(coll_out);
        self.stablecoin.mint(owner, debt_in);

        log::debug!(
            "adjusted position {}: collateral {} debt {} (ICR {})",
            owner,
            new_collateral,
            new_debt,
            new_icr
        );
        Ok(())
    }

    pub fn add_collateral(&mut self, owner: AccountId, amount: u128) -> EngineResult<()> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        self.adjust_position(
            owner,
            Adjustment {
                collateral: CollateralChange::Add(amount),
                ..Adjustment::default()
            },
        )
    }

    pub fn withdraw_collateral(&mut self, owner: AccountId, amount: u128) -> EngineResult<()> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        self.adjust_position(
            owner,
            Adjustment {
                collateral: CollateralChange::Withdraw(amount),
                ..Adjustment::default()
            },
        )
    }

    pub fn borrow(&mut self, owner: AccountId, amount: u128) -> EngineResult<()> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        self.adjust_position(
            owner,
            Adjustment {
                debt: DebtChange::Borrow(amount),
                ..Adjustment::default()
            },
        )
    }

    pub fn repay(&mut self, owner: AccountId, amount: u128) -> EngineResult<()> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        self.adjust_position(
            owner,
            Adjustment {
                debt: DebtChange::Repay(amount),
                ..Adjustment::default()
            },
        )
    }

    /// Repay everything but the gas compensation and take back all collateral.
    /// Returns the collateral released.
    pub fn close_position(&mut self, owner: AccountId) -> EngineResult<u128> {
        let entire = self.entire_debt_and_collateral(&owner)?;
        let price = self.price();
        if self.is_recovery_mode(price) {
            return Err(EngineError::CloseInRecoveryMode);
        }
        if self.ledger.active_count() <= 1 {
            return Err(EngineError::LastPosition);
        }
        self.require_tcr_above_critical(price, 0, entire.collateral, 0, entire.debt)?;

        let gas_compensation = self.params.gas_compensation;
        let repayment = entire.debt.saturating_sub(gas_compensation);
        self.require_balance(&owner, repayment)?;
        self.require_balance(&GAS_POOL_ACCOUNT, gas_compensation)?;

        self.stablecoin.burn(owner, repayment)?;
        self.stablecoin.burn(GAS_POOL_ACCOUNT, gas_compensation)?;
        {
            let (mut position, pending) = self.ledger.touch(&owner, &self.rewards)?;
            self.pools.apply_pending(pending);
            self.stakes.remove_stake(&mut position);
        }
        self.ledger.close(&owner, Status::ClosedByOwner)?;
        self.index.remove(&owner);
        self.pools.active.decrease(entire.collateral, entire.debt);
        self.pools.flows.record_out(entire.collateral);

        log::info!("closed position {}: returned {} collateral", owner, entire.collateral);
        Ok(entire.collateral)
    }

    pub fn claim_collateral_surplus(&mut self, owner: AccountId) -> EngineResult<u128> {
        let amount = self.pools.surplus.claim(&owner)?;
        self.pools.flows.record_out(amount);
        log::debug!("{} claimed {} surplus collateral", owner, amount);
        Ok(amount)
    }
}
