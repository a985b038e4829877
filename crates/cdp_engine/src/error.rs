//! Engine error taxonomy

use crate::state::AccountId;

/// Every failure aborts the operation before any state is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("amount must be non-zero")]
    ZeroAmount,
    #[error("position {0} is not active")]
    PositionNotActive(AccountId),
    #[error("position {0} is already active")]
    PositionAlreadyActive(AccountId),
    #[error("position is not eligible for liquidation (ICR {icr})")]
    NotLiquidatable { icr: u128 },
    #[error("the last active position cannot be liquidated or closed")]
    LastPosition,
    #[error("system is paused")]
    Paused,
    #[error("insufficient stablecoin balance: required {required}, available {available}")]
    InsufficientBalance { required: u128, available: u128 },
    #[error("collateral withdrawal of {requested} exceeds position collateral {available}")]
    InsufficientCollateral { requested: u128, available: u128 },
    #[error("repayment of {requested} exceeds repayable debt {repayable}")]
    RepaymentExceedsDebt { requested: u128, repayable: u128 },
    #[error("net debt {net_debt} is below the minimum {minimum}")]
    NetDebtBelowMinimum { net_debt: u128, minimum: u128 },
    #[error("collateral ratio {icr} is below the required {required}")]
    CollateralRatioTooLow { icr: u128, required: u128 },
    #[error("operation would drop the total collateral ratio to {tcr}, below {ccr}")]
    TcrBelowCritical { tcr: u128, ccr: u128 },
    #[error("collateral withdrawal is not permitted in recovery mode")]
    CollateralWithdrawalInRecoveryMode,
    #[error("debt increase in recovery mode must not lower the collateral ratio")]
    IcrDecreaseInRecoveryMode,
    #[error("positions cannot be closed in recovery mode")]
    CloseInRecoveryMode,
    #[error("adjustment changes neither collateral nor debt")]
    EmptyAdjustment,
    #[error("depositor {0} has no stability pool deposit")]
    NoDeposit(AccountId),
    #[error("depositor {0} has no collateral gain")]
    NoCollateralGain(AccountId),
    #[error("pool withdrawals are blocked while positions are below the minimum collateral ratio")]
    UndercollateralizedPositionsExist,
    #[error("no remaining stake to redistribute into")]
    NoStakeToRedistribute,
    #[error("nothing to liquidate")]
    NothingToLiquidate,
    #[error("batch of {requested} exceeds the limit of {max}")]
    BatchTooLarge { requested: usize, max: usize },
    #[error("no collateral surplus to claim for {0}")]
    NoSurplus(AccountId),
    #[error("invalid parameters: {0}")]
    InvalidParams(&'static str),
    #[error("invalid account id encoding: {0}")]
    InvalidAccountId(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
