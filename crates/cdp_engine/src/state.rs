//! Shared value types: account ids, position status, reward snapshots and protocol parameters

use crate::error::{EngineError, EngineResult};
use crate::math::{serde_decimal, DECIMAL_PRECISION};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// 32-byte account identifier (position owner, depositor, liquidator)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AccountId(pub [u8; 32]);

/// Holds the stablecoin gas compensation of every open position
pub const GAS_POOL_ACCOUNT: AccountId = AccountId::from_label("gas-pool");

/// Holds the stablecoin deposited into the stability pool
pub const STABILITY_POOL_ACCOUNT: AccountId = AccountId::from_label("stability-pool");

static UNIQUE_COUNTER: AtomicU64 = AtomicU64::new(1);

impl AccountId {
    pub const fn new_from_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministic id from a short label (truncated to 32 bytes)
    pub const fn from_label(label: &str) -> Self {
        let src = label.as_bytes();
        let mut bytes = [0u8; 32];
        let mut i = 0;
        while i < src.len() && i < 32 {
            bytes[i] = src[i];
            i += 1;
        }
        Self(bytes)
    }

    /// Fresh id that never collides with another `new_unique` id
    pub fn new_unique() -> Self {
        let n = UNIQUE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut bytes = [0u8; 32];
        bytes[0] = 0xff;
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self)
    }
}

impl FromStr for AccountId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| EngineError::InvalidAccountId(e.to_string()))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| EngineError::InvalidAccountId(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self(bytes))
    }
}

impl Serialize for AccountId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Lifecycle of a position record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum Status {
    #[default]
    Nonexistent,
    Active,
    ClosedByOwner,
    ClosedByLiquidation,
}

/// Values of L_collateral / L_debt when a position's rewards were last applied
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RewardSnapshot {
    pub collateral: u128,
    pub debt: u128,
}

/// Protocol parameters (governance configurable)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Minimum collateral ratio, below which a position is liquidatable (1.1 = 110%)
    #[serde(with = "serde_decimal")]
    pub minimum_collateral_ratio: u128,

    /// Total collateral ratio below which the system is in recovery mode
    #[serde(with = "serde_decimal")]
    pub critical_collateral_ratio: u128,

    /// Stablecoin reserved per position and paid to the liquidator
    #[serde(with = "serde_decimal")]
    pub gas_compensation: u128,

    /// Smallest debt a position may carry, excluding gas compensation
    #[serde(with = "serde_decimal")]
    pub min_net_debt: u128,

    /// Collateral gas compensation = entire collateral / divisor (200 = 0.5%)
    pub collateral_gas_divisor: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            minimum_collateral_ratio: 1_100_000_000_000_000_000, // 110%
            critical_collateral_ratio: 1_500_000_000_000_000_000, // 150%
            gas_compensation: 20 * DECIMAL_PRECISION,
            min_net_debt: 180 * DECIMAL_PRECISION,
            collateral_gas_divisor: 200,
        }
    }
}

impl Params {
    pub fn validate(&self) -> EngineResult<()> {
        if self.minimum_collateral_ratio < DECIMAL_PRECISION {
            return Err(EngineError::InvalidParams("minimum collateral ratio below 100%"));
        }
        if self.critical_collateral_ratio < self.minimum_collateral_ratio {
            return Err(EngineError::InvalidParams("critical collateral ratio below minimum"));
        }
        if self.collateral_gas_divisor == 0 {
            return Err(EngineError::InvalidParams("collateral gas divisor is zero"));
        }
        Ok(())
    }

    /// Smallest composite debt an active position may carry
    pub fn min_debt(&self) -> u128 {
        self.min_net_debt.saturating_add(self.gas_compensation)
    }
}
