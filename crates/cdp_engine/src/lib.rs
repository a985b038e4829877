//! CDP loss/gain distribution engine
//!
//! Deterministic, single-threaded model of a collateralized-debt system:
//! positions, a stake-weighted redistribution accumulator, a stability pool
//! with product/sum compounding, and the liquidation orchestrator tying them
//! together. No I/O and no unwrap/panic outside tests.

pub mod borrower;
pub mod collaborators;
pub mod error;
pub mod helpers;
pub mod ledger;
pub mod liquidation;
pub mod math;
pub mod pools;
pub mod redistribution;
pub mod stability_pool;
pub mod stake;
pub mod state;
pub mod system;

// Re-export commonly used types
pub use borrower::{Adjustment, CollateralChange, DebtChange};
pub use collaborators::{FixedPriceFeed, InMemoryStablecoin, NicrIndex, PriceFeed, SortedIndex, StablecoinLedger};
pub use error::{EngineError, EngineResult};
pub use helpers::{check_invariants, InvariantReport};
pub use liquidation::{BatchLiquidation, LiquidationMode, LiquidationRecord, LiquidationValues, MAX_BATCH_LIQUIDATIONS};
pub use stability_pool::DepositReceipt;
pub use state::*;
pub use system::{CdpSystem, EntirePosition};
