//! Keeper configuration

use anyhow::{Context, Result};
use cdp_engine::math::parse_decimal;
use cdp_engine::{AccountId, Params};
use serde::{Deserialize, Serialize};

/// Position opened before the first tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSeed {
    pub owner: String,
    pub collateral: String,
    pub borrow: String,
}

/// Stability pool deposit made after all positions are open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSeed {
    pub depositor: String,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tick interval in milliseconds
    pub poll_interval_ms: u64,

    /// Maximum liquidations per tick
    pub max_liquidations_per_batch: usize,

    /// Label of the account that receives gas compensation
    pub liquidator: String,

    /// Collateral price per tick, as decimal strings
    pub price_path: Vec<String>,

    /// Protocol parameters
    pub params: Params,

    pub positions: Vec<PositionSeed>,

    pub deposits: Vec<DepositSeed>,
}

/// Parse an 18-decimal amount from its human form
pub fn amount(raw: &str) -> Result<u128> {
    parse_decimal(raw).with_context(|| format!("invalid decimal amount: {}", raw))
}

/// Labels map to deterministic ids
pub fn account(label: &str) -> AccountId {
    AccountId::from_label(label)
}

impl Config {
    /// Load configuration from TOML file
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("KEEPER_CONFIG")
            .unwrap_or_else(|_| "keeper-config.toml".to_string());
        let expanded = shellexpand::tilde(&config_path);

        let config_str = std::fs::read_to_string(expanded.as_ref())
            .context(format!("Failed to read config file: {}", config_path))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config TOML")?;

        config.params.validate().context("Invalid protocol parameters")?;
        Ok(config)
    }

    /// Built-in demo: a whale backing the pool and three thin positions
    /// that fall through MCR as the price slides.
    pub fn default_local() -> Self {
        let seed = |owner: &str, collateral: &str, borrow: &str| PositionSeed {
            owner: owner.to_string(),
            collateral: collateral.to_string(),
            borrow: borrow.to_string(),
        };
        Self {
            poll_interval_ms: 500,
            max_liquidations_per_batch: 5,
            liquidator: "keeper".to_string(),
            price_path: ["200", "190", "170", "150", "120"].iter().map(|p| p.to_string()).collect(),
            params: Params::default(),
            positions: vec![
                seed("whale", "1000", "20000"),
                seed("alice", "20", "1780"),
                seed("bob", "10", "1780"),
                seed("carol", "12", "1500"),
            ],
            deposits: vec![DepositSeed {
                depositor: "whale".to_string(),
                amount: "3000".to_string(),
            }],
        }
    }

    /// Prices in 18-decimal fixed point
    pub fn prices(&self) -> Result<Vec<u128>> {
        self.price_path.iter().map(|p| amount(p)).collect()
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let config = Self::default_local();
        let toml_str = toml::to_string_pretty(&config)
            .context("Failed to serialize config")?;

        std::fs::write(path, toml_str)
            .context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }
}
