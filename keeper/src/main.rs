//! CDP Liquidation Keeper
//!
//! Seeds an in-process engine from its configuration, replays a price path on
//! a timer and liquidates whatever drops below the collateral threshold.

mod config;
mod health;
mod priority_queue;

use anyhow::{Context, Result};
use cdp_engine::math::format_decimal;
use cdp_engine::{check_invariants, AccountId, CdpSystem, EngineError, MAX_BATCH_LIQUIDATIONS};
use config::{account, amount, Config};
use priority_queue::HealthQueue;
use std::time::Duration;
use tokio::time;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting CDP Liquidation Keeper");

    // `cdp-keeper --init <path>` writes the built-in config and exits
    if let Some(path) = std::env::args().skip_while(|a| a != "--init").nth(1) {
        return Config::write_default(&path);
    }

    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({:#}), using built-in defaults", e);
        Config::default_local()
    });

    let mut sys = seed_system(&config)?;
    let liquidator = account(&config.liquidator);
    let prices = config.prices()?;
    log::info!(
        "Seeded {} positions, {} in the stability pool; keeper account {}",
        sys.ledger().active_count(),
        format_decimal(sys.stability_pool().total_deposits()),
        liquidator
    );

    let mut queue = HealthQueue::new();
    let mut interval = time::interval(Duration::from_millis(config.poll_interval_ms));

    for (tick, price) in prices.into_iter().enumerate() {
        interval.tick().await;
        sys.price_feed_mut().set_price(price);
        queue.rebuild(health::scan(&sys, price));

        log::info!(
            "tick {}: price {}, TCR {}, {:?}",
            tick,
            format_decimal(price),
            format_decimal(sys.tcr(price)),
            sys.liquidation_mode(price)
        );
        if let Some(worst) = queue.peek() {
            log::debug!("Lowest ICR: {} ({})", format_decimal(worst.icr), worst.owner);
        }

        if let Err(e) = process_liquidations(&mut queue, &mut sys, &config, liquidator) {
            log::error!("Error processing liquidations: {:#}", e);
        }
    }

    let report = check_invariants(&sys);
    log::info!(
        "Done: {} positions active, debt {}, pool deposits {}, epoch {} scale {}",
        sys.ledger().active_count(),
        format_decimal(sys.total_system_debt()),
        format_decimal(sys.stability_pool().total_deposits()),
        sys.stability_pool().current_epoch(),
        sys.stability_pool().current_scale()
    );
    log::info!("Invariants: {}", serde_json::to_string(&report)?);
    if !report.all_ok() {
        anyhow::bail!("invariant check failed");
    }
    Ok(())
}

/// Open the configured positions, then make the configured deposits
fn seed_system(config: &Config) -> Result<CdpSystem> {
    let mut sys = CdpSystem::new(config.params.clone()).context("Invalid protocol parameters")?;

    for seed in &config.positions {
        let owner = account(&seed.owner);
        sys.open_position(owner, amount(&seed.collateral)?, amount(&seed.borrow)?)
            .with_context(|| format!("Failed to open position for {}", seed.owner))?;
    }
    for seed in &config.deposits {
        sys.provide_to_pool(account(&seed.depositor), amount(&seed.amount)?)
            .with_context(|| format!("Failed to deposit for {}", seed.depositor))?;
    }
    Ok(sys)
}

/// Liquidate the lowest-ICR candidates in the queue
fn process_liquidations(
    queue: &mut HealthQueue,
    sys: &mut CdpSystem,
    config: &Config,
    liquidator: AccountId,
) -> Result<()> {
    let limit = config.max_liquidations_per_batch.min(MAX_BATCH_LIQUIDATIONS);
    let candidates = queue.take_liquidatable(limit);

    if candidates.is_empty() {
        log::debug!("No positions need liquidation");
        return Ok(());
    }

    log::info!("Found {} positions needing liquidation", candidates.len());
    let keys: Vec<AccountId> = candidates.iter().map(|h| h.owner).collect();

    match sys.liquidate_batch(&keys, liquidator) {
        Ok(batch) => {
            for record in &batch.records {
                log::info!("{}", serde_json::to_string(record).context("Failed to encode record")?);
            }
            for (owner, reason) in &batch.skipped {
                log::warn!("Skipped {}: {}", owner, reason);
            }
            log::info!(
                "Liquidated {} positions: {} debt offset, {} redistributed",
                batch.records.len(),
                format_decimal(batch.totals.debt_to_offset),
                format_decimal(batch.totals.debt_to_redistribute)
            );
        }
        Err(EngineError::NothingToLiquidate) => {
            log::info!("Candidates were not liquidatable at this price");
        }
        Err(e) => return Err(e).context("Batch liquidation failed"),
    }

    Ok(())
}
