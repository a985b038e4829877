//! Health classification for positions

use cdp_engine::{AccountId, CdpSystem, LiquidationMode, Params, PriceFeed, SortedIndex, StablecoinLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Above MCR but below CCR: liquidatable only if the system enters recovery mode
    AtRisk,
    Liquidatable,
}

/// Position snapshot at one price
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionHealth {
    pub owner: AccountId,
    /// Individual collateral ratio, pending rewards included
    pub icr: u128,
    pub collateral: u128,
    pub debt: u128,
    pub status: HealthStatus,
}

impl PositionHealth {
    pub fn needs_liquidation(&self) -> bool {
        self.status == HealthStatus::Liquidatable
    }
}

/// Classify an ICR under the given mode.
///
/// In recovery mode anything below the TCR is a candidate; the engine still
/// decides whether a capped offset is possible.
pub fn classify(icr: u128, params: &Params, mode: LiquidationMode) -> HealthStatus {
    let threshold = match mode {
        LiquidationMode::Normal => params.minimum_collateral_ratio,
        LiquidationMode::Recovery { tcr } => tcr.max(params.minimum_collateral_ratio),
    };
    if icr < threshold {
        HealthStatus::Liquidatable
    } else if icr < params.critical_collateral_ratio {
        HealthStatus::AtRisk
    } else {
        HealthStatus::Healthy
    }
}

/// Snapshot every active position at `price`
pub fn scan<F, T, I>(sys: &CdpSystem<F, T, I>, price: u128) -> Vec<PositionHealth>
where
    F: PriceFeed,
    T: StablecoinLedger,
    I: SortedIndex,
{
    let mode = sys.liquidation_mode(price);
    sys.ledger()
        .iter_active()
        .filter_map(|(owner, _)| {
            let entire = sys.entire_debt_and_collateral(owner).ok()?;
            let icr = sys.current_icr(owner, price).ok()?;
            Some(PositionHealth {
                owner: *owner,
                icr,
                collateral: entire.collateral,
                debt: entire.debt,
                status: classify(icr, sys.params(), mode),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_engine::math::DECIMAL_PRECISION;

    const ONE: u128 = DECIMAL_PRECISION;

    #[test]
    fn test_classify_normal_mode() {
        let params = Params::default();
        assert_eq!(classify(ONE, &params, LiquidationMode::Normal), HealthStatus::Liquidatable);
        assert_eq!(classify(109 * ONE / 100, &params, LiquidationMode::Normal), HealthStatus::Liquidatable);
        assert_eq!(classify(11 * ONE / 10, &params, LiquidationMode::Normal), HealthStatus::AtRisk);
        assert_eq!(classify(149 * ONE / 100, &params, LiquidationMode::Normal), HealthStatus::AtRisk);
        assert_eq!(classify(15 * ONE / 10, &params, LiquidationMode::Normal), HealthStatus::Healthy);
    }

    #[test]
    fn test_classify_recovery_mode_uses_tcr() {
        let params = Params::default();
        let mode = LiquidationMode::Recovery { tcr: 14 * ONE / 10 };
        assert_eq!(classify(12 * ONE / 10, &params, mode), HealthStatus::Liquidatable);
        assert_eq!(classify(145 * ONE / 100, &params, mode), HealthStatus::AtRisk);
        assert_eq!(classify(2 * ONE, &params, mode), HealthStatus::Healthy);
    }

    #[test]
    fn test_scan_includes_pending_rewards() {
        let mut sys = CdpSystem::new(Params::default()).unwrap();
        let [a, b, c] = [AccountId::from_label("a"), AccountId::from_label("b"), AccountId::from_label("c")];
        sys.open_position(a, 10 * ONE, 980 * ONE).unwrap();
        sys.open_position(b, 30 * ONE, 980 * ONE).unwrap();
        sys.open_position(c, 10 * ONE, 1_780 * ONE).unwrap();

        let price = 190 * ONE;
        sys.price_feed_mut().set_price(price);
        let before = scan(&sys, price);
        assert_eq!(before.len(), 3);
        let victim = before.iter().find(|h| h.owner == c).unwrap();
        assert!(victim.needs_liquidation());

        sys.liquidate(&c, AccountId::from_label("keeper")).unwrap();
        let after = scan(&sys, price);
        assert_eq!(after.len(), 2);
        let a_health = after.iter().find(|h| h.owner == a).unwrap();
        // 10 + 2.4875 collateral against 1,000 + 450 debt
        assert_eq!(a_health.collateral, 124_875 * ONE / 10_000);
        assert_eq!(a_health.debt, 1_450 * ONE);
        assert_eq!(a_health.status, HealthStatus::Healthy);
    }
}
