//! Property tests for the distribution engine
//!
//! The state-machine fuzzer drives random borrower, pool and liquidation
//! operations through one system. Every operation is all-or-nothing, so a
//! failed one must leave the system exactly as it was, and a successful one
//! must keep every invariant in `check_invariants`.

use cdp_engine::math::DECIMAL_PRECISION;
use cdp_engine::{check_invariants, AccountId, CdpSystem, EngineError, EngineResult, Params};
use proptest::prelude::*;

const ONE: u128 = DECIMAL_PRECISION;

const ACTORS: [AccountId; 4] = [
    AccountId::from_label("alice"),
    AccountId::from_label("bob"),
    AccountId::from_label("carol"),
    AccountId::from_label("dave"),
];

const KEEPER: AccountId = AccountId::from_label("keeper");

#[derive(Clone, Debug)]
enum Op {
    Open { who: usize, collateral: u128, borrow: u128 },
    AddCollateral { who: usize, amount: u128 },
    WithdrawCollateral { who: usize, amount: u128 },
    Borrow { who: usize, amount: u128 },
    Repay { who: usize, amount: u128 },
    Close { who: usize },
    Provide { who: usize, amount: u128 },
    WithdrawFromPool { who: usize, amount: u128 },
    GainToPosition { who: usize },
    ClaimSurplus { who: usize },
    Liquidate { who: usize },
    LiquidateLowest { n: usize },
    SetPrice { dollars: u128 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let who = 0..ACTORS.len();
    prop_oneof![
        3 => (who.clone(), 5u128..60, 180u128..3_000)
            .prop_map(|(who, c, b)| Op::Open { who, collateral: c * ONE, borrow: b * ONE }),
        1 => (who.clone(), 1u128..20).prop_map(|(who, a)| Op::AddCollateral { who, amount: a * ONE }),
        1 => (who.clone(), 1u128..20).prop_map(|(who, a)| Op::WithdrawCollateral { who, amount: a * ONE }),
        1 => (who.clone(), 1u128..1_000).prop_map(|(who, a)| Op::Borrow { who, amount: a * ONE }),
        1 => (who.clone(), 1u128..1_000).prop_map(|(who, a)| Op::Repay { who, amount: a * ONE }),
        1 => who.clone().prop_map(|who| Op::Close { who }),
        2 => (who.clone(), 1u128..2_000).prop_map(|(who, a)| Op::Provide { who, amount: a * ONE }),
        1 => (who.clone(), 0u128..2_000).prop_map(|(who, a)| Op::WithdrawFromPool { who, amount: a * ONE }),
        1 => who.clone().prop_map(|who| Op::GainToPosition { who }),
        1 => who.clone().prop_map(|who| Op::ClaimSurplus { who }),
        2 => who.prop_map(|who| Op::Liquidate { who }),
        1 => (1usize..4).prop_map(|n| Op::LiquidateLowest { n }),
        2 => (90u128..260).prop_map(|dollars| Op::SetPrice { dollars }),
    ]
}

fn apply(sys: &mut CdpSystem, op: &Op) -> EngineResult<()> {
    match *op {
        Op::Open { who, collateral, borrow } => sys.open_position(ACTORS[who], collateral, borrow).map(|_| ()),
        Op::AddCollateral { who, amount } => sys.add_collateral(ACTORS[who], amount),
        Op::WithdrawCollateral { who, amount } => sys.withdraw_collateral(ACTORS[who], amount),
        Op::Borrow { who, amount } => sys.borrow(ACTORS[who], amount),
        Op::Repay { who, amount } => sys.repay(ACTORS[who], amount),
        Op::Close { who } => sys.close_position(ACTORS[who]).map(|_| ()),
        Op::Provide { who, amount } => sys.provide_to_pool(ACTORS[who], amount).map(|_| ()),
        Op::WithdrawFromPool { who, amount } => sys.withdraw_from_pool(ACTORS[who], amount).map(|_| ()),
        Op::GainToPosition { who } => sys.withdraw_collateral_gain_to_position(ACTORS[who]).map(|_| ()),
        Op::ClaimSurplus { who } => sys.claim_collateral_surplus(ACTORS[who]).map(|_| ()),
        Op::Liquidate { who } => sys.liquidate(&ACTORS[who], KEEPER).map(|_| ()),
        Op::LiquidateLowest { n } => sys.liquidate_lowest(n, KEEPER).map(|_| ()),
        Op::SetPrice { dollars } => {
            sys.price_feed_mut().set_price(dollars * ONE);
            Ok(())
        }
    }
}

fn assert_deposits_never_grow(sys: &CdpSystem) {
    let pool = sys.stability_pool();
    for (depositor, deposit) in pool.depositors() {
        assert!(
            pool.compounded_deposit(depositor) <= deposit.initial_value,
            "compounded deposit of {depositor} exceeds its initial value"
        );
    }
}

#[cfg(test)]
mod state_machine_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_random_operations_keep_invariants(ops in prop::collection::vec(op_strategy(), 1..60)) {
            let mut sys = CdpSystem::new(Params::default()).unwrap();
            for (step, op) in ops.iter().enumerate() {
                let before = sys.clone();
                match apply(&mut sys, op) {
                    Ok(()) => {
                        let report = check_invariants(&sys);
                        prop_assert!(
                            report.positions_match_pools,
                            "step {} {:?}: positions drifted from active and default pools",
                            step,
                            op
                        );
                        prop_assert!(report.all_ok(), "step {} {:?}: {:?}", step, op, report);
                        assert_deposits_never_grow(&sys);
                    }
                    Err(err) => {
                        prop_assert!(sys == before, "step {} {:?} failed with {} but changed state", step, op, err);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod touch_tests {
    use super::*;

    proptest! {
        /// Once a position has absorbed its pending rewards, touching it again
        /// applies nothing more.
        #[test]
        fn prop_touch_is_idempotent(victim_borrow in 1_000u128..1_780, extra in 1u128..10) {
            let mut sys = CdpSystem::new(Params::default()).unwrap();
            let [a, b] = [ACTORS[0], ACTORS[1]];
            sys.open_position(a, 40 * ONE, 2_000 * ONE).unwrap();
            sys.open_position(b, 10 * ONE, victim_borrow * ONE).unwrap();

            // Empty pool: the whole position is redistributed onto `a`
            sys.price_feed_mut().set_price(100 * ONE);
            sys.liquidate(&b, KEEPER).unwrap();
            let pending = sys.pending_collateral_reward(&a);
            prop_assert!(pending > 0);

            let entire = sys.entire_debt_and_collateral(&a).unwrap();
            sys.add_collateral(a, extra * ONE).unwrap();
            prop_assert_eq!(sys.pending_collateral_reward(&a), 0);
            prop_assert_eq!(sys.pending_debt_reward(&a), 0);
            let once = sys.ledger().get(&a).unwrap().clone();
            prop_assert_eq!(once.collateral(), entire.collateral + extra * ONE);
            prop_assert_eq!(once.debt(), entire.debt);

            sys.add_collateral(a, extra * ONE).unwrap();
            let twice = sys.ledger().get(&a).unwrap();
            prop_assert_eq!(twice.collateral(), once.collateral() + extra * ONE);
            prop_assert_eq!(twice.debt(), once.debt());
            prop_assert_eq!(twice.reward_snapshot(), once.reward_snapshot());
        }
    }
}

#[cfg(test)]
mod stability_pool_tests {
    use super::*;

    proptest! {
        /// A liquidation whose debt equals the pool exactly starts a new epoch
        /// and zeroes every deposit made before it.
        #[test]
        fn prop_exact_emptying_resets_epoch(victim_borrow in 1_000u128..1_780, split in 1u128..100) {
            let mut sys = CdpSystem::new(Params::default()).unwrap();
            let [d1, d2, victim] = [ACTORS[0], ACTORS[1], ACTORS[2]];
            sys.open_position(d1, 200 * ONE, 5_000 * ONE).unwrap();
            sys.open_position(d2, 200 * ONE, 5_000 * ONE).unwrap();
            sys.open_position(victim, 10 * ONE, victim_borrow * ONE).unwrap();

            let debt = (victim_borrow + 20) * ONE;
            let first = debt * split / 100;
            sys.provide_to_pool(d1, first).unwrap();
            sys.provide_to_pool(d2, debt - first).unwrap();

            sys.price_feed_mut().set_price(100 * ONE);
            let record = sys.liquidate(&victim, KEEPER).unwrap();
            prop_assert_eq!(record.values.debt_to_offset, debt);

            let pool = sys.stability_pool();
            prop_assert_eq!(pool.current_epoch(), 1);
            prop_assert_eq!(pool.current_scale(), 0);
            prop_assert_eq!(pool.p(), ONE);
            prop_assert_eq!(pool.total_deposits(), 0);
            prop_assert_eq!(sys.compounded_deposit(&d1), 0);
            prop_assert_eq!(sys.compounded_deposit(&d2), 0);

            let gains = sys.depositor_collateral_gain(&d1) + sys.depositor_collateral_gain(&d2);
            prop_assert!(gains <= record.values.collateral_to_send_to_pool);
            prop_assert!(record.values.collateral_to_send_to_pool - gains < 1_000_000_000);
            prop_assert!(check_invariants(&sys).all_ok());
        }

        /// Compounded deposits only shrink across partial offsets
        #[test]
        fn prop_compounded_deposit_never_exceeds_initial(
            deposit in 2_000u128..10_000,
            borrows in prop::collection::vec(1_000u128..1_780, 1..4),
        ) {
            let mut sys = CdpSystem::new(Params::default()).unwrap();
            let whale = AccountId::new_unique();
            sys.open_position(whale, 1_000 * ONE, 10_000 * ONE).unwrap();
            sys.provide_to_pool(whale, deposit * ONE).unwrap();

            let victims: Vec<AccountId> = borrows
                .iter()
                .map(|b| {
                    let id = AccountId::new_unique();
                    sys.open_position(id, 10 * ONE, b * ONE).map(|_| id)
                })
                .collect::<Result<_, EngineError>>()
                .unwrap();

            sys.price_feed_mut().set_price(100 * ONE);
            let mut previous = sys.compounded_deposit(&whale);
            for victim in &victims {
                sys.liquidate(victim, KEEPER).unwrap();
                let compounded = sys.compounded_deposit(&whale);
                prop_assert!(compounded <= previous);
                previous = compounded;
            }
            prop_assert!(previous <= deposit * ONE);
            prop_assert!(check_invariants(&sys).all_ok());
        }
    }
}
