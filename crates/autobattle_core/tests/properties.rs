//! Property tests over targeting, damage, statuses and whole combats.

use autobattle_core::aoe::{best_cell_for, AoeOptions};
use autobattle_core::damage::{defense_reduction, resolve, DamageContext};
use autobattle_core::prelude::*;
use autobattle_core::targeting::{nearest_enemy, pathfind};
use autobattle_test_utils::determinism::strategies::{arb_coord, arb_scenario, arb_side, arb_stats};
use autobattle_test_utils::fixtures::{stats, UnitBuilder};
use proptest::prelude::*;

/// Up to `max` distinct cells, each with a side.
fn arb_board(max: usize) -> impl Strategy<Value = Vec<(Coord, Side)>> {
    proptest::collection::btree_map(arb_coord(), arb_side(), 1..=max)
        .prop_map(|cells| cells.into_iter().collect())
}

fn build_grid(units: &[(Coord, Side)]) -> Grid {
    let mut grid = Grid::default();
    for (i, &(at, side)) in units.iter().enumerate() {
        let id = u32::try_from(i).unwrap() + 1;
        grid.place(at, UnitBuilder::new(id, side).build()).unwrap();
    }
    grid
}

proptest! {
    /// More attack never means less damage.
    #[test]
    fn prop_damage_is_monotonic_in_attack(
        attack in 0i32..500,
        bonus in 0i32..500,
        defense in 0i32..1000,
    ) {
        let defender = UnitBuilder::new(2, Side::Enemy).stats(stats(1, defense, 50)).build();
        let weak = UnitBuilder::new(1, Side::Ally).stats(stats(attack, 0, 50)).build();
        let strong = UnitBuilder::new(1, Side::Ally).stats(stats(attack + bonus, 0, 50)).build();
        let action = OffenseAction::physical();
        let ctx = DamageContext::default();
        prop_assert!(resolve(&strong, &defender, &action, &ctx) >= resolve(&weak, &defender, &action, &ctx));
    }

    /// Defense reduction stays below 100% and never shrinks as defense grows.
    #[test]
    fn prop_defense_reduction_bounded_and_monotonic(defense in 0i32..10_000, more in 0i32..1000) {
        let low = defense_reduction(defense);
        let high = defense_reduction(defense + more);
        prop_assert!(low >= Fixed::ZERO);
        prop_assert!(high < Fixed::ONE);
        prop_assert!(high >= low);
    }

    /// More defense never means more damage, including stats large enough
    /// to saturate the fixed-point intermediates.
    #[test]
    fn prop_damage_never_rises_with_defense(
        attack in prop_oneof![0i32..1000, 1_000_000i32..=i32::MAX],
        defense in prop_oneof![0i32..1000, 20_000_000i32..40_000_000],
        delta in prop_oneof![0i32..1000, 0i32..=i32::MAX],
        critical in any::<bool>(),
    ) {
        let attacker = UnitBuilder::new(1, Side::Ally).stats(stats(attack, 0, 50)).build();
        let soft = UnitBuilder::new(2, Side::Enemy).stats(stats(1, defense, 50)).build();
        let hard = UnitBuilder::new(2, Side::Enemy)
            .stats(stats(1, defense.saturating_add(delta), 50))
            .build();
        let ctx = DamageContext {
            critical,
            ..DamageContext::default()
        };
        for action in [OffenseAction::physical(), OffenseAction::FlatDamage { amount: attack, defense: Stat::Defense }] {
            let against_soft = resolve(&attacker, &soft, &action, &ctx);
            let against_hard = resolve(&attacker, &hard, &action, &ctx);
            prop_assert!(against_hard <= against_soft, "{} > {}", against_hard, against_soft);
            prop_assert!(against_hard >= 2);
        }
    }

    /// Every hit deals at least the constant bonus.
    #[test]
    fn prop_damage_never_below_bonus(base in arb_stats(), defense in 0i32..10_000) {
        let attacker = UnitBuilder::new(1, Side::Ally).stats(base).build();
        let defender = UnitBuilder::new(2, Side::Enemy).stats(stats(1, defense, 1)).build();
        let dealt = resolve(&attacker, &defender, &OffenseAction::physical(), &DamageContext::default());
        prop_assert!(dealt >= 2);
    }

    /// The nearest enemy is an opponent at minimal Manhattan distance.
    #[test]
    fn prop_nearest_enemy_is_closest(units in arb_board(12), from in arb_coord(), side in arb_side()) {
        let grid = build_grid(&units);
        let best = units
            .iter()
            .filter(|(at, s)| *s != side && *at != from)
            .map(|(at, _)| at.distance(from))
            .min();
        match nearest_enemy(&grid, from, side) {
            Some(found) => {
                prop_assert_eq!(grid.get(found).map(|c| c.side), Some(side.opponent()));
                prop_assert_eq!(Some(found.distance(from)), best);
            }
            None => prop_assert_eq!(best, None),
        }
    }

    /// The first pathfinding step is an adjacent vacant cell.
    #[test]
    fn prop_pathfind_steps_into_vacant_neighbor(
        units in arb_board(14),
        target in arb_coord(),
        range in 1u32..3,
    ) {
        let grid = build_grid(&units);
        let (start, _) = units[0];
        if let Some(result) = pathfind(&grid, start, &[target], range) {
            prop_assert!(result.target.distance(target) == 0);
            match result.first_step() {
                Some(step) => {
                    prop_assert_eq!(step.distance(start), 1);
                    prop_assert!(grid.is_vacant(step));
                    for cell in &result.path {
                        prop_assert!(grid.is_vacant(*cell));
                    }
                }
                None => prop_assert!(start.distance(target) <= range),
            }
        }
    }

    /// No candidate cell scores higher than the one chosen.
    #[test]
    fn prop_best_cell_is_optimal(units in arb_board(14), range in 0u32..6) {
        let grid = build_grid(&units);
        let user = grid.get(units[0].0).unwrap();
        let shape = AoeShape::Cross;
        let score = |cell: Coord| {
            shape
                .cells(cell, user.position)
                .into_iter()
                .filter_map(|c| grid.get(c))
                .filter(|c| c.side != user.side)
                .count()
        };
        let chosen = best_cell_for(&grid, user, range, |t, u| shape.cells(t, u), &AoeOptions::default());
        let best = grid
            .column_major()
            .filter(|c| c.distance(user.position) <= range)
            .map(score)
            .max()
            .unwrap_or(0);
        match chosen {
            Some(cell) => prop_assert_eq!(score(cell), best),
            None => prop_assert_eq!(best, 0),
        }
    }

    /// Durations drop by exactly the elapsed time and expire at zero.
    #[test]
    fn prop_status_decay_is_exact(
        duration in 1i64..20_000,
        steps in proptest::collection::vec(1i64..3000, 1..10),
    ) {
        let mut tracker = StatusTracker::new();
        tracker.apply(StatusKind::Blind, None, duration, None);
        let mut elapsed = 0;
        for step in steps {
            tracker.decay(step);
            elapsed += step;
            let expected = duration - elapsed;
            match tracker.get(StatusKind::Blind) {
                Some(entry) => {
                    prop_assert!(expected > 0);
                    prop_assert_eq!(entry.remaining_ms, expected);
                }
                None => prop_assert!(expected <= 0),
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Generated combats finish without invariant violations, and the
    /// ledger balances between the two sides.
    #[test]
    fn prop_generated_combats_finish_cleanly(scenario in arb_scenario(4)) {
        let rules = Ruleset::standard();
        let mut combat = Combat::from_scenario(&rules, &scenario).unwrap();
        let end = combat.run().unwrap();

        prop_assert!(end.elapsed_ms <= scenario.config.time_limit_ms);
        prop_assert_eq!(end.ledger.dealt_by(Side::Ally), end.ledger.taken_by(Side::Enemy));
        prop_assert_eq!(end.ledger.dealt_by(Side::Enemy), end.ledger.taken_by(Side::Ally));
        for unit in combat.grid().occupants() {
            prop_assert!(unit.hp > 0);
        }
        if let Outcome::Winner(side) = end.outcome {
            prop_assert_eq!(combat.grid().count(side.opponent()), 0);
        }
    }
}
