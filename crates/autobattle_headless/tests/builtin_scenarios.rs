//! The shipped scenarios run to completion and reproduce exactly.

use autobattle_core::prelude::*;
use autobattle_headless::batch::{run_batch, verify_determinism, BatchConfig};
use autobattle_headless::runner::run_scenario;
use autobattle_headless::scenario::{builtin_names, resolve};
use autobattle_test_utils::determinism::run_parallel_scoped;

#[test]
fn every_builtin_finishes_with_a_balanced_ledger() {
    let rules = Ruleset::standard();
    for name in builtin_names() {
        let scenario = resolve(name).unwrap();
        let report = run_scenario(&rules, &scenario, None).unwrap();
        let metrics = &report.metrics;

        assert!(metrics.elapsed_ms <= scenario.config.time_limit_ms, "{name}");
        let taken = |side| -> i64 {
            metrics
                .combatants
                .iter()
                .filter(|c| c.side == side)
                .map(|c| c.taken)
                .sum()
        };
        assert_eq!(metrics.damage_dealt_by(Side::Ally), taken(Side::Enemy), "{name}");
        assert_eq!(metrics.damage_dealt_by(Side::Enemy), taken(Side::Ally), "{name}");
        if let Outcome::Winner(side) = metrics.outcome {
            assert!(metrics
                .combatants
                .iter()
                .any(|c| c.side == side && c.survived));
        }
    }
}

#[test]
fn every_builtin_is_deterministic() {
    let rules = Ruleset::standard();
    for name in builtin_names() {
        let scenario = resolve(name).unwrap();
        let check = verify_determinism(&rules, &scenario, 777, 3).unwrap();
        assert!(check.is_deterministic, "{name}: {:?}", check.hashes);

        let threaded = run_parallel_scoped(&rules, &scenario, 3);
        threaded.assert_deterministic();
        assert!(threaded.hashes.iter().all(|&h| h != 0), "{name} failed on a thread");
    }
}

#[test]
fn batch_summary_counts_every_game() {
    let rules = Ruleset::standard();
    let scenario = resolve("haunted").unwrap();
    let results = run_batch(&rules, &scenario, BatchConfig::new("haunted", 12).with_seed(100)).unwrap();

    let summary = &results.summary;
    assert_eq!(summary.total_games, 12);
    let wins: u32 = summary.wins.values().sum();
    assert_eq!(wins + summary.draws, 12);
    let rate_total: f64 = summary.win_rates.values().sum::<f64>() + summary.draw_rate;
    assert!((rate_total - 1.0).abs() < 1e-9);
    assert!(summary.top_damage_dealers.len() <= 5);
}

#[test]
fn seeds_change_the_combat() {
    let rules = Ruleset::standard();
    let scenario = resolve("skirmish").unwrap();
    let hashes: std::collections::BTreeSet<u64> = (0..8)
        .map(|seed| run_scenario(&rules, &scenario, Some(seed)).unwrap().metrics.state_hash)
        .collect();
    assert!(hashes.len() > 1);
}
