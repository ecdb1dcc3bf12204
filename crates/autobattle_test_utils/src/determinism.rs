//! Determinism testing utilities.
//!
//! Provides a harness for verifying that combat produces identical results
//! given identical inputs.
//!
//! A combat's only inputs are its board, its rule set and its seed. The
//! harness runs the same inputs repeatedly (sequentially or on separate
//! threads) and compares the final state hashes, which cover the grid,
//! the pending event queue, the ledger and the RNG position.
//!
//! What keeps combats repeatable:
//!
//! - Fractional math goes through [`autobattle_core::math::Fixed`].
//! - Boards are scanned column-major and id maps are B-trees.
//! - Rolls come from a ChaCha stream seeded by the combat config.
//! - The event queue breaks time ties by insertion order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use autobattle_core::combat::Combat;
use autobattle_core::data::Scenario;
use autobattle_core::error::Result;
use autobattle_core::rules::Ruleset;
use tracing::debug;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps simulated per run.
    pub steps: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic combat).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that combat was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Combat is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a stepped process multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `steps` - Number of steps per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance the state by one step
/// * `hash` - Function to compute the state hash
///
/// # Example
///
/// ```
/// use autobattle_core::rules::Ruleset;
/// use autobattle_test_utils::determinism::verify_determinism;
/// use autobattle_test_utils::fixtures::duel;
///
/// let rules = Ruleset::standard();
/// let result = verify_determinism(
///     3,
///     40,
///     || duel(&rules, 9),
///     |combat| { combat.step().unwrap(); },
///     |combat| combat.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..steps {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Run a scenario to completion `runs` times and compare final hashes.
///
/// # Errors
///
/// Propagates scenario and invariant errors from any run.
pub fn verify_scenario_determinism(
    rules: &Ruleset,
    scenario: &Scenario,
    runs: usize,
) -> Result<DeterminismResult> {
    let mut hashes = Vec::with_capacity(runs);
    let mut steps = 0;
    for _ in 0..runs {
        let mut combat = Combat::from_scenario(rules, scenario)?;
        let mut taken = 0;
        while combat.step()? {
            taken += 1;
        }
        steps = taken;
        hashes.push(combat.state_hash());
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    Ok(DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    })
}

/// Result of parallel combat runs.
#[derive(Debug, Clone)]
pub struct ParallelRunResult {
    /// Final state hash from each combat.
    pub hashes: Vec<u64>,
    /// Number of combats run.
    pub num_runs: usize,
}

impl ParallelRunResult {
    /// Check if all combats produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all combats matched.
    ///
    /// # Panics
    ///
    /// Panics if combats produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel combats diverged!\n\
                 Runs: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_runs,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run the same scenario on `num_runs` scoped threads and collect hashes.
///
/// A run that fails contributes hash 0, which will not match a good run.
///
/// # Panics
///
/// Panics if a worker thread panics.
#[must_use]
pub fn run_parallel_scoped(rules: &Ruleset, scenario: &Scenario, num_runs: usize) -> ParallelRunResult {
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_runs)
            .map(|_| {
                s.spawn(|| {
                    Combat::from_scenario(rules, scenario)
                        .and_then(|mut combat| combat.run())
                        .map_or(0, |end| end.state_hash)
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelRunResult { hashes, num_runs }
}

/// Step two combats side by side and report the first step whose hashes
/// differ.
///
/// # Returns
///
/// `None` if the combats agree at every step, `Some(step)` otherwise.
pub fn find_first_divergence<'r, F>(setup_fn: F, max_steps: u64) -> Option<u64>
where
    F: Fn() -> Combat<'r>,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for step in 1..=max_steps {
        let a = first.step();
        let b = second.step();
        if first.state_hash() != second.state_hash() {
            debug!(step, "Combats diverged");
            return Some(step);
        }
        if !matches!((a, b), (Ok(true), Ok(true))) {
            break;
        }
    }

    None
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for combat testing.
///
/// These strategies generate random but reproducible boards and scenarios.
pub mod strategies {
    use autobattle_core::combatant::{BaseStats, Side};
    use autobattle_core::config::CombatConfig;
    use autobattle_core::data::{CombatantTemplate, Scenario, TeamLayout, UnitPlacement};
    use autobattle_core::grid::{Coord, DEFAULT_HEIGHT, DEFAULT_WIDTH};
    use autobattle_core::moves::MoveId;
    use autobattle_core::synergy::SynergyKind;
    use proptest::prelude::*;

    /// Generate a cell on the default board.
    pub fn arb_coord() -> impl Strategy<Value = Coord> {
        (0..DEFAULT_WIDTH as i32, 0..DEFAULT_HEIGHT as i32).prop_map(|(x, y)| Coord::new(x, y))
    }

    /// Generate a side.
    pub fn arb_side() -> impl Strategy<Value = Side> {
        prop_oneof![Just(Side::Ally), Just(Side::Enemy)]
    }

    /// Generate base stats in a playable range.
    pub fn arb_stats() -> impl Strategy<Value = BaseStats> {
        (1i32..150, 0i32..150, 1i32..150, 0i32..150, 0i32..200).prop_map(
            |(attack, defense, special_attack, special_defense, speed)| BaseStats {
                attack,
                defense,
                special_attack,
                special_defense,
                speed,
            },
        )
    }

    /// Generate a move key, or none.
    pub fn arb_move() -> impl Strategy<Value = Option<MoveId>> {
        proptest::option::of(proptest::sample::select(vec![
            MoveId::Thunderbolt,
            MoveId::Earthquake,
            MoveId::Flamethrower,
            MoveId::Blizzard,
            MoveId::Sing,
            MoveId::Recover,
            MoveId::SwordsDance,
            MoveId::FuryAttack,
            MoveId::ShadowBall,
            MoveId::Curse,
            MoveId::Toxic,
            MoveId::HealPulse,
            MoveId::Safeguard,
            MoveId::CallAlly,
            MoveId::Sturdy,
            MoveId::RoughSkin,
            MoveId::Intimidate,
            MoveId::PoisonTouch,
        ]))
    }

    /// Generate a combatant template.
    pub fn arb_template() -> impl Strategy<Value = CombatantTemplate> {
        (1i32..400, arb_stats(), arb_move(), 1u32..4, 0u32..50).prop_map(
            |(max_hp, base, move_id, attack_range, crit_chance)| CombatantTemplate {
                name: "unit".to_string(),
                max_hp,
                base,
                move_id,
                attack_range,
                crit_chance,
                statuses: Vec::new(),
            },
        )
    }

    /// Generate synergy counts for one side.
    pub fn arb_synergies() -> impl Strategy<Value = Vec<(SynergyKind, u32)>> {
        proptest::collection::vec(
            (proptest::sample::select(SynergyKind::ALL.to_vec()), 0u32..7),
            0..4,
        )
    }

    fn arb_team(rows: std::ops::Range<i32>, max_units: usize) -> impl Strategy<Value = TeamLayout> {
        let cells: Vec<(i32, i32)> = rows
            .flat_map(|y| (0..DEFAULT_WIDTH as i32).map(move |x| (x, y)))
            .collect();
        (
            proptest::sample::subsequence(cells, 1..=max_units),
            proptest::collection::vec(arb_template(), max_units),
            arb_synergies(),
        )
            .prop_map(|(cells, templates, synergies)| TeamLayout {
                units: cells
                    .into_iter()
                    .zip(templates)
                    .map(|((x, y), unit)| UnitPlacement { x, y, unit })
                    .collect(),
                synergies,
            })
    }

    /// Generate a valid scenario: allies on the top half, enemies on the
    /// bottom half, at most `max_per_side` each.
    pub fn arb_scenario(max_per_side: usize) -> impl Strategy<Value = Scenario> {
        let half = DEFAULT_HEIGHT as i32 / 2;
        (
            arb_team(0..half, max_per_side),
            arb_team(half..DEFAULT_HEIGHT as i32, max_per_side),
            any::<u64>(),
        )
            .prop_map(|(allies, enemies, seed)| Scenario {
                name: "generated".to_string(),
                config: CombatConfig {
                    seed,
                    ..CombatConfig::default()
                },
                allies,
                enemies,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{duel, skirmish_scenario};
    use proptest::prelude::*;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 10, || 0u64, |n| *n += 1, |n| *n);
        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![10, 10, 10]);
    }

    #[test]
    fn test_duel_stepwise_determinism() {
        let rules = Ruleset::standard();
        let result = verify_determinism(
            4,
            30,
            || duel(&rules, 5),
            |combat| {
                assert!(combat.step().is_ok());
            },
            |combat| combat.state_hash(),
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_skirmish_determinism() {
        let rules = Ruleset::standard();
        let result = verify_scenario_determinism(&rules, &skirmish_scenario(17), 3).unwrap();
        result.assert_deterministic();
        assert!(result.steps > 0);
    }

    #[test]
    fn test_find_divergence_on_deterministic_combat() {
        let rules = Ruleset::standard();
        assert_eq!(find_first_divergence(|| duel(&rules, 3), 200), None);
    }

    #[test]
    fn test_parallel_skirmishes_match() {
        let rules = Ruleset::standard();
        let result = run_parallel_scoped(&rules, &skirmish_scenario(4), 4);
        result.assert_deterministic();
        assert_ne!(result.hashes[0], 0);
    }

    #[test]
    fn test_compute_hash_is_stable() {
        assert_eq!(compute_hash(&(1, "a")), compute_hash(&(1, "a")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Any generated board plays out the same way twice.
        #[test]
        fn prop_generated_scenarios_are_deterministic(
            scenario in strategies::arb_scenario(4),
        ) {
            let rules = Ruleset::standard();
            prop_assert!(scenario.validate(&rules).is_empty());
            let result = verify_scenario_determinism(&rules, &scenario, 2).unwrap();
            prop_assert!(result.is_deterministic);
        }
    }
}
