//! Combat metrics collection for balance analysis.
//!
//! One [`CombatMetrics`] is produced per finished combat; a batch folds
//! them into a [`BatchSummary`].

use std::collections::BTreeMap;

use autobattle_core::combatant::Side;
use autobattle_core::ledger::{CombatEnd, Outcome};
use serde::{Deserialize, Serialize};

/// How many entries the damage leaderboard keeps.
pub const TOP_DEALERS: usize = 5;

/// Totals for one combatant in one combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatantMetrics {
    /// Combatant id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Side.
    pub side: Side,
    /// Damage credited, including damage dealt by its summons.
    pub dealt: i64,
    /// Damage taken.
    pub taken: i64,
    /// Healing received.
    pub healed: i64,
    /// Still on the board when combat ended.
    pub survived: bool,
}

/// Complete metrics for a single combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatMetrics {
    /// Scenario name.
    pub scenario: String,
    /// Random seed used.
    pub seed: u64,
    /// Winner or draw.
    pub outcome: Outcome,
    /// Virtual time elapsed.
    pub elapsed_ms: i64,
    /// Wall-clock length with the end-of-round speed-up applied.
    pub real_time_ms: i64,
    /// Final state hash (for determinism validation).
    pub state_hash: u64,
    /// Rewards granted at round end.
    pub rewards: BTreeMap<Side, u32>,
    /// Per-combatant totals, by id.
    pub combatants: Vec<CombatantMetrics>,
}

impl CombatMetrics {
    /// Build metrics from a combat-end signal.
    ///
    /// `name_of` maps ids to display names; `alive` reports whether an id
    /// was still on the board.
    pub fn from_end(
        scenario: impl Into<String>,
        seed: u64,
        end: &CombatEnd,
        name_of: impl Fn(u32) -> String,
        alive: impl Fn(u32) -> bool,
    ) -> Self {
        let combatants = end
            .ledger
            .iter()
            .map(|(id, entry)| CombatantMetrics {
                id: id.0,
                name: name_of(id.0),
                side: entry.side,
                dealt: entry.dealt,
                taken: entry.taken,
                healed: entry.healed,
                survived: alive(id.0),
            })
            .collect();

        Self {
            scenario: scenario.into(),
            seed,
            outcome: end.outcome,
            elapsed_ms: end.elapsed_ms,
            real_time_ms: end.real_time_ms,
            state_hash: end.state_hash,
            rewards: end.rewards.clone(),
            combatants,
        }
    }

    /// The winning side, if any.
    #[must_use]
    pub fn winner(&self) -> Option<Side> {
        match self.outcome {
            Outcome::Winner(side) => Some(side),
            Outcome::Draw => None,
        }
    }

    /// Total damage dealt by one side.
    #[must_use]
    pub fn damage_dealt_by(&self, side: Side) -> i64 {
        self.combatants
            .iter()
            .filter(|c| c.side == side)
            .map(|c| c.dealt)
            .sum()
    }
}

/// One line of the damage leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealerSummary {
    /// Display name.
    pub name: String,
    /// Side.
    pub side: Side,
    /// Damage summed over every game.
    pub total_dealt: i64,
    /// Average damage per game the combatant appeared in.
    pub avg_dealt: f64,
}

/// Aggregate statistics over many combats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Total combats.
    pub total_games: u32,
    /// Wins per side.
    pub wins: BTreeMap<Side, u32>,
    /// Win rate per side.
    pub win_rates: BTreeMap<Side, f64>,
    /// Draws count.
    pub draws: u32,
    /// Draw rate.
    pub draw_rate: f64,
    /// Mean virtual duration.
    pub avg_elapsed_ms: f64,
    /// Shortest combat.
    pub min_elapsed_ms: i64,
    /// Longest combat.
    pub max_elapsed_ms: i64,
    /// Mean damage dealt per side.
    pub avg_damage_by_side: BTreeMap<Side, f64>,
    /// Highest total damage dealers, grouped by side and name.
    pub top_damage_dealers: Vec<DealerSummary>,
}

impl BatchSummary {
    /// Calculate summary from a list of combat metrics.
    #[must_use]
    pub fn from_games(games: &[CombatMetrics]) -> Self {
        if games.is_empty() {
            return Self::default();
        }

        let total = games.len() as f64;
        let mut summary = Self {
            total_games: games.len() as u32,
            min_elapsed_ms: i64::MAX,
            ..Default::default()
        };

        let mut elapsed_sum = 0i64;
        let mut damage_sums: BTreeMap<Side, i64> = BTreeMap::new();
        let mut dealers: BTreeMap<(Side, String), (i64, u32)> = BTreeMap::new();

        for game in games {
            elapsed_sum += game.elapsed_ms;
            summary.min_elapsed_ms = summary.min_elapsed_ms.min(game.elapsed_ms);
            summary.max_elapsed_ms = summary.max_elapsed_ms.max(game.elapsed_ms);

            match game.winner() {
                Some(side) => *summary.wins.entry(side).or_default() += 1,
                None => summary.draws += 1,
            }

            for side in Side::ALL {
                *damage_sums.entry(side).or_default() += game.damage_dealt_by(side);
            }

            for unit in &game.combatants {
                let entry = dealers.entry((unit.side, unit.name.clone())).or_default();
                entry.0 += unit.dealt;
                entry.1 += 1;
            }
        }

        summary.avg_elapsed_ms = elapsed_sum as f64 / total;
        summary.draw_rate = f64::from(summary.draws) / total;
        for side in Side::ALL {
            let wins = summary.wins.get(&side).copied().unwrap_or(0);
            summary.win_rates.insert(side, f64::from(wins) / total);
        }
        for (side, sum) in damage_sums {
            summary.avg_damage_by_side.insert(side, sum as f64 / total);
        }

        let mut leaderboard: Vec<DealerSummary> = dealers
            .into_iter()
            .map(|((side, name), (dealt, appearances))| DealerSummary {
                name,
                side,
                total_dealt: dealt,
                avg_dealt: dealt as f64 / f64::from(appearances.max(1)),
            })
            .collect();
        // Stable sort keeps the (side, name) order among ties.
        leaderboard.sort_by(|a, b| b.total_dealt.cmp(&a.total_dealt));
        leaderboard.truncate(TOP_DEALERS);
        summary.top_damage_dealers = leaderboard;

        summary
    }

    /// Check if both sides' win rates are within `tolerance` of each other.
    #[must_use]
    pub fn is_balanced(&self, tolerance: f64) -> bool {
        let rate = |side| self.win_rates.get(&side).copied().unwrap_or(0.0);
        (rate(Side::Ally) - rate(Side::Enemy)).abs() <= tolerance
    }
}
