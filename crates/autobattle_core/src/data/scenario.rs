//! Scenario data: two team layouts plus a combat configuration.

use serde::{Deserialize, Serialize};

use crate::combatant::{BaseStats, Combatant, CombatantId, Resource, Side, Stat};
use crate::config::CombatConfig;
use crate::error::{BattleError, Result};
use crate::grid::Coord;
use crate::moves::{Move, MoveId, StatusRider};
use crate::rules::Ruleset;
use crate::synergy::SynergyKind;

/// Largest accepted max HP or base stat.
///
/// Keeps staged stats and damage totals well inside fixed-point range.
pub const STAT_CEILING: i32 = 1_000_000;

fn default_range() -> u32 {
    1
}

fn default_crit() -> u32 {
    10
}

/// Blueprint for one combatant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatantTemplate {
    /// Display name.
    pub name: String,
    /// Maximum health.
    pub max_hp: i32,
    /// Base stats.
    pub base: BaseStats,
    /// Move key, active or passive.
    #[serde(default)]
    pub move_id: Option<MoveId>,
    /// Basic attack range.
    #[serde(default = "default_range")]
    pub attack_range: u32,
    /// Crit chance in percent.
    #[serde(default = "default_crit")]
    pub crit_chance: u32,
    /// Statuses present when combat starts.
    #[serde(default)]
    pub statuses: Vec<StatusRider>,
}

impl CombatantTemplate {
    /// Build a combatant. PP is set up from the move table.
    ///
    /// # Errors
    ///
    /// Fails if the move key is not registered.
    pub fn instantiate(&self, id: CombatantId, side: Side, rules: &Ruleset) -> Result<Combatant> {
        let mut unit = Combatant::new(id, self.name.clone(), side, self.max_hp, self.base);
        unit.attack_range = self.attack_range;
        unit.crit_chance = self.crit_chance;
        unit.move_id = self.move_id;
        if let Some(move_id) = self.move_id {
            if let Move::Active(active) = rules.moves.require(move_id)? {
                unit.pp = Some(Resource::new(active.starting_pp, active.cost));
            }
        }
        for rider in &self.statuses {
            unit.status
                .apply(rider.kind, rider.value, rider.duration_ms, None);
        }
        Ok(unit)
    }
}

/// A combatant at a starting cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// What to place.
    pub unit: CombatantTemplate,
}

impl UnitPlacement {
    /// Starting cell.
    #[must_use]
    pub const fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

/// One side's starting board and synergy counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamLayout {
    /// Placements.
    pub units: Vec<UnitPlacement>,
    /// Externally computed `(category, count)` pairs.
    #[serde(default)]
    pub synergies: Vec<(SynergyKind, u32)>,
}

/// A complete combat setup.
///
/// # Example RON
///
/// ```ron
/// Scenario(
///     name: "duel",
///     config: (seed: 7),
///     allies: (
///         units: [(x: 2, y: 1, unit: (name: "Pikachu", max_hp: 120,
///                  base: (attack: 55, defense: 40, special_attack: 50, special_defense: 50, speed: 90),
///                  move_id: Some(Thunderbolt)))],
///         synergies: [(Electric, 1)],
///     ),
///     enemies: (units: [(x: 2, y: 4, unit: (name: "Geodude", max_hp: 140,
///               base: (attack: 80, defense: 100, special_attack: 30, special_defense: 30, speed: 20)))]),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Name used in reports.
    pub name: String,
    /// Combat configuration.
    #[serde(default)]
    pub config: CombatConfig,
    /// The player's side.
    pub allies: TeamLayout,
    /// The opposing side.
    pub enemies: TeamLayout,
}

impl Scenario {
    /// Parse a scenario from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::DataParseError`] naming `source_name`.
    pub fn from_ron_str(source_name: &str, text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| BattleError::DataParseError {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })
    }

    /// Layout of one side.
    #[must_use]
    pub const fn team(&self, side: Side) -> &TeamLayout {
        match side {
            Side::Ally => &self.allies,
            Side::Enemy => &self.enemies,
        }
    }

    /// Validate the scenario against a rule set.
    ///
    /// Returns a list of problems; empty means valid.
    #[must_use]
    pub fn validate(&self, rules: &Ruleset) -> Vec<String> {
        let mut errors = self.config.validate();
        let mut seen: Vec<Coord> = Vec::new();

        for side in Side::ALL {
            for placement in &self.team(side).units {
                let at = placement.coord();
                let unit = &placement.unit;
                if at.x < 0
                    || at.y < 0
                    || at.x as u32 >= self.config.width
                    || at.y as u32 >= self.config.height
                {
                    errors.push(format!("{side} unit '{}' at {at} is off the board", unit.name));
                }
                if seen.contains(&at) {
                    errors.push(format!("{side} unit '{}' shares cell {at}", unit.name));
                }
                seen.push(at);
                if unit.max_hp <= 0 {
                    errors.push(format!(
                        "{side} unit '{}' has non-positive max HP {}",
                        unit.name, unit.max_hp
                    ));
                }
                if unit.max_hp > STAT_CEILING {
                    errors.push(format!(
                        "{side} unit '{}' has max HP {} above {STAT_CEILING}",
                        unit.name, unit.max_hp
                    ));
                }
                for stat in Stat::ALL {
                    let value = unit.base.get(stat);
                    if !(-STAT_CEILING..=STAT_CEILING).contains(&value) {
                        errors.push(format!(
                            "{side} unit '{}' has {stat:?} {value} beyond {STAT_CEILING}",
                            unit.name
                        ));
                    }
                }
                if unit.attack_range == 0 {
                    errors.push(format!("{side} unit '{}' has attack range 0", unit.name));
                }
                for rider in &unit.statuses {
                    if rider.kind.deals_damage() {
                        errors.push(format!(
                            "{side} unit '{}' starts with {:?}, which needs a source",
                            unit.name, rider.kind
                        ));
                    }
                }
                if let Some(move_id) = unit.move_id {
                    if rules.moves.get(move_id).is_none() {
                        errors.push(format!("{side} unit '{}' has unknown move {move_id}", unit.name));
                    }
                }
            }
            for (kind, _) in &self.team(side).synergies {
                if rules.synergies.get(*kind).is_none() {
                    errors.push(format!("{side} synergy {kind} is not registered"));
                }
            }
        }
        errors
    }
}
