//! Test fixtures and helpers.
//!
//! Pre-built combatants, boards and scenarios for consistent testing.

use autobattle_core::combat::Combat;
use autobattle_core::combatant::{BaseStats, Combatant, CombatantId, Resource, Side};
use autobattle_core::config::CombatConfig;
use autobattle_core::data::{CombatantTemplate, Scenario, TeamLayout, UnitPlacement};
use autobattle_core::grid::Coord;
use autobattle_core::moves::{Move, MoveId};
use autobattle_core::rules::Ruleset;
use autobattle_core::status::StatusKind;
use autobattle_core::synergy::SynergyKind;

/// Stats with both attack stats and both defense stats equal.
#[must_use]
pub const fn stats(attack: i32, defense: i32, speed: i32) -> BaseStats {
    BaseStats {
        attack,
        defense,
        special_attack: attack,
        special_defense: defense,
        speed,
    }
}

/// Builder for a combatant with test-friendly defaults: 100 HP, no crits,
/// speed 150 (one turn per second).
#[derive(Debug, Clone)]
pub struct UnitBuilder {
    unit: Combatant,
}

impl UnitBuilder {
    /// Start a combatant.
    #[must_use]
    pub fn new(id: u32, side: Side) -> Self {
        let mut unit = Combatant::new(CombatantId(id), format!("unit{id}"), side, 100, stats(50, 0, 150));
        unit.crit_chance = 0;
        Self { unit }
    }

    /// Set max and current HP.
    #[must_use]
    pub fn hp(mut self, hp: i32) -> Self {
        self.unit.max_hp = hp;
        self.unit.hp = hp;
        self
    }

    /// Set current HP only.
    #[must_use]
    pub fn wounded(mut self, hp: i32) -> Self {
        self.unit.hp = hp;
        self
    }

    /// Set base stats.
    #[must_use]
    pub fn stats(mut self, base: BaseStats) -> Self {
        self.unit.base = base;
        self
    }

    /// Set basic attack range.
    #[must_use]
    pub fn range(mut self, range: u32) -> Self {
        self.unit.attack_range = range;
        self
    }

    /// Set crit chance in percent.
    #[must_use]
    pub fn crit(mut self, chance: u32) -> Self {
        self.unit.crit_chance = chance;
        self
    }

    /// Give the combatant a move. Active moves get a PP pool sized by cost,
    /// starting full when `charged` is set.
    #[must_use]
    pub fn with_move(mut self, rules: &Ruleset, move_id: MoveId, charged: bool) -> Self {
        self.unit.move_id = Some(move_id);
        if let Some(Move::Active(active)) = rules.moves.get(move_id) {
            let current = if charged { active.cost } else { active.starting_pp };
            self.unit.pp = Some(Resource::new(current, active.cost));
        }
        self
    }

    /// Apply a status before combat.
    #[must_use]
    pub fn status(mut self, kind: StatusKind, value: Option<i32>, duration_ms: i64) -> Self {
        self.unit.status.apply(kind, value, duration_ms, None);
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> Combatant {
        self.unit
    }
}

/// A combat with event recording on and the given seed.
#[must_use]
pub fn recorded_combat(rules: &Ruleset, seed: u64) -> Combat<'_> {
    let config = CombatConfig {
        seed,
        record_events: true,
        ..CombatConfig::default()
    };
    Combat::new(rules, config)
}

/// One melee combatant per side, three rows apart.
///
/// # Panics
///
/// Never, for the fixed placements used.
#[must_use]
pub fn duel(rules: &Ruleset, seed: u64) -> Combat<'_> {
    let mut combat = recorded_combat(rules, seed);
    combat
        .place(Coord::new(2, 1), UnitBuilder::new(1, Side::Ally).hp(120).build())
        .expect("fixture placement");
    combat
        .place(Coord::new(2, 4), UnitBuilder::new(2, Side::Enemy).hp(100).build())
        .expect("fixture placement");
    combat
}

fn template(name: &str, max_hp: i32, base: BaseStats, move_id: Option<MoveId>) -> CombatantTemplate {
    CombatantTemplate {
        name: name.to_string(),
        max_hp,
        base,
        move_id,
        attack_range: 1,
        crit_chance: 15,
        statuses: Vec::new(),
    }
}

fn placed(x: i32, y: i32, unit: CombatantTemplate) -> UnitPlacement {
    UnitPlacement { x, y, unit }
}

/// A three-on-three with moves, passives, crits and synergies.
#[must_use]
pub fn skirmish_scenario(seed: u64) -> Scenario {
    let mut ranged = template("Spark", 140, stats(45, 30, 95), Some(MoveId::Thunderbolt));
    ranged.attack_range = 3;

    Scenario {
        name: "skirmish".to_string(),
        config: CombatConfig {
            seed,
            ..CombatConfig::default()
        },
        allies: TeamLayout {
            units: vec![
                placed(1, 1, template("Ember", 160, stats(60, 35, 70), Some(MoveId::Flamethrower))),
                placed(3, 0, ranged),
                placed(4, 1, template("Boulder", 220, stats(55, 70, 30), Some(MoveId::Sturdy))),
            ],
            synergies: vec![(SynergyKind::Fire, 2), (SynergyKind::Electric, 1)],
        },
        enemies: TeamLayout {
            units: vec![
                placed(1, 4, template("Brawler", 180, stats(70, 40, 60), Some(MoveId::FuryAttack))),
                placed(2, 5, template("Medic", 130, stats(30, 35, 80), Some(MoveId::HealPulse))),
                placed(4, 4, template("Thorn", 170, stats(50, 50, 55), Some(MoveId::RoughSkin))),
            ],
            synergies: vec![(SynergyKind::Fighting, 2), (SynergyKind::Poison, 2)],
        },
    }
}
