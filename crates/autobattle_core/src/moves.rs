//! Move definitions and the move registry.
//!
//! A move is either active (PP-gated, with a targeting rule and a numeric
//! effect) or passive (a [`HookSet`] that is always on). Definitions live
//! in a [`MoveRegistry`] keyed by [`MoveId`]; combatants store only the
//! key.
//!
//! Active moves can be overridden from RON:
//!
//! ```ron
//! {
//!     Thunderbolt: (
//!         name: "Thunderbolt",
//!         cost: 80,
//!         starting_pp: 20,
//!         range: 3,
//!         target_side: Opponents,
//!         target_rule: Nearest,
//!         aoe: None,
//!         effect: Strike(
//!             spec: (action: StatBased(stat: SpecialAttack, defense: SpecialDefense, power: 150),
//!                    is_attack: true, can_crit: false, triggers_events: true),
//!             rider: Some((kind: Paralyse, value: None, duration_ms: 1500)),
//!         ),
//!         cast_ms: 600,
//!     ),
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aoe::AoeShape;
use crate::combatant::{BaseStats, CombatantId, Stat};
use crate::damage::{DamageSpec, OffenseAction};
use crate::error::{BattleError, Result};
use crate::hooks::{DamageHookArgs, HitInfo, HookCtx, HookEffect, HookRole, HookSet};
use crate::math::Fixed;
use crate::status::StatusKind;

/// Stable key of a move definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MoveId {
    /// Special strike with a paralysis chance.
    Thunderbolt,
    /// Hits everything around the user.
    Earthquake,
    /// Special damage along a line.
    Flamethrower,
    /// Area damage that roots.
    Blizzard,
    /// Puts an area to sleep.
    Sing,
    /// Heals the user.
    Recover,
    /// Raises the user's attack.
    SwordsDance,
    /// Several quick physical hits.
    FuryAttack,
    /// Strikes the furthest enemy.
    ShadowBall,
    /// Curses a random enemy.
    Curse,
    /// Badly poisons the nearest enemy.
    Toxic,
    /// Heals the most injured ally.
    HealPulse,
    /// Shields a group of allies.
    Safeguard,
    /// Calls a helper onto the field.
    CallAlly,
    /// Passive: takes less damage.
    Sturdy,
    /// Passive: hurts attackers.
    RoughSkin,
    /// Passive: lowers enemy attack at combat start.
    Intimidate,
    /// Passive: poisons on hit.
    PoisonTouch,
}

impl fmt::Display for MoveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which combatants an active move affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetSide {
    /// The other team.
    Opponents,
    /// The user's team, user included.
    Allies,
    /// Only the user.
    User,
}

/// How an active move picks its target cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetRule {
    /// The remembered target if still valid, else the spiral-nearest enemy.
    Nearest,
    /// The in-range cell whose area hits the most relevant combatants.
    BestArea,
    /// The ally with the lowest HP fraction.
    LowestHpAlly,
    /// The opposing combatant furthest from the user.
    Furthest,
    /// A uniformly random opposing combatant.
    Random,
    /// The user's own cell.
    OnSelf,
    /// The empty cell nearest the user.
    NearestEmpty,
}

/// A status applied alongside a move's main effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusRider {
    /// Status kind.
    pub kind: StatusKind,
    /// Optional magnitude.
    pub value: Option<i32>,
    /// Duration in ms.
    pub duration_ms: i64,
}

/// A combatant created by a summoning move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummonTemplate {
    /// Display name.
    pub name: String,
    /// Maximum health.
    pub max_hp: i32,
    /// Base stats.
    pub base: BaseStats,
    /// Basic attack range.
    #[serde(default = "default_range")]
    pub attack_range: u32,
}

fn default_range() -> u32 {
    1
}

/// What an active move does to the combatants it affects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveEffect {
    /// Damage, with an optional status rider.
    Strike {
        /// How the damage resolves.
        spec: DamageSpec,
        /// Status applied to every combatant damaged.
        rider: Option<StatusRider>,
    },
    /// Restore a percentage of max HP.
    Heal {
        /// Percent of the receiver's max HP.
        percent: i32,
    },
    /// Shift a stat stage.
    Buff {
        /// Stat.
        stat: Stat,
        /// Stage delta.
        stages: i8,
    },
    /// Apply a status without damage.
    Afflict {
        /// The status.
        rider: StatusRider,
    },
    /// Repeated damage steps against the target cell.
    Barrage {
        /// How each hit resolves.
        spec: DamageSpec,
        /// Number of hits.
        hits: u32,
        /// Virtual time between hits.
        interval_ms: i64,
    },
    /// Place a new combatant next to the target cell.
    Summon {
        /// What to create.
        template: SummonTemplate,
    },
}

/// A PP-gated move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMove {
    /// Display name.
    pub name: String,
    /// PP needed; also the PP maximum.
    pub cost: u32,
    /// PP at combat start.
    pub starting_pp: u32,
    /// Cast range (Manhattan).
    pub range: u32,
    /// Who is affected.
    pub target_side: TargetSide,
    /// How the target cell is chosen.
    pub target_rule: TargetRule,
    /// Area around the target cell; single cell when `None`.
    pub aoe: Option<AoeShape>,
    /// The effect.
    pub effect: MoveEffect,
    /// Default duration before the move completes.
    pub cast_ms: i64,
}

impl ActiveMove {
    /// Scheduled effect steps as offsets from the cast, in ms.
    ///
    /// Single-step effects land halfway through the cast; barrages land one
    /// hit per interval.
    #[must_use]
    pub fn step_offsets(&self) -> Vec<i64> {
        match &self.effect {
            MoveEffect::Barrage {
                hits, interval_ms, ..
            } => (1..=i64::from(*hits))
                .map(|i| i * (*interval_ms).max(1))
                .collect(),
            _ => vec![(self.cast_ms / 2).max(1)],
        }
    }

    /// Cast length, extended to cover every scheduled step.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        let last_step = self.step_offsets().into_iter().max().unwrap_or(0);
        self.cast_ms.max(last_step).max(1)
    }
}

/// An always-on move.
#[derive(Debug, Clone)]
pub struct PassiveMove {
    /// Display name.
    pub name: String,
    /// Hooks. Only `on_hit`, `on_being_hit`, `on_round_start` and
    /// `calculate_damage` are invoked for passives.
    pub hooks: HookSet,
}

/// A move definition.
#[derive(Debug, Clone)]
pub enum Move {
    /// PP-gated.
    Active(ActiveMove),
    /// Always on.
    Passive(PassiveMove),
}

impl Move {
    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Active(active) => &active.name,
            Self::Passive(passive) => &passive.name,
        }
    }

    /// The active definition, if this is an active move.
    #[must_use]
    pub fn as_active(&self) -> Option<&ActiveMove> {
        match self {
            Self::Active(active) => Some(active),
            Self::Passive(_) => None,
        }
    }

    /// The passive hooks, if this is a passive move.
    #[must_use]
    pub fn passive_hooks(&self) -> Option<&HookSet> {
        match self {
            Self::Passive(passive) => Some(&passive.hooks),
            Self::Active(_) => None,
        }
    }
}

/// Move definitions keyed by [`MoveId`].
#[derive(Debug, Clone, Default)]
pub struct MoveRegistry {
    moves: BTreeMap<MoveId, Move>,
}

impl MoveRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a move.
    pub fn insert(&mut self, id: MoveId, definition: Move) {
        self.moves.insert(id, definition);
    }

    /// Look up a move.
    #[must_use]
    pub fn get(&self, id: MoveId) -> Option<&Move> {
        self.moves.get(&id)
    }

    /// Look up a move that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::UnknownMove`] if `id` is not registered.
    pub fn require(&self, id: MoveId) -> Result<&Move> {
        self.get(id)
            .ok_or_else(|| BattleError::UnknownMove(id.to_string()))
    }

    /// Registered ids in key order.
    pub fn ids(&self) -> impl Iterator<Item = MoveId> + '_ {
        self.moves.keys().copied()
    }

    /// Number of registered moves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Replace active moves from a RON map of `MoveId` to [`ActiveMove`].
    ///
    /// Returns the number of moves replaced.
    ///
    /// # Errors
    ///
    /// Fails if the document does not parse, or if it names a passive move.
    pub fn apply_overrides(&mut self, source_name: &str, text: &str) -> Result<usize> {
        let overrides: BTreeMap<MoveId, ActiveMove> =
            ron::from_str(text).map_err(|e| BattleError::DataParseError {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;

        if let Some(id) = overrides
            .keys()
            .find(|id| matches!(self.get(**id), Some(Move::Passive(_))))
        {
            return Err(BattleError::DataParseError {
                source_name: source_name.to_string(),
                message: format!("move {id} is passive and cannot be overridden"),
            });
        }

        let count = overrides.len();
        for (id, active) in overrides {
            self.insert(id, Move::Active(active));
        }
        Ok(count)
    }

    /// The built-in move table.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for (id, active) in standard_actives() {
            registry.insert(id, Move::Active(active));
        }
        for (id, name, hooks) in standard_passives() {
            registry.insert(
                id,
                Move::Passive(PassiveMove {
                    name: name.to_string(),
                    hooks,
                }),
            );
        }
        registry
    }
}

#[allow(clippy::too_many_lines)]
fn standard_actives() -> Vec<(MoveId, ActiveMove)> {
    let active = |name: &str,
                  cost: u32,
                  range: u32,
                  target_side: TargetSide,
                  target_rule: TargetRule,
                  aoe: Option<AoeShape>,
                  effect: MoveEffect| ActiveMove {
        name: name.to_string(),
        cost,
        starting_pp: 0,
        range,
        target_side,
        target_rule,
        aoe,
        effect,
        cast_ms: 600,
    };

    vec![
        (
            MoveId::Thunderbolt,
            active(
                "Thunderbolt",
                80,
                3,
                TargetSide::Opponents,
                TargetRule::Nearest,
                None,
                MoveEffect::Strike {
                    spec: DamageSpec::move_hit(OffenseAction::special(150)),
                    rider: Some(StatusRider {
                        kind: StatusKind::Paralyse,
                        value: None,
                        duration_ms: 1500,
                    }),
                },
            ),
        ),
        (
            MoveId::Earthquake,
            active(
                "Earthquake",
                100,
                0,
                TargetSide::Opponents,
                TargetRule::BestArea,
                Some(AoeShape::AroundUser),
                MoveEffect::Strike {
                    spec: DamageSpec::move_hit(OffenseAction::FlatDamage {
                        amount: 80,
                        defense: Stat::Defense,
                    }),
                    rider: None,
                },
            ),
        ),
        (
            MoveId::Flamethrower,
            active(
                "Flamethrower",
                90,
                2,
                TargetSide::Opponents,
                TargetRule::Nearest,
                Some(AoeShape::Line),
                MoveEffect::Strike {
                    spec: DamageSpec::move_hit(OffenseAction::special(110)).with_crit(),
                    rider: None,
                },
            ),
        ),
        (
            MoveId::Blizzard,
            active(
                "Blizzard",
                100,
                4,
                TargetSide::Opponents,
                TargetRule::BestArea,
                Some(AoeShape::Square),
                MoveEffect::Strike {
                    spec: DamageSpec::move_hit(OffenseAction::FlatDamage {
                        amount: 60,
                        defense: Stat::SpecialDefense,
                    }),
                    rider: Some(StatusRider {
                        kind: StatusKind::Immobile,
                        value: None,
                        duration_ms: 2000,
                    }),
                },
            ),
        ),
        (
            MoveId::Sing,
            active(
                "Sing",
                70,
                3,
                TargetSide::Opponents,
                TargetRule::BestArea,
                Some(AoeShape::Cross),
                MoveEffect::Afflict {
                    rider: StatusRider {
                        kind: StatusKind::Sleep,
                        value: None,
                        duration_ms: 2000,
                    },
                },
            ),
        ),
        (
            MoveId::Recover,
            active(
                "Recover",
                60,
                0,
                TargetSide::User,
                TargetRule::OnSelf,
                None,
                MoveEffect::Heal { percent: 40 },
            ),
        ),
        (
            MoveId::SwordsDance,
            active(
                "Swords Dance",
                50,
                0,
                TargetSide::User,
                TargetRule::OnSelf,
                None,
                MoveEffect::Buff {
                    stat: Stat::Attack,
                    stages: 2,
                },
            ),
        ),
        (
            MoveId::FuryAttack,
            active(
                "Fury Attack",
                60,
                1,
                TargetSide::Opponents,
                TargetRule::Nearest,
                None,
                MoveEffect::Barrage {
                    spec: DamageSpec::move_hit(OffenseAction::StatBased {
                        stat: Stat::Attack,
                        defense: Stat::Defense,
                        power: 50,
                    })
                    .with_crit(),
                    hits: 3,
                    interval_ms: 250,
                },
            ),
        ),
        (
            MoveId::ShadowBall,
            active(
                "Shadow Ball",
                80,
                6,
                TargetSide::Opponents,
                TargetRule::Furthest,
                None,
                MoveEffect::Strike {
                    spec: DamageSpec::move_hit(OffenseAction::special(120)),
                    rider: None,
                },
            ),
        ),
        (
            MoveId::Curse,
            active(
                "Curse",
                120,
                12,
                TargetSide::Opponents,
                TargetRule::Random,
                None,
                MoveEffect::Afflict {
                    rider: StatusRider {
                        kind: StatusKind::Curse,
                        value: None,
                        duration_ms: 5000,
                    },
                },
            ),
        ),
        (
            MoveId::Toxic,
            active(
                "Toxic",
                60,
                2,
                TargetSide::Opponents,
                TargetRule::Nearest,
                None,
                MoveEffect::Afflict {
                    rider: StatusRider {
                        kind: StatusKind::Poison,
                        value: Some(8),
                        duration_ms: 6000,
                    },
                },
            ),
        ),
        (
            MoveId::HealPulse,
            active(
                "Heal Pulse",
                70,
                4,
                TargetSide::Allies,
                TargetRule::LowestHpAlly,
                None,
                MoveEffect::Heal { percent: 35 },
            ),
        ),
        (
            MoveId::Safeguard,
            active(
                "Safeguard",
                90,
                3,
                TargetSide::Allies,
                TargetRule::BestArea,
                Some(AoeShape::Cross),
                MoveEffect::Afflict {
                    rider: StatusRider {
                        kind: StatusKind::StatusImmunity,
                        value: None,
                        duration_ms: 3000,
                    },
                },
            ),
        ),
        (
            MoveId::CallAlly,
            active(
                "Call Ally",
                100,
                2,
                TargetSide::Allies,
                TargetRule::NearestEmpty,
                None,
                MoveEffect::Summon {
                    template: SummonTemplate {
                        name: "Helper".to_string(),
                        max_hp: 60,
                        base: BaseStats {
                            attack: 30,
                            defense: 20,
                            special_attack: 10,
                            special_defense: 20,
                            speed: 60,
                        },
                        attack_range: 1,
                    },
                },
            ),
        ),
    ]
}

fn standard_passives() -> [(MoveId, &'static str, HookSet); 4] {
    [
        (
            MoveId::Sturdy,
            "Sturdy",
            HookSet {
                calculate_damage: Some(sturdy_damage),
                ..HookSet::default()
            },
        ),
        (
            MoveId::RoughSkin,
            "Rough Skin",
            HookSet {
                on_being_hit: Some(rough_skin_being_hit),
                ..HookSet::default()
            },
        ),
        (
            MoveId::Intimidate,
            "Intimidate",
            HookSet {
                on_round_start: Some(intimidate_round_start),
                ..HookSet::default()
            },
        ),
        (
            MoveId::PoisonTouch,
            "Poison Touch",
            HookSet {
                on_hit: Some(poison_touch_on_hit),
                ..HookSet::default()
            },
        ),
    ]
}

/// Flat damage reflected by Rough Skin.
const ROUGH_SKIN_DAMAGE: i32 = 8;

fn sturdy_damage(args: &DamageHookArgs<'_>, total: Fixed) -> Fixed {
    match args.role {
        HookRole::Defender => total.saturating_mul(Fixed::from_num(3) / Fixed::from_num(4)),
        HookRole::Attacker => total,
    }
}

fn rough_skin_being_hit(ctx: &mut HookCtx<'_>, hit: &HitInfo) {
    ctx.push(HookEffect::Damage {
        source: ctx.holder,
        target: hit.attacker,
        spec: DamageSpec::silent(OffenseAction::TrueDamage {
            amount: ROUGH_SKIN_DAMAGE,
        }),
    });
}

fn intimidate_round_start(ctx: &mut HookCtx<'_>) {
    let targets: Vec<CombatantId> = ctx.opponents().map(|c| c.id).collect();
    for target in targets {
        ctx.push(HookEffect::StatStage {
            target,
            stat: Stat::Attack,
            delta: -1,
        });
    }
}

fn poison_touch_on_hit(ctx: &mut HookCtx<'_>, hit: &HitInfo) {
    ctx.push(HookEffect::ApplyStatus {
        target: hit.defender,
        kind: StatusKind::Poison,
        value: Some(5),
        duration_ms: 2000,
        source: ctx.holder,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_contents() {
        let registry = MoveRegistry::standard();
        assert_eq!(registry.len(), 18);
        assert!(registry.get(MoveId::Thunderbolt).unwrap().as_active().is_some());
        assert!(registry.get(MoveId::Sturdy).unwrap().passive_hooks().is_some());
    }

    #[test]
    fn test_require_unknown() {
        let registry = MoveRegistry::new();
        assert!(matches!(
            registry.require(MoveId::Sing),
            Err(BattleError::UnknownMove(_))
        ));
    }

    #[test]
    fn test_barrage_steps_and_duration() {
        let registry = MoveRegistry::standard();
        let fury = registry.get(MoveId::FuryAttack).unwrap().as_active().unwrap();
        assert_eq!(fury.step_offsets(), vec![250, 500, 750]);
        assert_eq!(fury.duration_ms(), 750);

        let recover = registry.get(MoveId::Recover).unwrap().as_active().unwrap();
        assert_eq!(recover.step_offsets(), vec![300]);
        assert_eq!(recover.duration_ms(), 600);
    }

    #[test]
    fn test_overrides_replace_active_moves() {
        let mut registry = MoveRegistry::standard();
        let text = r#"{
            Recover: (
                name: "Big Recover",
                cost: 10,
                starting_pp: 10,
                range: 0,
                target_side: User,
                target_rule: OnSelf,
                aoe: None,
                effect: Heal(percent: 90),
                cast_ms: 200,
            ),
        }"#;
        let replaced = registry.apply_overrides("test.ron", text).unwrap();
        assert_eq!(replaced, 1);

        let recover = registry.get(MoveId::Recover).unwrap().as_active().unwrap();
        assert_eq!(recover.name, "Big Recover");
        assert_eq!(recover.effect, MoveEffect::Heal { percent: 90 });
    }

    #[test]
    fn test_overrides_reject_passives_and_bad_text() {
        let mut registry = MoveRegistry::standard();
        let text = r#"{
            Sturdy: (
                name: "Not Sturdy",
                cost: 10,
                starting_pp: 0,
                range: 1,
                target_side: User,
                target_rule: OnSelf,
                aoe: None,
                effect: Heal(percent: 10),
                cast_ms: 100,
            ),
        }"#;
        assert!(registry.apply_overrides("passive.ron", text).is_err());
        assert!(registry.apply_overrides("broken.ron", "{ Recover: (").is_err());
        assert!(registry.get(MoveId::Sturdy).unwrap().passive_hooks().is_some());
    }
}
