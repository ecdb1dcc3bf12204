//! Team synergies.
//!
//! A synergy is a team-wide bonus that switches on when enough combatants
//! share a category. Each category lists its thresholds; the tier is how
//! many thresholds the count reaches (or, for exact synergies, which
//! threshold it hits on the nose). Tier 0 means inactive.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::combatant::CombatantId;
use crate::hooks::{
    DamageHookArgs, DeathInfo, HitInfo, HookCtx, HookEffect, HookRole, HookSet, MoveUseInfo,
    RoundResult,
};
use crate::math::{percent, Fixed};
use crate::status::{EffectKind, StatusKind};

/// Synergy categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SynergyKind {
    /// Outgoing damage bonus.
    Fire,
    /// PP at combat start.
    Water,
    /// Regeneration at turn start.
    Grass,
    /// Incoming damage reduction.
    Rock,
    /// PP refund after a move.
    Electric,
    /// Poison on hit.
    Poison,
    /// Rage when an enemy falls.
    Ghost,
    /// PP when struck.
    Fighting,
    /// Reward on victory.
    Normal,
    /// Large damage bonus at exact counts.
    Dragon,
}

impl SynergyKind {
    /// Every category.
    pub const ALL: [SynergyKind; 10] = [
        Self::Fire,
        Self::Water,
        Self::Grass,
        Self::Rock,
        Self::Electric,
        Self::Poison,
        Self::Ghost,
        Self::Fighting,
        Self::Normal,
        Self::Dragon,
    ];

    /// Lowercase category name, used for ordering and reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fire => "fire",
            Self::Water => "water",
            Self::Grass => "grass",
            Self::Rock => "rock",
            Self::Electric => "electric",
            Self::Poison => "poison",
            Self::Ghost => "ghost",
            Self::Fighting => "fighting",
            Self::Normal => "normal",
            Self::Dragon => "dragon",
        }
    }
}

impl fmt::Display for SynergyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tier reached by `count`.
///
/// At-least synergies count the thresholds `<= count`. Exact synergies
/// return the 1-based index of the threshold equal to `count`, or 0.
#[must_use]
pub fn tier(thresholds: &[u32], exact: bool, count: u32) -> u32 {
    if exact {
        thresholds
            .iter()
            .position(|&t| t == count)
            .map_or(0, |i| i as u32 + 1)
    } else {
        thresholds.iter().filter(|&&t| t <= count).count() as u32
    }
}

/// A synergy category's definition.
#[derive(Debug, Clone)]
pub struct SynergyDef {
    /// Category.
    pub kind: SynergyKind,
    /// Ascending activation thresholds.
    pub thresholds: Vec<u32>,
    /// Exact-match thresholds instead of at-least.
    pub exact: bool,
    /// Hooks.
    pub hooks: HookSet,
}

impl SynergyDef {
    /// Tier reached by `count`.
    #[must_use]
    pub fn tier(&self, count: u32) -> u32 {
        tier(&self.thresholds, self.exact, count)
    }
}

/// A synergy switched on for one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSynergy {
    /// Category.
    pub kind: SynergyKind,
    /// Number of combatants counted.
    pub count: u32,
    /// Tier reached; always at least 1.
    pub tier: u32,
}

/// Registry of synergy definitions keyed by category.
#[derive(Debug, Clone, Default)]
pub struct SynergyRegistry {
    defs: BTreeMap<SynergyKind, SynergyDef>,
}

impl SynergyRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a definition.
    pub fn insert(&mut self, def: SynergyDef) {
        self.defs.insert(def.kind, def);
    }

    /// Look up a definition.
    #[must_use]
    pub fn get(&self, kind: SynergyKind) -> Option<&SynergyDef> {
        self.defs.get(&kind)
    }

    /// Number of registered categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Turn a side's `(category, count)` list into its active synergies.
    ///
    /// Unknown categories and tier-0 entries are dropped. The result is in
    /// activation order: tier descending, count descending, name ascending.
    #[must_use]
    pub fn activate(&self, counts: &[(SynergyKind, u32)]) -> Vec<ActiveSynergy> {
        let mut active: Vec<ActiveSynergy> = counts
            .iter()
            .filter_map(|&(kind, count)| {
                let def = self.get(kind)?;
                let tier = def.tier(count);
                (tier > 0).then_some(ActiveSynergy { kind, count, tier })
            })
            .collect();
        active.sort_by(|a, b| {
            b.tier
                .cmp(&a.tier)
                .then(b.count.cmp(&a.count))
                .then(a.kind.name().cmp(b.kind.name()))
        });
        active
    }

    /// The built-in categories.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        let defs = [
            (SynergyKind::Fire, vec![2, 4, 6], false, HookSet {
                calculate_damage: Some(fire_damage),
                ..HookSet::default()
            }),
            (SynergyKind::Water, vec![2, 4], false, HookSet {
                on_round_start: Some(water_round_start),
                ..HookSet::default()
            }),
            (SynergyKind::Grass, vec![2, 4, 6], false, HookSet {
                on_turn_start: Some(grass_turn_start),
                ..HookSet::default()
            }),
            (SynergyKind::Rock, vec![2, 4], false, HookSet {
                calculate_damage: Some(rock_damage),
                ..HookSet::default()
            }),
            (SynergyKind::Electric, vec![3], false, HookSet {
                on_move_use: Some(electric_move_use),
                ..HookSet::default()
            }),
            (SynergyKind::Poison, vec![2, 4], false, HookSet {
                on_hit: Some(poison_on_hit),
                ..HookSet::default()
            }),
            (SynergyKind::Ghost, vec![2], true, HookSet {
                on_death: Some(ghost_on_death),
                ..HookSet::default()
            }),
            (SynergyKind::Fighting, vec![2, 4], false, HookSet {
                on_being_hit: Some(fighting_on_being_hit),
                ..HookSet::default()
            }),
            (SynergyKind::Normal, vec![3, 6], false, HookSet {
                on_round_end: Some(normal_round_end),
                ..HookSet::default()
            }),
            (SynergyKind::Dragon, vec![3, 5], true, HookSet {
                calculate_damage: Some(dragon_damage),
                ..HookSet::default()
            }),
        ];
        for (kind, thresholds, exact, hooks) in defs {
            registry.insert(SynergyDef {
                kind,
                thresholds,
                exact,
                hooks,
            });
        }
        registry
    }
}

fn scale(total: Fixed, percent_change: i32) -> Fixed {
    total.saturating_mul(Fixed::ONE + percent(percent_change)).max(Fixed::ZERO)
}

fn tier_i32(tier: u32) -> i32 {
    i32::try_from(tier).unwrap_or(i32::MAX)
}

fn fire_damage(args: &DamageHookArgs<'_>, total: Fixed) -> Fixed {
    match args.role {
        HookRole::Attacker => scale(total, 10 * tier_i32(args.tier)),
        HookRole::Defender => total,
    }
}

fn rock_damage(args: &DamageHookArgs<'_>, total: Fixed) -> Fixed {
    match args.role {
        HookRole::Defender => scale(total, -10 * tier_i32(args.tier)),
        HookRole::Attacker => total,
    }
}

fn dragon_damage(args: &DamageHookArgs<'_>, total: Fixed) -> Fixed {
    match args.role {
        HookRole::Attacker => scale(total, 15 * tier_i32(args.tier)),
        HookRole::Defender => total,
    }
}

fn water_round_start(ctx: &mut HookCtx<'_>) {
    let amount = 15 * ctx.tier;
    let targets: Vec<CombatantId> = ctx.allies().filter(|c| c.pp.is_some()).map(|c| c.id).collect();
    for target in targets {
        ctx.push(HookEffect::GainPp { target, amount });
    }
}

fn grass_turn_start(ctx: &mut HookCtx<'_>, actor: CombatantId) {
    let Some(unit) = ctx.grid.combatant(actor) else {
        return;
    };
    if unit.side != ctx.side || unit.hp >= unit.max_hp {
        return;
    }
    let amount = unit.max_hp.saturating_mul(2 * tier_i32(ctx.tier)) / 100;
    if amount > 0 {
        ctx.push(HookEffect::Heal {
            target: actor,
            amount,
        });
    }
}

fn electric_move_use(ctx: &mut HookCtx<'_>, info: &MoveUseInfo) {
    ctx.push(HookEffect::GainPp {
        target: info.user,
        amount: 20,
    });
}

fn poison_on_hit(ctx: &mut HookCtx<'_>, hit: &HitInfo) {
    ctx.push(HookEffect::ApplyStatus {
        target: hit.defender,
        kind: StatusKind::Poison,
        value: Some(2 * tier_i32(ctx.tier)),
        duration_ms: 3000,
        source: Some(hit.attacker),
    });
}

fn ghost_on_death(ctx: &mut HookCtx<'_>, death: &DeathInfo) {
    if death.side == ctx.side {
        return;
    }
    let allies: Vec<CombatantId> = ctx.allies().map(|c| c.id).collect();
    for target in allies {
        ctx.push(HookEffect::AddEffect {
            target,
            kind: EffectKind::Enraged,
            value: 20,
            duration_ms: 4000,
        });
    }
}

fn fighting_on_being_hit(ctx: &mut HookCtx<'_>, hit: &HitInfo) {
    ctx.push(HookEffect::GainPp {
        target: hit.defender,
        amount: 3 * ctx.tier,
    });
}

fn normal_round_end(ctx: &mut HookCtx<'_>, result: RoundResult) {
    if result == RoundResult::Win {
        ctx.push(HookEffect::Reward {
            side: ctx.side,
            amount: ctx.tier,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{BaseStats, Combatant, Side};
    use crate::damage::OffenseAction;
    use crate::grid::{Coord, Grid};
    use crate::math::round_half_up;

    #[test]
    fn test_tier_at_least() {
        let thresholds = [2, 4, 6];
        assert_eq!(tier(&thresholds, false, 0), 0);
        assert_eq!(tier(&thresholds, false, 1), 0);
        assert_eq!(tier(&thresholds, false, 2), 1);
        assert_eq!(tier(&thresholds, false, 5), 2);
        assert_eq!(tier(&thresholds, false, 9), 3);
    }

    #[test]
    fn test_tier_exact() {
        let thresholds = [3, 5];
        assert_eq!(tier(&thresholds, true, 3), 1);
        assert_eq!(tier(&thresholds, true, 4), 0);
        assert_eq!(tier(&thresholds, true, 5), 2);
        assert_eq!(tier(&thresholds, true, 6), 0);
    }

    #[test]
    fn test_activation_order() {
        let registry = SynergyRegistry::standard();
        let active = registry.activate(&[
            (SynergyKind::Water, 2),
            (SynergyKind::Fire, 4),
            (SynergyKind::Rock, 4),
            (SynergyKind::Grass, 3),
            (SynergyKind::Electric, 1),
        ]);

        let order: Vec<SynergyKind> = active.iter().map(|a| a.kind).collect();
        // Fire and Rock are tier 2 at count 4: name breaks the tie.
        // Grass (tier 1, count 3) precedes Water (tier 1, count 2).
        // Electric is inactive.
        assert_eq!(
            order,
            vec![
                SynergyKind::Fire,
                SynergyKind::Rock,
                SynergyKind::Grass,
                SynergyKind::Water
            ]
        );
    }

    #[test]
    fn test_standard_registry_covers_every_category() {
        let registry = SynergyRegistry::standard();
        assert_eq!(registry.len(), SynergyKind::ALL.len());
        for kind in SynergyKind::ALL {
            assert!(registry.get(kind).is_some(), "{kind} missing");
        }
    }

    #[test]
    fn test_fire_only_boosts_attacker_role() {
        let unit = Combatant::new(CombatantId(1), "a", Side::Ally, 100, BaseStats::default());
        let action = OffenseAction::physical();
        let mut args = DamageHookArgs {
            attacker: &unit,
            defender: &unit,
            action: &action,
            role: HookRole::Attacker,
            tier: 2,
            count: 4,
        };
        let hundred = Fixed::from_num(100);
        assert_eq!(round_half_up(fire_damage(&args, hundred)), 120);
        args.role = HookRole::Defender;
        assert_eq!(fire_damage(&args, hundred), hundred);
    }

    #[test]
    fn test_ghost_reacts_only_to_enemy_deaths() {
        let mut grid = Grid::default();
        let ally = Combatant::new(CombatantId(1), "a", Side::Ally, 100, BaseStats::default());
        grid.place(Coord::new(0, 0), ally).unwrap();

        let mut ctx = HookCtx::new(&grid, Side::Ally, None, 1, 2);
        ghost_on_death(
            &mut ctx,
            &DeathInfo {
                dead: CombatantId(2),
                side: Side::Ally,
                killer: None,
            },
        );
        assert!(ctx.into_effects().is_empty());

        let mut ctx = HookCtx::new(&grid, Side::Ally, None, 1, 2);
        ghost_on_death(
            &mut ctx,
            &DeathInfo {
                dead: CombatantId(9),
                side: Side::Enemy,
                killer: Some(CombatantId(1)),
            },
        );
        assert_eq!(ctx.into_effects().len(), 1);
    }
}
