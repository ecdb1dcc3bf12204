//! Damage, accuracy and critical-hit resolution.
//!
//! This module implements the combat damage formula:
//! - Defense reduces damage by a diminishing percentage
//! - Status and named effects scale the reduced total
//! - Critical hits multiply after all reductions
//! - Synergy and passive `calculate_damage` hooks run last, in [`HOOK_ORDER`]
//!
//! Everything here is pure; rolls take the caller's RNG.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::combatant::{Combatant, Stat};
use crate::hooks::{DamageHookArgs, DamageTransform, HookRole};
use crate::math::{percent, round_half_up, Fixed};
use crate::status::StatusKind;

/// Constant added to every resolved amount before rounding.
pub const DAMAGE_BONUS: i32 = 2;

/// Order in which `calculate_damage` transforms run.
///
/// All attacker-side transforms run before any defender-side one; within a
/// role, synergies (in activation order) precede the passive.
pub const HOOK_ORDER: [HookRole; 2] = [HookRole::Attacker, HookRole::Defender];

/// What kind of damage an action deals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffenseAction {
    /// Scales with an attacker stat, reduced by a defender stat.
    StatBased {
        /// Attacker stat supplying the base amount.
        stat: Stat,
        /// Defender stat providing the reduction.
        defense: Stat,
        /// Percent of the stat used as the base amount.
        power: i32,
    },
    /// A fixed base amount, reduced by a defender stat.
    FlatDamage {
        /// Base amount.
        amount: i32,
        /// Defender stat providing the reduction.
        defense: Stat,
    },
    /// Ignores defense and damage-reduction statuses.
    TrueDamage {
        /// Amount dealt.
        amount: i32,
    },
}

impl OffenseAction {
    /// Attack against defense at full power.
    #[must_use]
    pub const fn physical() -> Self {
        Self::StatBased {
            stat: Stat::Attack,
            defense: Stat::Defense,
            power: 100,
        }
    }

    /// Special attack against special defense at the given power.
    #[must_use]
    pub const fn special(power: i32) -> Self {
        Self::StatBased {
            stat: Stat::SpecialAttack,
            defense: Stat::SpecialDefense,
            power,
        }
    }

    /// Whether this action skips defense and reduction statuses.
    #[must_use]
    pub const fn is_true_damage(&self) -> bool {
        matches!(self, Self::TrueDamage { .. })
    }
}

/// How a damage event is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DamageSpec {
    /// The damage formula input.
    pub action: OffenseAction,
    /// Subject to an accuracy roll.
    pub is_attack: bool,
    /// May roll a critical hit.
    pub can_crit: bool,
    /// Fires `on_hit` / `on_being_hit` and grants PP on hit.
    pub triggers_events: bool,
}

impl DamageSpec {
    /// The basic attack: physical, rolls accuracy and crit, triggers events.
    #[must_use]
    pub const fn basic_attack() -> Self {
        Self {
            action: OffenseAction::physical(),
            is_attack: true,
            can_crit: true,
            triggers_events: true,
        }
    }

    /// A move hit: triggers events, never crits unless opted in.
    #[must_use]
    pub const fn move_hit(action: OffenseAction) -> Self {
        Self {
            action,
            is_attack: true,
            can_crit: false,
            triggers_events: true,
        }
    }

    /// Damage from statuses and hooks: no roll, no events.
    #[must_use]
    pub const fn silent(action: OffenseAction) -> Self {
        Self {
            action,
            is_attack: false,
            can_crit: false,
            triggers_events: false,
        }
    }

    /// Opt in to critical hits.
    #[must_use]
    pub const fn with_crit(mut self) -> Self {
        self.can_crit = true;
        self
    }
}

/// Inputs to [`resolve`] besides the two combatants.
#[derive(Debug, Clone, Copy)]
pub struct DamageContext<'a> {
    /// Whether the caller rolled a critical hit.
    pub critical: bool,
    /// Multiplier applied on a critical hit.
    pub crit_multiplier: Fixed,
    /// Transforms to chain, already in [`HOOK_ORDER`].
    pub transforms: &'a [DamageTransform],
}

impl Default for DamageContext<'_> {
    fn default() -> Self {
        Self {
            critical: false,
            crit_multiplier: Fixed::from_num(3) / Fixed::from_num(2),
            transforms: &[],
        }
    }
}

/// Fraction of damage removed by a defense value.
///
/// `round(100 * def / (300 + def)) / 100`; 300 defense is exactly half.
/// Negative defense counts as zero. Computed in `i64` so every `i32`
/// defense is exact.
#[must_use]
pub fn defense_reduction(defense: i32) -> Fixed {
    let defense = i64::from(defense.max(0));
    let denominator = 300 + defense;
    // round-half-up of 100 * def / (300 + def)
    let rounded = (200 * defense + denominator) / (2 * denominator);
    percent(i32::try_from(rounded).unwrap_or(100))
}

/// Resolve the damage `attacker` deals to `defender`.
///
/// Formula:
/// ```text
/// Base       = stat * power / 100 | flat amount | true amount
/// Reduced    = Base * (1 - defense_reduction) * (1 - PercentDamageReduction)
///              * attacker outgoing effects * defender incoming effects
/// Critical   = Reduced * crit_multiplier (when rolled)
/// Hooked     = calculate_damage transforms in order
/// Final      = round(Hooked + 2), never negative
/// ```
///
/// True damage skips the reduction line.
#[must_use]
pub fn resolve(
    attacker: &Combatant,
    defender: &Combatant,
    action: &OffenseAction,
    ctx: &DamageContext<'_>,
) -> i32 {
    // Step 1: Base amount and defense
    let mut total = match *action {
        OffenseAction::TrueDamage { amount } => Fixed::from_num(amount.max(0)),
        OffenseAction::StatBased { stat, defense, power } => {
            let base = Fixed::from_num(attacker.stat(stat).max(0)).saturating_mul(percent(power.max(0)));
            mitigate(base, defender.stat(defense))
        }
        OffenseAction::FlatDamage { amount, defense } => {
            mitigate(Fixed::from_num(amount.max(0)), defender.stat(defense))
        }
    };

    // Step 2: Reduction statuses and named effects
    if !action.is_true_damage() {
        if let Some(reduction) = defender.status.value(StatusKind::PercentDamageReduction) {
            total *= (Fixed::ONE - percent(reduction.clamp(0, 100))).max(Fixed::ZERO);
        }
        total = total
            .saturating_mul(attacker.status.outgoing_multiplier())
            .saturating_mul(defender.status.incoming_multiplier());
    }

    // Step 3: Critical hit
    if ctx.critical {
        total = total.saturating_mul(ctx.crit_multiplier);
    }

    // Step 4: Hook transforms
    for transform in ctx.transforms {
        let args = DamageHookArgs {
            attacker,
            defender,
            action,
            role: transform.role,
            tier: transform.tier,
            count: transform.count,
        };
        total = (transform.hook)(&args, total);
    }

    // Step 5: Constant bonus and rounding
    let rounded = round_half_up(total.saturating_add(Fixed::from_num(DAMAGE_BONUS))).max(0);
    i32::try_from(rounded).unwrap_or(i32::MAX)
}

fn mitigate(base: Fixed, defense: i32) -> Fixed {
    base * (Fixed::ONE - defense_reduction(defense))
}

/// Chance in `[0, 1]` that an attack from `attacker` lands on `defender`.
#[must_use]
pub fn accuracy(attacker: &Combatant, defender: &Combatant) -> Fixed {
    if attacker.status.has(StatusKind::Blind) {
        return Fixed::ZERO;
    }
    let evasion = defender.status.value(StatusKind::Evasion).unwrap_or(0);
    Fixed::ONE - percent(evasion.clamp(0, 100))
}

/// Roll an accuracy check. Always hits at accuracy 1, never at 0.
pub fn roll_accuracy<R: Rng>(attacker: &Combatant, defender: &Combatant, rng: &mut R) -> bool {
    let threshold = accuracy(attacker, defender) * Fixed::from_num(10_000);
    let roll: u32 = rng.gen_range(0..10_000);
    Fixed::from_num(roll) < threshold
}

/// Roll a critical hit against the attacker's crit chance (percent).
pub fn roll_critical<R: Rng>(attacker: &Combatant, rng: &mut R) -> bool {
    let roll: u32 = rng.gen_range(0..100);
    roll < attacker.crit_chance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{BaseStats, CombatantId, Side};
    use crate::status::EffectKind;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn unit(attack: i32, defense: i32) -> Combatant {
        Combatant::new(
            CombatantId(1),
            "unit",
            Side::Ally,
            500,
            BaseStats {
                attack,
                defense,
                special_attack: attack,
                special_defense: defense,
                speed: 50,
            },
        )
    }

    fn double(_: &DamageHookArgs<'_>, total: Fixed) -> Fixed {
        total * Fixed::from_num(2)
    }

    fn add_ten(_: &DamageHookArgs<'_>, total: Fixed) -> Fixed {
        total + Fixed::from_num(10)
    }

    #[test]
    fn test_no_defense_full_damage() {
        let damage = resolve(
            &unit(100, 0),
            &unit(0, 0),
            &OffenseAction::physical(),
            &DamageContext::default(),
        );
        assert_eq!(damage, 102);
    }

    #[test]
    fn test_defense_300_halves_damage() {
        assert_eq!(defense_reduction(300), Fixed::ONE / Fixed::from_num(2));
        let damage = resolve(
            &unit(100, 0),
            &unit(0, 300),
            &OffenseAction::physical(),
            &DamageContext::default(),
        );
        assert_eq!(damage, 52);
    }

    #[test]
    fn test_negative_defense_treated_as_zero() {
        assert_eq!(defense_reduction(-50), Fixed::ZERO);
    }

    #[test]
    fn test_true_damage_ignores_defense_and_reduction() {
        let mut defender = unit(0, 300);
        defender
            .status
            .apply(StatusKind::PercentDamageReduction, Some(50), 1000, None);
        let damage = resolve(
            &unit(0, 0),
            &defender,
            &OffenseAction::TrueDamage { amount: 40 },
            &DamageContext::default(),
        );
        assert_eq!(damage, 42);
    }

    #[test]
    fn test_percent_reduction_and_effects() {
        let mut attacker = unit(100, 0);
        attacker.status.add_effect(EffectKind::Enraged, 50, 1000);
        let mut defender = unit(0, 0);
        defender
            .status
            .apply(StatusKind::PercentDamageReduction, Some(50), 1000, None);

        // 100 * 0.5 * 1.5 + 2
        let damage = resolve(
            &attacker,
            &defender,
            &OffenseAction::physical(),
            &DamageContext::default(),
        );
        assert_eq!(damage, 77);
    }

    #[test]
    fn test_critical_multiplies_after_reduction() {
        let ctx = DamageContext {
            critical: true,
            crit_multiplier: Fixed::from_num(2),
            transforms: &[],
        };
        let damage = resolve(&unit(100, 0), &unit(0, 300), &OffenseAction::physical(), &ctx);
        assert_eq!(damage, 102);
    }

    #[test]
    fn test_transforms_chain_in_order() {
        let transforms = [
            DamageTransform {
                hook: add_ten,
                role: HookRole::Attacker,
                tier: 1,
                count: 2,
            },
            DamageTransform {
                hook: double,
                role: HookRole::Defender,
                tier: 1,
                count: 2,
            },
        ];
        let ctx = DamageContext {
            transforms: &transforms,
            ..DamageContext::default()
        };
        // (100 + 10) * 2 + 2
        let damage = resolve(&unit(100, 0), &unit(0, 0), &OffenseAction::physical(), &ctx);
        assert_eq!(damage, 222);
    }

    #[test]
    fn test_flat_damage_uses_defense_stat() {
        let action = OffenseAction::FlatDamage {
            amount: 100,
            defense: Stat::SpecialDefense,
        };
        let damage = resolve(&unit(0, 0), &unit(0, 300), &action, &DamageContext::default());
        assert_eq!(damage, 52);
    }

    #[test]
    fn test_blind_never_hits_and_no_evasion_always_hits() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut blind = unit(100, 0);
        blind.status.apply(StatusKind::Blind, None, 1000, None);
        let defender = unit(0, 0);

        for _ in 0..200 {
            assert!(!roll_accuracy(&blind, &defender, &mut rng));
            assert!(roll_accuracy(&unit(100, 0), &defender, &mut rng));
        }
    }

    #[test]
    fn test_evasion_lowers_accuracy() {
        let mut defender = unit(0, 0);
        defender.status.apply(StatusKind::Evasion, Some(25), 1000, None);
        assert_eq!(
            accuracy(&unit(1, 0), &defender),
            Fixed::from_num(3) / Fixed::from_num(4)
        );
    }

    #[test]
    fn test_crit_chance_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut never = unit(1, 0);
        never.crit_chance = 0;
        let mut always = unit(1, 0);
        always.crit_chance = 100;
        for _ in 0..100 {
            assert!(!roll_critical(&never, &mut rng));
            assert!(roll_critical(&always, &mut rng));
        }
    }
}
