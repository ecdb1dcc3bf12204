//! The static rule tables a combat runs against.

use crate::combatant::Combatant;
use crate::damage::HOOK_ORDER;
use crate::hooks::{DamageTransform, HookRole, HookSet};
use crate::moves::MoveRegistry;
use crate::synergy::{ActiveSynergy, SynergyRegistry};

/// Move and synergy tables, built once and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    /// Move definitions.
    pub moves: MoveRegistry,
    /// Synergy definitions.
    pub synergies: SynergyRegistry,
}

impl Ruleset {
    /// The built-in tables.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            moves: MoveRegistry::standard(),
            synergies: SynergyRegistry::standard(),
        }
    }

    /// Passive hooks of a combatant, if its move is passive.
    #[must_use]
    pub fn passive_hooks(&self, combatant: &Combatant) -> Option<&HookSet> {
        combatant
            .move_id
            .and_then(|id| self.moves.get(id))
            .and_then(|m| m.passive_hooks())
    }

    /// The `calculate_damage` chain for one damage event, in [`HOOK_ORDER`].
    ///
    /// For each role: that side's synergies in activation order, then the
    /// combatant's passive.
    #[must_use]
    pub fn damage_transforms(
        &self,
        attacker: &Combatant,
        attacker_synergies: &[ActiveSynergy],
        defender: &Combatant,
        defender_synergies: &[ActiveSynergy],
    ) -> Vec<DamageTransform> {
        let mut transforms = Vec::new();
        for role in HOOK_ORDER {
            let (unit, synergies) = match role {
                HookRole::Attacker => (attacker, attacker_synergies),
                HookRole::Defender => (defender, defender_synergies),
            };
            for active in synergies {
                let hook = self
                    .synergies
                    .get(active.kind)
                    .and_then(|def| def.hooks.calculate_damage);
                if let Some(hook) = hook {
                    transforms.push(DamageTransform {
                        hook,
                        role,
                        tier: active.tier,
                        count: active.count,
                    });
                }
            }
            if let Some(hook) = self.passive_hooks(unit).and_then(|h| h.calculate_damage) {
                transforms.push(DamageTransform {
                    hook,
                    role,
                    tier: 1,
                    count: 1,
                });
            }
        }
        transforms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{BaseStats, CombatantId, Side};
    use crate::moves::MoveId;
    use crate::synergy::SynergyKind;

    #[test]
    fn test_transform_order_attacker_first() {
        let rules = Ruleset::standard();
        let attacker = Combatant::new(CombatantId(1), "a", Side::Ally, 100, BaseStats::default());
        let mut defender =
            Combatant::new(CombatantId(2), "d", Side::Enemy, 100, BaseStats::default());
        defender.move_id = Some(MoveId::Sturdy);

        let ally_synergies = rules
            .synergies
            .activate(&[(SynergyKind::Fire, 2), (SynergyKind::Dragon, 3)]);
        let enemy_synergies = rules.synergies.activate(&[(SynergyKind::Rock, 2)]);

        let chain = rules.damage_transforms(&attacker, &ally_synergies, &defender, &enemy_synergies);
        let roles: Vec<HookRole> = chain.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![
                HookRole::Attacker,
                HookRole::Attacker,
                HookRole::Defender,
                HookRole::Defender
            ]
        );
    }
}
