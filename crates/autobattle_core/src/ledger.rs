//! Damage attribution and the combat result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::combatant::{CombatantId, Side};

/// Totals for one combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// The combatant's side.
    pub side: Side,
    /// Damage credited to this combatant.
    pub dealt: i64,
    /// Damage this combatant took.
    pub taken: i64,
    /// Healing this combatant received.
    pub healed: i64,
}

/// Per-combatant damage accounting, keyed by id.
///
/// Entries outlive the combatants they describe so the surrounding game can
/// score fallen units too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageLedger {
    entries: BTreeMap<CombatantId, LedgerEntry>,
}

impl DamageLedger {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zeroed entry if the id is new.
    pub fn register(&mut self, id: CombatantId, side: Side) {
        self.entries.entry(id).or_insert(LedgerEntry {
            side,
            dealt: 0,
            taken: 0,
            healed: 0,
        });
    }

    /// Record HP removed from `target`, credited to `source` when known.
    pub fn record_damage(&mut self, source: Option<CombatantId>, target: CombatantId, amount: i32) {
        if amount <= 0 {
            return;
        }
        if let Some(entry) = self.entries.get_mut(&target) {
            entry.taken += i64::from(amount);
        }
        if let Some(entry) = source.and_then(|id| self.entries.get_mut(&id)) {
            entry.dealt += i64::from(amount);
        }
    }

    /// Record HP restored to `target`.
    pub fn record_heal(&mut self, target: CombatantId, amount: i32) {
        if amount <= 0 {
            return;
        }
        if let Some(entry) = self.entries.get_mut(&target) {
            entry.healed += i64::from(amount);
        }
    }

    /// Totals for one combatant.
    #[must_use]
    pub fn get(&self, id: CombatantId) -> Option<&LedgerEntry> {
        self.entries.get(&id)
    }

    /// All entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&CombatantId, &LedgerEntry)> {
        self.entries.iter()
    }

    /// Damage dealt by everyone on a side.
    #[must_use]
    pub fn dealt_by(&self, side: Side) -> i64 {
        self.entries
            .values()
            .filter(|e| e.side == side)
            .map(|e| e.dealt)
            .sum()
    }

    /// Damage taken by everyone on a side.
    #[must_use]
    pub fn taken_by(&self, side: Side) -> i64 {
        self.entries
            .values()
            .filter(|e| e.side == side)
            .map(|e| e.taken)
            .sum()
    }
}

/// How a combat ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// One side eliminated the other.
    Winner(Side),
    /// The clock ran out.
    Draw,
}

/// The combat-end signal handed to the surrounding game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatEnd {
    /// Winner or draw.
    pub outcome: Outcome,
    /// Damage attribution.
    pub ledger: DamageLedger,
    /// Rewards granted by end-of-round hooks.
    pub rewards: BTreeMap<Side, u32>,
    /// Virtual time elapsed.
    pub elapsed_ms: i64,
    /// Wall-clock length once the end-of-round speed-up is applied.
    pub real_time_ms: i64,
    /// Hash of the final state.
    pub state_hash: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damage_credits_both_sides() {
        let mut ledger = DamageLedger::new();
        ledger.register(CombatantId(1), Side::Ally);
        ledger.register(CombatantId(2), Side::Enemy);

        ledger.record_damage(Some(CombatantId(1)), CombatantId(2), 30);
        ledger.record_damage(Some(CombatantId(2)), CombatantId(1), 12);
        ledger.record_damage(None, CombatantId(2), 5);

        assert_eq!(ledger.get(CombatantId(1)).unwrap().dealt, 30);
        assert_eq!(ledger.get(CombatantId(2)).unwrap().taken, 35);
        assert_eq!(ledger.dealt_by(Side::Ally), 30);
        assert_eq!(ledger.taken_by(Side::Ally), 12);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut ledger = DamageLedger::new();
        ledger.register(CombatantId(1), Side::Ally);
        ledger.record_heal(CombatantId(1), 7);
        ledger.register(CombatantId(1), Side::Ally);
        assert_eq!(ledger.get(CombatantId(1)).unwrap().healed, 7);
    }
}
