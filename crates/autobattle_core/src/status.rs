//! Per-combatant status, effect and stat-modifier bookkeeping.
//!
//! Every combatant owns a [`StatusTracker`] holding three kinds of state:
//!
//! - **Statuses** keyed by [`StatusKind`], each with an optional numeric
//!   value, a remaining duration and the combatant that applied it.
//! - **Effects** keyed by [`EffectKind`]: named, time-limited modifiers of
//!   incoming or outgoing damage.
//! - **Stat modifiers**: integer stages in `[-8, 8]` plus flat additions.
//!
//! Durations only ever move when the owning combatant's turn fires; see
//! [`StatusTracker::decay`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::combatant::{CombatantId, Stat};
use crate::math::{percent, Fixed};

/// Lowest stat stage.
pub const MIN_STAGE: i8 = -8;

/// Highest stat stage.
pub const MAX_STAGE: i8 = 8;

/// Duration used for statuses that are removed explicitly rather than by decay.
pub const UNTIL_REMOVED_MS: i64 = i64::MAX / 4;

/// Kinds of status a combatant can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    /// Skips turns while present.
    Paralyse,
    /// Skips turns while present.
    Sleep,
    /// Attacks always miss.
    Blind,
    /// Loses `value`% of max HP per decay tick.
    Poison,
    /// Cannot step toward a target.
    Immobile,
    /// Cannot gain PP.
    PpLock,
    /// Loses `value` PP per decay tick.
    PpDrain,
    /// Healing received is reduced by `value`%.
    HealReduction,
    /// Falls when the curse runs out.
    Curse,
    /// Ignores negative statuses and negative stat stages.
    StatusImmunity,
    /// Incoming damage reduced by `value`%.
    PercentDamageReduction,
    /// Attacks against this combatant miss `value`% of the time.
    Evasion,
    /// An active move is in flight; PP does not accrue.
    MoveActive,
}

impl StatusKind {
    /// Returns true for the harmful kinds blocked by [`StatusKind::StatusImmunity`].
    #[must_use]
    pub const fn is_negative(self) -> bool {
        matches!(
            self,
            Self::Paralyse
                | Self::Sleep
                | Self::Blind
                | Self::Poison
                | Self::Immobile
                | Self::PpLock
                | Self::PpDrain
                | Self::HealReduction
                | Self::Curse
        )
    }

    /// Returns true for kinds that prevent the combatant from acting.
    #[must_use]
    pub const fn is_disabling(self) -> bool {
        matches!(self, Self::Paralyse | Self::Sleep)
    }

    /// Returns true for kinds that damage their holder on behalf of a source.
    #[must_use]
    pub const fn deals_damage(self) -> bool {
        matches!(self, Self::Poison | Self::Curse)
    }
}

/// A single status entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Optional magnitude (percent for most kinds).
    pub value: Option<i32>,
    /// Milliseconds of virtual time left.
    pub remaining_ms: i64,
    /// Who applied it; used for damage attribution.
    pub source: Option<CombatantId>,
}

/// Named, time-limited damage modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    /// Outgoing damage increased by `value`%.
    Enraged,
    /// Incoming damage reduced by `value`%.
    Guarded,
    /// Incoming damage increased by `value`%.
    Exposed,
}

impl EffectKind {
    /// Multiplier this effect applies to damage its holder deals.
    #[must_use]
    pub fn outgoing_multiplier(self, value: i32) -> Fixed {
        match self {
            Self::Enraged => Fixed::ONE + percent(value),
            Self::Guarded | Self::Exposed => Fixed::ONE,
        }
    }

    /// Multiplier this effect applies to damage its holder receives.
    #[must_use]
    pub fn incoming_multiplier(self, value: i32) -> Fixed {
        match self {
            Self::Guarded => (Fixed::ONE - percent(value)).max(Fixed::ZERO),
            Self::Exposed => Fixed::ONE + percent(value),
            Self::Enraged => Fixed::ONE,
        }
    }
}

/// A single effect entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectEntry {
    /// Effect magnitude in percent.
    pub value: i32,
    /// Milliseconds of virtual time left.
    pub remaining_ms: i64,
}

/// Result of trying to apply a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The status was not present and now is.
    Applied,
    /// The status was already present and was extended or strengthened.
    Refreshed,
    /// Blocked by [`StatusKind::StatusImmunity`].
    Immune,
}

impl ApplyOutcome {
    /// Whether the status is now present.
    #[must_use]
    pub const fn took_effect(self) -> bool {
        !matches!(self, Self::Immune)
    }
}

/// Multiplier for a stat stage.
///
/// Each step is a 25% change: `(s + 4) / 4` for non-negative stages and
/// `4 / |s - 4|` for negative ones.
#[must_use]
pub fn stage_multiplier(stage: i8) -> Fixed {
    let stage = stage.clamp(MIN_STAGE, MAX_STAGE) as i32;
    if stage >= 0 {
        Fixed::from_num(stage + 4) / Fixed::const_from_int(4)
    } else {
        Fixed::const_from_int(4) / Fixed::from_num((stage - 4).abs())
    }
}

/// Stat stages for the five combat stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatStages {
    stages: [i8; Stat::COUNT],
}

impl StatStages {
    /// Current stage of a stat.
    #[must_use]
    pub fn get(&self, stat: Stat) -> i8 {
        self.stages[stat.index()]
    }

    /// Add `delta` to a stat stage, clamping to `[-8, 8]`. Returns the new stage.
    pub fn add(&mut self, stat: Stat, delta: i8) -> i8 {
        let slot = &mut self.stages[stat.index()];
        *slot = slot.saturating_add(delta).clamp(MIN_STAGE, MAX_STAGE);
        *slot
    }
}

/// Everything that changed during one decay step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecayReport {
    /// Statuses that ran out.
    pub expired: Vec<StatusKind>,
    /// Effects that ran out.
    pub expired_effects: Vec<EffectKind>,
    /// Poison percent and source, if poisoned at the start of the step.
    pub poison: Option<(i32, Option<CombatantId>)>,
    /// PP drained this step.
    pub pp_drain: Option<i32>,
    /// Set when a curse ran out; holds the curse source.
    pub curse_expired: Option<Option<CombatantId>>,
}

/// Per-combatant status, effect and stat-modifier state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTracker {
    statuses: BTreeMap<StatusKind, StatusEntry>,
    effects: BTreeMap<EffectKind, EffectEntry>,
    stages: StatStages,
    flat: [i32; Stat::COUNT],
}

impl StatusTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a status is present.
    #[must_use]
    pub fn has(&self, kind: StatusKind) -> bool {
        self.statuses.contains_key(&kind)
    }

    /// Look up a status entry.
    #[must_use]
    pub fn get(&self, kind: StatusKind) -> Option<&StatusEntry> {
        self.statuses.get(&kind)
    }

    /// The numeric value of a status, if present and valued.
    #[must_use]
    pub fn value(&self, kind: StatusKind) -> Option<i32> {
        self.statuses.get(&kind).and_then(|entry| entry.value)
    }

    /// Iterate over statuses in kind order.
    pub fn statuses(&self) -> impl Iterator<Item = (&StatusKind, &StatusEntry)> {
        self.statuses.iter()
    }

    /// Whether the combatant is prevented from acting.
    #[must_use]
    pub fn is_stunned(&self) -> bool {
        self.has(StatusKind::Paralyse) || self.has(StatusKind::Sleep)
    }

    /// Whether negative statuses and stages are ignored.
    #[must_use]
    pub fn is_immune(&self) -> bool {
        self.has(StatusKind::StatusImmunity)
    }

    /// Apply a status.
    ///
    /// Negative kinds are rejected under [`StatusKind::StatusImmunity`]. If the
    /// status is already present the longer duration and the larger value
    /// are kept.
    pub fn apply(
        &mut self,
        kind: StatusKind,
        value: Option<i32>,
        duration_ms: i64,
        source: Option<CombatantId>,
    ) -> ApplyOutcome {
        if kind.is_negative() && self.is_immune() {
            return ApplyOutcome::Immune;
        }

        match self.statuses.get_mut(&kind) {
            Some(existing) => {
                existing.remaining_ms = existing.remaining_ms.max(duration_ms);
                existing.value = match (existing.value, value) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                if source.is_some() {
                    existing.source = source;
                }
                ApplyOutcome::Refreshed
            }
            None => {
                self.statuses.insert(
                    kind,
                    StatusEntry {
                        value,
                        remaining_ms: duration_ms,
                        source,
                    },
                );
                ApplyOutcome::Applied
            }
        }
    }

    /// Remove a status immediately.
    pub fn remove(&mut self, kind: StatusKind) -> Option<StatusEntry> {
        self.statuses.remove(&kind)
    }

    /// Add or refresh a named effect.
    pub fn add_effect(&mut self, kind: EffectKind, value: i32, duration_ms: i64) {
        let entry = self.effects.entry(kind).or_insert(EffectEntry {
            value,
            remaining_ms: duration_ms,
        });
        entry.value = entry.value.max(value);
        entry.remaining_ms = entry.remaining_ms.max(duration_ms);
    }

    /// Look up an effect entry.
    #[must_use]
    pub fn effect(&self, kind: EffectKind) -> Option<&EffectEntry> {
        self.effects.get(&kind)
    }

    /// Iterate over effects in kind order.
    pub fn effects(&self) -> impl Iterator<Item = (&EffectKind, &EffectEntry)> {
        self.effects.iter()
    }

    /// Combined multiplier of all effects on outgoing damage.
    #[must_use]
    pub fn outgoing_multiplier(&self) -> Fixed {
        self.effects
            .iter()
            .fold(Fixed::ONE, |acc, (kind, entry)| {
                acc.saturating_mul(kind.outgoing_multiplier(entry.value))
            })
    }

    /// Combined multiplier of all effects on incoming damage.
    #[must_use]
    pub fn incoming_multiplier(&self) -> Fixed {
        self.effects
            .iter()
            .fold(Fixed::ONE, |acc, (kind, entry)| {
                acc.saturating_mul(kind.incoming_multiplier(entry.value))
            })
    }

    /// Current stage of a stat.
    #[must_use]
    pub fn stage(&self, stat: Stat) -> i8 {
        self.stages.get(stat)
    }

    /// Shift a stat stage, clamped to `[-8, 8]`. Returns the new stage.
    pub fn add_stage(&mut self, stat: Stat, delta: i8) -> i8 {
        self.stages.add(stat, delta)
    }

    /// Stage multiplier for a stat, treating negative stages as neutral
    /// while immune.
    #[must_use]
    pub fn stage_multiplier(&self, stat: Stat) -> Fixed {
        let stage = self.stages.get(stat);
        if stage < 0 && self.is_immune() {
            Fixed::ONE
        } else {
            stage_multiplier(stage)
        }
    }

    /// Flat addition to a stat.
    #[must_use]
    pub fn flat(&self, stat: Stat) -> i32 {
        self.flat[stat.index()]
    }

    /// Add a flat bonus (or malus) to a stat.
    pub fn add_flat(&mut self, stat: Stat, amount: i32) {
        let slot = &mut self.flat[stat.index()];
        *slot = slot.saturating_add(amount);
    }

    /// Advance every status and effect by `elapsed_ms`.
    ///
    /// Durations drop by exactly `elapsed_ms`; entries at or below zero are
    /// removed. Poison and PP drain report a tick if they were present when
    /// the step began, including on the step where they expire.
    pub fn decay(&mut self, elapsed_ms: i64) -> DecayReport {
        let mut report = DecayReport::default();

        if let Some(entry) = self.statuses.get(&StatusKind::Poison) {
            report.poison = Some((entry.value.unwrap_or(0), entry.source));
        }
        if let Some(entry) = self.statuses.get(&StatusKind::PpDrain) {
            report.pp_drain = Some(entry.value.unwrap_or(0));
        }

        let mut curse_source = None;
        self.statuses.retain(|kind, entry| {
            entry.remaining_ms = entry.remaining_ms.saturating_sub(elapsed_ms);
            if entry.remaining_ms <= 0 {
                if *kind == StatusKind::Curse {
                    curse_source = Some(entry.source);
                }
                report.expired.push(*kind);
                false
            } else {
                true
            }
        });
        report.curse_expired = curse_source;

        self.effects.retain(|kind, entry| {
            entry.remaining_ms = entry.remaining_ms.saturating_sub(elapsed_ms);
            if entry.remaining_ms <= 0 {
                report.expired_effects.push(*kind);
                false
            } else {
                true
            }
        });

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::CombatantId;

    #[test]
    fn test_stage_multiplier_table() {
        assert_eq!(stage_multiplier(0), Fixed::ONE);
        assert_eq!(stage_multiplier(4), Fixed::from_num(2));
        assert_eq!(stage_multiplier(8), Fixed::from_num(3));
        assert_eq!(stage_multiplier(-4), Fixed::ONE / Fixed::from_num(2));
        assert_eq!(stage_multiplier(-8), Fixed::ONE / Fixed::from_num(3));
        // Out-of-range input is clamped
        assert_eq!(stage_multiplier(20), Fixed::from_num(3));
    }

    #[test]
    fn test_stages_clamp() {
        let mut tracker = StatusTracker::new();
        assert_eq!(tracker.add_stage(Stat::Attack, 6), 6);
        assert_eq!(tracker.add_stage(Stat::Attack, 6), MAX_STAGE);
        assert_eq!(tracker.add_stage(Stat::Defense, -100), MIN_STAGE);
    }

    #[test]
    fn test_immunity_blocks_negative_status() {
        let mut tracker = StatusTracker::new();
        tracker.apply(StatusKind::StatusImmunity, None, 5000, None);

        for kind in [
            StatusKind::Paralyse,
            StatusKind::Sleep,
            StatusKind::Blind,
            StatusKind::Poison,
            StatusKind::Immobile,
            StatusKind::PpLock,
            StatusKind::PpDrain,
            StatusKind::HealReduction,
            StatusKind::Curse,
        ] {
            assert_eq!(tracker.apply(kind, Some(10), 1000, None), ApplyOutcome::Immune);
            assert!(!tracker.has(kind));
        }

        // Positive kinds still apply
        let outcome = tracker.apply(StatusKind::PercentDamageReduction, Some(20), 1000, None);
        assert_eq!(outcome, ApplyOutcome::Applied);
    }

    #[test]
    fn test_immunity_neutralizes_negative_stages_only() {
        let mut tracker = StatusTracker::new();
        tracker.add_stage(Stat::Attack, -4);
        tracker.add_stage(Stat::Speed, 4);
        tracker.apply(StatusKind::StatusImmunity, None, 5000, None);

        assert_eq!(tracker.stage_multiplier(Stat::Attack), Fixed::ONE);
        assert_eq!(tracker.stage_multiplier(Stat::Speed), Fixed::from_num(2));
    }

    #[test]
    fn test_reapply_keeps_longer_and_stronger() {
        let mut tracker = StatusTracker::new();
        tracker.apply(StatusKind::Poison, Some(5), 3000, None);
        let outcome = tracker.apply(StatusKind::Poison, Some(3), 1000, None);
        assert_eq!(outcome, ApplyOutcome::Refreshed);

        let entry = tracker.get(StatusKind::Poison).unwrap();
        assert_eq!(entry.value, Some(5));
        assert_eq!(entry.remaining_ms, 3000);
    }

    #[test]
    fn test_decay_removes_exactly_at_zero() {
        let mut tracker = StatusTracker::new();
        tracker.apply(StatusKind::Blind, None, 1000, None);

        let report = tracker.decay(400);
        assert!(report.expired.is_empty());
        assert_eq!(tracker.get(StatusKind::Blind).unwrap().remaining_ms, 600);

        let report = tracker.decay(600);
        assert_eq!(report.expired, vec![StatusKind::Blind]);
        assert!(!tracker.has(StatusKind::Blind));
    }

    #[test]
    fn test_decay_reports_poison_on_final_tick() {
        let mut tracker = StatusTracker::new();
        tracker.apply(StatusKind::Poison, Some(10), 500, Some(CombatantId(7)));

        let report = tracker.decay(500);
        assert_eq!(report.poison, Some((10, Some(CombatantId(7)))));
        assert!(!tracker.has(StatusKind::Poison));
    }

    #[test]
    fn test_curse_expiry_reports_source() {
        let mut tracker = StatusTracker::new();
        tracker.apply(StatusKind::Curse, None, 300, Some(CombatantId(3)));
        assert_eq!(tracker.decay(100).curse_expired, None);
        assert_eq!(tracker.decay(200).curse_expired, Some(Some(CombatantId(3))));
    }

    #[test]
    fn test_effect_multipliers() {
        let mut tracker = StatusTracker::new();
        tracker.add_effect(EffectKind::Enraged, 50, 1000);
        tracker.add_effect(EffectKind::Guarded, 25, 1000);

        assert_eq!(tracker.outgoing_multiplier(), Fixed::from_num(3) / Fixed::from_num(2));
        assert_eq!(tracker.incoming_multiplier(), Fixed::from_num(3) / Fixed::from_num(4));

        let report = tracker.decay(1000);
        assert_eq!(report.expired_effects.len(), 2);
        assert_eq!(tracker.outgoing_multiplier(), Fixed::ONE);
    }
}
