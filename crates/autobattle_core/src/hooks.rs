//! The hook surface shared by team synergies and passive moves.
//!
//! Hooks are plain function pointers grouped in a [`HookSet`]. Event hooks
//! get a read-only [`HookCtx`] and push [`HookEffect`] commands; the combat
//! driver applies those once the hook has returned, so a hook never sees a
//! half-applied change. `calculate_damage` is different: it is a pure
//! transform of the running damage total.

use serde::{Deserialize, Serialize};

use crate::combatant::{Combatant, CombatantId, Side, Stat};
use crate::damage::{DamageSpec, OffenseAction};
use crate::grid::Grid;
use crate::math::Fixed;
use crate::moves::MoveId;
use crate::status::{EffectKind, StatusKind};

/// Whose side of a damage event a transform runs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookRole {
    /// The hook belongs to the attacking side.
    Attacker,
    /// The hook belongs to the defending side.
    Defender,
}

/// Arguments to a `calculate_damage` hook.
#[derive(Debug, Clone, Copy)]
pub struct DamageHookArgs<'a> {
    /// The combatant dealing damage.
    pub attacker: &'a Combatant,
    /// The combatant receiving damage.
    pub defender: &'a Combatant,
    /// The action being resolved.
    pub action: &'a OffenseAction,
    /// Which side the hook is running for.
    pub role: HookRole,
    /// Synergy tier (1 for passives).
    pub tier: u32,
    /// Synergy activation count (1 for passives).
    pub count: u32,
}

/// Damage transform: takes the running total, returns the new total.
pub type CalculateDamageFn = fn(&DamageHookArgs<'_>, Fixed) -> Fixed;

/// A transform bound to its tier and role, ready to run in sequence.
#[derive(Debug, Clone, Copy)]
pub struct DamageTransform {
    /// The hook.
    pub hook: CalculateDamageFn,
    /// Side the hook runs for.
    pub role: HookRole,
    /// Tier passed to the hook.
    pub tier: u32,
    /// Count passed to the hook.
    pub count: u32,
}

/// A damage event seen by `on_hit` / `on_being_hit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitInfo {
    /// Who dealt the damage.
    pub attacker: CombatantId,
    /// Who took it.
    pub defender: CombatantId,
    /// HP actually removed.
    pub damage: i32,
    /// Whether the hit was critical.
    pub critical: bool,
}

/// A completed move seen by `on_move_use`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveUseInfo {
    /// The move's user.
    pub user: CombatantId,
    /// Which move finished.
    pub move_id: MoveId,
}

/// A death seen by `on_death`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeathInfo {
    /// Who died.
    pub dead: CombatantId,
    /// Their side.
    pub side: Side,
    /// The combatant credited with the kill, if any.
    pub killer: Option<CombatantId>,
}

/// How combat ended, from one side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundResult {
    /// This side won.
    Win,
    /// This side lost.
    Loss,
    /// Time ran out.
    Draw,
}

/// A state change requested by a hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEffect {
    /// Apply a status.
    ApplyStatus {
        /// Receiver.
        target: CombatantId,
        /// Status kind.
        kind: StatusKind,
        /// Optional magnitude.
        value: Option<i32>,
        /// Duration in ms.
        duration_ms: i64,
        /// Credited source.
        source: Option<CombatantId>,
    },
    /// Add a named effect.
    AddEffect {
        /// Receiver.
        target: CombatantId,
        /// Effect kind.
        kind: EffectKind,
        /// Magnitude in percent.
        value: i32,
        /// Duration in ms.
        duration_ms: i64,
    },
    /// Restore HP.
    Heal {
        /// Receiver.
        target: CombatantId,
        /// Amount before heal reduction.
        amount: i32,
    },
    /// Add PP.
    GainPp {
        /// Receiver.
        target: CombatantId,
        /// Amount.
        amount: u32,
    },
    /// Shift a stat stage.
    StatStage {
        /// Receiver.
        target: CombatantId,
        /// Stat.
        stat: Stat,
        /// Stage delta.
        delta: i8,
    },
    /// Add a flat stat bonus.
    FlatStat {
        /// Receiver.
        target: CombatantId,
        /// Stat.
        stat: Stat,
        /// Amount.
        amount: i32,
    },
    /// Deal damage. Never triggers `on_hit`/`on_being_hit`.
    Damage {
        /// Credited source.
        source: Option<CombatantId>,
        /// Receiver.
        target: CombatantId,
        /// How the damage resolves.
        spec: DamageSpec,
    },
    /// Grant a reward to a side, reported in the combat result.
    Reward {
        /// Receiving side.
        side: Side,
        /// Amount.
        amount: u32,
    },
}

/// Read-only view handed to event hooks, plus their output buffer.
#[derive(Debug)]
pub struct HookCtx<'a> {
    /// The board as it was when the event fired.
    pub grid: &'a Grid,
    /// The side the hook belongs to.
    pub side: Side,
    /// Holder of a passive hook; `None` for synergies.
    pub holder: Option<CombatantId>,
    /// Synergy tier (1 for passives).
    pub tier: u32,
    /// Synergy activation count (1 for passives).
    pub count: u32,
    effects: Vec<HookEffect>,
}

impl<'a> HookCtx<'a> {
    /// Create a context for one hook invocation.
    #[must_use]
    pub fn new(grid: &'a Grid, side: Side, holder: Option<CombatantId>, tier: u32, count: u32) -> Self {
        Self {
            grid,
            side,
            holder,
            tier,
            count,
            effects: Vec::new(),
        }
    }

    /// Queue a state change.
    pub fn push(&mut self, effect: HookEffect) {
        self.effects.push(effect);
    }

    /// Combatants on this hook's side, column-major.
    pub fn allies(&self) -> impl Iterator<Item = &Combatant> + '_ {
        let side = self.side;
        self.grid.occupants().filter(move |c| c.side == side)
    }

    /// Combatants on the other side, column-major.
    pub fn opponents(&self) -> impl Iterator<Item = &Combatant> + '_ {
        let side = self.side;
        self.grid.occupants().filter(move |c| c.side != side)
    }

    /// Consume the context, returning queued effects in push order.
    #[must_use]
    pub fn into_effects(self) -> Vec<HookEffect> {
        self.effects
    }
}

/// `on_hit`, `on_being_hit`.
pub type HitHook = fn(&mut HookCtx<'_>, &HitInfo);
/// `on_round_start`.
pub type RoundStartHook = fn(&mut HookCtx<'_>);
/// `on_round_end`.
pub type RoundEndHook = fn(&mut HookCtx<'_>, RoundResult);
/// `on_death`.
pub type DeathHook = fn(&mut HookCtx<'_>, &DeathInfo);
/// `on_move_use`.
pub type MoveUseHook = fn(&mut HookCtx<'_>, &MoveUseInfo);
/// `on_turn_start`; receives the combatant about to act.
pub type TurnStartHook = fn(&mut HookCtx<'_>, CombatantId);

/// The enumerated hook surface. Every field is optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookSet {
    /// After a combatant of this side deals event-triggering damage.
    pub on_hit: Option<HitHook>,
    /// After a combatant of this side takes event-triggering damage.
    pub on_being_hit: Option<HitHook>,
    /// Once at combat setup.
    pub on_round_start: Option<RoundStartHook>,
    /// Once when combat concludes.
    pub on_round_end: Option<RoundEndHook>,
    /// When any combatant dies.
    pub on_death: Option<DeathHook>,
    /// After a move's effect completes.
    pub on_move_use: Option<MoveUseHook>,
    /// Before a combatant picks its action.
    pub on_turn_start: Option<TurnStartHook>,
    /// Damage transform.
    pub calculate_damage: Option<CalculateDamageFn>,
}
