//! Combat events and the presentation boundary.
//!
//! The core never renders anything. It reports what happened as
//! [`CombatEvent`]s to a [`Presentation`] and asks it how long a move's
//! choreography lasts.

use serde::{Deserialize, Serialize};

use crate::combatant::{CombatantId, Side};
use crate::grid::Coord;
use crate::ledger::Outcome;
use crate::moves::{ActiveMove, MoveId};
use crate::status::StatusKind;

/// Something observable that happened during combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// Combat began with these team sizes.
    Started {
        /// Allies on the board.
        allies: usize,
        /// Enemies on the board.
        enemies: usize,
    },
    /// A stunned combatant lost its turn.
    TurnSkipped {
        /// Who.
        combatant: CombatantId,
    },
    /// A combatant had nothing to do this turn.
    Waited {
        /// Who.
        combatant: CombatantId,
    },
    /// A combatant stepped to a new cell.
    Moved {
        /// Who.
        combatant: CombatantId,
        /// Old cell.
        from: Coord,
        /// New cell.
        to: Coord,
    },
    /// A basic attack was thrown.
    Attacked {
        /// Attacker.
        attacker: CombatantId,
        /// Target.
        target: CombatantId,
    },
    /// An attack failed its accuracy roll.
    Missed {
        /// Attacker.
        attacker: CombatantId,
        /// Target.
        target: CombatantId,
    },
    /// HP was removed.
    Damaged {
        /// Credited source.
        source: Option<CombatantId>,
        /// Receiver.
        target: CombatantId,
        /// HP removed.
        amount: i32,
        /// Whether it was a critical hit.
        critical: bool,
    },
    /// HP was restored.
    Healed {
        /// Receiver.
        target: CombatantId,
        /// HP restored.
        amount: i32,
    },
    /// A status took hold.
    StatusApplied {
        /// Receiver.
        target: CombatantId,
        /// Kind.
        kind: StatusKind,
    },
    /// A status ran out.
    StatusExpired {
        /// Holder.
        target: CombatantId,
        /// Kind.
        kind: StatusKind,
    },
    /// A move began casting.
    MoveStarted {
        /// User.
        user: CombatantId,
        /// Move.
        move_id: MoveId,
        /// Target cell.
        target: Coord,
    },
    /// A move finished.
    MoveCompleted {
        /// User.
        user: CombatantId,
        /// Move.
        move_id: MoveId,
    },
    /// A move was interrupted.
    MoveCancelled {
        /// User.
        user: CombatantId,
    },
    /// A new combatant joined the board.
    Summoned {
        /// Summoner.
        owner: CombatantId,
        /// New combatant.
        summon: CombatantId,
        /// Where it appeared.
        at: Coord,
    },
    /// A combatant fell.
    Died {
        /// Who.
        combatant: CombatantId,
        /// Their side.
        side: Side,
    },
    /// Combat concluded.
    Ended {
        /// Result.
        outcome: Outcome,
    },
}

/// An event stamped with the virtual time it happened at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// Virtual time in ms.
    pub at_ms: i64,
    /// The event.
    pub event: CombatEvent,
}

/// The rendering collaborator.
pub trait Presentation {
    /// Observe an event. The default ignores it.
    fn on_event(&mut self, _at_ms: i64, _event: &CombatEvent) {}

    /// How long a move takes before its completion fires.
    ///
    /// Values shorter than the move's last effect step are stretched to
    /// cover it.
    fn move_duration_ms(&self, _move_id: MoveId, definition: &ActiveMove) -> i64 {
        definition.duration_ms()
    }
}

/// A presentation that shows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPresentation;

impl Presentation for NullPresentation {}
