//! Error types for the combat simulation.

use thiserror::Error;

use crate::combatant::CombatantId;
use crate::grid::Coord;

/// Result type alias using [`BattleError`].
pub type Result<T> = std::result::Result<T, BattleError>;

/// Top-level error type for all combat simulation errors.
///
/// Recoverable situations (no target, no path, a move with nothing to hit)
/// never surface here; they are handled by re-scheduling the combatant.
/// Only configuration problems and broken invariants do.
#[derive(Debug, Error)]
pub enum BattleError {
    /// A coordinate lies outside the grid.
    #[error("Coordinate {0} is outside the grid")]
    OutOfBounds(Coord),

    /// Attempted to place a combatant into an occupied cell.
    #[error("Cell {0} is already occupied")]
    CellOccupied(Coord),

    /// A combatant id is not present on the grid.
    #[error("Combatant not found: {0}")]
    CombatantNotFound(CombatantId),

    /// A combatant refers to a move key that is not registered.
    #[error("Unknown move '{0}'")]
    UnknownMove(String),

    /// Data file parsing error.
    #[error("Failed to parse data '{source_name}': {message}")]
    DataParseError {
        /// Name of the document that failed to parse.
        source_name: String,
        /// Error message.
        message: String,
    },

    /// Combat state broke one of its invariants.
    ///
    /// Continuing would risk an endless loop or a corrupted ledger, so the
    /// run is aborted with the offending combatant named.
    #[error("Invariant violated by combatant {combatant}: {reason}")]
    InvariantViolation {
        /// The combatant whose state is inconsistent.
        combatant: CombatantId,
        /// What was wrong.
        reason: String,
    },

    /// Invalid combat state.
    #[error("Invalid combat state: {0}")]
    InvalidState(String),
}
