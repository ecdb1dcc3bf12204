//! # Autobattle Core
//!
//! Deterministic combat simulation for a grid-based auto-battler.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! Given the same rule tables, scenario and seed, a combat produces the same
//! event sequence and the same [`CombatEnd`](ledger::CombatEnd) on every
//! machine. That makes it usable for headless balance runs, replays and
//! server-side verification.
//!
//! ## Crate Structure
//!
//! - [`grid`] - The board and its occupancy index
//! - [`targeting`] - Spiral search, target rules and pathfinding
//! - [`aoe`] - Area shapes and best-cell search
//! - [`status`] - Timed statuses, effects and stat stages
//! - [`damage`] - The damage pipeline, accuracy and crits
//! - [`hooks`] - Hook signatures and the effects they emit
//! - [`moves`] / [`synergy`] - The built-in rule tables
//! - [`scheduler`] - Virtual-time event queue with cancellation
//! - [`combat`] - The combat driver
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod aoe;
pub mod combat;
pub mod combatant;
pub mod config;
pub mod damage;
pub mod data;
pub mod error;
pub mod events;
pub mod grid;
pub mod hooks;
pub mod ledger;
pub mod math;
pub mod moves;
pub mod rules;
pub mod scheduler;
pub mod status;
pub mod synergy;
pub mod targeting;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::aoe::{AoeShape, Affinity};
    pub use crate::combat::{turn_delay, Combat};
    pub use crate::combatant::{BaseStats, Combatant, CombatantId, Resource, Side, Stat};
    pub use crate::config::CombatConfig;
    pub use crate::damage::{DamageSpec, OffenseAction};
    pub use crate::data::{CombatantTemplate, Scenario, TeamLayout, UnitPlacement};
    pub use crate::error::{BattleError, Result};
    pub use crate::events::{CombatEvent, LoggedEvent, NullPresentation, Presentation};
    pub use crate::grid::{Coord, Grid};
    pub use crate::hooks::{HookEffect, HookSet, RoundResult};
    pub use crate::ledger::{CombatEnd, DamageLedger, LedgerEntry, Outcome};
    pub use crate::math::Fixed;
    pub use crate::moves::{ActiveMove, Move, MoveId, MoveRegistry};
    pub use crate::rules::Ruleset;
    pub use crate::status::{StatusKind, StatusTracker};
    pub use crate::synergy::{ActiveSynergy, SynergyKind, SynergyRegistry};
}
