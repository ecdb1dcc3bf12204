//! Data structures for combat setup.
//!
//! Pure data types deserialized from RON. This module performs no IO;
//! reading files is left to the headless runner.

mod scenario;

pub use scenario::{CombatantTemplate, Scenario, TeamLayout, UnitPlacement, STAT_CEILING};
