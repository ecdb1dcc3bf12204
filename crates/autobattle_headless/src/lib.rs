//! Headless combat runner for balance testing and CI verification.
//!
//! This crate wraps `autobattle_core` with the IO the core deliberately
//! leaves out:
//!
//! - **Scenario loading**: RON files from disk, plus a few built-ins
//! - **Single runs**: JSON reports with per-combatant damage totals
//! - **Batches**: many seeds in parallel with win-rate summaries
//! - **Determinism checks**: same seed, same final state hash
//!
//! # Example
//!
//! ```
//! use autobattle_core::rules::Ruleset;
//! use autobattle_headless::{runner::run_scenario, scenario::resolve};
//!
//! let rules = Ruleset::standard();
//! let scenario = resolve("duel").unwrap();
//! let report = run_scenario(&rules, &scenario, Some(3)).unwrap();
//! assert_eq!(report.metrics.seed, 3);
//! ```

pub mod batch;
pub mod metrics;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, verify_determinism, BatchConfig, BatchError, BatchResults};
pub use metrics::{BatchSummary, CombatMetrics, CombatantMetrics};
pub use runner::{run_scenario, CombatReport, HeadlessRunner, RunConfig};
pub use scenario::{load, load_ruleset, resolve, ScenarioError};
