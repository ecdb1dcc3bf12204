//! Batch combat runner for balance testing.
//!
//! Runs one scenario over a range of seeds in parallel using rayon. Each
//! combat is single-threaded and owns its state, so games never share
//! anything but the rule set.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use autobattle_core::combatant::Side;
use autobattle_core::data::Scenario;
use autobattle_core::rules::Ruleset;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metrics::{BatchSummary, CombatMetrics};
use crate::runner::run_scenario;

/// Error type for batch persistence.
#[derive(Error, Debug)]
pub enum BatchError {
    /// Filesystem failure.
    #[error("Batch IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed results file.
    #[error("Batch results are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The thread pool could not be built.
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Configuration for a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario name, for the report.
    pub scenario: String,
    /// Number of combats to run.
    pub game_count: u32,
    /// Maximum parallel combats (0 = use rayon default).
    pub parallel_games: u32,
    /// Output directory for results.
    pub output_dir: PathBuf,
    /// First seed; game `i` uses `seed_start + i`.
    pub seed_start: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "skirmish".to_string(),
            game_count: 100,
            parallel_games: 0,
            output_dir: PathBuf::from("results"),
            seed_start: 0,
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario.
    pub fn new(scenario: &str, game_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            game_count,
            ..Default::default()
        }
    }

    /// Set output directory.
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Cap the number of parallel combats.
    pub fn with_parallelism(mut self, threads: u32) -> Self {
        self.parallel_games = threads;
        self
    }

    /// Seed for the game at `index`.
    pub fn seed_for(&self, index: u32) -> u64 {
        self.seed_start.wrapping_add(u64::from(index))
    }
}

/// A combat that failed to finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameFailure {
    /// Game index.
    pub game_index: u32,
    /// Seed used.
    pub seed: u64,
    /// Error message.
    pub message: String,
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used.
    pub config: BatchConfig,
    /// Individual combat metrics, in seed order.
    pub games: Vec<CombatMetrics>,
    /// Aggregate summary.
    pub summary: BatchSummary,
    /// Total runtime.
    pub duration_seconds: f64,
    /// Combats that failed.
    pub errors: Vec<GameFailure>,
}

impl BatchResults {
    /// Save results to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), BatchError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load results from a JSON file.
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Progress tracking for batch runs.
#[derive(Debug)]
pub struct BatchProgress {
    /// Total games.
    pub total: u32,
    completed: AtomicU32,
    start_time: Instant,
    partial_wins: Mutex<BTreeMap<Side, u32>>,
}

impl BatchProgress {
    /// Create new progress tracker.
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: AtomicU32::new(0),
            start_time: Instant::now(),
            partial_wins: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record a completed game.
    pub fn record_completion(&self, winner: Option<Side>) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if let Some(side) = winner {
            if let Ok(mut wins) = self.partial_wins.lock() {
                *wins.entry(side).or_insert(0) += 1;
            }
        }
    }

    /// Current completion count.
    pub fn current(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Completion percentage.
    pub fn percentage(&self) -> f64 {
        f64::from(self.current()) / f64::from(self.total.max(1)) * 100.0
    }

    /// Estimated time remaining.
    pub fn eta(&self) -> Duration {
        let completed = self.current();
        if completed == 0 {
            return Duration::from_secs(0);
        }
        let per_game = self.start_time.elapsed().as_secs_f64() / f64::from(completed);
        let remaining = self.total.saturating_sub(completed);
        Duration::from_secs_f64(per_game * f64::from(remaining))
    }

    /// Win rates among the games finished so far.
    pub fn current_win_rates(&self) -> BTreeMap<Side, f64> {
        let completed = self.current();
        if completed == 0 {
            return BTreeMap::new();
        }
        match self.partial_wins.lock() {
            Ok(wins) => wins
                .iter()
                .map(|(side, n)| (*side, f64::from(*n) / f64::from(completed)))
                .collect(),
            Err(_) => BTreeMap::new(),
        }
    }

    /// Log progress.
    pub fn display(&self) {
        let eta = self.eta();
        let rates = self.current_win_rates();
        info!(
            completed = self.current(),
            total = self.total,
            percent = format!("{:.1}", self.percentage()),
            eta = format!("{}m {}s", eta.as_secs() / 60, eta.as_secs() % 60),
            win_rates = ?rates,
            "Batch progress"
        );
    }
}

/// Run a batch of combats over consecutive seeds.
///
/// Individual failures are collected, not propagated.
///
/// # Errors
///
/// Fails only if a dedicated thread pool was requested and could not be
/// built.
pub fn run_batch(rules: &Ruleset, scenario: &Scenario, config: BatchConfig) -> Result<BatchResults, BatchError> {
    let start = Instant::now();
    let progress = BatchProgress::new(config.game_count);

    info!(
        "Starting batch run: {} games of '{}'",
        config.game_count, config.scenario
    );

    let play = || -> Vec<Result<CombatMetrics, GameFailure>> {
        (0..config.game_count)
            .into_par_iter()
            .map(|i| {
                let seed = config.seed_for(i);
                match run_scenario(rules, scenario, Some(seed)) {
                    Ok(report) => {
                        progress.record_completion(report.metrics.winner());
                        let completed = progress.current();
                        if completed % 10 == 0 {
                            debug!("Progress: {}/{}", completed, config.game_count);
                        }
                        if completed % 100 == 0 {
                            progress.display();
                        }
                        Ok(report.metrics)
                    }
                    Err(e) => {
                        warn!(game = i, seed, error = %e, "Combat failed");
                        Err(GameFailure {
                            game_index: i,
                            seed,
                            message: e.to_string(),
                        })
                    }
                }
            })
            .collect()
    };

    let results = if config.parallel_games > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_games as usize)
            .build()?
            .install(play)
    } else {
        play()
    };

    let (games, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let games: Vec<CombatMetrics> = games.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<GameFailure> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} games in {:.1}s ({:.1} games/sec)",
        games.len(),
        duration_seconds,
        games.len() as f64 / duration_seconds.max(f64::EPSILON)
    );

    Ok(BatchResults {
        config,
        games,
        summary,
        duration_seconds,
        errors,
    })
}

/// Outcome of running one seed several times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterminismCheck {
    /// Seed checked.
    pub seed: u64,
    /// Final state hash of each run.
    pub hashes: Vec<u64>,
    /// All runs agreed on hash, outcome and duration.
    pub is_deterministic: bool,
}

/// Verify determinism by running the same seed several times in parallel.
///
/// # Errors
///
/// Propagates the first combat failure.
pub fn verify_determinism(
    rules: &Ruleset,
    scenario: &Scenario,
    seed: u64,
    runs: u32,
) -> autobattle_core::error::Result<DeterminismCheck> {
    let results = (0..runs.max(1))
        .into_par_iter()
        .map(|_| run_scenario(rules, scenario, Some(seed)).map(|r| r.metrics))
        .collect::<autobattle_core::error::Result<Vec<CombatMetrics>>>()?;

    let is_deterministic = results.windows(2).all(|pair| pair[0] == pair[1]);
    Ok(DeterminismCheck {
        seed,
        hashes: results.iter().map(|r| r.state_hash).collect(),
        is_deterministic,
    })
}
