//! Headless auto-battler combat runner.
//!
//! Runs combats without graphics for balance testing and CI.
//!
//! # Usage
//!
//! ```bash
//! # Run one built-in scenario and print the report
//! cargo run -p autobattle_headless -- run --scenario duel --events
//!
//! # Run a scenario file over 1000 seeds
//! cargo run -p autobattle_headless -- batch --scenario my_board.ron --count 1000 --output results/
//!
//! # Verify the same seed always produces the same combat
//! cargo run -p autobattle_headless -- verify --scenario skirmish --seed 12345 --runs 5
//!
//! # Validate scenario files
//! cargo run -p autobattle_headless -- check boards/*.ron
//! ```
//!
//! # Output
//!
//! Reports (stdout): JSON
//! Logs (stderr): tracing output, filtered by `RUST_LOG`

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use autobattle_core::rules::Ruleset;
use autobattle_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    runner::{HeadlessRunner, RunConfig},
    scenario::{builtin_names, load_ruleset, resolve, resolve_checked},
};

#[derive(Parser)]
#[command(name = "autobattle_headless")]
#[command(about = "Headless auto-battler combat runner for balance testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// RON file of move overrides applied to the built-in move table
    #[arg(long, global = true)]
    moves: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single combat and print its report
    Run {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "duel")]
        scenario: String,

        /// Seed replacing the scenario's own
        #[arg(long)]
        seed: Option<u64>,

        /// Include the full event log in the report
        #[arg(long)]
        events: bool,

        /// Stream events as JSON lines while the combat runs
        #[arg(long, conflicts_with = "events")]
        stream: bool,
    },

    /// Run a batch of combats for balance testing
    Batch {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "skirmish")]
        scenario: String,

        /// Number of combats to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel combats (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Verify determinism by running the same seed multiple times
    Verify {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "skirmish")]
        scenario: String,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },

    /// Validate scenarios without running them
    Check {
        /// Built-in scenario names or RON files (all built-ins when empty)
        scenarios: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries reports
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .init();

    let rules = match load_ruleset(cli.moves.as_deref()) {
        Ok(rules) => rules,
        Err(e) => return fatal(&format!("Failed to load move overrides: {e}")),
    };

    match cli.command {
        Commands::Run {
            scenario,
            seed,
            events,
            stream,
        } => cmd_run(&rules, &scenario, seed, events, stream),
        Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed,
        } => cmd_batch(&rules, &scenario, count, parallel, &output, seed),
        Commands::Verify {
            scenario,
            seed,
            runs,
        } => cmd_verify(&rules, &scenario, seed, runs),
        Commands::Check { scenarios } => cmd_check(&rules, &scenarios),
    }
}

fn fatal(message: &str) -> ExitCode {
    tracing::error!("{message}");
    eprintln!("FATAL: {message}");
    ExitCode::FAILURE
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => fatal(&format!("Failed to encode output: {e}")),
    }
}

/// Run a single combat
fn cmd_run(rules: &Ruleset, scenario: &str, seed: Option<u64>, events: bool, stream: bool) -> ExitCode {
    let scenario = match resolve(scenario) {
        Ok(s) => s,
        Err(e) => return fatal(&e.to_string()),
    };
    tracing::info!(scenario = %scenario.name, ?seed, "Running combat");

    let config = RunConfig {
        seed,
        record_events: events,
        stream_events: stream,
    };
    match HeadlessRunner::with_config(rules, config).run(&scenario) {
        // Streamed events already went to stdout; keep it line-oriented.
        Ok(report) if stream => match serde_json::to_string(&report.metrics) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => fatal(&format!("Failed to encode output: {e}")),
        },
        Ok(report) => print_json(&report),
        Err(e) => fatal(&format!("Combat failed: {e}")),
    }
}

/// Run a batch of combats
fn cmd_batch(rules: &Ruleset, scenario_arg: &str, count: u32, parallel: u32, output: &Path, seed: u64) -> ExitCode {
    let scenario = match resolve(scenario_arg) {
        Ok(s) => s,
        Err(e) => return fatal(&e.to_string()),
    };

    let num_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        scenario = %scenario.name,
        count,
        parallel,
        seed,
        output = %output.display(),
        cpus_available = num_cpus,
        "Batch configuration"
    );

    if let Err(e) = std::fs::create_dir_all(output) {
        return fatal(&format!(
            "Cannot create output directory '{}': {e}",
            output.display()
        ));
    }

    let config = BatchConfig::new(&scenario.name, count)
        .with_output(output.to_path_buf())
        .with_seed(seed)
        .with_parallelism(parallel);
    let results = match run_batch(rules, &scenario, config) {
        Ok(results) => results,
        Err(e) => return fatal(&e.to_string()),
    };

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        return fatal(&format!("Failed to save results: {e}"));
    }
    tracing::info!(
        games_completed = results.games.len(),
        games_failed = results.errors.len(),
        path = %results_path.display(),
        "Batch results saved"
    );

    let code = print_json(&results.summary);
    if results.errors.is_empty() {
        code
    } else {
        for failure in &results.errors {
            tracing::warn!(game = failure.game_index, seed = failure.seed, "{}", failure.message);
        }
        ExitCode::FAILURE
    }
}

/// Verify determinism
fn cmd_verify(rules: &Ruleset, scenario: &str, seed: u64, runs: u32) -> ExitCode {
    let scenario = match resolve(scenario) {
        Ok(s) => s,
        Err(e) => return fatal(&e.to_string()),
    };
    tracing::info!(scenario = %scenario.name, seed, runs, "Verifying determinism");

    match verify_determinism(rules, &scenario, seed, runs) {
        Ok(check) => {
            let code = print_json(&check);
            if check.is_deterministic {
                tracing::info!("Determinism verified: all {runs} runs identical");
                code
            } else {
                tracing::error!(hashes = ?check.hashes, "Determinism check FAILED");
                ExitCode::FAILURE
            }
        }
        Err(e) => fatal(&format!("Combat failed: {e}")),
    }
}

/// Validate scenarios
fn cmd_check(rules: &Ruleset, scenarios: &[String]) -> ExitCode {
    let names: Vec<String> = if scenarios.is_empty() {
        builtin_names().map(str::to_string).collect()
    } else {
        scenarios.to_vec()
    };

    let mut failed = 0;
    for name in &names {
        match resolve_checked(name, rules) {
            Ok(scenario) => {
                let units = scenario.allies.units.len() + scenario.enemies.units.len();
                tracing::info!(scenario = %name, units, "OK");
            }
            Err(e) => {
                failed += 1;
                eprintln!("{name}: {e}");
            }
        }
    }

    if failed == 0 {
        eprintln!("{} scenario(s) valid", names.len());
        ExitCode::SUCCESS
    } else {
        eprintln!("{failed} of {} scenario(s) invalid", names.len());
        ExitCode::FAILURE
    }
}
