//! Scenario loading.
//!
//! Scenarios are RON documents describing both boards and the combat
//! configuration. A few are compiled into the binary so CI can run them
//! without a checkout of the data directory; anything else is read from
//! disk.

use std::path::Path;

use autobattle_core::data::Scenario;
use autobattle_core::error::BattleError;
use autobattle_core::rules::Ruleset;
use thiserror::Error;
use tracing::{debug, info};

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found, and no built-in scenario has that name.
    #[error("Scenario not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// The document did not parse or failed validation.
    #[error(transparent)]
    Invalid(#[from] BattleError),
}

/// Scenarios shipped with the runner, by name.
const BUILTIN: [(&str, &str); 3] = [
    ("duel", include_str!("../scenarios/duel.ron")),
    ("skirmish", include_str!("../scenarios/skirmish.ron")),
    ("haunted", include_str!("../scenarios/haunted.ron")),
];

/// Names of the built-in scenarios.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN.iter().map(|(name, _)| *name)
}

/// Parse a built-in scenario.
pub fn builtin(name: &str) -> Option<Result<Scenario, ScenarioError>> {
    BUILTIN
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(n, text)| Scenario::from_ron_str(&format!("{n}.ron"), text).map_err(Into::into))
}

/// Load a scenario from a RON file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Scenario, ScenarioError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ScenarioError::FileNotFound(path.display().to_string()));
    }
    let contents = std::fs::read_to_string(path)?;
    let scenario = Scenario::from_ron_str(&path.display().to_string(), &contents)?;
    debug!(path = %path.display(), name = %scenario.name, "Loaded scenario");
    Ok(scenario)
}

/// Resolve a scenario argument: a built-in name first, then a file path.
pub fn resolve(name_or_path: &str) -> Result<Scenario, ScenarioError> {
    match builtin(name_or_path) {
        Some(result) => result,
        None => load(name_or_path),
    }
}

/// Parse and validate in one go, joining every problem into one error.
pub fn resolve_checked(name_or_path: &str, rules: &Ruleset) -> Result<Scenario, ScenarioError> {
    let scenario = resolve(name_or_path)?;
    let problems = scenario.validate(rules);
    if problems.is_empty() {
        Ok(scenario)
    } else {
        Err(BattleError::DataParseError {
            source_name: name_or_path.to_string(),
            message: problems.join("; "),
        }
        .into())
    }
}

/// Build the rule set, applying move overrides from a RON file if given.
pub fn load_ruleset(overrides: Option<&Path>) -> Result<Ruleset, ScenarioError> {
    let mut rules = Ruleset::standard();
    if let Some(path) = overrides {
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let replaced = rules
            .moves
            .apply_overrides(&path.display().to_string(), &text)?;
        info!(path = %path.display(), replaced, "Applied move overrides");
    }
    Ok(rules)
}
