//! Single-combat runner.
//!
//! Builds a [`Combat`] from a scenario, runs it to the end and turns the
//! combat-end signal into a serializable report.

use std::collections::BTreeMap;
use std::io::Write;

use autobattle_core::combat::Combat;
use autobattle_core::combatant::CombatantId;
use autobattle_core::data::Scenario;
use autobattle_core::error::Result;
use autobattle_core::events::{CombatEvent, LoggedEvent, Presentation};
use autobattle_core::rules::Ruleset;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::metrics::CombatMetrics;

/// Runner configuration.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Seed replacing the scenario's own.
    pub seed: Option<u64>,
    /// Keep the event log in the report.
    pub record_events: bool,
    /// Write every event to stdout as a JSON line while the combat runs.
    pub stream_events: bool,
}

/// Everything known about one finished combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatReport {
    /// Outcome and per-combatant totals.
    #[serde(flatten)]
    pub metrics: CombatMetrics,
    /// Event log; empty unless recording was requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<LoggedEvent>,
}

/// Streams events as JSON lines.
pub struct JsonLinesPresentation<W: Write> {
    out: W,
    failed: bool,
}

impl<W: Write> JsonLinesPresentation<W> {
    /// Stream into `out`.
    pub fn new(out: W) -> Self {
        Self { out, failed: false }
    }
}

impl<W: Write> Presentation for JsonLinesPresentation<W> {
    fn on_event(&mut self, at_ms: i64, event: &CombatEvent) {
        if self.failed {
            return;
        }
        let line = LoggedEvent {
            at_ms,
            event: event.clone(),
        };
        let written = serde_json::to_writer(&mut self.out, &line)
            .map_err(std::io::Error::other)
            .and_then(|()| self.out.write_all(b"\n"));
        if let Err(e) = written {
            warn!(error = %e, "Event stream closed, continuing without it");
            self.failed = true;
        }
    }
}

/// Runs scenarios against one rule set.
pub struct HeadlessRunner<'r> {
    rules: &'r Ruleset,
    config: RunConfig,
}

impl<'r> HeadlessRunner<'r> {
    /// Create a runner with default config.
    pub fn new(rules: &'r Ruleset) -> Self {
        Self::with_config(rules, RunConfig::default())
    }

    /// Create a runner with custom configuration.
    pub fn with_config(rules: &'r Ruleset, config: RunConfig) -> Self {
        Self { rules, config }
    }

    /// Run one scenario to the end.
    ///
    /// # Errors
    ///
    /// Fails if the scenario is invalid or the combat breaks an invariant.
    pub fn run(&self, scenario: &Scenario) -> Result<CombatReport> {
        let mut scenario = scenario.clone();
        if let Some(seed) = self.config.seed {
            scenario.config.seed = seed;
        }
        scenario.config.record_events |= self.config.record_events;
        let seed = scenario.config.seed;

        let mut combat = Combat::from_scenario(self.rules, &scenario)?;
        if self.config.stream_events {
            combat = combat.with_presentation(Box::new(JsonLinesPresentation::new(std::io::stdout())));
        }

        let mut names: BTreeMap<CombatantId, String> = combat
            .grid()
            .occupants()
            .map(|c| (c.id, c.name.clone()))
            .collect();

        let end = combat.run()?;
        debug!(
            scenario = %scenario.name,
            seed,
            outcome = ?end.outcome,
            elapsed_ms = end.elapsed_ms,
            "Combat finished"
        );

        // Summons still standing supply their own names.
        for unit in combat.grid().occupants() {
            names.entry(unit.id).or_insert_with(|| unit.name.clone());
        }
        let grid = combat.grid();
        let metrics = CombatMetrics::from_end(
            scenario.name.clone(),
            seed,
            &end,
            |id| {
                names
                    .get(&CombatantId(id))
                    .cloned()
                    .unwrap_or_else(|| format!("summon #{id}"))
            },
            |id| grid.combatant(CombatantId(id)).is_some(),
        );

        let events = if self.config.record_events {
            combat.log().to_vec()
        } else {
            Vec::new()
        };
        Ok(CombatReport { metrics, events })
    }
}

/// Run one scenario with the given seed override.
///
/// # Errors
///
/// See [`HeadlessRunner::run`].
pub fn run_scenario(rules: &Ruleset, scenario: &Scenario, seed: Option<u64>) -> Result<CombatReport> {
    let config = RunConfig {
        seed,
        ..RunConfig::default()
    };
    HeadlessRunner::with_config(rules, config).run(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autobattle_core::combatant::Side;
    use autobattle_test_utils::fixtures::skirmish_scenario;

    #[test]
    fn test_report_names_every_placed_combatant() {
        let rules = Ruleset::standard();
        let scenario = skirmish_scenario(3);
        let report = run_scenario(&rules, &scenario, None).unwrap();

        let names: Vec<&str> = report
            .metrics
            .combatants
            .iter()
            .take(6)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, ["Ember", "Spark", "Boulder", "Brawler", "Medic", "Thorn"]);
        assert_eq!(report.metrics.combatants[0].side, Side::Ally);
        assert_eq!(report.metrics.combatants[3].side, Side::Enemy);
        assert!(report.events.is_empty());
    }

    #[test]
    fn test_seed_override_is_reported() {
        let rules = Ruleset::standard();
        let report = run_scenario(&rules, &skirmish_scenario(3), Some(99)).unwrap();
        assert_eq!(report.metrics.seed, 99);
    }

    #[test]
    fn test_survivors_match_outcome() {
        let rules = Ruleset::standard();
        let report = run_scenario(&rules, &skirmish_scenario(5), None).unwrap();
        if let Some(winner) = report.metrics.winner() {
            assert!(report
                .metrics
                .combatants
                .iter()
                .filter(|c| c.side == winner.opponent())
                .all(|c| !c.survived));
        }
    }

    #[test]
    fn test_recorded_events_end_with_outcome() {
        let rules = Ruleset::standard();
        let config = RunConfig {
            record_events: true,
            ..RunConfig::default()
        };
        let report = HeadlessRunner::with_config(&rules, config)
            .run(&skirmish_scenario(4))
            .unwrap();
        assert!(matches!(
            report.events.first().map(|e| &e.event),
            Some(CombatEvent::Started { allies: 3, enemies: 3 })
        ));
        assert!(matches!(
            report.events.last().map(|e| &e.event),
            Some(CombatEvent::Ended { .. })
        ));
    }

    #[test]
    fn test_json_lines_presentation_writes_one_line_per_event() {
        let mut buffer = Vec::new();
        {
            let mut presentation = JsonLinesPresentation::new(&mut buffer);
            presentation.on_event(0, &CombatEvent::Started { allies: 1, enemies: 2 });
            presentation.on_event(
                1000,
                &CombatEvent::Waited {
                    combatant: CombatantId(1),
                },
            );
        }
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: LoggedEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.at_ms, 1000);
    }

    #[test]
    fn test_report_json_round_trip() {
        let rules = Ruleset::standard();
        let report = run_scenario(&rules, &skirmish_scenario(2), None).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        let back: CombatReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
