//! Combat configuration.

use serde::{Deserialize, Serialize};

use crate::grid::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::math::{percent, Fixed};

/// Tunable numbers for one combat. Every field has a default, so a RON
/// scenario only needs to list what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Board width.
    pub width: u32,
    /// Board height.
    pub height: u32,
    /// Virtual time after which combat ends in a draw.
    pub time_limit_ms: i64,
    /// Critical hit multiplier in percent.
    pub crit_multiplier_percent: i32,
    /// PP gained by the attacker on a landed basic attack.
    pub pp_per_attack: u32,
    /// PP gained by a combatant when struck by event-triggering damage.
    pub pp_per_hit: u32,
    /// Time scale reached at the end of the clock, in percent.
    pub final_time_scale_percent: i32,
    /// Seed for accuracy, crit and random-target rolls.
    pub seed: u64,
    /// Keep a full event log in the result.
    pub record_events: bool,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            time_limit_ms: 60_000,
            crit_multiplier_percent: 150,
            pp_per_attack: 10,
            pp_per_hit: 5,
            final_time_scale_percent: 300,
            seed: 0,
            record_events: false,
        }
    }
}

/// Share of the clock, at the end, over which the time scale ramps.
const RAMP_PERCENT: i64 = 10;

/// Step used when integrating real time across the ramp.
const RAMP_STEP_MS: i64 = 50;

impl CombatConfig {
    /// Critical hit multiplier.
    #[must_use]
    pub fn crit_multiplier(&self) -> Fixed {
        percent(self.crit_multiplier_percent)
    }

    /// Virtual time at which the speed-up begins.
    #[must_use]
    pub fn ramp_start_ms(&self) -> i64 {
        self.time_limit_ms - self.time_limit_ms * RAMP_PERCENT / 100
    }

    /// Global time scale at virtual time `t`.
    ///
    /// 1 until the last 10% of the clock, then linear up to the final scale.
    #[must_use]
    pub fn time_scale_at(&self, t: i64) -> Fixed {
        let start = self.ramp_start_ms();
        let span = self.time_limit_ms - start;
        let final_scale = percent(self.final_time_scale_percent);
        if t <= start || span <= 0 {
            return Fixed::ONE;
        }
        if t >= self.time_limit_ms {
            return final_scale;
        }
        let progress = Fixed::from_num(t - start) / Fixed::from_num(span);
        Fixed::ONE + (final_scale - Fixed::ONE) * progress
    }

    /// Wall-clock time needed to play `elapsed_ms` of virtual time.
    #[must_use]
    pub fn real_time_ms(&self, elapsed_ms: i64) -> i64 {
        let start = self.ramp_start_ms();
        if elapsed_ms <= start {
            return elapsed_ms;
        }

        let mut real = Fixed::from_num(start.max(0));
        let mut t = start.max(0);
        while t < elapsed_ms {
            let step = RAMP_STEP_MS.min(elapsed_ms - t);
            let scale = self.time_scale_at(t + step / 2).max(Fixed::ONE / Fixed::from_num(100));
            real += Fixed::from_num(step) / scale;
            t += step;
        }
        real.round().to_num::<i64>()
    }

    /// Check the configuration for values the simulation cannot run with.
    ///
    /// Returns a list of problems; empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.width == 0 || self.height == 0 {
            errors.push(format!(
                "Grid size {}x{} must be positive",
                self.width, self.height
            ));
        }
        if self.time_limit_ms <= 0 {
            errors.push(format!("Time limit {} must be positive", self.time_limit_ms));
        }
        if self.crit_multiplier_percent < 100 {
            errors.push(format!(
                "Crit multiplier {}% must be at least 100%",
                self.crit_multiplier_percent
            ));
        }
        if self.final_time_scale_percent < 100 {
            errors.push(format!(
                "Final time scale {}% must be at least 100%",
                self.final_time_scale_percent
            ));
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(CombatConfig::default().validate().is_empty());
    }

    #[test]
    fn test_time_scale_ramp() {
        let config = CombatConfig::default();
        assert_eq!(config.ramp_start_ms(), 54_000);
        assert_eq!(config.time_scale_at(0), Fixed::ONE);
        assert_eq!(config.time_scale_at(54_000), Fixed::ONE);
        assert_eq!(config.time_scale_at(57_000), Fixed::from_num(2));
        assert_eq!(config.time_scale_at(60_000), Fixed::from_num(3));
    }

    #[test]
    fn test_real_time_shrinks_only_in_ramp() {
        let config = CombatConfig::default();
        assert_eq!(config.real_time_ms(30_000), 30_000);

        let full = config.real_time_ms(60_000);
        assert!(full < 60_000);
        assert!(full > 54_000 + 2_000);
    }

    #[test]
    fn test_validate_reports_problems() {
        let config = CombatConfig {
            width: 0,
            time_limit_ms: 0,
            crit_multiplier_percent: 50,
            ..CombatConfig::default()
        };
        assert_eq!(config.validate().len(), 3);
    }

    #[test]
    fn test_partial_ron() {
        let config: CombatConfig = ron::from_str("(seed: 42, width: 8)").unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.width, 8);
        assert_eq!(config.height, DEFAULT_HEIGHT);
    }
}
