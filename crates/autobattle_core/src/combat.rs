//! The combat driver.
//!
//! [`Combat`] owns the board and the event queue and runs one fight to its
//! conclusion. Every combatant on the board has exactly one pending turn or
//! one in-flight move at any time; each turn either acts, steps, waits or
//! skips, and then queues the next one.
//!
//! # Determinism
//!
//! - Fractions use fixed-point math via [`Fixed`]
//! - Randomness comes from a [`ChaCha8Rng`] seeded from the config
//! - Same-time events fire in insertion order
//! - Every scan over the board is column-major
//!
//! # Example
//!
//! ```
//! use autobattle_core::prelude::*;
//!
//! let rules = Ruleset::standard();
//! let mut combat = Combat::new(&rules, CombatConfig::default());
//! let stats = BaseStats { attack: 50, defense: 20, special_attack: 20, special_defense: 20, speed: 50 };
//! combat.place(Coord::new(0, 0), Combatant::new(CombatantId(1), "a", Side::Ally, 100, stats)).unwrap();
//! combat.place(Coord::new(0, 3), Combatant::new(CombatantId(2), "b", Side::Enemy, 60, stats)).unwrap();
//!
//! let end = combat.run().unwrap();
//! assert_eq!(end.outcome, Outcome::Winner(Side::Ally));
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::aoe::{best_cell_for, Affinity, AoeOptions};
use crate::combatant::{Combatant, CombatantId, Side, Stat};
use crate::config::CombatConfig;
use crate::damage::{self, DamageContext, DamageSpec, OffenseAction};
use crate::data::Scenario;
use crate::error::{BattleError, Result};
use crate::events::{CombatEvent, LoggedEvent, NullPresentation, Presentation};
use crate::grid::{Coord, Grid};
use crate::hooks::{
    DeathInfo, HitInfo, HookCtx, HookEffect, HookSet, MoveUseInfo, RoundResult,
};
use crate::ledger::{CombatEnd, DamageLedger, Outcome};
use crate::math::Fixed;
use crate::moves::{ActiveMove, Move, MoveEffect, MoveId, StatusRider, TargetRule, TargetSide};
use crate::rules::Ruleset;
use crate::scheduler::{CancelHook, Cancellables, Event, EventKey, EventQueue};
use crate::status::{ApplyOutcome, StatusKind, UNTIL_REMOVED_MS};
use crate::synergy::{ActiveSynergy, SynergyKind};
use crate::targeting::{
    furthest_opposing_unit, lowest_hp_ally, nearest_empty_cell, nearest_enemy, pathfind,
    random_opposing_unit,
};

/// Longest possible delay between two turns.
pub const MAX_TURN_DELAY_MS: i64 = 2000;

/// Speed offset in the attacks-per-second formula.
const SPEED_OFFSET: i32 = 25;

/// `1000 ms * 175`: the delay numerator once `aps = (speed + 25) / 175`
/// is inverted.
const DELAY_NUMERATOR: i64 = 175_000;

/// Delay before a combatant with `speed` acts again.
///
/// `min(2000, 1000 / aps)` with `aps = (speed + 25) / 175`, at least 1 ms.
#[must_use]
pub fn turn_delay(speed: i32) -> i64 {
    let divisor = i64::from(speed) + i64::from(SPEED_OFFSET);
    if divisor <= 0 {
        return MAX_TURN_DELAY_MS;
    }
    (DELAY_NUMERATOR / divisor).clamp(1, MAX_TURN_DELAY_MS)
}

/// State captured by [`Combat::snapshot`].
#[derive(Serialize)]
struct Snapshot<'a> {
    now: i64,
    grid: &'a Grid,
    queue: &'a EventQueue,
    cancellables: &'a Cancellables,
    ledger: &'a DamageLedger,
    rewards: &'a BTreeMap<Side, u32>,
    rng_word_pos: u128,
}

/// One combat between two teams.
pub struct Combat<'r> {
    rules: &'r Ruleset,
    config: CombatConfig,
    grid: Grid,
    queue: EventQueue,
    cancellables: Cancellables,
    turn_keys: BTreeMap<CombatantId, EventKey>,
    owners: BTreeMap<CombatantId, CombatantId>,
    rng: ChaCha8Rng,
    ally_synergies: Vec<ActiveSynergy>,
    enemy_synergies: Vec<ActiveSynergy>,
    ledger: DamageLedger,
    rewards: BTreeMap<Side, u32>,
    log: Vec<LoggedEvent>,
    presentation: Box<dyn Presentation + 'r>,
    next_id: u32,
    started: bool,
    outcome: Option<Outcome>,
}

impl<'r> Combat<'r> {
    /// An empty combat on a board sized by `config`.
    ///
    /// # Panics
    ///
    /// Panics if the configured board size is zero.
    #[must_use]
    pub fn new(rules: &'r Ruleset, config: CombatConfig) -> Self {
        let grid = Grid::new(config.width, config.height);
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            rules,
            config,
            grid,
            queue: EventQueue::new(),
            cancellables: Cancellables::default(),
            turn_keys: BTreeMap::new(),
            owners: BTreeMap::new(),
            rng,
            ally_synergies: Vec::new(),
            enemy_synergies: Vec::new(),
            ledger: DamageLedger::new(),
            rewards: BTreeMap::new(),
            log: Vec::new(),
            presentation: Box::new(NullPresentation),
            next_id: 1,
            started: false,
            outcome: None,
        }
    }

    /// Build a combat from a scenario. Ids are assigned from 1, allies first.
    ///
    /// # Errors
    ///
    /// Fails on an invalid scenario, an unknown move, or a bad placement.
    pub fn from_scenario(rules: &'r Ruleset, scenario: &Scenario) -> Result<Self> {
        let problems = scenario.validate(rules);
        if !problems.is_empty() {
            return Err(BattleError::DataParseError {
                source_name: scenario.name.clone(),
                message: problems.join("; "),
            });
        }

        let mut combat = Self::new(rules, scenario.config.clone());
        for side in Side::ALL {
            let team = scenario.team(side);
            for placement in &team.units {
                let id = CombatantId(combat.next_id);
                let unit = placement.unit.instantiate(id, side, rules)?;
                combat.place(placement.coord(), unit)?;
            }
            combat.set_synergies(side, &team.synergies);
        }
        Ok(combat)
    }

    /// Replace the presentation collaborator.
    #[must_use]
    pub fn with_presentation(mut self, presentation: Box<dyn Presentation + 'r>) -> Self {
        self.presentation = presentation;
        self
    }

    /// Put a combatant on the board before combat starts (or mid-combat,
    /// in which case its first turn is queued at once).
    ///
    /// # Errors
    ///
    /// Fails on non-positive max HP, or if the grid rejects the placement.
    pub fn place(&mut self, at: Coord, combatant: Combatant) -> Result<()> {
        if combatant.max_hp <= 0 {
            return Err(BattleError::InvariantViolation {
                combatant: combatant.id,
                reason: format!("max HP {} is not positive", combatant.max_hp),
            });
        }
        let id = combatant.id;
        let side = combatant.side;
        self.grid.place(at, combatant)?;
        self.ledger.register(id, side);
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        if self.started {
            self.schedule_turn(id);
        }
        Ok(())
    }

    /// Set a side's synergies from externally computed counts.
    pub fn set_synergies(&mut self, side: Side, counts: &[(SynergyKind, u32)]) {
        let active = self.rules.synergies.activate(counts);
        match side {
            Side::Ally => self.ally_synergies = active,
            Side::Enemy => self.enemy_synergies = active,
        }
    }

    /// Active synergies of a side, in activation order.
    #[must_use]
    pub fn synergies(&self, side: Side) -> &[ActiveSynergy] {
        match side {
            Side::Ally => &self.ally_synergies,
            Side::Enemy => &self.enemy_synergies,
        }
    }

    /// The board.
    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// Current virtual time.
    #[must_use]
    pub const fn now(&self) -> i64 {
        self.queue.now()
    }

    /// Global time scale at the current virtual time.
    #[must_use]
    pub fn time_scale(&self) -> Fixed {
        self.config.time_scale_at(self.now())
    }

    /// Damage attribution so far.
    #[must_use]
    pub const fn ledger(&self) -> &DamageLedger {
        &self.ledger
    }

    /// Recorded events (empty unless `record_events` is set).
    #[must_use]
    pub fn log(&self) -> &[LoggedEvent] {
        &self.log
    }

    /// The outcome, once combat has ended.
    #[must_use]
    pub const fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Serialize the simulation state.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            now: self.now(),
            grid: &self.grid,
            queue: &self.queue,
            cancellables: &self.cancellables,
            ledger: &self.ledger,
            rewards: &self.rewards,
            rng_word_pos: self.rng.get_word_pos(),
        };
        bincode::serialize(&snapshot)
            .map_err(|e| BattleError::InvalidState(format!("Failed to serialize combat: {e}")))
    }

    /// Hash of the current state. Two runs with the same inputs produce the
    /// same hash at every step.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match self.snapshot() {
            Ok(bytes) => bytes.hash(&mut hasher),
            Err(e) => {
                warn!(error = %e, "Snapshot failed; hashing clock only");
                self.now().hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Fire round-start hooks and queue everyone's first turn.
    ///
    /// Called by [`Combat::run`]; calling it again does nothing.
    ///
    /// # Errors
    ///
    /// Propagates invariant violations raised by hook effects.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;

        let allies = self.grid.count(Side::Ally);
        let enemies = self.grid.count(Side::Enemy);
        info!(allies, enemies, seed = self.config.seed, "Combat started");
        self.emit(CombatEvent::Started { allies, enemies });

        for side in Side::ALL {
            let effects = self.synergy_effects(side, |hooks, ctx| {
                if let Some(hook) = hooks.on_round_start {
                    hook(ctx);
                }
            });
            self.apply_effects(effects)?;
        }
        for id in self.grid.ids() {
            let effects = self.passive_effects(id, |hooks, ctx| {
                if let Some(hook) = hooks.on_round_start {
                    hook(ctx);
                }
            });
            self.apply_effects(effects)?;
        }

        for id in self.grid.ids() {
            self.schedule_turn(id);
        }
        if let Some(outcome) = self.check_end() {
            self.finish(outcome)?;
        }
        Ok(())
    }

    /// Process one event. Returns `false` once combat is over.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvariantViolation`] if the board is found in
    /// an impossible state.
    pub fn step(&mut self) -> Result<bool> {
        if !self.started {
            self.start()?;
        }
        if self.outcome.is_some() {
            return Ok(false);
        }

        match self.queue.peek_time() {
            Some(at) if at <= self.config.time_limit_ms => {}
            _ => {
                self.queue.advance_to(self.config.time_limit_ms);
                self.finish(Outcome::Draw)?;
                return Ok(false);
            }
        }
        let Some((key, event)) = self.queue.pop() else {
            return Ok(false);
        };
        trace!(at = self.now(), ?event, "Event");

        match event {
            Event::NextTurn {
                combatant,
                delay_ms,
            } => {
                if self.turn_keys.get(&combatant) == Some(&key) {
                    self.turn_keys.remove(&combatant);
                }
                self.take_turn(combatant, delay_ms)?;
            }
            Event::MoveStep {
                user,
                move_id,
                target,
                step,
            } => {
                self.cancellables.fired(user, key);
                self.move_step(user, move_id, target, step)?;
            }
            Event::MoveComplete { user, move_id } => {
                self.cancellables.fired(user, key);
                self.complete_move(user, move_id)?;
            }
        }

        self.check_invariants()?;
        if let Some(outcome) = self.check_end() {
            self.finish(outcome)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Run to the end and report the result.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvariantViolation`] naming the offending
    /// combatant if the board reaches an impossible state.
    pub fn run(&mut self) -> Result<CombatEnd> {
        while self.step()? {}
        let outcome = self.outcome.unwrap_or(Outcome::Draw);
        Ok(CombatEnd {
            outcome,
            ledger: self.ledger.clone(),
            rewards: self.rewards.clone(),
            elapsed_ms: self.now(),
            real_time_ms: self.config.real_time_ms(self.now()),
            state_hash: self.state_hash(),
        })
    }

    /// Apply a status, cancelling in-flight actions if it disables.
    ///
    /// Returns `None` if the target is not on the board.
    pub fn apply_status(
        &mut self,
        target: CombatantId,
        kind: StatusKind,
        value: Option<i32>,
        duration_ms: i64,
        source: Option<CombatantId>,
    ) -> Option<ApplyOutcome> {
        let unit = self.grid.combatant_mut(target)?;
        let outcome = unit.status.apply(kind, value, duration_ms, source);
        match outcome {
            ApplyOutcome::Immune => {
                debug!(%target, ?kind, "Status blocked by immunity");
            }
            ApplyOutcome::Applied | ApplyOutcome::Refreshed => {
                self.emit(CombatEvent::StatusApplied { target, kind });
                if kind.is_disabling() {
                    self.cancel_in_flight(target);
                }
            }
        }
        Some(outcome)
    }

    fn emit(&mut self, event: CombatEvent) {
        let at = self.now();
        self.presentation.on_event(at, &event);
        if self.config.record_events {
            self.log.push(LoggedEvent { at_ms: at, event });
        }
    }

    fn schedule_turn(&mut self, id: CombatantId) {
        let Some(unit) = self.grid.combatant(id) else {
            return;
        };
        let delay_ms = turn_delay(unit.stat(Stat::Speed));
        let key = self.queue.schedule_in(
            delay_ms,
            Event::NextTurn {
                combatant: id,
                delay_ms,
            },
        );
        if let Some(previous) = self.turn_keys.insert(id, key) {
            warn!(%id, "Combatant already had a pending turn; replacing it");
            self.queue.cancel(previous);
        }
    }

    fn take_turn(&mut self, id: CombatantId, delay_ms: i64) -> Result<()> {
        let Some(unit) = self.grid.combatant(id) else {
            return Ok(());
        };
        let stunned = unit.status.is_stunned();

        self.decay(id, delay_ms)?;
        if !self.grid.contains(id) {
            return Ok(());
        }

        if stunned {
            debug!(%id, "Turn skipped while stunned");
            self.emit(CombatEvent::TurnSkipped { combatant: id });
            self.schedule_turn(id);
            return Ok(());
        }

        let side = self.side_of(id);
        let effects = self.synergy_effects(side, |hooks, ctx| {
            if let Some(hook) = hooks.on_turn_start {
                hook(ctx, id);
            }
        });
        self.apply_effects(effects)?;
        if !self.grid.contains(id) {
            return Ok(());
        }

        if self.try_move(id)? {
            return Ok(());
        }
        self.basic_attack_turn(id)?;
        self.schedule_turn(id);
        Ok(())
    }

    /// Use the active move if PP is full and it has a target. Returns
    /// whether the turn was spent.
    fn try_move(&mut self, id: CombatantId) -> Result<bool> {
        let rules = self.rules;
        let Some(unit) = self.grid.combatant(id) else {
            return Ok(false);
        };
        if !unit.has_full_pp() {
            return Ok(false);
        }
        let Some(move_id) = unit.move_id else {
            return Ok(false);
        };
        let Some(active) = rules.moves.get(move_id).and_then(Move::as_active) else {
            warn!(%id, %move_id, "Combatant has PP but no active move");
            return Ok(false);
        };

        let Some(target) = self.move_target(id, active) else {
            debug!(%id, %move_id, "Move has no target; falling back to basic attack");
            return Ok(false);
        };

        let position = self.position_of(id)?;
        if position.distance(target) > active.range {
            self.step_toward(id, target, active.range)?;
            self.schedule_turn(id);
            return Ok(true);
        }

        self.start_move(id, move_id, active, target);
        Ok(true)
    }

    fn move_target(&mut self, id: CombatantId, active: &ActiveMove) -> Option<Coord> {
        let unit = self.grid.combatant(id)?;
        let side = unit.side;
        let position = unit.position;
        match active.target_rule {
            TargetRule::Nearest => self.basic_target(id).map(|(_, at)| at),
            TargetRule::BestArea => {
                let counts = match active.target_side {
                    TargetSide::Opponents => Affinity::Opposing,
                    TargetSide::Allies | TargetSide::User => Affinity::Allied,
                };
                let options = AoeOptions {
                    counts,
                    ..AoeOptions::default()
                };
                match active.aoe {
                    Some(shape) => best_cell_for(
                        &self.grid,
                        unit,
                        active.range,
                        |t, u| shape.cells(t, u),
                        &options,
                    ),
                    None => best_cell_for(&self.grid, unit, active.range, |t, _| vec![t], &options),
                }
            }
            TargetRule::LowestHpAlly => lowest_hp_ally(&self.grid, side)
                .filter(|at| self.grid.get(*at).is_some_and(|c| c.hp < c.max_hp)),
            TargetRule::Furthest => furthest_opposing_unit(&self.grid, position, side),
            TargetRule::Random => random_opposing_unit(&self.grid, side, &mut self.rng),
            TargetRule::OnSelf => Some(position),
            TargetRule::NearestEmpty => nearest_empty_cell(&self.grid, position),
        }
    }

    /// The remembered target if it is still an opponent on the board,
    /// otherwise the nearest enemy. Updates `current_target`.
    fn basic_target(&mut self, id: CombatantId) -> Option<(CombatantId, Coord)> {
        let unit = self.grid.combatant(id)?;
        let side = unit.side;
        let position = unit.position;

        let remembered = unit
            .current_target
            .and_then(|target| self.grid.combatant(target))
            .filter(|target| target.side != side)
            .map(|target| (target.id, target.position));

        let found = remembered.or_else(|| {
            nearest_enemy(&self.grid, position, side)
                .and_then(|at| self.grid.get(at))
                .map(|target| (target.id, target.position))
        });

        if let Some(unit) = self.grid.combatant_mut(id) {
            unit.current_target = found.map(|(target, _)| target);
        }
        found
    }

    fn basic_attack_turn(&mut self, id: CombatantId) -> Result<()> {
        let Some((target, at)) = self.basic_target(id) else {
            debug!(%id, "No target; waiting");
            self.emit(CombatEvent::Waited { combatant: id });
            return Ok(());
        };
        let position = self.position_of(id)?;
        let range = self.grid.combatant(id).map_or(1, |c| c.attack_range);
        if position.distance(at) > range {
            return self.step_toward(id, at, range);
        }

        self.emit(CombatEvent::Attacked {
            attacker: id,
            target,
        });
        let landed = self.deal_damage(Some(id), target, DamageSpec::basic_attack())?;
        if landed.is_some() {
            let gain = self.config.pp_per_attack;
            if let Some(unit) = self.grid.combatant_mut(id) {
                unit.gain_pp(gain);
            }
        }
        Ok(())
    }

    fn step_toward(&mut self, id: CombatantId, target: Coord, range: u32) -> Result<()> {
        let unit = self
            .grid
            .combatant_mut(id)
            .ok_or(BattleError::CombatantNotFound(id))?;
        if unit.status.has(StatusKind::Immobile) {
            unit.current_target = None;
            debug!(%id, "Immobile; waiting");
            self.emit(CombatEvent::Waited { combatant: id });
            return Ok(());
        }

        let from = unit.position;
        let step = pathfind(&self.grid, from, &[target], range).and_then(|p| p.first_step());
        match step {
            Some(to) => {
                self.grid.relocate(id, to)?;
                debug!(%id, %from, %to, "Stepped toward target");
                self.emit(CombatEvent::Moved {
                    combatant: id,
                    from,
                    to,
                });
            }
            None => {
                debug!(%id, %target, "No path; waiting");
                self.emit(CombatEvent::Waited { combatant: id });
            }
        }
        Ok(())
    }

    fn start_move(&mut self, id: CombatantId, move_id: MoveId, active: &ActiveMove, target: Coord) {
        if let Some(unit) = self.grid.combatant_mut(id) {
            unit.lose_pp(active.cost);
            unit.status
                .apply(StatusKind::MoveActive, None, UNTIL_REMOVED_MS, None);
        }
        debug!(%id, %move_id, %target, "Move started");
        self.emit(CombatEvent::MoveStarted {
            user: id,
            move_id,
            target,
        });

        let offsets = active.step_offsets();
        let last_step = offsets.iter().copied().max().unwrap_or(0);
        for (step, offset) in (0_u32..).zip(offsets) {
            let key = self.queue.schedule_in(
                offset,
                Event::MoveStep {
                    user: id,
                    move_id,
                    target,
                    step,
                },
            );
            self.cancellables.register(id, key, CancelHook::Discard);
        }

        let duration = self
            .presentation
            .move_duration_ms(move_id, active)
            .max(last_step)
            .max(1);
        let key = self
            .queue
            .schedule_in(duration, Event::MoveComplete { user: id, move_id });
        self.cancellables.register(id, key, CancelHook::ResumeTurns);
    }

    fn move_step(&mut self, user: CombatantId, move_id: MoveId, target: Coord, step: u32) -> Result<()> {
        let rules = self.rules;
        let Some(active) = rules.moves.require(move_id)?.as_active() else {
            return Err(BattleError::UnknownMove(move_id.to_string()));
        };
        if !self.grid.contains(user) {
            return Ok(());
        }
        trace!(%user, %move_id, step, "Move step");

        match &active.effect {
            MoveEffect::Strike { spec, rider } => {
                for victim in self.affected(user, active, target) {
                    let landed = self.deal_damage(Some(user), victim, *spec)?;
                    if let (Some(_), Some(rider)) = (landed, rider) {
                        self.apply_rider(victim, rider, user);
                    }
                }
            }
            MoveEffect::Barrage { spec, .. } => {
                let victim = self
                    .grid
                    .get(target)
                    .filter(|c| self.matches_side(user, active.target_side, c))
                    .map(|c| c.id);
                if let Some(victim) = victim {
                    self.deal_damage(Some(user), victim, *spec)?;
                }
            }
            MoveEffect::Heal { percent } => {
                for receiver in self.affected(user, active, target) {
                    let amount = self
                        .grid
                        .combatant(receiver)
                        .map_or(0, |c| c.max_hp.saturating_mul(*percent) / 100);
                    self.heal(receiver, amount);
                }
            }
            MoveEffect::Buff { stat, stages } => {
                for receiver in self.affected(user, active, target) {
                    if let Some(unit) = self.grid.combatant_mut(receiver) {
                        unit.status.add_stage(*stat, *stages);
                    }
                }
            }
            MoveEffect::Afflict { rider } => {
                for receiver in self.affected(user, active, target) {
                    self.apply_rider(receiver, rider, user);
                }
            }
            MoveEffect::Summon { template } => {
                let at = if self.grid.is_vacant(target) {
                    Some(target)
                } else {
                    nearest_empty_cell(&self.grid, target)
                };
                let Some(at) = at else {
                    debug!(%user, "No room to summon");
                    return Ok(());
                };
                let side = self.side_of(user);
                let id = CombatantId(self.next_id);
                let mut summon =
                    Combatant::new(id, template.name.clone(), side, template.max_hp, template.base);
                summon.attack_range = template.attack_range;
                summon.owner = Some(user);
                self.owners.insert(id, user);
                self.place(at, summon)?;
                debug!(owner = %user, summon = %id, %at, "Summoned");
                self.emit(CombatEvent::Summoned {
                    owner: user,
                    summon: id,
                    at,
                });
            }
        }
        Ok(())
    }

    fn complete_move(&mut self, user: CombatantId, move_id: MoveId) -> Result<()> {
        let Some(unit) = self.grid.combatant_mut(user) else {
            return Ok(());
        };
        unit.status.remove(StatusKind::MoveActive);
        debug!(%user, %move_id, "Move completed");
        self.emit(CombatEvent::MoveCompleted { user, move_id });

        let side = self.side_of(user);
        let info = MoveUseInfo { user, move_id };
        let effects = self.synergy_effects(side, |hooks, ctx| {
            if let Some(hook) = hooks.on_move_use {
                hook(ctx, &info);
            }
        });
        self.apply_effects(effects)?;

        self.schedule_turn(user);
        Ok(())
    }

    fn cancel_in_flight(&mut self, id: CombatantId) {
        for entry in self.cancellables.drain(id) {
            if !self.queue.cancel(entry.key) {
                continue;
            }
            match entry.hook {
                CancelHook::Discard => {}
                CancelHook::ResumeTurns => {
                    if let Some(unit) = self.grid.combatant_mut(id) {
                        unit.status.remove(StatusKind::MoveActive);
                    }
                    debug!(%id, "Move cancelled");
                    self.emit(CombatEvent::MoveCancelled { user: id });
                    self.schedule_turn(id);
                }
            }
        }
    }

    /// Ids hit by a move aimed at `target`, in shape order.
    fn affected(&self, user: CombatantId, active: &ActiveMove, target: Coord) -> Vec<CombatantId> {
        let Some(position) = self.grid.locate(user) else {
            return Vec::new();
        };
        let cells = active
            .aoe
            .map_or_else(|| vec![target], |shape| shape.cells(target, position));
        let mut ids: Vec<CombatantId> = Vec::new();
        for cell in cells {
            if let Some(unit) = self.grid.get(cell) {
                if self.matches_side(user, active.target_side, unit) && !ids.contains(&unit.id) {
                    ids.push(unit.id);
                }
            }
        }
        ids
    }

    fn matches_side(&self, user: CombatantId, target_side: TargetSide, other: &Combatant) -> bool {
        let side = self.side_of(user);
        match target_side {
            TargetSide::Opponents => other.side != side,
            TargetSide::Allies => other.side == side,
            TargetSide::User => other.id == user,
        }
    }

    fn apply_rider(&mut self, target: CombatantId, rider: &StatusRider, source: CombatantId) {
        self.apply_status(target, rider.kind, rider.value, rider.duration_ms, Some(source));
    }

    fn heal(&mut self, target: CombatantId, amount: i32) {
        let Some(unit) = self.grid.combatant_mut(target) else {
            return;
        };
        let restored = unit.heal(amount);
        if restored > 0 {
            self.ledger.record_heal(target, restored);
            self.emit(CombatEvent::Healed {
                target,
                amount: restored,
            });
        }
    }

    /// Resolve and apply damage. Returns the HP removed, or `None` on a
    /// miss or when the action cannot resolve.
    fn deal_damage(
        &mut self,
        source: Option<CombatantId>,
        target: CombatantId,
        spec: DamageSpec,
    ) -> Result<Option<i32>> {
        let Some(defender) = self.grid.combatant(target) else {
            return Ok(None);
        };
        let attacker = source.and_then(|id| self.grid.combatant(id));

        let (amount, critical) = match attacker {
            Some(attacker) => {
                if spec.is_attack && !damage::roll_accuracy(attacker, defender, &mut self.rng) {
                    debug!(attacker = %attacker.id, %target, "Missed");
                    let attacker = attacker.id;
                    self.emit(CombatEvent::Missed { attacker, target });
                    return Ok(None);
                }
                let critical = spec.can_crit && damage::roll_critical(attacker, &mut self.rng);
                let transforms = self.rules.damage_transforms(
                    attacker,
                    self.synergies(attacker.side),
                    defender,
                    self.synergies(defender.side),
                );
                let ctx = DamageContext {
                    critical,
                    crit_multiplier: self.config.crit_multiplier(),
                    transforms: &transforms,
                };
                (damage::resolve(attacker, defender, &spec.action, &ctx), critical)
            }
            None => match spec.action {
                OffenseAction::TrueDamage { .. } => {
                    let ctx = DamageContext {
                        crit_multiplier: self.config.crit_multiplier(),
                        ..DamageContext::default()
                    };
                    (damage::resolve(defender, defender, &spec.action, &ctx), false)
                }
                _ => {
                    warn!(%target, "Damage source left the board; dropping hit");
                    return Ok(None);
                }
            },
        };

        let removed = self.cause_damage(source, target, amount, critical)?;
        if spec.triggers_events {
            if let Some(attacker) = source {
                self.after_hit(attacker, target, removed, critical)?;
            }
        }
        Ok(Some(removed))
    }

    /// Remove HP, record it in the ledger and handle a resulting death.
    fn cause_damage(
        &mut self,
        source: Option<CombatantId>,
        target: CombatantId,
        amount: i32,
        critical: bool,
    ) -> Result<i32> {
        let Some(unit) = self.grid.combatant_mut(target) else {
            return Ok(0);
        };
        let removed = unit.take_damage(amount);
        let dead = !unit.is_alive();

        let credited = source.map(|id| self.owners.get(&id).copied().unwrap_or(id));
        self.ledger.record_damage(credited, target, removed);
        self.emit(CombatEvent::Damaged {
            source: credited,
            target,
            amount: removed,
            critical,
        });

        if dead {
            self.handle_death(target, credited)?;
        }
        Ok(removed)
    }

    fn after_hit(&mut self, attacker: CombatantId, defender: CombatantId, damage: i32, critical: bool) -> Result<()> {
        let gain = self.config.pp_per_hit;
        if let Some(unit) = self.grid.combatant_mut(defender) {
            unit.gain_pp(gain);
        }

        let hit = HitInfo {
            attacker,
            defender,
            damage,
            critical,
        };
        let mut effects = Vec::new();
        if let Some(side) = self.ledger.get(attacker).map(|e| e.side) {
            effects.extend(self.synergy_effects(side, |hooks, ctx| {
                if let Some(hook) = hooks.on_hit {
                    hook(ctx, &hit);
                }
            }));
            effects.extend(self.passive_effects(attacker, |hooks, ctx| {
                if let Some(hook) = hooks.on_hit {
                    hook(ctx, &hit);
                }
            }));
        }
        if let Some(side) = self.ledger.get(defender).map(|e| e.side) {
            effects.extend(self.synergy_effects(side, |hooks, ctx| {
                if let Some(hook) = hooks.on_being_hit {
                    hook(ctx, &hit);
                }
            }));
            effects.extend(self.passive_effects(defender, |hooks, ctx| {
                if let Some(hook) = hooks.on_being_hit {
                    hook(ctx, &hit);
                }
            }));
        }
        self.apply_effects(effects)
    }

    fn handle_death(&mut self, id: CombatantId, killer: Option<CombatantId>) -> Result<()> {
        let Some(unit) = self.grid.remove_by_id(id) else {
            return Ok(());
        };
        for entry in self.cancellables.drain(id) {
            self.queue.cancel(entry.key);
        }
        if let Some(key) = self.turn_keys.remove(&id) {
            self.queue.cancel(key);
        }
        debug!(%id, name = %unit.name, side = %unit.side, "Combatant died");
        self.emit(CombatEvent::Died {
            combatant: id,
            side: unit.side,
        });

        let info = DeathInfo {
            dead: id,
            side: unit.side,
            killer,
        };
        let mut effects = Vec::new();
        for side in Side::ALL {
            effects.extend(self.synergy_effects(side, |hooks, ctx| {
                if let Some(hook) = hooks.on_death {
                    hook(ctx, &info);
                }
            }));
        }
        self.apply_effects(effects)
    }

    /// Advance a combatant's statuses and apply their tick effects.
    fn decay(&mut self, id: CombatantId, elapsed_ms: i64) -> Result<()> {
        let Some(unit) = self.grid.combatant_mut(id) else {
            return Ok(());
        };
        let report = unit.status.decay(elapsed_ms);
        let max_hp = unit.max_hp;

        if let Some(drain) = report.pp_drain {
            unit.lose_pp(u32::try_from(drain).unwrap_or(0));
        }
        for kind in &report.expired {
            if *kind != StatusKind::MoveActive {
                self.emit(CombatEvent::StatusExpired {
                    target: id,
                    kind: *kind,
                });
            }
        }

        if let Some((percent, source)) = report.poison {
            let amount = i32::try_from(i64::from(max_hp) * i64::from(percent) / 100).unwrap_or(0);
            if amount > 0 {
                debug!(%id, amount, "Poison tick");
                self.cause_damage(source, id, amount, false)?;
            }
        }

        if let Some(source) = report.curse_expired {
            if let Some(hp) = self.grid.combatant(id).map(|c| c.hp) {
                debug!(%id, "Curse ran out");
                self.cause_damage(source, id, hp, false)?;
            }
        }
        Ok(())
    }

    /// Apply hook output in order. Effects aimed at combatants no longer on
    /// the board are dropped.
    fn apply_effects(&mut self, effects: Vec<HookEffect>) -> Result<()> {
        for effect in effects {
            match effect {
                HookEffect::ApplyStatus {
                    target,
                    kind,
                    value,
                    duration_ms,
                    source,
                } => {
                    self.apply_status(target, kind, value, duration_ms, source);
                }
                HookEffect::AddEffect {
                    target,
                    kind,
                    value,
                    duration_ms,
                } => {
                    if let Some(unit) = self.grid.combatant_mut(target) {
                        unit.status.add_effect(kind, value, duration_ms);
                    }
                }
                HookEffect::Heal { target, amount } => self.heal(target, amount),
                HookEffect::GainPp { target, amount } => {
                    if let Some(unit) = self.grid.combatant_mut(target) {
                        unit.gain_pp(amount);
                    }
                }
                HookEffect::StatStage {
                    target,
                    stat,
                    delta,
                } => {
                    if let Some(unit) = self.grid.combatant_mut(target) {
                        unit.status.add_stage(stat, delta);
                    }
                }
                HookEffect::FlatStat {
                    target,
                    stat,
                    amount,
                } => {
                    if let Some(unit) = self.grid.combatant_mut(target) {
                        unit.status.add_flat(stat, amount);
                    }
                }
                HookEffect::Damage {
                    source,
                    target,
                    spec,
                } => {
                    let spec = DamageSpec {
                        triggers_events: false,
                        ..spec
                    };
                    self.deal_damage(source, target, spec)?;
                }
                HookEffect::Reward { side, amount } => {
                    *self.rewards.entry(side).or_insert(0) += amount;
                }
            }
        }
        Ok(())
    }

    fn synergy_effects<F>(&self, side: Side, invoke: F) -> Vec<HookEffect>
    where
        F: Fn(&HookSet, &mut HookCtx<'_>),
    {
        let mut effects = Vec::new();
        for active in self.synergies(side) {
            let Some(def) = self.rules.synergies.get(active.kind) else {
                continue;
            };
            let mut ctx = HookCtx::new(&self.grid, side, None, active.tier, active.count);
            invoke(&def.hooks, &mut ctx);
            effects.extend(ctx.into_effects());
        }
        effects
    }

    fn passive_effects<F>(&self, holder: CombatantId, invoke: F) -> Vec<HookEffect>
    where
        F: Fn(&HookSet, &mut HookCtx<'_>),
    {
        let Some(unit) = self.grid.combatant(holder) else {
            return Vec::new();
        };
        let Some(hooks) = self.rules.passive_hooks(unit) else {
            return Vec::new();
        };
        let mut ctx = HookCtx::new(&self.grid, unit.side, Some(holder), 1, 1);
        invoke(hooks, &mut ctx);
        ctx.into_effects()
    }

    fn side_of(&self, id: CombatantId) -> Side {
        self.grid
            .combatant(id)
            .map(|c| c.side)
            .or_else(|| self.ledger.get(id).map(|e| e.side))
            .unwrap_or(Side::Ally)
    }

    fn position_of(&self, id: CombatantId) -> Result<Coord> {
        self.grid
            .locate(id)
            .ok_or(BattleError::CombatantNotFound(id))
    }

    fn check_invariants(&self) -> Result<()> {
        for unit in self.grid.occupants() {
            if unit.hp <= 0 {
                return Err(BattleError::InvariantViolation {
                    combatant: unit.id,
                    reason: format!("on the board with {} HP", unit.hp),
                });
            }
            if unit.max_hp <= 0 {
                return Err(BattleError::InvariantViolation {
                    combatant: unit.id,
                    reason: format!("max HP {} is not positive", unit.max_hp),
                });
            }
        }
        Ok(())
    }

    fn check_end(&mut self) -> Option<Outcome> {
        if self.outcome.is_some() {
            return self.outcome;
        }
        let allies = self.grid.count(Side::Ally);
        let enemies = self.grid.count(Side::Enemy);
        match (allies, enemies) {
            (0, 0) => Some(Outcome::Draw),
            (_, 0) => Some(Outcome::Winner(Side::Ally)),
            (0, _) => Some(Outcome::Winner(Side::Enemy)),
            _ => None,
        }
    }

    fn finish(&mut self, outcome: Outcome) -> Result<()> {
        if self.outcome.is_some() {
            return Ok(());
        }
        self.outcome = Some(outcome);

        for side in Side::ALL {
            let result = match outcome {
                Outcome::Draw => RoundResult::Draw,
                Outcome::Winner(winner) if winner == side => RoundResult::Win,
                Outcome::Winner(_) => RoundResult::Loss,
            };
            let effects = self.synergy_effects(side, |hooks, ctx| {
                if let Some(hook) = hooks.on_round_end {
                    hook(ctx, result);
                }
            });
            self.apply_effects(effects)?;
        }

        info!(
            ?outcome,
            elapsed_ms = self.now(),
            ally_damage = self.ledger.dealt_by(Side::Ally),
            enemy_damage = self.ledger.dealt_by(Side::Enemy),
            "Combat ended"
        );
        self.emit(CombatEvent::Ended { outcome });
        Ok(())
    }
}

impl std::fmt::Debug for Combat<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Combat")
            .field("now", &self.now())
            .field("grid", &self.grid)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}
