//! Combatant definitions.
//!
//! A combatant is pure data: identity, side, health, resource pool, stats
//! and its [`StatusTracker`]. Behavior lives in the combat driver.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::Coord;
use crate::math::{round_half_up, Fixed};
use crate::moves::MoveId;
use crate::status::{StatusKind, StatusTracker};

/// Unique identifier for combatants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CombatantId(pub u32);

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which team a combatant fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The player's team.
    Ally,
    /// The opposing team.
    Enemy,
}

impl Side {
    /// The other side.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Ally => Self::Enemy,
            Self::Enemy => Self::Ally,
        }
    }

    /// Both sides, allies first.
    pub const ALL: [Side; 2] = [Side::Ally, Side::Enemy];
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ally => write!(f, "ally"),
            Self::Enemy => write!(f, "enemy"),
        }
    }
}

/// Combat stats that stages and flat bonuses apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    /// Physical attack.
    Attack,
    /// Physical defense.
    Defense,
    /// Special attack.
    SpecialAttack,
    /// Special defense.
    SpecialDefense,
    /// Speed; drives turn frequency.
    Speed,
}

impl Stat {
    /// Number of stats.
    pub const COUNT: usize = 5;

    /// Every stat, in index order.
    pub const ALL: [Stat; Self::COUNT] = [
        Self::Attack,
        Self::Defense,
        Self::SpecialAttack,
        Self::SpecialDefense,
        Self::Speed,
    ];

    /// Dense index for array storage.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Attack => 0,
            Self::Defense => 1,
            Self::SpecialAttack => 2,
            Self::SpecialDefense => 3,
            Self::Speed => 4,
        }
    }
}

/// Unmodified stats of a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BaseStats {
    /// Physical attack.
    pub attack: i32,
    /// Physical defense.
    pub defense: i32,
    /// Special attack.
    pub special_attack: i32,
    /// Special defense.
    pub special_defense: i32,
    /// Speed.
    pub speed: i32,
}

impl BaseStats {
    /// Base value of a stat.
    #[must_use]
    pub const fn get(&self, stat: Stat) -> i32 {
        match stat {
            Stat::Attack => self.attack,
            Stat::Defense => self.defense,
            Stat::SpecialAttack => self.special_attack,
            Stat::SpecialDefense => self.special_defense,
            Stat::Speed => self.speed,
        }
    }
}

/// A bounded resource pool (PP) gating an active move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Current amount.
    pub current: u32,
    /// Maximum amount.
    pub max: u32,
}

impl Resource {
    /// Create a pool, clamping `current` to `max`.
    #[must_use]
    pub fn new(current: u32, max: u32) -> Self {
        Self {
            current: current.min(max),
            max,
        }
    }

    /// Whether the pool is full.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.current >= self.max
    }
}

/// A unit on the battlefield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    /// Unique identifier.
    pub id: CombatantId,
    /// Display name.
    pub name: String,
    /// Team.
    pub side: Side,
    /// Current health.
    pub hp: i32,
    /// Maximum health.
    pub max_hp: i32,
    /// PP pool; absent for combatants without an active move.
    pub pp: Option<Resource>,
    /// Unmodified stats.
    pub base: BaseStats,
    /// Basic attack range in cells (Manhattan).
    pub attack_range: u32,
    /// Critical hit chance in percent.
    pub crit_chance: u32,
    /// The combatant's move, active or passive.
    pub move_id: Option<MoveId>,
    /// Statuses, effects and stat modifiers.
    pub status: StatusTracker,
    /// Remembered target. Only an id; resolve through the grid.
    pub current_target: Option<CombatantId>,
    /// Summoner of this combatant, for damage attribution.
    pub owner: Option<CombatantId>,
    /// Cell currently holding this combatant. Maintained by the grid.
    pub position: Coord,
}

impl Combatant {
    /// Create a combatant with full health and neutral stats modifiers.
    #[must_use]
    pub fn new(id: CombatantId, name: impl Into<String>, side: Side, max_hp: i32, base: BaseStats) -> Self {
        Self {
            id,
            name: name.into(),
            side,
            hp: max_hp,
            max_hp,
            pp: None,
            base,
            attack_range: 1,
            crit_chance: 10,
            move_id: None,
            status: StatusTracker::new(),
            current_target: None,
            owner: None,
            position: Coord::new(0, 0),
        }
    }

    /// Whether the combatant still has health.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Whether `other` fights for the opposing team.
    #[must_use]
    pub fn is_opponent_of(&self, other: &Combatant) -> bool {
        self.side != other.side
    }

    /// Effective value of a stat after stages and flat bonuses.
    ///
    /// Recomputed on every call so modifiers applied mid-turn are always seen.
    #[must_use]
    pub fn stat(&self, stat: Stat) -> i32 {
        let base = Fixed::from_num(self.base.get(stat));
        let staged = round_half_up(base.saturating_mul(self.status.stage_multiplier(stat)));
        let staged = i32::try_from(staged).unwrap_or(i32::MAX);
        staged.saturating_add(self.status.flat(stat))
    }

    /// Whether the active move can be used this turn.
    #[must_use]
    pub fn has_full_pp(&self) -> bool {
        self.pp.is_some_and(|pp| pp.is_full())
    }

    /// Add PP unless the pool is missing, locked, or a move is in flight.
    ///
    /// Returns the amount actually gained.
    pub fn gain_pp(&mut self, amount: u32) -> u32 {
        if self.status.has(StatusKind::MoveActive) || self.status.has(StatusKind::PpLock) {
            return 0;
        }
        let Some(pp) = self.pp.as_mut() else {
            return 0;
        };
        let before = pp.current;
        pp.current = pp.current.saturating_add(amount).min(pp.max);
        pp.current - before
    }

    /// Remove PP. Returns the amount actually removed.
    pub fn lose_pp(&mut self, amount: u32) -> u32 {
        let Some(pp) = self.pp.as_mut() else {
            return 0;
        };
        let before = pp.current;
        pp.current = pp.current.saturating_sub(amount);
        before - pp.current
    }

    /// Restore health, reduced by [`StatusKind::HealReduction`] and capped at max.
    ///
    /// Returns the amount actually restored.
    pub fn heal(&mut self, amount: i32) -> i32 {
        if amount <= 0 || !self.is_alive() {
            return 0;
        }
        let amount = match self.status.value(StatusKind::HealReduction) {
            Some(reduction) => {
                let kept = Fixed::from_num(amount) * crate::math::percent(100 - reduction.clamp(0, 100));
                i32::try_from(kept.floor().to_num::<i64>()).unwrap_or(0)
            }
            None => amount,
        };
        let before = self.hp;
        self.hp = self.hp.saturating_add(amount).min(self.max_hp);
        self.hp - before
    }

    /// Remove health. Returns the amount actually removed.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        if amount <= 0 {
            return 0;
        }
        let removed = amount.min(self.hp.max(0));
        self.hp -= removed;
        removed
    }
}
