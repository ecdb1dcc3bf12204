//! Fixed-point math utilities for deterministic simulation.
//!
//! Every fractional quantity in the combat core (defense reduction, stat
//! stage multipliers, attack speed) uses fixed-point arithmetic so a given
//! seed always produces the same combat.

use fixed::types::I32F32;

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// `value / 100` as a fixed-point fraction.
#[must_use]
pub fn percent(value: i32) -> Fixed {
    Fixed::from_num(value) / Fixed::from_num(100)
}

/// Round to the nearest integer, halves rounding up (towards +inf).
///
/// `fixed`'s own `round` sends halves away from zero, which differs for
/// negative values, so the floor form is used instead.
#[must_use]
pub fn round_half_up(value: Fixed) -> i64 {
    let half = Fixed::ONE / Fixed::const_from_int(2);
    value.saturating_add(half).floor().to_num::<i64>()
}

/// Manhattan distance between two integer points.
#[inline]
#[must_use]
pub fn manhattan(ax: i32, ay: i32, bx: i32, by: i32) -> u32 {
    ax.abs_diff(bx) + ay.abs_diff(by)
}
