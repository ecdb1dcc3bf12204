//! Area-of-effect shapes and best-cell selection.
//!
//! [`best_cell_for`] is the single primitive behind every multi-target
//! move's target choice: try every candidate cell, score it by how many
//! relevant combatants the shape would hit, keep the best.

use serde::{Deserialize, Serialize};

use crate::combatant::{Combatant, Side};
use crate::grid::{Coord, Grid};

/// Cells covered by a line shape.
pub const LINE_LENGTH: i32 = 6;

/// Built-in area shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AoeShape {
    /// Only the target cell.
    Single,
    /// Target plus its four orthogonal neighbors.
    Cross,
    /// The 3x3 square centered on the target.
    Square,
    /// A straight line from the user through the target direction.
    Line,
    /// The eight cells around the user; the target is ignored.
    AroundUser,
}

impl AoeShape {
    /// Cells affected when aimed at `target` from `user`. Not bounds-checked.
    #[must_use]
    pub fn cells(self, target: Coord, user: Coord) -> Vec<Coord> {
        match self {
            Self::Single => vec![target],
            Self::Cross => {
                let mut cells = vec![target];
                cells.extend(target.neighbors());
                cells
            }
            Self::Square => square(target, true),
            Self::AroundUser => square(user, false),
            Self::Line => {
                let step = ((target.x - user.x).signum(), (target.y - user.y).signum());
                if step == (0, 0) {
                    return vec![target];
                }
                (1..=LINE_LENGTH)
                    .map(|i| user.offset(step.0 * i, step.1 * i))
                    .collect()
            }
        }
    }
}

fn square(center: Coord, include_center: bool) -> Vec<Coord> {
    let mut cells = Vec::with_capacity(9);
    for dx in -1..=1 {
        for dy in -1..=1 {
            if dx == 0 && dy == 0 && !include_center {
                continue;
            }
            cells.push(center.offset(dx, dy));
        }
    }
    cells
}

/// Which combatants count, relative to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Affinity {
    /// Combatants of the other side.
    #[default]
    Opposing,
    /// Combatants of the user's side (buffs, heals).
    Allied,
}

impl Affinity {
    /// Whether `other` matches this affinity relative to `side`.
    #[must_use]
    pub fn matches(self, side: Side, other: &Combatant) -> bool {
        match self {
            Self::Opposing => other.side != side,
            Self::Allied => other.side == side,
        }
    }
}

/// Candidate filters for [`best_cell_for`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AoeOptions<'a> {
    /// Explicit candidates, scanned in order. Whole grid when `None`.
    pub pool: Option<&'a [Coord]>,
    /// Only consider empty cells.
    pub empty_only: bool,
    /// Only consider cells holding a combatant with this affinity.
    pub occupied_by: Option<Affinity>,
    /// Which combatants a hit is counted on.
    pub counts: Affinity,
}

/// Find the in-range cell whose shape hits the most relevant combatants.
///
/// Candidates are scanned column-major, or in pool order when a pool is
/// given. A candidate replaces the best only with a strictly higher count,
/// so ties go to the first scanned. A count of zero never wins.
pub fn best_cell_for<F>(
    grid: &Grid,
    user: &Combatant,
    range: u32,
    shape: F,
    options: &AoeOptions<'_>,
) -> Option<Coord>
where
    F: Fn(Coord, Coord) -> Vec<Coord>,
{
    let candidates: Vec<Coord> = match options.pool {
        Some(pool) => pool.to_vec(),
        None => grid.column_major().collect(),
    };

    let mut best: Option<(Coord, usize)> = None;
    for candidate in candidates {
        if !grid.in_bounds(candidate) || candidate.distance(user.position) > range {
            continue;
        }
        if options.empty_only && !grid.is_vacant(candidate) {
            continue;
        }
        if let Some(affinity) = options.occupied_by {
            match grid.get(candidate) {
                Some(occupant) if affinity.matches(user.side, occupant) => {}
                _ => continue,
            }
        }

        let score = shape(candidate, user.position)
            .into_iter()
            .filter_map(|cell| grid.get(cell))
            .filter(|occupant| options.counts.matches(user.side, occupant))
            .count();

        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }

    best.map(|(cell, _)| cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{BaseStats, CombatantId};

    fn board(units: &[(i32, i32, Side)]) -> Grid {
        let mut grid = Grid::default();
        for (i, &(x, y, side)) in units.iter().enumerate() {
            let unit = Combatant::new(CombatantId(i as u32 + 1), "unit", side, 100, BaseStats::default());
            grid.place(Coord::new(x, y), unit).unwrap();
        }
        grid
    }

    #[test]
    fn test_shapes() {
        let origin = Coord::new(2, 2);
        assert_eq!(AoeShape::Single.cells(origin, origin).len(), 1);
        assert_eq!(AoeShape::Cross.cells(origin, origin).len(), 5);
        assert_eq!(AoeShape::Square.cells(origin, origin).len(), 9);
        assert_eq!(AoeShape::AroundUser.cells(Coord::new(0, 0), origin).len(), 8);

        let line = AoeShape::Line.cells(Coord::new(2, 4), origin);
        assert_eq!(line[0], Coord::new(2, 3));
        assert_eq!(line.len(), LINE_LENGTH as usize);
    }

    #[test]
    fn test_best_cell_maximizes_hits() {
        let grid = board(&[
            (0, 0, Side::Ally),
            (3, 3, Side::Enemy),
            (3, 4, Side::Enemy),
            (4, 3, Side::Enemy),
            (0, 5, Side::Enemy),
        ]);
        let user = grid.get(Coord::new(0, 0)).unwrap();
        let best = best_cell_for(
            &grid,
            user,
            10,
            |t, u| AoeShape::Square.cells(t, u),
            &AoeOptions::default(),
        )
        .unwrap();

        let hits = AoeShape::Square
            .cells(best, user.position)
            .into_iter()
            .filter(|c| grid.get(*c).is_some_and(|o| o.side == Side::Enemy))
            .count();
        assert_eq!(hits, 3);
    }

    #[test]
    fn test_best_cell_none_when_nothing_hit() {
        let grid = board(&[(0, 0, Side::Ally), (5, 5, Side::Enemy)]);
        let user = grid.get(Coord::new(0, 0)).unwrap();
        let best = best_cell_for(
            &grid,
            user,
            2,
            |t, u| AoeShape::Single.cells(t, u),
            &AoeOptions::default(),
        );
        assert_eq!(best, None);
    }

    #[test]
    fn test_best_cell_first_scanned_wins_ties() {
        let grid = board(&[(0, 0, Side::Ally), (2, 0, Side::Enemy), (0, 2, Side::Enemy)]);
        let user = grid.get(Coord::new(0, 0)).unwrap();
        let best = best_cell_for(
            &grid,
            user,
            3,
            |t, u| AoeShape::Single.cells(t, u),
            &AoeOptions::default(),
        );
        // Column-major scan reaches (0, 2) before (2, 0)
        assert_eq!(best, Some(Coord::new(0, 2)));
    }

    #[test]
    fn test_best_cell_respects_pool_order() {
        let grid = board(&[(0, 0, Side::Ally), (2, 0, Side::Enemy), (0, 2, Side::Enemy)]);
        let user = grid.get(Coord::new(0, 0)).unwrap();
        let pool = [Coord::new(2, 0), Coord::new(0, 2)];
        let best = best_cell_for(
            &grid,
            user,
            3,
            |t, u| AoeShape::Single.cells(t, u),
            &AoeOptions {
                pool: Some(&pool),
                ..AoeOptions::default()
            },
        );
        assert_eq!(best, Some(Coord::new(2, 0)));
    }

    #[test]
    fn test_best_cell_unit_targeted_and_allied() {
        let grid = board(&[
            (0, 0, Side::Ally),
            (1, 0, Side::Ally),
            (1, 1, Side::Ally),
            (4, 4, Side::Enemy),
        ]);
        let user = grid.get(Coord::new(0, 0)).unwrap();
        let best = best_cell_for(
            &grid,
            user,
            3,
            |t, u| AoeShape::Cross.cells(t, u),
            &AoeOptions {
                occupied_by: Some(Affinity::Allied),
                counts: Affinity::Allied,
                ..AoeOptions::default()
            },
        )
        .unwrap();
        assert!(grid.get(best).is_some_and(|o| o.side == Side::Ally));
    }

    #[test]
    fn test_best_cell_empty_only() {
        let grid = board(&[(0, 0, Side::Ally), (1, 1, Side::Enemy)]);
        let user = grid.get(Coord::new(0, 0)).unwrap();
        let best = best_cell_for(
            &grid,
            user,
            4,
            |t, u| AoeShape::Cross.cells(t, u),
            &AoeOptions {
                empty_only: true,
                ..AoeOptions::default()
            },
        )
        .unwrap();
        assert!(grid.is_vacant(best));
    }
}
