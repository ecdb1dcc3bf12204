//! Target selection and grid pathfinding.
//!
//! Two different searches live here and must not be confused:
//!
//! - [`nearest_enemy`] decides **who** to target. It walks expanding
//!   Manhattan rings and ignores collision entirely.
//! - [`pathfind`] decides **how** to get in range. It is a
//!   collision-aware breadth-first search over empty cells.
//!
//! All scans are deterministic: ring order, neighbor order and the
//! column-major board order are fixed.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::combatant::{Combatant, Side};
use crate::grid::{Coord, Grid};

/// Cells at exactly Manhattan distance `radius` from `center`, clockwise.
///
/// Starts at the +x vertex `(x + r, y)` and proceeds toward +y, then -x,
/// then -y (clockwise on screen, where y grows downward). Bounds are not
/// checked. Radius 0 yields only the center.
#[must_use]
pub fn ring(center: Coord, radius: u32) -> Vec<Coord> {
    if radius == 0 {
        return vec![center];
    }
    let r = radius as i32;
    let mut cells = Vec::with_capacity(4 * radius as usize);
    for i in 0..r {
        cells.push(center.offset(r - i, i));
    }
    for i in 0..r {
        cells.push(center.offset(-i, r - i));
    }
    for i in 0..r {
        cells.push(center.offset(-r + i, -i));
    }
    for i in 0..r {
        cells.push(center.offset(i, -r + i));
    }
    cells
}

/// Largest ring radius that can still touch the board from `from`.
fn max_radius(grid: &Grid, from: Coord) -> u32 {
    let far_x = from.x.max(grid.width() as i32 - 1 - from.x).max(0) as u32;
    let far_y = from.y.max(grid.height() as i32 - 1 - from.y).max(0) as u32;
    far_x + far_y
}

/// Spiral outward from `from` (excluding it) and return the first in-bounds
/// cell accepted by `accept`.
pub fn spiral_search<F>(grid: &Grid, from: Coord, mut accept: F) -> Option<Coord>
where
    F: FnMut(Coord) -> bool,
{
    for radius in 1..=max_radius(grid, from) {
        for cell in ring(from, radius) {
            if grid.in_bounds(cell) && accept(cell) {
                return Some(cell);
            }
        }
    }
    None
}

/// Nearest cell holding a combatant that satisfies `predicate`.
///
/// Ties at equal distance resolve by clockwise ring order from the +x
/// vertex.
pub fn nearest_matching<P>(grid: &Grid, from: Coord, predicate: P) -> Option<Coord>
where
    P: Fn(&Combatant) -> bool,
{
    spiral_search(grid, from, |cell| grid.get(cell).is_some_and(&predicate))
}

/// Nearest combatant opposing `side`.
#[must_use]
pub fn nearest_enemy(grid: &Grid, from: Coord, side: Side) -> Option<Coord> {
    nearest_matching(grid, from, |other| other.side != side)
}

/// Nearest vacant cell around `from`.
#[must_use]
pub fn nearest_empty_cell(grid: &Grid, from: Coord) -> Option<Coord> {
    spiral_search(grid, from, |cell| grid.is_vacant(cell))
}

/// Furthest combatant opposing `side`, by Manhattan distance.
///
/// Scans column-major and only replaces the best on a strictly greater
/// distance, so the first scanned wins ties.
#[must_use]
pub fn furthest_opposing_unit(grid: &Grid, from: Coord, side: Side) -> Option<Coord> {
    let mut best: Option<(Coord, u32)> = None;
    for unit in grid.occupants().filter(|unit| unit.side != side) {
        let distance = unit.position.distance(from);
        if best.map_or(true, |(_, d)| distance > d) {
            best = Some((unit.position, distance));
        }
    }
    best.map(|(cell, _)| cell)
}

/// A uniformly random combatant opposing `side`.
pub fn random_opposing_unit<R: Rng + ?Sized>(grid: &Grid, side: Side, rng: &mut R) -> Option<Coord> {
    let candidates: Vec<Coord> = grid
        .occupants()
        .filter(|unit| unit.side != side)
        .map(|unit| unit.position)
        .collect();
    candidates.choose(rng).copied()
}

/// The ally of `side` with the lowest health fraction.
#[must_use]
pub fn lowest_hp_ally(grid: &Grid, side: Side) -> Option<Coord> {
    let mut best: Option<&Combatant> = None;
    for unit in grid.occupants().filter(|unit| unit.side == side) {
        let lower = best.map_or(true, |current| {
            // hp / max_hp < current.hp / current.max_hp, without division
            i64::from(unit.hp) * i64::from(current.max_hp)
                < i64::from(current.hp) * i64::from(unit.max_hp)
        });
        if lower {
            best = Some(unit);
        }
    }
    best.map(|unit| unit.position)
}

/// Result of a successful [`pathfind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResult {
    /// The target that came within range.
    pub target: Coord,
    /// Path from the winning cell back toward the start, excluding the
    /// start. The **last** element is the first step to take; empty when
    /// the start is already in range.
    pub path: Vec<Coord>,
}

impl PathResult {
    /// The cell to step into next, if any movement is needed.
    #[must_use]
    pub fn first_step(&self) -> Option<Coord> {
        self.path.last().copied()
    }
}

/// Collision-aware breadth-first search toward any of `targets`.
///
/// Expands orthogonally through vacant cells. At each dequeued cell the
/// targets are checked in order; the first within `range` ends the search.
/// Returns `None` when no reachable cell is in range of any target.
#[must_use]
pub fn pathfind(grid: &Grid, start: Coord, targets: &[Coord], range: u32) -> Option<PathResult> {
    if targets.is_empty() {
        return None;
    }

    let mut queue = VecDeque::from([start]);
    let mut visited = BTreeSet::from([start]);
    let mut came_from: BTreeMap<Coord, Coord> = BTreeMap::new();

    while let Some(current) = queue.pop_front() {
        if let Some(&target) = targets.iter().find(|t| t.distance(current) <= range) {
            return Some(PathResult {
                target,
                path: reconstruct_path(&came_from, start, current),
            });
        }

        for next in current.neighbors() {
            if grid.is_vacant(next) && visited.insert(next) {
                came_from.insert(next, current);
                queue.push_back(next);
            }
        }
    }

    None
}

/// Walk back-pointers from `end` to (excluding) `start`.
fn reconstruct_path(came_from: &BTreeMap<Coord, Coord>, start: Coord, end: Coord) -> Vec<Coord> {
    let mut path = Vec::new();
    let mut current = end;
    while current != start {
        path.push(current);
        match came_from.get(&current) {
            Some(&prev) => current = prev,
            None => break,
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{BaseStats, CombatantId};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn unit(id: u32, side: Side) -> Combatant {
        Combatant::new(CombatantId(id), "unit", side, 100, BaseStats::default())
    }

    fn board(units: &[(i32, i32, Side)]) -> Grid {
        let mut grid = Grid::default();
        for (i, &(x, y, side)) in units.iter().enumerate() {
            grid.place(Coord::new(x, y), unit(i as u32 + 1, side)).unwrap();
        }
        grid
    }

    #[test]
    fn test_ring_order_is_clockwise_from_plus_x() {
        let cells = ring(Coord::new(0, 0), 1);
        assert_eq!(
            cells,
            vec![
                Coord::new(1, 0),
                Coord::new(0, 1),
                Coord::new(-1, 0),
                Coord::new(0, -1)
            ]
        );

        let cells = ring(Coord::new(0, 0), 2);
        assert_eq!(cells.len(), 8);
        assert_eq!(cells[0], Coord::new(2, 0));
        assert_eq!(cells[1], Coord::new(1, 1));
        assert_eq!(cells[2], Coord::new(0, 2));
        assert!(cells.iter().all(|c| c.distance(Coord::new(0, 0)) == 2));
    }

    #[test]
    fn test_nearest_enemy_prefers_adjacent() {
        let grid = board(&[(2, 2, Side::Ally), (2, 4, Side::Enemy), (3, 2, Side::Enemy)]);
        assert_eq!(
            nearest_enemy(&grid, Coord::new(2, 2), Side::Ally),
            Some(Coord::new(3, 2))
        );
    }

    #[test]
    fn test_nearest_enemy_tie_breaks_clockwise() {
        // (2, 3) is +y and (1, 2) is -x; +y comes first clockwise
        let grid = board(&[(2, 2, Side::Ally), (1, 2, Side::Enemy), (2, 3, Side::Enemy)]);
        assert_eq!(
            nearest_enemy(&grid, Coord::new(2, 2), Side::Ally),
            Some(Coord::new(2, 3))
        );
    }

    #[test]
    fn test_nearest_enemy_ignores_collision() {
        // Enemy is walled in by allies but still the target
        let grid = board(&[
            (0, 0, Side::Ally),
            (4, 4, Side::Enemy),
            (3, 4, Side::Ally),
            (5, 4, Side::Ally),
            (4, 3, Side::Ally),
            (4, 5, Side::Ally),
        ]);
        assert_eq!(
            nearest_enemy(&grid, Coord::new(0, 0), Side::Ally),
            Some(Coord::new(4, 4))
        );
    }

    #[test]
    fn test_nearest_enemy_none_when_alone() {
        let grid = board(&[(0, 0, Side::Ally), (1, 1, Side::Ally)]);
        assert_eq!(nearest_enemy(&grid, Coord::new(0, 0), Side::Ally), None);
    }

    #[test]
    fn test_pathfind_straight_line() {
        let grid = board(&[(0, 0, Side::Ally), (4, 0, Side::Enemy)]);
        let result = pathfind(&grid, Coord::new(0, 0), &[Coord::new(4, 0)], 1).unwrap();
        assert_eq!(result.target, Coord::new(4, 0));
        assert_eq!(result.first_step(), Some(Coord::new(1, 0)));
        // Winning cell is adjacent to the target
        assert_eq!(result.path[0], Coord::new(3, 0));
        assert_eq!(result.path.len(), 3);
    }

    #[test]
    fn test_pathfind_already_in_range() {
        let grid = board(&[(0, 0, Side::Ally), (1, 0, Side::Enemy)]);
        let result = pathfind(&grid, Coord::new(0, 0), &[Coord::new(1, 0)], 1).unwrap();
        assert!(result.path.is_empty());
        assert_eq!(result.first_step(), None);
    }

    #[test]
    fn test_pathfind_routes_around_blockers() {
        let grid = board(&[
            (0, 1, Side::Ally),
            (1, 1, Side::Ally),
            (3, 1, Side::Enemy),
        ]);
        let result = pathfind(&grid, Coord::new(0, 1), &[Coord::new(3, 1)], 1).unwrap();
        for cell in &result.path {
            assert!(grid.is_vacant(*cell), "path enters occupied cell {cell}");
        }
    }

    #[test]
    fn test_pathfind_no_path() {
        // Corner fully boxed in
        let grid = board(&[
            (0, 0, Side::Ally),
            (1, 0, Side::Ally),
            (0, 1, Side::Ally),
            (5, 5, Side::Enemy),
        ]);
        assert!(pathfind(&grid, Coord::new(0, 0), &[Coord::new(5, 5)], 1).is_none());
    }

    #[test]
    fn test_pathfind_picks_first_target_in_range() {
        let grid = board(&[(2, 2, Side::Ally), (0, 2, Side::Enemy), (4, 2, Side::Enemy)]);
        let result = pathfind(
            &grid,
            Coord::new(2, 2),
            &[Coord::new(4, 2), Coord::new(0, 2)],
            2,
        )
        .unwrap();
        assert_eq!(result.target, Coord::new(4, 2));
    }

    #[test]
    fn test_furthest_keeps_first_on_tie() {
        let grid = board(&[(0, 0, Side::Ally), (0, 3, Side::Enemy), (3, 0, Side::Enemy)]);
        // Column-major: (0, 3) scanned before (3, 0)
        assert_eq!(
            furthest_opposing_unit(&grid, Coord::new(0, 0), Side::Ally),
            Some(Coord::new(0, 3))
        );
    }

    #[test]
    fn test_random_opposing_unit_is_seeded() {
        let grid = board(&[(0, 0, Side::Ally), (1, 5, Side::Enemy), (4, 5, Side::Enemy)]);
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..10 {
            let pick = random_opposing_unit(&grid, Side::Ally, &mut a);
            assert_eq!(pick, random_opposing_unit(&grid, Side::Ally, &mut b));
            assert!(grid.get(pick.unwrap()).unwrap().side == Side::Enemy);
        }
    }

    #[test]
    fn test_nearest_empty_cell() {
        let grid = board(&[(0, 0, Side::Ally), (1, 0, Side::Ally)]);
        assert_eq!(nearest_empty_cell(&grid, Coord::new(0, 0)), Some(Coord::new(0, 1)));
    }

    #[test]
    fn test_lowest_hp_ally() {
        let mut grid = board(&[(0, 0, Side::Ally), (1, 0, Side::Ally), (5, 5, Side::Enemy)]);
        grid.get_mut(Coord::new(1, 0)).unwrap().hp = 40;
        grid.get_mut(Coord::new(5, 5)).unwrap().hp = 1;
        assert_eq!(lowest_hp_ally(&grid, Side::Ally), Some(Coord::new(1, 0)));
    }
}
