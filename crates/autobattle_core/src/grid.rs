//! The battlefield grid.
//!
//! A fixed-size board where each cell holds at most one [`Combatant`]. The
//! grid owns its combatants outright: moving one is a take-and-insert done
//! inside [`Grid::relocate`], so no caller ever sees a combatant in two
//! cells or in none.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::combatant::{Combatant, CombatantId, Side};
use crate::error::{BattleError, Result};
use crate::math::manhattan;

/// Integer cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Coord {
    /// Column.
    pub x: i32,
    /// Row (grows downward).
    pub y: i32,
}

impl Coord {
    /// Create a coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another cell.
    #[must_use]
    pub fn distance(self, other: Self) -> u32 {
        manhattan(self.x, self.y, other.x, other.y)
    }

    /// Shifted copy.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Orthogonal neighbors in +x, +y, -x, -y order.
    #[must_use]
    pub const fn neighbors(self) -> [Self; 4] {
        [
            self.offset(1, 0),
            self.offset(0, 1),
            self.offset(-1, 0),
            self.offset(0, -1),
        ]
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Default board width.
pub const DEFAULT_WIDTH: u32 = 6;

/// Default board height.
pub const DEFAULT_HEIGHT: u32 = 6;

/// The combat board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    /// Grid width in cells.
    width: u32,
    /// Grid height in cells.
    height: u32,
    /// Cell data stored in row-major order.
    cells: Vec<Option<Combatant>>,
    /// Where each combatant currently stands.
    index: BTreeMap<CombatantId, Coord>,
}

impl Grid {
    /// Create an empty grid.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width > 0, "Grid width must be positive");
        assert!(height > 0, "Grid height must be positive");

        let cell_count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            cells: vec![None; cell_count],
            index: BTreeMap::new(),
        }
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Convert a coordinate to a cell index. Caller checks bounds.
    #[inline]
    fn coords_to_index(&self, at: Coord) -> usize {
        (at.y as usize) * (self.width as usize) + (at.x as usize)
    }

    /// Check if a coordinate is within grid bounds.
    #[must_use]
    pub fn in_bounds(&self, at: Coord) -> bool {
        at.x >= 0 && at.y >= 0 && (at.x as u32) < self.width && (at.y as u32) < self.height
    }

    /// Combatant in a cell, if any. `None` out of bounds.
    #[must_use]
    pub fn get(&self, at: Coord) -> Option<&Combatant> {
        if self.in_bounds(at) {
            self.cells[self.coords_to_index(at)].as_ref()
        } else {
            None
        }
    }

    /// Mutable access to the combatant in a cell.
    pub fn get_mut(&mut self, at: Coord) -> Option<&mut Combatant> {
        if self.in_bounds(at) {
            let index = self.coords_to_index(at);
            self.cells[index].as_mut()
        } else {
            None
        }
    }

    /// True for in-bounds cells with nobody in them.
    #[must_use]
    pub fn is_vacant(&self, at: Coord) -> bool {
        self.in_bounds(at) && self.get(at).is_none()
    }

    /// Cell of a combatant still on the grid.
    #[must_use]
    pub fn locate(&self, id: CombatantId) -> Option<Coord> {
        self.index.get(&id).copied()
    }

    /// Look up a combatant by id. `None` once it has left the grid.
    #[must_use]
    pub fn combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.locate(id).and_then(|at| self.get(at))
    }

    /// Mutable lookup by id.
    pub fn combatant_mut(&mut self, id: CombatantId) -> Option<&mut Combatant> {
        let at = self.locate(id)?;
        self.get_mut(at)
    }

    /// Whether a combatant is on the grid.
    #[must_use]
    pub fn contains(&self, id: CombatantId) -> bool {
        self.index.contains_key(&id)
    }

    /// Put a combatant into an empty cell.
    ///
    /// # Errors
    ///
    /// Fails if the cell is out of bounds or occupied, or if the id is
    /// already on the grid.
    pub fn place(&mut self, at: Coord, mut combatant: Combatant) -> Result<()> {
        if !self.in_bounds(at) {
            return Err(BattleError::OutOfBounds(at));
        }
        if self.get(at).is_some() {
            return Err(BattleError::CellOccupied(at));
        }
        if self.index.contains_key(&combatant.id) {
            return Err(BattleError::InvalidState(format!(
                "Combatant {} is already on the grid",
                combatant.id
            )));
        }

        combatant.position = at;
        self.index.insert(combatant.id, at);
        let index = self.coords_to_index(at);
        self.cells[index] = Some(combatant);
        Ok(())
    }

    /// Take a combatant out of a cell.
    pub fn remove(&mut self, at: Coord) -> Option<Combatant> {
        if !self.in_bounds(at) {
            return None;
        }
        let index = self.coords_to_index(at);
        let combatant = self.cells[index].take()?;
        self.index.remove(&combatant.id);
        Some(combatant)
    }

    /// Take a combatant off the grid by id.
    pub fn remove_by_id(&mut self, id: CombatantId) -> Option<Combatant> {
        let at = self.locate(id)?;
        self.remove(at)
    }

    /// Move a combatant into an empty cell. Returns the cell it left.
    ///
    /// # Errors
    ///
    /// Fails if the combatant is not on the grid or `to` is not vacant; the
    /// grid is left untouched in that case.
    pub fn relocate(&mut self, id: CombatantId, to: Coord) -> Result<Coord> {
        let from = self.locate(id).ok_or(BattleError::CombatantNotFound(id))?;
        if !self.in_bounds(to) {
            return Err(BattleError::OutOfBounds(to));
        }
        if !self.is_vacant(to) {
            return Err(BattleError::CellOccupied(to));
        }

        let from_index = self.coords_to_index(from);
        let to_index = self.coords_to_index(to);
        let mut combatant = self.cells[from_index]
            .take()
            .ok_or(BattleError::CombatantNotFound(id))?;
        combatant.position = to;
        self.cells[to_index] = Some(combatant);
        self.index.insert(id, to);
        Ok(from)
    }

    /// Every cell in column-major order (x outer, y inner).
    pub fn column_major(&self) -> impl Iterator<Item = Coord> + '_ {
        let height = self.height as i32;
        (0..self.width as i32).flat_map(move |x| (0..height).map(move |y| Coord::new(x, y)))
    }

    /// Every combatant, in column-major cell order.
    pub fn occupants(&self) -> impl Iterator<Item = &Combatant> + '_ {
        self.column_major().filter_map(move |at| self.get(at))
    }

    /// Ids of all combatants on the grid, ascending.
    #[must_use]
    pub fn ids(&self) -> Vec<CombatantId> {
        self.index.keys().copied().collect()
    }

    /// Number of combatants on a side.
    #[must_use]
    pub fn count(&self, side: Side) -> usize {
        self.occupants().filter(|c| c.side == side).count()
    }
}

impl Default for Grid {
    /// The standard 6x6 board.
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::BaseStats;

    fn unit(id: u32, side: Side) -> Combatant {
        Combatant::new(CombatantId(id), "unit", side, 100, BaseStats::default())
    }

    #[test]
    fn test_grid_creation() {
        let grid = Grid::new(6, 4);
        assert_eq!(grid.width(), 6);
        assert_eq!(grid.height(), 4);
        assert!(grid.in_bounds(Coord::new(5, 3)));
        assert!(!grid.in_bounds(Coord::new(6, 0)));
        assert!(!grid.in_bounds(Coord::new(0, -1)));
    }

    #[test]
    fn test_place_and_lookup() {
        let mut grid = Grid::default();
        grid.place(Coord::new(2, 3), unit(1, Side::Ally)).unwrap();

        assert_eq!(grid.locate(CombatantId(1)), Some(Coord::new(2, 3)));
        assert_eq!(grid.combatant(CombatantId(1)).unwrap().position, Coord::new(2, 3));
        assert!(!grid.is_vacant(Coord::new(2, 3)));
    }

    #[test]
    fn test_one_combatant_per_cell() {
        let mut grid = Grid::default();
        grid.place(Coord::new(0, 0), unit(1, Side::Ally)).unwrap();
        let result = grid.place(Coord::new(0, 0), unit(2, Side::Enemy));
        assert!(matches!(result, Err(BattleError::CellOccupied(_))));
        assert!(!grid.contains(CombatantId(2)));
    }

    #[test]
    fn test_relocate_moves_without_duplicating() {
        let mut grid = Grid::default();
        grid.place(Coord::new(0, 0), unit(1, Side::Ally)).unwrap();

        let from = grid.relocate(CombatantId(1), Coord::new(1, 0)).unwrap();
        assert_eq!(from, Coord::new(0, 0));
        assert!(grid.get(Coord::new(0, 0)).is_none());
        assert_eq!(grid.combatant(CombatantId(1)).unwrap().position, Coord::new(1, 0));
        assert_eq!(grid.occupants().count(), 1);
    }

    #[test]
    fn test_relocate_into_occupied_cell_fails_cleanly() {
        let mut grid = Grid::default();
        grid.place(Coord::new(0, 0), unit(1, Side::Ally)).unwrap();
        grid.place(Coord::new(1, 0), unit(2, Side::Enemy)).unwrap();

        assert!(grid.relocate(CombatantId(1), Coord::new(1, 0)).is_err());
        assert_eq!(grid.locate(CombatantId(1)), Some(Coord::new(0, 0)));
        assert_eq!(grid.locate(CombatantId(2)), Some(Coord::new(1, 0)));
    }

    #[test]
    fn test_remove_clears_index() {
        let mut grid = Grid::default();
        grid.place(Coord::new(4, 4), unit(9, Side::Enemy)).unwrap();
        let removed = grid.remove_by_id(CombatantId(9)).unwrap();
        assert_eq!(removed.id, CombatantId(9));
        assert!(grid.combatant(CombatantId(9)).is_none());
        assert!(grid.is_vacant(Coord::new(4, 4)));
    }

    #[test]
    fn test_column_major_order() {
        let grid = Grid::new(2, 2);
        let order: Vec<Coord> = grid.column_major().collect();
        assert_eq!(
            order,
            vec![
                Coord::new(0, 0),
                Coord::new(0, 1),
                Coord::new(1, 0),
                Coord::new(1, 1)
            ]
        );
    }
}
