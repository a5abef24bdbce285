//! Maze grid: rooms and the mutable connectors between them
//!
//! Rooms form a `rows x cols` lattice. Each pair of orthogonally adjacent
//! rooms shares exactly one connector, stored once, so a change made from one
//! side is seen from the other. The outer boundary is a closed border that is
//! never stored and can never be opened.

use shared::Direction;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// A room, addressed by row and column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// State of the barrier between two rooms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connector {
    Wall,
    Door,
    Open,
}

impl Connector {
    pub fn is_passable(self) -> bool {
        !matches!(self, Connector::Wall)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MazeError {
    #[error("a maze needs at least one room (got {rows}x{cols})")]
    Empty { rows: usize, cols: usize },
    #[error("room {0} is outside the maze")]
    OutOfBounds(Cell),
    #[error("room {cell} has the closed border to the {direction}")]
    Boundary { cell: Cell, direction: Direction },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MazeGrid {
    rows: usize,
    cols: usize,
    /// Connector between (r, c) and (r, c + 1), indexed `r * (cols - 1) + c`
    east_links: Vec<Connector>,
    /// Connector between (r, c) and (r + 1, c), indexed `r * cols + c`
    south_links: Vec<Connector>,
    exits: BTreeSet<Cell>,
    start_cells: Vec<Cell>,
}

impl MazeGrid {
    /// Creates a grid whose interior connectors are all walls.
    pub fn new(rows: usize, cols: usize) -> Result<Self, MazeError> {
        if rows == 0 || cols == 0 {
            return Err(MazeError::Empty { rows, cols });
        }

        Ok(Self {
            rows,
            cols,
            east_links: vec![Connector::Wall; rows * (cols - 1)],
            south_links: vec![Connector::Wall; (rows - 1) * cols],
            exits: BTreeSet::new(),
            start_cells: Vec::new(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.row < self.rows && cell.col < self.cols
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| Cell::new(row, col)))
    }

    /// Returns the adjacent room, or `None` when `direction` faces the border.
    pub fn neighbor(&self, cell: Cell, direction: Direction) -> Option<Cell> {
        if !self.contains(cell) {
            return None;
        }
        let (dr, dc) = direction.offset();
        let row = cell.row.checked_add_signed(dr)?;
        let col = cell.col.checked_add_signed(dc)?;
        let next = Cell::new(row, col);
        self.contains(next).then_some(next)
    }

    pub fn connector_state(&self, cell: Cell, direction: Direction) -> Result<Connector, MazeError> {
        let index = self.link_index(cell, direction)?;
        Ok(match index {
            Link::East(i) => self.east_links[i],
            Link::South(i) => self.south_links[i],
        })
    }

    /// Overwrites the connector shared by `cell` and its neighbor in `direction`.
    pub(crate) fn set_connector(
        &mut self,
        cell: Cell,
        direction: Direction,
        state: Connector,
    ) -> Result<(), MazeError> {
        match self.link_index(cell, direction)? {
            Link::East(i) => self.east_links[i] = state,
            Link::South(i) => self.south_links[i] = state,
        }
        Ok(())
    }

    pub fn is_exit(&self, cell: Cell) -> bool {
        self.exits.contains(&cell)
    }

    pub fn exits(&self) -> impl Iterator<Item = Cell> + '_ {
        self.exits.iter().copied()
    }

    pub(crate) fn add_exit(&mut self, cell: Cell) -> Result<(), MazeError> {
        if !self.contains(cell) {
            return Err(MazeError::OutOfBounds(cell));
        }
        self.exits.insert(cell);
        Ok(())
    }

    /// Start rooms in join order: the n-th admitted player starts on the n-th
    /// free entry.
    pub fn start_cells(&self) -> &[Cell] {
        &self.start_cells
    }

    pub(crate) fn set_start_cells(&mut self, cells: Vec<Cell>) -> Result<(), MazeError> {
        if let Some(bad) = cells.iter().find(|c| !self.contains(**c)) {
            return Err(MazeError::OutOfBounds(*bad));
        }
        self.start_cells = cells;
        Ok(())
    }

    /// Normalizes (cell, direction) to the stored link. West and North are
    /// looked up from the neighbor's side.
    fn link_index(&self, cell: Cell, direction: Direction) -> Result<Link, MazeError> {
        if !self.contains(cell) {
            return Err(MazeError::OutOfBounds(cell));
        }
        let neighbor = self
            .neighbor(cell, direction)
            .ok_or(MazeError::Boundary { cell, direction })?;

        Ok(match direction {
            Direction::East => Link::East(cell.row * (self.cols - 1) + cell.col),
            Direction::West => Link::East(neighbor.row * (self.cols - 1) + neighbor.col),
            Direction::South => Link::South(cell.row * self.cols + cell.col),
            Direction::North => Link::South(neighbor.row * self.cols + neighbor.col),
        })
    }
}

enum Link {
    East(usize),
    South(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_grid_is_rejected() {
        assert_eq!(
            MazeGrid::new(0, 3),
            Err(MazeError::Empty { rows: 0, cols: 3 })
        );
        assert!(MazeGrid::new(3, 0).is_err());
    }

    #[test]
    fn test_new_grid_is_all_walls() {
        let grid = MazeGrid::new(2, 3).unwrap();
        for cell in grid.cells() {
            for dir in Direction::ALL {
                if grid.neighbor(cell, dir).is_some() {
                    assert_eq!(grid.connector_state(cell, dir), Ok(Connector::Wall));
                }
            }
        }
        assert_eq!(grid.cells().count(), 6);
    }

    #[test]
    fn test_neighbor_lookup() {
        let grid = MazeGrid::new(3, 3).unwrap();
        let center = Cell::new(1, 1);
        assert_eq!(grid.neighbor(center, Direction::North), Some(Cell::new(0, 1)));
        assert_eq!(grid.neighbor(center, Direction::South), Some(Cell::new(2, 1)));
        assert_eq!(grid.neighbor(center, Direction::East), Some(Cell::new(1, 2)));
        assert_eq!(grid.neighbor(center, Direction::West), Some(Cell::new(1, 0)));

        let corner = Cell::new(0, 0);
        assert_eq!(grid.neighbor(corner, Direction::North), None);
        assert_eq!(grid.neighbor(corner, Direction::West), None);
        assert_eq!(grid.neighbor(Cell::new(5, 5), Direction::North), None);
    }

    #[test]
    fn test_connector_is_shared_by_both_sides() {
        let mut grid = MazeGrid::new(3, 3).unwrap();
        let a = Cell::new(1, 1);

        grid.set_connector(a, Direction::East, Connector::Door).unwrap();
        assert_eq!(
            grid.connector_state(Cell::new(1, 2), Direction::West),
            Ok(Connector::Door)
        );

        grid.set_connector(Cell::new(2, 1), Direction::North, Connector::Open)
            .unwrap();
        assert_eq!(grid.connector_state(a, Direction::South), Ok(Connector::Open));

        // unrelated links untouched
        assert_eq!(grid.connector_state(a, Direction::North), Ok(Connector::Wall));
        assert_eq!(grid.connector_state(a, Direction::West), Ok(Connector::Wall));
    }

    #[test]
    fn test_border_lookups_are_domain_errors() {
        let mut grid = MazeGrid::new(2, 2).unwrap();
        let corner = Cell::new(0, 0);

        assert_eq!(
            grid.connector_state(corner, Direction::North),
            Err(MazeError::Boundary {
                cell: corner,
                direction: Direction::North
            })
        );
        assert!(grid
            .set_connector(corner, Direction::West, Connector::Open)
            .is_err());
        assert_eq!(
            grid.connector_state(Cell::new(9, 0), Direction::South),
            Err(MazeError::OutOfBounds(Cell::new(9, 0)))
        );
    }

    #[test]
    fn test_exits_and_start_cells() {
        let mut grid = MazeGrid::new(2, 2).unwrap();
        grid.add_exit(Cell::new(1, 1)).unwrap();
        assert!(grid.is_exit(Cell::new(1, 1)));
        assert!(!grid.is_exit(Cell::new(0, 0)));
        assert!(grid.add_exit(Cell::new(2, 0)).is_err());

        grid.set_start_cells(vec![Cell::new(0, 0), Cell::new(0, 1)])
            .unwrap();
        assert_eq!(grid.start_cells().len(), 2);
        assert!(grid.set_start_cells(vec![Cell::new(7, 7)]).is_err());
    }

    #[test]
    fn test_single_row_grid() {
        let mut grid = MazeGrid::new(1, 3).unwrap();
        let mid = Cell::new(0, 1);
        assert!(grid.neighbor(mid, Direction::North).is_none());
        grid.set_connector(mid, Direction::West, Connector::Open)
            .unwrap();
        assert_eq!(
            grid.connector_state(Cell::new(0, 0), Direction::East),
            Ok(Connector::Open)
        );
    }
}
