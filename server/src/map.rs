//! Plain-text maze maps
//!
//! A map is a `(2R+1) x (2C+1)` character grid. Rooms sit on odd rows and odd
//! columns; the characters between two rooms are the connector between them:
//!
//! ```text
//! OOOOOOO
//! O1  .UO     rooms: ' ' floor, 'U' exit, '1'..'9' start slot
//! O OOO O     connectors: 'O' wall, '.' door, ' ' open
//! O2    O     the outer border must be 'O'
//! OOOOOOO
//! ```
//!
//! When a map carries no start slots, start rooms are picked by distance to
//! the nearest exit so that every player faces a similar race.

use crate::maze::{Cell, Connector, MazeError, MazeGrid};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::framing::MAX_PACKET_SIZE;
use shared::Direction;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_MAP_NAME: &str = "courtyard";

/// Bytes a `Board` packet spends on everything but the board text
const BOARD_PACKET_OVERHEAD: usize = 64;

/// Bundled map used when the server is started without `--map`
pub const DEFAULT_MAP: &str = "\
OOOOOOOOOOOOOOO
O     O   .   O
O O O O OOO O O
O O   .   O   O
O OOOOO O O OOO
O   O   O .  UO
OOO O OOO OOO O
O   .   O     O
O OOOOO O OOO O
O     O   .   O
OOOOOOOOOOOOOOO
";

#[derive(Debug, Error)]
pub enum MapError {
    #[error("cannot read map: {0}")]
    Io(#[from] std::io::Error),
    #[error("map must have an odd number of lines, at least 3 (got {0})")]
    BadHeight(usize),
    #[error("map lines must share an odd width of at least 3 (line {line} has {width})")]
    BadWidth { line: usize, width: usize },
    #[error("unknown symbol '{found}' at line {line}, column {column}")]
    UnknownSymbol {
        line: usize,
        column: usize,
        found: char,
    },
    #[error("the border is open at line {line}, column {column}")]
    OpenBorder { line: usize, column: usize },
    #[error("start slot {0} appears more than once")]
    DuplicateStart(u32),
    #[error("map has no exit")]
    NoExit,
    #[error("map is too large to send: a {width}x{height} board exceeds {max} bytes")]
    TooLarge {
        width: usize,
        height: usize,
        max: usize,
    },
    #[error(transparent)]
    Maze(#[from] MazeError),
}

/// Reads and parses a map file. The map is named after the file stem.
pub fn load_map(path: &Path) -> Result<(String, MazeGrid), MapError> {
    let text = std::fs::read_to_string(path)?;
    let grid = parse_map(&text)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_MAP_NAME.to_string());

    info!(
        "Loaded map '{}' ({}x{} rooms, {} exits)",
        name,
        grid.rows(),
        grid.cols(),
        grid.exits().count()
    );
    Ok((name, grid))
}

pub fn parse_map(text: &str) -> Result<MazeGrid, MapError> {
    let mut lines: Vec<Vec<char>> = text
        .lines()
        .map(|l| l.trim_end_matches('\r').chars().collect())
        .collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    let height = lines.len();
    if height < 3 || height % 2 == 0 {
        return Err(MapError::BadHeight(height));
    }
    let width = lines[0].len();
    for (i, line) in lines.iter().enumerate() {
        if line.len() != width || width < 3 || width % 2 == 0 {
            return Err(MapError::BadWidth {
                line: i + 1,
                width: line.len(),
            });
        }
    }

    check_board_size(width, height)?;
    check_border(&lines)?;

    let mut grid = MazeGrid::new(height / 2, width / 2)?;
    let mut slots: BTreeMap<u32, Cell> = BTreeMap::new();

    for cell in grid.cells().collect::<Vec<_>>() {
        let (y, x) = (2 * cell.row + 1, 2 * cell.col + 1);
        match lines[y][x] {
            ' ' => {}
            'U' => grid.add_exit(cell)?,
            digit @ '1'..='9' => {
                let slot = digit.to_digit(10).unwrap_or_default();
                if slots.insert(slot, cell).is_some() {
                    return Err(MapError::DuplicateStart(slot));
                }
            }
            found => {
                return Err(MapError::UnknownSymbol {
                    line: y + 1,
                    column: x + 1,
                    found,
                })
            }
        }

        for (direction, (cy, cx)) in [(Direction::East, (y, x + 1)), (Direction::South, (y + 1, x))] {
            if grid.neighbor(cell, direction).is_none() {
                continue;
            }
            let state = match lines[cy][cx] {
                'O' => Connector::Wall,
                '.' => Connector::Door,
                ' ' => Connector::Open,
                found => {
                    return Err(MapError::UnknownSymbol {
                        line: cy + 1,
                        column: cx + 1,
                        found,
                    })
                }
            };
            grid.set_connector(cell, direction, state)?;
        }
    }

    if grid.exits().next().is_none() {
        return Err(MapError::NoExit);
    }
    grid.set_start_cells(slots.into_values().collect())?;

    Ok(grid)
}

/// Every board is sent whole in one frame: one line per map line, each
/// followed by a newline.
fn check_board_size(width: usize, height: usize) -> Result<(), MapError> {
    let max = MAX_PACKET_SIZE as usize;
    if height * (width + 1) + BOARD_PACKET_OVERHEAD > max {
        return Err(MapError::TooLarge { width, height, max });
    }
    Ok(())
}

fn check_border(lines: &[Vec<char>]) -> Result<(), MapError> {
    let height = lines.len();
    let width = lines[0].len();

    let top_bottom = [0, height - 1]
        .into_iter()
        .flat_map(|y| (1..width).step_by(2).map(move |x| (y, x)));
    let sides = (1..height)
        .step_by(2)
        .flat_map(|y| [(y, 0), (y, width - 1)]);

    for (y, x) in top_bottom.chain(sides) {
        if lines[y][x] != 'O' {
            return Err(MapError::OpenBorder {
                line: y + 1,
                column: x + 1,
            });
        }
    }
    Ok(())
}

/// Weighted distance from every room to its nearest exit. Crossing a
/// passable connector costs 1, piercing through a wall costs 2.
pub fn exit_distances(grid: &MazeGrid) -> HashMap<Cell, u32> {
    let mut dist: HashMap<Cell, u32> = HashMap::new();
    let mut heap = BinaryHeap::new();

    for exit in grid.exits() {
        dist.insert(exit, 0);
        heap.push(Reverse((0u32, exit)));
    }

    while let Some(Reverse((d, cell))) = heap.pop() {
        if dist.get(&cell).is_some_and(|best| *best < d) {
            continue;
        }
        for direction in Direction::ALL {
            let Some(next) = grid.neighbor(cell, direction) else {
                continue;
            };
            let cost = match grid.connector_state(cell, direction) {
                Ok(c) if c.is_passable() => 1,
                _ => 2,
            };
            let candidate = d + cost;
            if dist.get(&next).map_or(true, |best| candidate < *best) {
                dist.insert(next, candidate);
                heap.push(Reverse((candidate, next)));
            }
        }
    }

    dist
}

/// Fixes the start rooms for up to `capacity` players and returns how many
/// players the map can take.
///
/// Maps with explicit start slots keep them. Otherwise non-exit rooms are
/// ranked by distance to an exit, ties shuffled, and a random window of
/// `capacity` consecutive ranks is kept.
pub fn choose_start_cells<R: Rng>(grid: &mut MazeGrid, capacity: usize, rng: &mut R) -> usize {
    if !grid.start_cells().is_empty() {
        return capacity.min(grid.start_cells().len());
    }

    let distances = exit_distances(grid);
    let mut by_distance: BTreeMap<u32, Vec<Cell>> = BTreeMap::new();
    for cell in grid.cells().filter(|c| !grid.is_exit(*c)) {
        if let Some(d) = distances.get(&cell) {
            by_distance.entry(*d).or_default().push(cell);
        }
    }

    let mut ranked = Vec::new();
    for mut group in by_distance.into_values() {
        group.shuffle(rng);
        ranked.extend(group);
    }

    let take = capacity.min(ranked.len());
    let offset = if ranked.len() > take {
        rng.gen_range(0..=ranked.len() - take)
    } else {
        0
    };
    let chosen: Vec<Cell> = ranked[offset..offset + take].to_vec();
    debug!("Start rooms: {:?}", chosen);

    // every chosen cell comes from grid.cells(), so this cannot fail
    let _ = grid.set_start_cells(chosen);
    take
}
