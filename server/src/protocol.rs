//! Text the server sends to players
//!
//! Boards are rendered per recipient: the viewer sees their own marker as `X`
//! and every other connected player by their symbol.

use crate::game::{GameOutcome, GameState};
use crate::maze::{Cell, Connector};
use crate::player::{Player, PlayerId};
use shared::{command, Direction, Packet, BOARD_FORMAT_VERSION};

pub const OWN_MARKER: char = 'X';

pub fn render_board(state: &GameState, viewer: PlayerId) -> String {
    let grid = state.grid();
    let width = 2 * grid.cols() + 1;
    let height = 2 * grid.rows() + 1;
    let mut rows: Vec<Vec<char>> = vec![vec!['O'; width]; height];

    for cell in grid.cells() {
        let (y, x) = (2 * cell.row + 1, 2 * cell.col + 1);
        rows[y][x] = room_char(state, viewer, cell);

        for (direction, (cy, cx)) in [(Direction::East, (y, x + 1)), (Direction::South, (y + 1, x))] {
            if let Ok(connector) = grid.connector_state(cell, direction) {
                rows[cy][cx] = match connector {
                    Connector::Wall => 'O',
                    Connector::Door => '.',
                    Connector::Open => ' ',
                };
            }
        }
    }

    let mut out = String::with_capacity((width + 1) * height);
    for row in rows {
        out.extend(row);
        out.push('\n');
    }
    out
}

fn room_char(state: &GameState, viewer: PlayerId, cell: Cell) -> char {
    let here: Vec<&Player> = state
        .players()
        .iter()
        .filter(|p| p.is_connected() && p.cell == cell)
        .collect();

    if here.iter().any(|p| p.id == viewer) {
        OWN_MARKER
    } else if let Some(other) = here.first() {
        other.symbol
    } else if state.grid().is_exit(cell) {
        'U'
    } else {
        ' '
    }
}

pub fn board_packet(state: &GameState, viewer: PlayerId) -> Packet {
    Packet::Board {
        format: BOARD_FORMAT_VERSION,
        turn: state.turns(),
        board: render_board(state, viewer),
    }
}

pub fn info(text: impl Into<String>) -> Packet {
    Packet::Info { text: text.into() }
}

pub fn welcome(maze_name: &str, symbol: char) -> String {
    format!(
        "welcome to the maze '{}', you are player {}",
        maze_name, symbol
    )
}

pub fn player_joined(name: &str, connected: usize, capacity: usize) -> String {
    format!(
        "{} joined the game ({}/{} players)",
        name, connected, capacity
    )
}

pub fn player_left(name: &str) -> String {
    format!("{} left the game", name)
}

/// Start notice followed by the list of controls
pub fn game_started() -> Vec<String> {
    let mut lines = vec!["the game begins! reach an exit (U) first".to_string()];
    lines.extend(command::controls_help());
    lines
}

pub fn turn_notice(state: &GameState, viewer: PlayerId, active: PlayerId) -> String {
    if viewer == active {
        return "it is your turn".to_string();
    }
    let name = state.player(active).map_or("someone", |p| p.name.as_str());
    format!("it is {}'s turn", name)
}

pub fn turn_forfeited() -> String {
    "you took too long, your turn is over".to_string()
}

pub fn outcome_notice(state: &GameState, viewer: PlayerId, outcome: GameOutcome) -> String {
    match outcome {
        GameOutcome::Won(winner) if winner == viewer => "you won the game!".to_string(),
        GameOutcome::Won(winner) => {
            let name = state.player(winner).map_or("someone", |p| p.name.as_str());
            format!("{} won the game!", name)
        }
        GameOutcome::Aborted => "the game was aborted".to_string(),
    }
}

pub fn game_over_packet(state: &GameState, outcome: GameOutcome) -> Packet {
    let winner = match outcome {
        GameOutcome::Won(id) => state.player(id).map(|p| p.name.clone()),
        GameOutcome::Aborted => None,
    };
    Packet::GameOver { winner }
}
