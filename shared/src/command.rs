//! Command grammar shared by the server and the terminal client
//!
//! A command line is a concatenation of tokens, read greedily from left to right:
//! - `N`, `S`, `E`, `O` move one room North, South, East or West ("Ouest"),
//!   optionally followed by a repeat count from 1 to 99 (`E12`)
//! - `P<dir>` pierces the wall in that direction, `M<dir>` walls up a door
//! - `C` starts the game, `Q` leaves it
//!
//! Parsing is all-or-nothing: a single unrecognized character rejects the
//! whole line and nothing is queued.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest repeat count accepted after a movement key
pub const MAX_REPEAT: u32 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// Maps a command key to its direction. West uses `O` (Ouest).
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'N' => Some(Direction::North),
            'S' => Some(Direction::South),
            'E' => Some(Direction::East),
            'O' => Some(Direction::West),
            _ => None,
        }
    }

    pub fn key(self) -> char {
        match self {
            Direction::North => 'N',
            Direction::South => 'S',
            Direction::East => 'E',
            Direction::West => 'O',
        }
    }

    /// Row and column delta of one step in this direction
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::North => (-1, 0),
            Direction::South => (1, 0),
            Direction::East => (0, 1),
            Direction::West => (0, -1),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One atomic instruction, consumed exactly once by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Move(Direction),
    Pierce(Direction),
    Wall(Direction),
    StartGame,
    Quit,
}

impl Action {
    /// Actions that occupy a slot in the turn rotation.
    /// `StartGame` and `Quit` take effect immediately instead.
    pub fn is_turn_action(&self) -> bool {
        matches!(self, Action::Move(_) | Action::Pierce(_) | Action::Wall(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move(dir) => write!(f, "{}", dir.key()),
            Action::Pierce(dir) => write!(f, "P{}", dir.key()),
            Action::Wall(dir) => write!(f, "M{}", dir.key()),
            Action::StartGame => f.write_str("C"),
            Action::Quit => f.write_str("Q"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("this input is not valid")]
    Empty,
    #[error("this input is not valid: unexpected '{found}' at position {position}")]
    Unexpected { position: usize, found: char },
    #[error("this input is not valid: repeat count at position {position} must be between 1 and 99")]
    BadCount { position: usize },
    #[error("this input is not valid: '{key}' at position {position} must be followed by N, S, E or O")]
    MissingDirection { position: usize, key: char },
}

/// Parses a raw input line into the ordered list of actions it denotes.
pub fn parse(input: &str) -> Result<Vec<Action>, SyntaxError> {
    let chars: Vec<char> = input.trim().chars().map(|c| c.to_ascii_uppercase()).collect();
    let mut actions = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let key = chars[pos];
        if key.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if let Some(direction) = Direction::from_key(key) {
            let count_start = pos + 1;
            let digits = chars[count_start..]
                .iter()
                .take_while(|c| c.is_ascii_digit())
                .count();

            let count = match digits {
                0 => 1,
                1 | 2 => chars[count_start..count_start + digits]
                    .iter()
                    .fold(0, |acc, c| acc * 10 + c.to_digit(10).unwrap_or(0)),
                _ => return Err(SyntaxError::BadCount { position: count_start }),
            };
            if count == 0 || count > MAX_REPEAT {
                return Err(SyntaxError::BadCount { position: count_start });
            }

            actions.extend(std::iter::repeat(Action::Move(direction)).take(count as usize));
            pos = count_start + digits;
            continue;
        }

        match key {
            'P' | 'M' => {
                let direction = chars
                    .get(pos + 1)
                    .copied()
                    .and_then(Direction::from_key)
                    .ok_or(SyntaxError::MissingDirection { position: pos, key })?;
                actions.push(if key == 'P' {
                    Action::Pierce(direction)
                } else {
                    Action::Wall(direction)
                });
                pos += 2;
            }
            'C' => {
                actions.push(Action::StartGame);
                pos += 1;
            }
            'Q' => {
                actions.push(Action::Quit);
                pos += 1;
            }
            found => return Err(SyntaxError::Unexpected { position: pos, found }),
        }
    }

    if actions.is_empty() {
        return Err(SyntaxError::Empty);
    }
    Ok(actions)
}

/// Renders actions back into the command grammar, folding runs of identical
/// moves into repeat counts.
pub fn format_actions(actions: &[Action]) -> String {
    let mut out = String::new();
    let mut i = 0;

    while i < actions.len() {
        match actions[i] {
            Action::Move(direction) => {
                let run = actions[i..]
                    .iter()
                    .take_while(|a| **a == Action::Move(direction))
                    .count();
                let mut remaining = run;
                while remaining > 0 {
                    let chunk = remaining.min(MAX_REPEAT as usize);
                    out.push(direction.key());
                    if chunk > 1 {
                        out.push_str(&chunk.to_string());
                    }
                    remaining -= chunk;
                }
                i += run;
            }
            other => {
                out.push_str(&other.to_string());
                i += 1;
            }
        }
    }

    out
}

/// Help lines describing every control, sent to players when a game starts
pub fn controls_help() -> Vec<String> {
    let mut lines: Vec<String> = Direction::ALL
        .iter()
        .map(|d| format!("{} - move {} - usage: {}[1-99]", d.key(), d.name(), d.key()))
        .collect();
    lines.push("M - wall up a door - usage: M<N|S|E|O>".to_string());
    lines.push("P - pierce a wall - usage: P<N|S|E|O>".to_string());
    lines.push("Q - leave the game".to_string());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use Direction::*;

    #[test]
    fn test_single_keys() {
        assert_eq!(parse("N").unwrap(), vec![Action::Move(North)]);
        assert_eq!(parse("C").unwrap(), vec![Action::StartGame]);
        assert_eq!(parse("Q").unwrap(), vec![Action::Quit]);
        assert_eq!(parse("PS").unwrap(), vec![Action::Pierce(South)]);
        assert_eq!(parse("ME").unwrap(), vec![Action::Wall(East)]);
    }

    #[test]
    fn test_concatenated_tokens_keep_order() {
        let actions = parse("N5MEO13PO").unwrap();

        let mut expected = vec![Action::Move(North); 5];
        expected.push(Action::Wall(East));
        expected.extend(vec![Action::Move(West); 13]);
        expected.push(Action::Pierce(West));

        assert_eq!(actions.len(), 20);
        assert_eq!(actions, expected);
    }

    #[test]
    fn test_repeat_count_bounds() {
        assert_eq!(parse("S99").unwrap().len(), 99);
        assert!(parse("S99").unwrap().iter().all(|a| *a == Action::Move(South)));
        assert_eq!(parse("S0"), Err(SyntaxError::BadCount { position: 1 }));
        assert_eq!(parse("S00"), Err(SyntaxError::BadCount { position: 1 }));
        assert_eq!(parse("S100"), Err(SyntaxError::BadCount { position: 1 }));
        assert_eq!(parse("S1").unwrap(), vec![Action::Move(South)]);
    }

    #[test]
    fn test_invalid_line_queues_nothing() {
        assert_eq!(
            parse("F18"),
            Err(SyntaxError::Unexpected {
                position: 0,
                found: 'F'
            })
        );
        // valid prefix does not rescue an invalid tail
        assert!(parse("N3X").is_err());
        assert!(parse("P").is_err());
        assert!(parse("MX").is_err());
        assert_eq!(parse(""), Err(SyntaxError::Empty));
        assert_eq!(parse("   "), Err(SyntaxError::Empty));
    }

    #[test]
    fn test_error_message_mentions_invalid_input() {
        let err = parse("F18").unwrap_err();
        assert!(err.to_string().starts_with("this input is not valid"));
    }

    #[test]
    fn test_lowercase_and_spacing_are_accepted() {
        assert_eq!(
            parse("  n2 pe ").unwrap(),
            vec![Action::Move(North), Action::Move(North), Action::Pierce(East)]
        );
    }

    #[test]
    fn test_format_actions_folds_runs() {
        let mut actions = vec![Action::Move(East); 150];
        actions.push(Action::Wall(North));
        actions.push(Action::Move(West));
        assert_eq!(format_actions(&actions), "E99E51MNO");
        assert_eq!(format_actions(&[]), "");
    }

    #[test]
    fn test_format_then_parse_recovers_actions() {
        let samples = [
            "N5MEO13PO",
            "S99S99",
            "CQ",
            "NSEO",
            "PNPSPEPO",
        ];
        for sample in samples {
            let actions = parse(sample).unwrap();
            assert_eq!(parse(&format_actions(&actions)).unwrap(), actions);
        }
    }

    #[test]
    fn test_direction_geometry() {
        for dir in Direction::ALL {
            let (dr, dc) = dir.offset();
            let (or, oc) = dir.opposite().offset();
            assert_eq!((dr + or, dc + oc), (0, 0));
            assert_eq!(Direction::from_key(dir.key()), Some(dir));
        }
    }

    #[test]
    fn test_turn_actions() {
        assert!(Action::Move(North).is_turn_action());
        assert!(Action::Pierce(North).is_turn_action());
        assert!(Action::Wall(North).is_turn_action());
        assert!(!Action::StartGame.is_turn_action());
        assert!(!Action::Quit.is_turn_action());
    }

    #[test]
    fn test_controls_help_lists_every_key() {
        let help = controls_help().join("\n");
        for key in ["N -", "S -", "E -", "O -", "M -", "P -", "Q -"] {
            assert!(help.contains(key), "missing {key}");
        }
    }
}
