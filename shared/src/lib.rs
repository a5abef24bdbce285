use serde::{Deserialize, Serialize};

pub mod command;
pub mod framing;

pub use command::{Action, Direction, SyntaxError};

/// Bumped whenever the packet layout changes incompatibly
pub const PROTOCOL_VERSION: u32 = 1;

/// Version of the board text layout carried in `Packet::Board`
pub const BOARD_FORMAT_VERSION: u32 = 1;

pub const DEFAULT_PORT: u16 = 12800;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect {
        client_version: u32,
        name: String,
    },
    Command {
        line: String,
    },
    Disconnect,

    Connected {
        player_id: u32,
        symbol: char,
        maze: String,
    },
    Info {
        text: String,
    },
    Board {
        format: u32,
        turn: u64,
        board: String,
    },
    Queued {
        commands: String,
    },
    Error {
        text: String,
    },
    GameOver {
        winner: Option<String>,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// Packets after which the server closes the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Packet::GameOver { .. } | Packet::Disconnected { .. })
    }
}
