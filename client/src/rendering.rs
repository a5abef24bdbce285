//! Terminal output for server packets

use shared::{Packet, BOARD_FORMAT_VERSION};
use std::io::{self, Write};

/// Turns a server packet into the text shown to the player. Packets that
/// only travel from client to server render as `None`.
pub fn render_packet(packet: &Packet) -> Option<String> {
    let text = match packet {
        Packet::Connected { symbol, maze, .. } => {
            format!("connected to '{}' as player {}", maze, symbol)
        }
        Packet::Info { text } => text.clone(),
        Packet::Board {
            format,
            turn,
            board,
        } => {
            if *format != BOARD_FORMAT_VERSION {
                format!("(cannot show board format {})", format)
            } else {
                format!("-- turn {} --\n{}", turn, board.trim_end())
            }
        }
        Packet::Queued { commands } => format!("queued: {}", commands),
        Packet::Error { text } => format!("! {}", text),
        Packet::GameOver { winner: Some(name) } => format!("game over, {} won", name),
        Packet::GameOver { winner: None } => "game over".to_string(),
        Packet::Disconnected { reason } => format!("disconnected: {}", reason),
        Packet::Connect { .. } | Packet::Command { .. } | Packet::Disconnect => return None,
    };
    Some(text)
}

pub struct Renderer<W> {
    out: W,
}

impl Renderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn render(&mut self, packet: &Packet) -> io::Result<()> {
        match render_packet(packet) {
            Some(text) => self.line(&text),
            None => Ok(()),
        }
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
