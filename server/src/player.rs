//! Participants and their pending action queues
//!
//! A player's mailbox is split in two: the session reader owns the sending
//! half and appends every turn action it parses, while the turn loop owns the
//! receiving half and pops exactly one action per turn.

use crate::maze::Cell;
use shared::Action;
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    /// Connected, game not started yet
    Waiting,
    /// Part of the turn rotation
    Active,
    /// Reached an exit
    Finished,
    /// Quit or lost the connection; keeps its slot in the turn order
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Marker drawn on other players' boards
    pub symbol: char,
    pub cell: Cell,
    pub status: PlayerStatus,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, symbol: char, cell: Cell) -> Self {
        Self {
            id,
            name: name.into(),
            symbol,
            cell,
            status: PlayerStatus::Waiting,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status != PlayerStatus::Disconnected
    }

    pub fn is_active(&self) -> bool {
        self.status == PlayerStatus::Active
    }
}

/// `1`..`9`, then `A`..`Z` without `O`, `U` and `X`, which the board
/// already uses.
const SYMBOLS: &str = "123456789ABCDEFGHIJKLMNPQRSTVWYZ";

/// Board marker for the n-th admitted player. Wraps after the last symbol.
pub fn symbol_for(index: usize) -> char {
    SYMBOLS.chars().nth(index % SYMBOLS.len()).unwrap_or('?')
}

/// First symbol no connected player is drawn with. Falls back to wrapping
/// once every symbol is taken.
pub fn free_symbol(players: &[Player]) -> char {
    SYMBOLS
        .chars()
        .find(|symbol| {
            !players
                .iter()
                .any(|p| p.is_connected() && p.symbol == *symbol)
        })
        .unwrap_or_else(|| symbol_for(players.len()))
}

/// Creates a connected mailbox pair.
pub fn mailbox() -> (MailboxSender, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MailboxSender { tx }, Mailbox { rx })
}

#[derive(Debug, Clone)]
pub struct MailboxSender {
    tx: mpsc::UnboundedSender<Action>,
}

impl MailboxSender {
    /// Appends actions in order. Returns false once the turn loop is gone.
    pub fn push(&self, actions: impl IntoIterator<Item = Action>) -> bool {
        actions.into_iter().all(|action| self.tx.send(action).is_ok())
    }
}

#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::UnboundedReceiver<Action>,
}

impl Mailbox {
    /// Waits for the oldest queued action. `None` means the session reader
    /// dropped its sender and nothing is left to pop.
    pub async fn next(&mut self) -> Option<Action> {
        self.rx.recv().await
    }

    /// Pops without waiting.
    pub fn try_next(&mut self) -> Option<Action> {
        self.rx.try_recv().ok()
    }
}
