use crate::maze::MazeGrid;
use crate::player::{free_symbol, Player, PlayerId, PlayerStatus};
use log::info;
use shared::Action;
use thiserror::Error;

/// Game phases. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Lobby,
    Playing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Won(PlayerId),
    /// No rotation-eligible players remained
    Aborted,
}

/// One action that was applied, in application order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryEntry {
    pub player: PlayerId,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("the game is full ({capacity} players)")]
    Full { capacity: usize },
    #[error("the game has already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    grid: MazeGrid,
    /// Connection order, which is also the turn order
    players: Vec<Player>,
    turn: usize,
    phase: Phase,
    capacity: usize,
    winner: Option<PlayerId>,
    turns: u64,
    next_id: u32,
}

impl GameState {
    /// Capacity is clamped to the number of start rooms the grid offers.
    pub fn new(grid: MazeGrid, declared_capacity: usize) -> Self {
        let capacity = declared_capacity.min(grid.start_cells().len());
        Self {
            grid,
            players: Vec::new(),
            turn: 0,
            phase: Phase::Lobby,
            capacity,
            winner: None,
            turns: 0,
            next_id: 1,
        }
    }

    pub fn grid(&self) -> &MazeGrid {
        &self.grid
    }

    pub(crate) fn grid_mut(&mut self) -> &mut MazeGrid {
        &mut self.grid
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub(crate) fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    /// Number of turns that ended with a dispatched action
    pub fn turns(&self) -> u64 {
        self.turns
    }

    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_connected()).count()
    }

    /// Admits a player during the lobby and places them on the first start
    /// room no connected player holds.
    pub fn add_player(&mut self, name: &str) -> Result<PlayerId, JoinError> {
        if self.phase != Phase::Lobby {
            return Err(JoinError::AlreadyStarted);
        }
        if self.connected_count() >= self.capacity {
            return Err(JoinError::Full {
                capacity: self.capacity,
            });
        }

        let cell = self
            .grid
            .start_cells()
            .iter()
            .copied()
            .find(|cell| {
                !self
                    .players
                    .iter()
                    .any(|p| p.is_connected() && p.cell == *cell)
            })
            .ok_or(JoinError::Full {
                capacity: self.capacity,
            })?;

        let id = PlayerId(self.next_id);
        self.next_id += 1;
        let symbol = free_symbol(&self.players);

        info!("Player {} '{}' joined at {}", id, name, cell);
        self.players.push(Player::new(id, name, symbol, cell));
        Ok(id)
    }

    /// Player whose action is dispatched next, if the game is running
    pub fn active_player(&self) -> Option<PlayerId> {
        if self.phase != Phase::Playing {
            return None;
        }
        self.players
            .get(self.turn)
            .filter(|p| p.is_active())
            .map(|p| p.id)
    }

    /// Fixes the turn order to the current connection order.
    pub(crate) fn start(&mut self) {
        for player in &mut self.players {
            if player.status == PlayerStatus::Waiting {
                player.status = PlayerStatus::Active;
            }
        }
        self.phase = Phase::Playing;
        self.turn = 0;
        info!("Game started with {} players", self.connected_count());

        if !self.players.first().is_some_and(|p| p.is_active()) {
            self.advance_turn();
        }
    }

    /// Counts the current turn as played and moves the pointer on.
    pub(crate) fn complete_turn(&mut self) {
        self.turns += 1;
        self.advance_turn();
    }

    /// Moves the pointer to the next Active player, skipping everyone else.
    /// Ends the game with no winner when nobody is left.
    pub(crate) fn advance_turn(&mut self) {
        if self.phase != Phase::Playing {
            return;
        }
        let count = self.players.len();
        let next = (1..=count)
            .map(|step| (self.turn + step) % count.max(1))
            .find(|i| self.players[*i].is_active());

        match next {
            Some(i) => self.turn = i,
            None => self.finish(None),
        }
    }

    /// Marks a player as gone. Lobby leavers are dropped entirely since they
    /// hold no place in a turn order yet. Returns false if they were already
    /// gone or unknown.
    pub(crate) fn mark_disconnected(&mut self, id: PlayerId) -> bool {
        let held_turn = self.active_player() == Some(id);
        let Some(index) = self.players.iter().position(|p| p.id == id) else {
            return false;
        };
        if !self.players[index].is_connected() {
            return false;
        }
        if self.phase == Phase::Lobby {
            self.players.remove(index);
        } else {
            self.players[index].status = PlayerStatus::Disconnected;
        }
        info!("Player {} left the game", id);

        match self.phase {
            Phase::Lobby if self.connected_count() == 0 => self.finish(None),
            Phase::Playing if held_turn => self.advance_turn(),
            Phase::Playing if !self.players.iter().any(|p| p.is_active()) => self.finish(None),
            _ => {}
        }
        true
    }

    pub(crate) fn finish(&mut self, winner: Option<PlayerId>) {
        if self.phase == Phase::Finished {
            return;
        }
        self.phase = Phase::Finished;
        self.winner = winner;
        match winner {
            Some(id) => info!("Game finished, player {} won", id),
            None => info!("Game aborted, no players left"),
        }
    }

    pub fn outcome(&self) -> Option<GameOutcome> {
        (self.phase == Phase::Finished)
            .then(|| self.winner.map_or(GameOutcome::Aborted, GameOutcome::Won))
    }
}
