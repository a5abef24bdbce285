//! Validation and application of single actions
//!
//! `apply` is the only place that mutates positions or connectors. It does no
//! I/O; the scheduler turns its result into messages.

use crate::game::{GameState, HistoryEntry, Phase};
use crate::maze::{Cell, Connector};
use crate::player::{PlayerId, PlayerStatus};
use log::{debug, warn};
use shared::{Action, Direction};
use thiserror::Error;

/// What an applied action changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Moved { from: Cell, to: Cell, won: bool },
    Pierced { at: Cell, direction: Direction },
    Walled { at: Cell, direction: Direction },
    Started,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("there is no passage that way")]
    NoPassage,
    #[error("you cannot pass through the wall")]
    BlockedByWall,
    #[error("there is no wall to pierce there")]
    NothingToPierce,
    #[error("there is no door to wall up there")]
    NothingToWall,
    #[error("the game has already started")]
    AlreadyStarted,
    #[error("the game has not started yet")]
    NotStarted,
    #[error("the game is over")]
    GameOver,
    #[error("you are not part of this game")]
    NotInGame,
}

impl Rejection {
    /// Rejections caused by the maze itself rather than by the game phase
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            Rejection::NoPassage
                | Rejection::BlockedByWall
                | Rejection::NothingToPierce
                | Rejection::NothingToWall
        )
    }
}

pub fn apply(state: &mut GameState, id: PlayerId, action: Action) -> Result<Effect, Rejection> {
    if state.phase() == Phase::Finished {
        return Err(Rejection::GameOver);
    }
    let player = state.player(id).ok_or(Rejection::NotInGame)?;

    let (cell, direction) = match action {
        Action::StartGame => {
            if state.phase() != Phase::Lobby {
                return Err(Rejection::AlreadyStarted);
            }
            if !player.is_connected() {
                return Err(Rejection::NotInGame);
            }
            state.start();
            return Ok(Effect::Started);
        }
        Action::Quit => {
            return if state.mark_disconnected(id) {
                Ok(Effect::Quit)
            } else {
                Err(Rejection::NotInGame)
            };
        }
        Action::Move(d) | Action::Pierce(d) | Action::Wall(d) => {
            if state.phase() == Phase::Lobby {
                return Err(Rejection::NotStarted);
            }
            if !player.is_active() {
                return Err(Rejection::NotInGame);
            }
            (player.cell, d)
        }
    };

    let grid = state.grid();
    let neighbor = grid.neighbor(cell, direction);
    let connector = grid.connector_state(cell, direction).ok();

    let effect = match (action, neighbor, connector) {
        (Action::Move(_), None, _) => return Err(Rejection::NoPassage),
        (Action::Move(_), Some(_), Some(Connector::Wall)) => return Err(Rejection::BlockedByWall),
        (Action::Move(_), Some(to), _) => {
            let won = grid.is_exit(to);
            if let Some(player) = state.player_mut(id) {
                player.cell = to;
                if won {
                    player.status = PlayerStatus::Finished;
                }
            }
            if won {
                state.finish(Some(id));
            }
            Effect::Moved { from: cell, to, won }
        }
        (Action::Pierce(_), Some(_), Some(Connector::Wall)) => {
            set(state, cell, direction, Connector::Open);
            Effect::Pierced { at: cell, direction }
        }
        (Action::Pierce(_), _, _) => return Err(Rejection::NothingToPierce),
        (Action::Wall(_), Some(_), Some(Connector::Door)) => {
            set(state, cell, direction, Connector::Wall);
            Effect::Walled { at: cell, direction }
        }
        _ => return Err(Rejection::NothingToWall),
    };

    debug!("Player {} applied {} -> {:?}", id, action, effect);
    Ok(effect)
}

/// The caller has already checked that the neighbor exists.
fn set(state: &mut GameState, cell: Cell, direction: Direction, connector: Connector) {
    if let Err(e) = state.grid_mut().set_connector(cell, direction, connector) {
        warn!("Connector {} of {} left unchanged: {}", direction, cell, e);
    }
}

/// Re-applies a recorded history on top of `state`, ignoring turn order.
/// Used to check that a finished game can be reproduced.
pub fn replay(state: &mut GameState, history: &[HistoryEntry]) -> Result<(), Rejection> {
    for entry in history {
        apply(state, entry.player, entry.action)?;
    }
    Ok(())
}
