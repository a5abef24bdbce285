//! Turn loop
//!
//! The scheduler owns the `GameState` and is the only task that mutates it.
//! Sessions talk to it through two kinds of channels: a per-player mailbox
//! carrying turn actions, and one shared event channel for joins, starts,
//! quits and disconnects. While a game runs, the loop only ever waits on the
//! active player's mailbox, raced against the event channel and the optional
//! turn deadline, so actions are applied strictly in turn order.

use crate::broadcaster::Broadcaster;
use crate::game::{GameOutcome, GameState, HistoryEntry, JoinError};
use crate::player::{mailbox, Mailbox, MailboxSender, PlayerId};
use crate::protocol;
use crate::rules::{apply, Effect};
use log::{debug, info, warn};
use shared::{Action, Packet};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

/// Messages from session tasks to the turn loop
#[derive(Debug)]
pub enum SessionEvent {
    Join {
        name: String,
        outbound: mpsc::UnboundedSender<Packet>,
        reply: oneshot::Sender<Result<JoinTicket, JoinError>>,
    },
    StartGame {
        player: PlayerId,
    },
    Quit {
        player: PlayerId,
    },
    Disconnected {
        player: PlayerId,
    },
}

/// Handed to an admitted session
#[derive(Debug)]
pub struct JoinTicket {
    pub player_id: PlayerId,
    pub symbol: char,
    pub mailbox: MailboxSender,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameReport {
    pub outcome: GameOutcome,
    /// Applied actions in application order
    pub history: Vec<HistoryEntry>,
}

enum Step {
    Event(Option<SessionEvent>),
    Action(PlayerId, Option<Action>),
    Timeout(PlayerId),
}

pub struct TurnScheduler {
    state: GameState,
    mailboxes: HashMap<PlayerId, Mailbox>,
    broadcaster: Broadcaster,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    turn_timeout: Option<Duration>,
    deadline: Option<Instant>,
    maze_name: String,
    history: Vec<HistoryEntry>,
}

impl TurnScheduler {
    /// Creates the scheduler together with the sender sessions use to reach it.
    pub fn new(
        state: GameState,
        maze_name: impl Into<String>,
        turn_timeout: Option<Duration>,
    ) -> (Self, mpsc::UnboundedSender<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            state,
            mailboxes: HashMap::new(),
            broadcaster: Broadcaster::new(),
            events: rx,
            turn_timeout,
            deadline: None,
            maze_name: maze_name.into(),
            history: Vec::new(),
        };
        (scheduler, tx)
    }

    /// Runs until someone wins or nobody is left to play.
    pub async fn run(mut self) -> GameReport {
        info!(
            "Lobby open on maze '{}' for up to {} players",
            self.maze_name,
            self.state.capacity()
        );

        loop {
            if let Some(outcome) = self.state.outcome() {
                return self.finish(outcome);
            }

            let before = self.state.active_player();
            let consumed = match self.next_step().await {
                Step::Event(Some(event)) => {
                    self.handle_event(event);
                    false
                }
                Step::Event(None) => {
                    warn!("All session channels closed, aborting the game");
                    self.state.finish(None);
                    false
                }
                Step::Action(player, Some(action)) => {
                    self.dispatch(player, action);
                    true
                }
                Step::Action(player, None) => {
                    self.player_gone(player, "connection lost");
                    false
                }
                Step::Timeout(player) => {
                    info!("Player {} ran out of time", player);
                    self.broadcaster
                        .send_to(player, protocol::info(protocol::turn_forfeited()));
                    self.state.advance_turn();
                    self.announce_turn();
                    true
                }
            };

            if consumed || self.state.active_player() != before {
                self.deadline = None;
            }
        }
    }

    async fn next_step(&mut self) -> Step {
        let Some(active) = self.state.active_player() else {
            return Step::Event(self.events.recv().await);
        };

        let deadline = match self.turn_timeout {
            Some(timeout) => Some(*self.deadline.get_or_insert_with(|| Instant::now() + timeout)),
            None => None,
        };

        let events = &mut self.events;
        let mailbox = self.mailboxes.get_mut(&active);

        tokio::select! {
            biased;

            event = events.recv() => Step::Event(event),
            action = async {
                match mailbox {
                    Some(mailbox) => mailbox.next().await,
                    None => None,
                }
            } => Step::Action(active, action),
            _ = async {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => Step::Timeout(active),
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Join {
                name,
                outbound,
                reply,
            } => self.admit(name, outbound, reply),

            SessionEvent::StartGame { player } => match apply(&mut self.state, player, Action::StartGame) {
                Ok(_) => {
                    self.history.push(HistoryEntry {
                        player,
                        action: Action::StartGame,
                    });
                    for line in protocol::game_started() {
                        self.broadcaster.broadcast(&protocol::info(line));
                    }
                    self.broadcast_boards();
                    self.announce_turn();
                }
                Err(rejection) => {
                    info!("Player {} cannot start the game: {}", player, rejection);
                    self.broadcaster.send_to(
                        player,
                        Packet::Error {
                            text: rejection.to_string(),
                        },
                    );
                }
            },

            SessionEvent::Quit { player } => self.player_gone(player, "you left the game"),
            SessionEvent::Disconnected { player } => self.player_gone(player, "connection lost"),
        }
    }

    fn admit(
        &mut self,
        name: String,
        outbound: mpsc::UnboundedSender<Packet>,
        reply: oneshot::Sender<Result<JoinTicket, JoinError>>,
    ) {
        let id = match self.state.add_player(&name) {
            Ok(id) => id,
            Err(e) => {
                info!("Refused '{}': {}", name, e);
                let _ = reply.send(Err(e));
                return;
            }
        };

        let symbol = self.state.player(id).map_or('?', |p| p.symbol);
        let (tx, rx) = mailbox();
        let ticket = JoinTicket {
            player_id: id,
            symbol,
            mailbox: tx,
        };
        if reply.send(Ok(ticket)).is_err() {
            // session went away while waiting for the reply
            self.state.mark_disconnected(id);
            return;
        }

        self.mailboxes.insert(id, rx);
        self.broadcaster.register(id, outbound);
        self.broadcaster.send_to(
            id,
            Packet::Connected {
                player_id: id.0,
                symbol,
                maze: self.maze_name.clone(),
            },
        );
        self.broadcaster
            .send_to(id, protocol::info(protocol::welcome(&self.maze_name, symbol)));
        self.broadcaster.broadcast(&protocol::info(protocol::player_joined(
            &name,
            self.state.connected_count(),
            self.state.capacity(),
        )));
        self.broadcast_boards();
    }

    /// Applies the active player's action. Rejected or not, it ends the turn.
    fn dispatch(&mut self, player: PlayerId, action: Action) {
        match apply(&mut self.state, player, action) {
            Ok(effect) => {
                info!("Player {} played {}", player, action);
                self.history.push(HistoryEntry { player, action });
                self.state.complete_turn();
                self.broadcast_boards();
                if !matches!(effect, Effect::Moved { won: true, .. }) {
                    self.announce_turn();
                }
            }
            Err(rejection) => {
                if rejection.is_rule_violation() {
                    info!("Player {} played {}, rejected: {}", player, action, rejection);
                } else {
                    warn!("Player {} played {} out of phase: {}", player, action, rejection);
                }
                self.broadcaster.send_to(
                    player,
                    Packet::Error {
                        text: rejection.to_string(),
                    },
                );
                self.state.complete_turn();
                self.announce_turn();
            }
        }
    }

    /// Quit and lost connections. During play the player keeps their slot in
    /// the turn order but is never dispatched again.
    fn player_gone(&mut self, player: PlayerId, reason: &str) {
        let held_turn = self.state.active_player() == Some(player);
        let name = self
            .state
            .player(player)
            .map_or_else(|| "someone".to_string(), |p| p.name.clone());
        if apply(&mut self.state, player, Action::Quit).is_err() {
            debug!("Player {} was already gone", player);
            return;
        }
        self.history.push(HistoryEntry {
            player,
            action: Action::Quit,
        });

        self.broadcaster.send_to(
            player,
            Packet::Disconnected {
                reason: reason.to_string(),
            },
        );
        self.broadcaster.unregister(player);
        if let Some(mut mailbox) = self.mailboxes.remove(&player) {
            let mut dropped = 0;
            while mailbox.try_next().is_some() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!("Discarded {} queued actions of player {}", dropped, player);
            }
        }

        self.broadcaster
            .broadcast(&protocol::info(protocol::player_left(&name)));
        self.broadcast_boards();
        if held_turn {
            self.announce_turn();
        }
    }

    fn broadcast_boards(&self) {
        self.broadcaster
            .broadcast_with(|id| protocol::board_packet(&self.state, id));
    }

    fn announce_turn(&self) {
        if let Some(active) = self.state.active_player() {
            self.broadcaster.broadcast_with(|id| {
                protocol::info(protocol::turn_notice(&self.state, id, active))
            });
        }
    }

    fn finish(mut self, outcome: GameOutcome) -> GameReport {
        info!("Game over: {:?} after {} turns", outcome, self.state.turns());
        let game_over = protocol::game_over_packet(&self.state, outcome);
        self.broadcaster.broadcast_with(|id| {
            protocol::info(protocol::outcome_notice(&self.state, id, outcome))
        });
        self.broadcaster.broadcast(&game_over);

        // dropping the queues lets every writer task drain and close
        for id in self.broadcaster.ids() {
            self.broadcaster.unregister(id);
        }

        GameReport {
            outcome,
            history: self.history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::parse_map;
    use shared::Direction::*;
    use tokio::time::timeout;

    const MAP: &str = "\
OOOOOOO
O1  .UO
O OOO O
O2O   O
OOOOOOO
";

    fn scheduler(turn_timeout: Option<Duration>) -> (TurnScheduler, mpsc::UnboundedSender<SessionEvent>) {
        let state = GameState::new(parse_map(MAP).unwrap(), 2);
        TurnScheduler::new(state, "test", turn_timeout)
    }

    async fn join(
        events: &mpsc::UnboundedSender<SessionEvent>,
        name: &str,
    ) -> (Result<JoinTicket, JoinError>, mpsc::UnboundedReceiver<Packet>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let (reply, answer) = oneshot::channel();
        events
            .send(SessionEvent::Join {
                name: name.to_string(),
                outbound,
                reply,
            })
            .unwrap();
        (answer.await.unwrap(), rx)
    }

    async fn drain(mut rx: mpsc::UnboundedReceiver<Packet>) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Some(packet) = rx.recv().await {
            packets.push(packet);
        }
        packets
    }

    fn texts(packets: &[Packet]) -> Vec<String> {
        packets
            .iter()
            .filter_map(|p| match p {
                Packet::Info { text } | Packet::Error { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_race_to_the_exit() {
        let (scheduler, events) = scheduler(None);
        let game = tokio::spawn(scheduler.run());

        let (a, rx_a) = join(&events, "ana").await;
        let (b, rx_b) = join(&events, "bo").await;
        let (a, b) = (a.unwrap(), b.unwrap());

        a.mailbox.push([Action::Move(East), Action::Move(East)]);
        b.mailbox.push([Action::Move(East)]);
        events
            .send(SessionEvent::StartGame { player: a.player_id })
            .unwrap();
        events
            .send(SessionEvent::StartGame { player: b.player_id })
            .unwrap();

        let report = timeout(Duration::from_secs(5), game).await.unwrap().unwrap();
        assert_eq!(report.outcome, GameOutcome::Won(a.player_id));
        assert_eq!(
            report.history.iter().map(|h| h.action).collect::<Vec<_>>(),
            vec![Action::StartGame, Action::Move(East), Action::Move(East)]
        );

        let seen_a = drain(rx_a).await;
        let seen_b = drain(rx_b).await;
        assert!(matches!(seen_a.first(), Some(Packet::Connected { symbol: '1', .. })));
        assert!(texts(&seen_a).contains(&"it is your turn".to_string()));
        assert!(texts(&seen_a).contains(&"you won the game!".to_string()));

        let b_texts = texts(&seen_b);
        assert!(b_texts.contains(&"the game has already started".to_string()));
        assert!(b_texts.contains(&"you cannot pass through the wall".to_string()));
        assert!(b_texts.contains(&"ana won the game!".to_string()));
        assert_eq!(
            seen_b.last(),
            Some(&Packet::GameOver {
                winner: Some("ana".to_string())
            })
        );
    }

    #[tokio::test]
    async fn test_disconnecting_active_player_passes_turn() {
        let (scheduler, events) = scheduler(None);
        let game = tokio::spawn(scheduler.run());

        let (a, _rx_a) = join(&events, "ana").await;
        let (b, rx_b) = join(&events, "bo").await;
        let (a, b) = (a.unwrap(), b.unwrap());

        events
            .send(SessionEvent::StartGame { player: b.player_id })
            .unwrap();
        events
            .send(SessionEvent::Disconnected { player: a.player_id })
            .unwrap();
        b.mailbox.push([
            Action::Pierce(East),
            Action::Move(East),
            Action::Move(East),
            Action::Move(North),
        ]);

        let report = timeout(Duration::from_secs(5), game).await.unwrap().unwrap();
        assert_eq!(report.outcome, GameOutcome::Won(b.player_id));
        assert!(report.history.contains(&HistoryEntry {
            player: a.player_id,
            action: Action::Quit
        }));
        assert!(texts(&drain(rx_b).await).contains(&"ana left the game".to_string()));
    }

    #[tokio::test]
    async fn test_full_and_started_games_refuse_joins() {
        let (scheduler, events) = scheduler(None);
        let game = tokio::spawn(scheduler.run());

        let (a, _rx_a) = join(&events, "ana").await;
        let (_b, _rx_b) = join(&events, "bo").await;
        let (c, _) = join(&events, "cy").await;
        assert_eq!(c.unwrap_err(), JoinError::Full { capacity: 2 });

        let a = a.unwrap();
        events
            .send(SessionEvent::StartGame { player: a.player_id })
            .unwrap();
        let (d, _) = join(&events, "dee").await;
        assert_eq!(d.unwrap_err(), JoinError::AlreadyStarted);

        drop(events);
        game.abort();
    }

    #[tokio::test]
    async fn test_lobby_emptied_aborts() {
        let (scheduler, events) = scheduler(None);
        let game = tokio::spawn(scheduler.run());

        let (a, rx_a) = join(&events, "ana").await;
        events
            .send(SessionEvent::Quit {
                player: a.unwrap().player_id,
            })
            .unwrap();

        let report = timeout(Duration::from_secs(5), game).await.unwrap().unwrap();
        assert_eq!(report.outcome, GameOutcome::Aborted);
        assert!(matches!(
            drain(rx_a).await.last(),
            Some(Packet::Disconnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_event_channel_aborts() {
        let (scheduler, events) = scheduler(None);
        drop(events);
        let report = timeout(Duration::from_secs(5), scheduler.run())
            .await
            .unwrap();
        assert_eq!(report.outcome, GameOutcome::Aborted);
        assert!(report.history.is_empty());
    }

    #[tokio::test]
    async fn test_silent_player_forfeits_with_timeout() {
        let (scheduler, events) = scheduler(Some(Duration::from_millis(50)));
        let game = tokio::spawn(scheduler.run());

        let (a, rx_a) = join(&events, "ana").await;
        let (b, _rx_b) = join(&events, "bo").await;
        let (a, b) = (a.unwrap(), b.unwrap());

        events
            .send(SessionEvent::StartGame { player: a.player_id })
            .unwrap();
        // ana never plays; bo digs through to the exit
        b.mailbox.push([
            Action::Pierce(East),
            Action::Move(East),
            Action::Move(East),
            Action::Move(North),
        ]);

        let report = timeout(Duration::from_secs(5), game).await.unwrap().unwrap();
        assert_eq!(report.outcome, GameOutcome::Won(b.player_id));
        assert!(texts(&drain(rx_a).await).contains(&protocol::turn_forfeited()));
    }
}
