//! Server network layer handling TCP sessions and the turn loop

use crate::game::GameState;
use crate::maze::MazeGrid;
use crate::player::PlayerId;
use crate::scheduler::{GameReport, JoinTicket, SessionEvent, TurnScheduler};
use log::{debug, error, info, warn};
use shared::command::{self, format_actions};
use shared::framing::{read_packet, write_packet};
use shared::{Action, Packet, PROTOCOL_VERSION};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long a fresh connection may take to send its `Connect` packet
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_NAME_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub capacity: usize,
    pub turn_timeout: Option<Duration>,
    pub maze_name: String,
}

/// Accepts players, hands every connection its own reader and writer task,
/// and runs one game on the given maze.
pub struct Server {
    listener: TcpListener,
    grid: MazeGrid,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(addr: &str, grid: MazeGrid, config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            grid,
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the game to completion and returns its report.
    pub async fn run(self) -> io::Result<GameReport> {
        let state = GameState::new(self.grid, self.config.capacity);
        let (scheduler, events) =
            TurnScheduler::new(state, self.config.maze_name, self.config.turn_timeout);

        let acceptor = Self::spawn_acceptor(self.listener, events);
        let report = scheduler.run().await;
        acceptor.abort();

        info!("Server finished: {:?}", report.outcome);
        Ok(report)
    }

    /// Spawns task that accepts connections and starts a session for each
    fn spawn_acceptor(
        listener: TcpListener,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        info!("Connection from {}", addr);
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
                        }
                        tokio::spawn(Self::handle_connection(stream, addr, events.clone()));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Spawns task that drains a session's outbound queue onto its socket.
    /// The socket is closed after a terminal packet, after a failed write, or
    /// once every sender is gone.
    fn spawn_writer(
        mut writer: OwnedWriteHalf,
        mut outbound: mpsc::UnboundedReceiver<Packet>,
        addr: SocketAddr,
    ) -> JoinHandle<io::Result<()>> {
        tokio::spawn(async move {
            let mut result = Ok(());
            while let Some(packet) = outbound.recv().await {
                let terminal = packet.is_terminal();
                if let Err(e) = write_packet(&mut writer, &packet).await {
                    warn!("Failed to send packet to {}: {}", addr, e);
                    result = Err(e);
                    break;
                }
                if terminal {
                    break;
                }
            }
            let _ = writer.shutdown().await;
            debug!("Writer for {} closed", addr);
            result
        })
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) {
        let (mut reader, mut writer) = stream.into_split();

        let name = match Self::handshake(&mut reader, addr).await {
            Ok(name) => name,
            Err(Some(reason)) => {
                info!("Refusing {}: {}", addr, reason);
                let _ = write_packet(&mut writer, &Packet::Disconnected { reason }).await;
                let _ = writer.shutdown().await;
                return;
            }
            Err(None) => return,
        };

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let mut writer_task = Self::spawn_writer(writer, outbound_rx, addr);

        let (reply, answer) = oneshot::channel();
        let join = SessionEvent::Join {
            name: name.clone(),
            outbound: outbound.clone(),
            reply,
        };
        if events.send(join).is_err() {
            warn!("Game is over, dropping connection from {}", addr);
            return;
        }

        let ticket = match answer.await {
            Ok(Ok(ticket)) => ticket,
            Ok(Err(e)) => {
                let _ = outbound.send(Packet::Disconnected {
                    reason: e.to_string(),
                });
                drop(outbound);
                let _ = writer_task.await;
                return;
            }
            Err(_) => return,
        };
        info!(
            "{} joined as player {} '{}' ({})",
            addr, ticket.player_id, name, ticket.symbol
        );

        // the session ends when either direction does
        tokio::select! {
            _ = Self::read_commands(&mut reader, addr, &ticket, &events, &outbound) => {}
            written = &mut writer_task => {
                if let Ok(Err(e)) = written {
                    warn!("Dropping player {} ({}): {}", ticket.player_id, addr, e);
                }
            }
        }

        // no-op if the player already quit
        let _ = events.send(SessionEvent::Disconnected {
            player: ticket.player_id,
        });
        debug!("Reader for {} closed", addr);
    }

    /// Waits for `Connect`. `Err(Some(reason))` is sent back to the peer,
    /// `Err(None)` means the peer is already gone.
    async fn handshake(reader: &mut OwnedReadHalf, addr: SocketAddr) -> Result<String, Option<String>> {
        match timeout(HANDSHAKE_TIMEOUT, read_packet(reader)).await {
            Ok(Ok(Some(Packet::Connect {
                client_version,
                name,
            }))) => {
                if client_version != PROTOCOL_VERSION {
                    return Err(Some(format!(
                        "protocol version mismatch: server speaks {}, client {}",
                        PROTOCOL_VERSION, client_version
                    )));
                }
                Ok(clean_name(&name))
            }
            Ok(Ok(Some(other))) => {
                warn!("Expected Connect from {}, got {:?}", addr, other);
                Err(Some("expected a connect packet".to_string()))
            }
            Ok(Ok(None)) => {
                debug!("{} closed before the handshake", addr);
                Err(None)
            }
            Ok(Err(e)) => {
                warn!("Bad handshake from {}: {}", addr, e);
                Err(None)
            }
            Err(_) => Err(Some("handshake timed out".to_string())),
        }
    }

    /// Reads command lines until the player quits or the connection ends.
    async fn read_commands(
        reader: &mut OwnedReadHalf,
        addr: SocketAddr,
        ticket: &JoinTicket,
        events: &mpsc::UnboundedSender<SessionEvent>,
        outbound: &mpsc::UnboundedSender<Packet>,
    ) {
        let player = ticket.player_id;

        loop {
            let line = match read_packet(reader).await {
                Ok(Some(Packet::Command { line })) => line,
                Ok(Some(Packet::Disconnect)) | Ok(None) => {
                    info!("Player {} disconnected", player);
                    return;
                }
                Ok(Some(other)) => {
                    warn!("Unexpected packet from player {}: {:?}", player, other);
                    let _ = outbound.send(Packet::Error {
                        text: "unexpected packet".to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    warn!("Dropping player {} ({}): {}", player, addr, e);
                    return;
                }
            };

            let actions = match command::parse(&line) {
                Ok(actions) => actions,
                Err(e) => {
                    debug!("Player {} sent invalid line {:?}", player, line);
                    let _ = outbound.send(Packet::Error {
                        text: e.to_string(),
                    });
                    continue;
                }
            };

            if !Self::forward(player, &actions, ticket, events, outbound) {
                return;
            }
        }
    }

    /// Routes one parsed line: turn actions to the mailbox, start and quit to
    /// the turn loop. Returns false once the session should stop reading.
    fn forward(
        player: PlayerId,
        actions: &[Action],
        ticket: &JoinTicket,
        events: &mpsc::UnboundedSender<SessionEvent>,
        outbound: &mpsc::UnboundedSender<Packet>,
    ) -> bool {
        let turn_actions: Vec<Action> = actions
            .iter()
            .copied()
            .filter(Action::is_turn_action)
            .collect();

        if !turn_actions.is_empty() {
            if !ticket.mailbox.push(turn_actions.iter().copied()) {
                return false;
            }
            let _ = outbound.send(Packet::Queued {
                commands: format_actions(&turn_actions),
            });
        }

        for action in actions {
            let event = match action {
                Action::StartGame => SessionEvent::StartGame { player },
                Action::Quit => SessionEvent::Quit { player },
                _ => continue,
            };
            let quit = matches!(event, SessionEvent::Quit { .. });
            if events.send(event).is_err() || quit {
                return false;
            }
        }
        true
    }
}

fn clean_name(raw: &str) -> String {
    let name: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();
    if name.is_empty() {
        "player".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameOutcome;
    use crate::map::parse_map;
    use crate::maze::Cell;
    use crate::player::mailbox;
    use shared::framing::MAX_PACKET_SIZE;
    use tokio_test::assert_err;
    use shared::Direction;

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("  ana  "), "ana");
        assert_eq!(clean_name(""), "player");
        assert_eq!(clean_name("a\u{7}b"), "ab");
        assert_eq!(clean_name(&"x".repeat(50)).len(), MAX_NAME_LEN);
    }

    #[tokio::test]
    async fn test_forward_splits_turn_actions_and_events() {
        let (tx, mut rx) = mailbox();
        let ticket = JoinTicket {
            player_id: PlayerId(1),
            symbol: '1',
            mailbox: tx,
        };
        let (events, mut events_rx) = mpsc::unbounded_channel();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();

        let actions = command::parse("N2CPE").unwrap();
        assert!(Server::forward(PlayerId(1), &actions, &ticket, &events, &outbound));

        assert_eq!(rx.try_next(), Some(Action::Move(Direction::North)));
        assert_eq!(rx.try_next(), Some(Action::Move(Direction::North)));
        assert_eq!(rx.try_next(), Some(Action::Pierce(Direction::East)));
        assert!(matches!(
            events_rx.try_recv(),
            Ok(SessionEvent::StartGame { player: PlayerId(1) })
        ));
        assert_eq!(
            outbound_rx.try_recv().unwrap(),
            Packet::Queued {
                commands: "N2PE".to_string()
            }
        );

        let quit = command::parse("EQ").unwrap();
        assert!(!Server::forward(PlayerId(1), &quit, &ticket, &events, &outbound));
        assert!(matches!(
            events_rx.try_recv(),
            Ok(SessionEvent::Quit { player: PlayerId(1) })
        ));
    }

    #[tokio::test]
    async fn test_writer_reports_failed_writes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _peer = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let (_reader, writer) = stream.into_split();

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = Server::spawn_writer(writer, outbound_rx, addr);
        outbound
            .send(Packet::Info {
                text: "x".repeat(MAX_PACKET_SIZE as usize + 1),
            })
            .unwrap();

        let written = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert_eq!(assert_err!(written).kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_undeliverable_session_counts_as_disconnected() {
        // boards of this grid do not fit in one frame
        let mut grid = MazeGrid::new(130, 130).unwrap();
        grid.add_exit(Cell::new(129, 129)).unwrap();
        grid.set_start_cells(vec![Cell::new(0, 0), Cell::new(0, 1)])
            .unwrap();
        let config = ServerConfig {
            capacity: 2,
            turn_timeout: None,
            maze_name: "huge".to_string(),
        };
        let server = Server::bind("127.0.0.1:0", grid, config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let game = tokio::spawn(server.run());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_packet(
            &mut stream,
            &Packet::Connect {
                client_version: PROTOCOL_VERSION,
                name: "ana".to_string(),
            },
        )
        .await
        .unwrap();

        // the only player's session breaks on the first board, emptying the lobby
        let report = timeout(Duration::from_secs(5), game)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(report.outcome, GameOutcome::Aborted);
        drop(stream);
    }

    #[tokio::test]
    async fn test_version_mismatch_is_refused() {
        let grid = parse_map("OOOOO\nO1 UO\nOOOOO\n").unwrap();
        let config = ServerConfig {
            capacity: 1,
            turn_timeout: None,
            maze_name: "tiny".to_string(),
        };
        let server = Server::bind("127.0.0.1:0", grid, config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let game = tokio::spawn(server.run());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_packet(
            &mut stream,
            &Packet::Connect {
                client_version: PROTOCOL_VERSION + 1,
                name: "old".to_string(),
            },
        )
        .await
        .unwrap();

        match read_packet(&mut stream).await.unwrap() {
            Some(Packet::Disconnected { reason }) => assert!(reason.contains("version")),
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(read_packet(&mut stream).await.unwrap(), None);
        game.abort();
    }
}
