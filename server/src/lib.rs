//! # Maze Race Server Library
//!
//! This library provides the authoritative server for the multiplayer maze
//! race. Players connect over TCP, type movement and barrier commands, and
//! race each other through a maze of rooms to the first exit. The server owns
//! the only copy of the game and decides every outcome.
//!
//! ## Core Responsibilities
//!
//! ### Turn Arbitration
//! Commands arrive from every connection at any time. The server queues them
//! per player and applies exactly one action per turn, always in the turn
//! order fixed when the game started. A rejected action still ends that
//! player's turn, and a player who leaves never stalls the others.
//!
//! ### Rule Enforcement
//! Movement is blocked by walls and the closed border. Players may pierce a
//! wall into an open passage or wall up a door; nothing ever turns back into
//! a door.
//!
//! ### State Broadcasting
//! After every applied action each session receives a fresh board rendered
//! from its own point of view, followed by whose turn it is.
//!
//! ## Architecture Design
//!
//! ### Single Writer
//! The `scheduler` task owns the `GameState` outright. Session tasks only
//! talk to it through channels: a mailbox per player for turn actions and a
//! shared event channel for joins, starts, quits and disconnects. No locks
//! guard the game.
//!
//! ### One Reader and One Writer per Connection
//! Every TCP connection gets a reader task that parses command lines and a
//! writer task that drains an outbound FIFO queue. Packets are framed with a
//! length prefix (see `shared::framing`).
//!
//! ## Module Organization
//!
//! - `maze`: rooms, connectors and exits
//! - `map`: the plain-text map format and start-room selection
//! - `player`: participants and their mailboxes
//! - `game`: roster, phase and turn pointer
//! - `rules`: validation and application of single actions
//! - `protocol`: boards and announcements sent to players
//! - `broadcaster`: per-session outbound queues
//! - `scheduler`: the turn loop
//! - `network`: TCP acceptor and session tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::map::{choose_start_cells, parse_map, DEFAULT_MAP};
//! use server::network::{Server, ServerConfig};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut grid = parse_map(DEFAULT_MAP)?;
//!     let capacity = choose_start_cells(&mut grid, 4, &mut StdRng::seed_from_u64(7));
//!
//!     let config = ServerConfig {
//!         capacity,
//!         turn_timeout: None,
//!         maze_name: "courtyard".to_string(),
//!     };
//!     let server = Server::bind("127.0.0.1:12800", grid, config).await?;
//!
//!     // Runs until a player reaches an exit or everybody leaves
//!     let report = server.run().await?;
//!     println!("{:?}", report.outcome);
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod game;
pub mod map;
pub mod maze;
pub mod network;
pub mod player;
pub mod protocol;
pub mod rules;
pub mod scheduler;
