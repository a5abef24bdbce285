//! # Maze Race Client Library
//!
//! A terminal client for the maze race server. It forwards typed command
//! lines and prints everything the server sends back. The client keeps no
//! game state of its own: boards arrive fully rendered and the server decides
//! every move.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Reads lines from the terminal and checks them against the shared command
//! grammar, so an obviously invalid line is reported locally instead of being
//! sent.
//!
//! ### Network Module (`network`)
//! Owns the TCP connection: the handshake, a receiver task for incoming
//! packets, and the main loop racing server packets against typed lines.
//!
//! ### Rendering Module (`rendering`)
//! Formats boards, announcements and errors for the terminal.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::InputManager;
//! use client::network::Client;
//! use client::rendering::Renderer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:12800", "ana").await?;
//!
//!     // Runs until the server ends the session
//!     client.run(InputManager::stdin(), Renderer::stdout()).await?;
//!     Ok(())
//! }
//! ```

pub mod input;
pub mod network;
pub mod rendering;
