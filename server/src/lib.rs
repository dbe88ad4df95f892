//! # Tank Relay Server Library
//!
//! The server side of the tank game's state sync. It does not simulate
//! anything: clients own their tanks and report their poses, and the server
//! keeps the latest pose per session and fans it back out.
//!
//! ## Core Responsibilities
//!
//! ### Session Management
//! Every WebSocket connection gets a session id at login. Ids start at 1 and
//! are never reused, so a stale id in a late packet can never name a new
//! player.
//!
//! ### Message Relay
//! Shots and combat events reported by one client are relayed to every
//! session. The server tags relayed shots with the sender's session id and
//! never interprets damage or deaths itself.
//!
//! ### Snapshot Broadcasting
//! A fixed-rate loop (10 ms by default) sends the whole transform table to
//! every session. Clients use it to position remote tanks.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! One task owns the [`router::Router`], which in turn owns the
//! [`session_registry::SessionRegistry`] and the [`game::GameState`].
//! Connection tasks forward decoded packets over a channel and receive
//! encoded frames through per-connection outboxes, so no lock guards the
//! shared state.
//!
//! ## Module Organization
//!
//! - `session_registry`: connections, session ids, capacity, fan-out
//! - `game`: the transform table
//! - `router`: maps inbound packets to outbound frames
//! - `network`: sockets, the event loop and the broadcast timer
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "0.0.0.0:8080".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
pub mod router;
pub mod session_registry;

pub use network::{Server, ServerConfig};
pub use router::{Outbound, Router};
