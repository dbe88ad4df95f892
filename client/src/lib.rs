//! # Tank Game Client Library
//!
//! Client side of the tank game's state sync: the connection to the relay
//! server, replication of tanks and projectiles, and owner-authoritative
//! combat.
//!
//! ## Authority Model
//!
//! There is no authoritative simulation anywhere. Each client owns exactly
//! one tank, drives it from local input and reports its pose every step.
//! Every other tank is a remote sink that copies the latest pose from the
//! server's snapshot broadcast.
//!
//! Projectiles are simulated by every client, but only the client that
//! fired one tests it for hits. A hit is reported as `applydamage`, relayed
//! to everyone and applied on receipt. The victim's own client is the one
//! that announces its death.
//!
//! ## Module Organization
//!
//! - `network`: [`ReplicationManager`] over tokio-tungstenite, and the
//!   frame loop in [`network::Client`]
//! - `game`: [`ClientGameState`], which applies server packets and runs the
//!   fixed simulation step
//! - `tank` / `projectile`: the replicated entities
//! - `combat`: hit detection for locally owned projectiles
//! - `scene`: the [`SceneGraph`] seam entities draw through, plus
//!   [`MemoryScene`]
//! - `input`: [`InputEvent`] edges and the macroquad capture
//! - `rendering`: a flat top-down debug view
//!
//! ## Usage Example
//!
//! ```rust
//! use client::{ClientGameState, MemoryScene};
//! use shared::{PlayerRef, ServerPacket, Vector3};
//!
//! let mut scene = MemoryScene::new();
//! let mut game = ClientGameState::new();
//!
//! game.on_login(1, Vector3::ZERO, &mut scene)?;
//! game.handle_packet(ServerPacket::SpawnPlayer(PlayerRef { userid: 2 }), &mut scene)?;
//! game.step(&mut scene)?;
//!
//! // The step queued our pose for the server.
//! assert!(!game.drain_outbox().is_empty());
//! # Ok::<(), client::ClientError>(())
//! ```

pub mod combat;
pub mod error;
pub mod game;
pub mod input;
pub mod network;
pub mod projectile;
pub mod rendering;
pub mod scene;
pub mod tank;

pub use error::ClientError;
pub use game::{ClientGameState, Phase};
pub use input::{InputEvent, InputState, Ray};
pub use network::{ReplicationEvent, ReplicationManager};
pub use scene::{MemoryScene, NodeId, NodeKind, SceneError, SceneGraph};
pub use tank::{Authority, Tank};
