//! Routing of decoded client packets onto server state
//!
//! The router owns the session registry and the transform table, so every
//! mutation of shared server state goes through it. Handlers never touch a
//! socket; they return [`Outbound`] instructions which the server loop hands
//! back to [`Router::dispatch`]. That keeps routing decisions testable with
//! nothing more than a few channels.

use crate::game::GameState;
use crate::session_registry::{ConnectionId, Delivery, LoginOutcome, SessionId, SessionRegistry};
use log::{debug, error, info, warn};
use shared::{ClientPacket, Envelope, LoginRequest, PlayerRef, ProjectileSpawn, ServerPacket, WirePacket};
use std::collections::VecDeque;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// What the server should emit as a result of handling an event
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Send {
        session: SessionId,
        packet: ServerPacket,
    },
    Broadcast {
        packet: ServerPacket,
        exclude: Option<SessionId>,
    },
    /// Drop the connection without a session ever being bound to it
    Close { connection: ConnectionId },
}

pub struct Router {
    registry: SessionRegistry,
    game_state: GameState,
    despawn_on_disconnect: bool,
}

impl Router {
    pub fn new(max_sessions: usize, despawn_on_disconnect: bool) -> Self {
        Self {
            registry: SessionRegistry::new(max_sessions),
            game_state: GameState::new(),
            despawn_on_disconnect,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    pub fn connect(
        &mut self,
        connection: ConnectionId,
        addr: SocketAddr,
        outbox: mpsc::Sender<String>,
    ) {
        self.registry.attach(connection, addr, outbox);
    }

    /// Applies one inbound packet and returns the frames it causes.
    ///
    /// The sender is identified by the session bound to its connection; the
    /// `userid` the client wrote into the envelope is only checked, never
    /// trusted.
    pub fn handle_packet(
        &mut self,
        connection: ConnectionId,
        envelope: Envelope<ClientPacket>,
    ) -> Vec<Outbound> {
        let Some(session) = self.registry.session_of(connection) else {
            return match envelope.packet {
                ClientPacket::Login(request) => self.login(connection, &request),
                other => {
                    warn!(
                        "Dropping `{}` from connection {} before login",
                        other.action(),
                        connection
                    );
                    Vec::new()
                }
            };
        };

        if let Some(claimed) = envelope.userid.filter(|claimed| *claimed != session) {
            debug!(
                "Session {} sent `{}` claiming userid {}",
                session,
                envelope.packet.action(),
                claimed
            );
        }

        match envelope.packet {
            ClientPacket::Login(_) => {
                debug!("Session {} logged in again, re-sending its id", session);
                vec![Outbound::Send {
                    session,
                    packet: ServerPacket::Login(PlayerRef { userid: session }),
                }]
            }
            ClientPacket::CharacterTick(tick) => {
                self.game_state.upsert(tick.into_record(session));
                Vec::new()
            }
            ClientPacket::SpawnProjectile(shot) => {
                debug!("Session {} fired towards {:?}", session, shot.aim_point);
                vec![Outbound::Broadcast {
                    packet: ServerPacket::SpawnProjectile(ProjectileSpawn {
                        userid: session,
                        position: shot.position,
                        aim_point: shot.aim_point,
                    }),
                    exclude: None,
                }]
            }
            // Combat events are reported by clients and relayed as-is.
            ClientPacket::ApplyDamage(damage) => vec![Outbound::Broadcast {
                packet: ServerPacket::ApplyDamage(damage),
                exclude: None,
            }],
            ClientPacket::CharacterDead(death) => {
                info!("Session {} reports {} killed by {}", session, death.who, death.by);
                vec![Outbound::Broadcast {
                    packet: ServerPacket::CharacterDead(death),
                    exclude: None,
                }]
            }
            ClientPacket::Unknown { action } => {
                debug!("Ignoring unknown action `{}` from session {}", action, session);
                Vec::new()
            }
        }
    }

    fn login(&mut self, connection: ConnectionId, request: &LoginRequest) -> Vec<Outbound> {
        match self.registry.login(connection) {
            LoginOutcome::Registered(session) => {
                debug!("Session {} announced itself as {:?}", session, request.name);
                vec![
                    Outbound::Send {
                        session,
                        packet: ServerPacket::Login(PlayerRef { userid: session }),
                    },
                    Outbound::Broadcast {
                        packet: ServerPacket::SpawnPlayer(PlayerRef { userid: session }),
                        exclude: Some(session),
                    },
                ]
            }
            LoginOutcome::AlreadyRegistered(session) => vec![Outbound::Send {
                session,
                packet: ServerPacket::Login(PlayerRef { userid: session }),
            }],
            LoginOutcome::Full => {
                warn!("Refusing login on connection {}: server full", connection);
                vec![Outbound::Close { connection }]
            }
            LoginOutcome::UnknownConnection => {
                warn!("Login from unknown connection {}", connection);
                Vec::new()
            }
        }
    }

    /// Forgets a closed connection and, if configured, despawns its tank.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Vec<Outbound> {
        let Some(session) = self.registry.detach(connection) else {
            return Vec::new();
        };

        if !self.despawn_on_disconnect {
            return Vec::new();
        }

        self.game_state.remove(session);
        vec![Outbound::Broadcast {
            packet: ServerPacket::DespawnPlayer(PlayerRef { userid: session }),
            exclude: None,
        }]
    }

    /// Advances the tick counter and builds the snapshot broadcast.
    ///
    /// Returns `None` while nobody is logged in.
    pub fn game_tick(&mut self) -> Option<Outbound> {
        self.game_state.tick += 1;

        if self.registry.is_empty() {
            return None;
        }

        Some(Outbound::Broadcast {
            packet: ServerPacket::GameTick(self.game_state.snapshot()),
            exclude: None,
        })
    }

    /// Encodes and queues an outbound instruction.
    ///
    /// A session whose outbox is full has stopped reading. It is dropped like
    /// a closed connection, and whatever that emits is dispatched in turn.
    pub fn dispatch(&mut self, outbound: Outbound) {
        let mut pending = VecDeque::from([outbound]);

        while let Some(outbound) = pending.pop_front() {
            for connection in self.deliver(outbound) {
                warn!("Connection {} stopped reading, dropping it", connection);
                pending.extend(self.disconnect(connection));
            }
        }
    }

    /// Queues one instruction and returns the connections found stalled.
    fn deliver(&mut self, outbound: Outbound) -> Vec<ConnectionId> {
        match outbound {
            Outbound::Send { session, packet } => match Envelope::anonymous(packet).encode() {
                Ok(frame) => match self.registry.send_to(session, frame) {
                    Delivery::Queued => Vec::new(),
                    Delivery::Stalled => self.registry.connection_of(session).into_iter().collect(),
                    Delivery::Gone => {
                        debug!("Session {} is gone, frame dropped", session);
                        Vec::new()
                    }
                },
                Err(e) => {
                    error!("Failed to encode frame for session {}: {}", session, e);
                    Vec::new()
                }
            },
            Outbound::Broadcast { packet, exclude } => {
                // Encode once so every session receives identical bytes.
                match Envelope::anonymous(packet).encode() {
                    Ok(frame) => self.registry.broadcast(&frame, exclude).stalled,
                    Err(e) => {
                        error!("Failed to encode broadcast: {}", e);
                        Vec::new()
                    }
                }
            }
            Outbound::Close { connection } => {
                // Dropping the outbox ends the writer task, which closes the socket.
                self.registry.detach(connection);
                Vec::new()
            }
        }
    }
}
