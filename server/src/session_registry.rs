//! Connection and session bookkeeping for the relay server
//!
//! This module tracks every open WebSocket connection and the session bound
//! to it once the client has logged in:
//! - Connection lifecycle (attach on handshake, detach on close)
//! - Session id assignment from a monotonically increasing counter
//! - Capacity enforcement for concurrent sessions
//! - Fan-out of encoded frames to one or all sessions
//!
//! The registry never touches the socket directly. Each connection owns a
//! bounded outbound channel drained by its writer task. Sending from here
//! never blocks the server loop; a connection whose outbox is full has
//! stopped reading and is reported back as stalled.

use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Server-internal handle for one accepted socket.
pub type ConnectionId = u64;

/// Player-visible identifier assigned at login.
pub type SessionId = u32;

/// Frames a connection may have queued before it counts as stalled.
///
/// At the default 10 ms broadcast period this is a few seconds of snapshots.
pub const OUTBOX_CAPACITY: usize = 256;

/// What happened to a frame handed to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The outbox is full; the frame was dropped
    Stalled,
    /// The writer has gone away or the session is unknown
    Gone,
}

/// Result of fanning one frame out to many sessions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Fanout {
    pub delivered: usize,
    /// Connections whose outbox was full
    pub stalled: Vec<ConnectionId>,
}

/// One accepted WebSocket connection and its optional session
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// Remote address, kept for logging
    pub addr: SocketAddr,
    /// Session bound to this connection after a successful login
    pub session_id: Option<SessionId>,
    pub connected_at: Instant,
    outbox: mpsc::Sender<String>,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, outbox: mpsc::Sender<String>) -> Self {
        Self {
            id,
            addr,
            session_id: None,
            connected_at: Instant::now(),
            outbox,
        }
    }

    /// Queues a text frame for the writer task without waiting.
    ///
    /// [`Delivery::Gone`] means the socket has already closed and the close
    /// event is still in flight.
    pub fn send(&self, frame: String) -> Delivery {
        match self.outbox.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Stalled,
            Err(TrySendError::Closed(_)) => Delivery::Gone,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_id.is_some()
    }
}

/// Result of a login attempt on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// A fresh session id was assigned
    Registered(SessionId),
    /// The connection already had a session; nothing changed
    AlreadyRegistered(SessionId),
    /// The server is at its session limit
    Full,
    /// No such connection is attached
    UnknownConnection,
}

/// Tracks connections and the sessions bound to them
///
/// Session ids start at 1 and are never handed out twice for the lifetime
/// of the registry, even after the session that held one disconnects.
pub struct SessionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    /// Logged-in sessions, ordered so fan-out is deterministic
    sessions: BTreeMap<SessionId, ConnectionId>,
    next_session_id: SessionId,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            connections: HashMap::new(),
            sessions: BTreeMap::new(),
            next_session_id: 1,
            max_sessions,
        }
    }

    /// Registers a freshly accepted connection. It has no session until login.
    pub fn attach(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
        outbox: mpsc::Sender<String>,
    ) {
        debug!("Connection {} attached from {}", id, addr);
        self.connections.insert(id, Connection::new(id, addr, outbox));
    }

    /// Binds a new session to the connection.
    pub fn login(&mut self, connection_id: ConnectionId) -> LoginOutcome {
        let at_capacity = self.sessions.len() >= self.max_sessions;

        let Some(connection) = self.connections.get_mut(&connection_id) else {
            return LoginOutcome::UnknownConnection;
        };

        if let Some(existing) = connection.session_id {
            return LoginOutcome::AlreadyRegistered(existing);
        }

        if at_capacity {
            return LoginOutcome::Full;
        }

        let session_id = self.next_session_id;
        self.next_session_id += 1;

        connection.session_id = Some(session_id);
        self.sessions.insert(session_id, connection_id);

        info!("Session {} logged in from {}", session_id, connection.addr);
        LoginOutcome::Registered(session_id)
    }

    /// Forgets a connection. Returns the session it carried, if any.
    pub fn detach(&mut self, connection_id: ConnectionId) -> Option<SessionId> {
        let connection = self.connections.remove(&connection_id)?;
        let session_id = connection.session_id?;

        self.sessions.remove(&session_id);
        info!("Session {} disconnected", session_id);
        Some(session_id)
    }

    pub fn session_of(&self, connection_id: ConnectionId) -> Option<SessionId> {
        self.connections
            .get(&connection_id)
            .and_then(|connection| connection.session_id)
    }

    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Connection currently carrying a session
    pub fn connection_of(&self, session_id: SessionId) -> Option<ConnectionId> {
        self.sessions.get(&session_id).copied()
    }

    /// Sends a frame to one session.
    pub fn send_to(&self, session_id: SessionId, frame: String) -> Delivery {
        self.sessions
            .get(&session_id)
            .and_then(|connection_id| self.connections.get(connection_id))
            .map_or(Delivery::Gone, |connection| connection.send(frame))
    }

    /// Sends a frame to every logged-in session except `exclude`.
    pub fn broadcast(&self, frame: &str, exclude: Option<SessionId>) -> Fanout {
        let mut fanout = Fanout::default();
        for (session_id, connection_id) in &self.sessions {
            if Some(*session_id) == exclude {
                continue;
            }
            let Some(connection) = self.connections.get(connection_id) else {
                continue;
            };
            match connection.send(frame.to_string()) {
                Delivery::Queued => fanout.delivered += 1,
                Delivery::Stalled => fanout.stalled.push(*connection_id),
                Delivery::Gone => {}
            }
        }
        fanout
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Number of logged-in sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of open connections, logged in or not
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
