//! Server network layer handling WebSocket connections and the broadcast loop

use crate::router::Router;
use crate::session_registry::{ConnectionId, OUTBOX_CAPACITY};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientPacket, Envelope, BROADCAST_INTERVAL_MS};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Period of the snapshot broadcast
    pub broadcast_interval: Duration,
    /// Maximum concurrent logged-in sessions
    pub max_sessions: usize,
    /// Broadcast `despawnplayer` and prune the transform when a session closes
    pub despawn_on_disconnect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            broadcast_interval: Duration::from_millis(BROADCAST_INTERVAL_MS),
            max_sessions: 32,
            despawn_on_disconnect: true,
        }
    }
}

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        connection: ConnectionId,
        addr: SocketAddr,
        outbox: mpsc::Sender<String>,
    },
    PacketReceived {
        connection: ConnectionId,
        envelope: Envelope<ClientPacket>,
    },
    Closed {
        connection: ConnectionId,
    },
}

/// Relay server: accepts sockets, routes their packets and broadcasts snapshots
///
/// All shared state lives in the [`Router`], which only the main loop in
/// [`Server::run`] touches. Connection tasks talk to it through channels, so
/// ingestion and the broadcast timer never contend for a lock.
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    config: ServerConfig,
    router: Router,
    next_connection_id: Arc<AtomicU64>,

    events_tx: Option<mpsc::UnboundedSender<ServerEvent>>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            router: Router::new(config.max_sessions, config.despawn_on_disconnect),
            config,
            next_connection_id: Arc::new(AtomicU64::new(1)),
            events_tx: Some(events_tx),
            events_rx,
        })
    }

    /// Bound address; useful when binding to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the task that accepts sockets and starts a task per connection
    fn spawn_acceptor(
        listener: TcpListener,
        next_connection_id: Arc<AtomicU64>,
        events_tx: mpsc::UnboundedSender<ServerEvent>,
    ) {
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let connection = next_connection_id.fetch_add(1, Ordering::Relaxed);
                        debug!("New TCP connection {} from {}", connection, addr);

                        let events_tx = events_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                Self::handle_connection(stream, addr, connection, events_tx).await
                            {
                                warn!("Connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Runs one WebSocket connection until the peer goes away
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        connection: ConnectionId,
        events_tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (outbox, mut outbox_rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
        if events_tx
            .send(ServerEvent::Connected {
                connection,
                addr,
                outbox,
            })
            .is_err()
        {
            return Ok(());
        }

        // Writer: ends when the registry drops the outbox or the socket fails
        tokio::spawn(async move {
            while let Some(frame) = outbox_rx.recv().await {
                if let Err(e) = ws_sender.send(Message::text(frame)).await {
                    debug!("Write to connection {} failed: {}", connection, e);
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        while let Some(message) = ws_receiver.next().await {
            match message {
                Ok(Message::Text(text)) => match Envelope::<ClientPacket>::decode(text.as_str()) {
                    Ok(envelope) => {
                        if events_tx
                            .send(ServerEvent::PacketReceived {
                                connection,
                                envelope,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping malformed frame from {}: {}", addr, e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("Read from connection {} failed: {}", connection, e);
                    break;
                }
            }
        }

        let _ = events_tx.send(ServerEvent::Closed { connection });
        Ok(())
    }

    fn handle_event(&mut self, event: ServerEvent) {
        let outbound = match event {
            ServerEvent::Connected {
                connection,
                addr,
                outbox,
            } => {
                info!("WebSocket connection {} established from {}", connection, addr);
                self.router.connect(connection, addr, outbox);
                Vec::new()
            }
            ServerEvent::PacketReceived {
                connection,
                envelope,
            } => self.router.handle_packet(connection, envelope),
            ServerEvent::Closed { connection } => self.router.disconnect(connection),
        };

        for out in outbound {
            self.router.dispatch(out);
        }
    }

    /// Broadcasts the current transform table to all sessions
    fn broadcast_game_state(&mut self) {
        if let Some(out) = self.router.game_tick() {
            self.router.dispatch(out);
        }

        let state = self.router.game_state();
        if state.tick % 100 == 0 && !self.router.registry().is_empty() {
            debug!(
                "Tick {}: {} sessions, {} transforms",
                state.tick,
                self.router.registry().len(),
                state.len()
            );
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = self.listener.take().ok_or("server is already running")?;
        let events_tx = self.events_tx.take().ok_or("server is already running")?;

        // The acceptor holds the only event sender, so the loop ends once it
        // has died and every connection task has finished.
        Self::spawn_acceptor(listener, Arc::clone(&self.next_connection_id), events_tx);

        let mut tick_interval = interval(self.config.broadcast_interval);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.broadcast_game_state();
                },
            }
        }

        Ok(())
    }
}
