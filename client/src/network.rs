use crate::error::ClientError;
use crate::game::{ClientGameState, Phase};
use crate::input::InputManager;
use crate::rendering::{Hud, Renderer};
use crate::scene::MemoryScene;
use crate::tank::Tank;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use macroquad::prelude::{is_key_pressed, next_frame, KeyCode};
use shared::{ClientPacket, Envelope, LoginRequest, ServerPacket};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_tungstenite::tungstenite::Message;

/// What the replication manager surfaces to the game loop
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationEvent {
    /// The server assigned our session id
    LoggedIn(u32),
    Packet(ServerPacket),
    /// The socket is gone for good; there is no reconnect
    Disconnected,
}

/// Owns the WebSocket connection to the relay server.
///
/// Reading and writing happen on background tasks; the game loop only ever
/// touches the two channels, so neither [`poll`](Self::poll) nor
/// [`send`](Self::send) blocks a frame.
pub struct ReplicationManager {
    session_id: Option<u32>,
    connected: bool,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    incoming: mpsc::UnboundedReceiver<ReplicationEvent>,
}

impl ReplicationManager {
    /// Opens the socket and queues the login handshake.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        info!("Connecting to {}...", url);
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (incoming_tx, incoming) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                if let Err(e) = ws_sender.send(Message::text(frame)).await {
                    error!("Error sending frame: {}", e);
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = ws_receiver.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        match Envelope::<ServerPacket>::decode(text.as_str()) {
                            Ok(envelope) => {
                                if incoming_tx
                                    .send(ReplicationEvent::Packet(envelope.packet))
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            Err(e) => warn!("Dropping malformed frame: {}", e),
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        error!("Error receiving frame: {}", e);
                        break;
                    }
                }
            }
            let _ = incoming_tx.send(ReplicationEvent::Disconnected);
        });

        Self::from_channels(outgoing, incoming)
    }

    /// Builds a manager over already-running transport tasks and queues the
    /// login handshake on `outgoing`.
    pub fn from_channels(
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<ReplicationEvent>,
    ) -> Result<Self, ClientError> {
        let manager = Self {
            session_id: None,
            connected: true,
            outgoing: Some(outgoing),
            incoming,
        };
        manager.send(ClientPacket::Login(LoginRequest::default()))?;
        Ok(manager)
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Drains everything received since the last call without blocking.
    ///
    /// The `login` reply is consumed here and reported as
    /// [`ReplicationEvent::LoggedIn`].
    pub fn poll(&mut self) -> Vec<ReplicationEvent> {
        let mut events = Vec::new();

        loop {
            match self.incoming.try_recv() {
                Ok(ReplicationEvent::Packet(ServerPacket::Login(player))) => {
                    match self.session_id {
                        None => {
                            info!("Connected! Session ID: {}", player.userid);
                            self.session_id = Some(player.userid);
                            events.push(ReplicationEvent::LoggedIn(player.userid));
                        }
                        Some(id) if id == player.userid => {
                            debug!("Repeated login reply for session {}", id)
                        }
                        Some(id) => warn!(
                            "Server re-assigned session {} as {}, keeping {}",
                            id, player.userid, id
                        ),
                    }
                }
                Ok(ReplicationEvent::Disconnected) | Err(TryRecvError::Disconnected) => {
                    if self.connected {
                        warn!("Disconnected from server");
                        self.connected = false;
                        self.outgoing = None;
                        events.push(ReplicationEvent::Disconnected);
                    }
                    break;
                }
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
            }
        }

        events
    }

    /// Sends a packet tagged with our session id (0 before login).
    pub fn send(&self, packet: ClientPacket) -> Result<(), ClientError> {
        let outgoing = self.outgoing.as_ref().ok_or(ClientError::ConnectionClosed)?;
        let frame = Envelope::new(Some(self.session_id.unwrap_or(0)), packet).encode()?;
        outgoing
            .send(frame)
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Closes the connection. Dropping the writer's channel makes it send a
    /// close frame.
    pub fn dispose(&mut self) {
        if self.outgoing.take().is_some() {
            info!("Closing connection");
        }
        self.connected = false;
    }
}

/// The playable client: frame loop tying input, network, simulation and view
pub struct Client {
    // Keeps the networking tasks alive for as long as the client runs.
    _runtime: tokio::runtime::Runtime,
    manager: ReplicationManager,
    game_state: ClientGameState,
    scene: MemoryScene,
    input_manager: InputManager,
    renderer: Renderer,
}

impl Client {
    pub fn new(
        server_url: &str,
        width: usize,
        height: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let runtime = tokio::runtime::Runtime::new()?;
        let manager = runtime.block_on(ReplicationManager::connect(server_url))?;

        Ok(Client {
            _runtime: runtime,
            manager,
            game_state: ClientGameState::new(),
            scene: MemoryScene::new(),
            input_manager: InputManager::new(),
            renderer: Renderer::new(width, height),
        })
    }

    fn handle_replication(&mut self) -> Result<(), ClientError> {
        for event in self.manager.poll() {
            match event {
                ReplicationEvent::LoggedIn(id) => {
                    let spawn = Tank::random_spawn_position(&mut rand::thread_rng());
                    self.game_state.on_login(id, spawn, &mut self.scene)?;
                }
                ReplicationEvent::Packet(packet) => {
                    self.game_state.handle_packet(packet, &mut self.scene)?;
                }
                ReplicationEvent::Disconnected => {
                    warn!("Connection lost; remote tanks will no longer update");
                    self.game_state.on_disconnected(&mut self.scene)?;
                }
            }
        }
        Ok(())
    }

    fn flush_outbox(&mut self) {
        for packet in self.game_state.drain_outbox() {
            if !self.manager.is_connected() {
                break;
            }
            if let Err(e) = self.manager.send(packet) {
                warn!("Error sending packet: {}", e);
            }
        }
    }

    fn hud(&self) -> Hud {
        Hud {
            session_id: self.manager.session_id(),
            connected: self.manager.is_connected(),
            health: self.game_state.local_tank().map(|tank| tank.health()),
            frags: self.game_state.frags(),
            phase: self.game_state.phase(),
            tank_count: self.game_state.tanks().len(),
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            if is_key_pressed(KeyCode::Escape) {
                break;
            }

            for event in self
                .input_manager
                .update(&self.renderer, self.scene.camera_pivot())
            {
                self.game_state.apply_input(event);
            }

            let result = self
                .handle_replication()
                .and_then(|()| self.game_state.step(&mut self.scene));
            if let Err(e) = result {
                self.game_state.halt(&e);
            }

            // Outbox first so our own death notice still goes out.
            self.flush_outbox();

            if self.game_state.phase() == Phase::Dead && self.manager.is_connected() {
                self.manager.dispose();
            }

            self.renderer.render(&self.scene, &self.hud());

            next_frame().await;
        }

        self.manager.dispose();
        Ok(())
    }
}
