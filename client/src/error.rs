use crate::scene::SceneError;
use shared::ProtocolError;
use thiserror::Error;

/// Anything that can stop the client simulation.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection to the server is closed")]
    ConnectionClosed,
}
