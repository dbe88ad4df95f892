//! JSON wire protocol shared by the relay server and the game client
//!
//! Every frame is a text envelope of the form
//! `{ "action": string, "userid": number?, "data": object }`. Decoding is
//! two-phase: the envelope is parsed first, then the action name selects a
//! typed payload. Action names outside the closed set decode to an explicit
//! `Unknown` variant so callers decide what to do with them instead of
//! failing the whole frame.

use crate::{TransformRecord, Vector3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub const LOGIN: &str = "login";
pub const SPAWN_PLAYER: &str = "spawnplayer";
pub const DESPAWN_PLAYER: &str = "despawnplayer";
pub const CHARACTER_TICK: &str = "charactertick";
pub const GAME_TICK: &str = "gametick";
pub const SPAWN_PROJECTILE: &str = "spawnprojectile";
pub const APPLY_DAMAGE: &str = "applydamage";
pub const CHARACTER_DEAD: &str = "characterdead";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed `{action}` payload: {source}")]
    Payload {
        action: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot encode unknown action `{0}`")]
    UnknownAction(String),
}

/// Placeholder identity sent with the client's first message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub id: u32,
    pub name: String,
}

impl Default for LoginRequest {
    fn default() -> Self {
        Self {
            id: 0,
            name: "null".to_string(),
        }
    }
}

/// Payload naming a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub userid: u32,
}

/// Per-step pose of the sender's tank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CharacterTick {
    pub position: Vector3,
    pub rotation: Vector3,
    #[serde(rename = "towerRotation")]
    pub turret_rotation: Vector3,
    #[serde(rename = "aimPosition")]
    pub aim_point: Vector3,
}

impl CharacterTick {
    pub fn into_record(self, userid: u32) -> TransformRecord {
        TransformRecord {
            userid,
            position: self.position,
            rotation: self.rotation,
            turret_rotation: self.turret_rotation,
            aim_point: self.aim_point,
        }
    }
}

/// A shot as fired by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileShot {
    pub position: Vector3,
    #[serde(rename = "aimPosition")]
    pub aim_point: Vector3,
}

/// A shot as relayed by the server, tagged with its owner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSpawn {
    pub userid: u32,
    pub position: Vector3,
    #[serde(rename = "aimPosition")]
    pub aim_point: Vector3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Damage {
    pub by: u32,
    pub to: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Death {
    pub who: u32,
    pub by: u32,
}

/// Full transform table keyed by session id. Ordered so that encoding an
/// unchanged table always yields the same bytes.
pub type Snapshot = BTreeMap<u32, TransformRecord>;

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    Login(LoginRequest),
    CharacterTick(CharacterTick),
    SpawnProjectile(ProjectileShot),
    ApplyDamage(Damage),
    CharacterDead(Death),
    Unknown { action: String },
}

/// Messages the server sends to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket {
    Login(PlayerRef),
    SpawnPlayer(PlayerRef),
    DespawnPlayer(PlayerRef),
    GameTick(Snapshot),
    SpawnProjectile(ProjectileSpawn),
    ApplyDamage(Damage),
    CharacterDead(Death),
    Unknown { action: String },
}

/// A closed set of actions that can be carried inside an [`Envelope`].
pub trait WirePacket: Sized {
    fn action(&self) -> &str;
    fn to_data(&self) -> Result<Value, ProtocolError>;
    fn from_parts(action: &str, data: Value) -> Result<Self, ProtocolError>;
}

fn payload<T: DeserializeOwned>(action: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::Payload {
        action: action.to_string(),
        source,
    })
}

impl WirePacket for ClientPacket {
    fn action(&self) -> &str {
        match self {
            ClientPacket::Login(_) => LOGIN,
            ClientPacket::CharacterTick(_) => CHARACTER_TICK,
            ClientPacket::SpawnProjectile(_) => SPAWN_PROJECTILE,
            ClientPacket::ApplyDamage(_) => APPLY_DAMAGE,
            ClientPacket::CharacterDead(_) => CHARACTER_DEAD,
            ClientPacket::Unknown { action } => action,
        }
    }

    fn to_data(&self) -> Result<Value, ProtocolError> {
        let value = match self {
            ClientPacket::Login(login) => serde_json::to_value(login)?,
            ClientPacket::CharacterTick(tick) => serde_json::to_value(tick)?,
            ClientPacket::SpawnProjectile(shot) => serde_json::to_value(shot)?,
            ClientPacket::ApplyDamage(damage) => serde_json::to_value(damage)?,
            ClientPacket::CharacterDead(death) => serde_json::to_value(death)?,
            ClientPacket::Unknown { action } => {
                return Err(ProtocolError::UnknownAction(action.clone()))
            }
        };
        Ok(value)
    }

    fn from_parts(action: &str, data: Value) -> Result<Self, ProtocolError> {
        let packet = match action {
            LOGIN => ClientPacket::Login(payload(action, data)?),
            CHARACTER_TICK => ClientPacket::CharacterTick(payload(action, data)?),
            SPAWN_PROJECTILE => ClientPacket::SpawnProjectile(payload(action, data)?),
            APPLY_DAMAGE => ClientPacket::ApplyDamage(payload(action, data)?),
            CHARACTER_DEAD => ClientPacket::CharacterDead(payload(action, data)?),
            other => ClientPacket::Unknown {
                action: other.to_string(),
            },
        };
        Ok(packet)
    }
}

impl WirePacket for ServerPacket {
    fn action(&self) -> &str {
        match self {
            ServerPacket::Login(_) => LOGIN,
            ServerPacket::SpawnPlayer(_) => SPAWN_PLAYER,
            ServerPacket::DespawnPlayer(_) => DESPAWN_PLAYER,
            ServerPacket::GameTick(_) => GAME_TICK,
            ServerPacket::SpawnProjectile(_) => SPAWN_PROJECTILE,
            ServerPacket::ApplyDamage(_) => APPLY_DAMAGE,
            ServerPacket::CharacterDead(_) => CHARACTER_DEAD,
            ServerPacket::Unknown { action } => action,
        }
    }

    fn to_data(&self) -> Result<Value, ProtocolError> {
        let value = match self {
            ServerPacket::Login(player)
            | ServerPacket::SpawnPlayer(player)
            | ServerPacket::DespawnPlayer(player) => serde_json::to_value(player)?,
            ServerPacket::GameTick(snapshot) => serde_json::to_value(snapshot)?,
            ServerPacket::SpawnProjectile(spawn) => serde_json::to_value(spawn)?,
            ServerPacket::ApplyDamage(damage) => serde_json::to_value(damage)?,
            ServerPacket::CharacterDead(death) => serde_json::to_value(death)?,
            ServerPacket::Unknown { action } => {
                return Err(ProtocolError::UnknownAction(action.clone()))
            }
        };
        Ok(value)
    }

    fn from_parts(action: &str, data: Value) -> Result<Self, ProtocolError> {
        let packet = match action {
            LOGIN => ServerPacket::Login(payload(action, data)?),
            SPAWN_PLAYER => ServerPacket::SpawnPlayer(payload(action, data)?),
            DESPAWN_PLAYER => ServerPacket::DespawnPlayer(payload(action, data)?),
            GAME_TICK => ServerPacket::GameTick(payload(action, data)?),
            SPAWN_PROJECTILE => ServerPacket::SpawnProjectile(payload(action, data)?),
            APPLY_DAMAGE => ServerPacket::ApplyDamage(payload(action, data)?),
            CHARACTER_DEAD => ServerPacket::CharacterDead(payload(action, data)?),
            other => ServerPacket::Unknown {
                action: other.to_string(),
            },
        };
        Ok(packet)
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    action: String,
    #[serde(default)]
    userid: Option<u32>,
    #[serde(default)]
    data: Value,
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a> {
    action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    userid: Option<u32>,
    data: Value,
}

/// One framed message: a packet plus the sender-populated `userid` field.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<P> {
    pub userid: Option<u32>,
    pub packet: P,
}

impl<P: WirePacket> Envelope<P> {
    pub fn new(userid: Option<u32>, packet: P) -> Self {
        Self { userid, packet }
    }

    /// Server-originated frames carry no `userid`.
    pub fn anonymous(packet: P) -> Self {
        Self::new(None, packet)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let outgoing = OutgoingEnvelope {
            action: self.packet.action(),
            userid: self.userid,
            data: self.packet.to_data()?,
        };
        Ok(serde_json::to_string(&outgoing)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawEnvelope = serde_json::from_str(text)?;
        let packet = P::from_parts(&raw.action, raw.data)?;
        Ok(Self {
            userid: raw.userid,
            packet,
        })
    }
}
