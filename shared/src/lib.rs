use serde::{Deserialize, Serialize};

pub mod protocol;

pub use protocol::{
    CharacterTick, ClientPacket, Damage, Death, Envelope, LoginRequest, PlayerRef, ProjectileShot,
    ProjectileSpawn, ProtocolError, ServerPacket, Snapshot, WirePacket,
};

pub const BROADCAST_INTERVAL_MS: u64 = 10;
pub const SIMULATION_STEP_MS: u64 = 10;

pub const TANK_MOVEMENT_SPEED: f32 = 0.1;
/// Degrees of hull yaw per simulation step.
pub const TANK_ROTATION_SPEED: f32 = 1.0;
pub const MAX_HEALTH: u32 = 5;
pub const SPAWN_AREA_HALF_EXTENT: f32 = 25.0;

pub const PROJECTILE_SPEED: f32 = 1.0;
pub const PROJECTILE_LAUNCH_HEIGHT: f32 = 1.3;
pub const HIT_RADIUS: f32 = 3.0;

/// A point or direction in world space. Travels on the wire as `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);
    pub const UP: Vector3 = Vector3::new(0.0, 1.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn add(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(&self, scalar: f32) -> Vector3 {
        Vector3::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }

    pub fn dot(&self, other: &Vector3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Returns the unit vector, or zero for a zero-length input.
    pub fn normalize(&self) -> Vector3 {
        let len = self.length();
        if len == 0.0 {
            Vector3::ZERO
        } else {
            self.scale(1.0 / len)
        }
    }

    pub fn distance(&self, other: &Vector3) -> f32 {
        self.sub(other).length()
    }

    /// Rotates around the Y axis by `degrees`. Positive yaw turns +Z towards +X.
    pub fn rotate_y(&self, degrees: f32) -> Vector3 {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Vector3::new(
            self.x * cos + self.z * sin,
            self.y,
            self.z * cos - self.x * sin,
        )
    }
}

impl From<[f32; 3]> for Vector3 {
    fn from(v: [f32; 3]) -> Self {
        Vector3::new(v[0], v[1], v[2])
    }
}

impl From<Vector3> for [f32; 3] {
    fn from(v: Vector3) -> Self {
        [v.x, v.y, v.z]
    }
}

/// Last known pose of one session's tank, as held by the server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    pub userid: u32,
    pub position: Vector3,
    pub rotation: Vector3,
    #[serde(rename = "towerRotation")]
    pub turret_rotation: Vector3,
    #[serde(rename = "aimPosition")]
    pub aim_point: Vector3,
}

/// Intersects a ray with an infinite plane.
///
/// Returns `None` when the ray is parallel to the plane or points away from it.
pub fn intersect_ray_plane(
    plane_point: Vector3,
    plane_normal: Vector3,
    origin: Vector3,
    direction: Vector3,
) -> Option<Vector3> {
    let denom = plane_normal.dot(&direction);
    if denom.abs() < 1e-6 {
        return None;
    }

    let t = plane_normal.dot(&plane_point.sub(&origin)) / denom;
    if t < 0.0 {
        return None;
    }

    Some(origin.add(&direction.scale(t)))
}
