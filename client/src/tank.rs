//! Tank replication binding
//!
//! A tank is either `Local`, driven by input and the source of truth for its
//! own pose, or `Remote`, a sink that copies whatever pose the latest
//! snapshot carries. The authority is fixed when the tank is spawned.

use crate::input::InputState;
use crate::scene::{NodeId, NodeKind, SceneError, SceneGraph};
use rand::Rng;
use shared::{
    intersect_ray_plane, CharacterTick, TransformRecord, Vector3, MAX_HEALTH,
    SPAWN_AREA_HALF_EXTENT, TANK_MOVEMENT_SPEED, TANK_ROTATION_SPEED,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Local,
    Remote,
}

/// What one `applydamage` did to a tank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    Damaged { remaining: u32 },
    /// Health went from 1 to 0 on this hit
    Killed,
    /// Health was already 0
    AlreadyDead,
}

#[derive(Debug)]
pub struct Tank {
    pub id: u32,
    pub authority: Authority,
    pub position: Vector3,
    /// Hull yaw in degrees
    pub yaw: f32,
    /// Turret yaw in degrees, relative to the hull
    pub turret_yaw: f32,
    pub aim_point: Vector3,
    health: u32,
    node: NodeId,
    aim_marker: Option<NodeId>,
}

impl Tank {
    pub fn spawn(
        id: u32,
        authority: Authority,
        position: Vector3,
        scene: &mut dyn SceneGraph,
    ) -> Self {
        let node = scene.attach(
            NodeKind::Tank {
                local: authority == Authority::Local,
            },
            position,
        );

        let aim_marker = match authority {
            Authority::Local => Some(scene.spawn_debug_sphere(position)),
            Authority::Remote => None,
        };

        Self {
            id,
            authority,
            position,
            yaw: 0.0,
            turret_yaw: 0.0,
            aim_point: position,
            health: MAX_HEALTH,
            node,
            aim_marker,
        }
    }

    /// Uniform point on the ground inside the spawn square.
    pub fn random_spawn_position<R: Rng + ?Sized>(rng: &mut R) -> Vector3 {
        Vector3::new(
            rng.gen_range(-SPAWN_AREA_HALF_EXTENT..=SPAWN_AREA_HALF_EXTENT),
            0.0,
            rng.gen_range(-SPAWN_AREA_HALF_EXTENT..=SPAWN_AREA_HALF_EXTENT),
        )
    }

    pub fn health(&self) -> u32 {
        self.health
    }

    pub fn is_local(&self) -> bool {
        self.authority == Authority::Local
    }

    pub fn rotation(&self) -> Vector3 {
        Vector3::new(0.0, self.yaw, 0.0)
    }

    pub fn turret_rotation(&self) -> Vector3 {
        Vector3::new(0.0, self.turret_yaw, 0.0)
    }

    /// Moves a local tank one simulation step and returns the pose to replicate.
    pub fn advance(
        &mut self,
        input: &InputState,
        scene: &mut dyn SceneGraph,
    ) -> Result<CharacterTick, SceneError> {
        self.yaw += input.rotation_movement * TANK_ROTATION_SPEED;
        let step = Vector3::new(0.0, 0.0, input.forward_movement)
            .rotate_y(self.yaw)
            .scale(TANK_MOVEMENT_SPEED);
        self.position = self.position.add(&step);
        scene.set_camera_pivot(self.position);

        if let Some(ray) = input.pointer {
            if let Some(hit) = intersect_ray_plane(Vector3::ZERO, Vector3::UP, ray.origin, ray.direction)
            {
                self.aim_point = hit;
            }
        }
        self.turret_yaw = self.turret_yaw_towards(self.aim_point);

        scene.set_pose(self.node, self.position, self.rotation())?;
        scene.set_turret_rotation(self.node, self.turret_rotation())?;
        if let Some(marker) = self.aim_marker {
            scene.move_debug_sphere(marker, self.aim_point)?;
        }

        Ok(self.character_tick())
    }

    /// Hull-relative yaw that points the turret at `target`.
    ///
    /// Keeps the current value when the target sits on the tank itself.
    fn turret_yaw_towards(&self, target: Vector3) -> f32 {
        let local = target.sub(&self.position).rotate_y(-self.yaw);
        if local.x == 0.0 && local.z == 0.0 {
            return self.turret_yaw;
        }
        local.x.atan2(local.z).to_degrees()
    }

    /// Overwrites the pose from a snapshot record.
    pub fn apply_remote(
        &mut self,
        record: &TransformRecord,
        scene: &mut dyn SceneGraph,
    ) -> Result<(), SceneError> {
        self.position = record.position;
        self.yaw = record.rotation.y;
        self.turret_yaw = record.turret_rotation.y;
        self.aim_point = record.aim_point;

        scene.set_pose(self.node, self.position, record.rotation)?;
        scene.set_turret_rotation(self.node, record.turret_rotation)
    }

    pub fn apply_damage(&mut self) -> DamageOutcome {
        match self.health {
            0 => DamageOutcome::AlreadyDead,
            1 => {
                self.health = 0;
                DamageOutcome::Killed
            }
            health => {
                self.health = health - 1;
                DamageOutcome::Damaged {
                    remaining: self.health,
                }
            }
        }
    }

    pub fn character_tick(&self) -> CharacterTick {
        CharacterTick {
            position: self.position,
            rotation: self.rotation(),
            turret_rotation: self.turret_rotation(),
            aim_point: self.aim_point,
        }
    }

    pub fn despawn(self, scene: &mut dyn SceneGraph) -> Result<(), SceneError> {
        if let Some(marker) = self.aim_marker {
            scene.detach(marker)?;
        }
        scene.detach(self.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{InputEvent, Ray};
    use crate::scene::MemoryScene;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn local_tank(scene: &mut MemoryScene) -> Tank {
        Tank::spawn(1, Authority::Local, Vector3::ZERO, scene)
    }

    fn pointer_at(x: f32, z: f32) -> InputEvent {
        InputEvent::PointerMoved(Ray {
            origin: Vector3::new(x, 20.0, z),
            direction: Vector3::new(0.0, -1.0, 0.0),
        })
    }

    #[test]
    fn test_forward_moves_along_z() {
        let mut scene = MemoryScene::new();
        let mut tank = local_tank(&mut scene);
        let mut input = InputState::new();
        input.apply(InputEvent::Forward { down: true });

        for _ in 0..10 {
            tank.advance(&input, &mut scene).unwrap();
        }

        assert_approx_eq!(tank.position.z, 1.0, 1e-5);
        assert_approx_eq!(tank.position.x, 0.0, 1e-5);
        assert_eq!(scene.camera_pivot(), tank.position);
    }

    #[test]
    fn test_rotation_then_forward() {
        let mut scene = MemoryScene::new();
        let mut tank = local_tank(&mut scene);
        let mut input = InputState::new();
        input.apply(InputEvent::Left { down: true });

        for _ in 0..90 {
            tank.advance(&input, &mut scene).unwrap();
        }
        assert_approx_eq!(tank.yaw, 90.0, 1e-3);
        assert_eq!(tank.rotation(), Vector3::new(0.0, tank.yaw, 0.0));

        input.apply(InputEvent::Left { down: false });
        input.apply(InputEvent::Forward { down: true });
        tank.advance(&input, &mut scene).unwrap();

        assert_approx_eq!(tank.position.x, 0.1, 1e-4);
        assert_approx_eq!(tank.position.z, 0.0, 1e-4);
    }

    #[test]
    fn test_aim_projects_pointer_onto_ground() {
        let mut scene = MemoryScene::new();
        let mut tank = local_tank(&mut scene);
        let mut input = InputState::new();
        input.apply(pointer_at(5.0, 0.0));

        let tick = tank.advance(&input, &mut scene).unwrap();

        assert_approx_eq!(tick.aim_point.x, 5.0, 1e-5);
        assert_approx_eq!(tick.aim_point.y, 0.0, 1e-5);
        assert_approx_eq!(tick.turret_rotation.y, 90.0, 1e-3);
    }

    #[test]
    fn test_turret_yaw_is_relative_to_hull() {
        let mut scene = MemoryScene::new();
        let mut tank = local_tank(&mut scene);
        tank.yaw = 90.0;
        let mut input = InputState::new();
        input.apply(pointer_at(5.0, 0.0));

        tank.advance(&input, &mut scene).unwrap();
        assert_approx_eq!(tank.turret_yaw, 0.0, 1e-3);
    }

    #[test]
    fn test_apply_remote_copies_pose() {
        let mut scene = MemoryScene::new();
        let mut tank = Tank::spawn(2, Authority::Remote, Vector3::ZERO, &mut scene);
        let record = TransformRecord {
            userid: 2,
            position: Vector3::new(3.0, 0.0, -4.0),
            rotation: Vector3::new(0.0, 30.0, 0.0),
            turret_rotation: Vector3::new(0.0, 15.0, 0.0),
            aim_point: Vector3::new(9.0, 0.0, 9.0),
        };

        tank.apply_remote(&record, &mut scene).unwrap();

        assert_eq!(tank.position, record.position);
        assert_eq!(tank.yaw, 30.0);
        assert_eq!(tank.turret_yaw, 15.0);
        assert_eq!(tank.aim_point, record.aim_point);
    }

    #[test]
    fn test_damage_counts_down_to_single_kill() {
        let mut scene = MemoryScene::new();
        let mut tank = local_tank(&mut scene);

        for expected in (1..MAX_HEALTH).rev() {
            assert_eq!(
                tank.apply_damage(),
                DamageOutcome::Damaged {
                    remaining: expected
                }
            );
        }
        assert_eq!(tank.apply_damage(), DamageOutcome::Killed);
        assert_eq!(tank.apply_damage(), DamageOutcome::AlreadyDead);
        assert_eq!(tank.health(), 0);
    }

    #[test]
    fn test_spawn_and_despawn_nodes() {
        let mut scene = MemoryScene::new();
        let local = local_tank(&mut scene);
        let remote = Tank::spawn(2, Authority::Remote, Vector3::ZERO, &mut scene);

        // local tank carries an aim marker
        assert_eq!(scene.len(), 3);

        local.despawn(&mut scene).unwrap();
        remote.despawn(&mut scene).unwrap();
        assert!(scene.is_empty());
    }

    #[test]
    fn test_random_spawn_inside_area() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let p = Tank::random_spawn_position(&mut rng);
            assert!(p.x.abs() <= SPAWN_AREA_HALF_EXTENT);
            assert!(p.z.abs() <= SPAWN_AREA_HALF_EXTENT);
            assert_eq!(p.y, 0.0);
        }
    }
}
