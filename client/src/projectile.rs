use crate::scene::{NodeId, NodeKind, SceneError, SceneGraph};
use shared::{Vector3, PROJECTILE_LAUNCH_HEIGHT, PROJECTILE_SPEED};

/// A shot in flight. Every client simulates every projectile; only the
/// owner's client checks it for hits.
#[derive(Debug)]
pub struct Projectile {
    pub owner: u32,
    pub start: Vector3,
    pub target: Vector3,
    pub position: Vector3,
    velocity: Vector3,
    node: NodeId,
}

impl Projectile {
    pub fn launch(owner: u32, start: Vector3, target: Vector3, scene: &mut dyn SceneGraph) -> Self {
        let position = start.add(&Vector3::UP.scale(PROJECTILE_LAUNCH_HEIGHT));
        let velocity = target.sub(&start).normalize().scale(PROJECTILE_SPEED);
        let node = scene.attach(NodeKind::Projectile, position);

        Self {
            owner,
            start,
            target,
            position,
            velocity,
            node,
        }
    }

    /// Moves one step. Returns true once the shot has covered the distance
    /// from its start to its target.
    pub fn advance(&mut self, scene: &mut dyn SceneGraph) -> Result<bool, SceneError> {
        self.position = self.position.add(&self.velocity);
        scene.set_pose(self.node, self.position, Vector3::ZERO)?;

        Ok(self.start.distance(&self.target) <= self.start.distance(&self.position))
    }

    pub fn despawn(self, scene: &mut dyn SceneGraph) -> Result<(), SceneError> {
        scene.detach(self.node)
    }
}
