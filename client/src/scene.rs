//! The seam between the simulation and whatever draws it
//!
//! Tanks and projectiles never reach for a global scene; they are handed a
//! `&mut dyn SceneGraph` and push their poses into it. [`MemoryScene`] is the
//! implementation the client uses: it keeps every node in a map, the renderer
//! draws that map each frame, and tests inspect it directly.

use shared::Vector3;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Tank { local: bool },
    Projectile,
    /// Marker following the local aim point
    DebugSphere,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("scene node {0:?} does not exist")]
    UnknownNode(NodeId),
}

pub trait SceneGraph {
    /// Adds a node at `position` and returns its handle.
    fn attach(&mut self, kind: NodeKind, position: Vector3) -> NodeId;

    fn detach(&mut self, node: NodeId) -> Result<(), SceneError>;

    /// Sets position and euler rotation (degrees) of a node.
    fn set_pose(
        &mut self,
        node: NodeId,
        position: Vector3,
        rotation: Vector3,
    ) -> Result<(), SceneError>;

    /// Sets the turret rotation of a tank node, relative to its hull.
    fn set_turret_rotation(&mut self, node: NodeId, rotation: Vector3) -> Result<(), SceneError>;

    fn set_camera_pivot(&mut self, position: Vector3);

    fn spawn_debug_sphere(&mut self, position: Vector3) -> NodeId {
        self.attach(NodeKind::DebugSphere, position)
    }

    fn move_debug_sphere(&mut self, node: NodeId, position: Vector3) -> Result<(), SceneError> {
        self.set_pose(node, position, Vector3::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneNode {
    pub kind: NodeKind,
    pub position: Vector3,
    pub rotation: Vector3,
    pub turret_rotation: Vector3,
}

/// Scene graph kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryScene {
    nodes: BTreeMap<NodeId, SceneNode>,
    next_id: u64,
    camera_pivot: Vector3,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, node: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &SceneNode)> {
        self.nodes.iter()
    }

    /// Number of nodes for which `filter` holds.
    pub fn count(&self, filter: impl Fn(&NodeKind) -> bool) -> usize {
        self.nodes.values().filter(|node| filter(&node.kind)).count()
    }

    pub fn camera_pivot(&self) -> Vector3 {
        self.camera_pivot
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut SceneNode, SceneError> {
        self.nodes.get_mut(&node).ok_or(SceneError::UnknownNode(node))
    }
}

impl SceneGraph for MemoryScene {
    fn attach(&mut self, kind: NodeKind, position: Vector3) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            SceneNode {
                kind,
                position,
                rotation: Vector3::ZERO,
                turret_rotation: Vector3::ZERO,
            },
        );
        id
    }

    fn detach(&mut self, node: NodeId) -> Result<(), SceneError> {
        self.nodes
            .remove(&node)
            .map(|_| ())
            .ok_or(SceneError::UnknownNode(node))
    }

    fn set_pose(
        &mut self,
        node: NodeId,
        position: Vector3,
        rotation: Vector3,
    ) -> Result<(), SceneError> {
        let node = self.node_mut(node)?;
        node.position = position;
        node.rotation = rotation;
        Ok(())
    }

    fn set_turret_rotation(&mut self, node: NodeId, rotation: Vector3) -> Result<(), SceneError> {
        self.node_mut(node)?.turret_rotation = rotation;
        Ok(())
    }

    fn set_camera_pivot(&mut self, position: Vector3) {
        self.camera_pivot = position;
    }
}
