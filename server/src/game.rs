use crate::session_registry::SessionId;
use log::debug;
use shared::{Snapshot, TransformRecord};
use std::collections::BTreeMap;

/// Latest known transform of every session's tank.
///
/// The server never simulates anything; it only keeps the last pose each
/// client reported so the broadcast loop can push it to everyone else.
#[derive(Debug, Clone, Default)]
pub struct GameState {
    pub tick: u64,
    transforms: BTreeMap<SessionId, TransformRecord>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the session's record wholesale. Last write wins.
    pub fn upsert(&mut self, record: TransformRecord) {
        self.transforms.insert(record.userid, record);
    }

    pub fn remove(&mut self, session_id: SessionId) -> bool {
        let removed = self.transforms.remove(&session_id).is_some();
        if removed {
            debug!("Pruned transform for session {}", session_id);
        }
        removed
    }

    pub fn get(&self, session_id: SessionId) -> Option<&TransformRecord> {
        self.transforms.get(&session_id)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.transforms.clone()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}
