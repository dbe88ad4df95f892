use crate::combat::resolve_hits;
use crate::error::ClientError;
use crate::input::{InputEvent, InputState};
use crate::projectile::Projectile;
use crate::scene::SceneGraph;
use crate::tank::{Authority, DamageOutcome, Tank};
use log::{debug, error, info, warn};
use shared::{
    ClientPacket, Damage, Death, ProjectileShot, ProjectileSpawn, ServerPacket, Snapshot,
    TransformRecord, Vector3,
};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session id yet
    Connecting,
    Alive,
    /// The local tank was destroyed; remote state still plays out
    Dead,
    /// The server connection is gone and the local tank with it
    Disconnected,
    /// A step failed; nothing advances until the client is restarted
    Halted,
}

/// Everything one client knows about the match.
///
/// Server packets and simulation steps both run to completion on the frame
/// loop, so neither ever observes the other half-done. Packets to send are
/// queued and collected with [`ClientGameState::drain_outbox`].
pub struct ClientGameState {
    local_id: Option<u32>,
    phase: Phase,
    tanks: BTreeMap<u32, Tank>,
    projectiles: Vec<Projectile>,
    /// Ids whose tank died or left; snapshots never bring them back
    tombstones: HashSet<u32>,
    /// Distinct victims killed by the local session
    kills: HashSet<u32>,
    input: InputState,
    outbox: Vec<ClientPacket>,
    pub tick: u64,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            local_id: None,
            phase: Phase::Connecting,
            tanks: BTreeMap::new(),
            projectiles: Vec::new(),
            tombstones: HashSet::new(),
            kills: HashSet::new(),
            input: InputState::new(),
            outbox: Vec::new(),
            tick: 0,
        }
    }

    pub fn local_id(&self) -> Option<u32> {
        self.local_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tank(&self, id: u32) -> Option<&Tank> {
        self.tanks.get(&id)
    }

    pub fn tanks(&self) -> &BTreeMap<u32, Tank> {
        &self.tanks
    }

    pub fn local_tank(&self) -> Option<&Tank> {
        self.local_id.and_then(|id| self.tanks.get(&id))
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    /// Number of distinct sessions the local player has killed.
    pub fn frags(&self) -> usize {
        self.kills.len()
    }

    pub fn drain_outbox(&mut self) -> Vec<ClientPacket> {
        std::mem::take(&mut self.outbox)
    }

    /// Binds the local session and spawns its tank at `spawn_position`.
    pub fn on_login(
        &mut self,
        session_id: u32,
        spawn_position: Vector3,
        scene: &mut dyn SceneGraph,
    ) -> Result<(), ClientError> {
        if let Some(existing) = self.local_id {
            if existing != session_id {
                warn!(
                    "Ignoring login as {} while already logged in as {}",
                    session_id, existing
                );
            }
            return Ok(());
        }

        info!("Logged in as session {}", session_id);
        self.local_id = Some(session_id);

        // A snapshot may have spawned us as a remote sink before the reply.
        if let Some(stale) = self.tanks.remove(&session_id) {
            stale.despawn(scene)?;
        }

        let tank = Tank::spawn(session_id, Authority::Local, spawn_position, scene);
        self.tanks.insert(session_id, tank);
        self.phase = Phase::Alive;
        Ok(())
    }

    pub fn apply_input(&mut self, event: InputEvent) {
        self.input.apply(event);
    }

    pub fn handle_packet(
        &mut self,
        packet: ServerPacket,
        scene: &mut dyn SceneGraph,
    ) -> Result<(), ClientError> {
        if self.phase == Phase::Halted {
            return Ok(());
        }

        match packet {
            ServerPacket::Login(player) => {
                debug!("Login reply for {} reached the game state", player.userid);
            }
            ServerPacket::SpawnPlayer(player) => {
                self.spawn_on_first_sight(player.userid, Vector3::ZERO, scene);
            }
            ServerPacket::DespawnPlayer(player) => {
                info!("Session {} left", player.userid);
                self.remove_tank(player.userid, scene)?;
            }
            ServerPacket::GameTick(snapshot) => self.apply_snapshot(&snapshot, scene)?,
            ServerPacket::SpawnProjectile(spawn) => self.on_projectile(spawn, scene),
            ServerPacket::ApplyDamage(damage) => self.on_damage(damage),
            ServerPacket::CharacterDead(death) => self.on_death(death, scene)?,
            ServerPacket::Unknown { action } => {
                debug!("Ignoring unknown action `{}`", action);
            }
        }

        Ok(())
    }

    fn spawn_on_first_sight(&mut self, id: u32, position: Vector3, scene: &mut dyn SceneGraph) {
        if Some(id) == self.local_id || self.tombstones.contains(&id) {
            return;
        }
        if !self.tanks.contains_key(&id) {
            debug!("Spawning remote tank {}", id);
            let tank = Tank::spawn(id, Authority::Remote, position, scene);
            self.tanks.insert(id, tank);
        }
    }

    fn apply_snapshot(
        &mut self,
        snapshot: &Snapshot,
        scene: &mut dyn SceneGraph,
    ) -> Result<(), ClientError> {
        for record in snapshot.values() {
            self.apply_record(record, scene)?;
        }
        Ok(())
    }

    fn apply_record(
        &mut self,
        record: &TransformRecord,
        scene: &mut dyn SceneGraph,
    ) -> Result<(), ClientError> {
        self.spawn_on_first_sight(record.userid, record.position, scene);

        match self.tanks.get_mut(&record.userid) {
            Some(tank) if !tank.is_local() => tank.apply_remote(record, scene)?,
            _ => {}
        }
        Ok(())
    }

    fn on_projectile(&mut self, spawn: ProjectileSpawn, scene: &mut dyn SceneGraph) {
        // Our own shots were launched when fired; the relay echo is a duplicate.
        if Some(spawn.userid) == self.local_id {
            return;
        }
        let projectile = Projectile::launch(spawn.userid, spawn.position, spawn.aim_point, scene);
        self.projectiles.push(projectile);
    }

    fn on_damage(&mut self, damage: Damage) {
        let Some(tank) = self.tanks.get_mut(&damage.to) else {
            debug!("Damage for unknown tank {}", damage.to);
            return;
        };

        match tank.apply_damage() {
            DamageOutcome::Damaged { remaining } => {
                debug!("Tank {} hit by {}, {} health left", damage.to, damage.by, remaining);
            }
            DamageOutcome::Killed => {
                if tank.is_local() {
                    info!("Destroyed by session {}", damage.by);
                    self.outbox.push(ClientPacket::CharacterDead(Death {
                        who: damage.to,
                        by: damage.by,
                    }));
                }
            }
            DamageOutcome::AlreadyDead => {}
        }
    }

    fn on_death(&mut self, death: Death, scene: &mut dyn SceneGraph) -> Result<(), ClientError> {
        self.remove_tank(death.who, scene)?;

        if Some(death.who) == self.local_id {
            if self.phase != Phase::Dead {
                info!("Local tank destroyed by session {}", death.by);
            }
            self.phase = Phase::Dead;
        } else if Some(death.by) == self.local_id && self.kills.insert(death.who) {
            info!("Killed session {} ({} frags)", death.who, self.kills.len());
        }
        Ok(())
    }

    fn remove_tank(&mut self, id: u32, scene: &mut dyn SceneGraph) -> Result<(), ClientError> {
        self.tombstones.insert(id);
        if let Some(tank) = self.tanks.remove(&id) {
            tank.despawn(scene)?;
        }
        Ok(())
    }

    /// Advances the simulation by one fixed step.
    ///
    /// Hits are checked before projectiles move, so a target right next to
    /// the muzzle is hit on the step the shot appears.
    pub fn step(&mut self, scene: &mut dyn SceneGraph) -> Result<(), ClientError> {
        if self.phase == Phase::Halted {
            return Ok(());
        }

        if self.phase == Phase::Alive {
            self.step_local_tank(scene)?;

            if let Some(local_id) = self.local_id {
                let hits = resolve_hits(local_id, &mut self.projectiles, &self.tanks, scene)?;
                self.outbox
                    .extend(hits.into_iter().map(ClientPacket::ApplyDamage));
            }
        }

        let mut in_flight = Vec::with_capacity(self.projectiles.len());
        for mut projectile in self.projectiles.drain(..) {
            if projectile.advance(scene)? {
                projectile.despawn(scene)?;
            } else {
                in_flight.push(projectile);
            }
        }
        self.projectiles = in_flight;

        self.tick += 1;
        Ok(())
    }

    fn step_local_tank(&mut self, scene: &mut dyn SceneGraph) -> Result<(), ClientError> {
        let Some(tank) = self.local_id.and_then(|id| self.tanks.get_mut(&id)) else {
            return Ok(());
        };

        let tick = tank.advance(&self.input, scene)?;
        self.outbox.push(ClientPacket::CharacterTick(tick));

        if self.input.take_fire() {
            let shot = ProjectileShot {
                position: tank.position,
                aim_point: tank.aim_point,
            };
            self.projectiles
                .push(Projectile::launch(tank.id, shot.position, shot.aim_point, scene));
            self.outbox.push(ClientPacket::SpawnProjectile(shot));
        }
        Ok(())
    }

    /// Tears down everything the local session owns once the connection is
    /// gone. Remote tanks stay where the last snapshot put them.
    pub fn on_disconnected(&mut self, scene: &mut dyn SceneGraph) -> Result<(), ClientError> {
        if self.phase == Phase::Halted {
            return Ok(());
        }

        if let Some(local_id) = self.local_id {
            if let Some(tank) = self.tanks.remove(&local_id) {
                tank.despawn(scene)?;
            }

            let (owned, foreign): (Vec<_>, Vec<_>) = self
                .projectiles
                .drain(..)
                .partition(|projectile| projectile.owner == local_id);
            for projectile in owned {
                projectile.despawn(scene)?;
            }
            self.projectiles = foreign;
        }

        self.outbox.clear();
        self.input = InputState::new();
        if self.phase != Phase::Dead {
            info!("Connection lost, local tank removed");
            self.phase = Phase::Disconnected;
        }
        Ok(())
    }

    /// Stops the simulation after an unrecoverable error.
    pub fn halt(&mut self, reason: &ClientError) {
        error!("Simulation halted: {}", reason);
        self.phase = Phase::Halted;
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}
