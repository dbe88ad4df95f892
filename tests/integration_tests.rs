//! Integration tests for the relay server and the replicating client
//!
//! These tests run a real server on an ephemeral port and talk to it over
//! real WebSockets, either with raw frames or through the client library.

use client::{ClientGameState, InputEvent, MemoryScene, Phase, Ray, ReplicationEvent, ReplicationManager};
use futures_util::{SinkExt, StreamExt};
use server::{Server, ServerConfig};
use shared::{
    CharacterTick, ClientPacket, Damage, Death, Envelope, LoginRequest, PlayerRef,
    ProjectileShot, ProjectileSpawn, ServerPacket, Vector3, MAX_HEALTH,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

async fn start_server(despawn_on_disconnect: bool) -> SocketAddr {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        despawn_on_disconnect,
        ..ServerConfig::default()
    };
    let server = Server::bind(config).await.expect("Failed to bind server");
    let addr = server.local_addr();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    addr
}

async fn open(addr: SocketAddr) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
        .await
        .expect("Failed to connect");
    socket
}

async fn send(socket: &mut Socket, userid: u32, packet: ClientPacket) {
    let frame = Envelope::new(Some(userid), packet).encode().unwrap();
    socket.send(Message::text(frame)).await.unwrap();
}

/// Reads frames until one matches, skipping everything else.
async fn recv_until(socket: &mut Socket, wanted: impl Fn(&ServerPacket) -> bool) -> ServerPacket {
    timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let packet = Envelope::<ServerPacket>::decode(text.as_str())
                        .unwrap()
                        .packet;
                    if wanted(&packet) {
                        return packet;
                    }
                }
                Some(Ok(_)) => continue,
                other => panic!("Socket closed while waiting: {:?}", other),
            }
        }
    })
    .await
    .expect("Timed out waiting for packet")
}

async fn login(socket: &mut Socket) -> u32 {
    send(socket, 0, ClientPacket::Login(LoginRequest::default())).await;
    match recv_until(socket, |p| matches!(p, ServerPacket::Login(_))).await {
        ServerPacket::Login(player) => player.userid,
        _ => unreachable!(),
    }
}

fn pose_at(x: f32, z: f32) -> ClientPacket {
    ClientPacket::CharacterTick(CharacterTick {
        position: Vector3::new(x, 0.0, z),
        rotation: Vector3::new(0.0, 45.0, 0.0),
        turret_rotation: Vector3::ZERO,
        aim_point: Vector3::new(10.0, 0.0, 10.0),
    })
}

/// SERVER RELAY TESTS
mod relay_tests {
    use super::*;

    /// A logs in as 1, B as 2, and A is told about B
    #[tokio::test]
    async fn login_assigns_ids_and_announces_spawn() {
        let addr = start_server(true).await;
        let mut a = open(addr).await;
        let mut b = open(addr).await;

        assert_eq!(login(&mut a).await, 1);
        assert_eq!(login(&mut b).await, 2);

        let spawn = recv_until(&mut a, |p| matches!(p, ServerPacket::SpawnPlayer(_))).await;
        assert_eq!(spawn, ServerPacket::SpawnPlayer(PlayerRef { userid: 2 }));
    }

    /// A reported pose shows up in the following snapshots
    #[tokio::test]
    async fn snapshot_carries_reported_pose() {
        let addr = start_server(true).await;
        let mut a = open(addr).await;
        let mut b = open(addr).await;
        login(&mut a).await;
        login(&mut b).await;

        send(&mut a, 1, pose_at(1.0, 1.0)).await;

        let tick = recv_until(&mut b, |p| match p {
            ServerPacket::GameTick(snapshot) => snapshot.contains_key(&1),
            _ => false,
        })
        .await;

        let ServerPacket::GameTick(snapshot) = tick else {
            unreachable!()
        };
        let record = snapshot[&1];
        assert_eq!(record.userid, 1);
        assert_eq!(record.position, Vector3::new(1.0, 0.0, 1.0));
        assert_eq!(record.rotation, Vector3::new(0.0, 45.0, 0.0));
    }

    /// Shots are echoed to everyone, tagged with the shooter
    #[tokio::test]
    async fn projectile_relayed_to_all_sessions() {
        let addr = start_server(true).await;
        let mut a = open(addr).await;
        let mut b = open(addr).await;
        login(&mut a).await;
        login(&mut b).await;

        let shot = ProjectileShot {
            position: Vector3::new(1.0, 0.0, 1.0),
            aim_point: Vector3::new(5.0, 0.0, 5.0),
        };
        // The claimed userid is ignored in favour of the session's own id.
        send(&mut a, 42, ClientPacket::SpawnProjectile(shot)).await;

        let expected = ServerPacket::SpawnProjectile(ProjectileSpawn {
            userid: 1,
            position: shot.position,
            aim_point: shot.aim_point,
        });
        let is_shot = |p: &ServerPacket| matches!(p, ServerPacket::SpawnProjectile(_));
        assert_eq!(recv_until(&mut a, is_shot).await, expected);
        assert_eq!(recv_until(&mut b, is_shot).await, expected);
    }

    /// Damage and death are relayed without interpretation
    #[tokio::test]
    async fn combat_events_relayed() {
        let addr = start_server(true).await;
        let mut a = open(addr).await;
        let mut b = open(addr).await;
        login(&mut a).await;
        login(&mut b).await;

        send(&mut a, 1, ClientPacket::ApplyDamage(Damage { by: 1, to: 2 })).await;
        let damage = recv_until(&mut b, |p| matches!(p, ServerPacket::ApplyDamage(_))).await;
        assert_eq!(damage, ServerPacket::ApplyDamage(Damage { by: 1, to: 2 }));

        send(&mut b, 2, ClientPacket::CharacterDead(Death { who: 2, by: 1 })).await;
        let death = recv_until(&mut a, |p| matches!(p, ServerPacket::CharacterDead(_))).await;
        assert_eq!(death, ServerPacket::CharacterDead(Death { who: 2, by: 1 }));
    }

    /// Closing a socket despawns its tank and prunes it from snapshots
    #[tokio::test]
    async fn disconnect_despawns_player() {
        let addr = start_server(true).await;
        let mut a = open(addr).await;
        let mut b = open(addr).await;
        login(&mut a).await;
        login(&mut b).await;
        send(&mut b, 2, pose_at(3.0, 3.0)).await;
        recv_until(&mut a, |p| match p {
            ServerPacket::GameTick(snapshot) => snapshot.contains_key(&2),
            _ => false,
        })
        .await;

        b.close(None).await.unwrap();

        let despawn = recv_until(&mut a, |p| matches!(p, ServerPacket::DespawnPlayer(_))).await;
        assert_eq!(despawn, ServerPacket::DespawnPlayer(PlayerRef { userid: 2 }));

        let tick = recv_until(&mut a, |p| matches!(p, ServerPacket::GameTick(_))).await;
        let ServerPacket::GameTick(snapshot) = tick else {
            unreachable!()
        };
        assert!(!snapshot.contains_key(&2));
    }

    /// With ghosts kept, a closed session's last pose stays in snapshots
    #[tokio::test]
    async fn keep_ghosts_preserves_pose() {
        let addr = start_server(false).await;
        let mut a = open(addr).await;
        let mut b = open(addr).await;
        login(&mut a).await;
        login(&mut b).await;
        send(&mut b, 2, pose_at(3.0, 3.0)).await;
        recv_until(&mut a, |p| match p {
            ServerPacket::GameTick(snapshot) => snapshot.contains_key(&2),
            _ => false,
        })
        .await;

        b.close(None).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        let tick = recv_until(&mut a, |p| {
            matches!(p, ServerPacket::GameTick(_) | ServerPacket::DespawnPlayer(_))
        })
        .await;
        let ServerPacket::GameTick(snapshot) = tick else {
            panic!("Unexpected despawn: {:?}", tick)
        };
        assert!(snapshot.contains_key(&2));
    }

    /// Unknown actions and malformed frames do not end the session
    #[tokio::test]
    async fn unknown_and_malformed_frames_tolerated() {
        let addr = start_server(true).await;
        let mut a = open(addr).await;
        login(&mut a).await;

        a.send(Message::text(r#"{"action":"chat","userid":1,"data":{"text":"hi"}}"#))
            .await
            .unwrap();
        a.send(Message::text("not json at all")).await.unwrap();
        a.send(Message::text(r#"{"action":"charactertick","data":{"position":[1]}}"#))
            .await
            .unwrap();
        send(&mut a, 1, pose_at(7.0, 0.0)).await;

        let tick = recv_until(&mut a, |p| match p {
            ServerPacket::GameTick(snapshot) => snapshot.contains_key(&1),
            _ => false,
        })
        .await;
        let ServerPacket::GameTick(snapshot) = tick else {
            unreachable!()
        };
        assert_eq!(snapshot[&1].position.x, 7.0);
    }

    /// Poses sent before login are never recorded
    #[tokio::test]
    async fn packets_before_login_dropped() {
        let addr = start_server(true).await;
        let mut a = open(addr).await;

        send(&mut a, 1, pose_at(9.0, 9.0)).await;
        assert_eq!(login(&mut a).await, 1);

        let tick = recv_until(&mut a, |p| matches!(p, ServerPacket::GameTick(_))).await;
        assert_eq!(tick, ServerPacket::GameTick(Default::default()));
    }

    /// A second login on the same socket keeps the id and spawns nobody
    #[tokio::test]
    async fn repeated_login_keeps_id() {
        let addr = start_server(true).await;
        let mut a = open(addr).await;
        let mut b = open(addr).await;
        login(&mut a).await;
        assert_eq!(login(&mut b).await, 2);
        assert_eq!(login(&mut b).await, 2);

        recv_until(&mut a, |p| matches!(p, ServerPacket::SpawnPlayer(_))).await;

        // The next frames A sees are snapshots only.
        for _ in 0..5 {
            let packet = recv_until(&mut a, |_| true).await;
            assert!(matches!(packet, ServerPacket::GameTick(_)), "{:?}", packet);
        }
    }
}

/// One client process: manager, game state and scene
struct TestClient {
    manager: ReplicationManager,
    game: ClientGameState,
    scene: MemoryScene,
    spawn: Vector3,
}

impl TestClient {
    async fn connect(addr: SocketAddr, spawn: Vector3) -> Self {
        let manager = ReplicationManager::connect(&format!("ws://{}", addr))
            .await
            .expect("Failed to connect");
        let mut client = Self {
            manager,
            game: ClientGameState::new(),
            scene: MemoryScene::new(),
            spawn,
        };

        // Wait for the id so clients connected in sequence get ids in sequence.
        timeout(WAIT, async {
            while client.game.local_id().is_none() {
                client.pump();
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Timed out waiting for login");

        client
    }

    /// One frame: network in, simulation step, network out.
    fn pump(&mut self) {
        for event in self.manager.poll() {
            match event {
                ReplicationEvent::LoggedIn(id) => {
                    self.game.on_login(id, self.spawn, &mut self.scene).unwrap()
                }
                ReplicationEvent::Packet(packet) => {
                    self.game.handle_packet(packet, &mut self.scene).unwrap()
                }
                ReplicationEvent::Disconnected => panic!("Unexpected disconnect"),
            }
        }

        self.game.step(&mut self.scene).unwrap();

        for packet in self.game.drain_outbox() {
            self.manager.send(packet).unwrap();
        }
    }
}

/// Pumps both clients until `done` holds.
async fn run_until(
    a: &mut TestClient,
    b: &mut TestClient,
    done: impl Fn(&TestClient, &TestClient) -> bool,
) {
    timeout(WAIT, async {
        while !done(a, b) {
            a.pump();
            b.pump();
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timed out waiting for clients");
}

/// CLIENT REPLICATION TESTS
mod replication_tests {
    use super::*;

    #[tokio::test]
    async fn manager_logs_in_against_real_server() {
        let addr = start_server(true).await;
        let mut manager = ReplicationManager::connect(&format!("ws://{}", addr))
            .await
            .unwrap();

        let id = timeout(WAIT, async {
            loop {
                for event in manager.poll() {
                    if let ReplicationEvent::LoggedIn(id) = event {
                        return id;
                    }
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(id, 1);
        assert_eq!(manager.session_id(), Some(1));
    }

    /// Remote tanks follow the snapshot and exist exactly once
    #[tokio::test]
    async fn remote_tank_follows_snapshots() {
        let addr = start_server(true).await;
        let mut a = TestClient::connect(addr, Vector3::new(-5.0, 0.0, 0.0)).await;
        let mut b = TestClient::connect(addr, Vector3::new(5.0, 0.0, 0.0)).await;

        run_until(&mut a, &mut b, |a, b| {
            b.game.tank(1).map(|t| t.position) == Some(Vector3::new(-5.0, 0.0, 0.0))
                && a.game.tank(2).map(|t| t.position) == Some(Vector3::new(5.0, 0.0, 0.0))
        })
        .await;

        assert_eq!(a.game.tanks().len(), 2);
        assert_eq!(b.game.tanks().len(), 2);
        assert!(!a.game.tank(2).unwrap().is_local());
    }

    /// A shoots B point blank until B dies; damage lands on both clients and
    /// B reports its own death once.
    #[tokio::test]
    async fn owner_hit_damages_and_kills_remote_tank() {
        let addr = start_server(true).await;
        let mut a = TestClient::connect(addr, Vector3::ZERO).await;
        let mut b = TestClient::connect(addr, Vector3::new(0.0, 0.0, 1.0)).await;

        run_until(&mut a, &mut b, |a, _| {
            a.game.tank(2).map(|t| t.position) == Some(Vector3::new(0.0, 0.0, 1.0))
        })
        .await;

        a.game.apply_input(InputEvent::PointerMoved(Ray {
            origin: Vector3::new(0.0, 10.0, 1.0),
            direction: Vector3::new(0.0, -1.0, 0.0),
        }));
        a.game.apply_input(InputEvent::Fire);
        a.pump();

        run_until(&mut a, &mut b, |a, b| {
            b.game.local_tank().map(|t| t.health()) == Some(MAX_HEALTH - 1)
                && a.game.tank(2).map(|t| t.health()) == Some(MAX_HEALTH - 1)
        })
        .await;

        for _ in 1..MAX_HEALTH {
            a.game.apply_input(InputEvent::Fire);
            a.pump();
        }

        run_until(&mut a, &mut b, |a, b| {
            a.game.frags() == 1 && b.game.phase() == Phase::Dead
        })
        .await;

        assert!(a.game.tank(2).is_none());
        assert!(b.game.local_tank().is_none());
        assert_eq!(a.game.phase(), Phase::Alive);
    }
}

/// CLIENT SCENARIO TESTS (no network)
mod scenario_tests {
    use super::*;

    fn client(id: u32, spawn: Vector3, scene: &mut MemoryScene) -> ClientGameState {
        let mut game = ClientGameState::new();
        game.on_login(id, spawn, scene).unwrap();
        game
    }

    #[test]
    fn hit_at_one_unit_reports_damage_on_owner_only() {
        let mut scene_a = MemoryScene::new();
        let mut scene_b = MemoryScene::new();
        let mut a = client(1, Vector3::ZERO, &mut scene_a);
        let mut b = client(2, Vector3::new(1.0, 0.0, 0.0), &mut scene_b);

        let tank_b = ServerPacket::GameTick(
            [(
                2,
                CharacterTick {
                    position: Vector3::new(1.0, 0.0, 0.0),
                    rotation: Vector3::ZERO,
                    turret_rotation: Vector3::ZERO,
                    aim_point: Vector3::ZERO,
                }
                .into_record(2),
            )]
            .into_iter()
            .collect(),
        );
        a.handle_packet(tank_b, &mut scene_a).unwrap();

        a.apply_input(InputEvent::PointerMoved(Ray {
            origin: Vector3::new(1.0, 5.0, 0.0),
            direction: Vector3::new(0.0, -1.0, 0.0),
        }));
        a.apply_input(InputEvent::Fire);
        a.step(&mut scene_a).unwrap();

        let sent = a.drain_outbox();
        assert!(sent.contains(&ClientPacket::ApplyDamage(Damage { by: 1, to: 2 })));
        assert!(a.projectiles().is_empty());

        // B sees the shot but never tests it.
        b.handle_packet(
            ServerPacket::SpawnProjectile(ProjectileSpawn {
                userid: 1,
                position: Vector3::ZERO,
                aim_point: Vector3::new(1.0, 0.0, 0.0),
            }),
            &mut scene_b,
        )
        .unwrap();
        b.step(&mut scene_b).unwrap();
        assert!(b
            .drain_outbox()
            .iter()
            .all(|p| !matches!(p, ClientPacket::ApplyDamage(_))));

        b.handle_packet(ServerPacket::ApplyDamage(Damage { by: 1, to: 2 }), &mut scene_b)
            .unwrap();
        assert_eq!(b.local_tank().unwrap().health(), MAX_HEALTH - 1);
    }

    #[test]
    fn health_tracks_damage_count_and_death_sent_once() {
        let mut scene = MemoryScene::new();
        let mut b = client(2, Vector3::ZERO, &mut scene);

        let mut deaths = 0;
        for n in 1..=(MAX_HEALTH + 3) {
            let attacker = if n % 2 == 0 { 1 } else { 3 };
            b.handle_packet(
                ServerPacket::ApplyDamage(Damage {
                    by: attacker,
                    to: 2,
                }),
                &mut scene,
            )
            .unwrap();
            assert_eq!(b.local_tank().unwrap().health(), MAX_HEALTH.saturating_sub(n));

            for packet in b.drain_outbox() {
                if let ClientPacket::CharacterDead(death) = packet {
                    assert_eq!(death.who, 2);
                    assert_eq!(death.by, if MAX_HEALTH % 2 == 0 { 1 } else { 3 });
                    deaths += 1;
                }
            }
        }
        assert_eq!(deaths, 1);
    }
}
