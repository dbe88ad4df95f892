use crate::game::Phase;
use crate::input::Ray;
use crate::scene::{MemoryScene, NodeKind, SceneNode};
use macroquad::prelude::*;
use shared::{Vector3, HIT_RADIUS, MAX_HEALTH, SPAWN_AREA_HALF_EXTENT};

const PIXELS_PER_UNIT: f32 = 8.0;
const TANK_RADIUS: f32 = 1.5;
const POINTER_RAY_HEIGHT: f32 = 50.0;

/// Status shown in the corner of the debug view
#[derive(Debug, Clone)]
pub struct Hud {
    pub session_id: Option<u32>,
    pub connected: bool,
    pub health: Option<u32>,
    pub frags: usize,
    pub phase: Phase,
    pub tank_count: usize,
}

/// Flat top-down view of a [`MemoryScene`], centred on the camera pivot.
///
/// World +X points right and +Z points down the screen, so positive yaw
/// turns counter-clockwise as seen from above.
pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn world_to_screen(&self, point: Vector3, pivot: Vector3) -> (f32, f32) {
        (
            self.width / 2.0 + (point.x - pivot.x) * PIXELS_PER_UNIT,
            self.height / 2.0 + (point.z - pivot.z) * PIXELS_PER_UNIT,
        )
    }

    /// Ray straight down through the ground point under a screen position.
    pub fn pointer_ray(&self, screen_x: f32, screen_y: f32, pivot: Vector3) -> Ray {
        let x = pivot.x + (screen_x - self.width / 2.0) / PIXELS_PER_UNIT;
        let z = pivot.z + (screen_y - self.height / 2.0) / PIXELS_PER_UNIT;
        Ray {
            origin: Vector3::new(x, POINTER_RAY_HEIGHT, z),
            direction: Vector3::new(0.0, -1.0, 0.0),
        }
    }

    pub fn render(&self, scene: &MemoryScene, hud: &Hud) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        let pivot = scene.camera_pivot();
        self.draw_spawn_area(pivot);

        for (_, node) in scene.nodes() {
            match node.kind {
                NodeKind::Tank { local } => self.draw_tank(node, local, pivot),
                NodeKind::Projectile => {
                    let (x, y) = self.world_to_screen(node.position, pivot);
                    draw_circle(x, y, 3.0, YELLOW);
                }
                NodeKind::DebugSphere => {
                    let (x, y) = self.world_to_screen(node.position, pivot);
                    draw_circle_lines(x, y, 6.0, 1.0, Color::from_rgba(85, 85, 85, 255));
                }
            }
        }

        self.draw_ui(hud);

        match hud.phase {
            Phase::Dead => self.draw_banner("DESTROYED", RED),
            Phase::Halted => self.draw_banner("Simulation halted - restart the client", ORANGE),
            Phase::Disconnected => self.draw_banner("Connection lost", ORANGE),
            Phase::Connecting | Phase::Alive => {}
        }
    }

    fn draw_spawn_area(&self, pivot: Vector3) {
        let (x0, y0) = self.world_to_screen(
            Vector3::new(-SPAWN_AREA_HALF_EXTENT, 0.0, -SPAWN_AREA_HALF_EXTENT),
            pivot,
        );
        let size = SPAWN_AREA_HALF_EXTENT * 2.0 * PIXELS_PER_UNIT;
        draw_rectangle_lines(x0, y0, size, size, 1.0, Color::from_rgba(68, 68, 68, 255));
    }

    fn draw_tank(&self, node: &SceneNode, local: bool, pivot: Vector3) {
        let color = if local {
            GREEN
        } else {
            Color::from_rgba(255, 68, 68, 255)
        };
        let (x, y) = self.world_to_screen(node.position, pivot);

        draw_circle(x, y, TANK_RADIUS * PIXELS_PER_UNIT, color);
        draw_circle_lines(
            x,
            y,
            HIT_RADIUS * PIXELS_PER_UNIT,
            1.0,
            Color::from_rgba(136, 136, 136, 80),
        );

        let hull = node.rotation.y;
        let turret = hull + node.turret_rotation.y;
        self.draw_heading(x, y, hull, TANK_RADIUS, WHITE);
        self.draw_heading(x, y, turret, TANK_RADIUS * 2.0, Color::from_rgba(0, 170, 255, 255));
    }

    fn draw_heading(&self, x: f32, y: f32, yaw_degrees: f32, length: f32, color: Color) {
        let (sin, cos) = yaw_degrees.to_radians().sin_cos();
        let end_x = x + sin * length * PIXELS_PER_UNIT;
        let end_y = y + cos * length * PIXELS_PER_UNIT;
        draw_line(x, y, end_x, end_y, 2.0, color);
    }

    fn draw_ui(&self, hud: &Hud) {
        let connection_color = if hud.connected { GREEN } else { RED };
        draw_rectangle(10.0, 10.0, 8.0, 8.0, connection_color);

        let id_text = match hud.session_id {
            Some(id) => format!("session {}", id),
            None => "logging in...".to_string(),
        };
        draw_text(&id_text, 24.0, 18.0, 16.0, WHITE);

        if let Some(health) = hud.health {
            for i in 0..MAX_HEALTH {
                let color = if i < health {
                    GREEN
                } else {
                    Color::from_rgba(51, 51, 51, 255)
                };
                draw_rectangle(10.0 + (i as f32) * 12.0, 28.0, 10.0, 6.0, color);
            }
        }

        let stats = format!("{} tanks  {} frags", hud.tank_count, hud.frags);
        draw_text(&stats, 10.0, 52.0, 16.0, WHITE);
    }

    fn draw_banner(&self, text: &str, color: Color) {
        let size = measure_text(text, None, 32, 1.0);
        draw_rectangle(
            0.0,
            self.height / 2.0 - 30.0,
            self.width,
            50.0,
            Color::from_rgba(0, 0, 0, 180),
        );
        draw_text(
            text,
            (self.width - size.width) / 2.0,
            self.height / 2.0,
            32.0,
            color,
        );
    }
}
