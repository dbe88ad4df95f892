//! Client input capture with edge detection

use crate::rendering::Renderer;
use macroquad::prelude::*;
use shared::Vector3;

/// A pointer ray in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vector3,
    pub direction: Vector3,
}

/// Discrete input edges the simulation reacts to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Left { down: bool },
    Right { down: bool },
    Forward { down: bool },
    Backward { down: bool },
    Fire,
    PointerMoved(Ray),
}

/// Input folded from [`InputEvent`]s, read once per simulation step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    /// +1 turns left, -1 turns right
    pub rotation_movement: f32,
    /// +1 drives forward, -1 reverses
    pub forward_movement: f32,
    pub pointer: Option<Ray>,
    fire_requested: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releasing a key zeroes its axis even if the opposite key is held,
    /// so the last edge on an axis always wins.
    pub fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::Left { down } => self.rotation_movement = if down { 1.0 } else { 0.0 },
            InputEvent::Right { down } => self.rotation_movement = if down { -1.0 } else { 0.0 },
            InputEvent::Forward { down } => self.forward_movement = if down { 1.0 } else { 0.0 },
            InputEvent::Backward { down } => {
                self.forward_movement = if down { -1.0 } else { 0.0 }
            }
            InputEvent::Fire => self.fire_requested = true,
            InputEvent::PointerMoved(ray) => self.pointer = Some(ray),
        }
    }

    /// Returns whether a shot was requested since the last call.
    pub fn take_fire(&mut self) -> bool {
        std::mem::take(&mut self.fire_requested)
    }
}

/// Samples the macroquad keyboard and mouse once per frame and turns changes
/// into [`InputEvent`]s.
pub struct InputManager {
    // Previous frame key states for edge detection
    prev_left: bool,
    prev_right: bool,
    prev_forward: bool,
    prev_backward: bool,
    prev_mouse: Option<(f32, f32)>,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            prev_left: false,
            prev_right: false,
            prev_forward: false,
            prev_backward: false,
            prev_mouse: None,
        }
    }

    pub fn update(&mut self, renderer: &Renderer, camera_pivot: Vector3) -> Vec<InputEvent> {
        // Sample movement keys (support both WASD and arrow keys)
        let left = is_key_down(KeyCode::A) || is_key_down(KeyCode::Left);
        let right = is_key_down(KeyCode::D) || is_key_down(KeyCode::Right);
        let forward = is_key_down(KeyCode::W) || is_key_down(KeyCode::Up);
        let backward = is_key_down(KeyCode::S) || is_key_down(KeyCode::Down);

        let mut events = Vec::new();

        if left != self.prev_left {
            events.push(InputEvent::Left { down: left });
        }
        if right != self.prev_right {
            events.push(InputEvent::Right { down: right });
        }
        if forward != self.prev_forward {
            events.push(InputEvent::Forward { down: forward });
        }
        if backward != self.prev_backward {
            events.push(InputEvent::Backward { down: backward });
        }

        self.prev_left = left;
        self.prev_right = right;
        self.prev_forward = forward;
        self.prev_backward = backward;

        // The camera follows the tank, so the ray moves even when the mouse does not.
        let mouse = mouse_position();
        if self.prev_mouse != Some(mouse) || left || right || forward || backward {
            events.push(InputEvent::PointerMoved(renderer.pointer_ray(
                mouse.0,
                mouse.1,
                camera_pivot,
            )));
            self.prev_mouse = Some(mouse);
        }

        if is_mouse_button_pressed(MouseButton::Left) {
            events.push(InputEvent::Fire);
        }

        events
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
