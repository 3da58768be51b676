//! Keyboard fly-camera controller.

use std::f32::consts::{FRAC_PI_2, TAU};

use glam::Vec3;

use ember_platform::{InputState, KeyCode};

use crate::transform::Transform;

/// Pitch stays this far inside straight up or down.
const PITCH_MARGIN: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyMappings {
    pub move_left: KeyCode,
    pub move_right: KeyCode,
    pub move_forward: KeyCode,
    pub move_backward: KeyCode,
    pub move_up: KeyCode,
    pub move_down: KeyCode,
    pub look_left: KeyCode,
    pub look_right: KeyCode,
    pub look_up: KeyCode,
    pub look_down: KeyCode,
}

impl Default for KeyMappings {
    fn default() -> Self {
        Self {
            move_left: KeyCode::KeyA,
            move_right: KeyCode::KeyD,
            move_forward: KeyCode::KeyW,
            move_backward: KeyCode::KeyS,
            move_up: KeyCode::KeyE,
            move_down: KeyCode::KeyQ,
            look_left: KeyCode::ArrowLeft,
            look_right: KeyCode::ArrowRight,
            look_up: KeyCode::ArrowUp,
            look_down: KeyCode::ArrowDown,
        }
    }
}

/// Moves a transform in the XZ plane and turns it with the arrow keys.
#[derive(Clone, Debug)]
pub struct MovementController {
    pub keys: KeyMappings,
    /// Units per second.
    pub move_speed: f32,
    /// Radians per second.
    pub look_speed: f32,
}

impl Default for MovementController {
    fn default() -> Self {
        Self {
            keys: KeyMappings::default(),
            move_speed: 3.0,
            look_speed: 1.5,
        }
    }
}

impl MovementController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `dt` seconds of the held keys to `transform`.
    ///
    /// Pitch is clamped short of vertical and yaw wraps to `[0, 2π)`.
    /// Movement ignores pitch, so looking down does not move the viewer down.
    pub fn move_in_plane_xz(&self, input: &InputState, dt: f32, transform: &mut Transform) {
        let keys = &self.keys;

        // Positive yaw turns +Z toward +X, which is to the left.
        let look = Vec3::new(
            input.axis(keys.look_up, keys.look_down),
            input.axis(keys.look_right, keys.look_left),
            0.0,
        );
        if look.length_squared() > f32::EPSILON {
            transform.rotation += self.look_speed * dt * look.normalize();
        }

        let limit = FRAC_PI_2 - PITCH_MARGIN;
        transform.rotation.x = transform.rotation.x.clamp(-limit, limit);
        transform.rotation.y = transform.rotation.y.rem_euclid(TAU);

        let yaw = transform.rotation.y;
        let forward = Vec3::new(yaw.sin(), 0.0, yaw.cos());
        let right = forward.cross(Vec3::Y);

        let movement = forward * input.axis(keys.move_backward, keys.move_forward)
            + right * input.axis(keys.move_left, keys.move_right)
            + Vec3::Y * input.axis(keys.move_down, keys.move_up);
        if movement.length_squared() > f32::EPSILON {
            transform.translation += self.move_speed * dt * movement.normalize();
        }
    }
}
