//! Camera for rendering the scene.
//!
//! World space is right-handed with `+Y` up. The projection flips Y for
//! Vulkan's downward clip-space Y axis and maps depth to `[0, 1]`.

use glam::{EulerRot, Mat4, Quat, Vec3};
use tracing::warn;

/// Projection, view and inverse view matrices.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
    inverse_view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_orthographic_projection(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        let mut proj = Mat4::orthographic_rh(left, right, bottom, top, near, far);
        proj.y_axis.y *= -1.0;
        self.projection = proj;
    }

    /// Perspective projection with Vulkan Y-flip.
    ///
    /// A zero aspect ratio (minimized window) keeps the previous projection.
    pub fn set_perspective_projection(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        if aspect.abs() <= f32::EPSILON {
            warn!("Ignoring perspective projection with aspect ratio {}", aspect);
            return;
        }
        let mut proj = Mat4::perspective_rh(fov_y, aspect, near, far);
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        self.projection = proj;
    }

    /// Look from `position` along `direction`.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        self.view = Mat4::look_to_rh(position, direction.normalize(), up);
        self.inverse_view = self.view.inverse();
    }

    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// Look from `position` with `rotation` in radians (`x` pitch, `y` yaw,
    /// `z` roll), applied yaw first. Zero rotation looks down `+Z`.
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let orientation = Quat::from_euler(EulerRot::YXZ, rotation.y, rotation.x, rotation.z);
        // Camera space looks down -Z; turn it around to face +Z.
        let camera_to_world = Mat4::from_rotation_translation(
            orientation * Quat::from_rotation_y(std::f32::consts::PI),
            position,
        );
        self.inverse_view = camera_to_world;
        self.view = camera_to_world.inverse();
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn inverse_view(&self) -> Mat4 {
        self.inverse_view
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// World-space camera position.
    pub fn position(&self) -> Vec3 {
        self.inverse_view.w_axis.truncate()
    }

    /// World-space view direction.
    pub fn forward(&self) -> Vec3 {
        -self.inverse_view.z_axis.truncate()
    }
}
