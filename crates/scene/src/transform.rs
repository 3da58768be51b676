//! Transform component for scene entities.
//!
//! Rotation is stored as Tait-Bryan angles applied in Y, X, Z order
//! (yaw, pitch, roll), the same convention the camera uses for
//! [`Camera::set_view_yxz`](crate::Camera::set_view_yxz), so a viewer
//! entity's transform can drive the camera directly.
//!
//! # Example
//!
//! ```
//! use ember_scene::Transform;
//! use glam::Vec3;
//!
//! let t = Transform::new()
//!     .with_translation(Vec3::new(1.0, 0.0, 0.0))
//!     .with_scale(Vec3::splat(2.0));
//!
//! let p = t.matrix().transform_point3(Vec3::X);
//! assert!((p - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-5);
//! ```

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};

/// Position, rotation and scale of an entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub scale: Vec3,
    /// Radians: `x` pitch, `y` yaw, `z` roll.
    pub rotation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    /// Rotation as a quaternion, yaw first.
    pub fn quat(&self) -> Quat {
        Quat::from_euler(
            EulerRot::YXZ,
            self.rotation.y,
            self.rotation.x,
            self.rotation.z,
        )
    }

    /// Model matrix: scale, then rotate, then translate.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quat(), self.translation)
    }

    /// Inverse transpose of the model matrix's upper 3x3.
    ///
    /// # Non-invertible transforms
    ///
    /// A zero scale component makes the matrix singular; the identity is
    /// returned instead of NaNs.
    pub fn normal_matrix(&self) -> Mat3 {
        const EPSILON: f32 = 1e-6;
        let model = Mat3::from_mat4(self.matrix());
        if model.determinant().abs() < EPSILON {
            Mat3::IDENTITY
        } else {
            model.inverse().transpose()
        }
    }

    /// Direction the entity faces; `+Z` at zero rotation.
    pub fn forward(&self) -> Vec3 {
        self.quat() * Vec3::Z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPSILON: f32 = 1e-5;

    fn approx_eq_vec3(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < EPSILON
    }

    #[test]
    fn test_transform_default() {
        let t = Transform::default();
        assert_eq!(t.translation, Vec3::ZERO);
        assert_eq!(t.rotation, Vec3::ZERO);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_matrix_order_scale_rotate_translate() {
        let t = Transform::new()
            .with_translation(Vec3::new(10.0, 0.0, 0.0))
            .with_scale(Vec3::splat(2.0))
            .with_rotation(Vec3::new(0.0, FRAC_PI_2, 0.0));

        // Scale to (0,0,2), yaw 90 degrees to (2,0,0), translate to (12,0,0).
        let p = t.matrix().transform_point3(Vec3::Z);
        assert!(approx_eq_vec3(p, Vec3::new(12.0, 0.0, 0.0)), "got {:?}", p);
    }

    #[test]
    fn test_yaw_applied_before_pitch() {
        let t = Transform::new().with_rotation(Vec3::new(FRAC_PI_2, FRAC_PI_2, 0.0));
        // Pitch tips +Z down to -Y; yaw about world Y leaves it there.
        assert!(approx_eq_vec3(t.forward(), Vec3::NEG_Y), "got {:?}", t.forward());
    }

    #[test]
    fn test_normal_matrix_with_scale() {
        let t = Transform::new().with_scale(Vec3::new(1.0, 2.0, 1.0));
        let expected = Mat3::from_mat4(t.matrix()).inverse().transpose();
        assert_eq!(t.normal_matrix(), expected);
    }

    #[test]
    fn test_normal_matrix_non_invertible() {
        let t = Transform::new().with_scale(Vec3::ZERO);
        let normal = t.normal_matrix();
        assert_eq!(normal, Mat3::IDENTITY);
        assert!(!normal.is_nan());
    }
}
