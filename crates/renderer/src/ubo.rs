//! Per-frame global uniform data.
//!
//! These structures must match the GLSL `GlobalUbo` block (set 0, binding 0)
//! in std140 layout. All structures use `#[repr(C)]` with explicit padding and
//! implement `Pod` and `Zeroable` for byte casting.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Length of the light array in the shader block.
pub const MAX_LIGHTS: usize = 10;

/// Angular speed of the light orbit around the vertical axis, in rad/s.
pub const LIGHT_ORBIT_SPEED: f32 = 0.5;

/// One point light as the shaders see it.
///
/// # Memory Layout
///
/// - Offset 0: position, `w` unused (16 bytes)
/// - Offset 16: color, `w` is intensity (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuPointLight {
    pub position: Vec4,
    pub color: Vec4,
}

impl GpuPointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position: position.extend(1.0),
            color: color.extend(intensity),
        }
    }
}

/// Global uniform buffer data, written once per frame into the current
/// slot's rotating buffer.
///
/// # Memory Layout
///
/// - Offset 0: projection (64 bytes)
/// - Offset 64: view (64 bytes)
/// - Offset 128: inverse view (64 bytes)
/// - Offset 192: ambient light color, `w` is intensity (16 bytes)
/// - Offset 208: point lights (10 × 32 bytes)
/// - Offset 528: light count (4 bytes) + padding (12 bytes)
/// - Total size: 544 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GlobalUbo {
    pub projection: Mat4,
    pub view: Mat4,
    pub inverse_view: Mat4,
    pub ambient_light_color: Vec4,
    pub point_lights: [GpuPointLight; MAX_LIGHTS],
    pub num_lights: i32,
    pub _padding: [i32; 3],
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
            ambient_light_color: Vec4::new(1.0, 1.0, 1.0, 0.02),
            point_lights: [GpuPointLight::default(); MAX_LIGHTS],
            num_lights: 0,
            _padding: [0; 3],
        }
    }
}

impl GlobalUbo {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(projection: Mat4, view: Mat4, inverse_view: Mat4) -> Self {
        Self {
            projection,
            view,
            inverse_view,
            ..Self::default()
        }
    }

    /// Replace the light list. Lights past [`MAX_LIGHTS`] are dropped.
    ///
    /// Returns how many lights were stored.
    pub fn set_lights(&mut self, lights: &[GpuPointLight]) -> usize {
        let count = lights.len().min(MAX_LIGHTS);
        self.point_lights = [GpuPointLight::default(); MAX_LIGHTS];
        self.point_lights[..count].copy_from_slice(&lights[..count]);
        self.num_lights = count as i32;
        count
    }
}

/// Rotate `position` about the world's vertical axis by one frame's worth of
/// [`LIGHT_ORBIT_SPEED`].
pub fn orbit(position: Vec3, frame_time: f32) -> Vec3 {
    let rotation = Mat4::from_axis_angle(Vec3::NEG_Y, LIGHT_ORBIT_SPEED * frame_time);
    rotation.transform_point3(position)
}
