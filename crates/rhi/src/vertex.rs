//! Vertex input descriptions.
//!
//! - [`QuadVertex`] is the per-vertex corner of a camera-facing quad
//! - [`VertexLayout`] collects bindings and attributes from several sources
//!   (per-vertex and per-instance) and checks them before pipeline creation

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::error::{RhiError, RhiResult};

/// One corner of a unit quad in `[-1, 1]²`.
///
/// # Shader Locations
///
/// - location 0: position (vec2)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: Vec2,
}

/// Two triangles covering the unit quad, drawn without an index buffer.
pub const QUAD_VERTICES: [QuadVertex; 6] = [
    QuadVertex {
        position: Vec2::new(-1.0, -1.0),
    },
    QuadVertex {
        position: Vec2::new(1.0, -1.0),
    },
    QuadVertex {
        position: Vec2::new(-1.0, 1.0),
    },
    QuadVertex {
        position: Vec2::new(-1.0, 1.0),
    },
    QuadVertex {
        position: Vec2::new(1.0, -1.0),
    },
    QuadVertex {
        position: Vec2::new(1.0, 1.0),
    },
];

impl QuadVertex {
    pub const BINDING: u32 = 0;

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: Self::BINDING,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 1] {
        [vk::VertexInputAttributeDescription {
            binding: Self::BINDING,
            location: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: 0,
        }]
    }
}

/// Vertex input state assembled from several bindings.
#[derive(Clone, Debug, Default)]
pub struct VertexLayout {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        binding: vk::VertexInputBindingDescription,
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.bindings.push(binding);
        self.attributes.extend_from_slice(attributes);
        self
    }

    /// Every attribute must name a declared binding, fit inside its stride,
    /// and use a location no other attribute uses.
    pub fn validate(&self) -> RhiResult<()> {
        for (i, attr) in self.attributes.iter().enumerate() {
            let binding = self
                .bindings
                .iter()
                .find(|b| b.binding == attr.binding)
                .ok_or_else(|| {
                    RhiError::Pipeline(format!(
                        "attribute at location {} uses undeclared binding {}",
                        attr.location, attr.binding
                    ))
                })?;

            let end = attr.offset + format_size(attr.format);
            if end > binding.stride {
                return Err(RhiError::Pipeline(format!(
                    "attribute at location {} ends at byte {}, past stride {}",
                    attr.location, end, binding.stride
                )));
            }

            if self.attributes[..i]
                .iter()
                .any(|other| other.location == attr.location)
            {
                return Err(RhiError::Pipeline(format!(
                    "location {} assigned twice",
                    attr.location
                )));
            }
        }
        Ok(())
    }
}

/// Byte size of the attribute formats used here.
fn format_size(format: vk::Format) -> u32 {
    match format {
        vk::Format::R32_SFLOAT => 4,
        vk::Format::R32G32_SFLOAT => 8,
        vk::Format::R32G32B32_SFLOAT => 12,
        vk::Format::R32G32B32A32_SFLOAT => 16,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_vertex_size() {
        assert_eq!(std::mem::size_of::<QuadVertex>(), 8);
        assert_eq!(QuadVertex::binding_description().stride, 8);
    }

    #[test]
    fn test_quad_covers_unit_square() {
        assert_eq!(QUAD_VERTICES.len(), 6);
        for v in QUAD_VERTICES {
            assert_eq!(v.position.x.abs(), 1.0);
            assert_eq!(v.position.y.abs(), 1.0);
        }
    }

    #[test]
    fn test_layout_accepts_per_vertex_and_per_instance() {
        let instance = vk::VertexInputBindingDescription {
            binding: 1,
            stride: 32,
            input_rate: vk::VertexInputRate::INSTANCE,
        };
        let layout = VertexLayout::new()
            .with(
                QuadVertex::binding_description(),
                &QuadVertex::attribute_descriptions(),
            )
            .with(
                instance,
                &[vk::VertexInputAttributeDescription {
                    binding: 1,
                    location: 1,
                    format: vk::Format::R32G32B32A32_SFLOAT,
                    offset: 16,
                }],
            );
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_layout_rejects_undeclared_binding() {
        let layout = VertexLayout::new().with(
            QuadVertex::binding_description(),
            &[vk::VertexInputAttributeDescription {
                binding: 3,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            }],
        );
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_layout_rejects_overflow_and_duplicate_location() {
        let overflow = VertexLayout::new().with(
            QuadVertex::binding_description(),
            &[vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            }],
        );
        assert!(overflow.validate().is_err());

        let mut attrs = QuadVertex::attribute_descriptions().to_vec();
        attrs.extend(QuadVertex::attribute_descriptions());
        let duplicate = VertexLayout::new().with(QuadVertex::binding_description(), &attrs);
        assert!(duplicate.validate().is_err());
    }
}
