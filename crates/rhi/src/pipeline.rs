//! Graphics and compute pipeline management.
//!
//! # Overview
//!
//! - [`PipelineLayout`] wraps `VkPipelineLayout` (descriptor set layouts and push constants)
//! - [`Pipeline`] wraps a graphics or compute `VkPipeline`
//! - [`GraphicsPipelineBuilder`] configures a graphics pipeline for one subpass
//!   of a render pass, including its multisample count
//! - [`Pipeline::compute`] creates a compute pipeline from a single shader
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use ember_rhi::device::Device;
//! use ember_rhi::shader::{Shader, ShaderStage};
//! use ember_rhi::pipeline::{ColorBlendAttachment, GraphicsPipelineBuilder, PipelineLayout};
//! use ember_rhi::vertex::{QuadVertex, VertexLayout};
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>, render_pass: vk::RenderPass) -> Result<(), ember_rhi::RhiError> {
//! let vert = Shader::from_spirv_file(device.clone(), Path::new("target/shaders/particle.vert.spv"), ShaderStage::Vertex)?;
//! let frag = Shader::from_spirv_file(device.clone(), Path::new("target/shaders/particle.frag.spv"), ShaderStage::Fragment)?;
//! let layout = PipelineLayout::new(device.clone(), &[], &[])?;
//!
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_shader(&vert)
//!     .fragment_shader(&frag)
//!     .vertex_layout(VertexLayout::new().with(
//!         QuadVertex::binding_description(),
//!         &QuadVertex::attribute_descriptions(),
//!     ))
//!     .render_pass(render_pass, 0)
//!     .rasterization_samples(vk::SampleCountFlags::TYPE_4)
//!     .color_blend(ColorBlendAttachment::additive())
//!     .depth_write_enable(false)
//!     .build(device, &layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{Shader, ShaderStage};
use crate::vertex::VertexLayout;

/// Guaranteed minimum of `maxPushConstantsSize`.
pub const MIN_PUSH_CONSTANT_BYTES: u32 = 128;

/// Push-constant range for a payload of type `T` starting at offset 0.
///
/// # Errors
///
/// [`RhiError::Pipeline`] if `T` is larger than the guaranteed push-constant
/// budget or not a multiple of four bytes.
pub fn push_constant_range<T>(stages: vk::ShaderStageFlags) -> RhiResult<vk::PushConstantRange> {
    let size = std::mem::size_of::<T>() as u32;
    if size == 0 || size > MIN_PUSH_CONSTANT_BYTES || !size.is_multiple_of(4) {
        return Err(RhiError::Pipeline(format!(
            "push constant payload of {} bytes is not a non-zero multiple of 4 within {} bytes",
            size, MIN_PUSH_CONSTANT_BYTES
        )));
    }
    Ok(vk::PushConstantRange {
        stage_flags: stages,
        offset: 0,
        size,
    })
}

/// Vulkan pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a new pipeline layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `descriptor_set_layouts` - Slice of descriptor set layout handles
    /// * `push_constant_ranges` - Slice of push constant ranges
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} descriptor set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Vulkan pipeline wrapper, graphics or compute.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    bind_point: vk::PipelineBindPoint,
}

impl Pipeline {
    /// Creates a compute pipeline running `shader`.
    ///
    /// # Errors
    ///
    /// [`RhiError::Pipeline`] if `shader` is not a compute shader, or the
    /// driver error if creation fails.
    pub fn compute(device: Arc<Device>, shader: &Shader, layout: &PipelineLayout) -> RhiResult<Self> {
        if shader.stage() != ShaderStage::Compute {
            return Err(RhiError::Pipeline(format!(
                "compute pipeline needs a compute shader, got {}",
                shader.stage()
            )));
        }

        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(shader.stage_create_info())
            .layout(layout.handle());

        let pipelines = unsafe {
            device
                .handle()
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = first_pipeline(pipelines)?;

        info!("Compute pipeline created");

        Ok(Self {
            device,
            pipeline,
            bind_point: vk::PipelineBindPoint::COMPUTE,
        })
    }

    fn create_graphics_internal(
        device: Arc<Device>,
        create_info: &vk::GraphicsPipelineCreateInfo,
    ) -> RhiResult<Self> {
        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[*create_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = first_pipeline(pipelines)?;

        info!("Graphics pipeline created");

        Ok(Self {
            device,
            pipeline,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!(
            "{} pipeline destroyed",
            if self.bind_point == vk::PipelineBindPoint::COMPUTE {
                "Compute"
            } else {
                "Graphics"
            }
        );
    }
}

fn first_pipeline(pipelines: Vec<vk::Pipeline>) -> RhiResult<vk::Pipeline> {
    pipelines
        .first()
        .copied()
        .ok_or_else(|| RhiError::Pipeline("driver returned no pipeline".to_string()))
}

/// Color blend attachment configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_blend_factor: vk::BlendFactor,
    pub dst_color_blend_factor: vk::BlendFactor,
    pub color_blend_op: vk::BlendOp,
    pub src_alpha_blend_factor: vk::BlendFactor,
    pub dst_alpha_blend_factor: vk::BlendFactor,
    pub alpha_blend_op: vk::BlendOp,
    pub color_write_mask: vk::ColorComponentFlags,
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

impl ColorBlendAttachment {
    /// Premultiplied blending: `src + dst * (1 - src_alpha)`.
    ///
    /// Fragments that output zero alpha add their color onto the target,
    /// which is how glowing particles accumulate.
    pub fn additive() -> Self {
        Self {
            blend_enable: true,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }

    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blend_enable.into(),
            src_color_blend_factor: self.src_color_blend_factor,
            dst_color_blend_factor: self.dst_color_blend_factor,
            color_blend_op: self.color_blend_op,
            src_alpha_blend_factor: self.src_alpha_blend_factor,
            dst_alpha_blend_factor: self.dst_alpha_blend_factor,
            alpha_blend_op: self.alpha_blend_op,
            color_write_mask: self.color_write_mask,
        }
    }
}

/// Builder for graphics pipelines.
///
/// Defaults:
///
/// - Triangle list, filled, no culling, clockwise front face
/// - Depth test and write enabled, compare op `LESS`
/// - 1 sample
/// - Blending off
/// - Dynamic viewport and scissor
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    vertex_layout: VertexLayout,
    render_pass: vk::RenderPass,
    subpass: u32,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    rasterization_samples: vk::SampleCountFlags,
    depth_test_enable: bool,
    depth_write_enable: bool,
    depth_compare_op: vk::CompareOp,
    color_blend: ColorBlendAttachment,
    dynamic_states: Vec<vk::DynamicState>,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            vertex_layout: VertexLayout::new(),
            render_pass: vk::RenderPass::null(),
            subpass: 0,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: vk::CompareOp::LESS,
            color_blend: ColorBlendAttachment::default(),
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }

    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    pub fn vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_layout = layout;
        self
    }

    /// Render pass and subpass the pipeline will be used in.
    pub fn render_pass(mut self, render_pass: vk::RenderPass, subpass: u32) -> Self {
        self.render_pass = render_pass;
        self.subpass = subpass;
        self
    }

    pub fn cull_mode(mut self, mode: vk::CullModeFlags) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: vk::FrontFace) -> Self {
        self.front_face = face;
        self
    }

    /// Must equal the sample count of the render pass attachments.
    pub fn rasterization_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.rasterization_samples = samples;
        self
    }

    pub fn depth_test_enable(mut self, enable: bool) -> Self {
        self.depth_test_enable = enable;
        self
    }

    pub fn depth_write_enable(mut self, enable: bool) -> Self {
        self.depth_write_enable = enable;
        self
    }

    pub fn depth_compare_op(mut self, op: vk::CompareOp) -> Self {
        self.depth_compare_op = op;
        self
    }

    pub fn color_blend(mut self, attachment: ColorBlendAttachment) -> Self {
        self.color_blend = attachment;
        self
    }

    /// Check the configuration without touching the device.
    pub fn validate(&self) -> RhiResult<()> {
        match self.vertex_shader {
            Some(shader) if shader.stage() == ShaderStage::Vertex => {}
            Some(shader) => {
                return Err(RhiError::Pipeline(format!(
                    "vertex slot holds a {} shader",
                    shader.stage()
                )));
            }
            None => return Err(RhiError::Pipeline("Vertex shader is required".to_string())),
        }
        match self.fragment_shader {
            Some(shader) if shader.stage() == ShaderStage::Fragment => {}
            Some(shader) => {
                return Err(RhiError::Pipeline(format!(
                    "fragment slot holds a {} shader",
                    shader.stage()
                )));
            }
            None => return Err(RhiError::Pipeline("Fragment shader is required".to_string())),
        }
        self.validate_fixed_function()
    }

    fn validate_fixed_function(&self) -> RhiResult<()> {
        if self.render_pass == vk::RenderPass::null() {
            return Err(RhiError::Pipeline("A render pass is required".to_string()));
        }
        if self.rasterization_samples.as_raw().count_ones() != 1 {
            return Err(RhiError::Pipeline(format!(
                "rasterization samples must be a single count, got {:?}",
                self.rasterization_samples
            )));
        }
        self.vertex_layout.validate()
    }

    /// Builds the graphics pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A shader is missing or in the wrong slot
    /// - No render pass is set
    /// - The vertex layout is inconsistent
    /// - Pipeline creation fails
    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        self.validate()?;
        let (Some(vertex_shader), Some(fragment_shader)) = (self.vertex_shader, self.fragment_shader)
        else {
            return Err(RhiError::Pipeline("shader stages missing".to_string()));
        };

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_layout.bindings)
            .vertex_attribute_descriptions(&self.vertex_layout.attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(self.rasterization_samples)
            .min_sample_shading(1.0);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test_enable)
            .depth_write_enable(self.depth_write_enable)
            .depth_compare_op(self.depth_compare_op)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);

        let color_blend_attachments = [self.color_blend.to_vk()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(self.render_pass)
            .subpass(self.subpass);

        Pipeline::create_graphics_internal(device, &pipeline_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[repr(C)]
    struct Small([f32; 4]);
    #[repr(C)]
    struct TooBig([f32; 40]);
    #[repr(C)]
    struct Odd([u8; 6]);

    #[test]
    fn test_push_constant_range_sizes() {
        let range = push_constant_range::<Small>(vk::ShaderStageFlags::COMPUTE).unwrap();
        assert_eq!(range.size, 16);
        assert_eq!(range.offset, 0);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::COMPUTE);

        assert!(push_constant_range::<TooBig>(vk::ShaderStageFlags::COMPUTE).is_err());
        assert!(push_constant_range::<Odd>(vk::ShaderStageFlags::COMPUTE).is_err());
    }

    #[test]
    fn test_additive_blend_keeps_destination() {
        let blend = ColorBlendAttachment::additive().to_vk();
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(
            blend.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
    }

    #[test]
    fn test_default_blend_disabled() {
        let blend = ColorBlendAttachment::default().to_vk();
        assert_eq!(blend.blend_enable, vk::FALSE);
        assert_eq!(blend.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_builder_defaults() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert!(builder.depth_test_enable);
        assert!(builder.depth_write_enable);
        assert_eq!(
            builder.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }

    #[test]
    fn test_builder_requires_shaders_and_render_pass() {
        let builder = GraphicsPipelineBuilder::new();
        assert!(matches!(builder.validate(), Err(RhiError::Pipeline(_))));
        assert!(builder.validate_fixed_function().is_err());
    }

    #[test]
    fn test_builder_rejects_combined_sample_flags() {
        let builder = GraphicsPipelineBuilder::new()
            .render_pass(vk::RenderPass::from_raw(1), 0)
            .rasterization_samples(vk::SampleCountFlags::TYPE_2 | vk::SampleCountFlags::TYPE_4);
        assert!(builder.validate_fixed_function().is_err());

        let builder = GraphicsPipelineBuilder::new()
            .render_pass(vk::RenderPass::from_raw(1), 0)
            .rasterization_samples(vk::SampleCountFlags::TYPE_4);
        assert!(builder.validate_fixed_function().is_ok());
    }
}
