//! GPU particle simulation and drawing.
//!
//! One device-local buffer of [`Particle`] records is shared by both halves
//! of the frame: a compute dispatch advances it in place, then an instanced
//! draw reads it as per-instance vertex input. The buffer is not rotated per
//! frame slot, so barriers are the only thing ordering its accesses: one
//! before the dispatch against the previous frame's draw and dispatch, one
//! after it towards this frame's draw.
//!
//! # Frame Recording
//!
//! ```text
//! simulate:  barrier ─► bind compute ─► push constants ─► dispatch ─► barrier
//!                                                                       │
//! draw:      bind graphics ─► bind [quad, particles] ─► draw(6, max_particles)
//! ```
//!
//! Dead particles are still drawn. The shaders read `life` and collapse
//! them to nothing.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use ember_core::ParticleConfig;
use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::command::{CommandBuffer, dispatch_group_count};
use ember_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use ember_rhi::device::Device;
use ember_rhi::pipeline::{
    ColorBlendAttachment, GraphicsPipelineBuilder, Pipeline, PipelineLayout, push_constant_range,
};
use ember_rhi::shader::{Shader, ShaderStage, spirv_path};
use ember_rhi::surface_chain::SurfaceChain;
use ember_rhi::vertex::{QUAD_VERTICES, QuadVertex, VertexLayout};

use crate::error::{RenderError, RenderResult};
use crate::hazard::HazardTracker;

/// `local_size_x` of the compute shader.
pub const WORKGROUP_SIZE: u32 = 256;

/// Vertex binding the particle buffer is bound to for drawing.
pub const PARTICLE_BINDING: u32 = 1;

/// Vertices per particle quad.
pub const QUAD_VERTEX_COUNT: u32 = QUAD_VERTICES.len() as u32;

/// One particle as stored in the shared buffer.
///
/// # Memory Layout
///
/// - Offset 0: start position + pad (16 bytes)
/// - Offset 16: position + pad (16 bytes)
/// - Offset 32: velocity + pad (16 bytes)
/// - Offset 48: convergence target (12 bytes), life (4 bytes)
/// - Offset 64: color lookup, max life (8 bytes)
/// - Offset 72: padding (8 bytes)
/// - Total size: 80 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    pub start_pos: Vec3,
    pub _pad0: f32,
    pub position: Vec3,
    pub _pad1: f32,
    pub velocity: Vec3,
    pub _pad2: f32,
    pub convergence_target: Vec3,
    pub life: f32,
    pub color_lookup: f32,
    pub max_life: f32,
    pub _pad3: [f32; 2],
}

impl Particle {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: PARTICLE_BINDING,
            stride: Self::SIZE as u32,
            input_rate: vk::VertexInputRate::INSTANCE,
        }
    }

    /// Locations 1-4: position, life, color lookup, max life.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            binding: PARTICLE_BINDING,
            location,
            format,
            offset: offset as u32,
        };
        [
            attribute(
                1,
                vk::Format::R32G32B32_SFLOAT,
                std::mem::offset_of!(Particle, position),
            ),
            attribute(2, vk::Format::R32_SFLOAT, std::mem::offset_of!(Particle, life)),
            attribute(
                3,
                vk::Format::R32_SFLOAT,
                std::mem::offset_of!(Particle, color_lookup),
            ),
            attribute(
                4,
                vk::Format::R32_SFLOAT,
                std::mem::offset_of!(Particle, max_life),
            ),
        ]
    }
}

/// Quad corners per vertex, particles per instance.
pub fn particle_vertex_layout() -> VertexLayout {
    VertexLayout::new()
        .with(
            QuadVertex::binding_description(),
            &QuadVertex::attribute_descriptions(),
        )
        .with(
            Particle::binding_description(),
            &Particle::attribute_descriptions(),
        )
}

/// Simulation parameters pushed before every dispatch.
///
/// Byte size and field order are shared with `particle.comp`.
///
/// # Memory Layout
///
/// - Offset 0: delta time, curl epsilon, curl multiplier, min life
/// - Offset 16: max life, emitter radius, emission rate, pad
/// - Offset 32: emitter position + pad
/// - Offset 48: emitter scale + pad
/// - Offset 64: emitter rotation + pad
/// - Offset 80: convergence point, convergence strength
/// - Offset 96: total smoke distance, updraft, random seed, pad
/// - Total size: 112 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ComputePushConstants {
    pub delta_time: f32,
    pub curl_e: f32,
    pub curl_multiplier: f32,
    pub particle_min_life: f32,
    pub particle_max_life: f32,
    pub emitter_radius: f32,
    pub emission_rate: f32,
    pub _pad0: f32,
    pub emitter_pos: Vec3,
    pub _pad1: f32,
    pub emitter_scale: Vec3,
    pub _pad2: f32,
    pub emitter_rot: Vec3,
    pub _pad3: f32,
    pub convergence_point: Vec3,
    pub convergence_strength: f32,
    pub total_smoke_distance: f32,
    pub updraft: f32,
    pub rand_seed: f32,
    pub _pad4: f32,
}

impl ComputePushConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Parameters for one dispatch of `frame_time` seconds.
    pub fn new(config: &ParticleConfig, frame_time: f32, emitter_pos: Vec3, rand_seed: f32) -> Self {
        Self {
            delta_time: frame_time,
            curl_e: 0.1,
            curl_multiplier: 0.8,
            particle_min_life: config.lifetime * 0.5,
            particle_max_life: config.lifetime * 1.5,
            emitter_radius: 0.2,
            emission_rate: config.emission_rate,
            emitter_pos,
            emitter_scale: Vec3::ONE,
            emitter_rot: Vec3::ZERO,
            convergence_point: Vec3::new(0.0, 3.0, 0.0),
            convergence_strength: 1.0,
            total_smoke_distance: 1.5,
            updraft: 1.2,
            rand_seed,
            ..Self::default()
        }
    }
}

/// Color and billboard size pushed for the draw.
///
/// # Memory Layout
///
/// - Offset 0: color, `w` is alpha (16 bytes)
/// - Offset 16: size (4 bytes) + padding (12 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleDrawConstants {
    pub color: Vec4,
    pub size: f32,
    pub _pad: [f32; 3],
}

impl ParticleDrawConstants {
    pub fn new(config: &ParticleConfig) -> Self {
        Self {
            color: Vec3::from_array(config.color).extend(1.0),
            size: config.size,
            _pad: [0.0; 3],
        }
    }
}

/// Starting ring of `count` particles around `(0, -0.5, 1)`.
///
/// The same seed always yields the same particles.
pub fn initial_particles(count: u32, seed: u64) -> Vec<Particle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut jitter = move || rng.gen_range(-0.5f32..0.5);

    (0..count)
        .map(|_| {
            let angle = (jitter() + 0.5) * std::f32::consts::TAU;
            let radius = 1.0;
            let height = jitter() * 0.3;
            let position = Vec3::new(
                angle.cos() * radius,
                height - 0.5,
                angle.sin() * radius + 1.0,
            );
            let velocity = Vec3::new(jitter() * 0.2, 1.0 + jitter() * 0.3, jitter() * 0.2);
            // Uniform in [2.5, 7.5).
            let max_life = 5.0 + jitter() * 5.0;

            Particle {
                start_pos: position,
                position,
                velocity,
                convergence_target: Vec3::new(0.0, 3.0, 1.0),
                life: 0.0,
                color_lookup: 0.0,
                max_life,
                ..Particle::default()
            }
        })
        .collect()
}

/// The shared particle buffer.
pub struct ParticleBuffer {
    buffer: Buffer,
    count: u32,
}

impl ParticleBuffer {
    /// Upload `particles` into device-local memory.
    pub fn new(device: Arc<Device>, particles: &[Particle]) -> RenderResult<Self> {
        if particles.is_empty() {
            return Err(ember_core::Error::Config("particle count must be non-zero".to_string()).into());
        }
        let buffer = Buffer::new_device_local(
            device,
            BufferUsage::Particle,
            bytemuck::cast_slice(particles),
        )?;
        Ok(Self {
            buffer,
            count: particles.len() as u32,
        })
    }

    /// Copy the buffer back to the host. Blocks until the device is done.
    pub fn download(&self) -> RenderResult<Vec<Particle>> {
        let bytes = self.buffer.download()?;
        let used = self.count as usize * Particle::SIZE;
        Ok(bytemuck::pod_collect_to_vec(&bytes[..used.min(bytes.len())]))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

/// A global memory barrier around the particle dispatch.
#[derive(Clone, Copy, Debug)]
pub struct DispatchBarrier {
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub memory: vk::MemoryBarrier<'static>,
}

impl DispatchBarrier {
    /// Waits for the previous frame's draw and dispatch to finish with the
    /// buffer. Submission order alone does not keep the next dispatch from
    /// overwriting particles that are still being read.
    pub fn before_dispatch() -> Self {
        Self {
            src_stage: vk::PipelineStageFlags::VERTEX_INPUT
                | vk::PipelineStageFlags::COMPUTE_SHADER,
            dst_stage: vk::PipelineStageFlags::COMPUTE_SHADER,
            memory: vk::MemoryBarrier::default()
                .src_access_mask(
                    vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::SHADER_WRITE,
                )
                .dst_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE),
        }
    }

    /// Publishes the dispatch's writes to vertex input.
    pub fn after_dispatch() -> Self {
        Self {
            src_stage: vk::PipelineStageFlags::COMPUTE_SHADER,
            dst_stage: vk::PipelineStageFlags::VERTEX_INPUT,
            memory: vk::MemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                .dst_access_mask(vk::AccessFlags::VERTEX_ATTRIBUTE_READ),
        }
    }
}

/// Directory the build script compiles `shaders/` into.
pub const BUILT_SHADER_DIR: &str = env!("EMBER_SHADER_DIR");

/// Where to find the compiled shader modules.
pub struct ParticleShaders<'a> {
    pub dir: &'a Path,
    pub name: &'a str,
}

impl Default for ParticleShaders<'_> {
    fn default() -> Self {
        Self {
            dir: Path::new(BUILT_SHADER_DIR),
            name: "particle",
        }
    }
}

/// Compute and graphics halves of the particle pipeline.
pub struct ParticleSystem {
    // Pipelines before their layouts.
    compute_pipeline: Pipeline,
    graphics_pipeline: Pipeline,
    compute_pipeline_layout: PipelineLayout,
    graphics_pipeline_layout: PipelineLayout,
    compute_set: vk::DescriptorSet,
    compute_pool: DescriptorPool,
    compute_set_layout: DescriptorSetLayout,
    quad_buffer: Buffer,
    particles: ParticleBuffer,
    hazards: HazardTracker,
    push: ComputePushConstants,
    draw_constants: ParticleDrawConstants,
    config: ParticleConfig,
}

impl ParticleSystem {
    /// Build both pipelines against `chain`'s render pass and sample count.
    ///
    /// The graphics layout uses `global_layout` as set 0. The initial
    /// particles come from `config.seed`, or from entropy when unset.
    ///
    /// # Errors
    ///
    /// Missing or malformed shader modules, and any creation failure.
    pub fn new(
        device: Arc<Device>,
        chain: &SurfaceChain,
        global_layout: &DescriptorSetLayout,
        shaders: &ParticleShaders<'_>,
        config: &ParticleConfig,
    ) -> RenderResult<Self> {
        let seed = config.seed.unwrap_or_else(|| StdRng::from_entropy().r#gen());
        let particles = ParticleBuffer::new(
            Arc::clone(&device),
            &initial_particles(config.max_particles, seed),
        )?;
        let quad_buffer = Buffer::new_device_local(
            Arc::clone(&device),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )?;

        // Compute: one storage buffer, one set, never reallocated.
        let compute_set_layout = DescriptorSetLayout::builder(Arc::clone(&device))
            .add_binding(
                0,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::ShaderStageFlags::COMPUTE,
                1,
            )
            .build()?;
        let mut compute_pool = DescriptorPool::builder(Arc::clone(&device))
            .max_sets(1)
            .pool_size(vk::DescriptorType::STORAGE_BUFFER, 1)
            .build()?;
        let compute_set = DescriptorWriter::new(&compute_set_layout)
            .write_buffer(
                0,
                vk::DescriptorBufferInfo::default()
                    .buffer(particles.handle())
                    .offset(0)
                    .range(particles.size()),
            )
            .build(&mut compute_pool)?;

        let compute_pipeline_layout = PipelineLayout::new(
            Arc::clone(&device),
            &[compute_set_layout.handle()],
            &[push_constant_range::<ComputePushConstants>(
                vk::ShaderStageFlags::COMPUTE,
            )?],
        )?;
        let compute_shader = Shader::from_spirv_file(
            Arc::clone(&device),
            &spirv_path(shaders.dir, shaders.name, ShaderStage::Compute),
            ShaderStage::Compute,
        )?;
        let compute_pipeline =
            Pipeline::compute(Arc::clone(&device), &compute_shader, &compute_pipeline_layout)?;

        // Graphics: global uniforms at set 0, color and size as push constants.
        let graphics_pipeline_layout = PipelineLayout::new(
            Arc::clone(&device),
            &[global_layout.handle()],
            &[push_constant_range::<ParticleDrawConstants>(
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )?],
        )?;
        let vertex_shader = Shader::from_spirv_file(
            Arc::clone(&device),
            &spirv_path(shaders.dir, shaders.name, ShaderStage::Vertex),
            ShaderStage::Vertex,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            Arc::clone(&device),
            &spirv_path(shaders.dir, shaders.name, ShaderStage::Fragment),
            ShaderStage::Fragment,
        )?;
        let graphics_pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_layout(particle_vertex_layout())
            .render_pass(chain.render_pass(), 0)
            .rasterization_samples(chain.samples())
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_test_enable(true)
            .depth_write_enable(false)
            .color_blend(ColorBlendAttachment::additive())
            .build(Arc::clone(&device), &graphics_pipeline_layout)?;

        info!(
            "Particle system ready: {} particles, {} workgroup(s), seed {}",
            config.max_particles,
            dispatch_group_count(config.max_particles, WORKGROUP_SIZE),
            seed
        );

        Ok(Self {
            compute_pipeline,
            graphics_pipeline,
            compute_pipeline_layout,
            graphics_pipeline_layout,
            compute_set,
            compute_pool,
            compute_set_layout,
            quad_buffer,
            particles,
            hazards: HazardTracker::new(),
            push: ComputePushConstants::default(),
            draw_constants: ParticleDrawConstants::new(config),
            config: config.clone(),
        })
    }

    /// Record one simulation step between its two barriers. Call outside
    /// the render pass.
    ///
    /// # Errors
    ///
    /// [`RenderError::Hazard`] in debug builds when the dispatch writes the
    /// particle buffer while an earlier draw may still be reading it.
    pub fn simulate(
        &mut self,
        cmd: &CommandBuffer,
        frame_time: f32,
        emitter_pos: Vec3,
        rand_seed: f32,
    ) -> RenderResult<()> {
        self.hazards.begin_frame();
        self.push = ComputePushConstants::new(&self.config, frame_time, emitter_pos, rand_seed);

        self.record_barrier(cmd, &DispatchBarrier::before_dispatch());

        cmd.bind_pipeline(self.compute_pipeline.bind_point(), self.compute_pipeline.handle());
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::COMPUTE,
            self.compute_pipeline_layout.handle(),
            0,
            &[self.compute_set],
        );
        cmd.push_constants(
            self.compute_pipeline_layout.handle(),
            vk::ShaderStageFlags::COMPUTE,
            0,
            &self.push,
        );
        cmd.dispatch(
            dispatch_group_count(self.particles.count(), WORKGROUP_SIZE),
            1,
            1,
        );
        if let Some(hazard) = self.hazards.record_compute_write(self.particles.handle()) {
            return Err(RenderError::Hazard(hazard.to_string()));
        }

        self.record_barrier(cmd, &DispatchBarrier::after_dispatch());
        Ok(())
    }

    fn record_barrier(&mut self, cmd: &CommandBuffer, barrier: &DispatchBarrier) {
        cmd.memory_barrier(barrier.src_stage, barrier.dst_stage, barrier.memory);
        self.hazards
            .record_barrier(barrier.src_stage, barrier.dst_stage, &barrier.memory);
    }

    /// Record the instanced draw. Call inside the render pass, after
    /// [`simulate`](Self::simulate) in the same command buffer.
    ///
    /// # Errors
    ///
    /// [`RenderError::Hazard`] in debug builds when the particle buffer is
    /// read without a barrier after its last compute write.
    pub fn draw(&mut self, cmd: &CommandBuffer, global_set: vk::DescriptorSet) -> RenderResult<()> {
        if let Some(hazard) = self.hazards.record_vertex_read(self.particles.handle()) {
            return Err(RenderError::Hazard(hazard.to_string()));
        }

        cmd.bind_pipeline(self.graphics_pipeline.bind_point(), self.graphics_pipeline.handle());
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            self.graphics_pipeline_layout.handle(),
            0,
            &[global_set],
        );
        cmd.push_constants(
            self.graphics_pipeline_layout.handle(),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            0,
            &self.draw_constants,
        );
        cmd.bind_vertex_buffers(
            QuadVertex::BINDING,
            &[self.quad_buffer.handle(), self.particles.handle()],
            &[0, 0],
        );
        cmd.draw(QUAD_VERTEX_COUNT, self.particles.count(), 0, 0);
        Ok(())
    }

    #[inline]
    pub fn particles(&self) -> &ParticleBuffer {
        &self.particles
    }

    /// Parameters of the last recorded dispatch.
    #[inline]
    pub fn last_push_constants(&self) -> &ComputePushConstants {
        &self.push
    }

    #[inline]
    pub fn hazards(&self) -> &HazardTracker {
        &self.hazards
    }

    #[inline]
    pub fn max_particles(&self) -> u32 {
        self.particles.count()
    }
}

impl Drop for ParticleSystem {
    fn drop(&mut self) {
        debug!(
            "Destroying particle system ({} particle(s), {} compute set(s), layout {:?})",
            self.particles.count(),
            self.compute_pool.budget().sets_in_use(),
            self.compute_set_layout.handle()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hazard::{Hazard, HazardKind, orders_compute_to_vertex, orders_vertex_to_compute};

    #[test]
    fn test_particle_layout() {
        assert_eq!(Particle::SIZE, 80);
        assert_eq!(std::mem::offset_of!(Particle, position), 16);
        assert_eq!(std::mem::offset_of!(Particle, velocity), 32);
        assert_eq!(std::mem::offset_of!(Particle, convergence_target), 48);
        assert_eq!(std::mem::offset_of!(Particle, life), 60);
        assert_eq!(std::mem::offset_of!(Particle, color_lookup), 64);
        assert_eq!(std::mem::offset_of!(Particle, max_life), 68);
    }

    #[test]
    fn test_push_constant_layout() {
        assert_eq!(ComputePushConstants::SIZE, 112);
        assert_eq!(std::mem::offset_of!(ComputePushConstants, emitter_pos), 32);
        assert_eq!(std::mem::offset_of!(ComputePushConstants, emitter_scale), 48);
        assert_eq!(std::mem::offset_of!(ComputePushConstants, emitter_rot), 64);
        assert_eq!(
            std::mem::offset_of!(ComputePushConstants, convergence_point),
            80
        );
        assert_eq!(
            std::mem::offset_of!(ComputePushConstants, convergence_strength),
            92
        );
        assert_eq!(std::mem::offset_of!(ComputePushConstants, rand_seed), 104);
        assert!(push_constant_range::<ComputePushConstants>(vk::ShaderStageFlags::COMPUTE).is_ok());
        assert_eq!(std::mem::size_of::<ParticleDrawConstants>(), 32);
    }

    #[test]
    fn test_push_constant_values() {
        let config = ParticleConfig {
            lifetime: 4.0,
            emission_rate: 250.0,
            ..ParticleConfig::default()
        };
        let push = ComputePushConstants::new(&config, 0.016, Vec3::new(1.0, 2.0, 3.0), 4242.0);

        assert_eq!(push.delta_time, 0.016);
        assert_eq!(push.particle_min_life, 2.0);
        assert_eq!(push.particle_max_life, 6.0);
        assert_eq!(push.emission_rate, 250.0);
        assert_eq!(push.emitter_pos, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(push.emitter_scale, Vec3::ONE);
        assert_eq!(push.convergence_point, Vec3::new(0.0, 3.0, 0.0));
        assert_eq!(push.updraft, 1.2);
        assert_eq!(push.rand_seed, 4242.0);
    }

    #[test]
    fn test_initial_particles_deterministic() {
        let a = initial_particles(500, 7);
        let b = initial_particles(500, 7);
        let c = initial_particles(500, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_initial_particles_ring() {
        for p in initial_particles(1000, 1) {
            let planar = glam::Vec2::new(p.position.x, p.position.z - 1.0);
            assert!((planar.length() - 1.0).abs() < 1e-4);
            assert!(p.position.y >= -0.65 && p.position.y <= -0.35);
            assert!(p.velocity.y > 0.8 && p.velocity.y < 1.2);
            assert!(p.max_life >= 2.5 && p.max_life < 7.5);
            assert_eq!(p.life, 0.0);
            assert_eq!(p.start_pos, p.position);
            assert_eq!(p.convergence_target, Vec3::new(0.0, 3.0, 1.0));
        }
    }

    #[test]
    fn test_dispatch_covers_all_particles() {
        assert_eq!(dispatch_group_count(3000, WORKGROUP_SIZE), 12);
        assert_eq!(dispatch_group_count(256, WORKGROUP_SIZE), 1);
        assert_eq!(dispatch_group_count(257, WORKGROUP_SIZE), 2);
    }

    #[test]
    fn test_vertex_layout_is_valid() {
        let layout = particle_vertex_layout();
        layout.validate().unwrap();
        assert_eq!(layout.bindings.len(), 2);
        assert_eq!(
            layout.bindings[1].input_rate,
            vk::VertexInputRate::INSTANCE
        );
    }

    #[test]
    fn test_default_shaders_come_from_build_output() {
        let shaders = ParticleShaders::default();
        assert_eq!(shaders.dir, Path::new(BUILT_SHADER_DIR));
        assert!(shaders.dir.is_absolute());
        assert!(shaders.dir.ends_with("shaders"));
    }

    #[test]
    fn test_draw_constants_from_config() {
        let config = ParticleConfig::default();
        let draw = ParticleDrawConstants::new(&config);
        assert_eq!(draw.color, Vec4::new(1.0, 0.3, 0.0, 1.0));
        assert_eq!(draw.size, config.size);
    }

    /// Replays the accesses two consecutive frames record on the shared buffer.
    fn replay_frames(tracker: &mut HazardTracker, leading_barrier: bool) -> Vec<Hazard> {
        use ash::vk::Handle;

        let buffer = vk::Buffer::from_raw(11);
        let mut found = Vec::new();
        for _ in 0..2 {
            tracker.begin_frame();
            if leading_barrier {
                let b = DispatchBarrier::before_dispatch();
                tracker.record_barrier(b.src_stage, b.dst_stage, &b.memory);
            }
            found.extend(tracker.record_compute_write(buffer));
            let b = DispatchBarrier::after_dispatch();
            tracker.record_barrier(b.src_stage, b.dst_stage, &b.memory);
            found.extend(tracker.record_vertex_read(buffer));
        }
        found
    }

    #[test]
    fn test_consecutive_frames_are_ordered() {
        let mut tracker = HazardTracker::with_enabled(true);
        assert!(replay_frames(&mut tracker, true).is_empty());
    }

    #[test]
    fn test_missing_leading_barrier_races_previous_draw() {
        let mut tracker = HazardTracker::with_enabled(true);
        let hazards = replay_frames(&mut tracker, false);
        assert_eq!(hazards.len(), 1);
        assert_eq!(hazards[0].kind, HazardKind::WriteAfterRead);
    }

    #[test]
    fn test_dispatch_barriers_cover_both_directions() {
        let before = DispatchBarrier::before_dispatch();
        assert!(orders_vertex_to_compute(before.src_stage, before.dst_stage));
        assert!(before.src_stage.contains(vk::PipelineStageFlags::COMPUTE_SHADER));
        assert!(before
            .memory
            .dst_access_mask
            .contains(vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE));

        let after = DispatchBarrier::after_dispatch();
        assert!(orders_compute_to_vertex(after.src_stage, after.dst_stage, &after.memory));
    }
}
