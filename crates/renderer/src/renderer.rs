//! Main renderer orchestration.
//!
//! [`Renderer`] owns the Vulkan instance, window surface and device, and
//! wires the frame orchestrator, the rotating global uniforms and the
//! particle system into one frame:
//!
//! 1. `begin_frame` (may return no frame while the chain is rebuilt)
//! 2. write this slot's [`GlobalUbo`] and flush it
//! 3. record the particle simulation and its barrier
//! 4. render pass: draw particles
//! 5. `end_frame`: submit, present, poll the window for a resize

use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3};
use tracing::{error, info};

use ember_core::EmberConfig;
use ember_platform::{Surface, SurfaceTarget, Window};
use ember_rhi::buffer::Buffer;
use ember_rhi::descriptor::{DescriptorPool, DescriptorSetLayout};
use ember_rhi::device::Device;
use ember_rhi::instance::Instance;
use ember_rhi::physical_device::select_physical_device;
use ember_rhi::sync::MAX_FRAMES_IN_FLIGHT;

use crate::error::RenderResult;
use crate::orchestrator::{FrameContext, FrameOrchestrator, OrchestratorConfig};
use crate::particles::{BUILT_SHADER_DIR, ParticleShaders, ParticleSystem};
use crate::rotating::RotatingSet;
use crate::ubo::{GlobalUbo, GpuPointLight};

/// Binding of the global uniform buffer in set 0.
pub const GLOBAL_UBO_BINDING: u32 = 0;

/// Scene state the renderer needs for one frame.
#[derive(Clone, Debug, Default)]
pub struct FrameInputs {
    pub projection: Mat4,
    pub view: Mat4,
    pub inverse_view: Mat4,
    pub lights: Vec<GpuPointLight>,
    pub emitter_pos: Vec3,
    /// Per-frame seed for the simulation noise.
    pub rand_seed: f32,
}

/// Main renderer that manages all Vulkan resources.
///
/// # Resource Destruction Order
///
/// 1. Wait for all GPU work to complete
/// 2. Particle system (pipelines, particle buffer)
/// 3. Rotating global uniforms, then their pool and layout
/// 4. Frame orchestrator (command buffers, surface chain)
/// 5. Device
/// 6. Surface
/// 7. Instance
///
/// ManuallyDrop is used to ensure correct destruction order.
pub struct Renderer {
    instance: ManuallyDrop<Instance>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    orchestrator: ManuallyDrop<FrameOrchestrator>,
    global_layout: ManuallyDrop<DescriptorSetLayout>,
    global_pool: ManuallyDrop<DescriptorPool>,
    globals: ManuallyDrop<RotatingSet<Buffer>>,
    particles: ManuallyDrop<ParticleSystem>,
}

impl Renderer {
    /// Creates the renderer for `window`.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created, no GPU is
    /// suitable, or the shader modules cannot be loaded.
    pub fn new(window: &Window, config: &EmberConfig) -> RenderResult<Self> {
        info!("Initializing renderer");

        let surface_extensions = window.required_extensions()?;
        let instance = Instance::new(c"ember", config.render.validation, &surface_extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let device_info = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &device_info)?;

        let orchestrator = FrameOrchestrator::new(
            Arc::clone(&device),
            surface.handle(),
            surface.loader(),
            window.framebuffer_extent(),
            OrchestratorConfig::from_render_config(&config.render),
        )?;

        let global_layout = DescriptorSetLayout::builder(Arc::clone(&device))
            .add_binding(
                GLOBAL_UBO_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::ALL_GRAPHICS,
                1,
            )
            .build()?;
        let mut global_pool = DescriptorPool::builder(Arc::clone(&device))
            .max_sets(MAX_FRAMES_IN_FLIGHT as u32)
            .pool_size(
                vk::DescriptorType::UNIFORM_BUFFER,
                MAX_FRAMES_IN_FLIGHT as u32,
            )
            .build()?;
        let mut globals = RotatingSet::uniform(&device, GlobalUbo::SIZE as u64, MAX_FRAMES_IN_FLIGHT)?;
        globals.build_descriptor_sets(&global_layout, &mut global_pool, GLOBAL_UBO_BINDING)?;

        let particles = ParticleSystem::new(
            Arc::clone(&device),
            orchestrator.chain(),
            &global_layout,
            &ParticleShaders {
                dir: config
                    .render
                    .shader_dir
                    .as_deref()
                    .unwrap_or(Path::new(BUILT_SHADER_DIR)),
                ..ParticleShaders::default()
            },
            &config.particles,
        )?;

        info!("Renderer initialized");

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            orchestrator: ManuallyDrop::new(orchestrator),
            global_layout: ManuallyDrop::new(global_layout),
            global_pool: ManuallyDrop::new(global_pool),
            globals: ManuallyDrop::new(globals),
            particles: ManuallyDrop::new(particles),
        })
    }

    /// Renders one frame.
    ///
    /// `prepare` runs once the image is acquired, so the projection it builds
    /// sees the extent of a chain rebuilt in this call. It is not called when
    /// no frame is rendered, and `false` is returned: the surface chain was
    /// stale or the window is minimized.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan operation fails.
    pub fn render_frame<T, F>(
        &mut self,
        target: &mut T,
        frame_time: f32,
        prepare: F,
    ) -> RenderResult<bool>
    where
        T: SurfaceTarget + ?Sized,
        F: FnOnce(&FrameContext) -> FrameInputs,
    {
        let Some(mut frame) = self.orchestrator.begin_frame(target, frame_time)? else {
            return Ok(false);
        };
        let inputs = prepare(&frame);
        let slot = frame.frame_index;
        frame.global_descriptor_set = self.globals.descriptor_set(slot)?;

        let mut ubo = GlobalUbo::new(inputs.projection, inputs.view, inputs.inverse_view);
        ubo.set_lights(&inputs.lights);
        self.globals.write_frame_pod(slot, &ubo)?;
        self.globals.flush(slot)?;

        self.particles.simulate(
            &frame.command_buffer,
            frame_time,
            inputs.emitter_pos,
            inputs.rand_seed,
        )?;

        self.orchestrator.begin_render_pass(&frame)?;
        self.particles
            .draw(&frame.command_buffer, frame.global_descriptor_set)?;
        self.orchestrator.end_render_pass(&frame)?;

        self.orchestrator.end_frame(target)?;
        Ok(true)
    }

    pub fn orchestrator(&self) -> &FrameOrchestrator {
        &self.orchestrator
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Wait for all GPU work to complete before destroying resources
        if let Err(e) = self.device.wait_idle() {
            error!(
                "Failed to wait for device idle during renderer drop: {:?}",
                e
            );
        }

        // SAFETY: each field is dropped exactly once, here, in dependency order.
        unsafe {
            ManuallyDrop::drop(&mut self.particles);
            ManuallyDrop::drop(&mut self.globals);
            ManuallyDrop::drop(&mut self.global_pool);
            ManuallyDrop::drop(&mut self.global_layout);
            ManuallyDrop::drop(&mut self.orchestrator);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
