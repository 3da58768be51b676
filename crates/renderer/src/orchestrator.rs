//! Frame orchestrator.
//!
//! Drives one [`SurfaceChain`] through begin/render-pass/end cycles, one per
//! frame slot, and rebuilds the chain when the presentation engine reports
//! it stale or the window says it was resized. Staleness never reaches the
//! caller as an error: `begin_frame` returns `None` and the caller skips the
//! iteration.
//!
//! # Frame Loop
//!
//! ```text
//! begin_frame ──► (compute work) ──► begin_render_pass ──► draws
//!      ▲                                                     │
//!      └──── end_frame ◄──────────── end_render_pass ◄───────┘
//! ```
//!
//! The window is polled for a resize once per `end_frame`. A rebuild while
//! the window reports a zero extent (minimized) is deferred: it stays
//! pending and `begin_frame` keeps returning `None` until the extent is
//! non-zero again.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use ember_core::{PresentModePreference, RenderConfig};
use ember_platform::SurfaceTarget;
use ember_rhi::RhiError;
use ember_rhi::command::{CommandBuffer, CommandPool, full_scissor, full_viewport};
use ember_rhi::device::Device;
use ember_rhi::surface_chain::{
    AcquireOutcome, SurfaceChain, SurfaceChainConfig, aspect_ratio, clear_values,
};
use ember_rhi::sync::MAX_FRAMES_IN_FLIGHT;

use crate::error::{RenderError, RenderResult};
use crate::frame::{FramePhase, FrameState};

/// Chain tunables plus the clear color.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrchestratorConfig {
    pub chain: SurfaceChainConfig,
    pub clear_color: [f32; 4],
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chain: SurfaceChainConfig::default(),
            clear_color: [0.01, 0.01, 0.01, 1.0],
        }
    }
}

impl OrchestratorConfig {
    pub fn from_render_config(config: &RenderConfig) -> Self {
        let preferred_present_mode = match config.present_mode {
            PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        };
        Self {
            chain: SurfaceChainConfig {
                preferred_present_mode,
                max_samples: config.max_msaa_samples,
            },
            clear_color: config.clear_color,
        }
    }
}

/// What recording code gets for one frame.
#[derive(Clone)]
pub struct FrameContext {
    /// Frame slot; indexes every per-frame array.
    pub frame_index: usize,
    /// Presentable image this frame renders into.
    pub image_index: u32,
    /// Seconds since the previous frame.
    pub frame_time: f32,
    /// Extent of the chain the image was acquired from, after any rebuild.
    pub extent: vk::Extent2D,
    pub command_buffer: CommandBuffer,
    /// This slot's global uniform set. Null until the owner of the rotating
    /// set fills it in.
    pub global_descriptor_set: vk::DescriptorSet,
}

impl FrameContext {
    /// Aspect ratio to build this frame's projection with.
    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        aspect_ratio(self.extent)
    }
}

/// Owns the surface chain and the per-slot command buffers.
///
/// The surface behind `surface` must outlive the orchestrator.
pub struct FrameOrchestrator {
    // Field order is drop order: buffers go with the pool, the chain after.
    command_buffers: Vec<CommandBuffer>,
    command_pool: CommandPool,
    chain: SurfaceChain,
    state: FrameState,
    image_index: u32,
    pending_rebuild: bool,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    config: OrchestratorConfig,
    device: Arc<Device>,
}

impl FrameOrchestrator {
    /// Build the first chain at `extent` and one command buffer per slot.
    ///
    /// # Errors
    ///
    /// Any chain construction error, including configuration errors for
    /// surfaces with no format or present mode.
    pub fn new(
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        extent: vk::Extent2D,
        config: OrchestratorConfig,
    ) -> RenderResult<Self> {
        let chain = SurfaceChain::new(
            Arc::clone(&device),
            surface,
            surface_loader,
            extent,
            config.chain,
            None,
        )?;

        let command_pool = CommandPool::new(
            Arc::clone(&device),
            device.queue_families().graphics_family.ok_or_else(|| {
                RhiError::Configuration("device has no graphics queue family".to_string())
            })?,
        )?;
        let command_buffers = command_pool.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;
        let state = FrameState::new(chain.frame_count());

        info!(
            "Frame orchestrator ready: {} slot(s), {} image(s)",
            chain.frame_count(),
            chain.image_count()
        );

        Ok(Self {
            command_buffers,
            command_pool,
            chain,
            state,
            image_index: 0,
            pending_rebuild: false,
            surface,
            surface_loader: surface_loader.clone(),
            config,
            device,
        })
    }

    /// Acquire an image and begin recording for the current slot.
    ///
    /// Returns `None` when there is nothing to render this iteration: the
    /// chain was out of date and has been rebuilt, or a rebuild is waiting
    /// for a non-zero extent.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidTransition`] unless idle. Device and
    /// recording failures are fatal.
    pub fn begin_frame<T>(
        &mut self,
        target: &T,
        frame_time: f32,
    ) -> RenderResult<Option<FrameContext>>
    where
        T: SurfaceTarget + ?Sized,
    {
        self.state.check_begin_frame()?;

        if self.pending_rebuild && !self.rebuild_chain(target)? {
            return Ok(None);
        }

        let image_index = match self.chain.acquire_next_image()? {
            AcquireOutcome::Acquired { image_index } => image_index,
            AcquireOutcome::Suboptimal { image_index } => {
                // Finish this frame, rebuild in end_frame.
                self.pending_rebuild = true;
                image_index
            }
            AcquireOutcome::OutOfDate => {
                self.pending_rebuild = true;
                self.rebuild_chain(target)?;
                return Ok(None);
            }
        };

        let frame_index = self.state.frame_index();
        debug_assert_eq!(frame_index, self.chain.current_frame());
        let command_buffer = self.slot_command_buffer(frame_index)?.clone();

        command_buffer.reset()?;
        command_buffer.begin()?;
        self.state.begin_frame()?;
        self.image_index = image_index;

        Ok(Some(FrameContext {
            frame_index,
            image_index,
            frame_time,
            extent: self.chain.extent(),
            command_buffer,
            global_descriptor_set: vk::DescriptorSet::null(),
        }))
    }

    /// Open the chain's render pass on this frame's framebuffer and set the
    /// viewport and scissor to the full extent.
    pub fn begin_render_pass(&mut self, frame: &FrameContext) -> RenderResult<()> {
        if self.state.phase() != FramePhase::FrameStarted {
            return Err(RenderError::InvalidTransition {
                op: "begin_render_pass",
                state: self.state.phase(),
            });
        }
        self.check_command_buffer(frame)?;

        let framebuffer = self
            .chain
            .framebuffer(self.image_index as usize)
            .ok_or_else(|| {
                RhiError::Configuration(format!(
                    "no framebuffer for image {}",
                    self.image_index
                ))
            })?;
        let extent = self.chain.extent();
        let cmd = &frame.command_buffer;

        cmd.begin_render_pass(
            self.chain.render_pass(),
            framebuffer,
            extent,
            &clear_values(self.config.clear_color),
        );
        cmd.set_viewport(&full_viewport(extent));
        cmd.set_scissor(&full_scissor(extent));

        self.state.begin_render_pass()
    }

    pub fn end_render_pass(&mut self, frame: &FrameContext) -> RenderResult<()> {
        if self.state.phase() != FramePhase::RenderPassActive {
            return Err(RenderError::InvalidTransition {
                op: "end_render_pass",
                state: self.state.phase(),
            });
        }
        self.check_command_buffer(frame)?;

        frame.command_buffer.end_render_pass();
        self.state.end_render_pass()
    }

    /// Finish recording, submit and present, then poll `target` for a resize.
    ///
    /// A stale or suboptimal present, or a resize, rebuilds the chain before
    /// returning. The resize flag is cleared here.
    pub fn end_frame<T>(&mut self, target: &mut T) -> RenderResult<()>
    where
        T: SurfaceTarget + ?Sized,
    {
        self.state.check_end_frame()?;

        let slot = self.state.frame_index();
        let command_buffer = self.slot_command_buffer(slot)?;
        command_buffer.end()?;
        let handle = command_buffer.handle();

        let outcome = self.chain.submit_and_present(handle, self.image_index)?;
        self.state.end_frame()?;
        debug_assert_eq!(self.state.frame_index(), self.chain.current_frame());

        let resized = target.was_resized();
        if resized {
            target.reset_resized();
        }

        if outcome.needs_rebuild() || resized || self.pending_rebuild {
            debug!(
                "Rebuild requested after present ({:?}, resized: {})",
                outcome, resized
            );
            self.pending_rebuild = true;
            self.rebuild_chain(target)?;
        }

        Ok(())
    }

    /// Replace the chain with one built at the target's current extent.
    ///
    /// Returns `false` and leaves the rebuild pending when the extent is
    /// zero. Waits for the device to go idle before rebuilding.
    ///
    /// # Errors
    ///
    /// [`RhiError::FormatChanged`] when the new chain picked a different
    /// color or depth format. Pipelines built against the old render pass
    /// would no longer be compatible, so this is fatal.
    pub fn rebuild_chain<T>(&mut self, target: &T) -> RenderResult<bool>
    where
        T: SurfaceTarget + ?Sized,
    {
        if self.state.is_frame_in_progress() {
            return Err(RenderError::InvalidTransition {
                op: "rebuild_chain",
                state: self.state.phase(),
            });
        }

        let extent = target.framebuffer_extent();
        if extent.width == 0 || extent.height == 0 {
            if !self.pending_rebuild {
                debug!("Surface extent is zero, deferring rebuild");
            }
            self.pending_rebuild = true;
            return Ok(false);
        }

        self.device.wait_idle()?;

        let rebuilt = SurfaceChain::new(
            Arc::clone(&self.device),
            self.surface,
            &self.surface_loader,
            extent,
            self.config.chain,
            Some(&self.chain),
        )?;
        let old = std::mem::replace(&mut self.chain, rebuilt);
        old.ensure_same_formats(&self.chain)?;
        drop(old);

        self.state.restart(self.chain.frame_count());
        self.pending_rebuild = false;

        info!(
            "Surface chain rebuilt: {}x{}, {} image(s)",
            self.chain.width(),
            self.chain.height(),
            self.chain.image_count()
        );
        Ok(true)
    }

    fn slot_command_buffer(&self, slot: usize) -> RenderResult<&CommandBuffer> {
        self.command_buffers
            .get(slot)
            .ok_or(RenderError::SlotOutOfRange {
                slot,
                count: self.command_buffers.len(),
            })
    }

    fn check_command_buffer(&self, frame: &FrameContext) -> RenderResult<()> {
        let slot = self.state.frame_index();
        let expected = self.slot_command_buffer(slot)?;
        if frame.frame_index != slot || frame.command_buffer.handle() != expected.handle() {
            return Err(RenderError::CommandBufferMismatch { slot });
        }
        Ok(())
    }

    #[inline]
    pub fn chain(&self) -> &SurfaceChain {
        &self.chain
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn frame_index(&self) -> usize {
        self.state.frame_index()
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.state.frame_count()
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.state.phase()
    }

    #[inline]
    pub fn is_rebuild_pending(&self) -> bool {
        self.pending_rebuild
    }

    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }
}

impl Drop for FrameOrchestrator {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("wait_idle failed while dropping the orchestrator: {}", e);
        }
        debug!("Frame orchestrator destroyed");
    }
}
