//! Presentable surface chain.
//!
//! Everything whose validity is tied to the current window size lives here:
//! the swapchain and its image views, the multisampled color target, one depth
//! target per presentable image, the render pass, one framebuffer per image,
//! and the frame-slot synchronization objects.
//!
//! Per-slot objects (`image_available` semaphores, `in_flight` fences) are
//! indexed by frame slot. Per-image objects (views, depth targets,
//! framebuffers, `render_finished` semaphores) are indexed by the acquired
//! image index. A render-finished semaphore is only re-signaled once its
//! image has been acquired again, which means the presentation engine is done
//! waiting on it.
//!
//! The chain is rebuilt, never resized in place: construct a new chain with
//! `previous = Some(&old)`, then drop the old one.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{AttachmentImage, AttachmentKind, create_color_view};
use crate::physical_device::cap_sample_count;
use crate::render_pass::{Framebuffer, RenderPass};
use crate::sync::{Fence, FrameSlots, MAX_FRAMES_IN_FLIGHT, Semaphore};

/// Result of [`SurfaceChain::acquire_next_image`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32 },
    /// Usable, but the chain no longer matches the surface exactly.
    Suboptimal { image_index: u32 },
    /// The chain must be rebuilt before anything can be presented.
    OutOfDate,
}

/// Result of [`SurfaceChain::submit_and_present`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    #[inline]
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// What the surface offers this device.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Surface support: {} formats, {} present modes, image count {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Reject surfaces that offer nothing to pick from.
    pub fn validate(&self) -> RhiResult<()> {
        if self.formats.is_empty() {
            return Err(RhiError::Configuration(
                "surface reports no supported formats".to_string(),
            ));
        }
        if self.present_modes.is_empty() {
            return Err(RhiError::Configuration(
                "surface reports no supported present modes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tunables for chain construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceChainConfig {
    /// Used when the surface offers it, FIFO otherwise.
    pub preferred_present_mode: vk::PresentModeKHR,
    /// Upper bound on the multisample count.
    pub max_samples: u32,
}

impl Default for SurfaceChainConfig {
    fn default() -> Self {
        Self {
            preferred_present_mode: vk::PresentModeKHR::MAILBOX,
            max_samples: 64,
        }
    }
}

/// 8-bit sRGB with the sRGB-nonlinear color space, else the first format offered.
///
/// `formats` must not be empty; see [`SurfaceSupport::validate`].
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// The preferred mode when offered, otherwise FIFO, which every surface supports.
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if present_modes.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent when it dictates one, else `requested`
/// clamped to the supported range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// `min + 1`, capped at `max`. A `max` of zero means unbounded.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Width over height. A zero height counts as one.
pub fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    extent.width as f32 / extent.height.max(1) as f32
}

/// Attachment formats a chain's dependent pipelines were built against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
}

/// A rebuild must keep both formats; pipelines are not rebuilt with the chain.
pub fn ensure_same_formats(old: ChainFormats, new: ChainFormats) -> RhiResult<()> {
    if old == new {
        Ok(())
    } else {
        Err(RhiError::FormatChanged {
            old_color: old.color,
            new_color: new.color,
            old_depth: old.depth,
            new_depth: new.depth,
        })
    }
}

/// Clear values in attachment order: color, then depth.
pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

/// Swapchain handle plus views onto its images.
struct Presentables {
    device: Arc<Device>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
}

impl Drop for Presentables {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.device
                .swapchain_loader()
                .destroy_swapchain(self.swapchain, None);
        }
    }
}

/// The presentable surface chain. See the module docs for indexing rules.
pub struct SurfaceChain {
    // Fields drop top to bottom, the reverse of creation order.
    in_flight: Vec<Fence>,
    render_finished: Vec<Semaphore>,
    image_available: Vec<Semaphore>,
    framebuffers: Vec<Framebuffer>,
    depth_targets: Vec<AttachmentImage>,
    color_target: AttachmentImage,
    render_pass: RenderPass,
    presentables: Presentables,

    slots: FrameSlots,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl SurfaceChain {
    /// Build a chain for `surface` at (about) `extent`.
    ///
    /// Passing the chain being replaced as `previous` hands its swapchain to
    /// the presentation engine as the old swapchain. The previous chain must
    /// be dropped after this returns.
    ///
    /// # Errors
    ///
    /// [`RhiError::Configuration`] when the surface offers no format or
    /// present mode, or no depth format is supported. Any creation failure is
    /// returned as-is.
    pub fn new(
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        extent: vk::Extent2D,
        config: SurfaceChainConfig,
        previous: Option<&SurfaceChain>,
    ) -> RhiResult<Self> {
        let support = SurfaceSupport::query(device.physical_device(), surface, surface_loader)?;
        support.validate()?;

        let surface_format = choose_surface_format(&support.formats).ok_or_else(|| {
            RhiError::Configuration("surface reports no supported formats".to_string())
        })?;
        if surface_format.format != vk::Format::B8G8R8A8_SRGB {
            warn!(
                "Preferred sRGB surface format unavailable, using {:?}",
                surface_format.format
            );
        }
        let present_mode = choose_present_mode(&support.present_modes, config.preferred_present_mode);
        let extent = choose_extent(&support.capabilities, extent);
        let min_image_count = choose_image_count(&support.capabilities);
        let depth_format = device.find_depth_format()?;
        let samples = cap_sample_count(device.max_usable_sample_count(), config.max_samples);

        let presentables = Self::create_swapchain(
            &device,
            surface,
            &support,
            surface_format,
            present_mode,
            extent,
            min_image_count,
            previous.map_or(vk::SwapchainKHR::null(), |p| p.presentables.swapchain),
        )?;
        let image_count = presentables.images.len();

        let render_pass = RenderPass::new(
            Arc::clone(&device),
            surface_format.format,
            depth_format,
            samples,
        )?;

        let color_target = AttachmentImage::new(
            Arc::clone(&device),
            AttachmentKind::Color,
            surface_format.format,
            extent,
            samples,
        )?;

        let depth_targets = (0..image_count)
            .map(|_| {
                AttachmentImage::new(
                    Arc::clone(&device),
                    AttachmentKind::Depth,
                    depth_format,
                    extent,
                    samples,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let framebuffers = presentables
            .views
            .iter()
            .zip(&depth_targets)
            .map(|(&view, depth)| {
                Framebuffer::new(
                    Arc::clone(&device),
                    &render_pass,
                    &[color_target.view(), depth.view(), view],
                    extent,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let frame_count = MAX_FRAMES_IN_FLIGHT.min(image_count);
        let image_available = (0..frame_count)
            .map(|_| Semaphore::new(Arc::clone(&device)))
            .collect::<RhiResult<Vec<_>>>()?;
        let in_flight = (0..frame_count)
            .map(|_| Fence::new(Arc::clone(&device), true))
            .collect::<RhiResult<Vec<_>>>()?;
        let render_finished = (0..image_count)
            .map(|_| Semaphore::new(Arc::clone(&device)))
            .collect::<RhiResult<Vec<_>>>()?;

        info!(
            "Surface chain created: {}x{}, {:?}/{:?}, depth {:?}, {:?}, {} images, {} frame slots, {:?}",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            depth_format,
            present_mode,
            image_count,
            frame_count,
            samples
        );

        Ok(Self {
            in_flight,
            render_finished,
            image_available,
            framebuffers,
            depth_targets,
            color_target,
            render_pass,
            presentables,
            slots: FrameSlots::new(frame_count, image_count),
            surface_format,
            depth_format,
            samples,
            extent,
            present_mode,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn create_swapchain(
        device: &Arc<Device>,
        surface: vk::SurfaceKHR,
        support: &SurfaceSupport,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        extent: vk::Extent2D,
        min_image_count: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Presentables> {
        let queue_families = device.queue_families();
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };
        let family_indices = [graphics_family, present_family];

        let (sharing_mode, family_slice) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let loader = device.swapchain_loader();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

        let mut presentables = Presentables {
            device: Arc::clone(device),
            swapchain,
            images: Vec::new(),
            views: Vec::new(),
        };
        presentables.images = unsafe { loader.get_swapchain_images(swapchain)? };
        for &image in &presentables.images {
            let view = create_color_view(device, image, surface_format.format)?;
            presentables.views.push(view);
        }

        Ok(presentables)
    }

    /// Wait for the current slot's previous submission, then acquire an image.
    ///
    /// Blocks without timeout. Out-of-date and suboptimal results are outcomes,
    /// not errors.
    pub fn acquire_next_image(&mut self) -> RhiResult<AcquireOutcome> {
        let slot = self.slots.current();
        self.in_flight[slot].wait(u64::MAX)?;

        let result = unsafe {
            self.presentables
                .device
                .swapchain_loader()
                .acquire_next_image(
                    self.presentables.swapchain,
                    u64::MAX,
                    self.image_available[slot].handle(),
                    vk::Fence::null(),
                )
        };

        match result {
            Ok((image_index, false)) => Ok(AcquireOutcome::Acquired { image_index }),
            Ok((image_index, true)) => {
                debug!("Acquire reported suboptimal chain (image {})", image_index);
                Ok(AcquireOutcome::Suboptimal { image_index })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Acquire reported out-of-date chain");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Submit `command_buffer` for the current slot and present `image_index`.
    ///
    /// Waits first for any other slot still rendering into the same image.
    /// Rotates to the next frame slot whenever the submission went through.
    pub fn submit_and_present(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<PresentOutcome> {
        let image = image_index as usize;
        if image >= self.presentables.images.len() {
            return Err(RhiError::Configuration(format!(
                "image index {} out of range for {} images",
                image_index,
                self.presentables.images.len()
            )));
        }

        let slot = self.slots.current();
        if let Some(other) = self.slots.claim_image(image) {
            self.in_flight[other].wait(u64::MAX)?;
        }

        let wait_semaphores = [self.image_available[slot].handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.render_finished[image].handle()];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let device = Arc::clone(&self.presentables.device);
        self.in_flight[slot].reset_and_submit(|fence| unsafe {
            device
                .handle()
                .queue_submit(device.graphics_queue(), &[submit_info], fence)
        })?;

        let swapchains = [self.presentables.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            device
                .swapchain_loader()
                .queue_present(device.present_queue(), &present_info)
        };

        self.slots.advance();

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Color and depth formats of this chain.
    pub fn formats(&self) -> ChainFormats {
        ChainFormats {
            color: self.surface_format.format,
            depth: self.depth_format,
        }
    }

    /// Whether both chains use the same color and depth formats.
    pub fn compare_formats(&self, other: &SurfaceChain) -> bool {
        self.formats() == other.formats()
    }

    /// Format check between two live chains. `self` is the older one.
    pub fn ensure_same_formats(&self, newer: &SurfaceChain) -> RhiResult<()> {
        ensure_same_formats(self.formats(), newer.formats())
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Framebuffer for presentable image `index`.
    pub fn framebuffer(&self, index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(index).map(Framebuffer::handle)
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    pub fn extent_aspect_ratio(&self) -> f32 {
        aspect_ratio(self.extent)
    }

    #[inline]
    pub fn image_format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.presentables.images.len()
    }

    #[inline]
    pub fn depth_image_count(&self) -> usize {
        self.depth_targets.len()
    }

    #[inline]
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Frame slot the next acquire will use.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.slots.current()
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.slots.frame_count()
    }

    /// Slot bookkeeping, including the images-in-flight map.
    #[inline]
    pub fn frame_slots(&self) -> &FrameSlots {
        &self.slots
    }

    /// Raw swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.presentables.swapchain
    }

    #[inline]
    pub fn msaa_color_view(&self) -> vk::ImageView {
        self.color_target.view()
    }
}

impl Drop for SurfaceChain {
    fn drop(&mut self) {
        info!(
            "Surface chain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.presentables.images.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
    }

    #[test]
    fn test_choose_surface_format_needs_nonlinear_space() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM),
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_UNORM)
        );
    }

    #[test]
    fn test_choose_surface_format_empty() {
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_choose_present_mode() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::FIFO),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let big = choose_extent(&capabilities, vk::Extent2D { width: 3000, height: 50 });
        assert_eq!((big.width, big.height), (2000, 100));

        let fits = choose_extent(&capabilities, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((fits.width, fits.height), (800, 600));
    }

    #[test]
    fn test_choose_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capped), 2);

        let roomy = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&roomy), 3);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&unbounded), 4);
    }

    #[test]
    fn test_surface_support_validate() {
        let support = SurfaceSupport {
            capabilities: Default::default(),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(matches!(support.validate(), Err(RhiError::Configuration(_))));

        let support = SurfaceSupport {
            capabilities: Default::default(),
            formats: vec![format(vk::Format::B8G8R8A8_SRGB)],
            present_modes: vec![],
        };
        assert!(matches!(support.validate(), Err(RhiError::Configuration(_))));
    }

    #[test]
    fn test_clear_values() {
        let values = clear_values([0.01, 0.01, 0.01, 1.0]);
        unsafe {
            assert_eq!(values[0].color.float32, [0.01, 0.01, 0.01, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
        }
    }

    #[test]
    fn test_present_outcome_needs_rebuild() {
        assert!(!PresentOutcome::Presented.needs_rebuild());
        assert!(PresentOutcome::Suboptimal.needs_rebuild());
        assert!(PresentOutcome::OutOfDate.needs_rebuild());
    }

    fn formats(color: vk::Format, depth: vk::Format) -> ChainFormats {
        ChainFormats { color, depth }
    }

    #[test]
    fn test_aspect_ratio() {
        let wide = vk::Extent2D { width: 1024, height: 512 };
        assert_eq!(aspect_ratio(wide), 2.0);
        let flat = vk::Extent2D { width: 640, height: 0 };
        assert_eq!(aspect_ratio(flat), 640.0);
    }

    #[test]
    fn test_same_formats_pass() {
        let f = formats(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT);
        assert!(ensure_same_formats(f, f).is_ok());
    }

    #[test]
    fn test_color_format_change_is_fatal() {
        let old = formats(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT);
        let new = formats(vk::Format::R8G8B8A8_UNORM, vk::Format::D32_SFLOAT);
        match ensure_same_formats(old, new) {
            Err(RhiError::FormatChanged {
                old_color,
                new_color,
                old_depth,
                new_depth,
            }) => {
                assert_eq!(old_color, vk::Format::B8G8R8A8_SRGB);
                assert_eq!(new_color, vk::Format::R8G8B8A8_UNORM);
                assert_eq!(old_depth, new_depth);
            }
            other => panic!("expected FormatChanged, got {:?}", other),
        }
    }

    #[test]
    fn test_depth_format_change_is_fatal() {
        let old = formats(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT);
        let new = formats(vk::Format::B8G8R8A8_SRGB, vk::Format::D24_UNORM_S8_UINT);
        assert!(matches!(
            ensure_same_formats(old, new),
            Err(RhiError::FormatChanged { new_depth, .. })
                if new_depth == vk::Format::D24_UNORM_S8_UINT
        ));
    }
}
