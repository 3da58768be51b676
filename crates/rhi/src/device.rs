//! Vulkan logical device and queue management.
//!
//! The [`Device`] owns the logical device, its graphics and present queues,
//! the `gpu-allocator` allocator, a transient command pool for one-shot
//! uploads, and the swapchain extension loader. It also answers the
//! capability queries the surface chain and buffers need: supported formats,
//! usable sample counts and the memory alignment limits.

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{DEVICE_EXTENSIONS, PhysicalDeviceInfo, QueueFamilyIndices};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Vulkan logical device wrapper, shared through `Arc`.
pub struct Device {
    device: ash::Device,
    instance: ash::Instance,
    info: PhysicalDeviceInfo,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    /// Pool for short-lived upload command buffers.
    transient_pool: vk::CommandPool,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl Device {
    /// Creates the logical device, queues, allocator and transient command pool.
    ///
    /// # Errors
    ///
    /// Fails if device, pool or allocator creation fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = vk::PhysicalDeviceFeatures::default();
        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!(
            "Queues retrieved: graphics family {}, present family {}",
            graphics_family, present_family
        );

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_family)
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );
        let transient_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe {
                    device.destroy_command_pool(transient_pool, None);
                    device.destroy_device(None);
                }
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), &device);

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            info: physical_device_info.clone(),
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            transient_pool,
            swapchain_loader,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.info.device
    }

    #[inline]
    pub fn info(&self) -> &PhysicalDeviceInfo {
        &self.info
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.info.queue_families
    }

    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Lock the allocator, reporting a poisoned lock as an allocator error.
    pub fn lock_allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator.lock().map_err(|_| {
            RhiError::Allocator(gpu_allocator::AllocationError::Internal(
                "allocator lock poisoned".to_string(),
            ))
        })
    }

    #[inline]
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.info.properties.limits
    }

    /// Granularity of host flush and invalidate ranges on non-coherent memory.
    #[inline]
    pub fn non_coherent_atom_size(&self) -> vk::DeviceSize {
        self.limits().non_coherent_atom_size
    }

    #[inline]
    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.limits().min_uniform_buffer_offset_alignment
    }

    #[inline]
    pub fn min_storage_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.limits().min_storage_buffer_offset_alignment
    }

    #[inline]
    pub fn max_usable_sample_count(&self) -> vk::SampleCountFlags {
        self.info.max_usable_sample_count()
    }

    /// First format in `candidates` supporting `features` with `tiling`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Configuration`] if none of the candidates qualify.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> RhiResult<vk::Format> {
        pick_supported_format(candidates, tiling, features, |format| unsafe {
            self.instance
                .get_physical_device_format_properties(self.info.device, format)
        })
        .ok_or_else(|| {
            RhiError::Configuration(format!(
                "none of {:?} supports {:?} with {:?} tiling",
                candidates, features, tiling
            ))
        })
    }

    /// Preferred depth attachment format.
    pub fn find_depth_format(&self) -> RhiResult<vk::Format> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    /// Record commands with `record`, submit them to the graphics queue and
    /// wait for completion.
    ///
    /// Used for staging uploads; never call it inside a frame.
    pub fn execute_one_shot<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.transient_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };
        let result = self.submit_one_shot(command_buffers[0], record);

        unsafe {
            self.device
                .free_command_buffers(self.transient_pool, &command_buffers);
        }
        result
    }

    fn submit_one_shot<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> RhiResult<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)?;
            record(command_buffer);
            self.device.end_command_buffer(command_buffer)?;

            let buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::default().command_buffers(&buffers);
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())?;
            self.device.queue_wait_idle(self.graphics_queue)?;
        }
        Ok(())
    }

    /// Blocks until all queues are idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator frees its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_command_pool(self.transient_pool, None);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

/// First candidate whose properties report `features` for `tiling`.
pub fn pick_supported_format<P>(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut properties: P,
) -> Option<vk::Format>
where
    P: FnMut(vk::Format) -> vk::FormatProperties,
{
    candidates.iter().copied().find(|&format| {
        let props = properties(format);
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

// SAFETY: ash handles are plain handles; the allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth_only(format: vk::Format) -> vk::FormatProperties {
        let optimal = if format == vk::Format::D24_UNORM_S8_UINT {
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::FormatFeatureFlags::empty()
        };
        vk::FormatProperties {
            optimal_tiling_features: optimal,
            ..Default::default()
        }
    }

    #[test]
    fn test_pick_supported_format_respects_candidate_order() {
        let all = |_| vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };
        let picked = pick_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            all,
        );
        assert_eq!(picked, Some(vk::Format::D32_SFLOAT));
    }

    #[test]
    fn test_pick_supported_format_falls_through() {
        let picked = pick_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            depth_only,
        );
        assert_eq!(picked, Some(vk::Format::D24_UNORM_S8_UINT));
    }

    #[test]
    fn test_pick_supported_format_checks_tiling() {
        let picked = pick_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::LINEAR,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            depth_only,
        );
        assert_eq!(picked, None);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
