//! Window-less presentation surface for GPU integration tests.
//!
//! `VK_EXT_headless_surface` gives a real `VkSurfaceKHR` whose swapchain
//! images are never shown. Its capabilities report no current extent, so the
//! requested extent is used as-is.

use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;
use crate::instance::Instance;
use crate::physical_device::select_physical_device;

/// Instance extensions a headless surface needs.
pub fn required_extensions() -> [*const c_char; 2] {
    [
        ash::khr::surface::NAME.as_ptr(),
        ash::ext::headless_surface::NAME.as_ptr(),
    ]
}

/// Owned headless surface plus the loader that destroys it.
pub struct HeadlessSurface {
    loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
}

impl HeadlessSurface {
    /// `instance` must have been created with [`required_extensions`].
    pub fn new(instance: &Instance) -> RhiResult<Self> {
        let headless = ash::ext::headless_surface::Instance::new(instance.entry(), instance.handle());
        let create_info = vk::HeadlessSurfaceCreateInfoEXT::default();
        let surface = unsafe { headless.create_headless_surface(&create_info, None)? };
        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        debug!("Created headless surface");
        Ok(Self { loader, surface })
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for HeadlessSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
        debug!("Destroyed headless surface");
    }
}

/// Instance, headless surface and device for tests that need a live GPU.
pub struct HeadlessContext {
    // Drop order: device, surface, instance.
    pub device: Arc<Device>,
    pub surface: HeadlessSurface,
    pub instance: Instance,
}

impl HeadlessContext {
    /// Fails when there is no loader, no headless surface support or no
    /// device that can present to it. Tests treat any error as "skip".
    pub fn new() -> RhiResult<Self> {
        let instance = Instance::new(c"ember-headless", false, &required_extensions())?;
        let surface = HeadlessSurface::new(&instance)?;
        let info = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &info)?;
        Ok(Self {
            device,
            surface,
            instance,
        })
    }
}
