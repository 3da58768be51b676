//! RHI error types.

use ash::vk;
use thiserror::Error;

/// Errors raised by the Vulkan layer.
///
/// Presentation staleness is not an error here; see
/// [`AcquireOutcome`](crate::surface_chain::AcquireOutcome) and
/// [`PresentOutcome`](crate::surface_chain::PresentOutcome).
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Failed to load the Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    Allocator(#[from] gpu_allocator::AllocationError),

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader module loading error
    #[error("Shader error: {0}")]
    Shader(String),

    #[error("Surface error: {0}")]
    Surface(String),

    /// The device or surface cannot satisfy the requested configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A rebuilt surface chain came back with different formats
    #[error(
        "Surface format changed across rebuild: color {old_color:?} -> {new_color:?}, depth {old_depth:?} -> {new_depth:?}"
    )]
    FormatChanged {
        old_color: vk::Format,
        new_color: vk::Format,
        old_depth: vk::Format,
        new_depth: vk::Format,
    },

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Descriptor error: {0}")]
    Descriptor(String),

    /// A mapped write or read fell outside the buffer
    #[error("Out of bounds: offset {offset} + size {size} exceeds {capacity} bytes")]
    OutOfBounds {
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        capacity: vk::DeviceSize,
    },
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
