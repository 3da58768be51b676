//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a thin, safe layer over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, physical device and logical device creation
//! - The presentable surface chain and its frame-slot synchronization
//! - Command buffer recording
//! - Buffer and attachment image management
//! - Descriptor layouts, pools and writes
//! - Pipeline creation
//!
//! [`headless`] provides a window-less surface for GPU integration tests.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod headless;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod surface_chain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
