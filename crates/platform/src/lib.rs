//! Platform layer for the ember renderer.
//!
//! - Window management via winit, with an explicit resize flag
//! - Vulkan surface creation
//! - Keyboard state

mod input;
mod window;

pub use input::{InputState, KeyCode};
pub use window::{Surface, SurfaceTarget, Window, required_extensions};

pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
