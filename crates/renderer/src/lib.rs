//! Frame loop on top of the RHI.
//!
//! This crate orchestrates the rendering process:
//! - Frame phases and the orchestrator that drives the surface chain
//! - Per-frame-slot rotation of uniform data and its descriptor sets
//! - The compute-to-graphics particle hand-off and its hazard checker
//! - The global uniform block

mod error;

pub mod frame;
pub mod hazard;
pub mod orchestrator;
pub mod particles;
pub mod renderer;
pub mod rotating;
pub mod ubo;

pub use error::{RenderError, RenderResult};
pub use frame::{FramePhase, FrameState};
pub use orchestrator::{FrameContext, FrameOrchestrator, OrchestratorConfig};
pub use renderer::{FrameInputs, Renderer};
pub use ubo::{GlobalUbo, GpuPointLight, MAX_LIGHTS};

pub use ember_rhi::sync::MAX_FRAMES_IN_FLIGHT;
