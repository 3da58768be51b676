//! Renderer error types.

use ember_rhi::RhiError;
use thiserror::Error;

use crate::frame::FramePhase;

/// Errors raised by the frame loop and the resources it drives.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Core(#[from] ember_core::Error),

    /// A frame operation was called from the wrong phase
    #[error("{op} is not valid while {state}")]
    InvalidTransition { op: &'static str, state: FramePhase },

    /// A command buffer from another frame slot was handed back
    #[error("command buffer does not belong to frame slot {slot}")]
    CommandBufferMismatch { slot: usize },

    #[error("frame slot {slot} out of range for {count} slot(s)")]
    SlotOutOfRange { slot: usize, count: usize },

    /// The simulated hazard checker saw a read with no barrier after a write
    #[error("hazard: {0}")]
    Hazard(String),
}

/// Result type alias for renderer operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
