//! Frame phase bookkeeping.
//!
//! A frame moves `Idle -> FrameStarted -> RenderPassActive -> FrameStarted
//! -> Idle`. Compute work is recorded while `FrameStarted`, before the render
//! pass opens. [`FrameState`] holds the phase and the frame-slot index with
//! no GPU objects attached, so the transitions can be tested on their own.

use std::fmt;

use tracing::trace;

use crate::error::{RenderError, RenderResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FramePhase {
    #[default]
    Idle,
    FrameStarted,
    RenderPassActive,
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FramePhase::Idle => "idle",
            FramePhase::FrameStarted => "frame started",
            FramePhase::RenderPassActive => "render pass active",
        };
        f.write_str(name)
    }
}

/// Phase plus the frame slot currently being recorded.
///
/// The slot index advances in `end_frame` and wraps at `frame_count`, in
/// lockstep with the surface chain's own slot rotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameState {
    phase: FramePhase,
    frame_index: usize,
    frame_count: usize,
}

impl FrameState {
    pub fn new(frame_count: usize) -> Self {
        Self {
            phase: FramePhase::Idle,
            frame_index: 0,
            frame_count: frame_count.max(1),
        }
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    #[inline]
    pub fn is_frame_in_progress(&self) -> bool {
        self.phase != FramePhase::Idle
    }

    fn require(&self, op: &'static str, phase: FramePhase) -> RenderResult<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(RenderError::InvalidTransition {
                op,
                state: self.phase,
            })
        }
    }

    fn set(&mut self, phase: FramePhase) {
        trace!("Frame {}: {} -> {}", self.frame_index, self.phase, phase);
        self.phase = phase;
    }

    /// Checks that a frame may begin without changing anything.
    ///
    /// The orchestrator calls this before acquiring, because an out-of-date
    /// acquire leaves the state in `Idle`.
    pub fn check_begin_frame(&self) -> RenderResult<()> {
        self.require("begin_frame", FramePhase::Idle)
    }

    pub fn begin_frame(&mut self) -> RenderResult<()> {
        self.check_begin_frame()?;
        self.set(FramePhase::FrameStarted);
        Ok(())
    }

    pub fn begin_render_pass(&mut self) -> RenderResult<()> {
        self.require("begin_render_pass", FramePhase::FrameStarted)?;
        self.set(FramePhase::RenderPassActive);
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> RenderResult<()> {
        self.require("end_render_pass", FramePhase::RenderPassActive)?;
        self.set(FramePhase::FrameStarted);
        Ok(())
    }

    pub fn check_end_frame(&self) -> RenderResult<()> {
        self.require("end_frame", FramePhase::FrameStarted)
    }

    /// Returns to `Idle` and moves to the next slot. Returns the new slot.
    pub fn end_frame(&mut self) -> RenderResult<usize> {
        self.check_end_frame()?;
        self.set(FramePhase::Idle);
        self.frame_index = (self.frame_index + 1) % self.frame_count;
        Ok(self.frame_index)
    }

    /// Start over at slot 0 after the surface chain was rebuilt.
    ///
    /// A new chain starts its own rotation at slot 0, so the two must agree.
    pub fn restart(&mut self, frame_count: usize) {
        self.phase = FramePhase::Idle;
        self.frame_index = 0;
        self.frame_count = frame_count.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut state = FrameState::new(2);
        assert_eq!(state.phase(), FramePhase::Idle);

        state.begin_frame().unwrap();
        assert_eq!(state.phase(), FramePhase::FrameStarted);
        state.begin_render_pass().unwrap();
        assert_eq!(state.phase(), FramePhase::RenderPassActive);
        state.end_render_pass().unwrap();
        assert_eq!(state.phase(), FramePhase::FrameStarted);
        assert_eq!(state.end_frame().unwrap(), 1);
        assert_eq!(state.phase(), FramePhase::Idle);
    }

    #[test]
    fn test_slot_sequence_is_periodic() {
        let mut state = FrameState::new(2);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(state.frame_index());
            state.begin_frame().unwrap();
            state.end_frame().unwrap();
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_render_pass_requires_started_frame() {
        let mut state = FrameState::new(2);
        let err = state.begin_render_pass().unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidTransition {
                op: "begin_render_pass",
                state: FramePhase::Idle
            }
        ));
        assert_eq!(state.phase(), FramePhase::Idle);
    }

    #[test]
    fn test_cannot_end_frame_inside_render_pass() {
        let mut state = FrameState::new(2);
        state.begin_frame().unwrap();
        state.begin_render_pass().unwrap();
        assert!(state.end_frame().is_err());
        assert!(state.begin_frame().is_err());
        assert_eq!(state.frame_index(), 0);
    }

    #[test]
    fn test_compute_only_frame() {
        // No render pass at all is still a valid frame.
        let mut state = FrameState::new(2);
        state.begin_frame().unwrap();
        assert_eq!(state.end_frame().unwrap(), 1);
    }

    #[test]
    fn test_restart_resets_slot() {
        let mut state = FrameState::new(2);
        state.begin_frame().unwrap();
        state.end_frame().unwrap();
        assert_eq!(state.frame_index(), 1);

        state.restart(1);
        assert_eq!(state.frame_index(), 0);
        assert_eq!(state.frame_count(), 1);
        state.begin_frame().unwrap();
        assert_eq!(state.end_frame().unwrap(), 0);
    }

    #[test]
    fn test_zero_frame_count_is_clamped() {
        let state = FrameState::new(0);
        assert_eq!(state.frame_count(), 1);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(FramePhase::RenderPassActive.to_string(), "render pass active");
    }
}
