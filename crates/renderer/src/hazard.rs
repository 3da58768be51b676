//! Host-side hazard checker for a buffer shared by compute and vertex input.
//!
//! Mirrors what the command buffers record: compute writes to a buffer,
//! global memory barriers, and vertex-input reads. Two orderings are checked:
//!
//! - a vertex read of a buffer whose last compute write has not been covered
//!   by a compute-to-vertex barrier (read after write), and
//! - a compute write to a buffer whose last vertex read has not been covered
//!   by a vertex-to-compute barrier (write after read).
//!
//! Pending reads and writes survive [`begin_frame`](HazardTracker::begin_frame):
//! the previous frame's draw may still be executing when the next frame's
//! dispatch starts, so the second check spans submissions.
//!
//! Tracking is on in debug builds and off in release builds.

use std::collections::HashMap;
use std::fmt;

use ash::vk;
use tracing::{error, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HazardKind {
    /// Vertex input saw a compute write without a barrier.
    ReadAfterWrite,
    /// A compute write raced an earlier vertex-input read.
    WriteAfterRead,
}

/// An access to a shared buffer that nothing orders after a conflicting one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hazard {
    pub kind: HazardKind,
    pub buffer: vk::Buffer,
    /// Sequence number of the write.
    pub write: u64,
    /// Sequence number of the read.
    pub read: u64,
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            HazardKind::ReadAfterWrite => write!(
                f,
                "vertex read #{} of {:?} sees compute write #{} without a barrier",
                self.read, self.buffer, self.write
            ),
            HazardKind::WriteAfterRead => write!(
                f,
                "compute write #{} of {:?} races vertex read #{} without a barrier",
                self.write, self.buffer, self.read
            ),
        }
    }
}

/// Whether a barrier orders compute shader writes before vertex attribute reads.
pub fn orders_compute_to_vertex(
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
    barrier: &vk::MemoryBarrier,
) -> bool {
    let src_stage_ok = src_stage
        .intersects(vk::PipelineStageFlags::COMPUTE_SHADER | vk::PipelineStageFlags::ALL_COMMANDS);
    let dst_stage_ok = dst_stage.intersects(
        vk::PipelineStageFlags::VERTEX_INPUT
            | vk::PipelineStageFlags::ALL_GRAPHICS
            | vk::PipelineStageFlags::ALL_COMMANDS,
    );
    let src_access_ok = barrier
        .src_access_mask
        .intersects(vk::AccessFlags::SHADER_WRITE | vk::AccessFlags::MEMORY_WRITE);
    let dst_access_ok = barrier
        .dst_access_mask
        .intersects(vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::MEMORY_READ);

    src_stage_ok && dst_stage_ok && src_access_ok && dst_access_ok
}

/// Whether a barrier orders vertex attribute reads before compute shader
/// writes. A write after a read only needs the execution dependency, so the
/// access masks are not consulted.
pub fn orders_vertex_to_compute(
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
) -> bool {
    let src_stage_ok = src_stage.intersects(
        vk::PipelineStageFlags::VERTEX_INPUT
            | vk::PipelineStageFlags::ALL_GRAPHICS
            | vk::PipelineStageFlags::ALL_COMMANDS,
    );
    let dst_stage_ok = dst_stage
        .intersects(vk::PipelineStageFlags::COMPUTE_SHADER | vk::PipelineStageFlags::ALL_COMMANDS);

    src_stage_ok && dst_stage_ok
}

#[derive(Debug, Default)]
pub struct HazardTracker {
    enabled: bool,
    sequence: u64,
    /// Buffer -> sequence number of its unbarriered compute write.
    pending_writes: HashMap<vk::Buffer, u64>,
    /// Buffer -> sequence number of its unbarriered vertex read.
    pending_reads: HashMap<vk::Buffer, u64>,
    hazards: Vec<Hazard>,
}

impl HazardTracker {
    /// Enabled in debug builds.
    pub fn new() -> Self {
        Self::with_enabled(cfg!(debug_assertions))
    }

    pub fn with_enabled(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn next(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn report(&mut self, hazard: Hazard) -> Option<Hazard> {
        error!("Hazard: {}", hazard);
        self.hazards.push(hazard);
        Some(hazard)
    }

    /// Returns the hazard this write creates, if any.
    pub fn record_compute_write(&mut self, buffer: vk::Buffer) -> Option<Hazard> {
        if !self.enabled {
            return None;
        }
        let write = self.next();
        trace!("#{} compute write {:?}", write, buffer);
        self.pending_writes.insert(buffer, write);

        let read = self.pending_reads.remove(&buffer)?;
        self.report(Hazard {
            kind: HazardKind::WriteAfterRead,
            buffer,
            write,
            read,
        })
    }

    /// A global memory barrier. Covers every pending access it orders.
    pub fn record_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::MemoryBarrier,
    ) {
        if !self.enabled {
            return;
        }
        let seq = self.next();
        if orders_compute_to_vertex(src_stage, dst_stage, barrier) {
            trace!("#{} barrier covers {} write(s)", seq, self.pending_writes.len());
            self.pending_writes.clear();
        }
        if orders_vertex_to_compute(src_stage, dst_stage) {
            trace!("#{} barrier covers {} read(s)", seq, self.pending_reads.len());
            self.pending_reads.clear();
        }
    }

    /// Returns the hazard this read creates, if any.
    pub fn record_vertex_read(&mut self, buffer: vk::Buffer) -> Option<Hazard> {
        if !self.enabled {
            return None;
        }
        let read = self.next();
        self.pending_reads.insert(buffer, read);

        let write = self.pending_writes.remove(&buffer)?;
        self.report(Hazard {
            kind: HazardKind::ReadAfterWrite,
            buffer,
            write,
            read,
        })
    }

    /// Hazards reported since the last [`begin_frame`](Self::begin_frame).
    pub fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    /// Start a new frame's recording. Forgets reported hazards but keeps
    /// pending accesses, which the GPU may still be executing.
    pub fn begin_frame(&mut self) {
        self.hazards.clear();
    }

    /// Forget everything recorded.
    pub fn reset(&mut self) {
        self.sequence = 0;
        self.pending_writes.clear();
        self.pending_reads.clear();
        self.hazards.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn particle_barrier() -> vk::MemoryBarrier<'static> {
        vk::MemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::SHADER_WRITE)
            .dst_access_mask(vk::AccessFlags::VERTEX_ATTRIBUTE_READ)
    }

    #[test]
    fn test_read_after_unbarriered_write_is_hazard() {
        let buffer = vk::Buffer::from_raw(7);
        let mut tracker = HazardTracker::with_enabled(true);

        tracker.record_compute_write(buffer);
        let hazard = tracker.record_vertex_read(buffer).unwrap();
        assert_eq!(hazard.kind, HazardKind::ReadAfterWrite);
        assert_eq!(hazard.buffer, buffer);
        assert!(hazard.write < hazard.read);
        assert_eq!(tracker.hazards().len(), 1);
    }

    #[test]
    fn test_barrier_clears_pending_write() {
        let buffer = vk::Buffer::from_raw(7);
        let mut tracker = HazardTracker::with_enabled(true);

        tracker.record_compute_write(buffer);
        tracker.record_barrier(
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::VERTEX_INPUT,
            &particle_barrier(),
        );
        assert!(tracker.record_vertex_read(buffer).is_none());
        assert!(tracker.hazards().is_empty());
    }

    #[test]
    fn test_wrong_barrier_does_not_count() {
        let buffer = vk::Buffer::from_raw(7);
        let mut tracker = HazardTracker::with_enabled(true);

        tracker.record_compute_write(buffer);
        // Right access masks, wrong destination stage.
        tracker.record_barrier(
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &particle_barrier(),
        );
        assert!(tracker.record_vertex_read(buffer).is_some());
    }

    #[test]
    fn test_write_after_barrier_needs_another_barrier() {
        let buffer = vk::Buffer::from_raw(3);
        let mut tracker = HazardTracker::with_enabled(true);

        tracker.record_compute_write(buffer);
        tracker.record_barrier(
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::VERTEX_INPUT,
            &particle_barrier(),
        );
        tracker.record_compute_write(buffer);
        assert!(tracker.record_vertex_read(buffer).is_some());
    }

    #[test]
    fn test_other_buffers_unaffected() {
        let mut tracker = HazardTracker::with_enabled(true);
        tracker.record_compute_write(vk::Buffer::from_raw(1));
        assert!(tracker.record_vertex_read(vk::Buffer::from_raw(2)).is_none());
    }

    #[test]
    fn test_disabled_tracker_reports_nothing() {
        let buffer = vk::Buffer::from_raw(7);
        let mut tracker = HazardTracker::with_enabled(false);
        tracker.record_compute_write(buffer);
        assert!(tracker.record_vertex_read(buffer).is_none());
    }

    #[test]
    fn test_reset() {
        let buffer = vk::Buffer::from_raw(7);
        let mut tracker = HazardTracker::with_enabled(true);
        tracker.record_compute_write(buffer);
        tracker.record_vertex_read(buffer);
        tracker.reset();
        assert!(tracker.hazards().is_empty());
        assert!(tracker.record_vertex_read(buffer).is_none());
    }

    #[test]
    fn test_all_commands_barrier_orders() {
        let barrier = vk::MemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::MEMORY_WRITE)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ);
        assert!(orders_compute_to_vertex(
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
            &barrier
        ));
    }

    #[test]
    fn test_write_after_unbarriered_read_is_hazard() {
        let buffer = vk::Buffer::from_raw(9);
        let mut tracker = HazardTracker::with_enabled(true);

        // Frame N draws from the buffer.
        assert!(tracker.record_vertex_read(buffer).is_none());
        tracker.begin_frame();

        // Frame N+1 dispatches into it with nothing in between.
        let hazard = tracker.record_compute_write(buffer).unwrap();
        assert_eq!(hazard.kind, HazardKind::WriteAfterRead);
        assert!(hazard.read < hazard.write);
        assert_eq!(tracker.hazards(), &[hazard]);
    }

    #[test]
    fn test_vertex_to_compute_barrier_clears_pending_read() {
        let buffer = vk::Buffer::from_raw(9);
        let mut tracker = HazardTracker::with_enabled(true);

        tracker.record_vertex_read(buffer);
        tracker.begin_frame();
        tracker.record_barrier(
            vk::PipelineStageFlags::VERTEX_INPUT,
            vk::PipelineStageFlags::COMPUTE_SHADER,
            &vk::MemoryBarrier::default(),
        );
        assert!(tracker.record_compute_write(buffer).is_none());
        assert!(tracker.hazards().is_empty());
    }

    #[test]
    fn test_compute_to_vertex_barrier_leaves_reads_pending() {
        let buffer = vk::Buffer::from_raw(9);
        let mut tracker = HazardTracker::with_enabled(true);

        tracker.record_vertex_read(buffer);
        tracker.record_barrier(
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::VERTEX_INPUT,
            &particle_barrier(),
        );
        assert!(tracker.record_compute_write(buffer).is_some());
    }

    #[test]
    fn test_begin_frame_keeps_pending_accesses() {
        let buffer = vk::Buffer::from_raw(4);
        let mut tracker = HazardTracker::with_enabled(true);

        tracker.record_compute_write(buffer);
        tracker.begin_frame();
        assert!(tracker.record_vertex_read(buffer).is_some());
    }

    #[test]
    fn test_vertex_to_compute_stages() {
        assert!(orders_vertex_to_compute(
            vk::PipelineStageFlags::VERTEX_INPUT | vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::COMPUTE_SHADER,
        ));
        assert!(!orders_vertex_to_compute(
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::COMPUTE_SHADER,
        ));
        assert!(!orders_vertex_to_compute(
            vk::PipelineStageFlags::VERTEX_INPUT,
            vk::PipelineStageFlags::VERTEX_SHADER,
        ));
    }
}
