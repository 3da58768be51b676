//! Per-frame-slot resource rotation.
//!
//! Every frame slot gets its own region for per-frame data, so the CPU can
//! write slot N+1 while the GPU may still be reading slot N. The slot index
//! used for writing is the same one the orchestrator used for the fence wait,
//! which is why no region is ever written while the GPU reads it.
//!
//! # Overview
//!
//! - [`SlotRegion`] is one slot's memory: a mapped [`Buffer`] on the GPU, or
//!   [`HostRegion`] for logic that runs without a device
//! - [`RotatingSet`] holds one region per slot and the descriptor set bound
//!   to each, built once

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use tracing::debug;

use ember_rhi::RhiError;
use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use ember_rhi::device::Device;

use crate::error::{RenderError, RenderResult};

/// One frame slot's writable memory.
pub trait SlotRegion {
    /// Bytes available to a frame.
    fn capacity(&self) -> u64;

    fn write(&mut self, offset: u64, bytes: &[u8]) -> RenderResult<()>;

    /// Make `len` bytes from `offset` visible to the device.
    fn flush(&self, offset: u64, len: u64) -> RenderResult<()>;

    fn read(&self, offset: u64, len: u64) -> RenderResult<Vec<u8>>;
}

impl SlotRegion for Buffer {
    fn capacity(&self) -> u64 {
        self.size()
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) -> RenderResult<()> {
        Ok(self.write_bytes(offset, bytes)?)
    }

    fn flush(&self, offset: u64, len: u64) -> RenderResult<()> {
        // Rounds up to the atom size and stays inside the allocation.
        Ok(Buffer::flush(self, offset, Some(len))?)
    }

    fn read(&self, offset: u64, len: u64) -> RenderResult<Vec<u8>> {
        Ok(self.read_bytes(offset, len)?)
    }
}

/// Plain host memory standing in for a mapped buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostRegion {
    bytes: Vec<u8>,
}

impl HostRegion {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn check(&self, offset: u64, len: u64) -> RenderResult<()> {
        let capacity = self.bytes.len() as u64;
        if offset.checked_add(len).is_none_or(|end| end > capacity) {
            return Err(RhiError::OutOfBounds {
                offset,
                size: len,
                capacity,
            }
            .into());
        }
        Ok(())
    }
}

impl SlotRegion for HostRegion {
    fn capacity(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) -> RenderResult<()> {
        self.check(offset, bytes.len() as u64)?;
        let start = offset as usize;
        self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn flush(&self, offset: u64, len: u64) -> RenderResult<()> {
        self.check(offset, len)
    }

    fn read(&self, offset: u64, len: u64) -> RenderResult<Vec<u8>> {
        self.check(offset, len)?;
        let start = offset as usize;
        Ok(self.bytes[start..start + len as usize].to_vec())
    }
}

/// One region per frame slot, plus one descriptor set per region.
pub struct RotatingSet<R: SlotRegion> {
    regions: Vec<R>,
    written: Vec<u64>,
    descriptor_sets: Vec<vk::DescriptorSet>,
}

impl<R: SlotRegion> RotatingSet<R> {
    pub fn new(regions: Vec<R>) -> Self {
        let written = vec![0; regions.len()];
        Self {
            regions,
            written,
            descriptor_sets: Vec::new(),
        }
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.regions.len()
    }

    fn check_slot(&self, slot: usize) -> RenderResult<()> {
        if slot >= self.regions.len() {
            return Err(RenderError::SlotOutOfRange {
                slot,
                count: self.regions.len(),
            });
        }
        Ok(())
    }

    /// Copy `data` to the start of `slot`'s region. Other slots are untouched.
    pub fn write_frame(&mut self, slot: usize, data: &[u8]) -> RenderResult<()> {
        self.check_slot(slot)?;
        self.regions[slot].write(0, data)?;
        self.written[slot] = data.len() as u64;
        Ok(())
    }

    pub fn write_frame_pod<T: Pod>(&mut self, slot: usize, value: &T) -> RenderResult<()> {
        self.write_frame(slot, bytemuck::bytes_of(value))
    }

    /// Flush what the last [`write_frame`](Self::write_frame) wrote to `slot`.
    pub fn flush(&self, slot: usize) -> RenderResult<()> {
        self.check_slot(slot)?;
        match self.written[slot] {
            0 => Ok(()),
            len => self.regions[slot].flush(0, len),
        }
    }

    /// Bytes last written to `slot`, read back from its region.
    pub fn read_frame(&self, slot: usize) -> RenderResult<Vec<u8>> {
        self.check_slot(slot)?;
        self.regions[slot].read(0, self.written[slot])
    }

    pub fn region(&self, slot: usize) -> Option<&R> {
        self.regions.get(slot)
    }

    pub fn regions(&self) -> &[R] {
        &self.regions
    }

    /// Descriptor set bound to `slot`'s region.
    ///
    /// # Errors
    ///
    /// [`RenderError::SlotOutOfRange`] for an unknown slot or before the sets
    /// were built.
    pub fn descriptor_set(&self, slot: usize) -> RenderResult<vk::DescriptorSet> {
        self.descriptor_sets
            .get(slot)
            .copied()
            .ok_or(RenderError::SlotOutOfRange {
                slot,
                count: self.descriptor_sets.len(),
            })
    }
}

impl RotatingSet<Buffer> {
    /// One persistently mapped uniform buffer of `size` bytes per slot.
    pub fn uniform(device: &Arc<Device>, size: u64, slots: usize) -> RenderResult<Self> {
        let regions = (0..slots)
            .map(|_| {
                Buffer::new(
                    Arc::clone(device),
                    BufferUsage::Uniform,
                    size,
                    1,
                    device.min_uniform_buffer_offset_alignment(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Rotating uniform set: {} slot(s) of {} bytes", slots, size);
        Ok(Self::new(regions))
    }

    /// Allocate and write one set per slot, each pointing at that slot's
    /// buffer through `binding`. Runs once; the buffers never change, only
    /// their contents.
    pub fn build_descriptor_sets(
        &mut self,
        layout: &DescriptorSetLayout,
        pool: &mut DescriptorPool,
        binding: u32,
    ) -> RenderResult<()> {
        if !self.descriptor_sets.is_empty() {
            return Err(RhiError::Descriptor(
                "rotating descriptor sets are already built".to_string(),
            )
            .into());
        }

        let sets = self
            .regions
            .iter()
            .map(|buffer| {
                DescriptorWriter::new(layout)
                    .write_buffer(binding, buffer.descriptor_info(0, buffer.instance_size()))
                    .build(pool)
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.descriptor_sets = sets;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_set(slots: usize, capacity: usize) -> RotatingSet<HostRegion> {
        RotatingSet::new((0..slots).map(|_| HostRegion::new(capacity)).collect())
    }

    #[test]
    fn test_write_frame_touches_only_its_slot() {
        let mut set = host_set(2, 16);
        set.write_frame(0, &[1, 2, 3, 4]).unwrap();
        set.write_frame(1, &[9, 9]).unwrap();

        assert_eq!(set.read_frame(0).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(set.read_frame(1).unwrap(), vec![9, 9]);
        assert_eq!(&set.region(1).unwrap().bytes()[2..], &[0u8; 14]);

        set.write_frame(0, &[7, 7, 7, 7]).unwrap();
        assert_eq!(set.read_frame(1).unwrap(), vec![9, 9]);
    }

    #[test]
    fn test_write_frame_rejects_unknown_slot() {
        let mut set = host_set(2, 8);
        assert!(matches!(
            set.write_frame(2, &[0]),
            Err(RenderError::SlotOutOfRange { slot: 2, count: 2 })
        ));
    }

    #[test]
    fn test_write_frame_rejects_oversized_data() {
        let mut set = host_set(2, 4);
        assert!(set.write_frame(0, &[0; 5]).is_err());
    }

    #[test]
    fn test_flush_covers_last_write() {
        let mut set = host_set(2, 64);
        set.flush(0).unwrap();
        set.write_frame(1, &[1; 20]).unwrap();
        set.flush(1).unwrap();
        assert!(set.flush(5).is_err());
    }

    #[test]
    fn test_write_pod() {
        let mut set = host_set(2, 16);
        set.write_frame_pod(1, &[1.0f32, 2.0]).unwrap();
        let bytes = set.read_frame(1).unwrap();
        let values: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(values, &[1.0, 2.0]);
    }

    #[test]
    fn test_descriptor_set_before_build() {
        let set = host_set(2, 16);
        assert!(set.descriptor_set(0).is_err());
    }
}
