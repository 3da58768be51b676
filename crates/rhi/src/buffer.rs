//! GPU buffer management.
//!
//! A [`Buffer`] holds `instance_count` elements, each padded to the
//! requested offset alignment so that every element can be bound or flushed
//! on its own. Host-visible buffers stay mapped for their whole lifetime.
//! Device-local buffers are filled through a staging copy.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! let align = device.min_uniform_buffer_offset_alignment();
//! let ubo = Buffer::new(device, BufferUsage::Uniform, 256, 1, align)?;
//! ubo.write_bytes(0, &[0u8; 256])?;
//! ubo.flush(0, None)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Intended use of a buffer. Decides usage flags and memory location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Per-vertex or per-instance data uploaded once.
    Vertex,
    /// Per-frame uniform data written from the CPU.
    Uniform,
    /// Storage buffer written by compute and read as instanced vertex input.
    Particle,
    /// Host-visible source of an upload.
    Staging,
    /// Host-visible destination of a download.
    Readback,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            // TRANSFER_SRC so a slot can be read back through the device.
            BufferUsage::Uniform => {
                vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC
            }
            BufferUsage::Particle => {
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::Readback => vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex | BufferUsage::Particle => MemoryLocation::GpuOnly,
            BufferUsage::Uniform | BufferUsage::Staging => MemoryLocation::CpuToGpu,
            BufferUsage::Readback => MemoryLocation::GpuToCpu,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Particle => "particle",
            BufferUsage::Staging => "staging",
            BufferUsage::Readback => "readback",
        }
    }

    fn is_host_visible(self) -> bool {
        self.memory_location() != MemoryLocation::GpuOnly
    }
}

/// Round `value` up to a multiple of `alignment` (a power of two, or zero for none).
#[inline]
pub fn align_up(value: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment == 0 {
        value
    } else {
        (value + alignment - 1) & !(alignment - 1)
    }
}

/// A byte range handed to `vkFlushMappedMemoryRanges` or `vkInvalidateMappedMemoryRanges`,
/// relative to the start of the allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappedRange {
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

/// Expand a requested flush range to the non-coherent atom granularity.
///
/// `size == None` or `Some(vk::WHOLE_SIZE)` means "to the end". A request
/// running past the end is cut at the end. Otherwise the offset is rounded
/// down and the size rounded up to `atom`, and the result is clamped so it
/// never leaves the allocation.
pub fn flush_range(
    offset: vk::DeviceSize,
    size: Option<vk::DeviceSize>,
    allocation_size: vk::DeviceSize,
    atom: vk::DeviceSize,
) -> RhiResult<MappedRange> {
    if offset >= allocation_size {
        return Err(RhiError::OutOfBounds {
            offset,
            size: size.unwrap_or(0),
            capacity: allocation_size,
        });
    }

    let atom = atom.max(1);
    let start = offset - offset % atom;
    let end = match size {
        None => allocation_size,
        Some(size) => match offset.checked_add(size) {
            // Past the end, including `vk::WHOLE_SIZE`.
            None => allocation_size,
            Some(end) if end >= allocation_size => allocation_size,
            Some(end) => align_up(end, atom).min(allocation_size),
        },
    };

    Ok(MappedRange {
        offset: start,
        size: end - start,
    })
}

/// GPU buffer with gpu-allocator managed memory.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    usage: BufferUsage,
    instance_size: vk::DeviceSize,
    instance_count: u32,
    alignment_size: vk::DeviceSize,
    size: vk::DeviceSize,
    coherent: bool,
}

impl Buffer {
    /// Creates a buffer for `instance_count` elements of `instance_size` bytes,
    /// each starting on a `min_offset_alignment` boundary.
    ///
    /// # Errors
    ///
    /// Fails on a zero size or when buffer or memory allocation fails.
    pub fn new(
        device: Arc<Device>,
        usage: BufferUsage,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        min_offset_alignment: vk::DeviceSize,
    ) -> RhiResult<Self> {
        if instance_size == 0 || instance_count == 0 {
            return Err(RhiError::Configuration(format!(
                "{} buffer must not be empty ({} x {} bytes)",
                usage.name(),
                instance_count,
                instance_size
            )));
        }

        let alignment_size = align_up(instance_size, min_offset_alignment);
        let size = alignment_size * vk::DeviceSize::from(instance_count);

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let mut requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };
        if usage.is_host_visible() {
            // Keep atom-rounded flush ranges inside this allocation.
            let atom = device.non_coherent_atom_size();
            requirements.alignment = requirements.alignment.max(atom);
            requirements.size = align_up(requirements.size, atom);
        }

        let allocation = device.lock_allocator().and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: usage.name(),
                    requirements,
                    location: usage.memory_location(),
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let coherent = allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT);

        let this = Self {
            device,
            buffer,
            allocation: Some(allocation),
            usage,
            instance_size,
            instance_count,
            alignment_size,
            size,
            coherent,
        };

        if let Some(allocation) = &this.allocation {
            unsafe {
                this.device.handle().bind_buffer_memory(
                    this.buffer,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }
        if usage.is_host_visible() && this.mapped_ptr().is_none() {
            return Err(RhiError::Configuration(format!(
                "{} buffer memory is not host mapped",
                usage.name()
            )));
        }

        debug!(
            "Created {} buffer: {} x {} bytes (stride {}, coherent {})",
            usage.name(),
            instance_count,
            instance_size,
            alignment_size,
            this.coherent
        );

        Ok(this)
    }

    /// Creates a device-local buffer holding `data`, uploaded through a staging buffer.
    pub fn new_device_local(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let size = data.len() as vk::DeviceSize;
        let staging = Self::new(Arc::clone(&device), BufferUsage::Staging, size, 1, 1)?;
        staging.write_bytes(0, data)?;
        staging.flush(0, None)?;

        let buffer = Self::new(Arc::clone(&device), usage, size, 1, 1)?;
        device.execute_one_shot(|cmd| {
            let region = vk::BufferCopy::default().size(size);
            unsafe {
                device
                    .handle()
                    .cmd_copy_buffer(cmd, staging.handle(), buffer.handle(), &[region]);
            }
        })?;

        debug!("Uploaded {} bytes into {} buffer", size, usage.name());
        Ok(buffer)
    }

    /// Copy the whole buffer back to the host. Blocks until the copy completes.
    pub fn download(&self) -> RhiResult<Vec<u8>> {
        let readback = Self::new(
            Arc::clone(&self.device),
            BufferUsage::Readback,
            self.size,
            1,
            1,
        )?;
        self.device.execute_one_shot(|cmd| {
            let region = vk::BufferCopy::default().size(self.size);
            unsafe {
                self.device
                    .handle()
                    .cmd_copy_buffer(cmd, self.buffer, readback.handle(), &[region]);
            }
        })?;
        readback.invalidate(0, None)?;
        readback.read_bytes(0, self.size)
    }

    fn mapped_ptr(&self) -> Option<std::ptr::NonNull<std::ffi::c_void>> {
        self.allocation.as_ref().and_then(|a| a.mapped_ptr())
    }

    fn check_range(&self, offset: vk::DeviceSize, len: vk::DeviceSize) -> RhiResult<()> {
        if offset.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(RhiError::OutOfBounds {
                offset,
                size: len,
                capacity: self.size,
            });
        }
        Ok(())
    }

    /// Copy `bytes` into the mapped memory at `offset`.
    pub fn write_bytes(&self, offset: vk::DeviceSize, bytes: &[u8]) -> RhiResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.check_range(offset, bytes.len() as vk::DeviceSize)?;

        let mapped = self.mapped_ptr().ok_or_else(|| {
            RhiError::Configuration(format!("{} buffer is not mapped", self.usage.name()))
        })?;

        // SAFETY: the range was checked against the buffer size and the mapping
        // covers the whole allocation.
        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        }
        Ok(())
    }

    /// Write one element at `index`, starting at its aligned offset.
    pub fn write_to_index(&self, index: u32, bytes: &[u8]) -> RhiResult<()> {
        if bytes.len() as vk::DeviceSize > self.instance_size {
            return Err(RhiError::OutOfBounds {
                offset: self.index_offset(index),
                size: bytes.len() as vk::DeviceSize,
                capacity: self.instance_size,
            });
        }
        self.write_bytes(self.index_offset(index), bytes)
    }

    /// Copy `len` bytes out of the mapped memory at `offset`.
    pub fn read_bytes(&self, offset: vk::DeviceSize, len: vk::DeviceSize) -> RhiResult<Vec<u8>> {
        self.check_range(offset, len)?;
        let mapped = self.mapped_ptr().ok_or_else(|| {
            RhiError::Configuration(format!("{} buffer is not mapped", self.usage.name()))
        })?;

        let mut out = vec![0u8; len as usize];
        // SAFETY: range checked above.
        unsafe {
            let src = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len());
        }
        Ok(out)
    }

    fn mapped_memory_range(
        &self,
        offset: vk::DeviceSize,
        size: Option<vk::DeviceSize>,
    ) -> RhiResult<Option<vk::MappedMemoryRange<'static>>> {
        let Some(allocation) = self.allocation.as_ref() else {
            return Ok(None);
        };
        let range = flush_range(
            offset,
            size,
            allocation.size(),
            self.device.non_coherent_atom_size(),
        )?;
        // SAFETY: the memory handle stays valid while the allocation lives.
        let memory = unsafe { allocation.memory() };
        Ok(Some(
            vk::MappedMemoryRange::default()
                .memory(memory)
                .offset(allocation.offset() + range.offset)
                .size(range.size),
        ))
    }

    /// Make host writes in the range visible to the device. No-op on coherent memory.
    pub fn flush(&self, offset: vk::DeviceSize, size: Option<vk::DeviceSize>) -> RhiResult<()> {
        if self.coherent {
            return Ok(());
        }
        if let Some(range) = self.mapped_memory_range(offset, size)? {
            unsafe { self.device.handle().flush_mapped_memory_ranges(&[range])? };
        }
        Ok(())
    }

    pub fn flush_index(&self, index: u32) -> RhiResult<()> {
        self.flush(self.index_offset(index), Some(self.alignment_size))
    }

    /// Make device writes in the range visible to the host. No-op on coherent memory.
    pub fn invalidate(&self, offset: vk::DeviceSize, size: Option<vk::DeviceSize>) -> RhiResult<()> {
        if self.coherent {
            return Ok(());
        }
        if let Some(range) = self.mapped_memory_range(offset, size)? {
            unsafe {
                self.device
                    .handle()
                    .invalidate_mapped_memory_ranges(&[range])?
            };
        }
        Ok(())
    }

    /// Descriptor info covering `range` bytes at `offset`.
    pub fn descriptor_info(
        &self,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(offset)
            .range(range)
    }

    pub fn descriptor_info_for_index(&self, index: u32) -> vk::DescriptorBufferInfo {
        self.descriptor_info(self.index_offset(index), self.alignment_size)
    }

    #[inline]
    pub fn index_offset(&self, index: u32) -> vk::DeviceSize {
        vk::DeviceSize::from(index) * self.alignment_size
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Total size in bytes, padding included.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Stride between elements.
    #[inline]
    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    pub fn is_coherent(&self) -> bool {
        self.coherent
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = match self.device.allocator().lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(e) = allocator.free(allocation) {
                error!("Failed to free buffer allocation: {:?}", e);
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(100, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 64), 320);
        assert_eq!(align_up(13, 1), 13);
        assert_eq!(align_up(13, 0), 13);
    }

    #[test]
    fn test_flush_range_whole_size() {
        let range = flush_range(0, None, 1024, 64).unwrap();
        assert_eq!(range, MappedRange { offset: 0, size: 1024 });

        let range = flush_range(256, None, 1024, 64).unwrap();
        assert_eq!(range, MappedRange { offset: 256, size: 768 });
    }

    #[test]
    fn test_flush_range_vulkan_whole_size() {
        let range = flush_range(64, Some(vk::WHOLE_SIZE), 1024, 64).unwrap();
        assert_eq!(range, MappedRange { offset: 64, size: 960 });

        let range = flush_range(70, Some(u64::MAX - 10), 1024, 64).unwrap();
        assert_eq!(range, MappedRange { offset: 64, size: 960 });
    }

    #[test]
    fn test_flush_range_past_end_is_cut() {
        let range = flush_range(512, Some(4096), 1024, 64).unwrap();
        assert_eq!(range, MappedRange { offset: 512, size: 512 });
    }

    #[test]
    fn test_flush_range_rounds_up_to_atom() {
        let range = flush_range(0, Some(100), 1024, 64).unwrap();
        assert_eq!(range, MappedRange { offset: 0, size: 128 });
    }

    #[test]
    fn test_flush_range_rounding_clamped_to_allocation() {
        // 1000 is not an atom multiple; rounding 900 + 90 up would pass the end.
        let range = flush_range(896, Some(90), 1000, 64).unwrap();
        assert_eq!(range.offset, 896);
        assert_eq!(range.offset + range.size, 1000);
    }

    #[test]
    fn test_flush_range_unaligned_offset_rounds_down() {
        let range = flush_range(70, Some(10), 1024, 64).unwrap();
        assert_eq!(range, MappedRange { offset: 64, size: 64 });
    }

    #[test]
    fn test_flush_range_exact_atoms_untouched() {
        let range = flush_range(128, Some(256), 1024, 64).unwrap();
        assert_eq!(range, MappedRange { offset: 128, size: 256 });
    }

    #[test]
    fn test_flush_range_offset_out_of_bounds() {
        let err = flush_range(1024, Some(1), 1024, 64).unwrap_err();
        assert!(matches!(err, RhiError::OutOfBounds { .. }));
    }

    #[test]
    fn test_buffer_usage_flags() {
        let particle = BufferUsage::Particle.to_vk_usage();
        assert!(particle.contains(vk::BufferUsageFlags::STORAGE_BUFFER));
        assert!(particle.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert!(
            BufferUsage::Staging
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_SRC)
        );
    }

    #[test]
    fn test_buffer_usage_memory_location() {
        assert_eq!(BufferUsage::Uniform.memory_location(), MemoryLocation::CpuToGpu);
        assert_eq!(BufferUsage::Particle.memory_location(), MemoryLocation::GpuOnly);
        assert_eq!(BufferUsage::Readback.memory_location(), MemoryLocation::GpuToCpu);
        assert!(!BufferUsage::Vertex.is_host_visible());
        assert!(BufferUsage::Staging.is_host_visible());
    }
}
