//! Synchronization primitives and frame-slot bookkeeping.
//!
//! - [`Semaphore`] orders queue operations on the GPU
//! - [`Fence`] lets the host wait for submitted work
//! - [`FrameSlots`] rotates the in-flight frame slot and remembers which
//!   slot last rendered into each presentable image
//!
//! The number of presentable images and the number of frame slots are
//! independent. An image can still be owned by the presentation engine after
//! the slot that rendered it has moved on, so before a slot renders into an
//! image it must wait for whichever other slot touched that image last.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Vulkan semaphore wrapper.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence. In-flight fences start `signaled` so the first wait
    /// on a fresh slot returns immediately.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Block until the fence is signaled. `u64::MAX` waits forever.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Return the fence to the unsignaled state. It must not be pending.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Reset the fence and hand it to `submit`.
    ///
    /// When `submit` fails the fence is replaced by a signaled one; the reset
    /// fence would never signal again and the next wait on this slot would
    /// block forever.
    pub fn reset_and_submit<F>(&mut self, submit: F) -> RhiResult<()>
    where
        F: FnOnce(vk::Fence) -> Result<(), vk::Result>,
    {
        self.reset()?;
        if let Err(e) = submit(self.fence) {
            warn!("Submission failed ({:?}), re-arming fence {:?}", e, self.fence);
            *self = Fence::new(Arc::clone(&self.device), true)?;
            return Err(RhiError::from(e));
        }
        Ok(())
    }

    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Frame-slot rotation plus the images-in-flight map.
///
/// A slot's fence is identified by the slot index, so the map stores slot
/// indices rather than fence handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSlots {
    frame_count: usize,
    current: usize,
    images_in_flight: Vec<Option<usize>>,
}

impl FrameSlots {
    /// `frame_count` slots rendering into `image_count` presentable images.
    pub fn new(frame_count: usize, image_count: usize) -> Self {
        debug!(
            "Frame slots: {} in flight over {} image(s)",
            frame_count, image_count
        );
        Self {
            frame_count: frame_count.max(1),
            current: 0,
            images_in_flight: vec![None; image_count],
        }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    /// Record that the current slot is about to render into `image_index`.
    ///
    /// Returns the other slot whose fence must be waited on first, if that
    /// image was last rendered by a different slot. Out-of-range indices are
    /// ignored and return `None`.
    pub fn claim_image(&mut self, image_index: usize) -> Option<usize> {
        let entry = self.images_in_flight.get_mut(image_index)?;
        let previous = entry.replace(self.current);
        trace!(
            "Image {} claimed by slot {} (previous {:?})",
            image_index, self.current, previous
        );
        previous.filter(|&slot| slot != self.current)
    }

    /// Move to the next slot, wrapping at `frame_count`. Returns the new slot.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.frame_count;
        self.current
    }

    /// Slot that last rendered into `image_index`.
    pub fn image_owner(&self, image_index: usize) -> Option<usize> {
        self.images_in_flight.get(image_index).copied().flatten()
    }

    pub fn images_in_flight(&self) -> &[Option<usize>] {
        &self.images_in_flight
    }

    /// Number of distinct slots currently recorded in the images-in-flight map.
    pub fn distinct_owners(&self) -> usize {
        let mut owners: Vec<usize> = self.images_in_flight.iter().flatten().copied().collect();
        owners.sort_unstable();
        owners.dedup();
        owners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_rotate_with_period_frame_count() {
        let mut slots = FrameSlots::new(MAX_FRAMES_IN_FLIGHT, 3);
        let seq: Vec<usize> = (0..6)
            .map(|_| {
                let s = slots.current();
                slots.advance();
                s
            })
            .collect();
        assert_eq!(seq, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_claim_fresh_image_needs_no_wait() {
        let mut slots = FrameSlots::new(2, 3);
        assert_eq!(slots.claim_image(0), None);
        assert_eq!(slots.image_owner(0), Some(0));
    }

    #[test]
    fn test_claim_image_from_other_slot_requires_wait() {
        let mut slots = FrameSlots::new(2, 3);
        slots.claim_image(2);
        slots.advance();
        // Slot 1 now renders into the image slot 0 used.
        assert_eq!(slots.claim_image(2), Some(0));
        assert_eq!(slots.image_owner(2), Some(1));
    }

    #[test]
    fn test_reclaim_by_same_slot_needs_no_wait() {
        let mut slots = FrameSlots::new(2, 2);
        slots.claim_image(0);
        slots.advance();
        slots.claim_image(1);
        slots.advance();
        // Back on slot 0, whose own fence was already waited on at acquire.
        assert_eq!(slots.claim_image(0), None);
    }

    #[test]
    fn test_two_images_two_slots_cycle_two_owners() {
        let mut slots = FrameSlots::new(2, 2);
        for frame in 0..5 {
            let image = frame % 2;
            slots.claim_image(image);
            slots.advance();
        }
        assert_eq!(slots.distinct_owners(), 2);
        assert_eq!(slots.images_in_flight(), &[Some(0), Some(1)]);
    }

    #[test]
    fn test_out_of_range_image_is_ignored() {
        let mut slots = FrameSlots::new(2, 2);
        assert_eq!(slots.claim_image(7), None);
        assert_eq!(slots.distinct_owners(), 0);
    }

    #[test]
    fn test_zero_frame_count_clamped() {
        let mut slots = FrameSlots::new(0, 2);
        assert_eq!(slots.frame_count(), 1);
        assert_eq!(slots.advance(), 0);
    }
}
