//! Surface chain tests against a live device.
//!
//! Each test skips when no Vulkan loader or headless-surface capable GPU is
//! present.

use std::sync::Arc;

use ash::vk;
use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use ember_rhi::headless::HeadlessContext;
use ember_rhi::surface_chain::{SurfaceChain, SurfaceChainConfig};
use ember_rhi::sync::{Fence, MAX_FRAMES_IN_FLIGHT};
use ember_rhi::RhiError;

fn context() -> Option<HeadlessContext> {
    match HeadlessContext::new() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("Skipping test: no headless Vulkan device ({e})");
            None
        }
    }
}

fn build_chain(ctx: &HeadlessContext, width: u32, height: u32, previous: Option<&SurfaceChain>) -> SurfaceChain {
    SurfaceChain::new(
        Arc::clone(&ctx.device),
        ctx.surface.handle(),
        ctx.surface.loader(),
        vk::Extent2D { width, height },
        SurfaceChainConfig::default(),
        previous,
    )
    .unwrap()
}

#[test]
fn test_image_depth_and_framebuffer_counts_match() {
    let Some(ctx) = context() else { return };

    for (w, h) in [(800, 600), (1, 1), (1920, 1080), (333, 777)] {
        let chain = build_chain(&ctx, w, h, None);
        assert!(chain.image_count() > 0);
        assert_eq!(chain.image_count(), chain.depth_image_count());
        assert_eq!(chain.image_count(), chain.framebuffer_count());
        assert_eq!(
            chain.frame_count(),
            MAX_FRAMES_IN_FLIGHT.min(chain.image_count())
        );
        assert_eq!(chain.current_frame(), 0);
    }
}

#[test]
fn test_rebuild_keeps_formats() {
    let Some(ctx) = context() else { return };

    let first = build_chain(&ctx, 800, 600, None);
    ctx.device.wait_idle().unwrap();
    let second = build_chain(&ctx, 1024, 768, Some(&first));

    assert!(first.compare_formats(&second));
    first.ensure_same_formats(&second).unwrap();
    drop(first);

    assert_eq!(second.width(), 1024);
    assert_eq!(second.height(), 768);
    assert!(second.framebuffer(second.framebuffer_count()).is_none());
}

#[test]
fn test_pool_rejects_layout_it_was_not_sized_for() {
    let Some(ctx) = context() else { return };
    let device = Arc::clone(&ctx.device);

    let storage_layout = DescriptorSetLayout::builder(Arc::clone(&device))
        .add_binding(
            0,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::ShaderStageFlags::COMPUTE,
            1,
        )
        .build()
        .unwrap();
    let uniform_layout = DescriptorSetLayout::builder(Arc::clone(&device))
        .add_binding(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::ALL_GRAPHICS,
            1,
        )
        .build()
        .unwrap();

    let mut pool = DescriptorPool::builder(Arc::clone(&device))
        .max_sets(2)
        .pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
        .build()
        .unwrap();

    assert!(matches!(
        pool.allocate(&storage_layout),
        Err(RhiError::Descriptor(_))
    ));

    let ubo = Buffer::new(
        Arc::clone(&device),
        BufferUsage::Uniform,
        64,
        1,
        device.min_uniform_buffer_offset_alignment(),
    )
    .unwrap();
    let set = DescriptorWriter::new(&uniform_layout)
        .write_buffer(0, ubo.descriptor_info_for_index(0))
        .build(&mut pool)
        .unwrap();
    assert_ne!(set, vk::DescriptorSet::null());

    // Individual free was not requested.
    assert!(pool.free(&uniform_layout, &[set]).is_err());
    pool.reset().unwrap();
    assert_eq!(pool.budget().sets_in_use(), 0);
}

#[test]
fn test_failed_submit_leaves_fence_signaled() {
    let Some(ctx) = context() else { return };
    let mut fence = Fence::new(Arc::clone(&ctx.device), true).unwrap();

    let err = fence
        .reset_and_submit(|_| Err(vk::Result::ERROR_DEVICE_LOST))
        .unwrap_err();
    assert!(matches!(err, RhiError::Vulkan(e) if e == vk::Result::ERROR_DEVICE_LOST));
    assert!(fence.is_signaled());
    fence.wait(u64::MAX).unwrap();

    let device = Arc::clone(&ctx.device);
    fence
        .reset_and_submit(|f| unsafe {
            device
                .handle()
                .queue_submit(device.graphics_queue(), &[], f)
        })
        .unwrap();
    fence.wait(u64::MAX).unwrap();
    assert!(fence.is_signaled());
}
