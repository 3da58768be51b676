//! Descriptor set layouts, pools and writes.
//!
//! - [`DescriptorSetLayout`] is an immutable binding schema that remembers
//!   its bindings so allocations and writes can be checked against it
//! - [`DescriptorPool`] is a bounded allocator. It tracks what it was sized
//!   for and refuses layouts needing a descriptor type it has no room for.
//!   Individual sets can only be freed when the pool was built with
//!   [`DescriptorPoolBuilder::free_individual_sets`]
//! - [`DescriptorWriter`] collects buffer bindings and writes them into a set
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use ember_rhi::device::Device;
//! use ember_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
//!
//! # fn example(device: Arc<Device>, info: vk::DescriptorBufferInfo) -> Result<(), ember_rhi::RhiError> {
//! let layout = DescriptorSetLayout::builder(device.clone())
//!     .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::ALL_GRAPHICS, 1)
//!     .build()?;
//! let mut pool = DescriptorPool::builder(device)
//!     .max_sets(2)
//!     .pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
//!     .build()?;
//! let set = DescriptorWriter::new(&layout).write_buffer(0, info).build(&mut pool)?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// One entry of a layout's binding schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
    pub count: u32,
}

impl LayoutBinding {
    fn to_vk(self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type)
            .descriptor_count(self.count)
            .stage_flags(self.stages)
    }
}

/// Descriptors of each type one set of this schema consumes.
pub fn descriptor_requirements(bindings: &[LayoutBinding]) -> BTreeMap<vk::DescriptorType, u32> {
    let mut needs = BTreeMap::new();
    for b in bindings {
        *needs.entry(b.descriptor_type).or_insert(0) += b.count;
    }
    needs
}

/// Builder for [`DescriptorSetLayout`].
pub struct DescriptorSetLayoutBuilder {
    device: Arc<Device>,
    bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        self.bindings.push(LayoutBinding {
            binding,
            descriptor_type,
            stages,
            count,
        });
        self
    }

    pub fn build(self) -> RhiResult<DescriptorSetLayout> {
        DescriptorSetLayout::new(self.device, self.bindings)
    }
}

/// Immutable descriptor set layout.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayout {
    pub fn builder(device: Arc<Device>) -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder {
            device,
            bindings: Vec::new(),
        }
    }

    /// Creates a layout. Binding indices must be unique.
    pub fn new(device: Arc<Device>, mut bindings: Vec<LayoutBinding>) -> RhiResult<Self> {
        validate_bindings(&mut bindings)?;

        let vk_bindings: Vec<_> = bindings.iter().map(|b| b.to_vk()).collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self {
            device,
            layout,
            bindings,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Bindings sorted by index.
    #[inline]
    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    pub fn binding(&self, binding: u32) -> Option<&LayoutBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Sort by binding index and reject duplicates or empty bindings.
fn validate_bindings(bindings: &mut [LayoutBinding]) -> RhiResult<()> {
    bindings.sort_by_key(|b| b.binding);
    if let Some(pair) = bindings.windows(2).find(|w| w[0].binding == w[1].binding) {
        return Err(RhiError::Descriptor(format!(
            "binding {} declared twice",
            pair[0].binding
        )));
    }
    if let Some(b) = bindings.iter().find(|b| b.count == 0) {
        return Err(RhiError::Descriptor(format!(
            "binding {} has a descriptor count of zero",
            b.binding
        )));
    }
    Ok(())
}

/// Host-side capacity accounting for a descriptor pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolBudget {
    max_sets: u32,
    sets_in_use: u32,
    capacity: BTreeMap<vk::DescriptorType, u32>,
    in_use: BTreeMap<vk::DescriptorType, u32>,
}

impl PoolBudget {
    pub fn new(max_sets: u32, pool_sizes: &[(vk::DescriptorType, u32)]) -> Self {
        let mut capacity = BTreeMap::new();
        for &(ty, count) in pool_sizes {
            *capacity.entry(ty).or_insert(0) += count;
        }
        Self {
            max_sets,
            sets_in_use: 0,
            capacity,
            in_use: BTreeMap::new(),
        }
    }

    /// Check that one more set of `bindings` fits.
    pub fn check(&self, bindings: &[LayoutBinding]) -> RhiResult<()> {
        if self.sets_in_use >= self.max_sets {
            return Err(RhiError::Descriptor(format!(
                "pool exhausted: {} of {} sets in use",
                self.sets_in_use, self.max_sets
            )));
        }
        for (ty, need) in descriptor_requirements(bindings) {
            let Some(&cap) = self.capacity.get(&ty) else {
                return Err(RhiError::Descriptor(format!(
                    "layout needs {:?}, which the pool was not sized for",
                    ty
                )));
            };
            let used = self.in_use.get(&ty).copied().unwrap_or(0);
            if used + need > cap {
                return Err(RhiError::Descriptor(format!(
                    "pool exhausted for {:?}: {} in use, {} requested, capacity {}",
                    ty, used, need, cap
                )));
            }
        }
        Ok(())
    }

    pub fn record(&mut self, bindings: &[LayoutBinding]) {
        self.sets_in_use += 1;
        for (ty, need) in descriptor_requirements(bindings) {
            *self.in_use.entry(ty).or_insert(0) += need;
        }
    }

    pub fn release(&mut self, bindings: &[LayoutBinding]) {
        self.sets_in_use = self.sets_in_use.saturating_sub(1);
        for (ty, need) in descriptor_requirements(bindings) {
            if let Some(used) = self.in_use.get_mut(&ty) {
                *used = used.saturating_sub(need);
            }
        }
    }

    pub fn reset(&mut self) {
        self.sets_in_use = 0;
        self.in_use.clear();
    }

    #[inline]
    pub fn sets_in_use(&self) -> u32 {
        self.sets_in_use
    }
}

/// Builder for [`DescriptorPool`].
pub struct DescriptorPoolBuilder {
    device: Arc<Device>,
    max_sets: u32,
    pool_sizes: Vec<(vk::DescriptorType, u32)>,
    free_individual: bool,
}

impl DescriptorPoolBuilder {
    pub fn max_sets(mut self, max_sets: u32) -> Self {
        self.max_sets = max_sets;
        self
    }

    pub fn pool_size(mut self, descriptor_type: vk::DescriptorType, count: u32) -> Self {
        self.pool_sizes.push((descriptor_type, count));
        self
    }

    /// Allow [`DescriptorPool::free`]. Without it only bulk reset is possible.
    pub fn free_individual_sets(mut self, enabled: bool) -> Self {
        self.free_individual = enabled;
        self
    }

    pub fn build(self) -> RhiResult<DescriptorPool> {
        DescriptorPool::new(
            self.device,
            self.max_sets,
            &self.pool_sizes,
            self.free_individual,
        )
    }
}

/// Bounded-capacity descriptor set allocator.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    budget: PoolBudget,
    free_individual: bool,
}

impl DescriptorPool {
    pub fn builder(device: Arc<Device>) -> DescriptorPoolBuilder {
        DescriptorPoolBuilder {
            device,
            max_sets: 1000,
            pool_sizes: Vec::new(),
            free_individual: false,
        }
    }

    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[(vk::DescriptorType, u32)],
        free_individual: bool,
    ) -> RhiResult<Self> {
        if max_sets == 0 || pool_sizes.is_empty() {
            return Err(RhiError::Descriptor(
                "descriptor pool needs at least one set and one pool size".to_string(),
            ));
        }

        let vk_sizes: Vec<vk::DescriptorPoolSize> = pool_sizes
            .iter()
            .map(|&(ty, count)| vk::DescriptorPoolSize::default().ty(ty).descriptor_count(count))
            .collect();

        let flags = if free_individual {
            vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET
        } else {
            vk::DescriptorPoolCreateFlags::empty()
        };

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&vk_sizes)
            .flags(flags);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, sizes={:?}, free_individual={}",
            max_sets, pool_sizes, free_individual
        );

        Ok(Self {
            device,
            pool,
            budget: PoolBudget::new(max_sets, pool_sizes),
            free_individual,
        })
    }

    /// Allocate one set of `layout`.
    ///
    /// # Errors
    ///
    /// [`RhiError::Descriptor`] when the layout needs a descriptor type the
    /// pool was not sized for, or the pool is full.
    pub fn allocate(&mut self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        self.budget.check(layout.bindings())?;

        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        let set = sets
            .first()
            .copied()
            .ok_or_else(|| RhiError::Descriptor("driver returned no descriptor set".to_string()))?;

        self.budget.record(layout.bindings());
        Ok(set)
    }

    /// Return `sets`, all allocated against `layout`, to the pool.
    ///
    /// The sets must no longer be in use by the GPU.
    pub fn free(&mut self, layout: &DescriptorSetLayout, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        if !self.free_individual {
            return Err(RhiError::Descriptor(
                "pool was not created with individual free enabled".to_string(),
            ));
        }

        unsafe {
            self.device.handle().free_descriptor_sets(self.pool, sets)?;
        }
        for _ in sets {
            self.budget.release(layout.bindings());
        }
        Ok(())
    }

    /// Return every set to the pool. No set may be in use by the GPU.
    pub fn reset(&mut self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        self.budget.reset();
        debug!("Reset descriptor pool");
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn budget(&self) -> &PoolBudget {
        &self.budget
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Collects buffer bindings for one descriptor set.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    buffers: Vec<(u32, vk::DescriptorBufferInfo)>,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(layout: &'a DescriptorSetLayout) -> Self {
        Self {
            layout,
            buffers: Vec::new(),
        }
    }

    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        self.buffers.push((binding, info));
        self
    }

    /// Allocate a set from `pool` and write the collected bindings into it.
    pub fn build(self, pool: &mut DescriptorPool) -> RhiResult<vk::DescriptorSet> {
        let set = pool.allocate(self.layout)?;
        self.overwrite(&pool.device, set)?;
        Ok(set)
    }

    /// Write the collected bindings into an existing set.
    pub fn overwrite(&self, device: &Device, set: vk::DescriptorSet) -> RhiResult<()> {
        let mut infos = Vec::with_capacity(self.buffers.len());
        let mut types = Vec::with_capacity(self.buffers.len());
        for &(binding, info) in &self.buffers {
            let schema = self.layout.binding(binding).ok_or_else(|| {
                RhiError::Descriptor(format!("layout has no binding {}", binding))
            })?;
            if !is_buffer_type(schema.descriptor_type) {
                return Err(RhiError::Descriptor(format!(
                    "binding {} is {:?}, not a buffer",
                    binding, schema.descriptor_type
                )));
            }
            infos.push([info]);
            types.push((binding, schema.descriptor_type));
        }

        let writes: Vec<vk::WriteDescriptorSet> = infos
            .iter()
            .zip(&types)
            .map(|(info, &(binding, ty))| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding)
                    .dst_array_element(0)
                    .descriptor_type(ty)
                    .buffer_info(info)
            })
            .collect();

        if !writes.is_empty() {
            unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
        }
        Ok(())
    }
}

fn is_buffer_type(ty: vk::DescriptorType) -> bool {
    matches!(
        ty,
        vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
    )
}
