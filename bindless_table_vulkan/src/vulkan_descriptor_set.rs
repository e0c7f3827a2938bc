/// Descriptor sets - the shader-visible arrays
///
/// Each distinct array layout (set 0 of a pipeline variant) gets one
/// descriptor set allocated from its own update-after-bind pool. Variants
/// sharing a layout share the set. Every published descriptor is mirrored
/// on the host so sets created later start with the same contents.
///
/// A descriptor that pending frames may read is never rewritten. When the
/// transform buffer is replaced, every set holding a transform binding is
/// replaced by a fresh one from a new pool, and the old pool is destroyed
/// once those frames complete.

use ash::vk;
use rustc_hash::FxHashMap;
use bindless_table::bindless::{DeviceLimits, Error, ResourceKind, Result};
use bindless_table::bindless::heap::{DescriptorPayload, DescriptorUpdate, DescriptorWrite};
use bindless_table::bindless::pipeline::{BindingDesc, DescriptorType, DeviceCapabilities, PipelineLayoutDesc};
use bindless_table::{table_debug, table_warn, table_error, table_err};

use crate::vulkan_deferred::DeferredDestroy;
use crate::vulkan_conversion::{
    binding_flags, descriptor_count, descriptor_info, descriptor_type_to_vk,
    push_constant_range, stage_flags_for, DescriptorInfo,
};

/// Identity of a set layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SetKey {
    bindings: Vec<BindingDesc>,
    stages: vk::ShaderStageFlags,
}

/// Identity of a pipeline layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LayoutKey {
    set: Option<usize>,
    push_constants: Option<(vk::ShaderStageFlags, u32)>,
}

struct BindlessSet {
    bindings: Vec<BindingDesc>,
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
}

/// One array element update, collected before the Vulkan write structs
/// that point into it are built
struct PendingWrite {
    set: vk::DescriptorSet,
    binding: u32,
    element: u32,
    descriptor_type: vk::DescriptorType,
    info: DescriptorInfo,
}

pub(crate) struct DescriptorSetCache {
    device: ash::Device,
    capabilities: DeviceCapabilities,
    limits: DeviceLimits,
    sets: Vec<BindlessSet>,
    set_lookup: FxHashMap<SetKey, usize>,
    pipeline_layouts: FxHashMap<LayoutKey, vk::PipelineLayout>,
    /// Published descriptors per kind, by array element
    published: [FxHashMap<u32, DescriptorPayload>; 5],
    /// Descriptors installed into cleared elements
    fallbacks: Vec<DescriptorPayload>,
    /// Pools of replaced sets
    retired: DeferredDestroy<vk::DescriptorPool>,
}

impl DescriptorSetCache {
    pub fn new(
        device: &ash::Device,
        capabilities: DeviceCapabilities,
        limits: DeviceLimits,
        fallbacks: Vec<DescriptorPayload>,
    ) -> Self {
        Self {
            device: device.clone(),
            capabilities,
            limits,
            sets: Vec::new(),
            set_lookup: FxHashMap::default(),
            pipeline_layouts: FxHashMap::default(),
            published: Default::default(),
            fallbacks,
            retired: DeferredDestroy::new(),
        }
    }

    /// Number of descriptor sets created so far
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    /// Create (or reuse) the pipeline layout of a validated variant
    ///
    /// `transforms` describes the current transform buffer, bound to any
    /// transform binding of a newly created set.
    pub fn prepare(
        &mut self,
        layout: &PipelineLayoutDesc,
        transforms: vk::DescriptorBufferInfo,
    ) -> Result<vk::PipelineLayout> {
        let stages = stage_flags_for(layout.variant);

        let set = if layout.bindings.is_empty() {
            None
        } else {
            Some(self.set_index(&layout.bindings, stages, transforms)?)
        };
        let push_range = push_constant_range(&layout.push_constants, stages);
        let key = LayoutKey {
            set,
            push_constants: push_range.map(|range| (range.stage_flags, range.size)),
        };

        if let Some(pipeline_layout) = self.pipeline_layouts.get(&key) {
            return Ok(*pipeline_layout);
        }

        unsafe {
            let set_layouts: Vec<vk::DescriptorSetLayout> = set
                .map(|index| vec![self.sets[index].layout])
                .unwrap_or_default();
            let push_ranges: Vec<vk::PushConstantRange> = push_range.into_iter().collect();

            let mut layout_create_info = vk::PipelineLayoutCreateInfo::default();
            if !set_layouts.is_empty() {
                layout_create_info = layout_create_info.set_layouts(&set_layouts);
            }
            if !push_ranges.is_empty() {
                layout_create_info = layout_create_info.push_constant_ranges(&push_ranges);
            }

            let pipeline_layout = self.device.create_pipeline_layout(&layout_create_info, None)
                .map_err(|e| table_err!("bindless::vulkan", "Failed to create pipeline layout for {}: {:?}", layout.variant, e))?;

            table_debug!("bindless::vulkan", "Created pipeline layout for {} ({} push-constant bytes)",
                layout.variant, layout.push_constants.size());
            self.pipeline_layouts.insert(key, pipeline_layout);
            Ok(pipeline_layout)
        }
    }

    /// Descriptor set serving a layout, once prepared
    pub fn descriptor_set(&self, layout: &PipelineLayoutDesc) -> Option<vk::DescriptorSet> {
        let key = SetKey {
            bindings: layout.bindings.clone(),
            stages: stage_flags_for(layout.variant),
        };
        self.set_lookup.get(&key).map(|&index| self.sets[index].set)
    }

    fn set_index(
        &mut self,
        bindings: &[BindingDesc],
        stages: vk::ShaderStageFlags,
        transforms: vk::DescriptorBufferInfo,
    ) -> Result<usize> {
        let key = SetKey { bindings: bindings.to_vec(), stages };
        if let Some(&index) = self.set_lookup.get(&key) {
            return Ok(index);
        }

        let set = self.create_set(bindings, stages)?;
        let index = self.sets.len();
        self.sets.push(set);
        self.set_lookup.insert(key, index);

        // Bring the new set up to date
        let pending = self.replay(&self.sets[index], transforms);
        self.flush(&pending);

        table_debug!("bindless::vulkan", "Created descriptor set {} ({} bindings, {} descriptors replayed)",
            index, bindings.len(), pending.len());
        Ok(index)
    }

    /// Writes giving a fresh set the published contents
    fn replay(&self, set: &BindlessSet, transforms: vk::DescriptorBufferInfo) -> Vec<PendingWrite> {
        let mut pending = Vec::new();
        for binding in &set.bindings {
            if binding.kind == ResourceKind::Transform {
                pending.push(PendingWrite {
                    set: set.set,
                    binding: binding.binding,
                    element: 0,
                    descriptor_type: descriptor_type_to_vk(binding.descriptor_type),
                    info: DescriptorInfo::Buffer(transforms),
                });
                continue;
            }
            for (&element, payload) in &self.published[binding.kind.slot()] {
                if let Some(info) = descriptor_info(binding.descriptor_type, payload) {
                    pending.push(PendingWrite {
                        set: set.set,
                        binding: binding.binding,
                        element,
                        descriptor_type: descriptor_type_to_vk(binding.descriptor_type),
                        info,
                    });
                }
            }
        }
        pending
    }

    /// Create layout, pool and set for one array layout
    fn create_set(&self, bindings: &[BindingDesc], stages: vk::ShaderStageFlags) -> Result<BindlessSet> {
        unsafe {
            let update_after_bind = self.capabilities.contains(DeviceCapabilities::UPDATE_AFTER_BIND);

            let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
                .iter()
                .map(|binding| {
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(binding.binding)
                        .descriptor_type(descriptor_type_to_vk(binding.descriptor_type))
                        .descriptor_count(descriptor_count(binding, &self.limits))
                        .stage_flags(stages)
                })
                .collect();
            let flags: Vec<vk::DescriptorBindingFlags> = bindings
                .iter()
                .map(|binding| binding_flags(binding, self.capabilities))
                .collect();

            let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default()
                .binding_flags(&flags);
            let layout_flags = if update_after_bind {
                vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL
            } else {
                vk::DescriptorSetLayoutCreateFlags::empty()
            };
            let layout_create = vk::DescriptorSetLayoutCreateInfo::default()
                .flags(layout_flags)
                .bindings(&vk_bindings)
                .push_next(&mut flags_info);

            let layout = self.device.create_descriptor_set_layout(&layout_create, None)
                .map_err(|e| table_err!("bindless::vulkan", "Failed to create descriptor set layout: {:?}", e))?;

            let (pool, set) = match self.allocate_set(layout, bindings) {
                Ok(allocated) => allocated,
                Err(e) => {
                    self.device.destroy_descriptor_set_layout(layout, None);
                    return Err(e);
                }
            };

            Ok(BindlessSet {
                bindings: bindings.to_vec(),
                layout,
                pool,
                set,
            })
        }
    }

    /// New pool holding one set of `layout`
    fn allocate_set(
        &self,
        layout: vk::DescriptorSetLayout,
        bindings: &[BindingDesc],
    ) -> Result<(vk::DescriptorPool, vk::DescriptorSet)> {
        let update_after_bind = self.capabilities.contains(DeviceCapabilities::UPDATE_AFTER_BIND);
        let pool = self.create_pool(bindings, update_after_bind)?;

        let layouts = [layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        unsafe {
            match self.device.allocate_descriptor_sets(&allocate_info) {
                Ok(sets) => Ok((pool, sets[0])),
                Err(e) => {
                    self.device.destroy_descriptor_pool(pool, None);
                    Err(table_err!("bindless::vulkan", "Failed to allocate descriptor set: {:?}", e))
                }
            }
        }
    }

    /// Pool sized for exactly one set of `bindings`
    fn create_pool(&self, bindings: &[BindingDesc], update_after_bind: bool) -> Result<vk::DescriptorPool> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = bindings
            .iter()
            .map(|binding| vk::DescriptorPoolSize {
                ty: descriptor_type_to_vk(binding.descriptor_type),
                descriptor_count: descriptor_count(binding, &self.limits),
            })
            .collect();
        let flags = if update_after_bind {
            vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND
        } else {
            vk::DescriptorPoolCreateFlags::empty()
        };
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(flags)
            .pool_sizes(&pool_sizes)
            .max_sets(1);

        unsafe {
            self.device.create_descriptor_pool(&info, None)
                .map_err(|e| {
                    table_error!("bindless::vulkan", "Failed to create descriptor pool: {:?}", e);
                    Error::BackendError(format!("Failed to create descriptor pool: {:?}", e))
                })
        }
    }

    /// Apply one batch of array updates to every set holding the kind
    ///
    /// Transform writes never reach this point, they go to the transform buffer.
    pub fn apply(&mut self, writes: &[DescriptorWrite]) -> Result<()> {
        let mut pending = Vec::new();

        for write in writes {
            let kind = write.kind();
            let element = write.array_element();
            if element >= self.limits.max_descriptors(kind) {
                return Err(table_err!("bindless::vulkan",
                    "Descriptor write to {}[{}] is past the array length {}",
                    kind, element, self.limits.max_descriptors(kind)));
            }

            let payload = match write.update {
                DescriptorUpdate::Set(payload) => {
                    self.published[kind.slot()].insert(element, payload);
                    payload
                }
                DescriptorUpdate::Clear => {
                    self.published[kind.slot()].remove(&element);
                    // Partially-bound arrays tolerate a stale element no shader reads
                    match self.fallbacks.iter().find(|fallback| fallback.kind() == kind) {
                        Some(fallback) => *fallback,
                        None => continue,
                    }
                }
            };

            for set in &self.sets {
                for binding in set.bindings.iter().filter(|binding| binding.kind == kind) {
                    match descriptor_info(binding.descriptor_type, &payload) {
                        Some(info) => pending.push(PendingWrite {
                            set: set.set,
                            binding: binding.binding,
                            element,
                            descriptor_type: descriptor_type_to_vk(binding.descriptor_type),
                            info,
                        }),
                        None if binding.descriptor_type == DescriptorType::CombinedImageSampler => {
                            table_warn!("bindless::vulkan",
                                "{} has no combined sampler, sampler2D[{}] left unwritten",
                                write.handle, element);
                        }
                        None => {}
                    }
                }
            }
        }

        self.flush(&pending);
        Ok(())
    }

    /// Replace every set holding a transform binding with one pointing at
    /// `transforms`
    ///
    /// Frames up to `retire_after` may still have the old sets bound, so the
    /// old sets are left untouched and their pools are destroyed by `collect`
    /// once that value completes. Returns the number of sets replaced.
    pub fn replace_transform_sets(
        &mut self,
        transforms: vk::DescriptorBufferInfo,
        retire_after: u64,
    ) -> Result<usize> {
        let mut replaced = 0;
        for index in 0..self.sets.len() {
            if !self.sets[index].bindings.iter().any(|binding| binding.kind == ResourceKind::Transform) {
                continue;
            }

            let (pool, set) = self.allocate_set(self.sets[index].layout, &self.sets[index].bindings)?;
            let old_pool = std::mem::replace(&mut self.sets[index].pool, pool);
            self.sets[index].set = set;
            self.retired.push(old_pool, retire_after);

            let pending = self.replay(&self.sets[index], transforms);
            self.flush(&pending);
            replaced += 1;
        }

        if replaced > 0 {
            table_debug!("bindless::vulkan",
                "Replaced {} descriptor set(s) for the new transform buffer (old ones retire after frame {})",
                replaced, retire_after);
        }
        Ok(replaced)
    }

    /// Destroy pools of replaced sets the GPU can no longer read
    pub fn collect(&mut self, completed: u64) -> usize {
        let done = self.retired.collect(completed);
        unsafe {
            for pool in &done {
                // Destroying the pool frees its set
                self.device.destroy_descriptor_pool(*pool, None);
            }
        }
        done.len()
    }

    fn flush(&self, pending: &[PendingWrite]) {
        if pending.is_empty() {
            return;
        }

        let writes: Vec<vk::WriteDescriptorSet> = pending
            .iter()
            .map(|update| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(update.set)
                    .dst_binding(update.binding)
                    .dst_array_element(update.element)
                    .descriptor_type(update.descriptor_type);
                match &update.info {
                    DescriptorInfo::Image(info) => write.image_info(std::slice::from_ref(info)),
                    DescriptorInfo::Buffer(info) => write.buffer_info(std::slice::from_ref(info)),
                }
            })
            .collect();

        unsafe {
            self.device.update_descriptor_sets(&writes, &[]);
        }
    }

    /// Destroy every layout, pool and set (the device must be idle)
    pub fn destroy(&mut self) {
        unsafe {
            for (_, pipeline_layout) in self.pipeline_layouts.drain() {
                self.device.destroy_pipeline_layout(pipeline_layout, None);
            }
            for set in self.sets.drain(..) {
                // Destroying the pool frees its set
                self.device.destroy_descriptor_pool(set.pool, None);
                self.device.destroy_descriptor_set_layout(set.layout, None);
            }
            for pool in self.retired.drain() {
                self.device.destroy_descriptor_pool(pool, None);
            }
            self.set_lookup.clear();
        }
    }
}
