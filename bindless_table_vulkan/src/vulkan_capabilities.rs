/// Descriptor-indexing capability and limit queries
///
/// The host creates the device; these helpers tell it which features to
/// enable and translate what the physical device reports into
/// `DeviceCapabilities` / `DeviceLimits`.

use ash::vk;
use bindless_table::bindless::{DeviceLimits, ResourceKind, MAX_SLOTS_PER_KIND};
use bindless_table::bindless::pipeline::DeviceCapabilities;

/// Descriptor-indexing features the backend uses
///
/// Chain into `vk::DeviceCreateInfo` with `push_next` when creating the
/// device. Features the physical device lacks must be cleared first.
pub fn bindless_device_features() -> vk::PhysicalDeviceDescriptorIndexingFeatures<'static> {
    vk::PhysicalDeviceDescriptorIndexingFeatures::default()
        .runtime_descriptor_array(true)
        .descriptor_binding_partially_bound(true)
        .descriptor_binding_sampled_image_update_after_bind(true)
        .descriptor_binding_storage_image_update_after_bind(true)
        .descriptor_binding_storage_buffer_update_after_bind(true)
        .descriptor_binding_update_unused_while_pending(true)
        .shader_sampled_image_array_non_uniform_indexing(true)
        .shader_storage_image_array_non_uniform_indexing(true)
        .shader_storage_buffer_array_non_uniform_indexing(true)
}

/// Timeline semaphores are required for frame retirement
pub fn timeline_semaphore_features() -> vk::PhysicalDeviceTimelineSemaphoreFeatures<'static> {
    vk::PhysicalDeviceTimelineSemaphoreFeatures::default().timeline_semaphore(true)
}

/// What the physical device supports
pub(crate) struct DeviceSupport {
    pub capabilities: DeviceCapabilities,
    pub limits: DeviceLimits,
    pub timeline_semaphore: bool,
}

/// Query features and limits of `physical_device`
///
/// `requested` caps every kind (the host may want smaller arrays than the
/// device allows).
pub(crate) fn query_device_support(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    requested: DeviceLimits,
) -> DeviceSupport {
    unsafe {
        let mut indexing_features = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
        let mut timeline_features = vk::PhysicalDeviceTimelineSemaphoreFeatures::default();
        let mut features = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut indexing_features)
            .push_next(&mut timeline_features);
        instance.get_physical_device_features2(physical_device, &mut features);

        let mut indexing_properties = vk::PhysicalDeviceDescriptorIndexingProperties::default();
        let mut properties = vk::PhysicalDeviceProperties2::default()
            .push_next(&mut indexing_properties);
        instance.get_physical_device_properties2(physical_device, &mut properties);
        let device_limits = properties.properties.limits;

        let capabilities = capabilities_from_features(&indexing_features);
        let limits = limits_from_properties(capabilities, &indexing_properties, &device_limits, requested);

        DeviceSupport {
            capabilities,
            limits,
            timeline_semaphore: timeline_features.timeline_semaphore == vk::TRUE,
        }
    }
}

/// Map Vulkan descriptor-indexing features to table capabilities
pub(crate) fn capabilities_from_features(
    features: &vk::PhysicalDeviceDescriptorIndexingFeatures<'_>,
) -> DeviceCapabilities {
    let mut capabilities = DeviceCapabilities::empty();

    if features.runtime_descriptor_array == vk::TRUE {
        capabilities |= DeviceCapabilities::RUNTIME_DESCRIPTOR_ARRAY;
    }
    if features.descriptor_binding_partially_bound == vk::TRUE {
        capabilities |= DeviceCapabilities::PARTIALLY_BOUND;
    }
    // All array kinds must support it, the layouts mix them
    if features.descriptor_binding_sampled_image_update_after_bind == vk::TRUE
        && features.descriptor_binding_storage_image_update_after_bind == vk::TRUE
        && features.descriptor_binding_storage_buffer_update_after_bind == vk::TRUE
        && features.descriptor_binding_update_unused_while_pending == vk::TRUE
    {
        capabilities |= DeviceCapabilities::UPDATE_AFTER_BIND;
    }
    if features.shader_sampled_image_array_non_uniform_indexing == vk::TRUE {
        capabilities |= DeviceCapabilities::SAMPLED_IMAGE_NON_UNIFORM_INDEXING;
    }
    if features.shader_storage_image_array_non_uniform_indexing == vk::TRUE {
        capabilities |= DeviceCapabilities::STORAGE_IMAGE_NON_UNIFORM_INDEXING;
    }
    if features.shader_storage_buffer_array_non_uniform_indexing == vk::TRUE {
        capabilities |= DeviceCapabilities::STORAGE_BUFFER_NON_UNIFORM_INDEXING;
    }

    capabilities
}

/// Per-kind array ceilings
///
/// Update-after-bind layouts are bounded by the `*_update_after_bind_*`
/// limits, plain layouts by the core per-stage limits. The transform heap
/// is a single storage buffer and is only bounded by `requested`.
pub(crate) fn limits_from_properties(
    capabilities: DeviceCapabilities,
    indexing: &vk::PhysicalDeviceDescriptorIndexingProperties<'_>,
    core: &vk::PhysicalDeviceLimits,
    requested: DeviceLimits,
) -> DeviceLimits {
    let device_max = |kind: ResourceKind| -> u32 {
        if capabilities.contains(DeviceCapabilities::UPDATE_AFTER_BIND) {
            match kind {
                ResourceKind::SampledImage => indexing
                    .max_per_stage_descriptor_update_after_bind_sampled_images
                    .min(indexing.max_descriptor_set_update_after_bind_sampled_images),
                ResourceKind::Sampler => indexing
                    .max_per_stage_descriptor_update_after_bind_samplers
                    .min(indexing.max_descriptor_set_update_after_bind_samplers),
                ResourceKind::StorageImage => indexing
                    .max_per_stage_descriptor_update_after_bind_storage_images
                    .min(indexing.max_descriptor_set_update_after_bind_storage_images),
                ResourceKind::StorageBuffer => indexing
                    .max_per_stage_descriptor_update_after_bind_storage_buffers
                    .min(indexing.max_descriptor_set_update_after_bind_storage_buffers),
                ResourceKind::Transform => MAX_SLOTS_PER_KIND,
            }
        } else {
            match kind {
                ResourceKind::SampledImage => core
                    .max_per_stage_descriptor_sampled_images
                    .min(core.max_descriptor_set_sampled_images),
                ResourceKind::Sampler => core
                    .max_per_stage_descriptor_samplers
                    .min(core.max_descriptor_set_samplers),
                ResourceKind::StorageImage => core
                    .max_per_stage_descriptor_storage_images
                    .min(core.max_descriptor_set_storage_images),
                ResourceKind::StorageBuffer => core
                    .max_per_stage_descriptor_storage_buffers
                    .min(core.max_descriptor_set_storage_buffers),
                ResourceKind::Transform => MAX_SLOTS_PER_KIND,
            }
        }
    };

    ResourceKind::ALL.iter().fold(DeviceLimits::default(), |limits, &kind| {
        let max = device_max(kind)
            .min(requested.max_descriptors(kind))
            .min(MAX_SLOTS_PER_KIND);
        limits.with_max_descriptors(kind, max)
    })
}

#[cfg(test)]
#[path = "vulkan_capabilities_tests.rs"]
mod tests;
