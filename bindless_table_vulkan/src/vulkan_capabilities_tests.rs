//! Unit tests for capability and limit translation
//!
//! Pure struct mapping, no GPU required.

use super::*;

fn indexing_properties(max: u32) -> vk::PhysicalDeviceDescriptorIndexingProperties<'static> {
    vk::PhysicalDeviceDescriptorIndexingProperties::default()
        .max_per_stage_descriptor_update_after_bind_sampled_images(max)
        .max_descriptor_set_update_after_bind_sampled_images(max)
        .max_per_stage_descriptor_update_after_bind_samplers(max)
        .max_descriptor_set_update_after_bind_samplers(max)
        .max_per_stage_descriptor_update_after_bind_storage_images(max)
        .max_descriptor_set_update_after_bind_storage_images(max)
        .max_per_stage_descriptor_update_after_bind_storage_buffers(max)
        .max_descriptor_set_update_after_bind_storage_buffers(max)
}

fn core_limits(max: u32) -> vk::PhysicalDeviceLimits {
    vk::PhysicalDeviceLimits {
        max_per_stage_descriptor_sampled_images: max,
        max_descriptor_set_sampled_images: max,
        max_per_stage_descriptor_samplers: max,
        max_descriptor_set_samplers: max,
        max_per_stage_descriptor_storage_images: max,
        max_descriptor_set_storage_images: max,
        max_per_stage_descriptor_storage_buffers: max,
        max_descriptor_set_storage_buffers: max,
        ..Default::default()
    }
}

#[test]
fn test_full_feature_set_maps_to_bindless() {
    let features = bindless_device_features();
    assert_eq!(capabilities_from_features(&features), DeviceCapabilities::BINDLESS);
}

#[test]
fn test_no_features_maps_to_empty() {
    let features = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
    assert!(capabilities_from_features(&features).is_empty());
}

#[test]
fn test_update_after_bind_needs_every_kind() {
    let features = bindless_device_features()
        .descriptor_binding_storage_image_update_after_bind(false);
    let capabilities = capabilities_from_features(&features);

    assert!(!capabilities.contains(DeviceCapabilities::UPDATE_AFTER_BIND));
    assert!(capabilities.contains(DeviceCapabilities::PARTIALLY_BOUND));
}

#[test]
fn test_update_after_bind_needs_unused_while_pending() {
    let features = bindless_device_features()
        .descriptor_binding_update_unused_while_pending(false);
    assert!(!capabilities_from_features(&features).contains(DeviceCapabilities::UPDATE_AFTER_BIND));
}

#[test]
fn test_non_uniform_flags_map_individually() {
    let features = vk::PhysicalDeviceDescriptorIndexingFeatures::default()
        .shader_storage_image_array_non_uniform_indexing(true);
    assert_eq!(
        capabilities_from_features(&features),
        DeviceCapabilities::STORAGE_IMAGE_NON_UNIFORM_INDEXING
    );
}

#[test]
fn test_limits_use_update_after_bind_properties() {
    let limits = limits_from_properties(
        DeviceCapabilities::BINDLESS,
        &indexing_properties(500_000),
        &core_limits(16),
        DeviceLimits::default(),
    );

    // Clamped to the 16-bit index space
    assert_eq!(limits.max_descriptors(ResourceKind::SampledImage), MAX_SLOTS_PER_KIND);
    assert_eq!(limits.max_descriptors(ResourceKind::StorageBuffer), MAX_SLOTS_PER_KIND);
}

#[test]
fn test_limits_fall_back_to_core_limits() {
    let limits = limits_from_properties(
        DeviceCapabilities::RUNTIME_DESCRIPTOR_ARRAY,
        &indexing_properties(500_000),
        &core_limits(16),
        DeviceLimits::default(),
    );

    assert_eq!(limits.max_descriptors(ResourceKind::Sampler), 16);
    assert_eq!(limits.max_descriptors(ResourceKind::StorageImage), 16);
    // Transforms live in one buffer
    assert_eq!(limits.max_descriptors(ResourceKind::Transform), MAX_SLOTS_PER_KIND);
}

#[test]
fn test_limits_respect_requested_counts() {
    let requested = DeviceLimits::default()
        .with_max_descriptors(ResourceKind::Sampler, 128)
        .with_max_descriptors(ResourceKind::Transform, 4096);
    let limits = limits_from_properties(
        DeviceCapabilities::BINDLESS,
        &indexing_properties(1_000_000),
        &core_limits(16),
        requested,
    );

    assert_eq!(limits.max_descriptors(ResourceKind::Sampler), 128);
    assert_eq!(limits.max_descriptors(ResourceKind::Transform), 4096);
    assert_eq!(limits.max_descriptors(ResourceKind::SampledImage), MAX_SLOTS_PER_KIND);
}

#[test]
fn test_limits_per_stage_smaller_than_per_set() {
    let properties = indexing_properties(100_000)
        .max_per_stage_descriptor_update_after_bind_sampled_images(2048);
    let limits = limits_from_properties(
        DeviceCapabilities::BINDLESS,
        &properties,
        &core_limits(16),
        DeviceLimits::default(),
    );
    assert_eq!(limits.max_descriptors(ResourceKind::SampledImage), 2048);
}
