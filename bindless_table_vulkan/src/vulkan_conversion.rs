/// Conversions between table types and Vulkan enums/structs
///
/// Pure functions, testable without a device.

use ash::vk;
use ash::vk::Handle as _;
use bindless_table::bindless::{DeviceLimits, Error, ResourceKind};
use bindless_table::bindless::encoder::PushConstantLayout;
use bindless_table::bindless::heap::DescriptorPayload;
use bindless_table::bindless::pipeline::{BindingDesc, DescriptorType, DeviceCapabilities, PipelineVariant};
use bindless_table::table_error;

/// Descriptor type of an array binding
pub(crate) fn descriptor_type_to_vk(descriptor_type: DescriptorType) -> vk::DescriptorType {
    match descriptor_type {
        DescriptorType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        DescriptorType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
    }
}

/// Shader stages that see the variant's arrays and push constants
pub(crate) fn stage_flags_for(variant: PipelineVariant) -> vk::ShaderStageFlags {
    match variant {
        PipelineVariant::StorageCopy => vk::ShaderStageFlags::COMPUTE,
        _ => vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
    }
}

/// Array length declared for a binding
///
/// The transform heap is one storage buffer (`Matrices[]` is runtime-sized
/// inside it), every other kind is an array of descriptors.
pub(crate) fn descriptor_count(binding: &BindingDesc, limits: &DeviceLimits) -> u32 {
    match binding.kind {
        ResourceKind::Transform => 1,
        kind => limits.max_descriptors(kind),
    }
}

/// Binding flags of an array binding
pub(crate) fn binding_flags(binding: &BindingDesc, capabilities: DeviceCapabilities) -> vk::DescriptorBindingFlags {
    let mut flags = vk::DescriptorBindingFlags::empty();

    if binding.kind != ResourceKind::Transform && capabilities.contains(DeviceCapabilities::PARTIALLY_BOUND) {
        flags |= vk::DescriptorBindingFlags::PARTIALLY_BOUND;
    }
    if capabilities.contains(DeviceCapabilities::UPDATE_AFTER_BIND) {
        flags |= vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
            | vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING;
    }

    flags
}

/// Push-constant range of a layout (none for an empty block)
pub(crate) fn push_constant_range(
    layout: &PushConstantLayout,
    stages: vk::ShaderStageFlags,
) -> Option<vk::PushConstantRange> {
    if layout.is_empty() {
        return None;
    }
    Some(vk::PushConstantRange {
        stage_flags: stages,
        offset: 0,
        size: layout.size(),
    })
}

/// Descriptor info for one array element
#[derive(Debug, Clone, Copy)]
pub(crate) enum DescriptorInfo {
    Image(vk::DescriptorImageInfo),
    Buffer(vk::DescriptorBufferInfo),
}

/// Build the descriptor info that installs `payload` into a binding of `descriptor_type`
///
/// Returns `None` when the payload cannot populate that binding (a sampled
/// image without a sampler in a `sampler2D[]` array).
pub(crate) fn descriptor_info(descriptor_type: DescriptorType, payload: &DescriptorPayload) -> Option<DescriptorInfo> {
    match (descriptor_type, payload) {
        (DescriptorType::SampledImage, DescriptorPayload::SampledImage { image_view, .. }) => {
            Some(DescriptorInfo::Image(
                vk::DescriptorImageInfo::default()
                    .image_view(vk::ImageView::from_raw(*image_view))
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            ))
        }
        (DescriptorType::CombinedImageSampler, DescriptorPayload::SampledImage { image_view, combined_sampler }) => {
            combined_sampler.map(|sampler| {
                DescriptorInfo::Image(
                    vk::DescriptorImageInfo::default()
                        .sampler(vk::Sampler::from_raw(sampler))
                        .image_view(vk::ImageView::from_raw(*image_view))
                        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                )
            })
        }
        (DescriptorType::Sampler, DescriptorPayload::Sampler { sampler }) => {
            Some(DescriptorInfo::Image(
                vk::DescriptorImageInfo::default().sampler(vk::Sampler::from_raw(*sampler)),
            ))
        }
        (DescriptorType::StorageImage, DescriptorPayload::StorageImage { image_view }) => {
            Some(DescriptorInfo::Image(
                vk::DescriptorImageInfo::default()
                    .image_view(vk::ImageView::from_raw(*image_view))
                    .image_layout(vk::ImageLayout::GENERAL),
            ))
        }
        (DescriptorType::StorageBuffer, DescriptorPayload::StorageBuffer { buffer, offset, range }) => {
            let range = if *range == 0 { vk::WHOLE_SIZE } else { *range };
            Some(DescriptorInfo::Buffer(
                vk::DescriptorBufferInfo::default()
                    .buffer(vk::Buffer::from_raw(*buffer))
                    .offset(*offset)
                    .range(range),
            ))
        }
        _ => None,
    }
}

/// Map a failed Vulkan call to a table error and log it
///
/// Device loss is reported as `Error::DeviceLost` so the table treats it
/// as fatal.
pub(crate) fn vk_error(what: &str, result: vk::Result) -> Error {
    table_error!("bindless::vulkan", "{}: {:?}", what, result);
    match result {
        vk::Result::ERROR_DEVICE_LOST => Error::DeviceLost(format!("{}: {:?}", what, result)),
        _ => Error::BackendError(format!("{}: {:?}", what, result)),
    }
}

#[cfg(test)]
#[path = "vulkan_conversion_tests.rs"]
mod tests;
