/// Descriptor payloads - what a heap slot points at
///
/// The table never owns GPU memory for images or buffers. A payload carries
/// the raw backend object handles (`VkImageView`, `VkSampler`, `VkBuffer`
/// as `u64`) the caller created, plus the matrix for transform slots.

use glam::Mat4;
use crate::handle::{Handle, ResourceKind};

/// Descriptor content installed into one slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DescriptorPayload {
    /// Sampled image view, optionally with a combined sampler (`sampler2D[]`)
    SampledImage {
        image_view: u64,
        combined_sampler: Option<u64>,
    },
    /// Standalone sampler object
    Sampler {
        sampler: u64,
    },
    /// Storage image view (general layout, rgba8)
    StorageImage {
        image_view: u64,
    },
    /// Storage buffer range
    StorageBuffer {
        buffer: u64,
        offset: u64,
        range: u64,
    },
    /// Per-draw transform matrix (column-major)
    Transform(Mat4),
}

impl DescriptorPayload {
    /// Heap kind this payload can be written to
    pub fn kind(&self) -> ResourceKind {
        match self {
            DescriptorPayload::SampledImage { .. } => ResourceKind::SampledImage,
            DescriptorPayload::Sampler { .. } => ResourceKind::Sampler,
            DescriptorPayload::StorageImage { .. } => ResourceKind::StorageImage,
            DescriptorPayload::StorageBuffer { .. } => ResourceKind::StorageBuffer,
            DescriptorPayload::Transform(_) => ResourceKind::Transform,
        }
    }
}

/// Pending change to one shader-visible array element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DescriptorUpdate {
    /// Install a descriptor
    Set(DescriptorPayload),
    /// Reset the element after its slot was recycled
    Clear,
}

/// One batched descriptor write handed to the backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorWrite {
    /// Slot being written (generation at the time of the write)
    pub handle: Handle,
    pub update: DescriptorUpdate,
}

impl DescriptorWrite {
    pub fn kind(&self) -> ResourceKind {
        self.handle.kind()
    }

    /// Array element written by this update
    pub fn array_element(&self) -> u32 {
        self.handle.binding_index()
    }
}
