/// Device capabilities relevant to bindless descriptor arrays

use bitflags::bitflags;
use crate::handle::ResourceKind;

bitflags! {
    /// Descriptor-indexing features a backend reports
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceCapabilities: u32 {
        /// Arrays declared without a size (`texture2D[]`)
        const RUNTIME_DESCRIPTOR_ARRAY = 1 << 0;
        /// Array elements may be left unwritten while unused
        const PARTIALLY_BOUND = 1 << 1;
        /// Descriptors may be updated after the set is bound
        const UPDATE_AFTER_BIND = 1 << 2;
        /// `nonuniformEXT` indexing of sampled image and sampler arrays
        const SAMPLED_IMAGE_NON_UNIFORM_INDEXING = 1 << 3;
        /// `nonuniformEXT` indexing of storage image arrays
        const STORAGE_IMAGE_NON_UNIFORM_INDEXING = 1 << 4;
        /// `nonuniformEXT` indexing of storage buffer arrays
        const STORAGE_BUFFER_NON_UNIFORM_INDEXING = 1 << 5;

        /// Everything a fully bindless device provides
        const BINDLESS = Self::RUNTIME_DESCRIPTOR_ARRAY.bits()
            | Self::PARTIALLY_BOUND.bits()
            | Self::UPDATE_AFTER_BIND.bits()
            | Self::SAMPLED_IMAGE_NON_UNIFORM_INDEXING.bits()
            | Self::STORAGE_IMAGE_NON_UNIFORM_INDEXING.bits()
            | Self::STORAGE_BUFFER_NON_UNIFORM_INDEXING.bits();
    }
}

impl DeviceCapabilities {
    /// Non-uniform indexing capability needed to index an array of `kind`
    pub fn non_uniform_indexing_for(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::SampledImage | ResourceKind::Sampler => Self::SAMPLED_IMAGE_NON_UNIFORM_INDEXING,
            ResourceKind::StorageImage => Self::STORAGE_IMAGE_NON_UNIFORM_INDEXING,
            ResourceKind::StorageBuffer | ResourceKind::Transform => Self::STORAGE_BUFFER_NON_UNIFORM_INDEXING,
        }
    }
}
