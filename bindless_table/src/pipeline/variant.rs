/// Pipeline variants - the closed set of shader contracts the table serves
///
/// Every variant fixes which descriptor arrays it declares (set 0) and the
/// exact byte layout of its push constants. Shaders and host code evolve
/// together through this enum: a new shader contract is a new variant.

use std::fmt;
use crate::encoder::PushConstantLayout;
use crate::handle::ResourceKind;
use crate::pipeline::DeviceCapabilities;

/// Shader-side declaration of one descriptor array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// `texture2D[]`
    SampledImage,
    /// `sampler[]`
    Sampler,
    /// `sampler2D[]`
    CombinedImageSampler,
    /// `image2D[]` (rgba8)
    StorageImage,
    /// Runtime-sized storage buffer array (`Matrices[]`)
    StorageBuffer,
}

/// One descriptor array binding of a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingDesc {
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    /// Heap whose slots populate the array
    pub kind: ResourceKind,
    /// Declared `readonly` in the shader
    pub read_only: bool,
}

impl BindingDesc {
    const fn new(binding: u32, descriptor_type: DescriptorType, kind: ResourceKind, read_only: bool) -> Self {
        Self { set: 0, binding, descriptor_type, kind, read_only }
    }
}

/// Size in bytes of one `Matrices[]` element (a column-major mat4)
pub const TRANSFORM_STRIDE: u64 = 64;

const SPLIT_SAMPLER_BINDINGS: [BindingDesc; 2] = [
    BindingDesc::new(2, DescriptorType::SampledImage, ResourceKind::SampledImage, true),
    BindingDesc::new(3, DescriptorType::Sampler, ResourceKind::Sampler, true),
];

const STORAGE_COPY_BINDINGS: [BindingDesc; 1] = [
    BindingDesc::new(1, DescriptorType::StorageImage, ResourceKind::StorageImage, true),
];

const COMBINED_SAMPLER_BINDINGS: [BindingDesc; 1] = [
    BindingDesc::new(1, DescriptorType::CombinedImageSampler, ResourceKind::SampledImage, true),
];

const TRANSFORM_BINDINGS: [BindingDesc; 1] = [
    BindingDesc::new(0, DescriptorType::StorageBuffer, ResourceKind::Transform, true),
];

/// Supported shader contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineVariant {
    /// Textured triangle, fixed texture slot
    TriangleBasic,
    /// Textured triangle, texture index in push constants
    TriangleBindless,
    /// UI quads: scale/translate + texture index
    UiOverlay,
    /// Compute copy reading a storage image by index
    StorageCopy,
    /// Mesh with `sampler2D[]` albedo
    MeshCombinedSampler,
    /// Mesh with separate `texture2D[]` and `sampler[]` indices
    MeshSplitSampler,
    /// Static mesh whose view-projection comes from `Matrices[]`
    MeshStaticIndexed,
    /// Static mesh with both matrices in push constants, no arrays
    MeshStaticFixed,
}

impl PipelineVariant {
    pub const ALL: [PipelineVariant; 8] = [
        PipelineVariant::TriangleBasic,
        PipelineVariant::TriangleBindless,
        PipelineVariant::UiOverlay,
        PipelineVariant::StorageCopy,
        PipelineVariant::MeshCombinedSampler,
        PipelineVariant::MeshSplitSampler,
        PipelineVariant::MeshStaticIndexed,
        PipelineVariant::MeshStaticFixed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineVariant::TriangleBasic => "TriangleBasic",
            PipelineVariant::TriangleBindless => "TriangleBindless",
            PipelineVariant::UiOverlay => "UiOverlay",
            PipelineVariant::StorageCopy => "StorageCopy",
            PipelineVariant::MeshCombinedSampler => "MeshCombinedSampler",
            PipelineVariant::MeshSplitSampler => "MeshSplitSampler",
            PipelineVariant::MeshStaticIndexed => "MeshStaticIndexed",
            PipelineVariant::MeshStaticFixed => "MeshStaticFixed",
        }
    }

    /// Descriptor arrays declared in set 0
    pub fn bindings(&self) -> &'static [BindingDesc] {
        match self {
            PipelineVariant::TriangleBasic
            | PipelineVariant::TriangleBindless
            | PipelineVariant::UiOverlay
            | PipelineVariant::MeshSplitSampler => &SPLIT_SAMPLER_BINDINGS,
            PipelineVariant::StorageCopy => &STORAGE_COPY_BINDINGS,
            PipelineVariant::MeshCombinedSampler => &COMBINED_SAMPLER_BINDINGS,
            PipelineVariant::MeshStaticIndexed => &TRANSFORM_BINDINGS,
            PipelineVariant::MeshStaticFixed => &[],
        }
    }

    pub fn has_descriptor_arrays(&self) -> bool {
        !self.bindings().is_empty()
    }

    /// Exact push-constant block of the variant
    pub fn push_constants(&self) -> PushConstantLayout {
        let builder = PushConstantLayout::builder();
        match self {
            PipelineVariant::TriangleBasic => PushConstantLayout::empty(),
            PipelineVariant::TriangleBindless => builder
                .index("texture", ResourceKind::SampledImage)
                .build(),
            PipelineVariant::UiOverlay => builder
                .vec4("scale_translate")
                .index("texture", ResourceKind::SampledImage)
                .build(),
            PipelineVariant::StorageCopy => builder
                .index("input_image_binding", ResourceKind::StorageImage)
                .build(),
            PipelineVariant::MeshCombinedSampler => builder
                .mat4("view_projection")
                .mat4("model")
                .index("albedo_texture", ResourceKind::SampledImage)
                .build(),
            PipelineVariant::MeshSplitSampler => builder
                .mat4("view_projection")
                .mat4("model")
                .index("image_sampler", ResourceKind::Sampler)
                .index("albedo_texture", ResourceKind::SampledImage)
                .build(),
            PipelineVariant::MeshStaticIndexed => builder
                .index("view_projection_matrix_index", ResourceKind::Transform)
                .build(),
            PipelineVariant::MeshStaticFixed => builder
                .mat4("view_projection")
                .mat4("model")
                .build(),
        }
    }

    /// Whether the shader indexes its arrays with values that may diverge
    /// within a draw (`nonuniformEXT`)
    ///
    /// `TriangleBasic` only reads a fixed element and `MeshStaticFixed`
    /// declares no arrays.
    pub fn requires_non_uniform_indexing(&self) -> bool {
        !matches!(self, PipelineVariant::TriangleBasic | PipelineVariant::MeshStaticFixed)
    }

    /// Capabilities a device needs to run the variant with non-uniform indexing
    pub fn non_uniform_capabilities(&self) -> DeviceCapabilities {
        self.bindings()
            .iter()
            .fold(DeviceCapabilities::empty(), |caps, binding| {
                caps | DeviceCapabilities::non_uniform_indexing_for(binding.kind)
            })
    }

    /// Capabilities needed by the variant's arrays regardless of indexing mode
    pub fn base_capabilities(&self) -> DeviceCapabilities {
        if self.has_descriptor_arrays() {
            DeviceCapabilities::RUNTIME_DESCRIPTOR_ARRAY | DeviceCapabilities::PARTIALLY_BOUND
        } else {
            DeviceCapabilities::empty()
        }
    }
}

impl fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
