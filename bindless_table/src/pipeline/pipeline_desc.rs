/// Pipeline descriptions and build-time validation
///
/// Capability mismatches are configuration errors. They are reported when
/// the pipeline is built, before any frame records a draw with it.

use crate::encoder::PushConstantLayout;
use crate::error::{Error, Result};
use crate::pipeline::{BindingDesc, DeviceCapabilities, PipelineVariant};

/// What the caller asks for when building a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineDesc {
    pub variant: PipelineVariant,
    /// Compile the shader with `nonuniformEXT` array indexing
    pub non_uniform_indexing: bool,
    /// Resource indices vary per instance inside one draw
    pub per_instance_resources: bool,
}

impl PipelineDesc {
    /// Description with the variant's default indexing mode
    pub fn new(variant: PipelineVariant) -> Self {
        Self {
            variant,
            non_uniform_indexing: variant.requires_non_uniform_indexing(),
            per_instance_resources: false,
        }
    }

    pub fn with_non_uniform_indexing(mut self, enabled: bool) -> Self {
        self.non_uniform_indexing = enabled;
        self
    }

    pub fn with_per_instance_resources(mut self, enabled: bool) -> Self {
        self.per_instance_resources = enabled;
        self
    }
}

/// Layout a backend turns into its native pipeline layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayoutDesc {
    pub variant: PipelineVariant,
    pub bindings: Vec<BindingDesc>,
    pub push_constants: PushConstantLayout,
    pub non_uniform_indexing: bool,
}

impl PipelineVariant {
    /// Layout descriptor of the variant in its default indexing mode
    pub fn layout(&self) -> PipelineLayoutDesc {
        PipelineLayoutDesc {
            variant: *self,
            bindings: self.bindings().to_vec(),
            push_constants: self.push_constants(),
            non_uniform_indexing: self.requires_non_uniform_indexing(),
        }
    }
}

/// Validated pipeline, ready to encode draws
#[derive(Debug, Clone)]
pub struct Pipeline {
    desc: PipelineDesc,
    layout: PipelineLayoutDesc,
    backend_layout: u64,
}

impl Pipeline {
    pub(crate) fn new(desc: PipelineDesc, layout: PipelineLayoutDesc, backend_layout: u64) -> Self {
        Self { desc, layout, backend_layout }
    }

    pub fn variant(&self) -> PipelineVariant {
        self.desc.variant
    }

    pub fn desc(&self) -> &PipelineDesc {
        &self.desc
    }

    pub fn layout(&self) -> &PipelineLayoutDesc {
        &self.layout
    }

    pub fn push_constants(&self) -> &PushConstantLayout {
        &self.layout.push_constants
    }

    /// Backend object backing the layout (`VkPipelineLayout` for Vulkan)
    pub fn backend_layout(&self) -> u64 {
        self.backend_layout
    }
}

/// Check a description against the device and produce its layout
///
/// # Errors
///
/// `InvalidPipelineConfiguration` when:
/// - the variant needs non-uniform indexing and it is disabled
/// - per-instance resources are requested without non-uniform indexing
/// - per-instance resources are requested on a variant without arrays
/// - the device lacks a capability the enabled mode needs
pub fn validate_pipeline(desc: &PipelineDesc, capabilities: DeviceCapabilities) -> Result<PipelineLayoutDesc> {
    let variant = desc.variant;

    if variant.requires_non_uniform_indexing() && !desc.non_uniform_indexing {
        return Err(Error::InvalidPipelineConfiguration(format!(
            "{} indexes its descriptor arrays dynamically and needs non-uniform indexing enabled",
            variant
        )));
    }

    if desc.per_instance_resources {
        if !variant.has_descriptor_arrays() {
            return Err(Error::InvalidPipelineConfiguration(format!(
                "{} declares no descriptor arrays, per-instance resources are impossible",
                variant
            )));
        }
        if !desc.non_uniform_indexing {
            return Err(Error::InvalidPipelineConfiguration(format!(
                "{} selects resources per instance and needs non-uniform indexing enabled",
                variant
            )));
        }
    }

    let mut required = variant.base_capabilities();
    if desc.non_uniform_indexing {
        required |= variant.non_uniform_capabilities();
    }
    let missing = required.difference(capabilities);
    if !missing.is_empty() {
        return Err(Error::InvalidPipelineConfiguration(format!(
            "{} needs device capabilities the device does not report: {:?}",
            variant, missing
        )));
    }

    Ok(PipelineLayoutDesc {
        non_uniform_indexing: desc.non_uniform_indexing,
        ..variant.layout()
    })
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
