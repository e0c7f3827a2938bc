//! Unit tests for pipeline variants and validation

use super::*;
use crate::handle::ResourceKind;
use crate::pipeline::DescriptorType;

// ============================================================================
// VARIANT CONTRACTS
// ============================================================================

#[test]
fn test_push_constant_sizes_per_variant() {
    let sizes: Vec<(PipelineVariant, u32)> = PipelineVariant::ALL
        .iter()
        .map(|v| (*v, v.push_constants().size()))
        .collect();

    assert_eq!(sizes, vec![
        (PipelineVariant::TriangleBasic, 0),
        (PipelineVariant::TriangleBindless, 4),
        (PipelineVariant::UiOverlay, 20),
        (PipelineVariant::StorageCopy, 4),
        (PipelineVariant::MeshCombinedSampler, 132),
        (PipelineVariant::MeshSplitSampler, 136),
        (PipelineVariant::MeshStaticIndexed, 4),
        (PipelineVariant::MeshStaticFixed, 128),
    ]);
}

#[test]
fn test_mesh_split_sampler_offsets() {
    let layout = PipelineVariant::MeshSplitSampler.push_constants();
    let offsets: Vec<(&str, u32)> = layout.fields().iter().map(|f| (f.name, f.offset)).collect();
    assert_eq!(offsets, vec![
        ("view_projection", 0),
        ("model", 64),
        ("image_sampler", 128),
        ("albedo_texture", 132),
    ]);
}

#[test]
fn test_ui_overlay_offsets() {
    let layout = PipelineVariant::UiOverlay.push_constants();
    assert_eq!(layout.field("scale_translate").unwrap().offset, 0);
    assert_eq!(layout.field("texture").unwrap().offset, 16);
}

#[test]
fn test_bindings_per_variant() {
    let split = PipelineVariant::TriangleBindless.bindings();
    assert_eq!(split.len(), 2);
    assert_eq!((split[0].binding, split[0].descriptor_type), (2, DescriptorType::SampledImage));
    assert_eq!((split[1].binding, split[1].descriptor_type), (3, DescriptorType::Sampler));

    let copy = PipelineVariant::StorageCopy.bindings();
    assert_eq!((copy[0].binding, copy[0].kind, copy[0].read_only), (1, ResourceKind::StorageImage, true));

    let combined = PipelineVariant::MeshCombinedSampler.bindings();
    assert_eq!(combined[0].descriptor_type, DescriptorType::CombinedImageSampler);
    assert_eq!(combined[0].kind, ResourceKind::SampledImage);

    let matrices = PipelineVariant::MeshStaticIndexed.bindings();
    assert_eq!((matrices[0].binding, matrices[0].kind), (0, ResourceKind::Transform));

    assert!(!PipelineVariant::MeshStaticFixed.has_descriptor_arrays());
    assert!(PipelineVariant::ALL.iter().all(|v| v.bindings().iter().all(|b| b.set == 0)));
}

#[test]
fn test_non_uniform_requirement() {
    let requiring: Vec<PipelineVariant> = PipelineVariant::ALL
        .iter()
        .copied()
        .filter(|v| v.requires_non_uniform_indexing())
        .collect();
    assert_eq!(requiring.len(), 6);
    assert!(!PipelineVariant::TriangleBasic.requires_non_uniform_indexing());
    assert!(!PipelineVariant::MeshStaticFixed.requires_non_uniform_indexing());
}

#[test]
fn test_non_uniform_capabilities() {
    assert_eq!(
        PipelineVariant::StorageCopy.non_uniform_capabilities(),
        DeviceCapabilities::STORAGE_IMAGE_NON_UNIFORM_INDEXING
    );
    assert_eq!(
        PipelineVariant::MeshStaticIndexed.non_uniform_capabilities(),
        DeviceCapabilities::STORAGE_BUFFER_NON_UNIFORM_INDEXING
    );
    assert!(PipelineVariant::MeshStaticFixed.non_uniform_capabilities().is_empty());
}

// ============================================================================
// VALIDATION
// ============================================================================

#[test]
fn test_default_desc_validates_on_bindless_device() {
    for variant in PipelineVariant::ALL {
        let layout = validate_pipeline(&PipelineDesc::new(variant), DeviceCapabilities::BINDLESS).unwrap();
        assert_eq!(layout.variant, variant);
        assert_eq!(layout.push_constants, variant.push_constants());
        assert_eq!(layout.bindings.len(), variant.bindings().len());
    }
}

#[test]
fn test_default_layout_matches_validated_layout() {
    for variant in PipelineVariant::ALL {
        let validated = validate_pipeline(&PipelineDesc::new(variant), DeviceCapabilities::BINDLESS).unwrap();
        assert_eq!(variant.layout(), validated);
    }
    assert!(!PipelineVariant::MeshStaticFixed.layout().non_uniform_indexing);
    assert!(PipelineVariant::MeshStaticIndexed.layout().non_uniform_indexing);
}

#[test]
fn test_missing_non_uniform_indexing_rejected() {
    let desc = PipelineDesc::new(PipelineVariant::MeshSplitSampler).with_non_uniform_indexing(false);
    let err = validate_pipeline(&desc, DeviceCapabilities::BINDLESS).unwrap_err();
    assert!(matches!(err, Error::InvalidPipelineConfiguration(_)));
}

#[test]
fn test_per_instance_without_dynamic_indexing_rejected() {
    // TriangleBasic is fine with uniform indexing until it selects images per instance
    let desc = PipelineDesc::new(PipelineVariant::TriangleBasic);
    assert!(validate_pipeline(&desc, DeviceCapabilities::BINDLESS).is_ok());

    let desc = desc.with_per_instance_resources(true);
    let err = validate_pipeline(&desc, DeviceCapabilities::BINDLESS).unwrap_err();
    match err {
        Error::InvalidPipelineConfiguration(msg) => assert!(msg.contains("per instance")),
        other => panic!("unexpected error: {:?}", other),
    }

    let desc = desc.with_non_uniform_indexing(true);
    assert!(validate_pipeline(&desc, DeviceCapabilities::BINDLESS).is_ok());
}

#[test]
fn test_per_instance_without_arrays_rejected() {
    let desc = PipelineDesc::new(PipelineVariant::MeshStaticFixed)
        .with_non_uniform_indexing(true)
        .with_per_instance_resources(true);
    assert!(matches!(
        validate_pipeline(&desc, DeviceCapabilities::BINDLESS),
        Err(Error::InvalidPipelineConfiguration(_))
    ));
}

#[test]
fn test_device_without_capability_rejected() {
    let caps = DeviceCapabilities::BINDLESS - DeviceCapabilities::STORAGE_IMAGE_NON_UNIFORM_INDEXING;

    let copy = PipelineDesc::new(PipelineVariant::StorageCopy);
    assert!(matches!(validate_pipeline(&copy, caps), Err(Error::InvalidPipelineConfiguration(_))));

    // Variants that never index storage images are unaffected
    let ui = PipelineDesc::new(PipelineVariant::UiOverlay);
    assert!(validate_pipeline(&ui, caps).is_ok());
}

#[test]
fn test_device_without_arrays_only_runs_fixed_variant() {
    let caps = DeviceCapabilities::empty();
    assert!(validate_pipeline(&PipelineDesc::new(PipelineVariant::MeshStaticFixed), caps).is_ok());
    assert!(validate_pipeline(&PipelineDesc::new(PipelineVariant::TriangleBasic), caps).is_err());
}
