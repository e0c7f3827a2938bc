//! Integration tests for heap ceilings and handle encoding
//!
//! No GPU required.
//!
//! Run with: cargo test --test heap_limits_integration_tests

use bindless_table::bindless::{
    DescriptorTable, Error, GrowthPolicy, Handle, HeadlessBackend, HeapDesc, ResourceKind,
    TableConfig, BINDING_INDEX_MASK, MAX_SLOTS_PER_KIND,
};
use bindless_table::bindless::encoder::{decode_binding_index, PushConstantEncoder, PushValue};
use bindless_table::bindless::pipeline::PipelineVariant;

#[test]
fn test_integration_sampled_image_heap_exhausts_at_65537() {
    let mut config = TableConfig::default();
    config.sampled_images = HeapDesc::new(1024, 65536, GrowthPolicy::Double);
    let table = DescriptorTable::new(config, HeadlessBackend::default()).unwrap();

    for expected in 0..MAX_SLOTS_PER_KIND {
        let handle = table.allocate(ResourceKind::SampledImage).unwrap();
        assert_eq!(u32::from(handle.index()), expected);
    }

    let err = table.allocate(ResourceKind::SampledImage).unwrap_err();
    assert_eq!(err, Error::HeapExhausted { kind: ResourceKind::SampledImage, ceiling: 65536 });
    assert!(!err.is_fatal());

    let stats = table.stats();
    assert_eq!(stats.heap(ResourceKind::SampledImage).capacity, 65536);
    assert_eq!(stats.heap(ResourceKind::SampledImage).live, 65536);

    // Other kinds are unaffected
    assert!(table.allocate(ResourceKind::SampledImage).is_err());
    assert!(table.allocate(ResourceKind::Sampler).is_ok());
}

#[test]
fn test_integration_exhausted_heap_recovers_after_retirement() {
    let mut config = TableConfig::default();
    config.samplers = HeapDesc::new(4, 4, GrowthPolicy::Chunk(64));
    let mut table = DescriptorTable::new(config, HeadlessBackend::new(1)).unwrap();

    let handles: Vec<_> = (0..4).map(|_| table.allocate(ResourceKind::Sampler).unwrap()).collect();
    assert!(matches!(table.allocate(ResourceKind::Sampler), Err(Error::HeapExhausted { .. })));

    table.release(handles[2]).unwrap();
    // Still exhausted until the frame retires
    assert!(matches!(table.allocate(ResourceKind::Sampler), Err(Error::HeapExhausted { .. })));

    table.advance_frame().unwrap();
    let handle = table.allocate(ResourceKind::Sampler).unwrap();
    assert_eq!(handle.index(), handles[2].index());
    assert_eq!(handle.generation(), 1);
}

#[test]
fn test_integration_binding_index_round_trip_full_range() {
    let layout = PipelineVariant::StorageCopy.push_constants();
    let encoder = PushConstantEncoder::new(&layout);

    for index in 0..MAX_SLOTS_PER_KIND {
        let handle = Handle::new(ResourceKind::StorageImage, index as u16, 3);
        assert_eq!(decode_binding_index(handle.binding_index()), index);

        let bytes = encoder.encode(&[PushValue::Handle(handle)]).unwrap();
        assert_eq!(layout.read_index(&bytes, "input_image_binding"), Some(index));
    }
}

#[test]
fn test_integration_packed_handle_decodes_in_shader() {
    for kind in ResourceKind::ALL {
        let handle = Handle::new(kind, 0xBEEF, 0x1ABC);
        let packed = handle.to_bits();

        // Shaders mask the packed value and still find the slot
        assert_eq!(packed & BINDING_INDEX_MASK, 0xBEEF);
        let unpacked = Handle::from_bits(packed).unwrap();
        assert_eq!(unpacked.kind(), kind);
        assert_eq!(unpacked.index(), 0xBEEF);
        assert!(handle.matches_packed(packed));
    }
}
