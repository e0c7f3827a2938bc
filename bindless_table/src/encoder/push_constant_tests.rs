use super::*;

fn ui_layout() -> PushConstantLayout {
    PushConstantLayout::builder()
        .vec4("scale_translate")
        .index("texture", ResourceKind::SampledImage)
        .build()
}

// ============================================================================
// Layout builder
// ============================================================================

#[test]
fn test_empty_layout() {
    let layout = PushConstantLayout::empty();
    assert!(layout.is_empty());
    assert_eq!(layout.size(), 0);
    assert_eq!(PushConstantEncoder::new(&layout).encode(&[]).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_offsets_follow_alignment() {
    let layout = PushConstantLayout::builder()
        .index("a", ResourceKind::Sampler)
        .mat4("m")
        .index("b", ResourceKind::SampledImage)
        .vec4("v")
        .build();

    let offsets: Vec<u32> = layout.fields().iter().map(|f| f.offset).collect();
    assert_eq!(offsets, vec![0, 16, 80, 96]);
    assert_eq!(layout.size(), 112);
}

#[test]
fn test_appending_never_moves_fields() {
    let base = PushConstantLayout::builder()
        .mat4("view_projection")
        .mat4("model")
        .index("image_sampler", ResourceKind::Sampler);
    let before = base.build();

    let after = PushConstantLayout::builder()
        .mat4("view_projection")
        .mat4("model")
        .index("image_sampler", ResourceKind::Sampler)
        .index("albedo_texture", ResourceKind::SampledImage)
        .build();

    assert_eq!(&after.fields()[..3], before.fields());
    assert_eq!(after.field("albedo_texture").unwrap().offset, 132);
    assert_eq!(after.size(), 136);
}

// ============================================================================
// Encoding
// ============================================================================

#[test]
fn test_encode_ui_overlay_bytes() {
    let layout = ui_layout();
    let handle = Handle::new(ResourceKind::SampledImage, 0x1234, 7);
    let bytes = PushConstantEncoder::new(&layout)
        .encode(&[
            PushValue::Vec4(Vec4::new(1.0, 2.0, 3.0, 4.0)),
            PushValue::Handle(handle),
        ])
        .unwrap();

    assert_eq!(bytes.len(), 20);
    let floats: [f32; 4] = bytemuck::pod_read_unaligned(&bytes[0..16]);
    assert_eq!(floats, [1.0, 2.0, 3.0, 4.0]);
    assert_eq!(layout.read_index(&bytes, "texture"), Some(0x1234));
}

#[test]
fn test_encode_matrix_is_column_major() {
    let layout = PushConstantLayout::builder().mat4("model").build();
    let model = Mat4::from_translation(glam::Vec3::new(5.0, 6.0, 7.0));
    let bytes = PushConstantEncoder::new(&layout).encode(&[PushValue::Mat4(model)]).unwrap();

    let floats: [f32; 16] = bytemuck::pod_read_unaligned(&bytes);
    // Translation lives in the fourth column
    assert_eq!(&floats[12..15], &[5.0, 6.0, 7.0]);
}

#[test]
fn test_encode_rejects_wrong_count() {
    let layout = ui_layout();
    let err = PushConstantEncoder::new(&layout)
        .encode(&[PushValue::Vec4(Vec4::ONE)])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPipelineConfiguration(_)));
}

#[test]
fn test_encode_rejects_wrong_value_type() {
    let layout = ui_layout();
    let err = PushConstantEncoder::new(&layout)
        .encode(&[PushValue::Mat4(Mat4::IDENTITY), PushValue::Vec4(Vec4::ONE)])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPipelineConfiguration(_)));
}

#[test]
fn test_encode_rejects_wrong_handle_kind() {
    let layout = ui_layout();
    let sampler = Handle::new(ResourceKind::Sampler, 1, 0);
    let err = PushConstantEncoder::new(&layout)
        .encode(&[PushValue::Vec4(Vec4::ONE), PushValue::Handle(sampler)])
        .unwrap_err();
    assert_eq!(err, Error::KindMismatch {
        expected: ResourceKind::SampledImage,
        found: ResourceKind::Sampler,
    });
}

#[test]
fn test_index_round_trip_through_shader_mask() {
    let layout = PushConstantLayout::builder()
        .index("input_image", ResourceKind::StorageImage)
        .build();
    let encoder = PushConstantEncoder::new(&layout);

    for index in [0u16, 1, 255, 256, 4095, 32768, 65534, u16::MAX] {
        let handle = Handle::new(ResourceKind::StorageImage, index, 9);
        let bytes = encoder.encode(&[PushValue::Handle(handle)]).unwrap();
        assert_eq!(layout.read_index(&bytes, "input_image"), Some(u32::from(index)));
    }
}

#[test]
fn test_read_index_rejects_non_index_field() {
    let layout = ui_layout();
    let bytes = vec![0u8; 20];
    assert_eq!(layout.read_index(&bytes, "scale_translate"), None);
    assert_eq!(layout.read_index(&bytes, "missing"), None);
    assert_eq!(layout.read_index(&bytes[..10], "texture"), None);
}
