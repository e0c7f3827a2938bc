use super::*;
use crate::config::GrowthPolicy;
use glam::Mat4;

fn sampler_heap(initial: u32, ceiling: u32) -> DescriptorHeap {
    DescriptorHeap::new(
        ResourceKind::Sampler,
        &HeapDesc::new(initial, ceiling, GrowthPolicy::Double),
    )
}

fn sampler(id: u64) -> DescriptorPayload {
    DescriptorPayload::Sampler { sampler: id }
}

/// Release + recycle in one step (the table does this through the retirement queue)
fn cycle(heap: &DescriptorHeap, handle: Handle) -> bool {
    heap.release(handle).unwrap();
    heap.recycle(handle).unwrap()
}

fn publish(heap: &DescriptorHeap) -> Vec<DescriptorWrite> {
    let writes = heap.take_pending_writes().unwrap();
    heap.mark_published(&writes).unwrap();
    writes
}

// ============================================================================
// Allocation
// ============================================================================

#[test]
fn test_allocate_starts_at_generation_zero() {
    let heap = sampler_heap(4, 16);
    let a = heap.allocate().unwrap();
    let b = heap.allocate().unwrap();

    assert_eq!((a.index(), a.generation(), a.kind()), (0, 0, ResourceKind::Sampler));
    assert_eq!((b.index(), b.generation()), (1, 0));
    assert_eq!(heap.slot_state(0), Some((SlotState::Allocated, 0)));
    assert_eq!(heap.slot_state(7), None);
}

#[test]
fn test_allocate_grows_without_renumbering() {
    let heap = sampler_heap(2, 64);
    let handles: Vec<Handle> = (0..10).map(|_| heap.allocate().unwrap()).collect();

    for (i, handle) in handles.iter().enumerate() {
        assert_eq!(handle.index() as usize, i);
        heap.write(*handle, sampler(i as u64)).unwrap();
    }
    assert_eq!(heap.stats().capacity, 16);
    // Earlier payloads survived growth
    assert_eq!(heap.payload(handles[1]).unwrap(), Some(sampler(1)));
}

#[test]
fn test_allocate_exhausted_at_ceiling() {
    let heap = sampler_heap(2, 3);
    for _ in 0..3 {
        heap.allocate().unwrap();
    }
    let err = heap.allocate().unwrap_err();
    assert_eq!(err, Error::HeapExhausted { kind: ResourceKind::Sampler, ceiling: 3 });
    assert_eq!(heap.stats().capacity, 3);
}

#[test]
fn test_allocate_contiguous_indices() {
    let heap = DescriptorHeap::new(
        ResourceKind::Transform,
        &HeapDesc::new(4, 64, GrowthPolicy::Double),
    );
    heap.allocate().unwrap();
    let run = heap.allocate_contiguous(6).unwrap();

    let indices: Vec<u16> = run.iter().map(|h| h.index()).collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5, 6]);
    assert!(heap.allocate_contiguous(0).unwrap().is_empty());
}

// ============================================================================
// Writes and publication
// ============================================================================

#[test]
fn test_write_rejects_wrong_payload_kind() {
    let heap = sampler_heap(4, 16);
    let handle = heap.allocate().unwrap();

    let err = heap
        .write(handle, DescriptorPayload::StorageImage { image_view: 9 })
        .unwrap_err();
    assert_eq!(err, Error::KindMismatch {
        expected: ResourceKind::Sampler,
        found: ResourceKind::StorageImage,
    });
}

#[test]
fn test_write_rejects_foreign_handle() {
    let heap = sampler_heap(4, 16);
    heap.allocate().unwrap();
    let foreign = Handle::new(ResourceKind::Transform, 0, 0);

    let err = heap.write(foreign, sampler(1)).unwrap_err();
    assert!(matches!(err, Error::KindMismatch { found: ResourceKind::Transform, .. }));
}

#[test]
fn test_slot_not_ready_until_published() {
    let heap = sampler_heap(4, 16);
    let handle = heap.allocate().unwrap();
    assert_eq!(heap.is_ready(handle), Err(Error::SlotNotReady(handle)));

    heap.write(handle, sampler(5)).unwrap();
    assert_eq!(heap.is_ready(handle), Err(Error::SlotNotReady(handle)));

    let writes = publish(&heap);
    assert_eq!(writes.len(), 1);
    assert_eq!(heap.is_ready(handle), Ok(()));

    // A new payload must be published again
    heap.write(handle, sampler(6)).unwrap();
    assert_eq!(heap.is_ready(handle), Err(Error::SlotNotReady(handle)));
}

#[test]
fn test_pending_writes_last_write_wins() {
    let heap = sampler_heap(4, 16);
    let a = heap.allocate().unwrap();
    let b = heap.allocate().unwrap();
    heap.write(b, sampler(1)).unwrap();
    heap.write(a, sampler(2)).unwrap();
    heap.write(b, sampler(3)).unwrap();

    assert_eq!(heap.stats().pending_writes, 2);
    let writes = heap.take_pending_writes().unwrap();
    assert_eq!(writes, vec![
        DescriptorWrite { handle: a, update: DescriptorUpdate::Set(sampler(2)) },
        DescriptorWrite { handle: b, update: DescriptorUpdate::Set(sampler(3)) },
    ]);
    assert!(heap.take_pending_writes().unwrap().is_empty());
}

#[test]
fn test_mark_published_skips_slots_written_again() {
    let heap = sampler_heap(4, 16);
    let handle = heap.allocate().unwrap();
    heap.write(handle, sampler(1)).unwrap();

    let writes = heap.take_pending_writes().unwrap();
    // Written again while the batch is in flight
    heap.write(handle, sampler(2)).unwrap();
    heap.mark_published(&writes).unwrap();

    assert_eq!(heap.is_ready(handle), Err(Error::SlotNotReady(handle)));
    publish(&heap);
    assert_eq!(heap.is_ready(handle), Ok(()));
}

#[test]
fn test_restore_pending_writes_keeps_newer_update() {
    let heap = sampler_heap(4, 16);
    let a = heap.allocate().unwrap();
    let b = heap.allocate().unwrap();
    heap.write(a, sampler(1)).unwrap();
    heap.write(b, sampler(1)).unwrap();

    let failed = heap.take_pending_writes().unwrap();
    heap.write(b, sampler(9)).unwrap();
    heap.restore_pending_writes(&failed).unwrap();

    let writes = heap.take_pending_writes().unwrap();
    assert_eq!(writes[0].update, DescriptorUpdate::Set(sampler(1)));
    assert_eq!(writes[1].update, DescriptorUpdate::Set(sampler(9)));
}

// ============================================================================
// Release and recycle
// ============================================================================

#[test]
fn test_double_release_is_stale() {
    let heap = sampler_heap(4, 16);
    let handle = heap.allocate().unwrap();
    heap.release(handle).unwrap();

    let err = heap.release(handle).unwrap_err();
    assert_eq!(err, Error::StaleHandle { handle, current_generation: 0 });
    assert_eq!(heap.stats().pending_release, 1);
}

#[test]
fn test_recycle_bumps_generation() {
    let heap = sampler_heap(4, 16);
    let old = heap.allocate().unwrap();
    assert!(cycle(&heap, old));
    assert_eq!(heap.slot_state(0), Some((SlotState::Free, 1)));

    let new = heap.allocate().unwrap();
    assert_eq!(new.index(), old.index());
    assert_eq!(new.generation(), 1);

    // The old handle can no longer touch the slot
    let err = heap.write(old, sampler(3)).unwrap_err();
    assert_eq!(err, Error::StaleHandle { handle: old, current_generation: 1 });
    assert!(matches!(heap.release(old), Err(Error::StaleHandle { .. })));
    assert!(matches!(heap.is_ready(old), Err(Error::StaleHandle { .. })));
}

#[test]
fn test_recycle_queues_clear() {
    let heap = sampler_heap(4, 16);
    let handle = heap.allocate().unwrap();
    heap.write(handle, sampler(4)).unwrap();
    publish(&heap);

    cycle(&heap, handle);
    let writes = heap.take_pending_writes().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].update, DescriptorUpdate::Clear);
    assert_eq!(writes[0].handle.generation(), 1);
}

#[test]
fn test_recycle_requires_pending_release() {
    let heap = sampler_heap(4, 16);
    let handle = heap.allocate().unwrap();
    assert!(matches!(heap.recycle(handle), Err(Error::StaleHandle { .. })));
}

#[test]
fn test_generation_exhaustion_retires_slot() {
    let heap = sampler_heap(1, 2);
    let mut handle = heap.allocate().unwrap();
    while handle.generation() < u16::MAX {
        assert!(cycle(&heap, handle));
        handle = heap.allocate().unwrap();
        assert_eq!(handle.index(), 0);
    }

    // The last generation is never followed by a wrap to zero
    assert!(!cycle(&heap, handle));
    assert_eq!(heap.slot_state(0), Some((SlotState::Retired, u16::MAX)));
    assert_eq!(heap.stats().retired_slots, 1);

    let next = heap.allocate().unwrap();
    assert_eq!(next.index(), 1);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "after it was released")]
fn test_write_pending_release_asserts_in_debug() {
    let heap = sampler_heap(4, 16);
    let handle = heap.allocate().unwrap();
    heap.release(handle).unwrap();
    let _ = heap.write(handle, sampler(1));
}

#[test]
#[cfg(not(debug_assertions))]
fn test_write_pending_release_is_stale_in_release() {
    let heap = sampler_heap(4, 16);
    let handle = heap.allocate().unwrap();
    heap.release(handle).unwrap();
    assert!(matches!(heap.write(handle, sampler(1)), Err(Error::StaleHandle { .. })));
}

// ============================================================================
// Stats
// ============================================================================

#[test]
fn test_stats_and_live_handles() {
    let heap = DescriptorHeap::new(
        ResourceKind::Transform,
        &HeapDesc::new(8, 64, GrowthPolicy::Double),
    );
    let a = heap.allocate().unwrap();
    let b = heap.allocate().unwrap();
    let c = heap.allocate().unwrap();
    heap.write(b, DescriptorPayload::Transform(Mat4::IDENTITY)).unwrap();
    heap.release(c).unwrap();

    let stats = heap.stats();
    assert_eq!(stats.kind, ResourceKind::Transform);
    assert_eq!(stats.live, 2);
    assert_eq!(stats.pending_release, 1);
    assert_eq!(stats.high_water_mark, 3);
    assert_eq!(stats.pending_writes, 1);
    assert_eq!(heap.live_handles(), vec![a, b]);
}
