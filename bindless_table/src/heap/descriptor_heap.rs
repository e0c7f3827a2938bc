/// DescriptorHeap - slot array of one resource kind
///
/// Each kind gets its own heap because each kind is its own shader array and
/// churns at its own rate (transforms every frame, samplers almost never).
/// A heap is guarded by a single mutex; there is no lock shared between
/// heaps.
///
/// Slot lifecycle:
///
/// ```text
/// Free --allocate--> Allocated --release--> PendingRelease --recycle--> Free (generation + 1)
///                                                          \-----------> Retired (generation exhausted)
/// ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use rustc_hash::FxHashMap;
use crate::config::HeapDesc;
use crate::error::{Error, Result};
use crate::handle::{Handle, ResourceKind};
use crate::heap::payload::{DescriptorPayload, DescriptorUpdate, DescriptorWrite};
use crate::heap::slot_allocator::SlotAllocator;
use crate::{table_debug, table_error, table_trace, table_warn};

const LOG_SOURCE: &str = "bindless::Heap";

/// Lifecycle state of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// On the free list
    Free,
    /// Owned by an outstanding handle
    Allocated,
    /// Released, waiting for the timeline to retire the frames that used it
    PendingRelease,
    /// Generation space exhausted, never handed out again
    Retired,
}

#[derive(Debug, Clone)]
struct Slot {
    state: SlotState,
    generation: u16,
    payload: Option<DescriptorPayload>,
    /// Current payload has reached the backend
    published: bool,
}

impl Slot {
    fn fresh() -> Self {
        Self {
            state: SlotState::Free,
            generation: 0,
            payload: None,
            published: false,
        }
    }
}

/// Snapshot of one heap's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub kind: ResourceKind,
    /// Slots owned by outstanding handles
    pub live: u32,
    /// Released slots waiting for retirement
    pub pending_release: u32,
    /// Reserved slots
    pub capacity: u32,
    /// Highest index ever handed out + 1
    pub high_water_mark: u32,
    /// Slots removed from circulation after generation exhaustion
    pub retired_slots: u32,
    /// Descriptor updates not yet handed to the backend
    pub pending_writes: u32,
}

struct HeapState {
    allocator: SlotAllocator,
    slots: Vec<Slot>,
    pending_writes: FxHashMap<u16, DescriptorWrite>,
    pending_release: u32,
}

impl HeapState {
    /// Slot addressed by `handle` if it is in `expected` state at the handle's generation
    fn checked_slot(&mut self, handle: Handle, expected: SlotState) -> Result<&mut Slot> {
        match self.slots.get_mut(handle.index() as usize) {
            Some(slot) if slot.generation == handle.generation() && slot.state == expected => Ok(slot),
            Some(slot) => Err(Error::StaleHandle {
                handle,
                current_generation: slot.generation,
            }),
            None => Err(Error::StaleHandle {
                handle,
                current_generation: 0,
            }),
        }
    }

    fn state_of(&self, handle: Handle) -> Option<SlotState> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .map(|slot| slot.state)
    }
}

/// Descriptor heap for one resource kind
pub struct DescriptorHeap {
    kind: ResourceKind,
    state: Mutex<HeapState>,
}

impl DescriptorHeap {
    pub(crate) fn new(kind: ResourceKind, desc: &HeapDesc) -> Self {
        Self {
            kind,
            state: Mutex::new(HeapState {
                allocator: SlotAllocator::new(desc.initial_capacity, desc.ceiling, desc.growth),
                slots: Vec::with_capacity(desc.initial_capacity as usize),
                pending_writes: FxHashMap::default(),
                pending_release: 0,
            }),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Allocate one slot
    ///
    /// Recycled slots are preferred (LIFO); otherwise the heap grows by its
    /// growth policy. Fails with `HeapExhausted` only once the ceiling is
    /// reached and the free list is empty.
    pub fn allocate(&self) -> Result<Handle> {
        let mut state = self.lock()?;
        let capacity_before = state.allocator.capacity();

        let index = match state.allocator.alloc() {
            Some(index) => index,
            None => return Err(self.exhausted(&state)),
        };
        let handle = Self::claim(self.kind, &mut state, index);

        self.log_growth(capacity_before, state.allocator.capacity());
        Ok(handle)
    }

    /// Allocate `count` slots with consecutive indices
    ///
    /// Used for instanced draws where the shader addresses the slot through
    /// the instance index.
    pub fn allocate_contiguous(&self, count: u32) -> Result<Vec<Handle>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut state = self.lock()?;
        let capacity_before = state.allocator.capacity();

        let first = match state.allocator.alloc_contiguous(count) {
            Some(first) => first,
            None => return Err(self.exhausted(&state)),
        };
        let handles = (first..first + count)
            .map(|index| Self::claim(self.kind, &mut state, index))
            .collect();

        self.log_growth(capacity_before, state.allocator.capacity());
        Ok(handles)
    }

    /// Install a payload into an allocated slot
    ///
    /// The update is queued and reaches the GPU with the next publication.
    /// Writing a slot that is pending release is a logic error.
    pub fn write(&self, handle: Handle, payload: DescriptorPayload) -> Result<()> {
        self.check_kind(handle.kind())?;
        self.check_kind(payload.kind())?;

        let result = {
            let mut state = self.lock()?;
            match state.checked_slot(handle, SlotState::Allocated) {
                Ok(slot) => {
                    slot.payload = Some(payload);
                    slot.published = false;
                    state.pending_writes.insert(handle.index(), DescriptorWrite {
                        handle,
                        update: DescriptorUpdate::Set(payload),
                    });
                    Ok(())
                }
                Err(err) => Err((err, state.state_of(handle))),
            }
        };

        result.map_err(|(err, slot_state)| {
            table_error!(LOG_SOURCE, "Write through stale handle: {}", err);
            debug_assert!(
                slot_state != Some(SlotState::PendingRelease),
                "descriptor write to {} after it was released",
                handle
            );
            err
        })
    }

    /// Mark an allocated slot as pending release
    ///
    /// The caller is responsible for queueing the handle for retirement.
    pub(crate) fn release(&self, handle: Handle) -> Result<()> {
        self.check_kind(handle.kind())?;

        let mut state = self.lock()?;
        match state.checked_slot(handle, SlotState::Allocated) {
            Ok(slot) => {
                slot.state = SlotState::PendingRelease;
                state.pending_release += 1;
                Ok(())
            }
            Err(err) => {
                table_error!(LOG_SOURCE, "Release through stale handle: {}", err);
                Err(err)
            }
        }
    }

    /// Return a retired slot to the free list with its generation bumped
    ///
    /// Returns `false` when the slot's generation space is exhausted and it
    /// was removed from circulation instead. A `Clear` update is queued in
    /// both cases.
    pub(crate) fn recycle(&self, handle: Handle) -> Result<bool> {
        let mut state = self.lock()?;
        let slot = state.checked_slot(handle, SlotState::PendingRelease)?;

        slot.payload = None;
        slot.published = false;

        let (cleared, recycled) = match slot.generation.checked_add(1) {
            Some(generation) => {
                slot.generation = generation;
                slot.state = SlotState::Free;
                (Handle::new(handle.kind(), handle.index(), generation), true)
            }
            None => {
                slot.state = SlotState::Retired;
                (handle, false)
            }
        };

        state.pending_release -= 1;
        if recycled {
            state.allocator.free(u32::from(handle.index()));
            table_trace!(LOG_SOURCE, "Recycled {} as generation {}", handle, cleared.generation());
        } else {
            state.allocator.retire(u32::from(handle.index()));
            table_warn!(LOG_SOURCE, "Slot {} exhausted its generations and is retired", handle);
        }
        state.pending_writes.insert(handle.index(), DescriptorWrite {
            handle: cleared,
            update: DescriptorUpdate::Clear,
        });

        Ok(recycled)
    }

    /// Check that a handle may be encoded into a draw
    ///
    /// The slot must be allocated at the handle's generation and its current
    /// payload must be published.
    pub fn is_ready(&self, handle: Handle) -> Result<()> {
        self.check_kind(handle.kind())?;

        let mut state = self.lock()?;
        let slot = state.checked_slot(handle, SlotState::Allocated)?;
        if slot.published {
            Ok(())
        } else {
            Err(Error::SlotNotReady(handle))
        }
    }

    /// Payload currently installed in a live slot
    pub fn payload(&self, handle: Handle) -> Result<Option<DescriptorPayload>> {
        self.check_kind(handle.kind())?;

        let mut state = self.lock()?;
        Ok(state.checked_slot(handle, SlotState::Allocated)?.payload)
    }

    /// Drain the queued descriptor updates, ordered by array element
    pub(crate) fn take_pending_writes(&self) -> Result<Vec<DescriptorWrite>> {
        let mut state = self.lock()?;
        let mut writes: Vec<DescriptorWrite> = state.pending_writes.drain().map(|(_, w)| w).collect();
        writes.sort_unstable_by_key(|write| write.handle.index());
        Ok(writes)
    }

    /// Put back updates the backend failed to apply (newer updates win)
    pub(crate) fn restore_pending_writes(&self, writes: &[DescriptorWrite]) -> Result<()> {
        let mut state = self.lock()?;
        for write in writes {
            state.pending_writes.entry(write.handle.index()).or_insert(*write);
        }
        Ok(())
    }

    /// Flag slots whose update reached the backend
    ///
    /// A slot is skipped if it changed after `writes` were taken.
    pub(crate) fn mark_published(&self, writes: &[DescriptorWrite]) -> Result<()> {
        let mut state = self.lock()?;
        for write in writes {
            if !matches!(write.update, DescriptorUpdate::Set(_)) {
                continue;
            }
            if state.pending_writes.contains_key(&write.handle.index()) {
                continue;
            }
            if let Ok(slot) = state.checked_slot(write.handle, SlotState::Allocated) {
                slot.published = true;
            }
        }
        Ok(())
    }

    /// Handles of every allocated slot
    pub fn live_handles(&self) -> Vec<Handle> {
        let state = self.lock_unchecked();
        state
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.state == SlotState::Allocated)
            .map(|(index, slot)| Handle::new(self.kind, index as u16, slot.generation))
            .collect()
    }

    /// State and generation of a slot index, `None` if never handed out
    pub fn slot_state(&self, index: u16) -> Option<(SlotState, u16)> {
        let state = self.lock_unchecked();
        state
            .slots
            .get(index as usize)
            .map(|slot| (slot.state, slot.generation))
    }

    pub fn stats(&self) -> HeapStats {
        let state = self.lock_unchecked();
        HeapStats {
            kind: self.kind,
            live: state.allocator.len() - state.pending_release,
            pending_release: state.pending_release,
            capacity: state.allocator.capacity(),
            high_water_mark: state.allocator.high_water_mark(),
            retired_slots: state.allocator.retired(),
            pending_writes: state.pending_writes.len() as u32,
        }
    }

    // ===== INTERNAL =====

    fn claim(kind: ResourceKind, state: &mut HeapState, index: u32) -> Handle {
        let position = index as usize;
        if position >= state.slots.len() {
            state.slots.resize_with(position + 1, Slot::fresh);
        }
        let slot = &mut state.slots[position];
        debug_assert_eq!(slot.state, SlotState::Free, "allocator handed out a busy slot");
        slot.state = SlotState::Allocated;
        slot.payload = None;
        slot.published = false;
        Handle::new(kind, index as u16, slot.generation)
    }

    fn exhausted(&self, state: &HeapState) -> Error {
        let ceiling = state.allocator.ceiling();
        table_warn!(LOG_SOURCE, "{} heap exhausted at its ceiling of {} slots", self.kind, ceiling);
        Error::HeapExhausted { kind: self.kind, ceiling }
    }

    fn log_growth(&self, before: u32, after: u32) {
        if after != before {
            table_debug!(LOG_SOURCE, "{} heap grew from {} to {} slots", self.kind, before, after);
        }
    }

    fn check_kind(&self, found: ResourceKind) -> Result<()> {
        if found == self.kind {
            Ok(())
        } else {
            Err(Error::KindMismatch { expected: self.kind, found })
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HeapState>> {
        self.state
            .lock()
            .map_err(|_| crate::table_err!(LOG_SOURCE, "{} heap lock poisoned", self.kind))
    }

    /// Read-only access for counters, tolerating a poisoned lock
    fn lock_unchecked(&self) -> MutexGuard<'_, HeapState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "descriptor_heap_tests.rs"]
mod tests;
