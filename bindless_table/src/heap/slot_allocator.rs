use crate::config::GrowthPolicy;

/// Allocates and recycles `u32` slot indices for one descriptor heap.
///
/// Freed indices are recycled LIFO. Fresh indices are handed out in
/// increasing order; when the reserved capacity is used up it grows by the
/// heap's `GrowthPolicy`, never beyond the ceiling. Indices are never
/// renumbered.
///
/// # Example
///
/// ```ignore
/// let mut alloc = SlotAllocator::new(2, 4, GrowthPolicy::Double);
/// let a = alloc.alloc();  // Some(0)
/// let b = alloc.alloc();  // Some(1)
/// alloc.free(0);           // 0 is now available
/// let c = alloc.alloc();  // Some(0) (recycled)
/// ```
pub(crate) struct SlotAllocator {
    free_list: Vec<u32>,
    next_id: u32,
    len: u32,
    capacity: u32,
    ceiling: u32,
    growth: GrowthPolicy,
    retired: u32,
}

impl SlotAllocator {
    /// Create an allocator with `capacity` reserved slots
    pub(crate) fn new(capacity: u32, ceiling: u32, growth: GrowthPolicy) -> Self {
        Self {
            free_list: Vec::new(),
            next_id: 0,
            len: 0,
            capacity: capacity.min(ceiling),
            ceiling,
            growth,
            retired: 0,
        }
    }

    /// Allocate the next available slot index, `None` once the ceiling is reached
    pub(crate) fn alloc(&mut self) -> Option<u32> {
        if let Some(id) = self.free_list.pop() {
            self.len += 1;
            return Some(id);
        }
        let id = self.alloc_fresh(1)?;
        self.len += 1;
        Some(id)
    }

    /// Allocate `count` consecutive indices and return the first one
    ///
    /// A run of recycled indices is preferred; otherwise the run is taken
    /// from fresh indices at the top of the heap.
    pub(crate) fn alloc_contiguous(&mut self, count: u32) -> Option<u32> {
        debug_assert!(count > 0, "empty contiguous allocation");
        if count == 1 {
            return self.alloc();
        }

        if let Some(first) = self.find_free_run(count) {
            let end = first + count;
            self.free_list.retain(|id| *id < first || *id >= end);
            self.len += count;
            return Some(first);
        }

        let first = self.alloc_fresh(count)?;
        self.len += count;
        Some(first)
    }

    /// Return a slot index to the pool for reuse
    pub(crate) fn free(&mut self, id: u32) {
        debug_assert!(id < self.next_id, "freeing an unallocated slot: {}", id);
        self.len -= 1;
        self.free_list.push(id);
    }

    /// Remove a slot from circulation for good
    pub(crate) fn retire(&mut self, id: u32) {
        debug_assert!(id < self.next_id, "retiring an unallocated slot: {}", id);
        self.len -= 1;
        self.retired += 1;
    }

    /// Highest index ever allocated + 1
    pub(crate) fn high_water_mark(&self) -> u32 {
        self.next_id
    }

    /// Reserved slots (monotonic, never above the ceiling)
    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    pub(crate) fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Number of slots not on the free list (live or pending release)
    pub(crate) fn len(&self) -> u32 {
        self.len
    }

    /// Slots permanently removed after generation exhaustion
    pub(crate) fn retired(&self) -> u32 {
        self.retired
    }

    fn alloc_fresh(&mut self, count: u32) -> Option<u32> {
        let end = self.next_id.checked_add(count)?;
        if end > self.ceiling {
            return None;
        }
        while self.capacity < end {
            self.capacity = self.growth.grow(self.capacity, self.ceiling);
        }
        let first = self.next_id;
        self.next_id = end;
        Some(first)
    }

    fn find_free_run(&self, count: u32) -> Option<u32> {
        if (self.free_list.len() as u32) < count {
            return None;
        }
        let mut sorted = self.free_list.clone();
        sorted.sort_unstable();

        // Sorted and unique: a window is a run iff its span equals its length
        sorted
            .windows(count as usize)
            .find(|window| window[window.len() - 1] - window[0] == count - 1)
            .map(|window| window[0])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "slot_allocator_tests.rs"]
mod tests;
