/// RetirementQueue - released handles waiting for the GPU to catch up
///
/// Any thread may enqueue. Draining is reserved to the table owner and only
/// happens inside `DescriptorTable::advance_frame`, which takes `&mut self`.

use std::sync::Mutex;
use crate::error::Result;
use crate::handle::Handle;

/// One released handle and the timeline value that must retire before reuse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retirement {
    pub handle: Handle,
    /// Submission value current when the handle was released
    pub value: u64,
}

/// Queue of pending releases, shared by every heap
pub struct RetirementQueue {
    entries: Mutex<Vec<Retirement>>,
}

impl RetirementQueue {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Queue `handle` until `value` is retired
    pub fn enqueue(&self, handle: Handle, value: u64) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| {
            crate::table_err!("bindless::Timeline", "retirement queue lock poisoned")
        })?;
        entries.push(Retirement { handle, value });
        Ok(())
    }

    /// Remove and return every entry whose value is `<= retired`, oldest first
    ///
    /// Entries are not required to arrive in value order (a worker may
    /// enqueue with a value read just before the owner advanced).
    pub(crate) fn drain_retired(&self, retired: u64) -> Result<Vec<Retirement>> {
        let mut entries = self.entries.lock().map_err(|_| {
            crate::table_err!("bindless::Timeline", "retirement queue lock poisoned")
        })?;

        let (ready, waiting): (Vec<Retirement>, Vec<Retirement>) =
            entries.drain(..).partition(|entry| entry.value <= retired);
        *entries = waiting;
        Ok(ready)
    }

    /// Remove every entry regardless of its value (device idle or lost)
    pub(crate) fn drain_all(&self) -> Result<Vec<Retirement>> {
        self.drain_retired(u64::MAX)
    }

    /// Number of handles waiting for retirement
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest value any queued entry waits for
    pub fn oldest_value(&self) -> Option<u64> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.iter().map(|entry| entry.value).min())
    }
}

impl Default for RetirementQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "retirement_queue_tests.rs"]
mod tests;
