/// DeferredDestroy - objects kept alive until the GPU is done with them
///
/// An object queued with value `v` may still be read by frames up to `v`.
/// `collect` hands it back once the timeline has completed `v`.

pub(crate) struct DeferredDestroy<T> {
    entries: Vec<(T, u64)>,
}

impl<T> DeferredDestroy<T> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Keep `object` until `value` is completed
    pub fn push(&mut self, object: T, value: u64) {
        self.entries.push((object, value));
    }

    /// Remove and return every object whose value is `<= completed`
    pub fn collect(&mut self, completed: u64) -> Vec<T> {
        let (done, pending): (Vec<_>, Vec<_>) = self.entries
            .drain(..)
            .partition(|(_, value)| *value <= completed);
        self.entries = pending;
        done.into_iter().map(|(object, _)| object).collect()
    }

    /// Remove every object regardless of its value (device idle)
    pub fn drain(&mut self) -> Vec<T> {
        self.entries.drain(..).map(|(object, _)| object).collect()
    }
}

#[cfg(test)]
#[path = "vulkan_deferred_tests.rs"]
mod tests;
