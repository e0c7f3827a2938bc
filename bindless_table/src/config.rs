/// Table configuration

use std::time::Duration;
use crate::error::{Error, Result};
use crate::handle::{ResourceKind, MAX_SLOTS_PER_KIND};

/// How a heap grows when its free list is empty and every reserved slot is used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthPolicy {
    /// Double the capacity
    Double,
    /// Add a fixed number of slots
    Chunk(u32),
}

impl GrowthPolicy {
    /// Capacity after one growth step, clamped to `ceiling`
    pub fn grow(&self, capacity: u32, ceiling: u32) -> u32 {
        let grown = match self {
            GrowthPolicy::Double => capacity.saturating_mul(2).max(1),
            GrowthPolicy::Chunk(n) => capacity.saturating_add((*n).max(1)),
        };
        grown.min(ceiling)
    }
}

/// Per-kind heap description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapDesc {
    /// Slots reserved at creation
    pub initial_capacity: u32,
    /// Hard platform ceiling (never above 65536, the shader index space)
    pub ceiling: u32,
    /// Growth step once the reserved slots are used
    pub growth: GrowthPolicy,
}

impl HeapDesc {
    pub const fn new(initial_capacity: u32, ceiling: u32, growth: GrowthPolicy) -> Self {
        Self { initial_capacity, ceiling, growth }
    }
}

/// Bindless table configuration
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Frames the CPU may run ahead of the GPU, the frame being recorded included
    pub frames_in_flight: u32,
    /// How long `advance_frame` may block on backpressure before reporting `GpuTimeout`
    pub retirement_timeout: Duration,
    /// `texture2D[]` / `sampler2D[]` heap
    pub sampled_images: HeapDesc,
    /// `sampler[]` heap
    pub samplers: HeapDesc,
    /// `image2D[]` heap
    pub storage_images: HeapDesc,
    /// Storage-buffer array heap
    pub storage_buffers: HeapDesc,
    /// Per-draw transform heap
    pub transforms: HeapDesc,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            retirement_timeout: Duration::from_secs(2),
            sampled_images: HeapDesc::new(1024, MAX_SLOTS_PER_KIND, GrowthPolicy::Double),
            samplers: HeapDesc::new(64, 4096, GrowthPolicy::Chunk(64)),
            storage_images: HeapDesc::new(256, MAX_SLOTS_PER_KIND, GrowthPolicy::Double),
            storage_buffers: HeapDesc::new(256, MAX_SLOTS_PER_KIND, GrowthPolicy::Double),
            transforms: HeapDesc::new(4096, MAX_SLOTS_PER_KIND, GrowthPolicy::Double),
        }
    }
}

impl TableConfig {
    /// Heap description for a kind
    pub fn heap(&self, kind: ResourceKind) -> &HeapDesc {
        match kind {
            ResourceKind::SampledImage => &self.sampled_images,
            ResourceKind::Sampler => &self.samplers,
            ResourceKind::StorageImage => &self.storage_images,
            ResourceKind::StorageBuffer => &self.storage_buffers,
            ResourceKind::Transform => &self.transforms,
        }
    }

    /// Mutable heap description for a kind
    pub fn heap_mut(&mut self, kind: ResourceKind) -> &mut HeapDesc {
        match kind {
            ResourceKind::SampledImage => &mut self.sampled_images,
            ResourceKind::Sampler => &mut self.samplers,
            ResourceKind::StorageImage => &mut self.storage_images,
            ResourceKind::StorageBuffer => &mut self.storage_buffers,
            ResourceKind::Transform => &mut self.transforms,
        }
    }

    /// Check the configuration before any heap is created
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(Error::InitializationFailed(
                "frames_in_flight must be at least 1".to_string()
            ));
        }

        for kind in ResourceKind::ALL {
            let desc = self.heap(kind);
            if desc.ceiling == 0 {
                return Err(Error::InitializationFailed(format!(
                    "{} heap ceiling must be at least 1", kind
                )));
            }
            if desc.ceiling > MAX_SLOTS_PER_KIND {
                return Err(Error::InitializationFailed(format!(
                    "{} heap ceiling {} exceeds the 16-bit index space ({})",
                    kind, desc.ceiling, MAX_SLOTS_PER_KIND
                )));
            }
            if desc.initial_capacity > desc.ceiling {
                return Err(Error::InitializationFailed(format!(
                    "{} heap initial capacity {} exceeds its ceiling {}",
                    kind, desc.initial_capacity, desc.ceiling
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
