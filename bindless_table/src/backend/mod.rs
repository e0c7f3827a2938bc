/// Backend module - the seam between the table and a GPU API
///
/// A backend reports GPU progress on the frame timeline, applies batched
/// descriptor updates to its shader-visible arrays and turns validated
/// pipeline layouts into native objects. `HeadlessBackend` simulates a GPU
/// on the CPU for tests and tools; `bindless_table_vulkan` provides the
/// Vulkan implementation.

use std::time::Duration;
use crate::error::Result;
use crate::handle::{ResourceKind, MAX_SLOTS_PER_KIND};
use crate::heap::DescriptorWrite;
use crate::pipeline::{DeviceCapabilities, PipelineLayoutDesc};

// Module declarations
pub mod headless;

// Re-export
pub use headless::*;

/// Per-kind descriptor ceilings reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    max_descriptors: [u32; 5],
}

impl DeviceLimits {
    /// Limits with the same ceiling for every kind
    pub fn uniform(max: u32) -> Self {
        Self { max_descriptors: [max; 5] }
    }

    /// Maximum array length for a kind
    pub fn max_descriptors(&self, kind: ResourceKind) -> u32 {
        self.max_descriptors[kind.slot()]
    }

    pub fn with_max_descriptors(mut self, kind: ResourceKind, max: u32) -> Self {
        self.max_descriptors[kind.slot()] = max;
        self
    }
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self::uniform(MAX_SLOTS_PER_KIND)
    }
}

/// GPU API backend driven by `DescriptorTable`
///
/// Methods are only called from the thread that owns the table.
pub trait TableBackend: Send {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Descriptor-indexing features the device supports
    fn capabilities(&self) -> DeviceCapabilities;

    /// Descriptor array ceilings of the device
    fn limits(&self) -> DeviceLimits;

    /// The frame carrying `value` has been handed to the GPU
    ///
    /// Backends that signal their timeline themselves (Vulkan semaphores)
    /// have nothing to do here.
    fn frame_submitted(&mut self, _value: u64) -> Result<()> {
        Ok(())
    }

    /// Highest timeline value the GPU has completed
    fn completed_value(&mut self) -> Result<u64>;

    /// Block until `value` completes or `timeout` elapses
    ///
    /// Returns `Ok(false)` on timeout; device loss is an error.
    fn wait_for_value(&mut self, value: u64, timeout: Duration) -> Result<bool>;

    /// Apply one batch of descriptor updates to the shader-visible arrays
    fn apply_writes(&mut self, writes: &[DescriptorWrite]) -> Result<()>;

    /// Create (or reuse) the native layout for a validated pipeline
    fn prepare_pipeline(&mut self, layout: &PipelineLayoutDesc) -> Result<u64>;

    /// Wait until every submitted frame has completed
    fn wait_idle(&mut self) -> Result<()>;

    /// Release backend objects (called once, at table shutdown)
    fn destroy(&mut self) {}
}
