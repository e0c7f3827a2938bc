/*!
# Bindless Table

Host-side bindless GPU resource descriptor table.

Shaders never receive per-draw resource bindings. They receive compact 16-bit
indices (through push constants or storage-buffer arrays) into global,
dynamically indexed descriptor arrays. This crate owns those arrays on the
host side: it allocates slots, publishes their descriptors, and recycles them
only once the GPU work that could still read them has retired.

## Architecture

- **Handle**: `{index, generation, kind}` value type, the shared currency
- **DescriptorHeap**: one per resource kind, slot array + free list + generations
- **RetirementQueue / FrameTimeline**: delayed (epoch-based) slot reclamation
- **PushConstantEncoder**: exact byte layouts of every pipeline variant
- **TransformTable**: per-draw matrices, rolled every frame
- **DescriptorTable**: the one object that owns all of the above
- **TableBackend**: trait implemented by GPU backends (see `bindless_table_vulkan`)
*/

// Internal modules
mod error;
mod config;
mod descriptor_table;
pub mod log;
pub mod handle;
pub mod heap;
pub mod timeline;
pub mod encoder;
pub mod pipeline;
pub mod transform_table;
pub mod backend;

// Main bindless namespace module
pub mod bindless {
    // Error types
    pub use crate::error::{Error, Result};

    // Configuration
    pub use crate::config::{TableConfig, HeapDesc, GrowthPolicy};

    // The table itself
    pub use crate::descriptor_table::{DescriptorTable, TableAllocator, TableStats, FrameStatus};

    // Handles
    pub use crate::handle::{Handle, ResourceKind, BINDING_INDEX_MASK, MAX_SLOTS_PER_KIND};

    // Backend trait
    pub use crate::backend::{TableBackend, DeviceLimits, HeadlessBackend, HeadlessControl};

    // Logging sub-module (types and functions, macros are exported at crate root)
    pub mod log {
        pub use crate::log::{
            Logger, LogEntry, LogSeverity, DefaultLogger,
            set_logger, reset_logger, emit, emit_detailed,
        };
    }

    // Heap sub-module
    pub mod heap {
        pub use crate::heap::*;
    }

    // Timeline sub-module
    pub mod timeline {
        pub use crate::timeline::*;
    }

    // Encoder sub-module
    pub mod encoder {
        pub use crate::encoder::*;
    }

    // Pipeline sub-module
    pub mod pipeline {
        pub use crate::pipeline::*;
    }

    // Transform sub-module
    pub mod transform {
        pub use crate::transform_table::*;
    }
}

// Re-export math library at crate root
pub use glam;
