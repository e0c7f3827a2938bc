/// Heap module - per-kind descriptor heaps and their slot allocation

// Module declarations
mod slot_allocator;
pub mod payload;
pub mod descriptor_heap;

// Re-export everything public
pub use payload::*;
pub use descriptor_heap::*;
