/*!
# Bindless Table - Vulkan Backend

Vulkan implementation of the `bindless_table::bindless::TableBackend` trait.

This crate attaches to a device owned by the host renderer (window, surface
and swapchain stay with the host) and provides:

- descriptor-indexing capability and limit queries
- update-after-bind, partially-bound descriptor sets, one per distinct layout
- timeline-semaphore frame retirement
- a host-visible storage buffer backing the transform heap
- a frame submission helper that signals the timeline

Uses Ash for Vulkan bindings and gpu-allocator for the transform buffer memory.
*/

// Vulkan implementation modules
mod vulkan_context;
mod vulkan_capabilities;
mod vulkan_conversion;
mod vulkan_timeline;
mod vulkan_deferred;
mod vulkan_transform_buffer;
mod vulkan_descriptor_set;
mod vulkan_backend;

pub use vulkan_backend::{VulkanBackend, VulkanBackendDesc};
pub use vulkan_capabilities::{bindless_device_features, timeline_semaphore_features};

// Re-export ash so hosts build against the same Vulkan bindings
pub use ash;
