/// VulkanContext - device objects shared by the backend's GPU resources
///
/// The backend does not own the device or the instance: both belong to the
/// host renderer and must outlive the backend. Only the allocator is created
/// (and destroyed) here; the instance and physical device are needed for its
/// creation only.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::mem::ManuallyDrop;
use std::sync::Mutex;
use bindless_table::bindless::{Error, Result};
use bindless_table::table_error;

/// Device objects the backend works with
pub(crate) struct VulkanContext {
    /// Vulkan logical device (owned by the host)
    pub device: ash::Device,

    /// Queue used by `submit_frame`
    pub queue: vk::Queue,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the host destroys the device
    pub allocator: ManuallyDrop<Mutex<Allocator>>,
}

impl VulkanContext {
    /// Create the context and its allocator
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue: vk::Queue,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| {
            table_error!("bindless::vulkan", "Failed to create GPU allocator: {:?}", e);
            Error::InitializationFailed(format!("Failed to create GPU allocator: {:?}", e))
        })?;

        Ok(Self {
            device,
            queue,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
        })
    }

    /// Drop the allocator, freeing its VkDeviceMemory pages
    ///
    /// # Safety
    ///
    /// Must be called exactly once, after every allocation has been freed.
    pub unsafe fn release_allocator(&mut self) {
        ManuallyDrop::drop(&mut self.allocator);
    }
}
