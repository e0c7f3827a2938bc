/// Timeline semaphore - GPU side of the frame timeline
///
/// Every submitted frame signals the semaphore with its submission value;
/// the counter value is the highest frame the GPU has completed.

use ash::vk;
use std::time::Duration;
use bindless_table::bindless::{Error, Result};
use bindless_table::table_error;

use crate::vulkan_conversion::vk_error;

pub(crate) struct TimelineSemaphore {
    device: ash::Device,
    semaphore: vk::Semaphore,
}

impl TimelineSemaphore {
    /// Create a timeline semaphore starting at `initial_value`
    pub fn new(device: &ash::Device, initial_value: u64) -> Result<Self> {
        unsafe {
            let mut type_info = vk::SemaphoreTypeCreateInfo::default()
                .semaphore_type(vk::SemaphoreType::TIMELINE)
                .initial_value(initial_value);
            let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

            let semaphore = device.create_semaphore(&create_info, None)
                .map_err(|e| {
                    table_error!("bindless::vulkan", "Failed to create timeline semaphore: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create timeline semaphore: {:?}", e))
                })?;

            Ok(Self {
                device: device.clone(),
                semaphore,
            })
        }
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Current counter value
    pub fn value(&self) -> Result<u64> {
        unsafe {
            self.device
                .get_semaphore_counter_value(self.semaphore)
                .map_err(|e| vk_error("Failed to read timeline semaphore", e))
        }
    }

    /// Wait until the counter reaches `value`
    ///
    /// Returns `Ok(false)` when `timeout` elapses first.
    pub fn wait(&self, value: u64, timeout: Duration) -> Result<bool> {
        unsafe {
            let semaphores = [self.semaphore];
            let values = [value];
            let wait_info = vk::SemaphoreWaitInfo::default()
                .semaphores(&semaphores)
                .values(&values);
            let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);

            match self.device.wait_semaphores(&wait_info, timeout_ns) {
                Ok(()) => Ok(true),
                Err(vk::Result::TIMEOUT) => Ok(false),
                Err(e) => Err(vk_error("Failed to wait for timeline semaphore", e)),
            }
        }
    }

    /// Destroy the semaphore (the device must be idle)
    pub fn destroy(&mut self) {
        unsafe {
            if self.semaphore != vk::Semaphore::null() {
                self.device.destroy_semaphore(self.semaphore, None);
                self.semaphore = vk::Semaphore::null();
            }
        }
    }
}
