/// VulkanBackend - `TableBackend` implementation on top of Ash
///
/// Frame retirement rides on one timeline semaphore: `submit_frame` signals
/// it with the table's submission value, and the semaphore counter is the
/// table's completed value.

use ash::vk;
use ash::vk::Handle as _;
use std::time::Duration;
use bindless_table::bindless::{DeviceLimits, Error, ResourceKind, Result, TableBackend};
use bindless_table::bindless::heap::{DescriptorPayload, DescriptorUpdate, DescriptorWrite};
use bindless_table::bindless::pipeline::{DeviceCapabilities, Pipeline, PipelineLayoutDesc};
use bindless_table::{table_debug, table_info, table_error, table_bail};

use crate::vulkan_capabilities::query_device_support;
use crate::vulkan_context::VulkanContext;
use crate::vulkan_conversion::vk_error;
use crate::vulkan_descriptor_set::DescriptorSetCache;
use crate::vulkan_timeline::TimelineSemaphore;
use crate::vulkan_transform_buffer::TransformBuffer;

/// Matrices the transform buffer holds before its first growth
const DEFAULT_TRANSFORM_CAPACITY: u32 = 1024;

/// Device objects the backend attaches to
///
/// The instance and device are owned by the host and must outlive the
/// backend. The device must have been created with the features returned
/// by `bindless_device_features` and `timeline_semaphore_features` (those
/// the physical device supports).
pub struct VulkanBackendDesc {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    /// Queue `submit_frame` submits to
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    /// Upper bound on each array, further clamped to the device limits
    pub descriptor_counts: DeviceLimits,
    /// Matrices the transform buffer starts with
    pub initial_transform_capacity: u32,
    /// Descriptors written into recycled elements, at most one per kind
    pub fallback_descriptors: Vec<DescriptorPayload>,
}

impl VulkanBackendDesc {
    pub fn new(
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue: vk::Queue,
        queue_family_index: u32,
    ) -> Self {
        Self {
            instance,
            physical_device,
            device,
            queue,
            queue_family_index,
            descriptor_counts: DeviceLimits::default(),
            initial_transform_capacity: DEFAULT_TRANSFORM_CAPACITY,
            fallback_descriptors: Vec::new(),
        }
    }

    pub fn with_descriptor_counts(mut self, descriptor_counts: DeviceLimits) -> Self {
        self.descriptor_counts = descriptor_counts;
        self
    }

    pub fn with_fallback_descriptor(mut self, payload: DescriptorPayload) -> Self {
        self.fallback_descriptors.retain(|fallback| fallback.kind() != payload.kind());
        self.fallback_descriptors.push(payload);
        self
    }
}

/// Vulkan backend of the bindless table
pub struct VulkanBackend {
    ctx: VulkanContext,
    capabilities: DeviceCapabilities,
    limits: DeviceLimits,
    timeline: TimelineSemaphore,
    descriptor_sets: DescriptorSetCache,
    transforms: TransformBuffer,
    /// Last value reported through `frame_submitted`
    last_submitted: u64,
    /// Last value signaled by `submit_frame`
    last_signaled: u64,
    /// The transform buffer was replaced but the sets still point at the old one
    transform_sets_stale: bool,
    destroyed: bool,
}

impl VulkanBackend {
    /// Attach to a host-created device
    pub fn new(desc: VulkanBackendDesc) -> Result<Self> {
        let support = query_device_support(&desc.instance, desc.physical_device, desc.descriptor_counts);

        if !support.timeline_semaphore {
            table_error!("bindless::vulkan", "Device does not support timeline semaphores");
            return Err(Error::InitializationFailed("Device does not support timeline semaphores".to_string()));
        }

        let ctx = VulkanContext::new(
            &desc.instance,
            desc.physical_device,
            desc.device,
            desc.queue,
        )?;

        let timeline = TimelineSemaphore::new(&ctx.device, 0)?;
        let transforms = TransformBuffer::new(
            &ctx,
            desc.initial_transform_capacity,
            support.limits.max_descriptors(ResourceKind::Transform),
        )?;
        let descriptor_sets = DescriptorSetCache::new(
            &ctx.device,
            support.capabilities,
            support.limits,
            desc.fallback_descriptors,
        );

        table_info!("bindless::vulkan", "Vulkan backend ready on queue family {} (capabilities: {:?})",
            desc.queue_family_index, support.capabilities);
        for kind in ResourceKind::ALL {
            table_debug!("bindless::vulkan", "  {} array length: {}", kind, support.limits.max_descriptors(kind));
        }

        Ok(Self {
            ctx,
            capabilities: support.capabilities,
            limits: support.limits,
            timeline,
            descriptor_sets,
            transforms,
            last_submitted: 0,
            last_signaled: 0,
            transform_sets_stale: false,
            destroyed: false,
        })
    }

    /// Timeline semaphore signaled by `submit_frame`
    pub fn timeline_semaphore(&self) -> vk::Semaphore {
        self.timeline.handle()
    }

    /// Descriptor set to bind at set 0 for `pipeline`
    ///
    /// `None` for variants without descriptor arrays. The set of a layout
    /// with a transform binding changes when the transform buffer grows, so
    /// fetch it after `publish_writes` rather than caching it across frames.
    pub fn descriptor_set(&self, pipeline: &Pipeline) -> Option<vk::DescriptorSet> {
        self.descriptor_sets.descriptor_set(pipeline.layout())
    }

    /// Pipeline layout created for `pipeline`
    pub fn pipeline_layout(&self, pipeline: &Pipeline) -> vk::PipelineLayout {
        vk::PipelineLayout::from_raw(pipeline.backend_layout())
    }

    /// Matrices the transform buffer currently holds
    pub fn transform_capacity(&self) -> u32 {
        self.transforms.capacity()
    }

    /// Submit one frame's command buffers and signal the timeline with `value`
    ///
    /// `value` is the table's submission value for the frame
    /// (`DescriptorTable::submission_value`) and must increase every frame.
    /// `wait` and `signal` are binary semaphores (swapchain acquire/present).
    pub fn submit_frame(
        &mut self,
        command_buffers: &[vk::CommandBuffer],
        wait: &[(vk::Semaphore, vk::PipelineStageFlags)],
        signal: &[vk::Semaphore],
        value: u64,
    ) -> Result<()> {
        if value <= self.last_signaled {
            table_bail!("bindless::vulkan",
                "Timeline value {} does not follow the last signaled value {}", value, self.last_signaled);
        }

        unsafe {
            let wait_semaphores: Vec<vk::Semaphore> = wait.iter().map(|(semaphore, _)| *semaphore).collect();
            let wait_stages: Vec<vk::PipelineStageFlags> = wait.iter().map(|(_, stage)| *stage).collect();
            // Binary semaphores ignore their value
            let wait_values = vec![0u64; wait.len()];

            let mut signal_semaphores = signal.to_vec();
            signal_semaphores.push(self.timeline.handle());
            let mut signal_values = vec![0u64; signal.len()];
            signal_values.push(value);

            let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
                .wait_semaphore_values(&wait_values)
                .signal_semaphore_values(&signal_values);

            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(command_buffers)
                .signal_semaphores(&signal_semaphores)
                .push_next(&mut timeline_info);

            self.ctx.device
                .queue_submit(self.ctx.queue, &[submit_info], vk::Fence::null())
                .map_err(|e| vk_error("Failed to submit frame to GPU queue", e))?;
        }

        self.last_signaled = value;
        Ok(())
    }

    /// Highest value the GPU may still be working on
    fn in_flight_value(&self) -> u64 {
        self.last_submitted.max(self.last_signaled)
    }
}

impl TableBackend for VulkanBackend {
    fn name(&self) -> &str {
        "vulkan"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn frame_submitted(&mut self, value: u64) -> Result<()> {
        self.last_submitted = self.last_submitted.max(value);
        Ok(())
    }

    fn completed_value(&mut self) -> Result<u64> {
        let completed = self.timeline.value()?;
        let buffers = self.transforms.collect(&self.ctx, completed);
        let pools = self.descriptor_sets.collect(completed);
        if buffers + pools > 0 {
            table_debug!("bindless::vulkan",
                "Destroyed {} replaced transform buffer(s) and {} descriptor pool(s) at frame {}",
                buffers, pools, completed);
        }
        Ok(completed)
    }

    fn wait_for_value(&mut self, value: u64, timeout: Duration) -> Result<bool> {
        self.timeline.wait(value, timeout)
    }

    fn apply_writes(&mut self, writes: &[DescriptorWrite]) -> Result<()> {
        // The frame being recorded may already have bound the current sets
        let retire_after = self.in_flight_value() + 1;

        for write in writes.iter().filter(|write| write.kind() == ResourceKind::Transform) {
            // Cleared transform slots keep their stale matrix, nothing indexes them
            if let DescriptorUpdate::Set(DescriptorPayload::Transform(matrix)) = write.update {
                self.transform_sets_stale |= self.transforms.write(&self.ctx, write.array_element(), &matrix, retire_after)?;
            }
        }
        if self.transform_sets_stale {
            self.descriptor_sets.replace_transform_sets(self.transforms.descriptor_info(), retire_after)?;
            self.transform_sets_stale = false;
        }

        let descriptors: Vec<DescriptorWrite> = writes
            .iter()
            .filter(|write| write.kind() != ResourceKind::Transform)
            .copied()
            .collect();
        self.descriptor_sets.apply(&descriptors)
    }

    fn prepare_pipeline(&mut self, layout: &PipelineLayoutDesc) -> Result<u64> {
        let pipeline_layout = self.descriptor_sets.prepare(layout, self.transforms.descriptor_info())?;
        Ok(pipeline_layout.as_raw())
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe {
            self.ctx.device
                .device_wait_idle()
                .map_err(|e| vk_error("Failed to wait idle", e))
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let set_count = self.descriptor_sets.set_count();

        unsafe {
            // Wait for device to finish
            self.ctx.device.device_wait_idle().ok();

            // 1. Descriptor sets, pools and layouts
            self.descriptor_sets.destroy();

            // 2. Transform buffers, then the allocator that owns their memory
            self.transforms.destroy(&self.ctx);
            self.ctx.release_allocator();

            // 3. Timeline semaphore
            self.timeline.destroy();
        }

        table_info!("bindless::vulkan", "Vulkan backend destroyed ({} descriptor sets)", set_count);
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        self.destroy();
    }
}
