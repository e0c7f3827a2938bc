/// TransformBuffer - host-visible storage buffer behind the transform heap
///
/// Slot `i` of the transform heap is `Matrices[i]` in the shader: 64 bytes
/// at offset `i * 64`. Matrices are written straight into mapped memory.
/// When the heap outgrows the buffer, a larger one replaces it and the old
/// buffer stays alive until the GPU has retired every frame that could
/// still read it.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use bindless_table::bindless::{Error, Result};
use bindless_table::bindless::pipeline::TRANSFORM_STRIDE;
use bindless_table::glam::Mat4;
use bindless_table::{table_debug, table_error, table_err};

use crate::vulkan_context::VulkanContext;
use crate::vulkan_deferred::DeferredDestroy;

/// One Vulkan buffer and its memory
struct GpuBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    /// Number of matrices the buffer holds
    capacity: u32,
}

/// The buffer does not keep the context: every call that touches Vulkan takes it
pub(crate) struct TransformBuffer {
    current: GpuBuffer,
    max_capacity: u32,
    /// Replaced buffers, until the frames that could read them complete
    retired: DeferredDestroy<GpuBuffer>,
}

impl TransformBuffer {
    pub fn new(ctx: &VulkanContext, initial_capacity: u32, max_capacity: u32) -> Result<Self> {
        let max_capacity = max_capacity.max(1);
        let current = Self::create_buffer(ctx, initial_capacity.clamp(1, max_capacity))?;
        Ok(Self {
            current,
            max_capacity,
            retired: DeferredDestroy::new(),
        })
    }

    /// Allocate a CPU-visible storage buffer for `capacity` matrices
    fn create_buffer(ctx: &VulkanContext, capacity: u32) -> Result<GpuBuffer> {
        unsafe {
            let size = u64::from(capacity) * TRANSFORM_STRIDE;

            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(vk::BufferUsageFlags::STORAGE_BUFFER)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_create_info, None)
                .map_err(|e| table_err!("bindless::vulkan", "Failed to create transform buffer of {} bytes: {:?}", size, e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);

            let allocation = {
                let mut allocator = ctx.allocator.lock()
                    .map_err(|_| table_err!("bindless::vulkan", "GPU allocator lock poisoned"))?;
                allocator.allocate(&AllocationCreateDesc {
                    name: "bindless transforms",
                    requirements,
                    location: MemoryLocation::CpuToGpu,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
            };

            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    table_error!("bindless::vulkan", "Out of GPU memory for transform buffer (required: {:.2} MB): {:?}", size_mb, e);
                    return Err(Error::BackendError(format!("Out of GPU memory for transform buffer: {:?}", e)));
                }
            };

            if let Err(e) = ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                Self::free_buffer(ctx, GpuBuffer { buffer, allocation: Some(allocation), capacity });
                return Err(table_err!("bindless::vulkan", "Failed to bind transform buffer memory: {:?}", e));
            }

            Ok(GpuBuffer {
                buffer,
                allocation: Some(allocation),
                capacity,
            })
        }
    }

    fn free_buffer(ctx: &VulkanContext, mut gpu_buffer: GpuBuffer) {
        unsafe {
            if let Some(allocation) = gpu_buffer.allocation.take() {
                // Don't bail if the lock fails, the buffer must still be destroyed
                if let Ok(mut allocator) = ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            ctx.device.destroy_buffer(gpu_buffer.buffer, None);
        }
    }

    /// Matrices the current buffer holds
    pub fn capacity(&self) -> u32 {
        self.current.capacity
    }

    /// Descriptor covering the whole current buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.current.buffer)
            .offset(0)
            .range(vk::WHOLE_SIZE)
    }

    /// Write `Matrices[index]`
    ///
    /// `retire_after` is the last timeline value that may read the current
    /// buffer. Returns `true` when the buffer was replaced; descriptor sets
    /// pointing at the old one must be replaced too, never rewritten.
    pub fn write(&mut self, ctx: &VulkanContext, index: u32, matrix: &Mat4, retire_after: u64) -> Result<bool> {
        let grew = if index >= self.current.capacity {
            self.grow(ctx, index + 1, retire_after)?;
            true
        } else {
            false
        };

        let offset = (u64::from(index) * TRANSFORM_STRIDE) as usize;
        let columns = matrix.to_cols_array();
        let bytes: &[u8] = bytemuck::cast_slice(&columns);

        let mapped = self.current.allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| table_err!("bindless::vulkan", "Transform buffer is not CPU-accessible"))?;
        mapped[offset..offset + bytes.len()].copy_from_slice(bytes);

        Ok(grew)
    }

    /// Replace the buffer with one holding at least `required` matrices
    fn grow(&mut self, ctx: &VulkanContext, required: u32, retire_after: u64) -> Result<()> {
        if required > self.max_capacity {
            return Err(table_err!("bindless::vulkan",
                "Transform buffer cannot hold {} matrices (maximum {})", required, self.max_capacity));
        }

        let new_capacity = self.current.capacity
            .saturating_mul(2)
            .max(required)
            .min(self.max_capacity);
        let mut replacement = Self::create_buffer(ctx, new_capacity)?;

        // Carry the live matrices over
        let copied = (u64::from(self.current.capacity) * TRANSFORM_STRIDE) as usize;
        let carried = {
            let source = self.current.allocation.as_ref().and_then(|allocation| allocation.mapped_slice());
            let destination = replacement.allocation.as_mut().and_then(|allocation| allocation.mapped_slice_mut());
            match (source, destination) {
                (Some(source), Some(destination)) => {
                    destination[..copied].copy_from_slice(&source[..copied]);
                    true
                }
                _ => false,
            }
        };
        if !carried {
            Self::free_buffer(ctx, replacement);
            return Err(table_err!("bindless::vulkan", "Transform buffer is not CPU-accessible"));
        }

        table_debug!("bindless::vulkan",
            "Transform buffer grown from {} to {} matrices (old buffer retires after frame {})",
            self.current.capacity, new_capacity, retire_after);

        let replaced = std::mem::replace(&mut self.current, replacement);
        self.retired.push(replaced, retire_after);
        Ok(())
    }

    /// Destroy replaced buffers the GPU can no longer read
    pub fn collect(&mut self, ctx: &VulkanContext, completed: u64) -> usize {
        let done = self.retired.collect(completed);
        let count = done.len();
        for gpu_buffer in done {
            Self::free_buffer(ctx, gpu_buffer);
        }
        count
    }

    /// Destroy every buffer (the device must be idle)
    pub fn destroy(&mut self, ctx: &VulkanContext) {
        for gpu_buffer in self.retired.drain() {
            Self::free_buffer(ctx, gpu_buffer);
        }
        let current = std::mem::replace(&mut self.current, GpuBuffer {
            buffer: vk::Buffer::null(),
            allocation: None,
            capacity: 0,
        });
        if current.buffer != vk::Buffer::null() {
            Self::free_buffer(ctx, current);
        }
    }
}
