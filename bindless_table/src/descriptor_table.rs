/// DescriptorTable - the one object owning every heap of a device
///
/// The table is created once per device and passed explicitly to whoever
/// needs it; there are no global heaps. The owning (render) thread drives the
/// frame loop through `&mut self` methods. Worker threads get a cloneable
/// `TableAllocator` that can allocate, write and release but never drain the
/// retirement queue.
///
/// # Frame loop
///
/// ```ignore
/// let mut table = DescriptorTable::new(TableConfig::default(), backend)?;
/// let texture = table.allocate(ResourceKind::SampledImage)?;
/// table.write(texture, DescriptorPayload::SampledImage { image_view, combined_sampler: None })?;
///
/// loop {
///     table.begin_frame()?;                  // retire, roll transforms, publish
///     let vp = table.push_transform(view_projection)?;
///     table.publish_writes()?;               // make this frame's matrices visible
///     let bytes = table.encode(&pipeline, &[PushValue::Handle(vp)])?;
///     // record draws with `bytes`, submit with table.submission_value()
/// }
/// ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use glam::Mat4;
use crate::backend::TableBackend;
use crate::config::TableConfig;
use crate::encoder::{PushConstantEncoder, PushValue};
use crate::error::{Error, Result};
use crate::handle::{Handle, ResourceKind};
use crate::heap::{DescriptorHeap, DescriptorPayload, DescriptorWrite, HeapStats};
use crate::pipeline::{validate_pipeline, Pipeline, PipelineDesc};
use crate::timeline::{FrameTimeline, RetirementQueue, Retirement};
use crate::transform_table::{InstanceRange, TransformTable};
use crate::{table_debug, table_error, table_info, table_trace, table_warn};

const LOG_SOURCE: &str = "bindless::Table";

/// State shared between the table and its allocators
struct TableShared {
    heaps: [Arc<DescriptorHeap>; 5],
    queue: Arc<RetirementQueue>,
    submitted: Arc<AtomicU64>,
}

impl TableShared {
    fn heap(&self, kind: ResourceKind) -> &DescriptorHeap {
        &self.heaps[kind.slot()]
    }

    fn release(&self, handle: Handle) -> Result<()> {
        self.heap(handle.kind()).release(handle)?;
        // Read after the slot left Allocated: any draw that encoded the
        // handle was recorded at or before this value.
        let value = self.submitted.load(Ordering::SeqCst);
        self.queue.enqueue(handle, value)
    }
}

/// Thread-safe allocation front of a `DescriptorTable`
#[derive(Clone)]
pub struct TableAllocator {
    shared: Arc<TableShared>,
}

impl TableAllocator {
    pub fn allocate(&self, kind: ResourceKind) -> Result<Handle> {
        self.shared.heap(kind).allocate()
    }

    pub fn write(&self, handle: Handle, payload: DescriptorPayload) -> Result<()> {
        self.shared.heap(handle.kind()).write(handle, payload)
    }

    /// Release a handle; its slot is recycled once the current frame retires
    pub fn release(&self, handle: Handle) -> Result<()> {
        self.shared.release(handle)
    }

    /// Submission value releases are currently tagged with
    pub fn submission_value(&self) -> u64 {
        self.shared.submitted.load(Ordering::SeqCst)
    }
}

/// Result of one `advance_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStatus {
    /// Value of the frame now being recorded
    pub submission_value: u64,
    /// Highest value retired by the GPU
    pub retired_value: u64,
    /// Slots returned to their free lists by this advance
    pub recycled: u32,
}

/// Snapshot of table counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    /// One entry per kind, in `ResourceKind::ALL` order
    pub heaps: Vec<HeapStats>,
    pub submission_value: u64,
    pub retired_value: u64,
    /// Handles waiting in the retirement queue
    pub pending_retirements: usize,
    /// Matrices pushed in the current frame
    pub frame_transforms: usize,
}

impl TableStats {
    pub fn heap(&self, kind: ResourceKind) -> &HeapStats {
        &self.heaps[kind.slot()]
    }
}

/// Bindless descriptor table of one device
pub struct DescriptorTable<B: TableBackend> {
    shared: Arc<TableShared>,
    timeline: FrameTimeline,
    transforms: TransformTable,
    backend: B,
    config: TableConfig,
    /// Fatal error that stopped the frame loop
    failure: Option<Error>,
}

impl<B: TableBackend> DescriptorTable<B> {
    /// Create a table on `backend`
    ///
    /// Heap ceilings are clamped to the device limits the backend reports.
    pub fn new(config: TableConfig, backend: B) -> Result<Self> {
        config.validate()?;

        let mut config = config;
        let limits = backend.limits();
        for kind in ResourceKind::ALL {
            let device_max = limits.max_descriptors(kind);
            let desc = config.heap_mut(kind);
            if device_max == 0 {
                return Err(Error::InitializationFailed(format!(
                    "{} backend reports no {} descriptors",
                    backend.name(),
                    kind
                )));
            }
            if desc.ceiling > device_max {
                table_info!(
                    LOG_SOURCE,
                    "{} heap ceiling clamped from {} to the device limit {}",
                    kind,
                    desc.ceiling,
                    device_max
                );
                desc.ceiling = device_max;
                desc.initial_capacity = desc.initial_capacity.min(device_max);
            }
        }

        let heaps = ResourceKind::ALL.map(|kind| Arc::new(DescriptorHeap::new(kind, config.heap(kind))));
        let queue = Arc::new(RetirementQueue::new());
        let timeline = FrameTimeline::new(config.frames_in_flight);
        let transforms = TransformTable::new(
            heaps[ResourceKind::Transform.slot()].clone(),
            queue.clone(),
            timeline.submission_value(),
        );
        let shared = Arc::new(TableShared {
            heaps,
            queue,
            submitted: timeline.shared_submission(),
        });

        table_info!(
            LOG_SOURCE,
            "Descriptor table created on {} backend ({} frames in flight)",
            backend.name(),
            config.frames_in_flight
        );

        Ok(Self {
            shared,
            timeline,
            transforms,
            backend,
            config,
            failure: None,
        })
    }

    /// Cloneable allocation front for worker threads
    pub fn allocator(&self) -> TableAllocator {
        TableAllocator { shared: self.shared.clone() }
    }

    // ===== SLOTS =====

    pub fn allocate(&self, kind: ResourceKind) -> Result<Handle> {
        self.shared.heap(kind).allocate()
    }

    pub fn write(&self, handle: Handle, payload: DescriptorPayload) -> Result<()> {
        self.shared.heap(handle.kind()).write(handle, payload)
    }

    pub fn release(&self, handle: Handle) -> Result<()> {
        self.shared.release(handle)
    }

    /// Hand every pending descriptor update to the backend in one batch
    ///
    /// Returns the number of updates applied. If the backend rejects the
    /// batch, the updates stay pending for the next attempt.
    pub fn publish_writes(&mut self) -> Result<usize> {
        let mut writes = Vec::new();
        for heap in &self.shared.heaps {
            writes.extend(heap.take_pending_writes()?);
        }
        if writes.is_empty() {
            return Ok(0);
        }

        if let Err(err) = self.backend.apply_writes(&writes) {
            table_error!(LOG_SOURCE, "Publishing {} descriptor updates failed: {}", writes.len(), err);
            for heap in &self.shared.heaps {
                heap.restore_pending_writes(&writes_of(&writes, heap.kind()))?;
            }
            return Err(self.fail(err));
        }

        for heap in &self.shared.heaps {
            heap.mark_published(&writes_of(&writes, heap.kind()))?;
        }
        table_trace!(LOG_SOURCE, "Published {} descriptor updates", writes.len());
        Ok(writes.len())
    }

    // ===== FRAMES =====

    /// Close the recording frame and reclaim everything the GPU has retired
    ///
    /// Blocks when the CPU is `frames_in_flight` frames ahead, for at most
    /// `retirement_timeout`. A timeout or a lost device is fatal: every later
    /// call returns the same error.
    pub fn advance_frame(&mut self) -> Result<FrameStatus> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let closed = self.timeline.submission_value();
        if let Err(err) = self.backend.frame_submitted(closed) {
            return Err(self.fail(err));
        }
        self.timeline.advance();

        if let Some(target) = self.timeline.backpressure_target() {
            table_debug!(
                LOG_SOURCE,
                "{} frames in flight, waiting for frame {}",
                self.timeline.in_flight(),
                target
            );
            match self.backend.wait_for_value(target, self.config.retirement_timeout) {
                Ok(true) => {}
                Ok(false) => {
                    let err = Error::GpuTimeout {
                        value: target,
                        waited: self.config.retirement_timeout,
                    };
                    return Err(self.fail(err));
                }
                Err(err) => return Err(self.fail(err)),
            }
        }

        let completed = match self.backend.completed_value() {
            Ok(value) => value,
            Err(err) => return Err(self.fail(err)),
        };
        self.timeline.retire_to(completed);

        let recycled = self.reclaim(self.timeline.retired_value())?;
        Ok(FrameStatus {
            submission_value: self.timeline.submission_value(),
            retired_value: self.timeline.retired_value(),
            recycled,
        })
    }

    /// Advance the frame, roll the transform table and publish pending writes
    pub fn begin_frame(&mut self) -> Result<FrameStatus> {
        let status = self.advance_frame()?;
        self.transforms.begin_frame(status.submission_value)?;
        self.publish_writes()?;
        Ok(status)
    }

    /// Value of the frame being recorded (what its submission signals)
    pub fn submission_value(&self) -> u64 {
        self.timeline.submission_value()
    }

    pub fn retired_value(&self) -> u64 {
        self.timeline.retired_value()
    }

    pub fn timeline(&self) -> &FrameTimeline {
        &self.timeline
    }

    // ===== TRANSFORMS =====

    pub fn push_transform(&mut self, matrix: Mat4) -> Result<Handle> {
        self.transforms.push(matrix)
    }

    pub fn push_instance_transforms(&mut self, matrices: &[Mat4]) -> Result<InstanceRange> {
        self.transforms.push_instances(matrices)
    }

    pub fn transforms(&self) -> &TransformTable {
        &self.transforms
    }

    // ===== PIPELINES & ENCODING =====

    /// Validate a pipeline against the device and prepare its layout
    pub fn build_pipeline(&mut self, desc: &PipelineDesc) -> Result<Pipeline> {
        let layout = validate_pipeline(desc, self.backend.capabilities()).map_err(|err| {
            table_error!(LOG_SOURCE, "{}", err);
            err
        })?;
        let backend_layout = self.backend.prepare_pipeline(&layout)?;
        table_debug!(LOG_SOURCE, "Pipeline {} ready", desc.variant);
        Ok(Pipeline::new(*desc, layout, backend_layout))
    }

    /// Encode a draw's push constants
    ///
    /// Every handle must be live and published.
    pub fn encode(&self, pipeline: &Pipeline, values: &[PushValue]) -> Result<Vec<u8>> {
        for value in values {
            if let PushValue::Handle(handle) = value {
                self.shared.heap(handle.kind()).is_ready(*handle)?;
            }
        }
        PushConstantEncoder::new(pipeline.push_constants()).encode(values)
    }

    // ===== INSPECTION =====

    pub fn heap(&self, kind: ResourceKind) -> &DescriptorHeap {
        self.shared.heap(kind)
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Fatal error that stopped the frame loop, if any
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            heaps: self.shared.heaps.iter().map(|heap| heap.stats()).collect(),
            submission_value: self.timeline.submission_value(),
            retired_value: self.timeline.retired_value(),
            pending_retirements: self.shared.queue.len(),
            frame_transforms: self.transforms.len(),
        }
    }

    // ===== SHUTDOWN =====

    /// Wait for the GPU, reclaim every pending slot and destroy backend objects
    ///
    /// Returns the handles still live at shutdown (leaks), which are also
    /// logged as warnings.
    pub fn shutdown(mut self) -> Result<Vec<Handle>> {
        self.transforms.release_segment()?;

        if self.failure.is_none() {
            self.backend.wait_idle()?;
        }

        let pending = self.shared.queue.drain_all()?;
        self.recycle_all(pending)?;

        let leaked: Vec<Handle> = self.shared.heaps.iter().flat_map(|heap| heap.live_handles()).collect();
        for kind in ResourceKind::ALL {
            let count = leaked.iter().filter(|handle| handle.kind() == kind).count();
            if count > 0 {
                table_warn!(LOG_SOURCE, "{} {} handles still live at shutdown", count, kind);
            }
        }

        self.backend.destroy();
        table_info!(LOG_SOURCE, "Descriptor table shut down");
        Ok(leaked)
    }

    // ===== INTERNAL =====

    fn reclaim(&mut self, retired: u64) -> Result<u32> {
        let ready = self.shared.queue.drain_retired(retired)?;
        let recycled = self.recycle_all(ready)?;
        if recycled > 0 {
            table_trace!(LOG_SOURCE, "Recycled {} slots up to frame {}", recycled, retired);
        }
        Ok(recycled)
    }

    /// Recycle every drained entry, even past a failing one
    ///
    /// An entry whose heap could not be locked goes back to the queue for the
    /// next advance. Stale entries are dropped. The first error is returned
    /// after the loop.
    fn recycle_all(&self, entries: Vec<Retirement>) -> Result<u32> {
        let mut recycled = 0;
        let mut first_error = None;
        for retirement in entries {
            match self.shared.heap(retirement.handle.kind()).recycle(retirement.handle) {
                Ok(true) => recycled += 1,
                Ok(false) => {}
                Err(err) => {
                    table_error!(LOG_SOURCE, "Recycling {} failed: {}", retirement.handle, err);
                    if !matches!(err, Error::StaleHandle { .. }) {
                        if let Err(requeue) = self.shared.queue.enqueue(retirement.handle, retirement.value) {
                            first_error.get_or_insert(requeue);
                        }
                    }
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(recycled),
        }
    }

    /// Record a fatal error so the frame loop stops
    fn fail(&mut self, err: Error) -> Error {
        if err.is_fatal() {
            table_error!(LOG_SOURCE, "Frame loop stopped: {}", err);
            self.failure = Some(err.clone());
        }
        err
    }
}

fn writes_of(writes: &[DescriptorWrite], kind: ResourceKind) -> Vec<DescriptorWrite> {
    writes.iter().filter(|write| write.kind() == kind).copied().collect()
}

#[cfg(test)]
#[path = "descriptor_table_tests.rs"]
mod tests;
