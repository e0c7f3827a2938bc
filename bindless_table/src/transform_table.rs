/// TransformTable - per-draw matrices, rolled once per frame
///
/// Matrices pushed during a frame live in the transform heap until the next
/// `begin_frame`, which releases the whole segment tagged with the value of
/// the frame that used it. The slots come back through the retirement queue
/// like any other descriptor, so a matrix is never overwritten while a frame
/// that reads it is still in flight.
///
/// Draws address matrices two ways:
/// - push constants: `push` returns a handle whose `binding_index` goes into
///   the draw's push-constant block
/// - instance index: `push_instances` places matrices at consecutive indices
///   and the draw uses `first_instance` as the base

use std::sync::Arc;
use glam::Mat4;
use crate::error::{Error, Result};
use crate::handle::{Handle, ResourceKind};
use crate::heap::{DescriptorHeap, DescriptorPayload};
use crate::timeline::RetirementQueue;
use crate::{table_trace, table_warn};

/// Instance range of a `push_instances` batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceRange {
    /// Index of the first matrix, passed as the draw's first instance
    pub first_instance: u32,
    pub count: u32,
}

pub struct TransformTable {
    heap: Arc<DescriptorHeap>,
    queue: Arc<RetirementQueue>,
    /// Frame the current segment belongs to
    frame_value: u64,
    segment: Vec<Handle>,
}

impl TransformTable {
    pub(crate) fn new(heap: Arc<DescriptorHeap>, queue: Arc<RetirementQueue>, frame_value: u64) -> Self {
        debug_assert_eq!(heap.kind(), ResourceKind::Transform);
        Self {
            heap,
            queue,
            frame_value,
            segment: Vec::new(),
        }
    }

    /// Start a new segment for frame `value`, releasing the previous one
    pub fn begin_frame(&mut self, value: u64) -> Result<()> {
        let released = self.release_segment()?;
        if released > 0 {
            table_trace!(
                "bindless::Transform",
                "Released {} transforms of frame {}",
                released,
                self.frame_value
            );
        }
        self.frame_value = value;
        Ok(())
    }

    /// Store one matrix for push-constant addressing
    pub fn push(&mut self, matrix: Mat4) -> Result<Handle> {
        let handle = self.heap.allocate()?;
        self.segment.push(handle);
        self.heap.write(handle, DescriptorPayload::Transform(matrix))?;
        Ok(handle)
    }

    /// Store matrices at consecutive indices for instance-index addressing
    pub fn push_instances(&mut self, matrices: &[Mat4]) -> Result<InstanceRange> {
        if matrices.is_empty() {
            return Ok(InstanceRange { first_instance: 0, count: 0 });
        }

        let handles = self.heap.allocate_contiguous(matrices.len() as u32)?;
        self.segment.extend_from_slice(&handles);
        for (handle, matrix) in handles.iter().zip(matrices) {
            self.heap.write(*handle, DescriptorPayload::Transform(*matrix))?;
        }

        Ok(InstanceRange {
            first_instance: handles[0].binding_index(),
            count: matrices.len() as u32,
        })
    }

    /// Matrix stored behind a handle of the current segment
    pub fn matrix(&self, handle: Handle) -> Result<Mat4> {
        match self.heap.payload(handle)? {
            Some(DescriptorPayload::Transform(matrix)) => Ok(matrix),
            _ => Err(Error::SlotNotReady(handle)),
        }
    }

    /// Matrices pushed in the current frame
    pub fn len(&self) -> usize {
        self.segment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segment.is_empty()
    }

    pub fn frame_value(&self) -> u64 {
        self.frame_value
    }

    /// Release every handle of the segment
    ///
    /// A handle the caller already released through the table is skipped.
    /// Any other failure is returned once the whole segment was walked.
    pub(crate) fn release_segment(&mut self) -> Result<usize> {
        let mut released = 0;
        let mut first_error = None;
        for handle in self.segment.drain(..) {
            let result = self
                .heap
                .release(handle)
                .and_then(|()| self.queue.enqueue(handle, self.frame_value));
            match result {
                Ok(()) => released += 1,
                Err(Error::StaleHandle { .. }) => {
                    table_warn!("bindless::Transform", "Transform {} was released outside its segment", handle);
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(released),
        }
    }
}

#[cfg(test)]
#[path = "transform_table_tests.rs"]
mod tests;
