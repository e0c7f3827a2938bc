/// Headless backend - a CPU-simulated GPU
///
/// The simulated GPU completes frames a fixed number of submissions behind
/// the CPU: with a pipeline depth of `D`, once value `N` is submitted every
/// value up to `N - (D - 1)` is complete. Waits succeed immediately by
/// letting the GPU catch up, unless the GPU is stalled, in which case they
/// time out. `HeadlessControl` lets tests and tools stall the GPU, lose the
/// device and inspect what the table published.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use crate::backend::{DeviceLimits, TableBackend};
use crate::error::{Error, Result};
use crate::heap::DescriptorWrite;
use crate::pipeline::{DeviceCapabilities, PipelineLayoutDesc};

#[derive(Debug)]
struct HeadlessState {
    depth: u64,
    submitted: u64,
    completed: u64,
    stalled: bool,
    device_lost: bool,
    fail_writes: bool,
    applied_writes: Vec<DescriptorWrite>,
    write_batches: u32,
    prepared_layouts: Vec<PipelineLayoutDesc>,
    destroyed: bool,
}

impl HeadlessState {
    fn check_device(&self) -> Result<()> {
        if self.device_lost {
            Err(Error::DeviceLost("headless device lost".to_string()))
        } else {
            Ok(())
        }
    }

    fn catch_up(&mut self, value: u64) {
        if !self.stalled {
            self.completed = self.completed.max(value.min(self.submitted));
        }
    }
}

/// CPU-simulated backend
pub struct HeadlessBackend {
    state: Arc<Mutex<HeadlessState>>,
    capabilities: DeviceCapabilities,
    limits: DeviceLimits,
}

impl HeadlessBackend {
    /// Simulated GPU running `depth` frames behind the CPU (1 = completes on submit)
    pub fn new(depth: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HeadlessState {
                depth: u64::from(depth.max(1)),
                submitted: 0,
                completed: 0,
                stalled: false,
                device_lost: false,
                fail_writes: false,
                applied_writes: Vec::new(),
                write_batches: 0,
                prepared_layouts: Vec::new(),
                destroyed: false,
            })),
            capabilities: DeviceCapabilities::BINDLESS,
            limits: DeviceLimits::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Control handle sharing this backend's simulated GPU
    pub fn control(&self) -> HeadlessControl {
        HeadlessControl { state: self.state.clone() }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HeadlessState>> {
        self.state
            .lock()
            .map_err(|_| crate::table_err!("bindless::headless", "headless state lock poisoned"))
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(2)
    }
}

impl TableBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn frame_submitted(&mut self, value: u64) -> Result<()> {
        let mut state = self.lock()?;
        state.check_device()?;
        state.submitted = state.submitted.max(value);
        let reached = value.saturating_sub(state.depth - 1);
        state.catch_up(reached);
        Ok(())
    }

    fn completed_value(&mut self) -> Result<u64> {
        let state = self.lock()?;
        state.check_device()?;
        Ok(state.completed)
    }

    fn wait_for_value(&mut self, value: u64, timeout: Duration) -> Result<bool> {
        {
            let mut state = self.lock()?;
            state.check_device()?;
            state.catch_up(value);
            if state.completed >= value {
                return Ok(true);
            }
        }
        // A stalled GPU never signals: the wait runs out its full timeout
        std::thread::sleep(timeout);
        Ok(false)
    }

    fn apply_writes(&mut self, writes: &[DescriptorWrite]) -> Result<()> {
        let mut state = self.lock()?;
        state.check_device()?;
        if state.fail_writes {
            return Err(Error::BackendError("headless descriptor update rejected".to_string()));
        }
        state.applied_writes.extend_from_slice(writes);
        state.write_batches += 1;
        Ok(())
    }

    fn prepare_pipeline(&mut self, layout: &PipelineLayoutDesc) -> Result<u64> {
        let mut state = self.lock()?;
        state.check_device()?;
        if let Some(position) = state.prepared_layouts.iter().position(|l| l == layout) {
            return Ok(position as u64 + 1);
        }
        state.prepared_layouts.push(layout.clone());
        Ok(state.prepared_layouts.len() as u64)
    }

    fn wait_idle(&mut self) -> Result<()> {
        let mut state = self.lock()?;
        state.check_device()?;
        if state.stalled {
            return Err(Error::GpuTimeout {
                value: state.submitted,
                waited: Duration::ZERO,
            });
        }
        state.completed = state.submitted;
        Ok(())
    }

    fn destroy(&mut self) {
        if let Ok(mut state) = self.lock() {
            state.destroyed = true;
        }
    }
}

/// Test and tooling handle onto a `HeadlessBackend`'s simulated GPU
#[derive(Clone)]
pub struct HeadlessControl {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessControl {
    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Freeze (or unfreeze) GPU progress
    pub fn set_stalled(&self, stalled: bool) {
        self.state().stalled = stalled;
    }

    /// Report device loss from now on
    pub fn lose_device(&self) {
        self.state().device_lost = true;
    }

    /// Reject the next descriptor update batches
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Complete everything submitted so far (ignores a stall)
    pub fn complete_all(&self) {
        let mut state = self.state();
        state.completed = state.submitted;
    }

    pub fn completed_value(&self) -> u64 {
        self.state().completed
    }

    pub fn submitted_value(&self) -> u64 {
        self.state().submitted
    }

    /// Every descriptor update applied so far, in application order
    pub fn applied_writes(&self) -> Vec<DescriptorWrite> {
        self.state().applied_writes.clone()
    }

    pub fn write_batches(&self) -> u32 {
        self.state().write_batches
    }

    pub fn prepared_layouts(&self) -> usize {
        self.state().prepared_layouts.len()
    }

    pub fn destroyed(&self) -> bool {
        self.state().destroyed
    }
}

#[cfg(test)]
#[path = "headless_tests.rs"]
mod tests;
