/// FrameTimeline - CPU submission counter and GPU retirement watermark
///
/// Timeline values name frames. The frame currently being recorded carries
/// the submission value; once the backend reports a value as completed,
/// every frame up to it has retired and nothing the GPU does can still read
/// descriptors released during those frames.
///
/// ```text
///   retired       in flight           recording
///  ... 3 4 | 5 6 ... (submitted - 1) | submitted
/// ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct FrameTimeline {
    /// Value of the frame being recorded (shared with `TableAllocator`s)
    submitted: Arc<AtomicU64>,
    /// Highest value confirmed retired by the backend
    retired: u64,
    frames_in_flight: u32,
}

impl FrameTimeline {
    /// Start a timeline: frame 1 is being recorded, nothing has retired
    pub fn new(frames_in_flight: u32) -> Self {
        Self {
            submitted: Arc::new(AtomicU64::new(1)),
            retired: 0,
            frames_in_flight: frames_in_flight.max(1),
        }
    }

    /// Value of the frame being recorded; releases are tagged with it
    pub fn submission_value(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Highest value the backend confirmed as retired
    pub fn retired_value(&self) -> u64 {
        self.retired
    }

    /// Most recent value handed to the GPU
    pub fn last_submitted_value(&self) -> u64 {
        self.submission_value() - 1
    }

    pub fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    /// Submitted frames the GPU has not retired yet
    pub fn in_flight(&self) -> u64 {
        self.last_submitted_value() - self.retired
    }

    /// Close the recording frame and open the next one, returning the closed value
    pub fn advance(&mut self) -> u64 {
        self.submitted.fetch_add(1, Ordering::SeqCst)
    }

    /// Value the CPU must wait for before recording more, if it is too far ahead
    ///
    /// The recording frame counts toward `frames_in_flight`, so with the
    /// default of 2 the CPU records frame N+2 only once frame N retired.
    pub fn backpressure_target(&self) -> Option<u64> {
        let submitted = self.submission_value();
        let limit = u64::from(self.frames_in_flight);
        if submitted - self.retired > limit {
            Some(submitted - limit)
        } else {
            None
        }
    }

    /// Record a retirement report, returning whether the watermark moved
    ///
    /// The watermark never moves backwards and never passes the last
    /// submitted value.
    pub fn retire_to(&mut self, value: u64) -> bool {
        let value = value.min(self.last_submitted_value());
        if value > self.retired {
            self.retired = value;
            true
        } else {
            false
        }
    }

    pub(crate) fn shared_submission(&self) -> Arc<AtomicU64> {
        self.submitted.clone()
    }
}

#[cfg(test)]
#[path = "frame_timeline_tests.rs"]
mod tests;
