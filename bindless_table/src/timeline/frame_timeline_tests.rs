use super::*;

#[test]
fn test_new_timeline() {
    let timeline = FrameTimeline::new(2);
    assert_eq!(timeline.submission_value(), 1);
    assert_eq!(timeline.retired_value(), 0);
    assert_eq!(timeline.in_flight(), 0);
    assert_eq!(timeline.backpressure_target(), None);
}

#[test]
fn test_zero_frames_in_flight_clamped() {
    assert_eq!(FrameTimeline::new(0).frames_in_flight(), 1);
}

#[test]
fn test_advance_returns_closed_value() {
    let mut timeline = FrameTimeline::new(2);
    assert_eq!(timeline.advance(), 1);
    assert_eq!(timeline.advance(), 2);
    assert_eq!(timeline.submission_value(), 3);
    assert_eq!(timeline.last_submitted_value(), 2);
    assert_eq!(timeline.in_flight(), 2);
}

#[test]
fn test_retire_to_is_monotonic_and_bounded() {
    let mut timeline = FrameTimeline::new(2);
    timeline.advance();
    timeline.advance();

    assert!(timeline.retire_to(1));
    assert!(!timeline.retire_to(1));
    assert!(!timeline.retire_to(0));
    assert_eq!(timeline.retired_value(), 1);

    // Never beyond what was submitted
    assert!(timeline.retire_to(50));
    assert_eq!(timeline.retired_value(), 2);
}

#[test]
fn test_backpressure_target() {
    let mut timeline = FrameTimeline::new(2);
    timeline.advance(); // recording 2
    assert_eq!(timeline.backpressure_target(), None);

    timeline.advance(); // recording 3, frame 1 must retire first
    assert_eq!(timeline.backpressure_target(), Some(1));

    timeline.retire_to(1);
    assert_eq!(timeline.backpressure_target(), None);
}

#[test]
fn test_shared_submission_sees_advances() {
    let mut timeline = FrameTimeline::new(3);
    let shared = timeline.shared_submission();
    timeline.advance();
    assert_eq!(shared.load(Ordering::SeqCst), 2);
}
