//! Unit tests for log.rs
//!
//! Tests LogSeverity ordering, LogEntry construction and DefaultLogger output paths.
//! Tests touching the global logger live in tests/logging_integration_tests.rs
//! so they can be serialized.

use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
use std::time::SystemTime;

fn entry(severity: LogSeverity, file: Option<&'static str>, line: Option<u32>) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "bindless::Heap".to_string(),
        message: format!("{:?} message", severity),
        file,
        line,
    }
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_debug_names() {
    assert_eq!(format!("{:?}", LogSeverity::Trace), "Trace");
    assert_eq!(format!("{:?}", LogSeverity::Warn), "Warn");
    assert_eq!(format!("{:?}", LogSeverity::Error), "Error");
}

// ============================================================================
// LOG ENTRY TESTS
// ============================================================================

#[test]
fn test_log_entry_with_location() {
    let e = entry(LogSeverity::Error, Some("descriptor_heap.rs"), Some(42));

    assert_eq!(e.severity, LogSeverity::Error);
    assert_eq!(e.source, "bindless::Heap");
    assert_eq!(e.file, Some("descriptor_heap.rs"));
    assert_eq!(e.line, Some(42));
}

#[test]
fn test_log_entry_clone_keeps_fields() {
    let e1 = entry(LogSeverity::Warn, None, None);
    let e2 = e1.clone();

    assert_eq!(e1.severity, e2.severity);
    assert_eq!(e1.message, e2.message);
    assert!(e2.file.is_none());
}

// ============================================================================
// DEFAULT LOGGER TESTS
// ============================================================================

#[test]
fn test_default_logger_all_severities() {
    let logger = DefaultLogger;
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        // Both output branches must not panic
        logger.log(&entry(severity, None, None));
        logger.log(&entry(severity, Some("test.rs"), Some(7)));
    }
}

// ============================================================================
// LOGGER TRAIT TESTS
// ============================================================================

struct CountingLogger {
    count: std::sync::Mutex<usize>,
}

impl Logger for CountingLogger {
    fn log(&self, _entry: &LogEntry) {
        *self.count.lock().unwrap() += 1;
    }
}

#[test]
fn test_custom_logger_implementation() {
    let logger = CountingLogger { count: std::sync::Mutex::new(0) };

    logger.log(&entry(LogSeverity::Info, None, None));
    logger.log(&entry(LogSeverity::Info, None, None));

    assert_eq!(*logger.count.lock().unwrap(), 2);
}

#[test]
fn test_logger_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<DefaultLogger>();
    assert_send_sync::<CountingLogger>();
}
