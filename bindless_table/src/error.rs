//! Error types for the bindless table
//!
//! Every fallible table operation returns `Result<T>`. Exhaustion and
//! stale-handle errors are caller-facing and recoverable; device loss and
//! retirement timeouts are fatal for the table that produced them.

use std::fmt;
use std::time::Duration;
use crate::handle::{Handle, ResourceKind};

/// Result type for table operations
pub type Result<T> = std::result::Result<T, Error>;

/// Bindless table errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The kind's capacity ceiling is reached and no slot is free
    HeapExhausted {
        kind: ResourceKind,
        ceiling: u32,
    },

    /// Generation or state mismatch (double release, use after recycle, write while pending release)
    StaleHandle {
        handle: Handle,
        current_generation: u16,
    },

    /// Handle or payload given to a heap of a different kind
    KindMismatch {
        expected: ResourceKind,
        found: ResourceKind,
    },

    /// The slot has no published descriptor yet, it cannot be encoded into a draw
    SlotNotReady(Handle),

    /// Pipeline variant built without a capability it needs
    InvalidPipelineConfiguration(String),

    /// The backend reported device loss
    DeviceLost(String),

    /// The backend stopped retiring work
    GpuTimeout {
        value: u64,
        waited: Duration,
    },

    /// Backend-specific error (Vulkan, ...)
    BackendError(String),

    /// Table or backend creation failed
    InitializationFailed(String),
}

impl Error {
    /// Whether the error requires a full renderer teardown
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::DeviceLost(_) | Error::GpuTimeout { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::HeapExhausted { kind, ceiling } => {
                write!(f, "Heap exhausted: {} heap reached its ceiling of {} slots", kind, ceiling)
            }
            Error::StaleHandle { handle, current_generation } => {
                write!(f, "Stale handle: {} (slot is at generation {})", handle, current_generation)
            }
            Error::KindMismatch { expected, found } => {
                write!(f, "Kind mismatch: expected {}, found {}", expected, found)
            }
            Error::SlotNotReady(handle) => {
                write!(f, "Slot not ready: {} has no published descriptor", handle)
            }
            Error::InvalidPipelineConfiguration(msg) => {
                write!(f, "Invalid pipeline configuration: {}", msg)
            }
            Error::DeviceLost(msg) => write!(f, "Device lost: {}", msg),
            Error::GpuTimeout { value, waited } => {
                write!(f, "GPU timeout: timeline value {} not retired after {:?}", value, waited)
            }
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Log an error with file:line and build an `Error::BackendError` from it
///
/// ```ignore
/// device.wait_idle().map_err(|e| table_err!("bindless::vulkan", "wait idle failed: {:?}", e))?;
/// ```
#[macro_export]
macro_rules! table_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::log::emit_detailed(
            $crate::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!()
        );
        $crate::bindless::Error::BackendError(message)
    }};
}

/// Log an error and return `Err(Error::BackendError)` from the current function
#[macro_export]
macro_rules! table_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::table_err!($source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
