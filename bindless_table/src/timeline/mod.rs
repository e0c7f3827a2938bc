/// Timeline module - delayed slot reclamation driven by GPU progress

// Module declarations
pub mod frame_timeline;
pub mod retirement_queue;

// Re-export everything public
pub use frame_timeline::*;
pub use retirement_queue::*;
