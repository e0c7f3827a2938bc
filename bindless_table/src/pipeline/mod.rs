/// Pipeline module - shader variants and their build-time validation

// Module declarations
pub mod capabilities;
pub mod variant;
pub mod pipeline_desc;

// Re-export everything public
pub use capabilities::*;
pub use variant::*;
pub use pipeline_desc::*;
