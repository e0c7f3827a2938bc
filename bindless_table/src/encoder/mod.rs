/// Encoder module - push-constant layouts of the pipeline variants

// Module declarations
pub mod push_constant;

// Re-export everything public
pub use push_constant::*;
pub use crate::handle::decode_binding_index;
