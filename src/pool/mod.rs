// Pool module - Pre-allocated typed buffers shared by the DSP stages

pub mod global;
pub mod slot;
pub mod vector_pool;

pub use slot::{SlotBuffer, SlotGuard, VectorKind, VectorSlot};
pub use vector_pool::VectorBufferPool;
