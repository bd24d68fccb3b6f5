pub mod memory;

pub use memory::{MemoryChannel, MemoryGroup};
