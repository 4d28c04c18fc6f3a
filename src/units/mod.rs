pub mod buffer;
pub mod memory;
pub mod traffic;

pub use buffer::{BufferConfig, ScratchpadBuffer};
pub use memory::{MemoryConfig, MemoryStats, SimpleMemory};
pub use traffic::{expected_word, Pattern, TrafficConfig, TrafficGenerator, TrafficStats};
