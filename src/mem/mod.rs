pub mod bits;
pub mod flat;
pub mod transaction;

pub use transaction::{Addr, MemoryRequest, MemoryReturn, Payload, RequestType, ReturnType, MAX_BLOCK_SIZE};
