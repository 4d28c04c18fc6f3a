use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::mem::transaction::{MemoryRequest, MemoryReturn};

/// Anything the simulator clocks. Rise senses and allocates; fall issues and commits.
pub trait Unit: Send + Sync {
    fn name(&self) -> &str;

    fn clock_rise(&mut self);

    fn clock_fall(&mut self);

    /// Whether the unit still has outstanding work. The simulator stops once no unit does.
    fn is_executing(&self) -> bool {
        false
    }
}

/// The port contract every memory-capable unit implements. It is the only coupling between
/// units: nothing blocks, and calling `write_request`/`read_return` on a port that is not
/// valid is a protocol violation.
pub trait MemoryUnit: Unit {
    /// Clock fall only.
    fn request_port_write_valid(&self, port: usize) -> bool;
    /// Clock fall only. The request is accepted on `request.port`.
    fn write_request(&mut self, request: MemoryRequest);

    /// Clock rise only.
    fn return_port_read_valid(&self, port: usize) -> bool;
    fn peek_return(&self, port: usize) -> &MemoryReturn;
    fn read_return(&mut self, port: usize) -> MemoryReturn;
}

pub type UnitHandle = Arc<RwLock<dyn Unit>>;

/// Non-owning view of a downstream unit held by its upstream neighbour.
pub type MemoryHandle = Arc<RwLock<dyn MemoryUnit>>;

pub fn shared<U>(unit: U) -> Arc<RwLock<U>> {
    Arc::new(RwLock::new(unit))
}

pub fn lock_read<T: ?Sized>(handle: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    handle.read().expect("rw lock poisoned")
}

pub fn lock_write<T: ?Sized>(handle: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    handle.write().expect("rw lock poisoned")
}
