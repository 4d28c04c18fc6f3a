pub mod blocking;
pub mod config;
pub mod lfb;
pub mod non_blocking;
pub mod stats;
mod tag_array;

pub use blocking::BlockingCache;
pub use config::{CacheConfig, CacheKind};
pub use non_blocking::NonBlockingCache;
pub use stats::CacheStats;

use crate::base::unit::MemoryUnit;

/// What the system needs from a cache beyond the port contract.
pub trait Cache: MemoryUnit {
    fn stats(&self) -> CacheStats;
    fn invalidate_all(&mut self);
}

impl Cache for NonBlockingCache {
    fn stats(&self) -> CacheStats {
        NonBlockingCache::stats(self)
    }

    fn invalidate_all(&mut self) {
        NonBlockingCache::invalidate_all(self)
    }
}

impl Cache for BlockingCache {
    fn stats(&self) -> CacheStats {
        BlockingCache::stats(self)
    }

    fn invalidate_all(&mut self) {
        BlockingCache::invalidate_all(self)
    }
}
