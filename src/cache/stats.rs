use serde::Serialize;
use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    requests: u64,
    hits: u64,
    misses: u64,
    half_misses: u64,
    lfb_hits: u64,
    lfb_stalls: u64,
    store_stalls: u64,
    bank_conflicts: u64,
    stores: u64,
    uncached_writes: u64,
    prefetches: u64,
    tag_array_accesses: u64,
    data_array_reads: u64,
    data_array_writes: u64,
    downstream_loads: u64,
    downstream_stores: u64,
    returns: u64,
}

impl CacheStats {
    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn half_misses(&self) -> u64 {
        self.half_misses
    }

    pub fn lfb_hits(&self) -> u64 {
        self.lfb_hits
    }

    pub fn lfb_stalls(&self) -> u64 {
        self.lfb_stalls
    }

    /// Cycles a store waited for loads already pending on its line.
    pub fn store_stalls(&self) -> u64 {
        self.store_stalls
    }

    pub fn bank_conflicts(&self) -> u64 {
        self.bank_conflicts
    }

    pub fn stores(&self) -> u64 {
        self.stores
    }

    pub fn uncached_writes(&self) -> u64 {
        self.uncached_writes
    }

    pub fn prefetches(&self) -> u64 {
        self.prefetches
    }

    pub fn tag_array_accesses(&self) -> u64 {
        self.tag_array_accesses
    }

    pub fn data_array_reads(&self) -> u64 {
        self.data_array_reads
    }

    pub fn data_array_writes(&self) -> u64 {
        self.data_array_writes
    }

    pub fn downstream_loads(&self) -> u64 {
        self.downstream_loads
    }

    pub fn downstream_stores(&self) -> u64 {
        self.downstream_stores
    }

    pub fn returns(&self) -> u64 {
        self.returns
    }

    /// Hits plus misses; merged requests are counted separately.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }

    pub(crate) fn record_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits = self.hits.saturating_add(1);
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses = self.misses.saturating_add(1);
    }

    pub(crate) fn record_half_miss(&mut self) {
        self.half_misses = self.half_misses.saturating_add(1);
    }

    pub(crate) fn record_lfb_hit(&mut self) {
        self.lfb_hits = self.lfb_hits.saturating_add(1);
    }

    pub(crate) fn record_lfb_stall(&mut self) {
        self.lfb_stalls = self.lfb_stalls.saturating_add(1);
    }

    pub(crate) fn record_store_stall(&mut self) {
        self.store_stalls = self.store_stalls.saturating_add(1);
    }

    pub(crate) fn record_bank_conflict(&mut self) {
        self.bank_conflicts = self.bank_conflicts.saturating_add(1);
    }

    pub(crate) fn record_store(&mut self) {
        self.stores = self.stores.saturating_add(1);
    }

    pub(crate) fn record_uncached_write(&mut self) {
        self.uncached_writes = self.uncached_writes.saturating_add(1);
    }

    pub(crate) fn record_prefetch(&mut self) {
        self.prefetches = self.prefetches.saturating_add(1);
    }

    pub(crate) fn record_tag_array_access(&mut self) {
        self.tag_array_accesses = self.tag_array_accesses.saturating_add(1);
    }

    pub(crate) fn record_data_array_read(&mut self) {
        self.data_array_reads = self.data_array_reads.saturating_add(1);
    }

    pub(crate) fn record_data_array_write(&mut self) {
        self.data_array_writes = self.data_array_writes.saturating_add(1);
    }

    pub(crate) fn record_downstream_load(&mut self) {
        self.downstream_loads = self.downstream_loads.saturating_add(1);
    }

    pub(crate) fn record_downstream_store(&mut self) {
        self.downstream_stores = self.downstream_stores.saturating_add(1);
    }

    pub(crate) fn record_return(&mut self) {
        self.returns = self.returns.saturating_add(1);
    }
}

impl AddAssign<&CacheStats> for CacheStats {
    fn add_assign(&mut self, other: &CacheStats) {
        self.requests = self.requests.saturating_add(other.requests);
        self.hits = self.hits.saturating_add(other.hits);
        self.misses = self.misses.saturating_add(other.misses);
        self.half_misses = self.half_misses.saturating_add(other.half_misses);
        self.lfb_hits = self.lfb_hits.saturating_add(other.lfb_hits);
        self.lfb_stalls = self.lfb_stalls.saturating_add(other.lfb_stalls);
        self.store_stalls = self.store_stalls.saturating_add(other.store_stalls);
        self.bank_conflicts = self.bank_conflicts.saturating_add(other.bank_conflicts);
        self.stores = self.stores.saturating_add(other.stores);
        self.uncached_writes = self.uncached_writes.saturating_add(other.uncached_writes);
        self.prefetches = self.prefetches.saturating_add(other.prefetches);
        self.tag_array_accesses = self
            .tag_array_accesses
            .saturating_add(other.tag_array_accesses);
        self.data_array_reads = self.data_array_reads.saturating_add(other.data_array_reads);
        self.data_array_writes = self.data_array_writes.saturating_add(other.data_array_writes);
        self.downstream_loads = self.downstream_loads.saturating_add(other.downstream_loads);
        self.downstream_stores = self.downstream_stores.saturating_add(other.downstream_stores);
        self.returns = self.returns.saturating_add(other.returns);
    }
}

impl AddAssign<CacheStats> for CacheStats {
    fn add_assign(&mut self, other: CacheStats) {
        *self += &other;
    }
}
