use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use crate::base::mem::HasMemory;
use crate::base::unit::{lock_read, lock_write, shared, MemoryHandle, MemoryUnit, Unit};
use crate::cache::{BlockingCache, CacheConfig, NonBlockingCache};
use crate::mem::transaction::{Addr, MemoryRequest, MemoryReturn};
use crate::units::memory::{MemoryConfig, SimpleMemory};

/// Drives a cache from the test as if the test were the processing element above it, with a
/// `SimpleMemory` below it. Requests queue per port and are offered in fall; returns are
/// collected in rise.
pub struct Bench<C: MemoryUnit> {
    pub cache: Arc<RwLock<C>>,
    pub memory: Arc<RwLock<SimpleMemory>>,
    pub returns: Vec<(u64, MemoryReturn)>,
    pub cycle: u64,
    /// Ports whose returns the test is currently refusing to read.
    pub stalled_ports: Vec<usize>,
    num_ports: usize,
    pending: Vec<VecDeque<MemoryRequest>>,
}

pub fn cache_config(num_ports: usize, num_banks: usize, num_lfb: usize) -> CacheConfig {
    CacheConfig {
        size: 1 << 10,
        block_size: 32,
        associativity: 2,
        num_ports,
        num_banks,
        num_lfb,
        data_array_latency: 1,
        port_queue_depth: 8,
        ..CacheConfig::default()
    }
}

fn memory(config: &CacheConfig, latency: u32) -> Arc<RwLock<SimpleMemory>> {
    shared(SimpleMemory::new(
        "memory",
        MemoryConfig {
            size: 1 << 16,
            num_ports: config.downstream_ports_used(),
            num_channels: 1,
            latency,
            ..MemoryConfig::default()
        },
    ))
}

impl Bench<NonBlockingCache> {
    pub fn non_blocking(config: CacheConfig, memory_latency: u32) -> Self {
        let memory = memory(&config, memory_latency);
        let downstream: MemoryHandle = memory.clone();
        let num_ports = config.num_ports;
        Self::new(shared(NonBlockingCache::new("l1", config, downstream)), memory, num_ports)
    }
}

impl Bench<BlockingCache> {
    pub fn blocking(config: CacheConfig, memory_latency: u32) -> Self {
        let memory = memory(&config, memory_latency);
        let downstream: MemoryHandle = memory.clone();
        let num_ports = config.num_ports;
        Self::new(shared(BlockingCache::new("l1", config, downstream)), memory, num_ports)
    }
}

impl<C: MemoryUnit> Bench<C> {
    fn new(cache: Arc<RwLock<C>>, memory: Arc<RwLock<SimpleMemory>>, num_ports: usize) -> Self {
        Self {
            cache,
            memory,
            returns: Vec::new(),
            cycle: 0,
            stalled_ports: Vec::new(),
            num_ports,
            pending: Vec::new(),
        }
    }

    pub fn preload(&self, addr: Addr, data: &[u8]) {
        lock_write(&self.memory).memory_mut().preload(addr, data).unwrap();
    }

    pub fn memory_bytes(&self, addr: Addr, n: usize) -> Vec<u8> {
        lock_read(&self.memory).memory().read(addr, n).unwrap().to_vec()
    }

    pub fn push(&mut self, request: MemoryRequest) {
        if self.pending.len() <= request.port {
            self.pending.resize_with(request.port + 1, VecDeque::new);
        }
        self.pending[request.port].push_back(request);
    }

    pub fn pending(&self, port: usize) -> usize {
        self.pending.get(port).map_or(0, VecDeque::len)
    }

    pub fn step(&mut self) {
        {
            let mut cache = lock_write(&self.cache);
            for port in 0..self.num_ports {
                if self.stalled_ports.contains(&port) {
                    continue;
                }
                if cache.return_port_read_valid(port) {
                    let ret = cache.read_return(port);
                    self.returns.push((self.cycle, ret));
                }
            }
            cache.clock_rise();
        }
        lock_write(&self.memory).clock_rise();

        {
            let mut cache = lock_write(&self.cache);
            for queue in self.pending.iter_mut() {
                let Some(request) = queue.front() else {
                    continue;
                };
                if cache.request_port_write_valid(request.port) {
                    let request = queue.pop_front().unwrap();
                    cache.write_request(request);
                }
            }
            cache.clock_fall();
        }
        lock_write(&self.memory).clock_fall();
        self.cycle += 1;
    }

    pub fn is_busy(&self) -> bool {
        self.pending.iter().any(|queue| !queue.is_empty())
            || lock_read(&self.cache).is_executing()
            || lock_read(&self.memory).is_executing()
    }

    /// Steps until everything drains, failing the test after `limit` cycles.
    pub fn run(&mut self, limit: u64) {
        while self.is_busy() {
            assert!(self.cycle < limit, "bench did not drain within {} cycles", limit);
            self.step();
        }
    }

    pub fn returns_for(&self, port: usize) -> Vec<&MemoryReturn> {
        self.returns
            .iter()
            .filter(|(_, ret)| ret.port == port)
            .map(|(_, ret)| ret)
            .collect()
    }
}
