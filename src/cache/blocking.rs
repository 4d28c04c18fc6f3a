use std::sync::Arc;

use log::debug;

use crate::base::unit::{lock_write, MemoryHandle, MemoryUnit, Unit};
use crate::cache::config::CacheConfig;
use crate::cache::stats::CacheStats;
use crate::cache::tag_array::TagArray;
use crate::interconnect::crossbar::{build_network, AddressRoute, Network, PortRoute};
use crate::interconnect::pipeline::Pipeline;
use crate::mem::transaction::{Addr, MemoryRequest, MemoryReturn, RequestType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankState {
    Idle,
    /// Needs the downstream request port: a fill to fetch or a store to forward.
    Missed,
    /// Fill requested, waiting on the return.
    Issued,
    /// Fill installed, the waiting load still has to be answered.
    Filled,
}

struct Bank {
    state: BankState,
    request: MemoryRequest,
    data_array: Pipeline<MemoryReturn>,
}

/// Banked cache with one outstanding transaction per bank. Stores write through and never
/// allocate.
pub struct BlockingCache {
    name: String,
    config: CacheConfig,
    tags: TagArray,
    banks: Vec<Bank>,
    request_network: Box<dyn Network<MemoryRequest>>,
    return_network: Box<dyn Network<MemoryReturn>>,
    downstream: MemoryHandle,
    stats: CacheStats,
}

impl BlockingCache {
    pub fn new(name: impl Into<String>, config: CacheConfig, downstream: MemoryHandle) -> Self {
        config.ensure_valid();
        let request_network = build_network(
            config.num_ports,
            config.num_banks,
            config.crossbar_width,
            config.port_queue_depth,
            AddressRoute::new(config.bank_select_mask()),
        );
        let return_network = build_network(
            config.num_banks,
            config.num_ports,
            config.crossbar_width,
            config.port_queue_depth,
            PortRoute,
        );
        let banks = (0..config.num_banks)
            .map(|_| Bank {
                state: BankState::Idle,
                request: MemoryRequest::default(),
                data_array: Pipeline::new(config.data_array_latency),
            })
            .collect();
        Self {
            name: name.into(),
            tags: TagArray::new(config.size, config.block_size, config.associativity),
            config,
            banks,
            request_network,
            return_network,
            downstream,
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn bank_state(&self, bank: usize) -> BankState {
        self.banks[bank].state
    }

    pub fn is_resident(&self, addr: Addr) -> bool {
        self.tags.probe(addr)
    }

    pub fn invalidate_all(&mut self) {
        assert!(!self.is_executing(), "{}: invalidate with transactions in flight", self.name);
        self.tags.invalidate_all();
    }

    fn accept_request(&mut self, bank: usize) {
        if !self.request_network.is_read_valid(bank) || !self.banks[bank].data_array.is_write_valid() {
            return;
        }
        if self.request_network.pending(bank) > 1 {
            self.stats.record_bank_conflict();
        }

        let request = self.request_network.read(bank);
        let offset = self.tags.block_offset(request.addr);
        assert!(
            offset + request.size <= self.tags.block_size(),
            "{}: request @ {:#x} of {} bytes straddles a block",
            self.name,
            request.addr,
            request.size
        );
        self.stats.record_request();

        let b = &mut self.banks[bank];
        match request.ty {
            RequestType::Load | RequestType::Prefetch => {
                if request.ty == RequestType::Prefetch {
                    self.stats.record_prefetch();
                }
                self.stats.record_tag_array_access();
                match self.tags.get(request.addr) {
                    Some(data) => {
                        self.stats.record_hit();
                        self.stats.record_data_array_read();
                        if request.ty == RequestType::Load {
                            let ret = MemoryReturn::from_request(&request, data.slice(offset, request.size));
                            b.data_array.write(ret);
                        }
                    }
                    None => {
                        self.stats.record_miss();
                        debug!("{} bank {}: miss @ {:#x}", self.name, bank, request.addr);
                        b.state = BankState::Missed;
                        b.request = request;
                    }
                }
            }
            RequestType::Store => {
                let mask = request.write_mask;
                self.stats.record_store();
                self.stats.record_tag_array_access();
                if self
                    .tags
                    .write_bytes(request.addr, request.data.slice(0, request.size), mask)
                {
                    self.stats.record_data_array_write();
                }
                self.stats.record_uncached_write();
                b.state = BankState::Missed;
                b.request = request;
            }
            RequestType::Na => panic!("{}: request with no type @ {:#x}", self.name, request.addr),
            ty => panic!(
                "{}: {:?} @ {:#x} must target a memory-side unit",
                self.name, ty, request.addr
            ),
        }
    }

    fn accept_fill(&mut self, bank: usize, downstream: &mut dyn MemoryUnit) {
        let port = self.config.downstream_port(bank);
        if !downstream.return_port_read_valid(port) {
            return;
        }
        let ret = downstream.read_return(port);
        let b = &mut self.banks[bank];
        assert_eq!(
            ret.addr,
            self.tags.block_addr(b.request.addr),
            "{}: fill @ {:#x} does not match the outstanding miss",
            self.name,
            ret.addr
        );

        self.stats.record_tag_array_access();
        self.stats.record_data_array_write();
        if let Some(evicted) = self.tags.insert(ret.addr, &ret.data) {
            debug!("{} bank {}: evict @ {:#x}", self.name, bank, evicted);
        }
        let offset = self.tags.block_offset(b.request.addr);
        let size = b.request.size;
        b.request.data.write_bytes(0, ret.data.slice(offset, size));
        b.state = BankState::Filled;
        debug!("{} bank {}: fill @ {:#x}", self.name, bank, ret.addr);
    }

    fn issue_downstream(&mut self, bank: usize, downstream: &mut dyn MemoryUnit) {
        let port = self.config.downstream_port(bank);
        if !downstream.request_port_write_valid(port) {
            return;
        }
        let block_size = self.tags.block_size();
        let b = &mut self.banks[bank];
        if b.request.ty == RequestType::Store {
            let mut forward = b.request.clone();
            forward.port = port;
            downstream.write_request(forward);
            self.stats.record_downstream_store();
            b.state = BankState::Idle;
        } else {
            let block_addr = self.tags.block_addr(b.request.addr);
            downstream.write_request(MemoryRequest::load(block_addr, block_size, port));
            self.stats.record_downstream_load();
            b.state = BankState::Issued;
        }
    }

    fn drain_bank(&mut self, bank: usize) {
        let b = &mut self.banks[bank];
        if b.state == BankState::Filled {
            if b.request.ty == RequestType::Prefetch {
                b.state = BankState::Idle;
            } else if b.data_array.is_empty() && self.return_network.is_write_valid(bank) {
                let ret = MemoryReturn::from_request(&b.request, b.request.data.slice(0, b.request.size));
                self.return_network.write(ret, bank);
                self.stats.record_return();
                b.state = BankState::Idle;
            }
        }

        if b.data_array.is_read_valid() && self.return_network.is_write_valid(bank) {
            let ret = b.data_array.read();
            self.return_network.write(ret, bank);
            self.stats.record_return();
        }
    }
}

impl Unit for BlockingCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn clock_rise(&mut self) {
        self.request_network.clock();

        let downstream = Arc::clone(&self.downstream);
        let mut downstream = lock_write(&downstream);
        for bank in 0..self.banks.len() {
            self.banks[bank].data_array.clock();
            match self.banks[bank].state {
                BankState::Idle => self.accept_request(bank),
                BankState::Issued => self.accept_fill(bank, &mut *downstream),
                BankState::Missed | BankState::Filled => {}
            }
        }
    }

    fn clock_fall(&mut self) {
        {
            let downstream = Arc::clone(&self.downstream);
            let mut downstream = lock_write(&downstream);
            for bank in 0..self.banks.len() {
                if self.banks[bank].state == BankState::Missed {
                    self.issue_downstream(bank, &mut *downstream);
                }
                self.drain_bank(bank);
            }
        }

        self.return_network.clock();
    }

    fn is_executing(&self) -> bool {
        !self.request_network.is_idle()
            || !self.return_network.is_idle()
            || self
                .banks
                .iter()
                .any(|b| b.state != BankState::Idle || !b.data_array.is_empty())
    }
}

impl MemoryUnit for BlockingCache {
    fn request_port_write_valid(&self, port: usize) -> bool {
        self.request_network.is_write_valid(port)
    }

    fn write_request(&mut self, request: MemoryRequest) {
        let port = request.port;
        assert!(
            port < self.config.num_ports && self.request_network.is_write_valid(port),
            "{}: write to port {} while not valid",
            self.name,
            port
        );
        self.request_network.write(request, port);
    }

    fn return_port_read_valid(&self, port: usize) -> bool {
        self.return_network.is_read_valid(port)
    }

    fn peek_return(&self, port: usize) -> &MemoryReturn {
        self.return_network.peek(port)
    }

    fn read_return(&mut self, port: usize) -> MemoryReturn {
        assert!(
            self.return_network.is_read_valid(port),
            "{}: read from port {} while not valid",
            self.name,
            port
        );
        self.return_network.read(port)
    }
}
