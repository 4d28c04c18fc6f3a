use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;

use crate::base::unit::{lock_write, MemoryHandle, MemoryUnit, Unit};
use crate::cache::config::CacheConfig;
use crate::cache::lfb::{Lfb, LfbPool, LfbState, LfbType, SubEntry};
use crate::cache::stats::CacheStats;
use crate::cache::tag_array::TagArray;
use crate::interconnect::crossbar::{build_network, AddressRoute, Network, PortRoute};
use crate::interconnect::pipeline::Pipeline;
use crate::mem::bits::{contiguous_run, nbit_mask};
use crate::mem::transaction::{Addr, MemoryRequest, MemoryReturn, Payload, RequestType, ReturnType};

struct Bank {
    lfbs: LfbPool,
    /// LFBs with work for the next level, misses and write-backs in acceptance order.
    request_queue: VecDeque<usize>,
    /// Filled LFBs with sub-entries to return.
    return_queue: VecDeque<usize>,
    /// `None` marks a cycle the data array spent installing a fill.
    data_array: Pipeline<Option<usize>>,
}

impl Bank {
    fn new(num_lfb: usize, latency: u32) -> Self {
        Self {
            lfbs: LfbPool::new(num_lfb),
            request_queue: VecDeque::new(),
            return_queue: VecDeque::new(),
            data_array: Pipeline::new(latency),
        }
    }

    fn is_idle(&self) -> bool {
        self.request_queue.is_empty()
            && self.return_queue.is_empty()
            && self.data_array.is_empty()
            && self.lfbs.is_quiescent()
    }
}

/// Banked cache that keeps serving hits while misses are outstanding. Every in-flight line
/// lives in a line-fill buffer; loads to a line that already has one merge into it, so a line
/// is fetched once however many requesters are waiting on it. Stores accumulate in
/// write-combining LFBs and leave the cache as masked stores.
pub struct NonBlockingCache {
    name: String,
    config: CacheConfig,
    tags: TagArray,
    banks: Vec<Bank>,
    request_network: Box<dyn Network<MemoryRequest>>,
    return_network: Box<dyn Network<MemoryReturn>>,
    downstream: MemoryHandle,
    stats: CacheStats,
}

impl NonBlockingCache {
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
            .map(|_| Bank::new(config.num_lfb, config.data_array_latency))
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

    pub fn lfbs(&self, bank: usize) -> impl Iterator<Item = &Lfb> {
        self.banks[bank].lfbs.iter()
    }

    /// Whether the block is resident in the tag array.
    pub fn is_resident(&self, addr: Addr) -> bool {
        self.tags.probe(addr)
    }

    /// Drops every resident block. Only legal while nothing is in flight.
    pub fn invalidate_all(&mut self) {
        assert!(!self.is_executing(), "{}: invalidate with transactions in flight", self.name);
        self.tags.invalidate_all();
        for bank in self.banks.iter_mut() {
            bank.lfbs = LfbPool::new(self.config.num_lfb);
        }
    }

    fn clock_data_array(&mut self, bank: usize) {
        let b = &mut self.banks[bank];
        b.data_array.clock();
        if !b.data_array.is_read_valid() {
            return;
        }
        if let Some(index) = b.data_array.read() {
            let lfb = b.lfbs.get_mut(index);
            assert_eq!(lfb.state, LfbState::DataArray);
            lfb.state = LfbState::Filled;
            b.return_queue.push_back(index);
        }
    }

    /// Installs a fill from the next level. The data array is busy for the cycle, so the bank
    /// takes no request when this returns true.
    fn process_return(&mut self, bank: usize, downstream: &mut dyn MemoryUnit) -> bool {
        let port = self.config.downstream_port(bank);
        if !downstream.return_port_read_valid(port) {
            return false;
        }
        let ret = downstream.read_return(port);
        assert_eq!(
            ret.addr,
            self.tags.block_addr(ret.addr),
            "{}: fill @ {:#x} is not block aligned",
            self.name,
            ret.addr
        );

        let b = &mut self.banks[bank];
        let index = ret.dst as usize;
        assert!(index < b.lfbs.len(), "{}: fill tagged with unknown LFB {}", self.name, index);
        let lfb = b.lfbs.get_mut(index);
        assert!(
            lfb.ty == LfbType::Read && lfb.state == LfbState::Missed && lfb.block_addr == ret.addr,
            "{}: fill @ {:#x} does not match LFB {} ({:?} {:?} @ {:#x})",
            self.name,
            ret.addr,
            index,
            lfb.ty,
            lfb.state,
            lfb.block_addr
        );

        let data = ret.data;
        lfb.data = data;
        lfb.state = LfbState::Filled;
        b.return_queue.push_back(index);
        debug!("{} bank {}: fill @ {:#x} -> LFB {}", self.name, bank, ret.addr, index);

        self.stats.record_tag_array_access();
        self.stats.record_data_array_write();
        if let Some(evicted) = self.tags.insert(ret.addr, &data) {
            debug!("{} bank {}: evict @ {:#x}", self.name, bank, evicted);
        }

        if b.data_array.latency() != 0 {
            b.data_array.write(None);
        }
        true
    }

    fn process_request(&mut self, bank: usize) {
        if !self.request_network.is_read_valid(bank) {
            return;
        }
        if self.request_network.pending(bank) > 1 {
            self.stats.record_bank_conflict();
        }

        let request = self.request_network.peek(bank).clone();
        let block_addr = self.tags.block_addr(request.addr);
        let offset = self.tags.block_offset(request.addr);
        assert!(
            offset + request.size <= self.tags.block_size(),
            "{}: request @ {:#x} of {} bytes straddles a block",
            self.name,
            request.addr,
            request.size
        );

        let accepted = match request.ty {
            RequestType::Load => {
                let sub_entry = SubEntry {
                    offset,
                    size: request.size,
                    port: request.port,
                    dst: request.dst,
                };
                self.process_read(bank, block_addr, Some(sub_entry))
            }
            RequestType::Prefetch => self.process_read(bank, block_addr, None),
            RequestType::Store => self.process_store(bank, &request, block_addr, offset),
            RequestType::Na => panic!("{}: request with no type @ {:#x}", self.name, request.addr),
            ty => panic!(
                "{}: {:?} @ {:#x} must target a memory-side unit",
                self.name, ty, request.addr
            ),
        };

        if accepted {
            self.request_network.read(bank);
            self.stats.record_request();
        }
    }

    fn process_read(&mut self, bank: usize, block_addr: Addr, sub_entry: Option<SubEntry>) -> bool {
        let Some(index) = self.banks[bank].lfbs.fetch_or_allocate(block_addr, LfbType::Read) else {
            debug!("{} bank {}: LFB stall @ {:#x}", self.name, bank, block_addr);
            self.stats.record_lfb_stall();
            return false;
        };

        let latency = self.config.data_array_latency;
        let b = &mut self.banks[bank];
        if b.lfbs.get(index).state != LfbState::Empty {
            b.lfbs.touch(index);
        }
        let lfb = b.lfbs.get_mut(index);
        let is_load = sub_entry.is_some();
        if let Some(sub_entry) = sub_entry {
            lfb.push_sub_entry(sub_entry);
        } else {
            self.stats.record_prefetch();
        }

        match lfb.state {
            LfbState::Empty => {
                self.stats.record_tag_array_access();
                match self.tags.get(block_addr) {
                    Some(data) => {
                        lfb.data = *data;
                        self.stats.record_hit();
                        self.stats.record_data_array_read();
                        if latency == 0 {
                            lfb.state = LfbState::Filled;
                            b.return_queue.push_back(index);
                        } else {
                            lfb.state = LfbState::DataArray;
                            b.data_array.write(Some(index));
                        }
                        debug!("{} bank {}: hit @ {:#x} -> LFB {}", self.name, bank, block_addr, index);
                    }
                    None => {
                        lfb.state = LfbState::Missed;
                        b.request_queue.push_back(index);
                        self.stats.record_miss();
                        debug!("{} bank {}: miss @ {:#x} -> LFB {}", self.name, bank, block_addr, index);
                    }
                }
            }
            LfbState::Missed => {
                self.stats.record_half_miss();
                debug!("{} bank {}: half miss @ {:#x} on LFB {}", self.name, bank, block_addr, index);
            }
            LfbState::DataArray | LfbState::Filled => self.stats.record_lfb_hit(),
            LfbState::Retired => {
                if is_load {
                    lfb.state = LfbState::Filled;
                    b.return_queue.push_back(index);
                }
                self.stats.record_lfb_hit();
            }
            LfbState::Invalid => unreachable!("fetched LFBs are live"),
        }
        true
    }

    fn process_store(&mut self, bank: usize, request: &MemoryRequest, block_addr: Addr, offset: usize) -> bool {
        // loads already waiting on the line were accepted first and must not see this store
        if let Some(read_index) = self.banks[bank].lfbs.fetch(block_addr, LfbType::Read) {
            if self.banks[bank].lfbs.get(read_index).state != LfbState::Retired {
                debug!(
                    "{} bank {}: store @ {:#x} waits on LFB {}",
                    self.name, bank, request.addr, read_index
                );
                self.stats.record_store_stall();
                return false;
            }
        }

        let Some(index) = self.banks[bank]
            .lfbs
            .fetch_or_allocate(block_addr, LfbType::WriteCombining)
        else {
            debug!("{} bank {}: LFB stall on store @ {:#x}", self.name, bank, block_addr);
            self.stats.record_lfb_stall();
            return false;
        };

        let store_mask = request.write_mask & nbit_mask(request.size as u32);
        let mask = store_mask << offset;
        let mut bytes = Payload::default();
        bytes.write_bytes(offset, request.data.slice(0, request.size));
        let b = &mut self.banks[bank];

        let wc = b.lfbs.get_mut(index);
        wc.data.merge_masked(&bytes, mask);
        wc.write_mask |= mask;
        if wc.state == LfbState::Empty {
            wc.state = LfbState::Filled;
            b.request_queue.push_back(index);
            debug!("{} bank {}: write combine @ {:#x} -> LFB {}", self.name, bank, block_addr, index);
        }

        if let Some(read_index) = b.lfbs.fetch(block_addr, LfbType::Read) {
            b.lfbs.get_mut(read_index).data.merge_masked(&bytes, mask);
        }
        if self
            .tags
            .write_bytes(request.addr, request.data.slice(0, request.size), store_mask)
        {
            self.stats.record_data_array_write();
        }
        self.stats.record_store();
        true
    }

    fn try_return_lfb(&mut self, bank: usize) {
        let b = &mut self.banks[bank];
        let Some(&index) = b.return_queue.front() else {
            return;
        };
        let lfb = b.lfbs.get_mut(index);

        if !lfb.sub_entries.is_empty() {
            if !self.return_network.is_write_valid(bank) {
                return;
            }
            if let Some(sub_entry) = lfb.pop_sub_entry() {
                let ret = MemoryReturn {
                    ty: ReturnType::LoadReturn,
                    size: sub_entry.size,
                    port: sub_entry.port,
                    dst: sub_entry.dst,
                    addr: lfb.block_addr + sub_entry.offset as u64,
                    data: Payload::from_slice(lfb.data.slice(sub_entry.offset, sub_entry.size)),
                };
                self.return_network.write(ret, bank);
                self.stats.record_return();
            }
        }

        if lfb.sub_entries.is_empty() {
            lfb.state = LfbState::Retired;
            b.return_queue.pop_front();
        }
    }

    fn try_request_lfb(&mut self, bank: usize, downstream: &mut dyn MemoryUnit) {
        let port = self.config.downstream_port(bank);
        let block_size = self.tags.block_size();
        let b = &mut self.banks[bank];
        let Some(&index) = b.request_queue.front() else {
            return;
        };
        if !downstream.request_port_write_valid(port) {
            return;
        }

        let lfb = b.lfbs.get_mut(index);
        match lfb.ty {
            LfbType::Read => {
                assert_eq!(lfb.state, LfbState::Missed);
                let request = MemoryRequest::load(lfb.block_addr, block_size, port).with_dst(index as u64);
                downstream.write_request(request);
                b.request_queue.pop_front();
                self.stats.record_downstream_load();
            }
            LfbType::WriteCombining => {
                assert_eq!(lfb.state, LfbState::Filled);
                let (start, len) =
                    contiguous_run(lfb.write_mask).expect("queued write-combining LFB has no bytes");
                let (start, len) = (start as usize, len as usize);
                let data = Payload::from_slice(lfb.data.slice(start, len));
                let request = MemoryRequest::masked_store(
                    lfb.block_addr + start as u64,
                    len,
                    data,
                    nbit_mask(len as u32),
                    port,
                );
                downstream.write_request(request);
                self.stats.record_downstream_store();

                lfb.write_mask &= !(nbit_mask(len as u32) << start);
                if lfb.write_mask == 0 {
                    lfb.state = LfbState::Invalid;
                    b.request_queue.pop_front();
                }
            }
        }
    }
}

impl Unit for NonBlockingCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn clock_rise(&mut self) {
        self.request_network.clock();

        let downstream = Arc::clone(&self.downstream);
        let mut downstream = lock_write(&downstream);
        for bank in 0..self.banks.len() {
            self.clock_data_array(bank);
            if !self.process_return(bank, &mut *downstream) {
                self.process_request(bank);
            }
        }
    }

    fn clock_fall(&mut self) {
        {
            let downstream = Arc::clone(&self.downstream);
            let mut downstream = lock_write(&downstream);
            for bank in 0..self.banks.len() {
                self.try_return_lfb(bank);
                self.try_request_lfb(bank, &mut *downstream);
            }
        }

        self.return_network.clock();
    }

    fn is_executing(&self) -> bool {
        !self.request_network.is_idle()
            || !self.return_network.is_idle()
            || self.banks.iter().any(|bank| !bank.is_idle())
    }
}

impl MemoryUnit for NonBlockingCache {
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
