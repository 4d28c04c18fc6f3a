use serde::Deserialize;

use crate::base::mem::HasMemory;
use crate::base::unit::{MemoryUnit, Unit};
use crate::interconnect::crossbar::{build_network, AddressRoute, Network, PortRoute};
use crate::interconnect::pipeline::Pipeline;
use crate::mem::flat::FlatMemory;
use crate::mem::transaction::{Addr, MemoryRequest, MemoryReturn, RequestType};
use crate::sim::config::Config;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub size: usize,
    pub num_ports: usize,
    pub num_banks: usize,
    pub bank_select_mask: u64,
    pub latency: u32,
    pub port_queue_depth: usize,
}

impl Config for BufferConfig {}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            num_ports: 1,
            num_banks: 1,
            bank_select_mask: 0,
            latency: 1,
            port_queue_depth: 8,
        }
    }
}

/// Banked scratchpad SRAM. Addresses wrap to the buffer size; each bank serves one access per
/// cycle after a fixed latency.
pub struct ScratchpadBuffer {
    name: String,
    config: BufferConfig,
    data: FlatMemory,
    banks: Vec<Pipeline<MemoryRequest>>,
    request_network: Box<dyn Network<MemoryRequest>>,
    return_network: Box<dyn Network<MemoryReturn>>,
}

impl ScratchpadBuffer {
    pub fn new(name: impl Into<String>, config: BufferConfig) -> Self {
        assert!(config.size.is_power_of_two(), "buffer size must be a power of two");
        assert!(
            (1u64 << config.bank_select_mask.count_ones()) <= config.num_banks as u64,
            "bank_select_mask selects more banks than num_banks"
        );
        let request_network = build_network(
            config.num_ports,
            config.num_banks,
            0,
            config.port_queue_depth,
            AddressRoute::new(config.bank_select_mask),
        );
        let return_network = build_network(config.num_banks, config.num_ports, 0, config.port_queue_depth, PortRoute);
        Self {
            name: name.into(),
            data: FlatMemory::new_with_size(config.size),
            banks: (0..config.num_banks).map(|_| Pipeline::new(config.latency)).collect(),
            config,
            request_network,
            return_network,
        }
    }

    pub fn data(&self) -> &FlatMemory {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut FlatMemory {
        &mut self.data
    }

    fn buffer_addr(&self, addr: Addr) -> Addr {
        addr & (self.config.size as u64 - 1)
    }
}

impl Unit for ScratchpadBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn clock_rise(&mut self) {
        self.request_network.clock();
        for (bank, pipeline) in self.banks.iter_mut().enumerate() {
            pipeline.clock();
            if pipeline.is_write_valid() && self.request_network.is_read_valid(bank) {
                pipeline.write(self.request_network.read(bank));
            }
        }
    }

    fn clock_fall(&mut self) {
        for bank in 0..self.banks.len() {
            if !self.banks[bank].is_read_valid() {
                continue;
            }
            let request = self.banks[bank].peek();
            let addr = self.buffer_addr(request.addr);
            match request.ty {
                RequestType::Load => {
                    if !self.return_network.is_write_valid(bank) {
                        continue;
                    }
                    let data = self
                        .data
                        .read(addr, request.size)
                        .unwrap_or_else(|err| panic!("{}: {:#}", self.name, err));
                    let ret = MemoryReturn::from_request(request, data);
                    self.return_network.write(ret, bank);
                }
                RequestType::Store => {
                    let (size, mask) = (request.size, request.write_mask);
                    let bytes = request.data.slice(0, size).to_vec();
                    self.data
                        .write_masked(addr, &bytes, mask)
                        .unwrap_or_else(|err| panic!("{}: {:#}", self.name, err));
                }
                ty => panic!("{}: {:?} not supported by a scratchpad", self.name, ty),
            }
            self.banks[bank].read();
        }
        self.return_network.clock();
    }

    fn is_executing(&self) -> bool {
        !self.request_network.is_idle()
            || !self.return_network.is_idle()
            || self.banks.iter().any(|bank| !bank.is_empty())
    }
}

impl MemoryUnit for ScratchpadBuffer {
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
