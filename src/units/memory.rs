use log::trace;
use serde::{Deserialize, Serialize};

use crate::base::mem::HasMemory;
use crate::base::unit::{MemoryUnit, Unit};
use crate::interconnect::crossbar::{build_network, AddressRoute, Network, PortRoute};
use crate::interconnect::pipeline::Pipeline;
use crate::mem::bits::log2i;
use crate::mem::flat::FlatMemory;
use crate::mem::transaction::{MemoryRequest, MemoryReturn, RequestType, MAX_BLOCK_SIZE};
use crate::sim::config::Config;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub size: usize,
    pub num_ports: usize,
    pub num_channels: usize,
    /// Address bits selecting the channel; defaults to the bits just above a 64B block.
    pub channel_select_mask: Option<u64>,
    pub latency: u32,
    pub crossbar_width: usize,
    pub port_queue_depth: usize,
}

impl Config for MemoryConfig {}

impl Default for MemoryConfig {
    fn default() -> Self {
        let s = Self {
            size: 1 << 24,
            num_ports: 4,
            num_channels: 2,
            channel_select_mask: None,
            latency: 40,
            crossbar_width: 0,
            port_queue_depth: 8,
        };
        s.ensure_valid();
        s
    }
}

impl MemoryConfig {
    pub fn ensure_valid(&self) {
        assert!(self.size > 0, "memory size must be > 0");
        assert!(self.num_ports > 0, "num_ports must be > 0");
        assert!(self.num_channels.is_power_of_two(), "num_channels must be a power of two");
        assert!(self.port_queue_depth > 0, "port_queue_depth must be > 0");
    }

    pub fn channel_select_mask(&self) -> u64 {
        self.channel_select_mask
            .unwrap_or(((self.num_channels - 1) as u64) << log2i(MAX_BLOCK_SIZE as u64))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MemoryStats {
    pub loads: u64,
    pub stores: u64,
    pub amos: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Memory-side endpoint of the hierarchy. Every access is performed functionally the cycle it
/// is accepted; the result is held back for `latency` cycles before it is returned.
pub struct SimpleMemory {
    name: String,
    config: MemoryConfig,
    memory: FlatMemory,
    channels: Vec<Pipeline<MemoryReturn>>,
    request_network: Box<dyn Network<MemoryRequest>>,
    return_network: Box<dyn Network<MemoryReturn>>,
    stats: MemoryStats,
}

impl SimpleMemory {
    pub fn new(name: impl Into<String>, config: MemoryConfig) -> Self {
        config.ensure_valid();
        let request_network = build_network(
            config.num_ports,
            config.num_channels,
            config.crossbar_width,
            config.port_queue_depth,
            AddressRoute::new(config.channel_select_mask()),
        );
        let return_network = build_network(
            config.num_channels,
            config.num_ports,
            config.crossbar_width,
            config.port_queue_depth,
            PortRoute,
        );
        Self {
            name: name.into(),
            memory: FlatMemory::new_with_size(config.size),
            channels: (0..config.num_channels)
                .map(|_| Pipeline::new(config.latency))
                .collect(),
            config,
            request_network,
            return_network,
            stats: MemoryStats::default(),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn stats(&self) -> MemoryStats {
        self.stats
    }

    pub fn memory(&self) -> &FlatMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut FlatMemory {
        &mut self.memory
    }

    /// Performs the access and builds its return, if it has one.
    fn access(&mut self, request: &MemoryRequest) -> Result<Option<MemoryReturn>, anyhow::Error> {
        let size = request.size;
        match request.ty {
            RequestType::Load => {
                self.stats.loads += 1;
                self.stats.bytes_read += size as u64;
                let data = self.memory.read(request.addr, size)?;
                Ok(Some(MemoryReturn::from_request(request, data)))
            }
            RequestType::Store => {
                self.stats.stores += 1;
                self.stats.bytes_written += u64::from(request.write_mask.count_ones());
                self.memory
                    .write_masked(request.addr, request.data.slice(0, size), request.write_mask)?;
                Ok(None)
            }
            RequestType::Prefetch => Ok(None),
            ty if ty.is_amo() => {
                self.stats.amos += 1;
                let mut old = [0u8; 8];
                old[..size].copy_from_slice(self.memory.read(request.addr, size)?);
                let old = u64::from_le_bytes(old);
                let operand = request.data.read_uint(0, size);
                let new = amo_result(ty, size, old, operand);
                self.memory.write(request.addr, &new.to_le_bytes()[..size])?;

                Ok(Some(MemoryReturn::from_request(request, &old.to_le_bytes())))
            }
            _ => anyhow::bail!("request with no type @ {:#x}", request.addr),
        }
    }
}

fn sign_extend(value: u64, size: usize) -> i64 {
    let shift = 64 - 8 * size as u32;
    ((value << shift) as i64) >> shift
}

fn amo_result(ty: RequestType, size: usize, old: u64, operand: u64) -> u64 {
    let (s_old, s_operand) = (sign_extend(old, size), sign_extend(operand, size));
    let result = match ty {
        RequestType::AmoAdd => old.wrapping_add(operand),
        RequestType::AmoXor => old ^ operand,
        RequestType::AmoOr => old | operand,
        RequestType::AmoAnd => old & operand,
        RequestType::AmoMin => s_old.min(s_operand) as u64,
        RequestType::AmoMax => s_old.max(s_operand) as u64,
        RequestType::AmoMinu => old.min(operand),
        RequestType::AmoMaxu => old.max(operand),
        _ => unreachable!("{:?} is not an atomic", ty),
    };
    if size == 8 {
        result
    } else {
        result & 0xffff_ffff
    }
}

impl Unit for SimpleMemory {
    fn name(&self) -> &str {
        &self.name
    }

    fn clock_rise(&mut self) {
        self.request_network.clock();
        for channel in 0..self.channels.len() {
            self.channels[channel].clock();
            if !self.request_network.is_read_valid(channel) {
                continue;
            }
            if self.request_network.peek(channel).ty.has_return() && !self.channels[channel].is_write_valid() {
                continue;
            }

            let request = self.request_network.read(channel);
            trace!(
                "{} channel {}: {:?} @ {:#x} size {} from port {}",
                self.name,
                channel,
                request.ty,
                request.addr,
                request.size,
                request.port
            );
            let ret = self
                .access(&request)
                .unwrap_or_else(|err| panic!("{}: {:#}", self.name, err));
            if let Some(ret) = ret {
                self.channels[channel].write(ret);
            }
        }
    }

    fn clock_fall(&mut self) {
        for channel in 0..self.channels.len() {
            if self.channels[channel].is_read_valid() && self.return_network.is_write_valid(channel) {
                let ret = self.channels[channel].read();
                self.return_network.write(ret, channel);
            }
        }
        self.return_network.clock();
    }

    fn is_executing(&self) -> bool {
        !self.request_network.is_idle()
            || !self.return_network.is_idle()
            || self.channels.iter().any(|channel| !channel.is_empty())
    }
}

impl MemoryUnit for SimpleMemory {
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
