use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::base::unit::{lock_write, MemoryHandle, Unit};
use crate::mem::transaction::{Addr, MemoryRequest};
use crate::sim::config::Config;

const WORD: u64 = 4;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    #[default]
    Sequential,
    Strided,
    Random,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub num_ports: usize,
    pub pattern: Pattern,
    pub base_addr: Addr,
    /// Bytes the generated addresses are confined to.
    pub footprint: u64,
    pub stride: u64,
    pub store_fraction: f64,
    pub requests_per_port: usize,
    pub max_inflight_per_port: usize,
    pub seed: u64,
}

impl Config for TrafficConfig {}

impl Default for TrafficConfig {
    fn default() -> Self {
        let s = Self {
            num_ports: 4,
            pattern: Pattern::Sequential,
            base_addr: 0,
            footprint: 64 << 10,
            stride: 64,
            store_fraction: 0.25,
            requests_per_port: 1000,
            max_inflight_per_port: 4,
            seed: 0,
        };
        s.ensure_valid();
        s
    }
}

impl TrafficConfig {
    pub fn ensure_valid(&self) {
        assert!(self.num_ports > 0, "num_ports must be > 0");
        assert!(self.footprint >= WORD, "footprint must hold at least one word");
        assert!(self.base_addr % WORD == 0, "base_addr must be word aligned");
        assert!(
            (0.0..=1.0).contains(&self.store_fraction),
            "store_fraction must be within [0, 1]"
        );
        assert!(self.max_inflight_per_port > 0, "max_inflight_per_port must be > 0");
    }
}

/// The value every store to `addr` writes. Racing stores from different ports agree on it, so
/// a load can only ever observe 0 or this.
pub fn expected_word(addr: Addr) -> u32 {
    (addr as u32).wrapping_mul(0x9e37_79b9) ^ 0x5a5a_5a5a
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct TrafficStats {
    pub loads: u64,
    pub stores: u64,
    pub returns: u64,
    pub mismatches: u64,
    pub total_load_latency: u64,
}

impl TrafficStats {
    pub fn average_load_latency(&self) -> f64 {
        match self.returns {
            0 => 0.0,
            n => self.total_load_latency as f64 / n as f64,
        }
    }
}

struct InFlightLoad {
    addr: Addr,
    issued: u64,
    /// The port stored this word before issuing the load.
    must_match: bool,
}

#[derive(Default)]
struct PortState {
    issued: usize,
    in_flight: HashMap<u64, InFlightLoad>,
    stored: HashSet<Addr>,
}

/// Drives word-sized loads and stores into the ports of a target unit and checks every load
/// against what the port has stored.
pub struct TrafficGenerator {
    name: String,
    config: TrafficConfig,
    target: MemoryHandle,
    ports: Vec<PortState>,
    rng: StdRng,
    next_dst: u64,
    cycle: u64,
    stats: TrafficStats,
}

impl TrafficGenerator {
    pub fn new(name: impl Into<String>, config: TrafficConfig, target: MemoryHandle) -> Self {
        config.ensure_valid();
        Self {
            name: name.into(),
            ports: (0..config.num_ports).map(|_| PortState::default()).collect(),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            target,
            next_dst: 0,
            cycle: 0,
            stats: TrafficStats::default(),
        }
    }

    pub fn stats(&self) -> TrafficStats {
        self.stats
    }

    fn next_addr(&mut self, port: usize) -> Addr {
        let words = self.config.footprint / WORD;
        let i = self.ports[port].issued as u64;
        let word = match self.config.pattern {
            Pattern::Sequential => i * self.config.num_ports as u64 + port as u64,
            Pattern::Strided => (i * self.config.stride) / WORD + port as u64,
            Pattern::Random => self.rng.gen_range(0..words),
        };
        self.config.base_addr + (word % words) * WORD
    }

    fn issue_store(&mut self, port: usize, addr: Addr) -> MemoryRequest {
        let state = &mut self.ports[port];
        state.issued += 1;
        state.stored.insert(addr);
        self.stats.stores += 1;
        MemoryRequest::store(addr, &expected_word(addr).to_le_bytes(), port)
    }

    fn issue_load(&mut self, port: usize, addr: Addr) -> MemoryRequest {
        let dst = self.next_dst;
        self.next_dst += 1;
        let state = &mut self.ports[port];
        state.issued += 1;
        let load = InFlightLoad {
            addr,
            issued: self.cycle,
            must_match: state.stored.contains(&addr),
        };
        state.in_flight.insert(dst, load);
        self.stats.loads += 1;
        MemoryRequest::load(addr, WORD as usize, port).with_dst(dst)
    }

    fn check_return(&mut self, port: usize, dst: u64, addr: Addr, value: u32) {
        let state = &mut self.ports[port];
        let Some(load) = state.in_flight.remove(&dst) else {
            panic!("{}: port {} got a return for unknown load {}", self.name, port, dst);
        };
        assert_eq!(load.addr, addr, "{}: return address mismatch on port {}", self.name, port);

        let expected = expected_word(addr);
        let ok = if load.must_match {
            value == expected
        } else {
            value == 0 || value == expected
        };
        if !ok {
            warn!(
                "{}: port {} load @ {:#x} returned {:#x}, expected {:#x}",
                self.name, port, addr, value, expected
            );
            self.stats.mismatches += 1;
        }
        self.stats.returns += 1;
        self.stats.total_load_latency += self.cycle - load.issued;
    }
}

impl Unit for TrafficGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn clock_rise(&mut self) {
        let target = self.target.clone();
        let mut target = lock_write(&target);
        for port in 0..self.ports.len() {
            if !target.return_port_read_valid(port) {
                continue;
            }
            let ret = target.read_return(port);
            self.check_return(port, ret.dst, ret.addr, ret.data.read_u32(0));
        }
    }

    fn clock_fall(&mut self) {
        {
            let target = self.target.clone();
            let mut target = lock_write(&target);
            for port in 0..self.ports.len() {
                let state = &self.ports[port];
                if state.issued >= self.config.requests_per_port
                    || state.in_flight.len() >= self.config.max_inflight_per_port
                    || !target.request_port_write_valid(port)
                {
                    continue;
                }

                let addr = self.next_addr(port);
                let request = if self.rng.gen_bool(self.config.store_fraction) {
                    self.issue_store(port, addr)
                } else {
                    self.issue_load(port, addr)
                };
                target.write_request(request);
                let state = &self.ports[port];
                if state.issued == self.config.requests_per_port {
                    debug!("{}: port {} issued all requests", self.name, port);
                }
            }
        }
        self.cycle += 1;
    }

    fn is_executing(&self) -> bool {
        self.ports
            .iter()
            .any(|port| port.issued < self.config.requests_per_port || !port.in_flight.is_empty())
    }
}
