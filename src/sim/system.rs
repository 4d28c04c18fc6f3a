use std::sync::{Arc, RwLock};

use anyhow::{ensure, Context};
use log::info;
use serde::Serialize;
use toml::Table;

use crate::base::unit::{lock_read, shared, MemoryHandle};
use crate::cache::{BlockingCache, Cache, CacheConfig, CacheKind, CacheStats, NonBlockingCache};
use crate::sim::config::{Config, SimConfig};
use crate::sim::simulator::{Cycle, Simulator};
use crate::units::memory::{MemoryConfig, MemoryStats, SimpleMemory};
use crate::units::traffic::{TrafficConfig, TrafficGenerator, TrafficStats};

#[derive(Debug, Clone, Default)]
pub struct SystemConfig {
    pub sim: SimConfig,
    pub memory: MemoryConfig,
    pub l2: CacheConfig,
    pub l1: CacheConfig,
    pub traffic: TrafficConfig,
}

impl SystemConfig {
    pub fn from_toml(text: &str) -> Result<Self, anyhow::Error> {
        let table: Table = toml::from_str(text).context("cannot parse config toml")?;
        Ok(Self {
            sim: SimConfig::from_section(table.get("sim")).context("invalid [sim] section")?,
            memory: MemoryConfig::from_section(table.get("memory")).context("invalid [memory] section")?,
            l2: CacheConfig::from_section(table.get("l2")).context("invalid [l2] section")?,
            l1: CacheConfig::from_section(table.get("l1")).context("invalid [l1] section")?,
            traffic: TrafficConfig::from_section(table.get("traffic")).context("invalid [traffic] section")?,
        })
    }

    /// Checks that every level has enough ports for the level above it.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        ensure!(
            self.traffic.num_ports <= self.l1.num_ports,
            "traffic drives {} ports but l1 has {}",
            self.traffic.num_ports,
            self.l1.num_ports
        );
        ensure!(
            self.l1.downstream_ports_used() <= self.l2.num_ports,
            "l1 banks need {} l2 ports but l2 has {}",
            self.l1.downstream_ports_used(),
            self.l2.num_ports
        );
        ensure!(
            self.l2.downstream_ports_used() <= self.memory.num_ports,
            "l2 banks need {} memory ports but memory has {}",
            self.l2.downstream_ports_used(),
            self.memory.num_ports
        );
        ensure!(
            self.l1.block_size <= self.l2.block_size,
            "l1 blocks must fit within an l2 block"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemReport {
    pub cycles: Cycle,
    pub traffic: TrafficStats,
    pub l1: CacheStats,
    pub l2: CacheStats,
    pub memory: MemoryStats,
}

/// Traffic generator, L1, L2 and memory wired in a chain, each in its own unit group.
pub struct System {
    simulator: Simulator,
    traffic: Arc<RwLock<TrafficGenerator>>,
    l1: Arc<RwLock<dyn Cache>>,
    l2: Arc<RwLock<dyn Cache>>,
    memory: Arc<RwLock<SimpleMemory>>,
}

fn build_cache(
    simulator: &mut Simulator,
    name: &str,
    config: &CacheConfig,
    downstream: MemoryHandle,
) -> (Arc<RwLock<dyn Cache>>, MemoryHandle) {
    simulator.start_new_unit_group();
    match config.kind {
        CacheKind::NonBlocking => {
            let cache = shared(NonBlockingCache::new(name, config.clone(), downstream));
            simulator.register(cache.clone());
            let stats: Arc<RwLock<dyn Cache>> = cache.clone();
            let port: MemoryHandle = cache;
            (stats, port)
        }
        CacheKind::Blocking => {
            let cache = shared(BlockingCache::new(name, config.clone(), downstream));
            simulator.register(cache.clone());
            let stats: Arc<RwLock<dyn Cache>> = cache.clone();
            let port: MemoryHandle = cache;
            (stats, port)
        }
    }
}

impl System {
    pub fn new(config: &SystemConfig) -> Result<Self, anyhow::Error> {
        config.validate()?;
        let mut simulator = Simulator::new(config.sim.timeout, config.sim.parallel);

        let memory = shared(SimpleMemory::new("memory", config.memory.clone()));
        let (l2, l2_port) = build_cache(&mut simulator, "l2", &config.l2, memory.clone());
        let (l1, l1_port) = build_cache(&mut simulator, "l1", &config.l1, l2_port);

        simulator.start_new_unit_group();
        let traffic = shared(TrafficGenerator::new("traffic", config.traffic.clone(), l1_port));
        simulator.register(traffic.clone());
        simulator.start_new_unit_group();
        simulator.register(memory.clone());

        info!(
            "built system: {:?} l1, {:?} l2, {} memory channels, {} traffic ports",
            config.l1.kind, config.l2.kind, config.memory.num_channels, config.traffic.num_ports
        );
        Ok(Self {
            simulator,
            traffic,
            l1,
            l2,
            memory,
        })
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn memory(&self) -> &Arc<RwLock<SimpleMemory>> {
        &self.memory
    }

    pub fn run(&mut self) -> Result<SystemReport, anyhow::Error> {
        let cycles = self.simulator.execute()?;
        Ok(self.report(cycles))
    }

    pub fn report(&self, cycles: Cycle) -> SystemReport {
        SystemReport {
            cycles,
            traffic: lock_read(&self.traffic).stats(),
            l1: lock_read(&self.l1).stats(),
            l2: lock_read(&self.l2).stats(),
            memory: lock_read(&self.memory).stats(),
        }
    }
}
