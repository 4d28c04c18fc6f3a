use serde::Deserialize;

use crate::mem::bits::log2i;
use crate::mem::transaction::MAX_BLOCK_SIZE;
use crate::sim::config::Config;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    #[default]
    NonBlocking,
    Blocking,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub size: usize,
    pub block_size: usize,
    pub associativity: usize,
    pub num_ports: usize,
    pub num_banks: usize,
    /// Address bits selecting the bank; defaults to the bits just above the block offset.
    pub bank_select_mask: Option<u64>,
    /// Line-fill buffers per bank, non-blocking only.
    pub num_lfb: usize,
    pub data_array_latency: u32,
    /// 0 selects a full crossbar.
    pub crossbar_width: usize,
    pub port_queue_depth: usize,
    pub downstream_port_offset: usize,
    pub downstream_port_stride: usize,
}

impl Config for CacheConfig {}

impl Default for CacheConfig {
    fn default() -> Self {
        let s = Self {
            kind: CacheKind::NonBlocking,
            size: 16 << 10,
            block_size: 64,
            associativity: 4,
            num_ports: 4,
            num_banks: 4,
            bank_select_mask: None,
            num_lfb: 8,
            data_array_latency: 1,
            crossbar_width: 0,
            port_queue_depth: 8,
            downstream_port_offset: 0,
            downstream_port_stride: 1,
        };
        s.ensure_valid();
        s
    }
}

impl CacheConfig {
    pub fn ensure_valid(&self) {
        assert!(self.block_size.is_power_of_two(), "block_size must be a power of two");
        assert!(
            self.block_size <= MAX_BLOCK_SIZE,
            "block_size must be <= {}",
            MAX_BLOCK_SIZE
        );
        assert!(self.associativity > 0, "associativity must be > 0");
        assert!(
            self.size >= self.block_size * self.associativity,
            "size must hold at least one set"
        );
        assert!(self.num_sets().is_power_of_two(), "number of sets must be a power of two");
        assert!(self.num_ports > 0, "num_ports must be > 0");
        assert!(self.num_banks.is_power_of_two(), "num_banks must be a power of two");
        assert!(self.num_lfb > 0, "num_lfb must be > 0");
        assert!(self.port_queue_depth > 0, "port_queue_depth must be > 0");
        assert!(self.downstream_port_stride > 0, "downstream_port_stride must be > 0");
        if let Some(mask) = self.bank_select_mask {
            assert!(
                (1u64 << mask.count_ones()) <= self.num_banks as u64,
                "bank_select_mask selects more banks than num_banks"
            );
        }
    }

    pub fn num_sets(&self) -> usize {
        self.size / (self.block_size * self.associativity)
    }

    pub fn bank_select_mask(&self) -> u64 {
        self.bank_select_mask
            .unwrap_or(((self.num_banks - 1) as u64) << log2i(self.block_size as u64))
    }

    /// Port on the downstream unit owned by `bank`.
    pub fn downstream_port(&self, bank: usize) -> usize {
        self.downstream_port_offset + bank * self.downstream_port_stride
    }

    /// Downstream ports this cache occupies, counting from port 0.
    pub fn downstream_ports_used(&self) -> usize {
        self.downstream_port(self.num_banks - 1) + 1
    }
}
