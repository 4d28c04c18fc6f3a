use crate::mem::bits::{log2i, nbit_mask};
use crate::mem::transaction::{Addr, Payload};

#[derive(Debug, Clone, Copy, Default)]
struct TagEntry {
    tag: u64,
    lru: u32,
    valid: bool,
}

/// Set-associative tag array with its data array. Addresses decompose as
/// `tag | set index | block offset`, widths derived from the geometry.
#[derive(Debug)]
pub(crate) struct TagArray {
    associativity: usize,
    offset_bits: u32,
    set_bits: u32,
    tags: Vec<TagEntry>,
    data: Vec<Payload>,
}

impl TagArray {
    pub(crate) fn new(size: usize, block_size: usize, associativity: usize) -> Self {
        assert!(block_size.is_power_of_two(), "block size must be a power of two");
        let blocks = size / block_size;
        let num_sets = blocks / associativity.max(1);
        assert!(num_sets > 0 && num_sets.is_power_of_two(), "set count must be a power of two");
        Self {
            associativity,
            offset_bits: log2i(block_size as u64),
            set_bits: log2i(num_sets as u64),
            tags: vec![TagEntry::default(); blocks],
            data: vec![Payload::default(); blocks],
        }
    }

    pub(crate) fn block_size(&self) -> usize {
        1 << self.offset_bits
    }

    pub(crate) fn num_sets(&self) -> usize {
        1 << self.set_bits
    }

    pub(crate) fn block_offset(&self, addr: Addr) -> usize {
        (addr & nbit_mask(self.offset_bits)) as usize
    }

    pub(crate) fn block_addr(&self, addr: Addr) -> Addr {
        addr & !nbit_mask(self.offset_bits)
    }

    pub(crate) fn set_index(&self, addr: Addr) -> usize {
        ((addr >> self.offset_bits) & nbit_mask(self.set_bits)) as usize
    }

    pub(crate) fn tag(&self, addr: Addr) -> u64 {
        addr >> (self.offset_bits + self.set_bits)
    }

    fn find(&self, addr: Addr) -> Option<usize> {
        let start = self.set_index(addr) * self.associativity;
        let tag = self.tag(addr);
        (start..start + self.associativity).find(|&i| self.tags[i].valid && self.tags[i].tag == tag)
    }

    /// Whether the block is resident, without touching LRU state.
    pub(crate) fn probe(&self, addr: Addr) -> bool {
        self.find(addr).is_some()
    }

    /// Looks the block up and marks it most recently used.
    pub(crate) fn get(&mut self, addr: Addr) -> Option<&Payload> {
        let way = self.find(addr)?;
        self.touch(way);
        Some(&self.data[way])
    }

    /// Installs a block, replacing the first invalid way or else the least recently used one
    /// (lowest way on ties). Returns the evicted block address, if any.
    pub(crate) fn insert(&mut self, addr: Addr, data: &Payload) -> Option<Addr> {
        if let Some(way) = self.find(addr) {
            self.data[way] = *data;
            self.touch(way);
            return None;
        }

        let set = self.set_index(addr);
        let start = set * self.associativity;
        let end = start + self.associativity;
        let way = match (start..end).find(|&i| !self.tags[i].valid) {
            Some(way) => way,
            None => {
                let mut victim = start;
                for i in start..end {
                    if self.tags[i].lru > self.tags[victim].lru {
                        victim = i;
                    }
                }
                victim
            }
        };

        let evicted = self.tags[way].valid.then(|| {
            let tag = self.tags[way].tag;
            (tag << (self.offset_bits + self.set_bits)) | ((set as u64) << self.offset_bits)
        });

        for entry in self.tags[start..end].iter_mut() {
            entry.lru = entry.lru.saturating_add(1);
        }
        self.tags[way] = TagEntry {
            tag: self.tag(addr),
            lru: 0,
            valid: true,
        };
        self.data[way] = *data;
        evicted
    }

    /// Patches the bytes of a resident block selected by `mask`, bit i covering
    /// `block offset + i`. LRU state is left alone. Returns whether the block was resident.
    pub(crate) fn write_bytes(&mut self, addr: Addr, data: &[u8], mask: u64) -> bool {
        let Some(way) = self.find(addr) else {
            return false;
        };
        let offset = self.block_offset(addr);
        let block = self.data[way].bytes_mut();
        for (i, byte) in data.iter().enumerate() {
            if (mask >> i) & 1 != 0 {
                block[offset + i] = *byte;
            }
        }
        true
    }

    pub(crate) fn invalidate_all(&mut self) {
        for entry in self.tags.iter_mut() {
            *entry = TagEntry::default();
        }
    }

    fn touch(&mut self, way: usize) {
        let start = way - way % self.associativity;
        let hit_lru = self.tags[way].lru;
        for entry in self.tags[start..start + self.associativity].iter_mut() {
            if entry.lru < hit_lru {
                entry.lru += 1;
            }
        }
        self.tags[way].lru = 0;
    }
}
