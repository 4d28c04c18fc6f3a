use smallvec::SmallVec;

use crate::mem::transaction::{Addr, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfbType {
    Read,
    WriteCombining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfbState {
    Invalid,
    /// Allocated this cycle, tag lookup pending.
    Empty,
    /// Hit, waiting on the data array pipeline.
    DataArray,
    /// Waiting on the next level.
    Missed,
    /// Data known, sub-entries draining.
    Filled,
    /// Drained; data still valid and eligible for replacement.
    Retired,
}

/// A requester waiting on an LFB's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubEntry {
    pub offset: usize,
    pub size: usize,
    pub port: usize,
    pub dst: u64,
}

#[derive(Debug, Clone)]
pub struct Lfb {
    pub block_addr: Addr,
    pub ty: LfbType,
    pub state: LfbState,
    /// Bytes still to be written back. Always zero for read LFBs.
    pub write_mask: u64,
    pub data: Payload,
    pub lru: u32,
    pub sub_entries: SmallVec<[SubEntry; 4]>,
}

impl Default for Lfb {
    fn default() -> Self {
        Self {
            block_addr: Addr::MAX,
            ty: LfbType::Read,
            state: LfbState::Invalid,
            write_mask: 0,
            data: Payload::default(),
            lru: 0,
            sub_entries: SmallVec::new(),
        }
    }
}

impl Lfb {
    pub fn is_live(&self) -> bool {
        self.state != LfbState::Invalid
    }

    pub fn matches(&self, block_addr: Addr, ty: LfbType) -> bool {
        self.is_live() && self.block_addr == block_addr && self.ty == ty
    }

    pub fn push_sub_entry(&mut self, entry: SubEntry) {
        self.sub_entries.push(entry);
    }

    pub fn pop_sub_entry(&mut self) -> Option<SubEntry> {
        if self.sub_entries.is_empty() {
            None
        } else {
            Some(self.sub_entries.remove(0))
        }
    }
}

/// The fill buffers of one bank.
#[derive(Debug)]
pub struct LfbPool {
    lfbs: Vec<Lfb>,
}

impl LfbPool {
    pub fn new(num_lfb: usize) -> Self {
        Self {
            lfbs: vec![Lfb::default(); num_lfb],
        }
    }

    pub fn len(&self) -> usize {
        self.lfbs.len()
    }

    pub fn get(&self, index: usize) -> &Lfb {
        &self.lfbs[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Lfb {
        &mut self.lfbs[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lfb> {
        self.lfbs.iter()
    }

    pub fn fetch(&self, block_addr: Addr, ty: LfbType) -> Option<usize> {
        self.lfbs.iter().position(|lfb| lfb.matches(block_addr, ty))
    }

    /// Marks `index` most recently used.
    pub fn touch(&mut self, index: usize) {
        let rank = self.lfbs[index].lru;
        for lfb in self.lfbs.iter_mut() {
            if lfb.lru < rank {
                lfb.lru += 1;
            }
        }
        self.lfbs[index].lru = 0;
    }

    /// Claims the first invalid LFB, else the least recently used retired one (lowest index on
    /// ties). In-flight LFBs are never replaced.
    pub fn allocate(&mut self, block_addr: Addr, ty: LfbType) -> Option<usize> {
        let index = match self.lfbs.iter().position(|lfb| !lfb.is_live()) {
            Some(index) => index,
            None => {
                let mut victim: Option<usize> = None;
                for (i, lfb) in self.lfbs.iter().enumerate() {
                    if lfb.state != LfbState::Retired {
                        continue;
                    }
                    if victim.map_or(true, |v| lfb.lru > self.lfbs[v].lru) {
                        victim = Some(i);
                    }
                }
                victim?
            }
        };

        for lfb in self.lfbs.iter_mut() {
            lfb.lru = lfb.lru.saturating_add(1);
        }
        self.lfbs[index] = Lfb {
            block_addr,
            ty,
            state: LfbState::Empty,
            ..Lfb::default()
        };
        Some(index)
    }

    pub fn fetch_or_allocate(&mut self, block_addr: Addr, ty: LfbType) -> Option<usize> {
        self.fetch(block_addr, ty)
            .or_else(|| self.allocate(block_addr, ty))
    }

    /// No LFB is holding work that still has to leave the bank.
    pub fn is_quiescent(&self) -> bool {
        self.lfbs
            .iter()
            .all(|lfb| matches!(lfb.state, LfbState::Invalid | LfbState::Retired))
    }
}
