use crate::base::mem::HasMemory;
use crate::mem::transaction::Addr;

/// Byte-addressed backing store. Large sizes rely on lazy allocation within the OS, so only
/// touched pages cost memory.
#[derive(Debug, Clone)]
pub struct FlatMemory {
    bytes: Vec<u8>,
}

impl HasMemory for FlatMemory {
    fn capacity(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_impl(&self, addr: Addr, n: usize) -> Result<&[u8], anyhow::Error> {
        let addr = addr as usize;
        Ok(&self.bytes[addr..addr + n])
    }

    fn write_impl(&mut self, addr: Addr, data: &[u8]) -> Result<(), anyhow::Error> {
        let addr = addr as usize;
        self.bytes[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl FlatMemory {
    pub fn new_with_size(size: usize) -> Self {
        Self {
            bytes: vec![0u8; size],
        }
    }

    /// Copies `data` in at `addr`, used to seed memory before a run.
    pub fn preload(&mut self, addr: Addr, data: &[u8]) -> Result<(), anyhow::Error> {
        self.write(addr, data)
    }
}
