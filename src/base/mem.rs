use anyhow::bail;

use crate::mem::transaction::Addr;

/// Trait for functional backing stores behind memory-side units.
pub trait HasMemory {
    fn capacity(&self) -> u64;

    fn read_impl(&self, addr: Addr, n: usize) -> Result<&[u8], anyhow::Error>;
    fn read(&self, addr: Addr, n: usize) -> Result<&[u8], anyhow::Error> {
        assert!(n > 0, "zero sized read");
        if addr.saturating_add(n as u64) > self.capacity() {
            bail!("memory read of size {} @ {:#x} out of range", n, addr);
        }
        self.read_impl(addr, n)
    }
    fn read_n<const N: usize>(&self, addr: Addr) -> Result<[u8; N], anyhow::Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(addr, N)?);
        Ok(out)
    }

    fn write_impl(&mut self, addr: Addr, data: &[u8]) -> Result<(), anyhow::Error>;
    fn write(&mut self, addr: Addr, data: &[u8]) -> Result<(), anyhow::Error> {
        if addr.saturating_add(data.len() as u64) > self.capacity() {
            bail!("memory write of size {} @ {:#x} out of range", data.len(), addr);
        }
        self.write_impl(addr, data)
    }

    /// Writes the bytes of `data` selected by `mask`, bit i covering `addr + i`.
    fn write_masked(&mut self, addr: Addr, data: &[u8], mask: u64) -> Result<(), anyhow::Error> {
        let mut i = 0;
        while i < data.len() {
            if (mask >> i) & 1 == 0 {
                i += 1;
                continue;
            }
            let start = i;
            while i < data.len() && (mask >> i) & 1 != 0 {
                i += 1;
            }
            self.write(addr + start as u64, &data[start..i])?;
        }
        Ok(())
    }
}
