use std::fmt;

use crate::mem::bits::nbit_mask;

/// Largest block any unit moves in one transaction. The store write mask carries one bit per
/// byte, so this is bounded by the width of `u64`.
pub const MAX_BLOCK_SIZE: usize = 64;

pub type Addr = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestType {
    #[default]
    Na,
    Load,
    Store,
    /// Warms a line without producing a return.
    Prefetch,
    AmoAdd,
    AmoXor,
    AmoOr,
    AmoAnd,
    AmoMin,
    AmoMax,
    AmoMinu,
    AmoMaxu,
}

impl RequestType {
    pub fn is_amo(self) -> bool {
        matches!(
            self,
            Self::AmoAdd
                | Self::AmoXor
                | Self::AmoOr
                | Self::AmoAnd
                | Self::AmoMin
                | Self::AmoMax
                | Self::AmoMinu
                | Self::AmoMaxu
        )
    }

    /// Whether the requester expects a `MemoryReturn` for this request.
    pub fn has_return(self) -> bool {
        matches!(self, Self::Load) || self.is_amo()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnType {
    #[default]
    Na,
    LoadReturn,
}

/// Inline data buffer of one transaction. Typed views encode/decode little-endian at a byte
/// offset instead of aliasing the storage.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Payload([u8; MAX_BLOCK_SIZE]);

impl Default for Payload {
    fn default() -> Self {
        Self([0u8; MAX_BLOCK_SIZE])
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload(")?;
        for byte in self.0[..16].iter() {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

impl Payload {
    pub fn from_slice(data: &[u8]) -> Self {
        let mut payload = Self::default();
        payload.write_bytes(0, data);
        payload
    }

    pub fn bytes(&self) -> &[u8; MAX_BLOCK_SIZE] {
        &self.0
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; MAX_BLOCK_SIZE] {
        &mut self.0
    }

    pub fn slice(&self, offset: usize, n: usize) -> &[u8] {
        &self.0[offset..offset + n]
    }

    pub fn read_n<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.0[offset..offset + N]);
        out
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.read_n::<4>(offset))
    }

    pub fn read_u64(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.read_n::<8>(offset))
    }

    /// Reads `n` bytes at `offset` zero-extended to 64 bits.
    pub fn read_uint(&self, offset: usize, n: usize) -> u64 {
        assert!(n <= 8, "integer views are at most 8 bytes");
        let mut buf = [0u8; 8];
        buf[..n].copy_from_slice(&self.0[offset..offset + n]);
        u64::from_le_bytes(buf)
    }

    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) {
        self.0[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    pub fn write_uint(&mut self, offset: usize, n: usize, value: u64) {
        assert!(n <= 8, "integer views are at most 8 bytes");
        self.write_bytes(offset, &value.to_le_bytes()[..n]);
    }

    /// Copies the bytes of `src` selected by `mask` (bit i is byte i) into `self`.
    pub fn merge_masked(&mut self, src: &Payload, mask: u64) {
        for i in 0..MAX_BLOCK_SIZE {
            if (mask >> i) & 1 != 0 {
                self.0[i] = src.0[i];
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRequest {
    pub ty: RequestType,
    pub size: usize,
    /// Port on the receiving unit; returns are routed back to it.
    pub port: usize,
    /// Opaque tag round-tripped to the requester unchanged.
    pub dst: u64,
    pub addr: Addr,
    /// Byte enables relative to `addr`, STORE only.
    pub write_mask: u64,
    pub data: Payload,
}

/// Merge detection only cares about what is being accessed, not who asked.
impl PartialEq for MemoryRequest {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.size == other.size && self.addr == other.addr
    }
}

impl MemoryRequest {
    fn new(ty: RequestType, addr: Addr, size: usize, port: usize) -> Self {
        assert!(size > 0 && size <= MAX_BLOCK_SIZE, "request size {} out of range", size);
        Self {
            ty,
            size,
            port,
            dst: 0,
            addr,
            write_mask: 0,
            data: Payload::default(),
        }
    }

    pub fn load(addr: Addr, size: usize, port: usize) -> Self {
        Self::new(RequestType::Load, addr, size, port)
    }

    pub fn store(addr: Addr, data: &[u8], port: usize) -> Self {
        let mut req = Self::new(RequestType::Store, addr, data.len(), port);
        req.write_mask = nbit_mask(data.len() as u32);
        req.data = Payload::from_slice(data);
        req
    }

    /// A block-sized store where only the bytes in `write_mask` are meaningful.
    pub fn masked_store(addr: Addr, size: usize, data: Payload, write_mask: u64, port: usize) -> Self {
        let mut req = Self::new(RequestType::Store, addr, size, port);
        req.write_mask = write_mask & nbit_mask(size as u32);
        req.data = data;
        req
    }

    pub fn prefetch(addr: Addr, size: usize, port: usize) -> Self {
        Self::new(RequestType::Prefetch, addr, size, port)
    }

    pub fn amo(ty: RequestType, addr: Addr, size: usize, operand: u64, port: usize) -> Self {
        assert!(ty.is_amo(), "{:?} is not an atomic", ty);
        assert!(size == 4 || size == 8, "atomics are word or double-word sized");
        let mut req = Self::new(ty, addr, size, port);
        req.data.write_uint(0, size, operand);
        req
    }

    pub fn with_dst(mut self, dst: u64) -> Self {
        self.dst = dst;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryReturn {
    pub ty: ReturnType,
    pub size: usize,
    pub port: usize,
    pub dst: u64,
    pub addr: Addr,
    pub data: Payload,
}

impl MemoryReturn {
    /// Copies the routing fields of `request` and attaches `data` as the result.
    pub fn from_request(request: &MemoryRequest, data: &[u8]) -> Self {
        assert!(data.len() >= request.size, "return data shorter than request");
        Self {
            ty: ReturnType::LoadReturn,
            size: request.size,
            port: request.port,
            dst: request.dst,
            addr: request.addr,
            data: Payload::from_slice(&data[..request.size]),
        }
    }
}
