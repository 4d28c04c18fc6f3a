/// Floor of log2; `x` must be non-zero.
pub fn log2i(x: u64) -> u32 {
    assert!(x != 0, "log2 of zero");
    63 - x.leading_zeros()
}

/// Mask with the low `bits` bits set.
pub fn nbit_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Parallel bit extract: gathers the bits of `value` selected by `mask` into the low bits of
/// the result, preserving their order.
pub fn pext(value: u64, mask: u64) -> u64 {
    let mut out = 0u64;
    let mut out_bit = 0;
    let mut m = mask;
    while m != 0 {
        let bit = m.trailing_zeros();
        if (value >> bit) & 1 != 0 {
            out |= 1 << out_bit;
        }
        out_bit += 1;
        m &= m - 1;
    }
    out
}

/// First run of set bits in `mask` as `(start, len)`, or `None` if the mask is empty.
pub fn contiguous_run(mask: u64) -> Option<(u32, u32)> {
    if mask == 0 {
        return None;
    }
    let start = mask.trailing_zeros();
    let len = (mask >> start).trailing_ones();
    Some((start, len))
}
