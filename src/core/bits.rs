//! Fixed-width integer helpers shared by the encoders.

/// True if `value` is representable as a signed `bits`-bit integer.
pub fn is_int(bits: u32, value: i64) -> bool {
    debug_assert!(bits > 0 && bits <= 64);
    if bits >= 64 {
        return true;
    }
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    (min..=max).contains(&value)
}

/// Sign-extend the low `bits` bits of `value`.
pub fn sign_extend(bits: u32, value: u64) -> i64 {
    debug_assert!(bits > 0 && bits <= 64);
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Mask selecting the low `bits` bits.
pub fn low_mask(bits: u32) -> u64 {
    debug_assert!(bits > 0 && bits <= 64);
    u64::MAX >> (64 - bits)
}
