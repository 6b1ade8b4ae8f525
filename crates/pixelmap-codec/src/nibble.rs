//! Unpacking of tightly bit-packed field arrays.
//!
//! Minecraft stores per-tile indices as `bits`-wide fields inside long (or,
//! on Bedrock, int) arrays. Two layouts exist:
//!
//! - *spanning* (chunk generation 13, pre-1.16): field `i` starts at bit
//!   `i * bits` of the continuous stream and may cross a word boundary;
//! - *non-spanning* (1.16 and later, and Bedrock sub-chunks): each word
//!   holds `word_bits / bits` whole fields, leftover high bits are padding.

/// Classic 4-bit nibble from a byte array, low half first.
pub fn nibble4(data: &[u8], index: usize) -> u8 {
    let byte = data[index >> 1];
    if index & 1 == 0 {
        byte & 0x0F
    } else {
        byte >> 4
    }
}

/// How many fields one word holds in the non-spanning layout.
pub fn fields_per_word(word_bits: usize, bits: usize) -> usize {
    word_bits / bits
}

/// Word count needed for `count` fields in the non-spanning layout.
pub fn packed_word_count(count: usize, word_bits: usize, bits: usize) -> usize {
    count.div_ceil(fields_per_word(word_bits, bits))
}

/// Word count needed for `count` fields in the spanning layout.
pub fn spanning_word_count(count: usize, word_bits: usize, bits: usize) -> usize {
    (count * bits).div_ceil(word_bits)
}

/// Unpack the spanning layout from a `u64` backing array.
pub fn unpack_spanning(src: &[u64], dst: &mut [u16], bits: usize) {
    if bits == 0 {
        return;
    }
    if bits >= 64 {
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d = *s as u16;
        }
        return;
    }
    let mask = u64::MAX >> (64 - bits);
    let avail = src.len() * 64 / bits;
    let n = dst.len().min(avail);
    for (i, d) in dst.iter_mut().enumerate().take(n) {
        let start = i * bits;
        let w = start / 64;
        let b = start % 64;
        let v = if b + bits <= 64 {
            (src[w] >> b) & mask
        } else {
            let lo = src[w] >> b;
            let hi = src[w + 1] << (64 - b);
            (lo | hi) & mask
        };
        *d = v as u16;
    }
}

/// Unpack the non-spanning layout from a `u64` backing array.
pub fn unpack_packed(src: &[u64], dst: &mut [u16], bits: usize) {
    if bits == 0 {
        return;
    }
    if bits >= 64 {
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d = *s as u16;
        }
        return;
    }
    let mask = u64::MAX >> (64 - bits);
    let parts = 64 / bits;
    let n = dst.len().min(src.len().saturating_mul(parts));
    for (i, d) in dst.iter_mut().enumerate().take(n) {
        let w = i / parts;
        let b = (i % parts) * bits;
        *d = ((src[w] >> b) & mask) as u16;
    }
}

/// Unpack the non-spanning layout from a `u32` backing array, as used by
/// Bedrock sub-chunk storages.
pub fn unpack_packed_u32(src: &[u32], dst: &mut [u16], bits: usize) {
    if bits == 0 {
        return;
    }
    if bits >= 32 {
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d = *s as u16;
        }
        return;
    }
    let mask = u32::MAX >> (32 - bits);
    let parts = 32 / bits;
    let n = dst.len().min(src.len().saturating_mul(parts));
    for (i, d) in dst.iter_mut().enumerate().take(n) {
        let w = i / parts;
        let b = (i % parts) * bits;
        *d = ((src[w] >> b) & mask) as u16;
    }
}
