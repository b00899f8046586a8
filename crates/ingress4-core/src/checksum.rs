//! Internet checksum: ones-complement sum of 16-bit words with folding.
//!
//! Used to validate the IPv4 header over its declared length. A header
//! whose stored checksum field is correct sums to `0xffff` before the
//! final complement, so verification reduces to "the fold over the whole
//! header is zero".

/// Fold a 32-bit accumulator down to 16 bits, adding carries back in.
fn fold(mut acc: u32) -> u16 {
    while acc > 0xffff {
        acc = (acc & 0xffff) + (acc >> 16);
    }
    acc as u16
}

/// Ones-complement sum over `data`, without the final complement.
///
/// An odd trailing byte is treated as the high byte of a zero-padded word.
fn sum(data: &[u8]) -> u32 {
    let mut acc: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        acc += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = chunks.remainder() {
        acc += u32::from(u16::from_be_bytes([*last, 0]));
    }
    acc
}

/// Compute the checksum field value for `data` (checksum field zeroed).
pub fn checksum(data: &[u8]) -> u16 {
    !fold(sum(data))
}

/// Verify a region that includes its own checksum field.
///
/// Returns `true` when the stored checksum is consistent with the data.
pub fn verify(data: &[u8]) -> bool {
    fold(sum(data)) == 0xffff
}
