/// Unmask (or mask) a payload in place.
///
/// Inbound client frames arrive XOR-ed with a 4-byte key cycled over the
/// payload; applying the same key again restores the original bytes.
#[inline]
pub fn apply_mask(buf: &mut [u8], mask: [u8; 4]) {
    apply_mask_words(buf, mask);
}

/// The unoptimized byte-wise form, kept as the reference implementation.
#[inline]
fn apply_mask_bytes(buf: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

/// XOR over 4-byte chunks at a time, with a byte-wise tail.
///
/// The chunks start at offset 0 of the slice, so the remainder always
/// begins at a multiple of four and the key needs no rotation.
#[inline]
fn apply_mask_words(buf: &mut [u8], mask: [u8; 4]) {
    let mask_word = u32::from_ne_bytes(mask);

    let mut chunks = buf.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ mask_word;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    // the remainder starts at a multiple of four, so the key lines up
    apply_mask_bytes(chunks.into_remainder(), mask);
}
