//! WebSocket frame masking
//!
//! Masking is an XOR of every payload byte with `mask[i % 4]`, so the same
//! routine masks outbound client frames and unmasks inbound ones.
//! Mask keys come from one of the RNG backends selected via feature flags:
//! - `fastrand`: fast PRNG (default)
//! - `getrandom`: OS randomness

/// Apply a WebSocket mask in place
///
/// Works eight bytes at a time on the aligned body and byte-by-byte on the
/// tail. Applying the same mask twice restores the input.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    if data.is_empty() {
        return;
    }

    let mask_u64 = u64::from_ne_bytes([
        mask[0], mask[1], mask[2], mask[3], mask[0], mask[1], mask[2], mask[3],
    ]);

    let mut chunks = data.chunks_exact_mut(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        let masked = u64::from_ne_bytes(word) ^ mask_u64;
        chunk.copy_from_slice(&masked.to_ne_bytes());
    }

    // Every full chunk is a multiple of 4 bytes, so the tail starts at mask[0]
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

/// Generate a random mask for client frames
///
/// If both features are enabled, `getrandom` wins.
#[inline]
pub fn generate_mask() -> [u8; 4] {
    generate_mask_inner()
}

#[cfg(feature = "getrandom")]
#[inline]
fn generate_mask_inner() -> [u8; 4] {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_err() {
        // The OS source is unavailable; a weak key still satisfies framing.
        log::warn!("getrandom failed, falling back to a time-derived mask");
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        buf = nanos.to_ne_bytes();
    }
    buf
}

#[cfg(all(feature = "fastrand", not(feature = "getrandom")))]
#[inline]
fn generate_mask_inner() -> [u8; 4] {
    fastrand::u32(..).to_ne_bytes()
}

#[cfg(not(any(feature = "fastrand", feature = "getrandom")))]
fn generate_mask_inner() -> [u8; 4] {
    compile_error!("At least one RNG feature must be enabled: fastrand or getrandom");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_mask(data: &mut [u8], mask: [u8; 4]) {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    }

    #[test]
    fn test_apply_mask_basic() {
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let original = b"Hello, WebSocket!".to_vec();
        let mut data = original.clone();

        apply_mask(&mut data, mask);
        assert_ne!(data, original);

        // XOR is self-inverse
        apply_mask(&mut data, mask);
        assert_eq!(data, original);
    }

    #[test]
    fn test_apply_mask_empty() {
        let mut data: Vec<u8> = vec![];
        apply_mask(&mut data, [0x37, 0xfa, 0x21, 0x3d]);
        assert!(data.is_empty());
    }

    #[test]
    fn test_matches_bytewise_definition() {
        let mask = [0x01, 0x02, 0x03, 0x04];
        for len in 0..40 {
            let original: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let mut fast = original.clone();
            let mut slow = original.clone();
            apply_mask(&mut fast, mask);
            reference_mask(&mut slow, mask);
            assert_eq!(fast, slow, "length {}", len);
        }
    }

    #[test]
    fn test_generate_mask_varies() {
        let masks: Vec<[u8; 4]> = (0..16).map(|_| generate_mask()).collect();
        assert!(masks.iter().any(|m| *m != masks[0]));
    }
}
