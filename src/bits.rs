//! Leading-zero-bit predicate shared by the verifier, the reference solver
//! and the in-browser solver embedded in the challenge page.
//!
//! Bit 0 of a byte is its most significant bit, and bytes are read in order.
//! Any solver that disagrees on this convention still terminates on some
//! inputs but produces nonces the gate rejects, so every implementation must
//! match [`is_zero_prefix`] bit for bit.

/// Returns `true` when the first `n` bits of `bytes` are all zero.
///
/// Callers must pass `bytes.len() * 8 >= n`; `n == 0` always succeeds.
pub fn is_zero_prefix(bytes: &[u8], n: u32) -> bool {
    debug_assert!(
        bytes.len() as u64 * 8 >= n as u64,
        "prefix of {n} bits requested from {} bytes",
        bytes.len()
    );

    let q = (n / 8) as usize;
    let r = n % 8;

    let Some(full) = bytes.get(..q) else {
        return false;
    };
    if full.iter().any(|b| *b != 0) {
        return false;
    }

    if r > 0 {
        let mask = 0xFFu8 << (8 - r);
        match bytes.get(q) {
            Some(b) if b & mask == 0 => {}
            _ => return false,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_byte_prefixes() {
        assert!(is_zero_prefix(&[0x00, 0x01], 8));
        assert!(!is_zero_prefix(&[0x01, 0x00], 8));
        assert!(is_zero_prefix(&[0x00, 0x00, 0x01], 16));
        assert!(!is_zero_prefix(&[0x01, 0x00, 0x00], 16));
    }

    #[test]
    fn partial_byte_prefixes_are_msb_first() {
        assert!(is_zero_prefix(&[0x00, 0x20], 10));
        assert!(!is_zero_prefix(&[0x00, 0x40], 10));
        assert!(is_zero_prefix(&[0x0F], 4));
        assert!(!is_zero_prefix(&[0x10], 4));
        assert!(is_zero_prefix(&[0x01], 7));
        assert!(!is_zero_prefix(&[0x01], 8));
    }

    #[test]
    fn zero_bits_always_pass() {
        assert!(is_zero_prefix(&[0xFF, 0xFF], 0));
        assert!(is_zero_prefix(&[], 0));
    }

    #[test]
    fn full_digest_width() {
        assert!(is_zero_prefix(&[0u8; 32], 256));
        let mut digest = [0u8; 32];
        digest[31] = 0x01;
        assert!(is_zero_prefix(&digest, 255));
        assert!(!is_zero_prefix(&digest, 256));
    }

    #[test]
    fn agrees_with_leading_zero_count() {
        // Every byte value against every prefix length inside a two-byte window.
        for hi in 0..=255u8 {
            for lo in [0x00u8, 0x01, 0x80, 0xFF] {
                let bytes = [hi, lo];
                let leading = if hi == 0 {
                    8 + lo.leading_zeros()
                } else {
                    hi.leading_zeros()
                };
                for n in 0..=16u32 {
                    assert_eq!(
                        is_zero_prefix(&bytes, n),
                        n <= leading,
                        "bytes={bytes:02x?} n={n}"
                    );
                }
            }
        }
    }
}
