use crate::bits::is_zero_prefix;
use sha2::{Digest, Sha256};

/// Longest nonce the gate will hash.
pub const MAX_NONCE_LEN: usize = 32;

/// `SHA-256(fingerprint || nonce)`.
pub fn solution_digest(fingerprint: &[u8], nonce: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint);
    hasher.update(nonce);
    hasher.finalize().into()
}

/// Check a submitted nonce against a fingerprint.
///
/// Oversized nonces are rejected before any hashing. There is no replay
/// tracking: a nonce that passed once passes again until the epoch rotates.
pub fn verify_solution(fingerprint: &[u8; 32], nonce: &[u8], difficulty: u32) -> bool {
    if nonce.len() > MAX_NONCE_LEN {
        return false;
    }
    is_zero_prefix(&solution_digest(fingerprint, nonce), difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_nonce(fingerprint: &[u8; 32], difficulty: u32) -> [u8; 8] {
        (0u64..)
            .map(u64::to_le_bytes)
            .find(|n| is_zero_prefix(&solution_digest(fingerprint, n), difficulty))
            .unwrap()
    }

    #[test]
    fn accepts_exactly_what_the_predicate_accepts() {
        let fingerprint = [0x5Au8; 32];
        for counter in 0u64..256 {
            let nonce = counter.to_le_bytes();
            let digest = solution_digest(&fingerprint, &nonce);
            for bits in [0, 1, 4, 8] {
                assert_eq!(
                    verify_solution(&fingerprint, &nonce, bits),
                    is_zero_prefix(&digest, bits)
                );
            }
        }
    }

    #[test]
    fn found_nonce_verifies_and_is_stable() {
        let fingerprint = [0x11u8; 32];
        let nonce = find_nonce(&fingerprint, 10);
        assert!(verify_solution(&fingerprint, &nonce, 10));
        assert!(verify_solution(&fingerprint, &nonce, 10));

        let mut other = fingerprint;
        other[0] ^= 1;
        assert_eq!(
            verify_solution(&other, &nonce, 10),
            is_zero_prefix(&solution_digest(&other, &nonce), 10)
        );
    }

    #[test]
    fn oversized_nonce_rejected_even_at_zero_difficulty() {
        let fingerprint = [0u8; 32];
        assert!(verify_solution(&fingerprint, &[0u8; 32], 0));
        assert!(!verify_solution(&fingerprint, &[0u8; 33], 0));
    }

    #[test]
    fn empty_nonce_is_allowed() {
        let fingerprint = [1u8; 32];
        assert!(verify_solution(&fingerprint, &[], 0));
    }
}
