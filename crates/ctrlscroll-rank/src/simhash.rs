//! 64-bit SimHash over alphanumeric tokens.

use sha2::{Digest, Sha256};

/// Lower-cases `text` and returns its maximal ASCII `[a-z0-9]` runs in order.
/// Any other character, accented letters included, separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// First eight bytes of the token's SHA-256 digest, little-endian.
pub fn token_hash(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

/// SimHash fingerprint of `text`.
///
/// Each token votes +1/-1 on every bit position according to its hash; a bit
/// is set only when its vote total is strictly positive, so ties and empty
/// input produce 0 bits.
pub fn fingerprint(text: &str) -> u64 {
    let mut votes = [0i64; 64];
    for token in tokenize(text) {
        let hash = token_hash(&token);
        for (bit, vote) in votes.iter_mut().enumerate() {
            if (hash >> bit) & 1 == 1 {
                *vote += 1;
            } else {
                *vote -= 1;
            }
        }
    }

    votes
        .iter()
        .enumerate()
        .filter(|(_, vote)| **vote > 0)
        .fold(0u64, |acc, (bit, _)| acc | (1u64 << bit))
}

/// Number of differing bit positions, 0..=64.
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}
