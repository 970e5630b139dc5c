//! Append-only fingerprint index with block-bucketed lookup.
//!
//! Each fingerprint is cut into four 16-bit blocks. Two fingerprints within
//! `DUPLICATE_THRESHOLD` bits of each other differ in at most three blocks,
//! so they agree exactly on at least one. Lookups therefore only compare
//! against entries sharing a block value, and report the lowest stored
//! position among the matches: the same answer a full in-order scan gives.

use std::collections::HashMap;

use ctrlscroll_core::FingerprintEntry;

use crate::simhash::hamming;

/// Maximum Hamming distance at which two posts count as the same story.
pub const DUPLICATE_THRESHOLD: u32 = 3;

const BLOCKS: usize = DUPLICATE_THRESHOLD as usize + 1;
const BLOCK_BITS: usize = 64 / BLOCKS;

fn block(fingerprint: u64, index: usize) -> u16 {
    (fingerprint >> (index * BLOCK_BITS)) as u16
}

#[derive(Debug, Clone, Default)]
pub struct FingerprintIndex {
    entries: Vec<FingerprintEntry>,
    positions: HashMap<String, usize>,
    buckets: [HashMap<u16, Vec<usize>>; BLOCKS],
}

impl FingerprintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from stored order. Later entries reusing an id are dropped.
    pub fn from_entries(entries: impl IntoIterator<Item = FingerprintEntry>) -> Self {
        let mut index = Self::new();
        for entry in entries {
            index.push(entry);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FingerprintEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<FingerprintEntry> {
        self.entries
    }

    pub fn get(&self, id: &str) -> Option<&FingerprintEntry> {
        self.positions.get(id).map(|&pos| &self.entries[pos])
    }

    /// Appends `entry` unless its id is already indexed. Returns whether it was added.
    pub fn push(&mut self, entry: FingerprintEntry) -> bool {
        if self.positions.contains_key(&entry.id) {
            return false;
        }
        let pos = self.entries.len();
        for (i, bucket) in self.buckets.iter_mut().enumerate() {
            bucket
                .entry(block(entry.fingerprint, i))
                .or_default()
                .push(pos);
        }
        self.positions.insert(entry.id.clone(), pos);
        self.entries.push(entry);
        true
    }

    /// First entry in stored order within `DUPLICATE_THRESHOLD` of `fingerprint`,
    /// with its distance.
    pub fn first_match(&self, fingerprint: u64) -> Option<(&FingerprintEntry, u32)> {
        let mut best: Option<(usize, u32)> = None;
        for (i, bucket) in self.buckets.iter().enumerate() {
            let Some(candidates) = bucket.get(&block(fingerprint, i)) else {
                continue;
            };
            // Positions are ascending within a bucket.
            for &pos in candidates {
                if best.is_some_and(|(b, _)| pos >= b) {
                    break;
                }
                let distance = hamming(fingerprint, self.entries[pos].fingerprint);
                if distance <= DUPLICATE_THRESHOLD {
                    best = Some((pos, distance));
                    break;
                }
            }
        }
        best.map(|(pos, distance)| (&self.entries[pos], distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, fingerprint: u64) -> FingerprintEntry {
        FingerprintEntry {
            id: id.to_string(),
            fingerprint,
            title: format!("title {id}"),
        }
    }

    fn linear_first_match(entries: &[FingerprintEntry], fingerprint: u64) -> Option<(String, u32)> {
        entries.iter().find_map(|e| {
            let d = hamming(fingerprint, e.fingerprint);
            (d <= DUPLICATE_THRESHOLD).then(|| (e.id.clone(), d))
        })
    }

    #[test]
    fn first_stored_match_wins() {
        let base = 0xDEAD_BEEF_0000_FFFF;
        let index = FingerprintIndex::from_entries(vec![
            entry("far", !base),
            entry("two-bits", base ^ 0b11),
            entry("exact", base),
        ]);
        let (hit, distance) = index.first_match(base).expect("match");
        assert_eq!(hit.id, "two-bits");
        assert_eq!(distance, 2);
    }

    #[test]
    fn distance_four_is_not_a_match() {
        let base = 0x0123_4567_89AB_CDEF;
        // One flipped bit in every block defeats every bucket and the threshold.
        let flipped = base ^ 1 ^ (1 << 16) ^ (1 << 32) ^ (1 << 48);
        let index = FingerprintIndex::from_entries(vec![entry("a", flipped)]);
        assert!(index.first_match(base).is_none());

        let three = base ^ 1 ^ (1 << 16) ^ (1 << 32);
        let index = FingerprintIndex::from_entries(vec![entry("b", three)]);
        assert_eq!(index.first_match(base).map(|(e, d)| (e.id.as_str(), d)), Some(("b", 3)));
    }

    #[test]
    fn duplicate_ids_keep_first_entry() {
        let mut index = FingerprintIndex::from_entries(vec![entry("a", 1), entry("a", 2)]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("a").map(|e| e.fingerprint), Some(1));
        assert!(!index.push(entry("a", 3)));
        assert!(index.push(entry("b", 3)));
        assert_eq!(
            index.entries().iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn bucketed_lookup_agrees_with_linear_scan() {
        // Deterministic xorshift stream; queries are perturbed copies of stored values.
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let mut entries = Vec::new();
        for i in 0..400 {
            entries.push(entry(&format!("e{i}"), next()));
        }
        // Near-duplicates of earlier entries stored later in the sequence.
        for i in 0..100 {
            let source = entries[i * 3].fingerprint;
            let bits = next();
            let perturbed = source ^ (1 << (bits % 64)) ^ (1 << ((bits >> 8) % 64));
            entries.push(entry(&format!("n{i}"), perturbed));
        }
        let index = FingerprintIndex::from_entries(entries.clone());

        for i in 0..300 {
            let bits = next();
            let query = if i % 2 == 0 {
                let source = entries[(bits % entries.len() as u64) as usize].fingerprint;
                let mut q = source;
                for k in 0..(bits >> 20) % 5 {
                    q ^= 1 << ((bits >> (24 + 6 * k)) % 64);
                }
                q
            } else {
                bits
            };
            let expected = linear_first_match(&entries, query);
            let actual = index.first_match(query).map(|(e, d)| (e.id.clone(), d));
            assert_eq!(actual, expected, "query {query:#x}");
        }
    }
}
