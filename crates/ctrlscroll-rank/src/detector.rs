//! Sequential near-duplicate classification against a fingerprint index.

use ctrlscroll_core::{CandidatePost, DuplicateRecord, FingerprintEntry};
use tracing::debug;

use crate::index::FingerprintIndex;
use crate::simhash::{fingerprint, hamming};

/// Partition of one batch plus the index to persist afterwards.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub accepted: Vec<CandidatePost>,
    pub duplicates: Vec<DuplicateRecord>,
    pub updated_index: Vec<FingerprintEntry>,
}

impl Detection {
    pub fn duplicate_ids(&self) -> Vec<&str> {
        self.duplicates.iter().map(|d| d.id.as_str()).collect()
    }
}

/// Classifies `candidates` in order against `existing` and returns the
/// grown index. Accepted posts are indexed immediately, so a later candidate
/// in the same batch can be flagged as a duplicate of an earlier one.
pub fn detect_duplicates(
    candidates: Vec<CandidatePost>,
    existing: Vec<FingerprintEntry>,
) -> Detection {
    let mut index = FingerprintIndex::from_entries(existing);
    let (accepted, duplicates) = detect_into(&mut index, candidates);
    Detection {
        accepted,
        duplicates,
        updated_index: index.into_entries(),
    }
}

/// Same as [`detect_duplicates`] over a caller-held index.
pub fn detect_into(
    index: &mut FingerprintIndex,
    candidates: Vec<CandidatePost>,
) -> (Vec<CandidatePost>, Vec<DuplicateRecord>) {
    let mut accepted = Vec::new();
    let mut duplicates = Vec::new();

    for candidate in candidates {
        let fp = fingerprint(&candidate.fingerprint_text());

        let matched = index
            .first_match(fp)
            .or_else(|| {
                // Re-ingested id that drifted past the threshold still maps to itself.
                index
                    .get(&candidate.id)
                    .map(|existing| (existing, hamming(fp, existing.fingerprint)))
            })
            .map(|(entry, distance)| (entry.id.clone(), distance));

        match matched {
            Some((duplicate_of, distance)) => {
                debug!(
                    id = %candidate.id,
                    %duplicate_of,
                    distance,
                    title = %candidate.title.chars().take(50).collect::<String>(),
                    "duplicate detected"
                );
                duplicates.push(DuplicateRecord {
                    id: candidate.id,
                    duplicate_of,
                    distance,
                });
            }
            None => {
                index.push(FingerprintEntry {
                    id: candidate.id.clone(),
                    fingerprint: fp,
                    title: candidate.title.clone(),
                });
                accepted.push(candidate);
            }
        }
    }

    (accepted, duplicates)
}
