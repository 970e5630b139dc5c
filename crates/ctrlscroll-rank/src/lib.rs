//! Near-duplicate detection and relevance ranking for candidate posts.
//!
//! Everything in this crate is a pure function over its explicit inputs. The
//! caller owns persistence of the fingerprint index and any locking around it.

pub mod detector;
pub mod index;
pub mod scoring;
pub mod simhash;

pub use detector::{detect_duplicates, detect_into, Detection};
pub use index::{FingerprintIndex, DUPLICATE_THRESHOLD};
pub use scoring::{calculate_score, clamp, rank, score_and_rank, score_candidate, sigmoid};
pub use simhash::{fingerprint, hamming, token_hash, tokenize};

pub const CRATE_NAME: &str = "ctrlscroll-rank";
