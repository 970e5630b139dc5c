//! Core domain records shared by the CtrlScroll dedup and ranking crates.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

pub const CRATE_NAME: &str = "ctrlscroll-core";

/// Enriched + summarized post handed over by the ingestion stage.
///
/// Every field except `id` is optional on the wire. Text fields carrying the
/// wrong JSON type read as empty strings so a single malformed record never
/// aborts a batch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePost {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub normalized_url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subreddit: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub created_utc: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub score: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub comments: i64,
    #[serde(default, deserialize_with = "lenient_string_vec")]
    pub top_comments: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub external_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_vec")]
    pub entities: Vec<String>,
    #[serde(default, deserialize_with = "lenient_f64_vec")]
    pub sentiment_scores: Vec<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub controversy_score: Option<f64>,
}

impl CandidatePost {
    /// Title followed by every top comment, space-joined in their given order.
    pub fn fingerprint_text(&self) -> String {
        let mut text = self.title.clone();
        for comment in &self.top_comments {
            text.push(' ');
            text.push_str(comment);
        }
        text
    }
}

/// Scorer input. Values outside their natural ranges are accepted as-is.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PostMetrics {
    pub minutes_since_post: f64,
    pub upvotes: f64,
    pub comments: f64,
    /// Dispersion of comment sentiment, expected in [0, 1].
    pub sentiment_stddev: f64,
    pub entity_popularity: f64,
    pub external_authority: f64,
}

/// One persisted SimHash fingerprint. Entries are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub id: String,
    #[serde(with = "fingerprint_repr")]
    pub fingerprint: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
}

/// Candidate classified as a near-duplicate of an already indexed post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateRecord {
    pub id: String,
    pub duplicate_of: String,
    pub distance: u32,
}

/// Final score plus the five squashed components, all in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: String,
    pub score: f64,
    pub recency: f64,
    pub engagement: f64,
    pub controversy: f64,
    pub popularity: f64,
    pub authority: f64,
}

/// A post paired with the score it was ranked by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPost {
    pub post: CandidatePost,
    pub rank: ScoreRecord,
}

/// Serde representation of a `u64` fingerprint.
///
/// Written as a decimal string so JSON consumers without 64-bit integers keep
/// full precision. Reads decimal strings, `0x` hex strings and bare integers.
pub mod fingerprint_repr {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value as JsonValue;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = JsonValue::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid fingerprint: {raw}")))
    }

    pub fn parse(raw: &JsonValue) -> Option<u64> {
        match raw {
            JsonValue::Number(n) => n.as_u64(),
            JsonValue::String(s) => {
                let s = s.trim();
                match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    Some(hex) => u64::from_str_radix(hex, 16).ok(),
                    None => s.parse().ok(),
                }
            }
            _ => None,
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

fn lenient_string_vec<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                JsonValue::String(s) => s,
                _ => String::new(),
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        _ => 0,
    })
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::Number(n) => n.as_f64(),
        _ => None,
    })
}

fn lenient_f64_vec<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::Array(items) => items.iter().filter_map(JsonValue::as_f64).collect(),
        _ => Vec::new(),
    })
}
