//! Batch orchestration: locked dedup against the stored index, opt-out,
//! scoring and the ranked hand-off for the publisher.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ctrlscroll_core::{CandidatePost, DuplicateRecord, FingerprintEntry, PostMetrics, RankedPost};
use ctrlscroll_rank::{clamp, detect_duplicates, score_and_rank};
use ctrlscroll_storage::{read_json, read_json_or_default, write_json_atomic, IndexStore, KeyedLocks};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

pub const CRATE_NAME: &str = "ctrlscroll-pipeline";

/// Caller-owned policy for turning an enriched post into scorer inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsPolicy {
    /// Authority points granted when the post links an external page with a title.
    pub authority_bonus: f64,
    pub entity_weight: f64,
    pub entity_cap: f64,
}

impl Default for MetricsPolicy {
    fn default() -> Self {
        Self {
            authority_bonus: 30.0,
            entity_weight: 2.0,
            entity_cap: 10.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub metrics: MetricsPolicy,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = MetricsPolicy::default();
        Self {
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            metrics: MetricsPolicy {
                authority_bonus: env_f64("CTRLSCROLL_AUTHORITY_BONUS")
                    .unwrap_or(defaults.authority_bonus),
                entity_weight: env_f64("CTRLSCROLL_ENTITY_WEIGHT").unwrap_or(defaults.entity_weight),
                entity_cap: env_f64("CTRLSCROLL_ENTITY_CAP").unwrap_or(defaults.entity_cap),
            },
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Population standard deviation of per-comment sentiment, bounded to [0, 1].
pub fn controversy_from_sentiment(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    clamp(variance.sqrt(), 0.0, 1.0)
}

pub fn metrics_for_post(post: &CandidatePost, now: DateTime<Utc>, policy: &MetricsPolicy) -> PostMetrics {
    let entity_popularity =
        (post.entities.len() as f64 * policy.entity_weight).min(policy.entity_cap);
    PostMetrics {
        minutes_since_post: (now.timestamp() as f64 - post.created_utc as f64) / 60.0,
        upvotes: post.score as f64,
        comments: post.comments as f64,
        sentiment_stddev: post
            .controversy_score
            .unwrap_or_else(|| controversy_from_sentiment(&post.sentiment_scores)),
        entity_popularity,
        external_authority: if post.external_title.is_some() {
            policy.authority_bonus
        } else {
            0.0
        },
    }
}

/// Subreddits, authors and link domains that must never be published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptOut {
    #[serde(default)]
    pub subreddits: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
}

impl OptOut {
    /// `<data_dir>/optout.json`; missing or malformed means nothing is opted out.
    pub async fn load(data_dir: &Path) -> Self {
        read_json_or_default(&data_dir.join("optout.json")).await
    }

    /// Why `post` is excluded, if it is.
    pub fn reason(&self, post: &CandidatePost) -> Option<String> {
        if self.subreddits.iter().any(|s| s == &post.subreddit) {
            return Some(format!("subreddit r/{}", post.subreddit));
        }
        if self.authors.iter().any(|a| a == &post.author) {
            return Some(format!("author u/{}", post.author));
        }
        let host = Url::parse(&post.normalized_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))?;
        self.domains
            .iter()
            .map(|d| d.trim().to_lowercase())
            .find(|d| !d.is_empty() && host.contains(d.as_str()))
            .map(|_| format!("domain {host}"))
    }

    pub fn allows(&self, post: &CandidatePost) -> bool {
        self.reason(post).is_none()
    }
}

/// Everything one ranking pass produced; written as the publisher hand-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub index_entries: usize,
    pub ranked: Vec<RankedPost>,
    pub duplicates: Vec<DuplicateRecord>,
    pub opted_out: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BatchRun {
    pub report: BatchReport,
    pub report_path: PathBuf,
}

pub struct RankPipeline {
    config: PipelineConfig,
    index: IndexStore,
    locks: KeyedLocks,
}

impl RankPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let index = IndexStore::in_data_dir(&config.data_dir);
        Self {
            config,
            index,
            locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn index_entries(&self) -> Vec<FingerprintEntry> {
        self.index.load().await
    }

    /// Runs one batch: dedup against the stored index, opt-out, score, rank,
    /// and write `reports/<run_id>/ranked.json`.
    pub async fn run_batch(&self, candidates: Vec<CandidatePost>, now: DateTime<Utc>) -> Result<BatchRun> {
        let run_id = Uuid::new_v4();
        let span = info_span!("rank_batch", %run_id, candidates = candidates.len());
        self.run_batch_inner(run_id, candidates, now).instrument(span).await
    }

    async fn run_batch_inner(
        &self,
        run_id: Uuid,
        candidates: Vec<CandidatePost>,
        now: DateTime<Utc>,
    ) -> Result<BatchRun> {
        let started_at = Utc::now();

        // Read-modify-write of the index is one critical section per index file.
        let detection = {
            let _guard = self.locks.lock_path(self.index.path()).await;
            let existing = self.index.load().await;
            let existing_len = existing.len();
            let detection = detect_duplicates(candidates, existing);
            if detection.updated_index.len() > existing_len {
                self.index
                    .save(&detection.updated_index)
                    .await
                    .context("persisting fingerprint index")?;
            }
            detection
        };

        // Opted-out posts stay indexed so their crossposts are still caught.
        let opt_out = OptOut::load(&self.config.data_dir).await;
        let mut allowed = Vec::with_capacity(detection.accepted.len());
        let mut opted_out = Vec::new();
        for post in detection.accepted {
            match opt_out.reason(&post) {
                Some(reason) => {
                    info!(id = %post.id, %reason, "opted out");
                    opted_out.push(post.id);
                }
                None => allowed.push(post),
            }
        }

        let policy = self.config.metrics;
        let ranked = score_posts(allowed, now, &policy);

        let report = BatchReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            index_entries: detection.updated_index.len(),
            ranked,
            duplicates: detection.duplicates,
            opted_out,
        };
        let report_path = self
            .config
            .data_dir
            .join("reports")
            .join(run_id.to_string())
            .join("ranked.json");
        write_json_atomic(&report_path, &report)
            .await
            .with_context(|| format!("writing {}", report_path.display()))?;

        info!(
            ranked = report.ranked.len(),
            duplicates = report.duplicates.len(),
            opted_out = report.opted_out.len(),
            index_entries = report.index_entries,
            "batch ranked"
        );
        if report.ranked.is_empty() && !report.duplicates.is_empty() {
            warn!("every candidate in the batch was a duplicate");
        }

        Ok(BatchRun {
            report,
            report_path,
        })
    }
}

/// Scores and ranks posts without consulting or touching the index.
pub fn score_posts(
    posts: Vec<CandidatePost>,
    now: DateTime<Utc>,
    policy: &MetricsPolicy,
) -> Vec<RankedPost> {
    score_and_rank(posts.into_iter().map(|post| {
        let metrics = metrics_for_post(&post, now, policy);
        (post, metrics)
    }))
}

pub async fn load_candidates(path: &Path) -> Result<Vec<CandidatePost>> {
    read_json(path)
        .await
        .with_context(|| format!("loading candidates from {}", path.display()))
}

pub async fn run_batch_from_env(input: &Path, data_dir: Option<PathBuf>) -> Result<BatchRun> {
    let mut config = PipelineConfig::from_env();
    if let Some(data_dir) = data_dir {
        config = config.with_data_dir(data_dir);
    }
    let candidates = load_candidates(input).await?;
    RankPipeline::new(config).run_batch(candidates, Utc::now()).await
}
