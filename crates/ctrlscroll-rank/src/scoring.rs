//! Five-signal relevance score used to order posts for publication.

use ctrlscroll_core::{CandidatePost, PostMetrics, RankedPost, ScoreRecord};

// Policy table. The weights form a convex combination.
pub const RECENCY_WEIGHT: f64 = 0.35;
pub const ENGAGEMENT_WEIGHT: f64 = 0.25;
pub const CONTROVERSY_WEIGHT: f64 = 0.20;
pub const POPULARITY_WEIGHT: f64 = 0.10;
pub const AUTHORITY_WEIGHT: f64 = 0.10;

/// Age in minutes at which recency has decayed to the sigmoid midpoint offset.
pub const RECENCY_TAU_MINUTES: f64 = 240.0;
pub const ENGAGEMENT_SCALE: f64 = 500.0;
pub const COMMENT_MULTIPLIER: f64 = 2.0;
pub const POPULARITY_SCALE: f64 = 5.0;
pub const AUTHORITY_SCALE: f64 = 60.0;

/// Logistic squash into (0, 1); `sigmoid(0) == 0.5`.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Bounds `x` to `[lo, hi]`. NaN maps to `lo`.
pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

fn squash(x: f64) -> f64 {
    sigmoid(if x.is_nan() { 0.0 } else { x })
}

/// Scores one post. Every component is in [0, 1], so the total is too.
pub fn score_candidate(id: &str, metrics: &PostMetrics) -> ScoreRecord {
    let recency = squash(-metrics.minutes_since_post / RECENCY_TAU_MINUTES);
    let engagement =
        squash((metrics.upvotes + metrics.comments * COMMENT_MULTIPLIER) / ENGAGEMENT_SCALE);
    let controversy = clamp(metrics.sentiment_stddev, 0.0, 1.0);
    let popularity = squash(metrics.entity_popularity / POPULARITY_SCALE);
    let authority = squash(metrics.external_authority / AUTHORITY_SCALE);

    let score = RECENCY_WEIGHT * recency
        + ENGAGEMENT_WEIGHT * engagement
        + CONTROVERSY_WEIGHT * controversy
        + POPULARITY_WEIGHT * popularity
        + AUTHORITY_WEIGHT * authority;

    ScoreRecord {
        id: id.to_string(),
        score: clamp(score, 0.0, 1.0),
        recency,
        engagement,
        controversy,
        popularity,
        authority,
    }
}

pub fn calculate_score(metrics: &PostMetrics) -> f64 {
    score_candidate("", metrics).score
}

/// Sorts by score, highest first. Equal scores keep their arrival order.
pub fn rank(mut posts: Vec<RankedPost>) -> Vec<RankedPost> {
    posts.sort_by(|a, b| b.rank.score.total_cmp(&a.rank.score));
    posts
}

pub fn score_and_rank(
    posts: impl IntoIterator<Item = (CandidatePost, PostMetrics)>,
) -> Vec<RankedPost> {
    rank(
        posts
            .into_iter()
            .map(|(post, metrics)| {
                let rank = score_candidate(&post.id, &metrics);
                RankedPost { post, rank }
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> PostMetrics {
        PostMetrics {
            minutes_since_post: 120.0,
            upvotes: 100.0,
            comments: 50.0,
            sentiment_stddev: 0.5,
            entity_popularity: 5.0,
            external_authority: 30.0,
        }
    }

    fn with(f: impl FnOnce(&mut PostMetrics)) -> PostMetrics {
        let mut m = metrics();
        f(&mut m);
        m
    }

    #[test]
    fn weights_sum_to_one() {
        let total = RECENCY_WEIGHT
            + ENGAGEMENT_WEIGHT
            + CONTROVERSY_WEIGHT
            + POPULARITY_WEIGHT
            + AUTHORITY_WEIGHT;
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sigmoid_midpoint_tails_and_monotonicity() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!((sigmoid(10.0) - 1.0).abs() < 1e-4);
        assert!(sigmoid(-10.0) < 1e-4);
        assert!(sigmoid(-100.0) >= 0.0 && sigmoid(100.0) <= 1.0);
        for pair in [-5.0, -4.0, -1.0, 0.0, 1.0, 4.0, 5.0].windows(2) {
            assert!(sigmoid(pair[0]) < sigmoid(pair[1]));
        }
    }

    #[test]
    fn clamp_edges() {
        assert_eq!(clamp(5.0, 0.0, 10.0), 5.0);
        assert_eq!(clamp(-1.0, 0.0, 10.0), 0.0);
        assert_eq!(clamp(15.0, 0.0, 10.0), 10.0);
        assert_eq!(clamp(0.0, 0.0, 10.0), 0.0);
        assert_eq!(clamp(10.0, 0.0, 10.0), 10.0);
        assert_eq!(clamp(5.0, 5.0, 5.0), 5.0);
        assert_eq!(clamp(-3.0, 5.0, 5.0), 5.0);
        assert_eq!(clamp(f64::NAN, 0.0, 1.0), 0.0);
    }

    #[test]
    fn score_is_bounded_for_typical_and_extreme_inputs() {
        let cases = [
            metrics(),
            with(|m| {
                m.minutes_since_post = 10_000.0;
                m.upvotes = 100_000.0;
                m.comments = 50_000.0;
                m.sentiment_stddev = 2.0;
                m.entity_popularity = 100.0;
                m.external_authority = 1000.0;
            }),
            with(|m| {
                m.minutes_since_post = -500.0;
                m.upvotes = -1e9;
                m.sentiment_stddev = -1.0;
            }),
            with(|m| {
                m.upvotes = f64::INFINITY;
                m.comments = f64::NEG_INFINITY;
                m.sentiment_stddev = f64::NAN;
                m.entity_popularity = f64::NAN;
            }),
        ];
        for m in cases {
            let record = score_candidate("p", &m);
            for value in [
                record.score,
                record.recency,
                record.engagement,
                record.controversy,
                record.popularity,
                record.authority,
            ] {
                assert!((0.0..=1.0).contains(&value), "{m:?} -> {record:?}");
            }
        }
    }

    #[test]
    fn each_signal_moves_the_score_in_its_direction() {
        let s = |m: PostMetrics| calculate_score(&m);
        assert!(s(with(|m| m.minutes_since_post = 30.0)) > s(with(|m| m.minutes_since_post = 480.0)));
        assert!(
            s(with(|m| {
                m.upvotes = 1000.0;
                m.comments = 200.0;
            })) > s(with(|m| {
                m.upvotes = 10.0;
                m.comments = 5.0;
            }))
        );
        assert!(s(with(|m| m.sentiment_stddev = 0.8)) > s(with(|m| m.sentiment_stddev = 0.1)));
        assert!(s(with(|m| m.entity_popularity = 10.0)) > s(with(|m| m.entity_popularity = 2.0)));
        assert!(s(with(|m| m.external_authority = 60.0)) > s(with(|m| m.external_authority = 0.0)));
    }

    #[test]
    fn strong_post_outranks_weak_post() {
        let strong = PostMetrics {
            minutes_since_post: 30.0,
            upvotes: 1000.0,
            comments: 200.0,
            sentiment_stddev: 0.8,
            entity_popularity: 10.0,
            external_authority: 60.0,
        };
        let weak = PostMetrics {
            minutes_since_post: 480.0,
            upvotes: 10.0,
            comments: 5.0,
            sentiment_stddev: 0.1,
            entity_popularity: 2.0,
            external_authority: 0.0,
        };
        assert!(calculate_score(&strong) > calculate_score(&weak));
    }

    #[test]
    fn components_are_reported_squashed() {
        let record = score_candidate(
            "zero",
            &PostMetrics {
                sentiment_stddev: 0.3,
                ..PostMetrics::default()
            },
        );
        assert_eq!(record.id, "zero");
        assert_eq!(record.recency, 0.5);
        assert_eq!(record.engagement, 0.5);
        assert_eq!(record.popularity, 0.5);
        assert_eq!(record.authority, 0.5);
        assert_eq!(record.controversy, 0.3);
        assert!((record.score - (0.8 * 0.5 + 0.2 * 0.3)).abs() < 1e-12);
    }

    #[test]
    fn ranking_is_descending_and_stable() {
        let fresh = with(|m| m.minutes_since_post = 0.0);
        let stale = with(|m| m.minutes_since_post = 5000.0);
        let post = |id: &str| CandidatePost {
            id: id.to_string(),
            ..Default::default()
        };
        let ranked = score_and_rank(vec![
            (post("tie-1"), stale),
            (post("top"), fresh),
            (post("tie-2"), stale),
        ]);
        let order: Vec<_> = ranked.iter().map(|r| r.post.id.as_str()).collect();
        assert_eq!(order, vec!["top", "tie-1", "tie-2"]);
        assert_eq!(ranked[0].rank.id, "top");
    }
}
