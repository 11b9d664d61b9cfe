use crate::db::Store;
use crate::error::Result;
use crate::models::{QualityInputs, ScoredArticle};

/// Nominal length assumed when an article reports no reading time.
const DEFAULT_READING_TIME_MINUTES: i64 = 5;
const ENGAGEMENT_CAP: f64 = 20.0;
const COMPLETION_WEIGHT: f64 = 0.7;
const ENGAGEMENT_WEIGHT: f64 = 1.5;

/// Share of the article's nominal length the average reader got through,
/// capped at 100. Upstream data is best-effort, so a negative observed
/// read time clamps to zero instead of poisoning the score.
pub fn completion_percent(reading_time_minutes: Option<i64>, avg_read_seconds: f64) -> f64 {
    let minutes = match reading_time_minutes {
        Some(m) if m > 0 => m,
        _ => DEFAULT_READING_TIME_MINUTES,
    };
    let length_seconds = (minutes * 60) as f64;
    (avg_read_seconds.max(0.0) / length_seconds * 100.0).min(100.0)
}

/// Reactions plus comments per hundred views. The max(views, 1) floor keeps
/// zero-view articles at zero instead of dividing by zero; negative counters
/// clamp to zero.
pub fn engagement_percent(reactions: i64, comments: i64, views: i64) -> f64 {
    (reactions.max(0) + comments.max(0)) as f64 / views.max(1) as f64 * 100.0
}

/// 0-100 composite. Engagement is capped before weighting so a handful of
/// reactions on a tiny article cannot dominate completion.
pub fn quality_score(completion: f64, engagement: f64) -> f64 {
    completion * COMPLETION_WEIGHT + engagement.min(ENGAGEMENT_CAP) * ENGAGEMENT_WEIGHT
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn score_article(inputs: &QualityInputs) -> ScoredArticle {
    let completion = completion_percent(inputs.reading_time_minutes, inputs.avg_read_seconds);
    let engagement = engagement_percent(inputs.reactions, inputs.comments, inputs.views);
    let score = quality_score(completion, engagement);
    ScoredArticle {
        article_id: inputs.article_id,
        title: inputs.title.clone(),
        views: inputs.views,
        reactions: inputs.reactions,
        comments: inputs.comments,
        completion_percent: round1(completion),
        engagement_percent: round1(engagement),
        quality_score: round1(score),
    }
}

/// Scores every article clearing `min_views` over the rollup window,
/// best first, keeping at most `limit` rows. Safe on an empty store.
pub async fn quality_scores(
    store: &Store,
    min_views: i64,
    limit: Option<usize>,
) -> Result<Vec<ScoredArticle>> {
    let mut scored: Vec<ScoredArticle> = store
        .quality_inputs(min_views)
        .await?
        .iter()
        .map(score_article)
        .collect();
    scored.sort_by(|a, b| {
        b.quality_score
            .partial_cmp(&a.quality_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.article_id.cmp(&b.article_id))
    });
    if let Some(limit) = limit {
        scored.truncate(limit);
    }
    Ok(scored)
}
