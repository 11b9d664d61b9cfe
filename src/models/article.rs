use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One point-in-time measurement of an article's public counters.
/// Rows are append-only: at most one per (article_id, collected_at),
/// and only `is_deleted` may change after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleSnapshot {
    pub id: i64,
    pub article_id: i64,
    pub collected_at: DateTime<Utc>,
    pub title: String,
    pub slug: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub views: i64,
    pub reactions: i64,
    pub comments: i64,
    pub reading_time_minutes: Option<i64>,
    pub tags: Vec<String>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticleSnapshot {
    pub article_id: i64,
    pub collected_at: DateTime<Utc>,
    pub title: String,
    pub slug: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub views: i64,
    pub reactions: i64,
    pub comments: i64,
    pub reading_time_minutes: Option<i64>,
    pub tags: Vec<String>,
}

/// Daily per-article breakdown from the upstream analytics endpoint.
/// The source window is rolling (~90 days), so rows for a given
/// (article_id, date) are replaced as later, more complete fetches arrive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDailyRollup {
    pub article_id: i64,
    pub date: NaiveDate,
    pub page_views: i64,
    pub avg_read_time_seconds: i64,
    pub total_read_time_seconds: i64,
    pub reactions_total: i64,
    pub reactions_like: i64,
    pub reactions_unicorn: i64,
    pub reactions_readinglist: i64,
    pub comments_total: i64,
    pub follows_total: i64,
    pub collected_at: DateTime<Utc>,
}

/// Account-level follower count at a collection instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerEvent {
    pub collected_at: DateTime<Utc>,
    pub follower_count: i64,
    pub delta_since_last: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReferrer {
    pub article_id: i64,
    pub domain: String,
    pub count: i64,
    pub collected_at: DateTime<Utc>,
}
