use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-article aggregates over the rollup window, as fed to the quality scorer.
/// Views/reactions/comments are windowed, not lifetime totals.
#[derive(Debug, Clone)]
pub struct QualityInputs {
    pub article_id: i64,
    pub title: String,
    pub reading_time_minutes: Option<i64>,
    pub avg_read_seconds: f64,
    pub views: i64,
    pub reactions: i64,
    pub comments: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredArticle {
    pub article_id: i64,
    pub title: String,
    pub views: i64,
    pub reactions: i64,
    pub comments: i64,
    pub completion_percent: f64,
    pub engagement_percent: f64,
    pub quality_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleAttribution {
    pub article_id: i64,
    pub title: String,
    pub views_gain: i64,
    pub traffic_share: f64,
    pub attributed_followers: f64,
}

/// Outcome of a Share-of-Voice attribution run. The non-attributed variants
/// are expected states, not failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttributionReport {
    /// No follower snapshot near one endpoint of the window, or both
    /// endpoints resolved to the same underlying snapshot.
    InsufficientData,
    /// Follower count was flat or declined over the window.
    ZeroGain { total_gain: i64 },
    /// Followers were gained but no article gained views in the window.
    NoTraffic { total_gain: i64 },
    Attributed {
        total_gain: i64,
        global_traffic_gain: i64,
        articles: Vec<ArticleAttribution>,
    },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub views: i64,
    pub reactions: i64,
    pub comments: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PeriodChange {
    pub views: f64,
    pub reactions: f64,
    pub comments: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    pub period_days: i64,
    pub current: PeriodTotals,
    pub previous: PeriodTotals,
    pub delta: PeriodTotals,
    pub delta_percent: PeriodChange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadTimeRow {
    pub article_id: i64,
    pub title: String,
    pub reading_time_minutes: Option<i64>,
    pub avg_read_seconds: i64,
    pub total_views: i64,
    pub total_hours: f64,
    pub completion_percent: f64,
    pub days_with_data: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionBreakdownRow {
    pub article_id: i64,
    pub title: String,
    pub lifetime_reactions: i64,
    pub likes: i64,
    pub unicorns: i64,
    pub readinglist: i64,
    pub breakdown_sum: i64,
    /// lifetime - windowed sum: positive means old reactions whose type is
    /// no longer visible, negative means reactions withdrawn upstream.
    pub gap: i64,
}

/// An older article still pulling steady traffic in the recent window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTailChampion {
    pub article_id: i64,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub age_days: i64,
    pub views_window: i64,
    pub days_window: i64,
}

/// Materialized per-article projection; always rebuildable from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleStats {
    pub article_id: i64,
    pub latest_views: i64,
    pub latest_reactions: i64,
    pub latest_comments: i64,
    pub latest_collected_at: DateTime<Utc>,
    pub quality_score: Option<f64>,
    pub engagement_rate: Option<f64>,
    pub attributed_followers_7d: Option<f64>,
    pub attributed_followers_30d: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Result of one orchestrator invocation. Partial failure is reported via
/// per-phase counts and collected errors, never masked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSummary {
    /// True when another sync held the lock and this invocation did nothing.
    pub skipped: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub articles_synced: usize,
    pub follower_count: Option<i64>,
    pub follower_delta: Option<i64>,
    pub new_comments: usize,
    pub rollups_upserted: usize,
    pub referrers_recorded: usize,
    pub comments_analyzed: usize,
    pub articles_classified: usize,
    pub cache_entries: usize,
    pub errors: Vec<String>,
}

impl SyncSummary {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}
