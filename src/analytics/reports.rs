use chrono::{DateTime, Duration, Utc};

use crate::db::Store;
use crate::error::Result;
use crate::models::{LongTailChampion, ReactionBreakdownRow, ReadTimeRow};

/// Read-depth report over the rollup window, deepest average read first.
pub async fn read_time_analysis(
    store: &Store,
    min_views: i64,
    limit: i64,
) -> Result<Vec<ReadTimeRow>> {
    let mut rows = store.read_time_rows(min_views, limit).await?;
    for row in &mut rows {
        row.total_hours = round1(row.total_hours);
        row.completion_percent = round1(row.completion_percent);
    }
    Ok(rows)
}

/// Reaction-type breakdown. Lifetime totals come from snapshots; the
/// per-type split only exists inside the rollup window, so the gap column
/// shows how much of an article's lifetime reacting predates the window.
pub async fn reaction_breakdown(
    store: &Store,
    min_reactions: i64,
    limit: i64,
) -> Result<Vec<ReactionBreakdownRow>> {
    store.reaction_breakdown_rows(min_reactions, limit).await
}

/// Articles published more than `days_old` days ago that still cleared
/// `min_views` over the last `days_window` days, most-viewed first.
pub async fn long_tail_champions(
    store: &Store,
    days_old: i64,
    days_window: i64,
    min_views: i64,
    limit: i64,
) -> Result<Vec<LongTailChampion>> {
    long_tail_champions_at(store, Utc::now(), days_old, days_window, min_views, limit).await
}

pub async fn long_tail_champions_at(
    store: &Store,
    now: DateTime<Utc>,
    days_old: i64,
    days_window: i64,
    min_views: i64,
    limit: i64,
) -> Result<Vec<LongTailChampion>> {
    let window_cutoff = (now - Duration::days(days_window)).date_naive();
    let published_before = now - Duration::days(days_old);
    let rows = store
        .long_tail_rows(window_cutoff, published_before, min_views, limit)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(article_id, title, published_at, views_window)| LongTailChampion {
            article_id,
            title,
            published_at,
            age_days: (now - published_at).num_days(),
            views_window,
            days_window,
        })
        .collect())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
