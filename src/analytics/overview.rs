use chrono::{Duration, NaiveDate, Utc};

use crate::db::Store;
use crate::error::Result;
use crate::models::{Overview, PeriodChange, PeriodTotals};

/// Rollup totals for the trailing `period_days`, compared against the
/// period immediately before it.
pub async fn overview(store: &Store, period_days: i64) -> Result<Overview> {
    overview_at(store, Utc::now().date_naive(), period_days).await
}

pub async fn overview_at(store: &Store, today: NaiveDate, period_days: i64) -> Result<Overview> {
    let period = Duration::days(period_days.max(1));
    let current_start = today - period;
    let previous_start = current_start - period;

    let current = store.period_totals(current_start, today).await?;
    let previous = store.period_totals(previous_start, current_start).await?;

    Ok(Overview {
        period_days: period.num_days(),
        current,
        previous,
        delta: PeriodTotals {
            views: current.views - previous.views,
            reactions: current.reactions - previous.reactions,
            comments: current.comments - previous.comments,
        },
        delta_percent: PeriodChange {
            views: percent_change(current.views, previous.views),
            reactions: percent_change(current.reactions, previous.reactions),
            comments: percent_change(current.comments, previous.comments),
        },
    })
}

/// Change vs the previous period; an empty previous period reads as 0%
/// rather than infinity.
fn percent_change(current: i64, previous: i64) -> f64 {
    if previous <= 0 {
        return 0.0;
    }
    (current - previous) as f64 / previous as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::*;

    #[tokio::test]
    async fn compares_adjacent_periods() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let today = NaiveDate::from_ymd_opt(2026, 8, 15).unwrap();

        // Current week: days 8..15; previous week: days 1..8.
        store
            .upsert_daily_rollup(rollup(1, NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(), 200))
            .await
            .unwrap();
        store
            .upsert_daily_rollup(rollup(1, NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(), 100))
            .await
            .unwrap();

        let overview = overview_at(&store, today, 7).await.unwrap();
        assert_eq!(overview.current.views, 200);
        assert_eq!(overview.previous.views, 100);
        assert_eq!(overview.delta.views, 100);
        assert!((overview.delta_percent.views - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn boundary_day_belongs_to_the_current_period() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let today = NaiveDate::from_ymd_opt(2026, 8, 15).unwrap();

        // Exactly 7 days back: first day of the current window.
        store
            .upsert_daily_rollup(rollup(1, NaiveDate::from_ymd_opt(2026, 8, 8).unwrap(), 50))
            .await
            .unwrap();
        // Today itself is still in flight and excluded.
        store
            .upsert_daily_rollup(rollup(1, today, 999))
            .await
            .unwrap();

        let overview = overview_at(&store, today, 7).await.unwrap();
        assert_eq!(overview.current.views, 50);
        assert_eq!(overview.previous.views, 0);
    }

    #[tokio::test]
    async fn empty_store_yields_zeroes_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let overview = overview(&store, 30).await.unwrap();
        assert_eq!(overview.current.views, 0);
        assert_eq!(overview.delta.views, 0);
        assert_eq!(overview.delta_percent.views, 0.0);
    }
}
