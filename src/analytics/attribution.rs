use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};

use crate::db::Store;
use crate::error::Result;
use crate::models::{ArticleAttribution, AttributionReport};

/// Max concurrent proximity lookups during the per-article pass.
const LOOKUP_CONCURRENCY: usize = 8;

/// Share-of-Voice follower attribution. There is no ground truth linking a
/// follow event to an article, so credit for the window's follower gain is
/// split across articles in proportion to each article's share of the
/// window's total view gain.
pub struct AttributionEngine {
    store: Store,
    tolerance: Duration,
}

impl AttributionEngine {
    pub fn new(store: Store, tolerance: Duration) -> Self {
        Self { store, tolerance }
    }

    /// Attribution over the trailing `window` ending now.
    pub async fn attribute(&self, window: Duration) -> Result<AttributionReport> {
        self.attribute_at(Utc::now(), window).await
    }

    /// The endpoints are resolved with the proximity matcher; a missing
    /// endpoint, or both endpoints resolving to the same underlying
    /// follower snapshot, yields InsufficientData rather than a zero.
    pub async fn attribute_at(
        &self,
        end_time: DateTime<Utc>,
        window: Duration,
    ) -> Result<AttributionReport> {
        let start_time = end_time - window;

        let start = self
            .store
            .closest_follower_event(start_time, self.tolerance)
            .await?;
        let end = self
            .store
            .closest_follower_event(end_time, self.tolerance)
            .await?;

        let (start, end) = match (start, end) {
            (Some(s), Some(e)) if s.collected_at != e.collected_at => (s, e),
            _ => return Ok(AttributionReport::InsufficientData),
        };

        let total_gain = end.follower_count - start.follower_count;
        if total_gain <= 0 {
            return Ok(AttributionReport::ZeroGain { total_gain });
        }

        // Each lookup pair only reads the store; safe to run in parallel.
        let articles = self.store.live_articles().await?;
        let lookups: Vec<Result<Option<(i64, String, i64)>>> = stream::iter(articles)
            .map(|(article_id, title)| {
                let store = self.store.clone();
                let tolerance = self.tolerance;
                async move {
                    let at_start = store
                        .closest_article_snapshot(article_id, start_time, tolerance)
                        .await?;
                    let at_end = store
                        .closest_article_snapshot(article_id, end_time, tolerance)
                        .await?;
                    Ok(match (at_start, at_end) {
                        (Some(s), Some(e)) => {
                            // Upstream view-count corrections can go backwards;
                            // clamped to zero and excluded from the denominator.
                            let gain = (e.views - s.views).max(0);
                            Some((article_id, title, gain))
                        }
                        _ => None,
                    })
                }
            })
            .buffer_unordered(LOOKUP_CONCURRENCY)
            .collect()
            .await;

        let mut gains: Vec<(i64, String, i64)> = Vec::new();
        for lookup in lookups {
            if let Some((article_id, title, gain)) = lookup? {
                if gain > 0 {
                    gains.push((article_id, title, gain));
                }
            }
        }

        let global_traffic_gain: i64 = gains.iter().map(|(_, _, g)| g).sum();
        if global_traffic_gain == 0 {
            return Ok(AttributionReport::NoTraffic { total_gain });
        }

        let mut articles: Vec<ArticleAttribution> = gains
            .into_iter()
            .map(|(article_id, title, views_gain)| {
                let traffic_share = views_gain as f64 / global_traffic_gain as f64;
                ArticleAttribution {
                    article_id,
                    title,
                    views_gain,
                    traffic_share,
                    attributed_followers: traffic_share * total_gain as f64,
                }
            })
            .collect();

        articles.sort_by(|a, b| {
            b.attributed_followers
                .partial_cmp(&a.attributed_followers)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.article_id.cmp(&b.article_id))
        });

        Ok(AttributionReport::Attributed {
            total_gain,
            global_traffic_gain,
            articles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::*;

    async fn engine(dir: &tempfile::TempDir) -> (Store, AttributionEngine) {
        let store = open_store(dir).await;
        let engine = AttributionEngine::new(store.clone(), Duration::hours(6));
        (store, engine)
    }

    /// Follower counts 100 -> 150 and view gains 300/100 across a week.
    async fn seed_worked_example(store: &Store, scale: i64) {
        let start = at(2026, 8, 1, 12, 0);
        let end = at(2026, 8, 8, 12, 0);
        store.insert_follower_event(follower(start, 100, 0)).await.unwrap();
        store.insert_follower_event(follower(end, 150, 50)).await.unwrap();

        store
            .insert_article_snapshot(snapshot(1, start, 1000))
            .await
            .unwrap();
        store
            .insert_article_snapshot(snapshot(1, end, 1000 + 300 * scale))
            .await
            .unwrap();
        store
            .insert_article_snapshot(snapshot(2, start, 500))
            .await
            .unwrap();
        store
            .insert_article_snapshot(snapshot(2, end, 500 + 100 * scale))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn splits_gain_by_share_of_voice() {
        let dir = tempfile::tempdir().unwrap();
        let (store, engine) = engine(&dir).await;
        seed_worked_example(&store, 1).await;

        let report = engine
            .attribute_at(at(2026, 8, 8, 12, 0), Duration::hours(168))
            .await
            .unwrap();

        let AttributionReport::Attributed {
            total_gain,
            global_traffic_gain,
            articles,
        } = report
        else {
            panic!("expected attributed report");
        };
        assert_eq!(total_gain, 50);
        assert_eq!(global_traffic_gain, 400);
        assert_eq!(articles.len(), 2);
        // 300/400 and 100/400 of a 50-follower gain.
        assert_eq!(articles[0].article_id, 1);
        assert!((articles[0].attributed_followers - 37.5).abs() < 1e-9);
        assert_eq!(articles[1].article_id, 2);
        assert!((articles[1].attributed_followers - 12.5).abs() < 1e-9);

        // Conservation: credit sums to the total gain.
        let sum: f64 = articles.iter().map(|a| a.attributed_followers).sum();
        assert!((sum - total_gain as f64).abs() < 1e-9);
    }

    #[tokio::test]
    async fn shares_are_scale_invariant() {
        let dir_a = tempfile::tempdir().unwrap();
        let (store_a, engine_a) = engine(&dir_a).await;
        seed_worked_example(&store_a, 1).await;

        let dir_b = tempfile::tempdir().unwrap();
        let (store_b, engine_b) = engine(&dir_b).await;
        seed_worked_example(&store_b, 2).await;

        let end = at(2026, 8, 8, 12, 0);
        let window = Duration::hours(168);
        let a = engine_a.attribute_at(end, window).await.unwrap();
        let b = engine_b.attribute_at(end, window).await.unwrap();

        let (AttributionReport::Attributed { articles: a, .. }, AttributionReport::Attributed { articles: b, .. }) =
            (a, b)
        else {
            panic!("expected attributed reports");
        };
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.article_id, y.article_id);
            assert!((x.traffic_share - y.traffic_share).abs() < 1e-9);
            assert!((x.attributed_followers - y.attributed_followers).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn missing_follower_endpoint_is_insufficient_data() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, engine) = engine(&dir).await;

        let report = engine
            .attribute_at(at(2026, 8, 8, 12, 0), Duration::hours(168))
            .await
            .unwrap();
        assert!(matches!(report, AttributionReport::InsufficientData));
    }

    #[tokio::test]
    async fn same_snapshot_at_both_endpoints_is_insufficient_data() {
        let dir = tempfile::tempdir().unwrap();
        let (store, engine) = engine(&dir).await;

        // One event, and a window so narrow both endpoints resolve to it.
        store
            .insert_follower_event(follower(at(2026, 8, 8, 11, 30), 120, 0))
            .await
            .unwrap();
        let report = engine
            .attribute_at(at(2026, 8, 8, 12, 0), Duration::hours(1))
            .await
            .unwrap();
        assert!(matches!(report, AttributionReport::InsufficientData));
    }

    #[tokio::test]
    async fn flat_or_declining_followers_is_zero_gain_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let (store, engine) = engine(&dir).await;

        store
            .insert_follower_event(follower(at(2026, 8, 1, 12, 0), 150, 0))
            .await
            .unwrap();
        store
            .insert_follower_event(follower(at(2026, 8, 8, 12, 0), 140, -10))
            .await
            .unwrap();
        let report = engine
            .attribute_at(at(2026, 8, 8, 12, 0), Duration::hours(168))
            .await
            .unwrap();
        assert!(matches!(report, AttributionReport::ZeroGain { total_gain: -10 }));
    }

    #[tokio::test]
    async fn gain_without_traffic_reports_no_traffic() {
        let dir = tempfile::tempdir().unwrap();
        let (store, engine) = engine(&dir).await;

        let start = at(2026, 8, 1, 12, 0);
        let end = at(2026, 8, 8, 12, 0);
        store.insert_follower_event(follower(start, 100, 0)).await.unwrap();
        store.insert_follower_event(follower(end, 150, 50)).await.unwrap();
        // Views went backwards (upstream correction): clamped out entirely.
        store.insert_article_snapshot(snapshot(1, start, 1000)).await.unwrap();
        store.insert_article_snapshot(snapshot(1, end, 900)).await.unwrap();

        let report = engine.attribute_at(end, Duration::hours(168)).await.unwrap();
        assert!(matches!(report, AttributionReport::NoTraffic { total_gain: 50 }));
    }

    #[tokio::test]
    async fn negative_gains_never_receive_credit() {
        let dir = tempfile::tempdir().unwrap();
        let (store, engine) = engine(&dir).await;
        seed_worked_example(&store, 1).await;

        let start = at(2026, 8, 1, 12, 0);
        let end = at(2026, 8, 8, 12, 0);
        store.insert_article_snapshot(snapshot(3, start, 800)).await.unwrap();
        store.insert_article_snapshot(snapshot(3, end, 700)).await.unwrap();

        let report = engine.attribute_at(end, Duration::hours(168)).await.unwrap();
        let AttributionReport::Attributed { articles, .. } = report else {
            panic!("expected attributed report");
        };
        assert!(articles.iter().all(|a| a.article_id != 3));
        assert!(articles
            .iter()
            .all(|a| a.attributed_followers >= 0.0 && a.attributed_followers <= 50.0));
    }
}
