use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::analytics::attribution::AttributionEngine;
use crate::analytics::quality;
use crate::api::{flatten_comments, DevtoClient};
use crate::config::Config;
use crate::db::{Store, SYNC_LOCK_NAME};
use crate::error::Result;
use crate::insights::sentiment::{CommentAnalyzer, LexiconModel};
use crate::insights::themes;
use crate::models::{
    ArticleStats, AttributionReport, FollowerEvent, NewArticleSnapshot, NewComment, NewDailyRollup,
    NewReferrer, SyncSummary,
};

/// How far back the upstream daily-analytics window reaches.
const ROLLUP_WINDOW_DAYS: i64 = 90;

/// Full-sync orchestrator: four fetch pipelines (article metrics, followers,
/// comments, daily analytics + referrers) followed by the derived phases
/// (sentiment, themes, stats cache). A failure in one pipeline never aborts
/// its siblings; everything that went wrong ends up in the summary.
pub struct SyncEngine {
    store: Store,
    client: DevtoClient,
    config: Config,
}

impl SyncEngine {
    pub fn new(store: Store, client: DevtoClient, config: Config) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    /// Runs a full sync under the single-flight lease. When another sync
    /// holds the lease this returns a skipped summary, which callers must
    /// treat as success.
    pub async fn run_full_sync(&self) -> Result<SyncSummary> {
        let holder = format!("{}-{}", std::process::id(), Utc::now().timestamp_millis());
        let ttl = Duration::minutes(self.config.lock_ttl_minutes);

        if !self
            .store
            .try_acquire_lock(SYNC_LOCK_NAME, &holder, ttl)
            .await?
        {
            tracing::info!("Another sync is already running, skipping");
            return Ok(SyncSummary::skipped());
        }

        let outcome = self.run_phases().await;

        // The lease is released even when a phase failed on a store error.
        if let Err(e) = self.store.release_lock(SYNC_LOCK_NAME, &holder).await {
            tracing::warn!("Failed to release sync lock: {}", e);
        }

        outcome
    }

    async fn run_phases(&self) -> Result<SyncSummary> {
        let mut summary = SyncSummary {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        // One collection instant for the whole run, so every snapshot
        // written by this invocation aligns for proximity matching.
        let collected_at = Utc::now();

        if let Err(e) = self.sync_articles(collected_at, &mut summary).await {
            summary.errors.push(format!("articles: {e}"));
        }
        if let Err(e) = self.sync_followers(collected_at, &mut summary).await {
            summary.errors.push(format!("followers: {e}"));
        }

        // Comments and daily analytics iterate whatever articles the store
        // knows about, so they still run when the article fetch failed.
        let articles = self.store.live_articles().await?;

        self.sync_comments(collected_at, &articles, &mut summary).await;
        self.sync_daily_analytics(collected_at, &articles, &mut summary)
            .await;

        self.run_derived_phases(&mut summary).await;

        summary.finished_at = Some(Utc::now());
        tracing::info!(
            "Sync finished: {} articles, {} new comments, {} errors",
            summary.articles_synced,
            summary.new_comments,
            summary.errors.len()
        );
        Ok(summary)
    }

    async fn sync_articles(
        &self,
        collected_at: DateTime<Utc>,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let fetched = self.client.fetch_articles().await?;
        let fetched_ids: HashSet<i64> = fetched.iter().map(|a| a.id).collect();

        for article in fetched {
            let snap = NewArticleSnapshot {
                article_id: article.id,
                collected_at,
                title: article.title,
                slug: article.slug,
                published_at: article.published_at,
                views: article.page_views_count.max(0),
                reactions: article.public_reactions_count.max(0),
                comments: article.comments_count.max(0),
                reading_time_minutes: article.reading_time_minutes,
                tags: article.tag_list,
            };
            match self.store.insert_article_snapshot(snap).await {
                Ok(true) => summary.articles_synced += 1,
                Ok(false) => {}
                Err(e) => summary.errors.push(format!("snapshot {}: {e}", article.id)),
            }
        }

        self.sweep_missing_articles(&fetched_ids).await?;
        Ok(())
    }

    /// Soft-flags articles that vanished upstream, never drops history.
    /// An empty fetch means an upstream anomaly, not a deleted catalog, so
    /// the sweep refuses to run on it.
    async fn sweep_missing_articles(&self, fetched_ids: &HashSet<i64>) -> Result<usize> {
        if fetched_ids.is_empty() {
            tracing::warn!("Upstream returned no articles; skipping deletion sweep");
            return Ok(0);
        }
        let mut flagged = 0;
        for (article_id, _) in self.store.live_articles().await? {
            if !fetched_ids.contains(&article_id) {
                self.store.mark_article_deleted(article_id).await?;
                tracing::debug!("Article {} gone upstream, marked deleted", article_id);
                flagged += 1;
            }
        }
        Ok(flagged)
    }

    async fn sync_followers(
        &self,
        collected_at: DateTime<Utc>,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let count = self.client.fetch_follower_count().await?;
        let last = self.store.latest_follower_event().await?;

        // Never backdate the series: a clock that went backwards relative
        // to the last event skips this run's data point.
        if let Some(last) = &last {
            if last.collected_at >= collected_at {
                tracing::warn!("Follower event not newer than last recorded, skipping");
                summary.follower_count = Some(count);
                return Ok(());
            }
        }

        let delta = last.map(|l| count - l.follower_count).unwrap_or(0);
        self.store
            .insert_follower_event(FollowerEvent {
                collected_at,
                follower_count: count,
                delta_since_last: delta,
            })
            .await?;
        summary.follower_count = Some(count);
        summary.follower_delta = Some(delta);
        Ok(())
    }

    async fn sync_comments(
        &self,
        collected_at: DateTime<Utc>,
        articles: &[(i64, String)],
        summary: &mut SyncSummary,
    ) {
        for (article_id, title) in articles {
            let comments = match self.client.fetch_comments(*article_id).await {
                Ok(comments) => comments,
                Err(e) => {
                    summary.errors.push(format!("comments {article_id}: {e}"));
                    continue;
                }
            };

            for comment in flatten_comments(comments) {
                let body_text = html2text::from_read(comment.body_html.as_bytes(), 80)
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                let new_comment = NewComment {
                    comment_id: comment.id_code,
                    article_id: *article_id,
                    article_title: Some(title.clone()),
                    author_username: comment.user.as_ref().and_then(|u| u.username.clone()),
                    author_name: comment.user.as_ref().and_then(|u| u.name.clone()),
                    body_html: comment.body_html,
                    body_text,
                    created_at: comment.created_at,
                    collected_at,
                };
                match self.store.insert_comment(new_comment).await {
                    Ok(true) => summary.new_comments += 1,
                    Ok(false) => {}
                    Err(e) => summary.errors.push(format!("comment {article_id}: {e}")),
                }
            }
        }
    }

    async fn sync_daily_analytics(
        &self,
        collected_at: DateTime<Utc>,
        articles: &[(i64, String)],
        summary: &mut SyncSummary,
    ) {
        let end = collected_at.date_naive();
        let start = end - Duration::days(ROLLUP_WINDOW_DAYS);

        for (article_id, _) in articles {
            match self
                .client
                .fetch_historical_analytics(*article_id, start, end)
                .await
            {
                Ok(days) => {
                    for (date, day) in days {
                        // Counters are best-effort upstream; negatives are
                        // clamped at the boundary so the scoring math never
                        // sees them.
                        let rollup = NewDailyRollup {
                            article_id: *article_id,
                            date,
                            page_views: day.page_views.total.max(0),
                            avg_read_time_seconds: day
                                .page_views
                                .average_read_time_in_seconds
                                .max(0),
                            total_read_time_seconds: day
                                .page_views
                                .total_read_time_in_seconds
                                .max(0),
                            reactions_total: day.reactions.total.max(0),
                            reactions_like: day.reactions.like.max(0),
                            reactions_unicorn: day.reactions.unicorn.max(0),
                            reactions_readinglist: day.reactions.readinglist.max(0),
                            comments_total: day.comments.total.max(0),
                            follows_total: day.follows.total.max(0),
                            collected_at,
                        };
                        match self.store.upsert_daily_rollup(rollup).await {
                            Ok(()) => summary.rollups_upserted += 1,
                            Err(e) => summary.errors.push(format!("rollup {article_id}: {e}")),
                        }
                    }
                }
                Err(e) => summary.errors.push(format!("analytics {article_id}: {e}")),
            }

            match self.client.fetch_referrers(*article_id).await {
                Ok(referrers) => {
                    for domain in referrers.domains {
                        let referrer = NewReferrer {
                            article_id: *article_id,
                            // Null upstream domain means direct traffic.
                            domain: domain.domain.unwrap_or_else(|| "direct".to_string()),
                            count: domain.count,
                            collected_at,
                        };
                        match self.store.insert_referrer(referrer).await {
                            Ok(true) => summary.referrers_recorded += 1,
                            Ok(false) => {}
                            Err(e) => summary.errors.push(format!("referrer {article_id}: {e}")),
                        }
                    }
                }
                Err(e) => summary.errors.push(format!("referrers {article_id}: {e}")),
            }
        }
    }

    /// Derived phases run after ingestion so they see this run's data.
    /// They read only the store, never the network.
    async fn run_derived_phases(&self, summary: &mut SyncSummary) {
        let analyzer = CommentAnalyzer::new(
            self.store.clone(),
            LexiconModel,
            self.config.insight_batch_size,
            self.config.author_username.clone(),
        );
        match analyzer.analyze_pending().await {
            Ok(n) => summary.comments_analyzed = n,
            Err(e) => summary.errors.push(format!("sentiment: {e}")),
        }

        match themes::classify_unclassified(&self.store).await {
            Ok(n) => summary.articles_classified = n,
            Err(e) => summary.errors.push(format!("themes: {e}")),
        }

        match self.rebuild_stats_cache().await {
            Ok(n) => summary.cache_entries = n,
            Err(e) => summary.errors.push(format!("stats cache: {e}")),
        }
    }

    /// Rebuilds the per-article projection: latest counters, quality and
    /// engagement from the rollup window, and 7d/30d attributed followers.
    pub async fn rebuild_stats_cache(&self) -> Result<usize> {
        let scored = quality::quality_scores(&self.store, 0, None).await?;
        let engine = AttributionEngine::new(
            self.store.clone(),
            Duration::minutes(self.config.proximity_tolerance_minutes),
        );
        let week = attribution_by_article(engine.attribute(Duration::hours(168)).await?);
        let month = attribution_by_article(engine.attribute(Duration::hours(720)).await?);

        let updated_at = Utc::now();
        let mut entries = 0;
        for (article_id, views, reactions, comments, latest_collected_at) in
            self.store.latest_article_metrics().await?
        {
            let score = scored.iter().find(|s| s.article_id == article_id);
            let stats = ArticleStats {
                article_id,
                latest_views: views,
                latest_reactions: reactions,
                latest_comments: comments,
                latest_collected_at,
                quality_score: score.map(|s| s.quality_score),
                engagement_rate: score.map(|s| s.engagement_percent),
                attributed_followers_7d: lookup(&week, article_id),
                attributed_followers_30d: lookup(&month, article_id),
                updated_at,
            };
            self.store.upsert_article_stats(stats).await?;
            entries += 1;
        }
        Ok(entries)
    }
}

fn attribution_by_article(report: AttributionReport) -> Vec<(i64, f64)> {
    match report {
        AttributionReport::Attributed { articles, .. } => articles
            .into_iter()
            .map(|a| (a.article_id, a.attributed_followers))
            .collect(),
        _ => Vec::new(),
    }
}

fn lookup(attributions: &[(i64, f64)], article_id: i64) -> Option<f64> {
    attributions
        .iter()
        .find(|(id, _)| *id == article_id)
        .map(|(_, v)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::*;

    fn test_config() -> Config {
        Config {
            devto_api_key: Some("test-key".to_string()),
            rate_limit_ms: 0,
            ..Default::default()
        }
    }

    fn engine(store: Store) -> SyncEngine {
        let config = test_config();
        let client = DevtoClient::new("test-key".to_string(), config.rate_limit_ms);
        SyncEngine::new(store, client, config)
    }

    #[tokio::test]
    async fn held_lease_turns_the_run_into_a_clean_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let engine = engine(store.clone());

        // Simulate a concurrent sync already holding the lease.
        assert!(store
            .try_acquire_lock(SYNC_LOCK_NAME, "other-process", Duration::minutes(30))
            .await
            .unwrap());

        let summary = engine.run_full_sync().await.unwrap();
        assert!(summary.skipped);
        assert_eq!(summary.articles_synced, 0);
        assert!(summary.errors.is_empty());

        // The skipped run must not have disturbed the holder's lease.
        assert!(!store
            .try_acquire_lock(SYNC_LOCK_NAME, "third", Duration::minutes(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn empty_fetch_never_mass_deletes_the_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let engine = engine(store.clone());

        store
            .insert_article_snapshot(snapshot(1, at(2026, 8, 1, 12, 0), 100))
            .await
            .unwrap();
        store
            .insert_article_snapshot(snapshot(2, at(2026, 8, 1, 12, 0), 200))
            .await
            .unwrap();

        // An upstream anomaly (200 OK, zero articles) must not touch history.
        let flagged = engine
            .sweep_missing_articles(&HashSet::new())
            .await
            .unwrap();
        assert_eq!(flagged, 0);
        assert_eq!(store.live_articles().await.unwrap().len(), 2);

        // A real partial catalog still flags the article that is gone.
        let flagged = engine
            .sweep_missing_articles(&HashSet::from([1]))
            .await
            .unwrap();
        assert_eq!(flagged, 1);
        let live = store.live_articles().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].0, 1);
    }

    #[tokio::test]
    async fn stats_cache_rebuild_covers_every_live_article() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let engine = engine(store.clone());

        let start = at(2026, 8, 1, 12, 0);
        let end = at(2026, 8, 8, 12, 0);
        store.insert_follower_event(follower(start, 100, 0)).await.unwrap();
        store.insert_follower_event(follower(end, 150, 50)).await.unwrap();
        store.insert_article_snapshot(snapshot(1, start, 1000)).await.unwrap();
        store.insert_article_snapshot(snapshot(1, end, 1300)).await.unwrap();
        store.insert_article_snapshot(snapshot(2, end, 50)).await.unwrap();
        store
            .upsert_daily_rollup(rollup(1, end.date_naive() - Duration::days(1), 120))
            .await
            .unwrap();

        let entries = engine.rebuild_stats_cache().await.unwrap();
        assert_eq!(entries, 2);

        let stats = store.article_stats(1).await.unwrap().unwrap();
        assert_eq!(stats.latest_views, 1300);
        // Rollup data exists for article 1, so it carries a quality score.
        assert!(stats.quality_score.is_some());

        // Article 2 has no rollup rows yet: cached, but unscored.
        let stats = store.article_stats(2).await.unwrap().unwrap();
        assert_eq!(stats.latest_views, 50);
        assert!(stats.quality_score.is_none());

        // Rebuild is a pure projection; running it again changes nothing
        // structural.
        assert_eq!(engine.rebuild_stats_cache().await.unwrap(), 2);
    }
}
