use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    ArticleSnapshot, ArticleStats, CommentInsight, FollowerEvent, NewArticleSnapshot, NewComment,
    NewDailyRollup, NewReferrer, PendingComment, QualityInputs, ReactionBreakdownRow, ReadTimeRow,
    Theme, ThemeMatch, UnansweredQuestion,
};

use super::schema::SCHEMA;

/// All SQL lives here. Each table has exactly one write mode: append-only
/// tables use INSERT OR IGNORE on their natural key, the two replace-on-sync
/// tables (daily_rollups, article_stats_cache) use upserts. The mode is
/// chosen per method, never inferred from the data.
#[derive(Clone)]
pub struct Store {
    pub(super) conn: Connection,
}

impl Store {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Article snapshots (append-only)

    /// Returns true when a new row was recorded, false when a snapshot for
    /// this (article_id, collected_at) already existed.
    pub async fn insert_article_snapshot(&self, snap: NewArticleSnapshot) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let tags_json = serde_json::to_string(&snap.tags).unwrap_or_default();
                let changed = conn.execute(
                    r#"INSERT OR IGNORE INTO article_snapshots
                       (collected_at, article_id, title, slug, published_at, views, reactions,
                        comments, reading_time_minutes, tags, is_deleted)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)"#,
                    params![
                        snap.collected_at.to_rfc3339(),
                        snap.article_id,
                        snap.title,
                        snap.slug,
                        snap.published_at.map(|dt| dt.to_rfc3339()),
                        snap.views,
                        snap.reactions,
                        snap.comments,
                        snap.reading_time_minutes,
                        tags_json,
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    /// The one permitted mutation on snapshot history.
    pub async fn mark_article_deleted(&self, article_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE article_snapshots SET is_deleted = 1 WHERE article_id = ?1",
                    params![article_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Distinct live articles with the title from their freshest snapshot.
    pub async fn live_articles(&self) -> Result<Vec<(i64, String)>> {
        let articles = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT article_id, title, MAX(collected_at)
                       FROM article_snapshots
                       WHERE is_deleted = 0
                       GROUP BY article_id
                       ORDER BY article_id"#,
                )?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(articles)
    }

    // Proximity matcher

    /// Snapshot of `article_id` nearest `target` within ±tolerance, or None
    /// when the window is empty. Ties resolve to the earliest row, so
    /// repeated calls against unchanged data always agree.
    pub async fn closest_article_snapshot(
        &self,
        article_id: i64,
        target: DateTime<Utc>,
        tolerance: Duration,
    ) -> Result<Option<ArticleSnapshot>> {
        let lo = (target - tolerance).to_rfc3339();
        let hi = (target + tolerance).to_rfc3339();
        let target_epoch = target.timestamp();
        let snap = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, collected_at, article_id, title, slug, published_at, views,
                              reactions, comments, reading_time_minutes, tags, is_deleted
                       FROM article_snapshots
                       WHERE article_id = ?1 AND collected_at BETWEEN ?2 AND ?3
                       ORDER BY ABS(strftime('%s', collected_at) - ?4) ASC, collected_at ASC
                       LIMIT 1"#,
                )?;
                let snap = stmt
                    .query_row(params![article_id, lo, hi, target_epoch], |row| {
                        Ok(snapshot_from_row(row))
                    })
                    .optional()?;
                Ok(snap)
            })
            .await?;
        Ok(snap)
    }

    /// Follower event nearest `target` within ±tolerance.
    pub async fn closest_follower_event(
        &self,
        target: DateTime<Utc>,
        tolerance: Duration,
    ) -> Result<Option<FollowerEvent>> {
        let lo = (target - tolerance).to_rfc3339();
        let hi = (target + tolerance).to_rfc3339();
        let target_epoch = target.timestamp();
        let event = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT collected_at, follower_count, delta_since_last
                       FROM follower_events
                       WHERE collected_at BETWEEN ?1 AND ?2
                       ORDER BY ABS(strftime('%s', collected_at) - ?3) ASC, collected_at ASC
                       LIMIT 1"#,
                )?;
                let event = stmt
                    .query_row(params![lo, hi, target_epoch], |row| {
                        Ok(follower_event_from_row(row))
                    })
                    .optional()?;
                Ok(event)
            })
            .await?;
        Ok(event)
    }

    // Follower events (append-only)

    pub async fn latest_follower_event(&self) -> Result<Option<FollowerEvent>> {
        let event = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT collected_at, follower_count, delta_since_last
                       FROM follower_events
                       ORDER BY collected_at DESC
                       LIMIT 1"#,
                )?;
                let event = stmt
                    .query_row([], |row| Ok(follower_event_from_row(row)))
                    .optional()?;
                Ok(event)
            })
            .await?;
        Ok(event)
    }

    pub async fn insert_follower_event(&self, event: FollowerEvent) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT OR IGNORE INTO follower_events
                       (collected_at, follower_count, delta_since_last)
                       VALUES (?1, ?2, ?3)"#,
                    params![
                        event.collected_at.to_rfc3339(),
                        event.follower_count,
                        event.delta_since_last,
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    // Daily rollups (replace-on-sync)

    /// A later fetch for the same (article_id, date) is strictly more
    /// complete than an earlier one, so this overwrites.
    pub async fn upsert_daily_rollup(&self, rollup: NewDailyRollup) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO daily_rollups
                       (article_id, date, page_views, avg_read_time_seconds,
                        total_read_time_seconds, reactions_total, reactions_like,
                        reactions_unicorn, reactions_readinglist, comments_total,
                        follows_total, collected_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                       ON CONFLICT(article_id, date) DO UPDATE SET
                           page_views = excluded.page_views,
                           avg_read_time_seconds = excluded.avg_read_time_seconds,
                           total_read_time_seconds = excluded.total_read_time_seconds,
                           reactions_total = excluded.reactions_total,
                           reactions_like = excluded.reactions_like,
                           reactions_unicorn = excluded.reactions_unicorn,
                           reactions_readinglist = excluded.reactions_readinglist,
                           comments_total = excluded.comments_total,
                           follows_total = excluded.follows_total,
                           collected_at = excluded.collected_at"#,
                    params![
                        rollup.article_id,
                        rollup.date.to_string(),
                        rollup.page_views,
                        rollup.avg_read_time_seconds,
                        rollup.total_read_time_seconds,
                        rollup.reactions_total,
                        rollup.reactions_like,
                        rollup.reactions_unicorn,
                        rollup.reactions_readinglist,
                        rollup.comments_total,
                        rollup.follows_total,
                        rollup.collected_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Referrers (append-only time series)

    pub async fn insert_referrer(&self, referrer: NewReferrer) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT OR IGNORE INTO referrers (article_id, domain, count, collected_at)
                       VALUES (?1, ?2, ?3, ?4)"#,
                    params![
                        referrer.article_id,
                        referrer.domain,
                        referrer.count,
                        referrer.collected_at.to_rfc3339(),
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    // Comments (append-only)

    pub async fn insert_comment(&self, comment: NewComment) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT OR IGNORE INTO comments
                       (comment_id, article_id, article_title, author_username, author_name,
                        body_html, body_text, body_length, created_at, collected_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                    params![
                        comment.comment_id,
                        comment.article_id,
                        comment.article_title,
                        comment.author_username,
                        comment.author_name,
                        comment.body_html,
                        comment.body_text,
                        comment.body_html.len() as i64,
                        comment.created_at.map(|dt| dt.to_rfc3339()),
                        comment.collected_at.to_rfc3339(),
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    // Incremental work queues (anti-joins; pending membership is recomputed
    // from current store state on every call, so batches are re-invocable)

    /// Comments with no insight row yet, oldest first. The author's own
    /// comments are excluded when `exclude_author` is set.
    pub async fn pending_comment_insights(
        &self,
        exclude_author: Option<String>,
        limit: Option<usize>,
    ) -> Result<Vec<PendingComment>> {
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let pending = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT c.comment_id, c.article_title, c.body_text
                       FROM comments c
                       LEFT JOIN comment_insights i ON c.comment_id = i.comment_id
                       WHERE i.comment_id IS NULL
                         AND (?1 IS NULL OR c.author_username IS NULL OR c.author_username != ?1)
                       ORDER BY c.created_at ASC, c.comment_id ASC
                       LIMIT ?2"#,
                )?;
                let pending = stmt
                    .query_map(params![exclude_author, limit], |row| {
                        Ok(PendingComment {
                            comment_id: row.get(0)?,
                            article_title: row.get(1)?,
                            body_text: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(pending)
            })
            .await?;
        Ok(pending)
    }

    /// Writes an insight. With `replace = false` an existing row wins
    /// (compute-at-most-once); `replace = true` is explicit re-analysis.
    pub async fn insert_comment_insight(
        &self,
        insight: CommentInsight,
        replace: bool,
    ) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let entities = serde_json::to_string(&insight.named_entities).unwrap_or_default();
                let sql = if replace {
                    r#"INSERT OR REPLACE INTO comment_insights
                       (comment_id, sentiment_score, mood, is_spam, named_entities, analyzed_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#
                } else {
                    r#"INSERT OR IGNORE INTO comment_insights
                       (comment_id, sentiment_score, mood, is_spam, named_entities, analyzed_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#
                };
                let changed = conn.execute(
                    sql,
                    params![
                        insight.comment_id,
                        insight.sentiment_score,
                        insight.mood.as_str(),
                        insight.is_spam,
                        entities,
                        insight.analyzed_at.to_rfc3339(),
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    /// Reader questions with no later reply from the author on the same
    /// article, newest first. Questions already flagged as spam are
    /// suppressed.
    pub async fn unanswered_questions(&self, author: String) -> Result<Vec<UnansweredQuestion>> {
        let questions = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT q.comment_id, q.article_title, q.author_username, q.body_text,
                              q.created_at
                       FROM comments q
                       WHERE q.body_text LIKE '%?%'
                         AND (q.author_username IS NULL OR q.author_username != ?1)
                         AND NOT EXISTS (
                             SELECT 1 FROM comments a
                             WHERE a.article_id = q.article_id
                               AND a.author_username = ?1
                               AND a.created_at > q.created_at)
                         AND NOT EXISTS (
                             SELECT 1 FROM comment_insights i
                             WHERE i.comment_id = q.comment_id AND i.is_spam = 1)
                       ORDER BY q.created_at DESC"#,
                )?;
                let questions = stmt
                    .query_map(params![author], |row| {
                        Ok(UnansweredQuestion {
                            comment_id: row.get(0)?,
                            article_title: row.get(1)?,
                            author_username: row.get(2)?,
                            body_text: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                            created_at: row
                                .get::<_, Option<String>>(4)?
                                .and_then(|s| parse_datetime(&s)),
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(questions)
            })
            .await?;
        Ok(questions)
    }

    // Themes

    pub async fn themes(&self) -> Result<Vec<Theme>> {
        let themes = self
            .conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT id, name, keywords, description FROM themes ORDER BY id")?;
                let themes = stmt
                    .query_map([], |row| Ok(theme_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(themes)
            })
            .await?;
        Ok(themes)
    }

    /// Live articles with no theme mapping yet, with the tags from their
    /// freshest snapshot.
    pub async fn unclassified_articles(&self) -> Result<Vec<(i64, String, Vec<String>)>> {
        let articles = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT s.article_id, s.title, s.tags, MAX(s.collected_at)
                       FROM article_snapshots s
                       LEFT JOIN article_theme_mapping m ON s.article_id = m.article_id
                       WHERE m.article_id IS NULL AND s.is_deleted = 0
                       GROUP BY s.article_id
                       ORDER BY s.article_id"#,
                )?;
                let articles = stmt
                    .query_map([], |row| {
                        Ok((row.get(0)?, row.get(1)?, parse_tags(row.get(2)?)))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Records the winning theme for an article, dropping any mapping to a
    /// different theme from earlier runs (one active theme per article).
    pub async fn upsert_theme_mapping(&self, m: ThemeMatch) -> Result<()> {
        self.conn
            .call(move |conn| {
                let keywords = serde_json::to_string(&m.matched_keywords).unwrap_or_default();
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM article_theme_mapping WHERE article_id = ?1 AND theme_id != ?2",
                    params![m.article_id, m.theme_id],
                )?;
                tx.execute(
                    r#"INSERT INTO article_theme_mapping
                       (article_id, theme_id, confidence, matched_keywords, classified_at)
                       VALUES (?1, ?2, ?3, ?4, ?5)
                       ON CONFLICT(article_id, theme_id) DO UPDATE SET
                           confidence = excluded.confidence,
                           matched_keywords = excluded.matched_keywords,
                           classified_at = excluded.classified_at"#,
                    params![
                        m.article_id,
                        m.theme_id,
                        m.confidence,
                        keywords,
                        m.classified_at.to_rfc3339(),
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Aggregations over the rollup window

    /// Per-article quality inputs: windowed views/reactions/comments plus the
    /// average observed read time, joined to the freshest snapshot for the
    /// title and nominal length. Windowed basis throughout, by design.
    pub async fn quality_inputs(&self, min_views: i64) -> Result<Vec<QualityInputs>> {
        let inputs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT r.article_id, a.title, a.reading_time_minutes,
                              AVG(r.avg_read_time_seconds) AS avg_read,
                              SUM(r.page_views) AS views,
                              SUM(r.reactions_total) AS reactions,
                              SUM(r.comments_total) AS comments
                       FROM daily_rollups r
                       JOIN (SELECT article_id, title, reading_time_minutes, MAX(collected_at)
                             FROM article_snapshots
                             WHERE is_deleted = 0
                             GROUP BY article_id) a
                         ON a.article_id = r.article_id
                       GROUP BY r.article_id
                       HAVING SUM(r.page_views) > ?1"#,
                )?;
                let inputs = stmt
                    .query_map(params![min_views], |row| {
                        Ok(QualityInputs {
                            article_id: row.get(0)?,
                            title: row.get(1)?,
                            reading_time_minutes: row.get(2)?,
                            avg_read_seconds: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                            views: row.get(4)?,
                            reactions: row.get(5)?,
                            comments: row.get(6)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(inputs)
            })
            .await?;
        Ok(inputs)
    }

    pub async fn read_time_rows(&self, min_views: i64, limit: i64) -> Result<Vec<ReadTimeRow>> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT r.article_id, a.title, a.reading_time_minutes,
                              AVG(r.avg_read_time_seconds) AS avg_read,
                              SUM(r.page_views) AS total_views,
                              SUM(r.total_read_time_seconds) AS total_read,
                              COUNT(DISTINCT r.date) AS days_with_data
                       FROM daily_rollups r
                       JOIN (SELECT article_id, title, reading_time_minutes, MAX(collected_at)
                             FROM article_snapshots
                             WHERE is_deleted = 0
                             GROUP BY article_id) a
                         ON a.article_id = r.article_id
                       WHERE r.page_views > 0
                       GROUP BY r.article_id
                       HAVING SUM(r.page_views) > ?1
                       ORDER BY avg_read DESC
                       LIMIT ?2"#,
                )?;
                let rows = stmt
                    .query_map(params![min_views, limit], |row| {
                        let reading_time: Option<i64> = row.get(2)?;
                        let avg_read = row.get::<_, Option<f64>>(3)?.unwrap_or(0.0);
                        let total_read: i64 = row.get::<_, Option<i64>>(5)?.unwrap_or(0);
                        Ok(ReadTimeRow {
                            article_id: row.get(0)?,
                            title: row.get(1)?,
                            reading_time_minutes: reading_time,
                            avg_read_seconds: avg_read as i64,
                            total_views: row.get(4)?,
                            total_hours: total_read as f64 / 3600.0,
                            completion_percent: crate::analytics::quality::completion_percent(
                                reading_time,
                                avg_read,
                            ),
                            days_with_data: row.get(6)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    pub async fn reaction_breakdown_rows(
        &self,
        min_reactions: i64,
        limit: i64,
    ) -> Result<Vec<ReactionBreakdownRow>> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT a.article_id, a.title, lr.lifetime,
                              COALESCE(b.likes, 0), COALESCE(b.unicorns, 0),
                              COALESCE(b.readinglist, 0)
                       FROM (SELECT article_id, title, MAX(collected_at)
                             FROM article_snapshots
                             WHERE is_deleted = 0
                             GROUP BY article_id) a
                       JOIN (SELECT article_id, MAX(reactions) AS lifetime
                             FROM article_snapshots
                             GROUP BY article_id) lr
                         ON lr.article_id = a.article_id
                       LEFT JOIN (SELECT article_id,
                                         SUM(reactions_like) AS likes,
                                         SUM(reactions_unicorn) AS unicorns,
                                         SUM(reactions_readinglist) AS readinglist
                                  FROM daily_rollups
                                  GROUP BY article_id) b
                         ON b.article_id = a.article_id
                       WHERE lr.lifetime > ?1
                       ORDER BY lr.lifetime DESC
                       LIMIT ?2"#,
                )?;
                let rows = stmt
                    .query_map(params![min_reactions, limit], |row| {
                        let lifetime: i64 = row.get(2)?;
                        let likes: i64 = row.get(3)?;
                        let unicorns: i64 = row.get(4)?;
                        let readinglist: i64 = row.get(5)?;
                        let breakdown_sum = likes + unicorns + readinglist;
                        Ok(ReactionBreakdownRow {
                            article_id: row.get(0)?,
                            title: row.get(1)?,
                            lifetime_reactions: lifetime,
                            likes,
                            unicorns,
                            readinglist,
                            breakdown_sum,
                            gap: lifetime - breakdown_sum,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Articles published before `published_before` whose rollup views since
    /// `window_cutoff` clear `min_views`, most-viewed first.
    pub async fn long_tail_rows(
        &self,
        window_cutoff: NaiveDate,
        published_before: DateTime<Utc>,
        min_views: i64,
        limit: i64,
    ) -> Result<Vec<(i64, String, DateTime<Utc>, i64)>> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT a.article_id, a.title, a.published_at, s.views_window
                       FROM (SELECT article_id, SUM(page_views) AS views_window
                             FROM daily_rollups
                             WHERE date >= ?1
                             GROUP BY article_id) s
                       JOIN (SELECT article_id, title, published_at, MAX(collected_at)
                             FROM article_snapshots
                             WHERE is_deleted = 0
                             GROUP BY article_id) a
                         ON a.article_id = s.article_id
                       WHERE a.published_at IS NOT NULL
                         AND a.published_at < ?2
                         AND s.views_window > ?3
                       ORDER BY s.views_window DESC
                       LIMIT ?4"#,
                )?;
                let rows = stmt
                    .query_map(
                        params![
                            window_cutoff.to_string(),
                            published_before.to_rfc3339(),
                            min_views,
                            limit
                        ],
                        |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, i64>(3)?,
                            ))
                        },
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, title, published_at, views)| {
                parse_datetime(&published_at).map(|dt| (id, title, dt, views))
            })
            .collect())
    }

    /// Summed rollup totals for dates in [start, end).
    pub async fn period_totals(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<crate::models::PeriodTotals> {
        let totals = self
            .conn
            .call(move |conn| {
                let totals = conn.query_row(
                    r#"SELECT COALESCE(SUM(page_views), 0),
                              COALESCE(SUM(reactions_total), 0),
                              COALESCE(SUM(comments_total), 0)
                       FROM daily_rollups
                       WHERE date >= ?1 AND date < ?2"#,
                    params![start.to_string(), end.to_string()],
                    |row| {
                        Ok(crate::models::PeriodTotals {
                            views: row.get(0)?,
                            reactions: row.get(1)?,
                            comments: row.get(2)?,
                        })
                    },
                )?;
                Ok(totals)
            })
            .await?;
        Ok(totals)
    }

    /// Latest counters per live article, for the stats-cache rebuild.
    pub async fn latest_article_metrics(
        &self,
    ) -> Result<Vec<(i64, i64, i64, i64, DateTime<Utc>)>> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT article_id, views, reactions, comments, MAX(collected_at)
                       FROM article_snapshots
                       WHERE is_deleted = 0
                       GROUP BY article_id
                       ORDER BY article_id"#,
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, v, r, c, ts)| {
                let ts = parse_datetime(&ts).unwrap_or_else(Utc::now);
                (id, v, r, c, ts)
            })
            .collect())
    }

    /// (mood, count) over analyzed non-spam comments, plus the spam count.
    pub async fn insight_summary(&self) -> Result<(Vec<(String, i64)>, i64)> {
        let summary = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT mood, COUNT(*) FROM comment_insights
                       WHERE is_spam = 0
                       GROUP BY mood
                       ORDER BY COUNT(*) DESC"#,
                )?;
                let moods = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let spam = conn.query_row(
                    "SELECT COUNT(*) FROM comment_insights WHERE is_spam = 1",
                    [],
                    |row| row.get(0),
                )?;
                Ok((moods, spam))
            })
            .await?;
        Ok(summary)
    }

    /// (theme name, classified article count), most common first.
    pub async fn theme_counts(&self) -> Result<Vec<(String, i64)>> {
        let counts = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT t.name, COUNT(m.article_id)
                       FROM themes t
                       LEFT JOIN article_theme_mapping m ON t.id = m.theme_id
                       GROUP BY t.id
                       ORDER BY COUNT(m.article_id) DESC, t.name"#,
                )?;
                let counts = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(counts)
            })
            .await?;
        Ok(counts)
    }

    // Stats cache (replace-on-rebuild)

    pub async fn upsert_article_stats(&self, stats: ArticleStats) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT OR REPLACE INTO article_stats_cache
                       (article_id, latest_views, latest_reactions, latest_comments,
                        latest_collected_at, quality_score, engagement_rate,
                        attributed_followers_7d, attributed_followers_30d, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                    params![
                        stats.article_id,
                        stats.latest_views,
                        stats.latest_reactions,
                        stats.latest_comments,
                        stats.latest_collected_at.to_rfc3339(),
                        stats.quality_score,
                        stats.engagement_rate,
                        stats.attributed_followers_7d,
                        stats.attributed_followers_30d,
                        stats.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn article_stats(&self, article_id: i64) -> Result<Option<ArticleStats>> {
        let stats = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT article_id, latest_views, latest_reactions, latest_comments,
                              latest_collected_at, quality_score, engagement_rate,
                              attributed_followers_7d, attributed_followers_30d, updated_at
                       FROM article_stats_cache
                       WHERE article_id = ?1"#,
                )?;
                let stats = stmt
                    .query_row(params![article_id], |row| Ok(stats_from_row(row)))
                    .optional()?;
                Ok(stats)
            })
            .await?;
        Ok(stats)
    }
}

pub(super) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn parse_tags(s: Option<String>) -> Vec<String> {
    s.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
}

fn snapshot_from_row(row: &Row) -> ArticleSnapshot {
    ArticleSnapshot {
        id: row.get(0).unwrap(),
        collected_at: row
            .get::<_, String>(1)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        article_id: row.get(2).unwrap(),
        title: row.get(3).unwrap(),
        slug: row.get(4).unwrap(),
        published_at: row
            .get::<_, Option<String>>(5)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        views: row.get(6).unwrap(),
        reactions: row.get(7).unwrap(),
        comments: row.get(8).unwrap(),
        reading_time_minutes: row.get(9).unwrap(),
        tags: parse_tags(row.get(10).unwrap()),
        is_deleted: row.get::<_, i64>(11).unwrap() != 0,
    }
}

fn follower_event_from_row(row: &Row) -> FollowerEvent {
    FollowerEvent {
        collected_at: row
            .get::<_, String>(0)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        follower_count: row.get(1).unwrap(),
        delta_since_last: row.get(2).unwrap(),
    }
}

fn theme_from_row(row: &Row) -> Theme {
    Theme {
        id: row.get(0).unwrap(),
        name: row.get(1).unwrap(),
        keywords: parse_tags(row.get(2).unwrap()),
        description: row.get(3).unwrap(),
    }
}

fn stats_from_row(row: &Row) -> ArticleStats {
    ArticleStats {
        article_id: row.get(0).unwrap(),
        latest_views: row.get(1).unwrap(),
        latest_reactions: row.get(2).unwrap(),
        latest_comments: row.get(3).unwrap(),
        latest_collected_at: row
            .get::<_, String>(4)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        quality_score: row.get(5).unwrap(),
        engagement_rate: row.get(6).unwrap(),
        attributed_followers_7d: row.get(7).unwrap(),
        attributed_followers_30d: row.get(8).unwrap(),
        updated_at: row
            .get::<_, String>(9)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
pub mod testutil {
    use super::*;
    use chrono::TimeZone;

    pub async fn open_store(dir: &tempfile::TempDir) -> Store {
        let path = dir.path().join("test.db");
        Store::new(path.to_str().unwrap()).await.unwrap()
    }

    pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    pub fn snapshot(article_id: i64, collected_at: DateTime<Utc>, views: i64) -> NewArticleSnapshot {
        NewArticleSnapshot {
            article_id,
            collected_at,
            title: format!("Article {article_id}"),
            slug: None,
            published_at: None,
            views,
            reactions: 0,
            comments: 0,
            reading_time_minutes: Some(5),
            tags: vec!["rust".to_string()],
        }
    }

    pub fn follower(collected_at: DateTime<Utc>, count: i64, delta: i64) -> FollowerEvent {
        FollowerEvent {
            collected_at,
            follower_count: count,
            delta_since_last: delta,
        }
    }

    pub fn comment(comment_id: &str, article_id: i64, author: &str) -> NewComment {
        NewComment {
            comment_id: comment_id.to_string(),
            article_id,
            article_title: Some(format!("Article {article_id}")),
            author_username: Some(author.to_string()),
            author_name: None,
            body_html: "<p>Great post!</p>".to_string(),
            body_text: "Great post!".to_string(),
            created_at: Some(collected()),
            collected_at: collected(),
        }
    }

    pub fn rollup(article_id: i64, date: NaiveDate, views: i64) -> NewDailyRollup {
        NewDailyRollup {
            article_id,
            date,
            page_views: views,
            avg_read_time_seconds: 120,
            total_read_time_seconds: views * 120,
            reactions_total: 4,
            reactions_like: 3,
            reactions_unicorn: 1,
            reactions_readinglist: 0,
            comments_total: 1,
            follows_total: 0,
            collected_at: collected(),
        }
    }

    fn collected() -> DateTime<Utc> {
        at(2026, 8, 1, 12, 0)
    }

    impl Store {
        pub async fn seed_theme(&self, name: &str, keywords: &[&str]) {
            let name = name.to_string();
            let keywords = serde_json::to_string(keywords).unwrap();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO themes (name, keywords) VALUES (?1, ?2)",
                        params![name, keywords],
                    )?;
                    Ok(())
                })
                .await
                .unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::models::Mood;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn snapshot_insert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let snap = snapshot(1, at(2026, 8, 1, 12, 0), 100);
        assert!(store.insert_article_snapshot(snap.clone()).await.unwrap());
        // Same (article_id, collected_at) again: ignored, history untouched.
        assert!(!store.insert_article_snapshot(snap).await.unwrap());
    }

    #[tokio::test]
    async fn closest_snapshot_respects_tolerance_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .insert_article_snapshot(snapshot(1, at(2026, 8, 1, 0, 0), 100))
            .await
            .unwrap();

        let target = at(2026, 8, 1, 10, 0);
        // 10 hours away, tolerance 6h: no match, and that is not an error.
        let miss = store
            .closest_article_snapshot(1, target, Duration::hours(6))
            .await
            .unwrap();
        assert!(miss.is_none());

        let hit = store
            .closest_article_snapshot(1, target, Duration::hours(12))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.views, 100);
    }

    #[tokio::test]
    async fn closest_snapshot_picks_nearest_and_breaks_ties_earliest() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .insert_article_snapshot(snapshot(1, at(2026, 8, 1, 8, 0), 80))
            .await
            .unwrap();
        store
            .insert_article_snapshot(snapshot(1, at(2026, 8, 1, 11, 0), 110))
            .await
            .unwrap();
        // Equidistant pair around 12:00.
        store
            .insert_article_snapshot(snapshot(1, at(2026, 8, 1, 13, 0), 130))
            .await
            .unwrap();

        let nearest = store
            .closest_article_snapshot(1, at(2026, 8, 1, 12, 0), Duration::hours(6))
            .await
            .unwrap()
            .unwrap();
        // 11:00 and 13:00 are both 1h away; earliest wins.
        assert_eq!(nearest.views, 110);

        // Deterministic across repeated calls on unchanged data.
        for _ in 0..3 {
            let again = store
                .closest_article_snapshot(1, at(2026, 8, 1, 12, 0), Duration::hours(6))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(again.id, nearest.id);
        }
    }

    #[tokio::test]
    async fn daily_rollup_upsert_replaces_slid_window_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();

        store.upsert_daily_rollup(rollup(1, date, 40)).await.unwrap();
        // Later fetch for the same day is more complete: overwrite expected.
        store.upsert_daily_rollup(rollup(1, date, 55)).await.unwrap();

        store
            .insert_article_snapshot(snapshot(1, at(2026, 8, 1, 12, 0), 100))
            .await
            .unwrap();
        let inputs = store.quality_inputs(0).await.unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].views, 55);
    }

    #[tokio::test]
    async fn pending_comments_anti_join_reaches_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store.insert_comment(comment("c1", 1, "reader_a")).await.unwrap();
        store.insert_comment(comment("c2", 1, "reader_b")).await.unwrap();
        store.insert_comment(comment("c3", 1, "the_author")).await.unwrap();

        let pending = store
            .pending_comment_insights(Some("the_author".to_string()), None)
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);

        for p in &pending {
            let insight = CommentInsight {
                comment_id: p.comment_id.clone(),
                sentiment_score: 0.5,
                mood: Mood::Positive,
                is_spam: false,
                named_entities: vec![],
                analyzed_at: Utc::now(),
            };
            assert!(store.insert_comment_insight(insight, false).await.unwrap());
        }

        // Second run with no new comments: empty pending set.
        let drained = store
            .pending_comment_insights(Some("the_author".to_string()), None)
            .await
            .unwrap();
        assert!(drained.is_empty());
    }

    #[tokio::test]
    async fn insight_written_once_unless_reanalysis_requested() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.insert_comment(comment("c1", 1, "reader_a")).await.unwrap();

        let first = CommentInsight {
            comment_id: "c1".to_string(),
            sentiment_score: 0.5,
            mood: Mood::Positive,
            is_spam: false,
            named_entities: vec![],
            analyzed_at: Utc::now(),
        };
        assert!(store.insert_comment_insight(first.clone(), false).await.unwrap());

        let second = CommentInsight {
            sentiment_score: -0.9,
            mood: Mood::Negative,
            ..first
        };
        // Without the explicit reanalyze flag the original row wins.
        assert!(!store.insert_comment_insight(second.clone(), false).await.unwrap());
        assert!(store.insert_comment_insight(second, true).await.unwrap());
    }

    #[tokio::test]
    async fn soft_delete_hides_article_from_live_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .insert_article_snapshot(snapshot(1, at(2026, 8, 1, 12, 0), 100))
            .await
            .unwrap();
        store
            .insert_article_snapshot(snapshot(2, at(2026, 8, 1, 12, 0), 200))
            .await
            .unwrap();
        store.mark_article_deleted(2).await.unwrap();

        let live = store.live_articles().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].0, 1);
    }

    #[tokio::test]
    async fn reads_are_safe_on_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        assert!(store.quality_inputs(0).await.unwrap().is_empty());
        assert!(store.live_articles().await.unwrap().is_empty());
        assert!(store.latest_follower_event().await.unwrap().is_none());
        assert!(store
            .closest_follower_event(Utc::now(), Duration::hours(6))
            .await
            .unwrap()
            .is_none());
        let totals = store
            .period_totals(
                NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 8, 8).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(totals.views, 0);
    }
}
