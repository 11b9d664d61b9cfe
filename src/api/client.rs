use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result};

const BASE_URL: &str = "https://dev.to/api";
const FOLLOWERS_PER_PAGE: usize = 80;

/// Article as returned by /articles/me/all.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiArticle {
    pub id: i64,
    pub title: String,
    pub slug: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page_views_count: i64,
    #[serde(default)]
    pub public_reactions_count: i64,
    #[serde(default)]
    pub comments_count: i64,
    pub reading_time_minutes: Option<i64>,
    #[serde(default)]
    pub tag_list: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiFollower {
    #[allow(dead_code)]
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCommentUser {
    pub username: Option<String>,
    pub name: Option<String>,
}

/// Comment from /comments?a_id=. Replies nest under `children`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiComment {
    pub id_code: String,
    #[serde(default)]
    pub body_html: String,
    pub created_at: Option<DateTime<Utc>>,
    pub user: Option<ApiCommentUser>,
    #[serde(default)]
    pub children: Vec<ApiComment>,
}

/// One day's figures from /analytics/historical.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DayAnalytics {
    #[serde(default)]
    pub page_views: DayPageViews,
    #[serde(default)]
    pub reactions: DayReactions,
    #[serde(default)]
    pub comments: DayComments,
    #[serde(default)]
    pub follows: DayFollows,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DayPageViews {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub average_read_time_in_seconds: i64,
    #[serde(default)]
    pub total_read_time_in_seconds: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DayReactions {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub like: i64,
    #[serde(default)]
    pub unicorn: i64,
    #[serde(default)]
    pub readinglist: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DayComments {
    #[serde(default)]
    pub total: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DayFollows {
    #[serde(default)]
    pub total: i64,
}

/// Date-keyed map; BTreeMap keeps days in order for deterministic writes.
pub type HistoricalAnalytics = BTreeMap<NaiveDate, DayAnalytics>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiReferrers {
    #[serde(default)]
    pub domains: Vec<ApiReferrerDomain>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiReferrerDomain {
    /// None means direct traffic.
    pub domain: Option<String>,
    #[serde(default)]
    pub count: i64,
}

pub struct DevtoClient {
    client: Client,
    api_key: String,
    base_url: String,
    /// Minimum delay between consecutive calls; the upstream API rate-limits
    /// aggressively and returns 429 without it.
    pace: Duration,
}

impl DevtoClient {
    pub fn new(api_key: String, rate_limit_ms: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("devpulse/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
            pace: Duration::from_millis(rate_limit_ms),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        tokio::time::sleep(self.pace).await;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("api-key", &self.api_key)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Api(format!(
                "{} returned HTTP {}",
                path,
                response.status()
            )));
        }

        Ok(response.json::<T>().await?)
    }

    /// All of the authenticated user's articles, one page (the endpoint
    /// allows up to 1000 per page, far beyond any realistic account).
    pub async fn fetch_articles(&self) -> Result<Vec<ApiArticle>> {
        let articles: Vec<ApiArticle> = self
            .get_json("/articles/me/all", &[("per_page", "1000".to_string())])
            .await?;
        tracing::debug!("Fetched {} articles", articles.len());
        Ok(articles)
    }

    /// Total follower count, by paginating /followers/users until a short page.
    pub async fn fetch_follower_count(&self) -> Result<i64> {
        let mut total = 0usize;
        let mut page = 1u32;
        loop {
            let followers: Vec<ApiFollower> = self
                .get_json(
                    "/followers/users",
                    &[
                        ("per_page", FOLLOWERS_PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let count = followers.len();
            total += count;
            if count < FOLLOWERS_PER_PAGE {
                break;
            }
            page += 1;
            if page > 1000 {
                return Err(anyhow::anyhow!("followers pagination ran past 1000 pages").into());
            }
        }
        tracing::debug!("Counted {} followers across {} pages", total, page);
        Ok(total as i64)
    }

    pub async fn fetch_comments(&self, article_id: i64) -> Result<Vec<ApiComment>> {
        self.get_json("/comments", &[("a_id", article_id.to_string())])
            .await
    }

    /// Daily per-article breakdown for [start, end]. The upstream window is
    /// rolling, so re-fetched days supersede what was stored before.
    pub async fn fetch_historical_analytics(
        &self,
        article_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HistoricalAnalytics> {
        self.get_json(
            "/analytics/historical",
            &[
                ("article_id", article_id.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
            ],
        )
        .await
    }

    pub async fn fetch_referrers(&self, article_id: i64) -> Result<ApiReferrers> {
        self.get_json("/analytics/referrers", &[("article_id", article_id.to_string())])
            .await
    }
}

/// Depth-first flattening of a comment tree; replies count the same as
/// top-level comments.
pub fn flatten_comments(comments: Vec<ApiComment>) -> Vec<ApiComment> {
    let mut flat = Vec::new();
    let mut stack: Vec<ApiComment> = comments.into_iter().rev().collect();
    while let Some(mut comment) = stack.pop() {
        let children = std::mem::take(&mut comment.children);
        stack.extend(children.into_iter().rev());
        flat.push(comment);
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str, children: Vec<ApiComment>) -> ApiComment {
        ApiComment {
            id_code: id.to_string(),
            body_html: String::new(),
            created_at: None,
            user: None,
            children,
        }
    }

    #[test]
    fn flattens_nested_replies_in_document_order() {
        let tree = vec![
            comment("a", vec![comment("a1", vec![comment("a1a", vec![])]), comment("a2", vec![])]),
            comment("b", vec![]),
        ];
        let flat = flatten_comments(tree);
        let ids: Vec<&str> = flat.iter().map(|c| c.id_code.as_str()).collect();
        assert_eq!(ids, vec!["a", "a1", "a1a", "a2", "b"]);
    }

    #[test]
    fn historical_analytics_parses_date_keyed_payload() {
        let json = r#"{
            "2026-08-01": {
                "page_views": {"total": 120, "average_read_time_in_seconds": 95, "total_read_time_in_seconds": 11400},
                "reactions": {"total": 6, "like": 4, "unicorn": 1, "readinglist": 1},
                "comments": {"total": 2},
                "follows": {"total": 1}
            },
            "2026-08-02": {
                "page_views": {"total": 80}
            }
        }"#;
        let parsed: HistoricalAnalytics = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.len(), 2);
        let day1 = &parsed[&NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()];
        assert_eq!(day1.page_views.total, 120);
        assert_eq!(day1.reactions.unicorn, 1);
        // Absent sections default to zero rather than failing the sync.
        let day2 = &parsed[&NaiveDate::from_ymd_opt(2026, 8, 2).unwrap()];
        assert_eq!(day2.reactions.total, 0);
    }

    #[test]
    fn referrers_tolerate_null_domains() {
        let json = r#"{"domains": [{"domain": "news.ycombinator.com", "count": 40}, {"domain": null, "count": 12}]}"#;
        let parsed: ApiReferrers = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.domains.len(), 2);
        assert!(parsed.domains[1].domain.is_none());
    }
}
