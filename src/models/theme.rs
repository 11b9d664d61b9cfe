use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Editorial theme definition. Seed data comes from outside the core;
/// classification only reads whatever themes exist in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub id: i64,
    pub name: String,
    pub keywords: Vec<String>,
    pub description: Option<String>,
}

/// Winning theme for an article from one classification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeMatch {
    pub article_id: i64,
    pub theme_id: i64,
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
    pub classified_at: DateTime<Utc>,
}
