use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub comment_id: String,
    pub article_id: i64,
    pub article_title: Option<String>,
    pub author_username: Option<String>,
    pub author_name: Option<String>,
    pub body_html: String,
    pub body_text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
}

/// A stored comment that has no insight row yet.
#[derive(Debug, Clone)]
pub struct PendingComment {
    pub comment_id: String,
    pub article_title: Option<String>,
    pub body_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mood {
    Positive,
    Neutral,
    Negative,
}

impl Mood {
    /// Calibrated thresholds: >= 0.3 positive, <= -0.2 negative.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.3 {
            Mood::Positive
        } else if score <= -0.2 {
            Mood::Negative
        } else {
            Mood::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Positive => "positive",
            Mood::Neutral => "neutral",
            Mood::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedEntity {
    pub text: String,
    pub label: String,
}

/// A reader question the author has not replied to on that article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnansweredQuestion {
    pub comment_id: String,
    pub article_title: Option<String>,
    pub author_username: Option<String>,
    pub body_text: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Derived 1:1 analysis record for a comment. Computed at most once
/// unless re-analysis is explicitly requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentInsight {
    pub comment_id: String,
    pub sentiment_score: f64,
    pub mood: Mood,
    pub is_spam: bool,
    pub named_entities: Vec<NamedEntity>,
    pub analyzed_at: DateTime<Utc>,
}
