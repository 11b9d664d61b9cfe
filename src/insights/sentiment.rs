use chrono::Utc;

use crate::db::Store;
use crate::error::Result;
use crate::models::{CommentInsight, Mood, NamedEntity};

/// Scoring seam for comment analysis. The analyzer only needs a score in
/// [-1, 1] and whatever entities the model can surface; heavier NLP models
/// plug in behind this trait without touching the queue logic.
pub trait SentimentModel: Send + Sync {
    fn score(&self, text: &str) -> f64;

    fn entities(&self, _text: &str) -> Vec<NamedEntity> {
        Vec::new()
    }
}

/// Phrases that mark a comment as spam regardless of its sentiment.
const SPAM_MARKERS: &[&str] = &[
    "crypto investment",
    "forex",
    "binary options",
    "trading platform",
    "whatsapp me",
    "telegram me",
    "dm me to earn",
    "make money fast",
    "click this link",
    "recover your funds",
];

pub fn is_spam(text: &str) -> bool {
    let lowered = text.to_lowercase();
    SPAM_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Word-list scorer used when no external model is configured. Deliberately
/// coarse; the thresholds in Mood::from_score absorb most of its noise.
pub struct LexiconModel;

const POSITIVE_WORDS: &[&str] = &[
    "great", "good", "love", "loved", "excellent", "helpful", "thanks", "thank", "awesome",
    "amazing", "useful", "nice", "clear", "fantastic", "brilliant", "perfect", "insightful",
    "enjoyed", "wonderful", "best",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "wrong", "hate", "hated", "terrible", "awful", "confusing", "broken", "useless",
    "worst", "boring", "misleading", "disappointing", "waste", "outdated", "unclear",
];

impl SentimentModel for LexiconModel {
    fn score(&self, text: &str) -> f64 {
        let mut positive = 0i64;
        let mut negative = 0i64;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let lowered = word.to_lowercase();
            if POSITIVE_WORDS.contains(&lowered.as_str()) {
                positive += 1;
            } else if NEGATIVE_WORDS.contains(&lowered.as_str()) {
                negative += 1;
            }
        }
        (positive - negative) as f64 / (positive + negative).max(1) as f64
    }
}

pub struct CommentAnalyzer<M: SentimentModel> {
    store: Store,
    model: M,
    batch_size: usize,
    /// The author's own replies are not reader feedback.
    exclude_author: Option<String>,
}

impl<M: SentimentModel> CommentAnalyzer<M> {
    pub fn new(store: Store, model: M, batch_size: usize, exclude_author: Option<String>) -> Self {
        Self {
            store,
            model,
            batch_size,
            exclude_author,
        }
    }

    /// Drains the pending queue in batches and returns how many comments
    /// were analyzed. Membership in "pending" is recomputed from store
    /// state every batch, so this is safe to re-invoke after a crash.
    pub async fn analyze_pending(&self) -> Result<usize> {
        let mut analyzed = 0;
        loop {
            let batch = self
                .store
                .pending_comment_insights(self.exclude_author.clone(), Some(self.batch_size))
                .await?;
            if batch.is_empty() {
                break;
            }
            for comment in batch {
                let score = self.model.score(&comment.body_text);
                let insight = CommentInsight {
                    comment_id: comment.comment_id,
                    sentiment_score: score,
                    mood: Mood::from_score(score),
                    is_spam: is_spam(&comment.body_text),
                    named_entities: self.model.entities(&comment.body_text),
                    analyzed_at: Utc::now(),
                };
                if self.store.insert_comment_insight(insight, false).await? {
                    analyzed += 1;
                }
            }
        }
        tracing::debug!("Analyzed {} pending comments", analyzed);
        Ok(analyzed)
    }
}
