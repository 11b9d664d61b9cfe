use crate::db::Store;
use crate::error::Result;
use crate::models::UnansweredQuestion;

/// Reader questions still waiting on a reply from `author`, newest first.
/// A question counts as answered once the author comments on the same
/// article after it; spam-flagged questions are dropped outright.
pub async fn unanswered_questions(store: &Store, author: &str) -> Result<Vec<UnansweredQuestion>> {
    store.unanswered_questions(author.to_string()).await
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::testutil::{at, comment, open_store};
    use crate::models::{CommentInsight, Mood, NewComment};

    const AUTHOR: &str = "devpulse";

    fn question(comment_id: &str, article_id: i64, author: &str, body: &str) -> NewComment {
        let mut c = comment(comment_id, article_id, author);
        c.body_text = body.to_string();
        c
    }

    async fn seed(store: &Store, mut c: NewComment, day: u32) {
        c.created_at = Some(at(2026, 8, day, 12, 0));
        store.insert_comment(c).await.unwrap();
    }

    #[tokio::test]
    async fn open_questions_come_back_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        seed(
            &store,
            question("c1", 1, "alice", "How does this handle retries?"),
            1,
        )
        .await;
        seed(
            &store,
            question("c2", 2, "bob", "Which version did you test against?"),
            3,
        )
        .await;
        seed(&store, question("c3", 3, "carol", "Nice writeup, thanks!"), 2).await;

        let questions = unanswered_questions(&store, AUTHOR).await.unwrap();
        let ids: Vec<&str> = questions.iter().map(|q| q.comment_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
    }

    #[tokio::test]
    async fn a_later_author_reply_settles_the_question() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        seed(
            &store,
            question("c1", 1, "alice", "Does this work on stable?"),
            1,
        )
        .await;
        seed(&store, question("c2", 1, AUTHOR, "Yes, stable works."), 2).await;
        seed(
            &store,
            question("c3", 2, "bob", "Any benchmarks for the async path?"),
            3,
        )
        .await;

        let questions = unanswered_questions(&store, AUTHOR).await.unwrap();
        let ids: Vec<&str> = questions.iter().map(|q| q.comment_id.as_str()).collect();
        assert_eq!(ids, vec!["c3"]);
    }

    #[tokio::test]
    async fn an_earlier_author_comment_does_not_settle_anything() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        seed(&store, question("c1", 1, AUTHOR, "Thanks for reading!"), 1).await;
        seed(
            &store,
            question("c2", 1, "alice", "Could you share the config?"),
            2,
        )
        .await;

        let questions = unanswered_questions(&store, AUTHOR).await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].comment_id, "c2");
    }

    #[tokio::test]
    async fn the_authors_own_questions_are_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        seed(
            &store,
            question("c1", 1, AUTHOR, "What would you like covered next?"),
            1,
        )
        .await;

        let questions = unanswered_questions(&store, AUTHOR).await.unwrap();
        assert!(questions.is_empty());
    }

    #[tokio::test]
    async fn spam_flagged_questions_are_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        seed(
            &store,
            question("c1", 1, "spammer", "Want passive income? whatsapp me?"),
            1,
        )
        .await;
        store
            .insert_comment_insight(
                CommentInsight {
                    comment_id: "c1".to_string(),
                    sentiment_score: 0.0,
                    mood: Mood::Neutral,
                    is_spam: true,
                    named_entities: Vec::new(),
                    analyzed_at: Utc::now(),
                },
                false,
            )
            .await
            .unwrap();

        let questions = unanswered_questions(&store, AUTHOR).await.unwrap();
        assert!(questions.is_empty());
    }
}
