mod article;
mod comment;
mod report;
mod theme;

pub use article::{ArticleSnapshot, FollowerEvent, NewArticleSnapshot, NewDailyRollup, NewReferrer};
pub use comment::{CommentInsight, Mood, NamedEntity, NewComment, PendingComment, UnansweredQuestion};
pub use report::{
    ArticleAttribution, ArticleStats, AttributionReport, LongTailChampion, Overview, PeriodChange,
    PeriodTotals, QualityInputs, ReactionBreakdownRow, ReadTimeRow, ScoredArticle, SyncSummary,
};
pub use theme::{Theme, ThemeMatch};
