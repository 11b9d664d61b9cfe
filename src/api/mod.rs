mod client;

pub use client::{
    flatten_comments, ApiArticle, ApiComment, ApiReferrers, DayAnalytics, DevtoClient,
    HistoricalAnalytics,
};
