pub const SCHEMA: &str = r#"
-- article_snapshots: append-only time series, one row per (collected_at, article_id)
CREATE TABLE IF NOT EXISTS article_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collected_at TEXT NOT NULL,
    article_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    slug TEXT,
    published_at TEXT,
    views INTEGER NOT NULL DEFAULT 0,
    reactions INTEGER NOT NULL DEFAULT 0,
    comments INTEGER NOT NULL DEFAULT 0,
    reading_time_minutes INTEGER,
    tags TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    UNIQUE(collected_at, article_id)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_article ON article_snapshots(article_id, collected_at);
CREATE INDEX IF NOT EXISTS idx_snapshots_collected ON article_snapshots(collected_at);

-- daily_rollups: one row per (article_id, date); replaced as the upstream
-- rolling window slides (the only table where overwrite is expected)
CREATE TABLE IF NOT EXISTS daily_rollups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    page_views INTEGER NOT NULL DEFAULT 0,
    avg_read_time_seconds INTEGER NOT NULL DEFAULT 0,
    total_read_time_seconds INTEGER NOT NULL DEFAULT 0,
    reactions_total INTEGER NOT NULL DEFAULT 0,
    reactions_like INTEGER NOT NULL DEFAULT 0,
    reactions_unicorn INTEGER NOT NULL DEFAULT 0,
    reactions_readinglist INTEGER NOT NULL DEFAULT 0,
    comments_total INTEGER NOT NULL DEFAULT 0,
    follows_total INTEGER NOT NULL DEFAULT 0,
    collected_at TEXT NOT NULL,
    UNIQUE(article_id, date)
);

CREATE INDEX IF NOT EXISTS idx_rollups_date ON daily_rollups(date);

-- follower_events: global account series, unique per collection instant
CREATE TABLE IF NOT EXISTS follower_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collected_at TEXT NOT NULL UNIQUE,
    follower_count INTEGER NOT NULL,
    delta_since_last INTEGER NOT NULL DEFAULT 0
);

-- comments: immutable once collected
CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    comment_id TEXT NOT NULL UNIQUE,
    article_id INTEGER NOT NULL,
    article_title TEXT,
    author_username TEXT,
    author_name TEXT,
    body_html TEXT,
    body_text TEXT,
    body_length INTEGER NOT NULL DEFAULT 0,
    created_at TEXT,
    collected_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_article ON comments(article_id);
CREATE INDEX IF NOT EXISTS idx_comments_author ON comments(author_username);

-- comment_insights: derived 1:1 with comments
CREATE TABLE IF NOT EXISTS comment_insights (
    comment_id TEXT PRIMARY KEY REFERENCES comments(comment_id) ON DELETE CASCADE,
    sentiment_score REAL NOT NULL,
    mood TEXT NOT NULL,
    is_spam INTEGER NOT NULL DEFAULT 0,
    named_entities TEXT,
    analyzed_at TEXT NOT NULL
);

-- themes: definitions supplied externally
CREATE TABLE IF NOT EXISTS themes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    keywords TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- article_theme_mapping: one active theme per article, overwritten per run
CREATE TABLE IF NOT EXISTS article_theme_mapping (
    article_id INTEGER NOT NULL,
    theme_id INTEGER NOT NULL REFERENCES themes(id) ON DELETE CASCADE,
    confidence REAL NOT NULL DEFAULT 0,
    matched_keywords TEXT,
    classified_at TEXT NOT NULL,
    UNIQUE(article_id, theme_id)
);

CREATE INDEX IF NOT EXISTS idx_theme_mapping_article ON article_theme_mapping(article_id);

-- referrers: time series of traffic sources per article
CREATE TABLE IF NOT EXISTS referrers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id INTEGER NOT NULL,
    domain TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    collected_at TEXT NOT NULL,
    UNIQUE(article_id, domain, collected_at)
);

-- article_stats_cache: fully derived projection, rebuilt wholesale
CREATE TABLE IF NOT EXISTS article_stats_cache (
    article_id INTEGER PRIMARY KEY,
    latest_views INTEGER NOT NULL DEFAULT 0,
    latest_reactions INTEGER NOT NULL DEFAULT 0,
    latest_comments INTEGER NOT NULL DEFAULT 0,
    latest_collected_at TEXT NOT NULL,
    quality_score REAL,
    engagement_rate REAL,
    attributed_followers_7d REAL,
    attributed_followers_30d REAL,
    updated_at TEXT NOT NULL
);

-- sync_locks: cross-process lease rows for single-flight execution
CREATE TABLE IF NOT EXISTS sync_locks (
    name TEXT PRIMARY KEY,
    holder TEXT NOT NULL,
    acquired_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
"#;
