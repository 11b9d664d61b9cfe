use chrono::Utc;

use crate::db::Store;
use crate::error::Result;
use crate::models::{Theme, ThemeMatch};

/// Keyword hits for one theme against an article's title and tags.
fn match_theme(theme: &Theme, title: &str, tags: &[String]) -> Vec<String> {
    let haystack = format!("{} {}", title.to_lowercase(), tags.join(" ").to_lowercase());
    theme
        .keywords
        .iter()
        .filter(|kw| !kw.is_empty() && haystack.contains(&kw.to_lowercase()))
        .cloned()
        .collect()
}

/// Best theme for an article, or None when nothing matches. Winner is the
/// theme with the most keyword hits; equal hit counts fall back to the
/// higher confidence (hits relative to the theme's keyword count), then to
/// the lower theme id for determinism.
pub fn classify(themes: &[Theme], title: &str, tags: &[String]) -> Option<ThemeMatch> {
    let mut best: Option<(usize, f64, &Theme, Vec<String>)> = None;
    for theme in themes {
        let matched = match_theme(theme, title, tags);
        if matched.is_empty() {
            continue;
        }
        let confidence = matched.len() as f64 / theme.keywords.len().max(1) as f64;
        let candidate = (matched.len(), confidence, theme, matched);
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let better = candidate.0 > current.0
                    || (candidate.0 == current.0 && candidate.1 > current.1)
                    || (candidate.0 == current.0
                        && candidate.1 == current.1
                        && candidate.2.id < current.2.id);
                if better {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.map(|(_, confidence, theme, matched)| ThemeMatch {
        article_id: 0,
        theme_id: theme.id,
        confidence,
        matched_keywords: matched,
        classified_at: Utc::now(),
    })
}

/// Assigns a theme to every live article that has none yet. Articles no
/// theme matches stay unclassified and are retried on the next run.
pub async fn classify_unclassified(store: &Store) -> Result<usize> {
    let themes = store.themes().await?;
    if themes.is_empty() {
        return Ok(0);
    }

    let mut classified = 0;
    for (article_id, title, tags) in store.unclassified_articles().await? {
        if let Some(mut theme_match) = classify(&themes, &title, &tags) {
            theme_match.article_id = article_id;
            store.upsert_theme_mapping(theme_match).await?;
            classified += 1;
        }
    }
    tracing::debug!("Classified {} articles", classified);
    Ok(classified)
}
