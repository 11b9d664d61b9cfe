mod analytics;
mod api;
mod config;
mod db;
mod error;
mod insights;
mod models;
mod sync;

use analytics::attribution::AttributionEngine;
use analytics::{overview, quality, reports};
use api::DevtoClient;
use chrono::Duration;
use config::Config;
use db::Store;
use error::Result;
use models::AttributionReport;
use sync::SyncEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = Config::load()?;
    let store = Store::new(&config.db_path).await?;

    match args.get(1).map(String::as_str) {
        Some("sync") => run_sync(&config, store).await,
        Some("scores") => show_scores(&store, parse_arg(&args, 2, 0)).await,
        Some("attribution") => {
            show_attribution(
                &config,
                store,
                parse_arg(&args, 2, config.attribution_window_hours),
            )
            .await
        }
        Some("overview") => show_overview(&store, parse_arg(&args, 2, 7)).await,
        Some("read-time") => show_read_time(&store, parse_arg(&args, 2, 0)).await,
        Some("reactions") => show_reactions(&store, parse_arg(&args, 2, 0)).await,
        Some("champions") => show_champions(&store, parse_arg(&args, 2, 20)).await,
        Some("stats") => show_stats(&store, parse_arg(&args, 2, 0)).await,
        Some("insights") => show_insights(&store).await,
        Some("questions") => show_questions(&config, &store).await,
        Some("themes") => show_themes(&store).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("devpulse - DEV.to article analytics");
    println!();
    println!("Usage: devpulse <command>");
    println!();
    println!("Commands:");
    println!("  sync                   Fetch metrics from DEV.to and update the store");
    println!("  scores [min_views]     Quality scores over the rollup window");
    println!("  attribution [hours]    Follower attribution for the trailing window");
    println!("  overview [days]        Totals vs the previous period");
    println!("  read-time [min_views]  Read-depth report");
    println!("  reactions [min_total]  Reaction-type breakdown");
    println!("  champions [min_views]  Older articles still drawing recent traffic");
    println!("  stats <article_id>     Cached stats for one article");
    println!("  insights               Comment sentiment summary");
    println!("  questions              Reader questions awaiting your reply");
    println!("  themes                 Articles per theme");
}

fn parse_arg(args: &[String], index: usize, default: i64) -> i64 {
    args.get(index)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

async fn run_sync(config: &Config, store: Store) -> Result<()> {
    let api_key = config.require_api_key()?;
    let client = DevtoClient::new(api_key.to_string(), config.rate_limit_ms);
    let engine = SyncEngine::new(store, client, config.clone());

    let summary = engine.run_full_sync().await?;
    if summary.skipped {
        // Another sync holds the lease; by contract this is a clean no-op.
        println!("Sync already in progress, nothing to do");
        return Ok(());
    }

    println!("Sync complete");
    println!("  article snapshots: {}", summary.articles_synced);
    if let Some(count) = summary.follower_count {
        let delta = summary.follower_delta.unwrap_or(0);
        println!("  followers: {count} ({delta:+})");
    }
    println!("  new comments: {}", summary.new_comments);
    println!("  daily rollups: {}", summary.rollups_upserted);
    println!("  referrer rows: {}", summary.referrers_recorded);
    println!("  comments analyzed: {}", summary.comments_analyzed);
    println!("  articles classified: {}", summary.articles_classified);
    println!("  cached stats: {}", summary.cache_entries);
    if !summary.errors.is_empty() {
        println!("  errors ({}):", summary.errors.len());
        for error in &summary.errors {
            println!("    {error}");
        }
    }
    Ok(())
}

async fn show_scores(store: &Store, min_views: i64) -> Result<()> {
    let scored = quality::quality_scores(store, min_views, Some(25)).await?;
    if scored.is_empty() {
        println!("No scored articles yet; run `devpulse sync` first");
        return Ok(());
    }
    println!("{:>6}  {:>6}  {:>6}  {:>7}  title", "score", "compl", "engag", "views");
    for article in &scored {
        println!(
            "{:>6.1}  {:>5.1}%  {:>5.1}%  {:>7}  {}",
            article.quality_score,
            article.completion_percent,
            article.engagement_percent,
            article.views,
            article.title
        );
    }
    Ok(())
}

async fn show_attribution(config: &Config, store: Store, window_hours: i64) -> Result<()> {
    let engine = AttributionEngine::new(
        store,
        Duration::minutes(config.proximity_tolerance_minutes),
    );
    let report = engine.attribute(Duration::hours(window_hours)).await?;

    match report {
        AttributionReport::InsufficientData => {
            println!("Not enough follower history in the last {window_hours}h; sync more often");
        }
        AttributionReport::ZeroGain { total_gain } => {
            println!("No follower gain in the last {window_hours}h ({total_gain:+})");
        }
        AttributionReport::NoTraffic { total_gain } => {
            println!("Gained {total_gain} followers but saw no article traffic gain");
        }
        AttributionReport::Attributed {
            total_gain,
            global_traffic_gain,
            articles,
        } => {
            println!(
                "+{total_gain} followers over {window_hours}h, {global_traffic_gain} views gained"
            );
            println!("{:>9}  {:>6}  {:>7}  title", "followers", "share", "views+");
            for a in &articles {
                println!(
                    "{:>9.1}  {:>5.1}%  {:>7}  {}",
                    a.attributed_followers,
                    a.traffic_share * 100.0,
                    a.views_gain,
                    a.title
                );
            }
        }
    }
    Ok(())
}

async fn show_overview(store: &Store, days: i64) -> Result<()> {
    let overview = overview::overview(store, days).await?;
    println!("Last {} days vs the {} before:", overview.period_days, overview.period_days);
    println!(
        "  views:     {:>8}  ({:+}, {:+.1}%)",
        overview.current.views, overview.delta.views, overview.delta_percent.views
    );
    println!(
        "  reactions: {:>8}  ({:+}, {:+.1}%)",
        overview.current.reactions, overview.delta.reactions, overview.delta_percent.reactions
    );
    println!(
        "  comments:  {:>8}  ({:+}, {:+.1}%)",
        overview.current.comments, overview.delta.comments, overview.delta_percent.comments
    );
    Ok(())
}

async fn show_read_time(store: &Store, min_views: i64) -> Result<()> {
    let rows = reports::read_time_analysis(store, min_views, 25).await?;
    if rows.is_empty() {
        println!("No read-time data yet; run `devpulse sync` first");
        return Ok(());
    }
    println!("{:>5}  {:>6}  {:>7}  {:>7}  title", "avg_s", "compl", "views", "hours");
    for row in &rows {
        println!(
            "{:>5}  {:>5.1}%  {:>7}  {:>7.1}  {}",
            row.avg_read_seconds, row.completion_percent, row.total_views, row.total_hours, row.title
        );
    }
    Ok(())
}

async fn show_reactions(store: &Store, min_reactions: i64) -> Result<()> {
    let rows = reports::reaction_breakdown(store, min_reactions, 25).await?;
    if rows.is_empty() {
        println!("No reaction data yet; run `devpulse sync` first");
        return Ok(());
    }
    println!(
        "{:>5}  {:>5}  {:>5}  {:>5}  {:>5}  title",
        "total", "like", "uni", "list", "gap"
    );
    for row in &rows {
        println!(
            "{:>5}  {:>5}  {:>5}  {:>5}  {:>5}  {}",
            row.lifetime_reactions, row.likes, row.unicorns, row.readinglist, row.gap, row.title
        );
    }
    Ok(())
}

async fn show_champions(store: &Store, min_views: i64) -> Result<()> {
    let champs = reports::long_tail_champions(store, 30, 30, min_views, 10).await?;
    if champs.is_empty() {
        println!("No long-tail champions yet; older articles need {min_views}+ recent views");
        return Ok(());
    }
    println!("{:>7}  {:>8}  published   title", "views", "age");
    for champ in &champs {
        println!(
            "{:>7}  {:>7}d  {}  {}",
            champ.views_window,
            champ.age_days,
            champ.published_at.format("%Y-%m-%d"),
            champ.title
        );
    }
    Ok(())
}

async fn show_questions(config: &Config, store: &Store) -> Result<()> {
    let Some(author) = config.author_username.as_deref() else {
        println!("Set author_username in the config to find unanswered questions");
        return Ok(());
    };
    let questions = insights::questions::unanswered_questions(store, author).await?;
    if questions.is_empty() {
        println!("No unanswered questions, inbox clear");
        return Ok(());
    }
    println!("{} unanswered question(s):", questions.len());
    for q in &questions {
        let title = q.article_title.as_deref().unwrap_or("(unknown article)");
        let who = q.author_username.as_deref().unwrap_or("someone");
        println!("  [{title}] {who}: {}", q.body_text);
    }
    Ok(())
}

async fn show_stats(store: &Store, article_id: i64) -> Result<()> {
    let Some(stats) = store.article_stats(article_id).await? else {
        println!("No cached stats for article {article_id}; run `devpulse sync` first");
        return Ok(());
    };
    println!("Article {article_id} (as of {})", stats.latest_collected_at.to_rfc3339());
    println!("  views:     {}", stats.latest_views);
    println!("  reactions: {}", stats.latest_reactions);
    println!("  comments:  {}", stats.latest_comments);
    if let Some(score) = stats.quality_score {
        println!("  quality:   {score:.1}");
    }
    if let Some(rate) = stats.engagement_rate {
        println!("  engagement: {rate:.1}%");
    }
    if let Some(f) = stats.attributed_followers_7d {
        println!("  followers attributed (7d):  {f:.1}");
    }
    if let Some(f) = stats.attributed_followers_30d {
        println!("  followers attributed (30d): {f:.1}");
    }
    Ok(())
}

async fn show_insights(store: &Store) -> Result<()> {
    let (moods, spam) = store.insight_summary().await?;
    if moods.is_empty() && spam == 0 {
        println!("No analyzed comments yet; run `devpulse sync` first");
        return Ok(());
    }
    println!("Comment sentiment:");
    for (mood, count) in &moods {
        println!("  {mood:<9} {count}");
    }
    if spam > 0 {
        println!("  {:<9} {spam}", "spam");
    }
    Ok(())
}

async fn show_themes(store: &Store) -> Result<()> {
    let counts = store.theme_counts().await?;
    if counts.is_empty() {
        println!("No themes defined; insert rows into the themes table to enable classification");
        return Ok(());
    }
    println!("Articles per theme:");
    for (name, count) in &counts {
        println!("  {name:<24} {count}");
    }
    Ok(())
}
