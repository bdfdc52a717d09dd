use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use newsletterdw::{
    BeehiivClient, ClassRevenue, Database, JobProgress, NewsletterDW, RefreshOptions, StageResult,
    SyncJob, SyncSummary, Window,
};

#[derive(Parser)]
#[command(name = "newsletterdw", about = "Newsletter analytics warehouse CLI")]
struct Cli {
    /// Database path (default: ~/.newsletterdw/newsletterdw.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a publication's posts and their stats
    Sync {
        /// Publication ID (e.g. pub_00000000-0000-0000-0000-000000000000)
        publication_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync every registered publication
    SyncAll {
        #[arg(long)]
        json: bool,
    },
    /// Manage registered publications
    Publication {
        #[command(subcommand)]
        action: PublicationAction,
    },
    /// Recompute the analytics caches
    Refresh {
        /// Comma-separated windows (e.g. 7d,30d,90d). Defaults to the `periods` config.
        #[arg(long)]
        periods: Option<String>,
        /// Trailing days of daily stats to recompute
        #[arg(long, default_value = "30")]
        days: u32,
        /// Last day of every window (YYYY-MM-DD, default today)
        #[arg(long)]
        as_of: Option<String>,
        #[arg(long)]
        skip_daily: bool,
        #[arg(long)]
        skip_stats: bool,
        #[arg(long)]
        skip_overlap: bool,
        #[arg(long)]
        json: bool,
    },
    /// Readers, opens, and revenue per segment for a period
    Stats {
        /// Window (e.g. 7d, 30d)
        #[arg(default_value = "30d")]
        period: String,
        #[arg(long)]
        json: bool,
    },
    /// Reader overlap between the two configured segments
    Overlap {
        #[arg(default_value = "30d")]
        period: String,
        /// Attribute the period's revenue to each overlap class
        #[arg(long)]
        revenue: bool,
        #[arg(long)]
        json: bool,
    },
    /// Daily readers and opens
    Daily {
        #[arg(long, default_value = "30")]
        days: u32,
        #[arg(long)]
        json: bool,
    },
    /// Average readers and opens per weekday
    Weekday {
        #[arg(long, default_value = "90")]
        days: u32,
        #[arg(long)]
        json: bool,
    },
    /// Show stored stats for one post
    Post {
        /// Remote post ID
        post_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Import JSON-lines exports
    Import {
        #[command(subcommand)]
        target: ImportTarget,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show warehouse status
    Status {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PublicationAction {
    /// Register a publication for `sync-all`
    Add {
        publication_id: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
    /// Unregister a publication (its posts are kept)
    Remove { publication_id: String },
    /// List registered publications
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ImportTarget {
    /// Tracking events: {"reader_id", "content_id", "segment", "occurred_at", "open_count"}
    Events { file: PathBuf },
    /// Daily revenue: {"date", "segment", "revenue"}
    Revenue { file: PathBuf },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };

    match cli.command {
        Commands::Sync {
            publication_id,
            json,
        } => {
            let dw = Arc::new(online(db)?);
            let summary = sync_with_progress(dw, publication_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_sync_summary(&summary);
            }
        }
        Commands::SyncAll { json } => {
            let dw = online(db)?;
            let outcomes = dw.sync_all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else if outcomes.is_empty() {
                println!("No publications registered. Run: newsletterdw publication add <ID>");
            } else {
                for outcome in &outcomes {
                    match (&outcome.summary, &outcome.error) {
                        (Some(summary), _) => print_sync_summary(summary),
                        (None, Some(err)) => println!("Sync: {}\n  Error: {err}", outcome.publication_id),
                        (None, None) => {}
                    }
                }
            }
        }
        Commands::Publication { action } => {
            handle_publication(&NewsletterDW::offline(db), action).await?;
        }
        Commands::Refresh {
            periods,
            days,
            as_of,
            skip_daily,
            skip_stats,
            skip_overlap,
            json,
        } => {
            let dw = NewsletterDW::offline(db);
            let periods = match periods {
                Some(raw) => Window::parse_list(&raw)?,
                None => dw.analytics_config().await?.periods,
            };
            let as_of = as_of
                .map(|s| chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
                .transpose()?;
            let options = RefreshOptions {
                periods,
                update_daily: !skip_daily,
                update_stats: !skip_stats,
                update_overlap: !skip_overlap,
                days_to_update: days,
                as_of,
            };
            let result = dw.refresh_caches(&options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Cache refresh as of {}", result.as_of);
                print_stage("Daily", result.daily.as_ref());
                print_stage("Period", result.stats.as_ref());
                print_stage("Overlap", result.overlap.as_ref());
            }
            if !result.all_succeeded() {
                anyhow::bail!("one or more cache stages failed");
            }
        }
        Commands::Stats { period, json } => {
            let dw = NewsletterDW::offline(db);
            let summary = dw.get_stats(Window::parse_days(&period)?).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else if summary.segments.is_empty() {
                println!("No cached stats for {period}. Run: newsletterdw refresh");
            } else {
                println!(
                    "Stats: last {}d ({} to {})",
                    summary.period_days,
                    summary.window_start.as_deref().unwrap_or("?"),
                    summary.window_end.as_deref().unwrap_or("?")
                );
                for s in &summary.segments {
                    println!(
                        "  {:<12} readers: {:>7}  opens: {:>8}  revenue: {:>10.2}  RPM: {:>8.2}",
                        s.segment, s.unique_readers, s.total_opens, s.revenue, s.rpm
                    );
                }
                println!(
                    "  {:<12} opens: {:>8}  revenue: {:>10.2}  RPM: {:>8.2}",
                    "total", summary.total_opens, summary.total_revenue, summary.blended_rpm
                );
            }
        }
        Commands::Overlap {
            period,
            revenue,
            json,
        } => {
            let dw = NewsletterDW::offline(db);
            let days = Window::parse_days(&period)?;
            if revenue {
                let split = dw.get_overlap_revenue(days).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&split)?);
                } else {
                    println!(
                        "Overlap revenue: last {}d ({} to {}), total {:.2}",
                        split.period_days, split.window_start, split.window_end, split.total_revenue
                    );
                    print_class("both", &split.both);
                    print_class(&format!("{} only", split.segment_a), &split.a_only);
                    print_class(&format!("{} only", split.segment_b), &split.b_only);
                }
            } else {
                let stat = dw.get_overlap(days).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&stat)?);
                } else {
                    println!(
                        "Overlap: last {}d ({} to {}), {} readers",
                        stat.period_days, stat.window_start, stat.window_end, stat.total_unique_users
                    );
                    println!("  {:<16} {:>7} ({:.1}%)", "both", stat.both_users, stat.both_pct);
                    println!(
                        "  {:<16} {:>7} ({:.1}%)",
                        format!("{} only", stat.segment_a),
                        stat.a_only_users,
                        stat.a_only_pct
                    );
                    println!(
                        "  {:<16} {:>7} ({:.1}%)",
                        format!("{} only", stat.segment_b),
                        stat.b_only_users,
                        stat.b_only_pct
                    );
                }
            }
        }
        Commands::Daily { days, json } => {
            let rows = NewsletterDW::offline(db).get_daily(days).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No cached daily stats. Run: newsletterdw refresh");
            } else {
                for r in &rows {
                    println!(
                        "{}  {:<12} readers: {:>7}  opens: {:>8}",
                        r.date, r.segment, r.unique_readers, r.total_opens
                    );
                }
            }
        }
        Commands::Weekday { days, json } => {
            let rows = NewsletterDW::offline(db).get_weekday(days).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No cached daily stats. Run: newsletterdw refresh");
            } else {
                for r in &rows {
                    println!(
                        "{:<10} {:<12} avg readers: {:>9.1}  avg opens: {:>9.1}  ({} days)",
                        r.day_name, r.segment, r.avg_unique_readers, r.avg_opens, r.days_observed
                    );
                }
            }
        }
        Commands::Post { post_id, json } => {
            let stats = NewsletterDW::offline(db).post_stats(&post_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Post: {post_id}");
                println!("  Recipients:   {}", stats.recipients);
                println!("  Delivered:    {} ({:.1}%)", stats.delivered, stats.delivered_rate);
                println!("  Bounces:      {}", stats.bounces);
                println!("  Unique opens: {} ({:.1}%)", stats.unique_opens, stats.open_rate);
                println!("  Unique clicks: {} ({:.1}%, CTR {:.1}%)", stats.unique_clicks, stats.click_rate, stats.click_through_rate);
                println!("  Unsubscribes: {} ({:.2}%)", stats.unsubscribes, stats.unsubscribe_rate);
            }
        }
        Commands::Import { target } => {
            let dw = NewsletterDW::offline(db);
            let (what, report) = match target {
                ImportTarget::Events { file } => ("events", dw.import_events(&file).await?),
                ImportTarget::Revenue { file } => ("revenue rows", dw.import_revenue(&file).await?),
            };
            println!("Imported {} {what} ({} lines skipped)", report.imported, report.skipped);
        }
        Commands::Config { action } => {
            handle_config(&NewsletterDW::offline(db), action).await?;
        }
        Commands::Status { json } => {
            let counts = NewsletterDW::offline(db).status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                println!("Warehouse Status");
                println!("  Publications:   {}", counts.publications);
                println!("  Posts:          {}", counts.posts);
                println!("  Posts w/ stats: {}", counts.posts_with_stats);
                println!("  Events:         {}", counts.events);
                println!("  Revenue days:   {}", counts.revenue_days);
                println!("  Daily rows:     {}", counts.daily_rows);
                println!(
                    "  Last sync:      {}",
                    counts.last_sync_at.as_deref().unwrap_or("never")
                );
                println!(
                    "  Last refresh:   {}",
                    counts.last_refresh_at.as_deref().unwrap_or("never")
                );
            }
        }
    }

    Ok(())
}

fn online(db: Database) -> anyhow::Result<NewsletterDW> {
    let client = BeehiivClient::from_env()?;
    Ok(NewsletterDW::new(db, Arc::new(client)))
}

/// Run the sync on its own task and print tracker snapshots to stderr until it
/// finishes.
async fn sync_with_progress(dw: Arc<NewsletterDW>, publication_id: String) -> anyhow::Result<SyncSummary> {
    let mut handle = tokio::spawn({
        let dw = dw.clone();
        let publication_id = publication_id.clone();
        async move { dw.start_sync(&publication_id).await }
    });

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let summary = loop {
        tokio::select! {
            joined = &mut handle => break joined??,
            _ = ticker.tick() => print_progress(&dw.get_progress(&publication_id)),
        }
    };
    eprintln!();
    Ok(summary)
}

fn print_progress(progress: &JobProgress) {
    let line = |job: &SyncJob| {
        format!(
            "{} {:>3}% ({}/{})",
            job.job_type.as_str(),
            job.percentage,
            job.current,
            job.total
        )
    };
    let parts: Vec<String> = [&progress.posts, &progress.stats]
        .into_iter()
        .flatten()
        .map(line)
        .collect();
    if !parts.is_empty() {
        eprint!("\r  {}   ", parts.join("  "));
    }
}

fn print_sync_summary(summary: &SyncSummary) {
    let p = &summary.posts;
    let s = &summary.stats;
    println!("Sync: {}", summary.publication_id);
    println!(
        "  Posts:  {} created, {} updated, {} failed{}",
        p.created,
        p.updated,
        p.failed,
        if p.is_incremental { " (incremental)" } else { "" }
    );
    println!("  Without stats: {}", p.posts_without_stats);
    println!(
        "  Stats:  {} created, {} updated, {} skipped ({} failed) of {}",
        s.created, s.updated, s.skipped, s.failed, s.total_processed
    );
}

fn print_stage(name: &str, stage: Option<&StageResult>) {
    match stage {
        None => println!("  {name:<8} skipped"),
        Some(s) if s.success => println!("  {name:<8} ok, {} rows in {}ms", s.rows_written, s.duration_ms),
        Some(s) => println!(
            "  {name:<8} FAILED after {}ms: {}",
            s.duration_ms,
            s.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn print_class(label: &str, c: &ClassRevenue) {
    println!(
        "  {label:<16} users: {:>7}  opens: {:>8}  revenue: {:>10.2}  LTV: {:>7.4}  RPM: {:>8.2}",
        c.users, c.opens, c.revenue, c.ltv, c.rpm
    );
}

async fn handle_publication(dw: &NewsletterDW, action: PublicationAction) -> anyhow::Result<()> {
    match action {
        PublicationAction::Add {
            publication_id,
            name,
        } => {
            dw.publication_add(&publication_id, name.as_deref()).await?;
            println!("Added: {publication_id}");
        }
        PublicationAction::Remove { publication_id } => {
            if dw.publication_remove(&publication_id).await? {
                println!("Removed: {publication_id}");
            } else {
                println!("Not found: {publication_id}");
            }
        }
        PublicationAction::List { json } => {
            let pubs = dw.publication_list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pubs)?);
            } else if pubs.is_empty() {
                println!("No publications registered.");
            } else {
                for p in pubs {
                    let name = p.display_name.as_deref().unwrap_or("");
                    let last = p.last_sync_at.as_deref().unwrap_or("never");
                    println!("{} {} (last sync: {})", p.publication_id, name, last);
                }
            }
        }
    }
    Ok(())
}

async fn handle_config(dw: &NewsletterDW, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match dw.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            dw.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = dw.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}
